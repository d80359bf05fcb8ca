//! Interval-driven cycle loop.
//!
//! Each iteration builds a fresh JMAP client (so transient session failures
//! heal on the next cycle), runs one triage cycle, and sleeps. Per-cycle
//! errors roll back the state transaction, print a structured error line,
//! and never terminate the loop; without a loop interval a failed cycle
//! exits non-zero.

use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::config::AppConfig;
use crate::error::Result;
use crate::jmap::client::JmapClient;
use crate::llm;
use crate::store::StateStore;
use crate::triage::cycle::{print_summary, run_cycle, CycleOptions, CycleSummary};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub apply_mode: bool,
    pub limit_override: Option<usize>,
    pub reprocess: bool,
    pub json_output: bool,
    pub loop_seconds: Option<u64>,
    pub cycles: Option<u32>,
}

async fn run_one(
    config: &AppConfig,
    store: &StateStore,
    opts: &RunOptions,
) -> Result<CycleSummary> {
    let client = JmapClient::connect(config).await?;
    let assistant = llm::build_assistant(config).await?;

    let cycle_opts = CycleOptions {
        apply_mode: opts.apply_mode,
        limit_override: opts.limit_override,
        reprocess: opts.reprocess,
    };
    run_cycle(&client, config, store, assistant.as_deref(), &cycle_opts).await
}

/// Run triage cycles until the optional cycle bound is reached; returns the
/// process exit code.
pub async fn run(config: &AppConfig, store: &StateStore, opts: &RunOptions) -> i32 {
    // `--cycles` without an explicit interval loops at the configured rate.
    let loop_seconds = opts
        .loop_seconds
        .or_else(|| opts.cycles.map(|_| config.automation.loop_interval_seconds));

    let mut cycle: u32 = 0;
    loop {
        cycle += 1;

        match run_one(config, store, opts).await {
            Ok(summary) => print_summary(&summary, opts.json_output),
            Err(e) => {
                let rolled_back = store.rollback();
                if opts.json_output {
                    println!(
                        "{}",
                        json!({
                            "error": e.to_string(),
                            "cycle": cycle,
                            "rolled_back": rolled_back,
                        })
                    );
                } else {
                    println!("ERROR:{e}");
                }

                if loop_seconds.is_none() {
                    return 1;
                }
            }
        }

        let interval = match loop_seconds {
            Some(seconds) => seconds,
            None => break,
        };
        if opts.cycles.is_some_and(|bound| cycle >= bound) {
            break;
        }

        info!(cycle, "Sleeping until next cycle");
        sleep(Duration::from_secs(interval.max(1))).await;
    }

    0
}
