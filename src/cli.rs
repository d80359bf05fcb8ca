//! Command-line surface: the triage/daemon entry point plus the VIP and
//! draft-block admin commands.
//!
//! Admin commands only need the state database, not the mail or AI config,
//! so `--state-db` alone is enough for them.

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use crate::address;
use crate::config::{self, expand_tilde, DEFAULT_STATE_DB};
use crate::daemon::{self, RunOptions};
use crate::error::Result;
use crate::store::{StateStore, VipSource};

#[derive(Parser, Debug)]
#[command(
    name = "email-triage",
    about = "Run one or more automated JMAP triage cycles"
)]
pub struct TriageArgs {
    /// Path to config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override state DB path (also used by the VIP/draft-block management
    /// flags, which need no full config)
    #[arg(long, value_name = "PATH")]
    pub state_db: Option<String>,

    /// Create drafts and move messages (default: dry-run)
    #[arg(long)]
    pub apply: bool,

    /// Override max emails per cycle
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Reprocess emails even if already drafted
    #[arg(long)]
    pub reprocess: bool,

    /// Print machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Disable Codex intelligence and use rule-only triage
    #[arg(long)]
    pub no_codex: bool,

    /// Run continuously with this delay between cycles
    #[arg(long, value_name = "N")]
    pub loop_seconds: Option<u64>,

    /// When looping, stop after this many cycles
    #[arg(long, value_name = "N")]
    pub cycles: Option<u32>,

    /// List VIP senders from the DB and exit
    #[arg(long)]
    pub vip_list: bool,

    /// Add VIP sender email(s); repeat or comma-separate values
    #[arg(long, value_name = "EMAIL")]
    pub vip_add: Vec<String>,

    /// Remove VIP sender email(s); repeat or comma-separate values
    #[arg(long, value_name = "EMAIL")]
    pub vip_remove: Vec<String>,

    /// List senders blocked from auto-draft creation and exit
    #[arg(long)]
    pub draft_block_list: bool,

    /// Add blocked sender email(s); repeat or comma-separate values
    #[arg(long, value_name = "EMAIL")]
    pub draft_block_add: Vec<String>,

    /// Remove blocked sender email(s); repeat or comma-separate values
    #[arg(long, value_name = "EMAIL")]
    pub draft_block_remove: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum SenderList {
    Vip,
    DraftBlock,
}

impl SenderList {
    fn json_key(&self) -> &'static str {
        match self {
            Self::Vip => "vip_senders",
            Self::DraftBlock => "draft_blocked_senders",
        }
    }
}

#[derive(Debug, Default)]
struct AdminOutcome {
    added: Vec<String>,
    already_present: Vec<String>,
    removed: Vec<String>,
    not_present: Vec<String>,
    invalid: Vec<String>,
    current: Vec<String>,
}

pub async fn run(args: TriageArgs) -> i32 {
    let wants_vip_admin =
        args.vip_list || !args.vip_add.is_empty() || !args.vip_remove.is_empty();
    let wants_block_admin = args.draft_block_list
        || !args.draft_block_add.is_empty()
        || !args.draft_block_remove.is_empty();

    if wants_vip_admin || wants_block_admin {
        let list = if wants_vip_admin {
            SenderList::Vip
        } else {
            SenderList::DraftBlock
        };
        return match run_admin(&args, list) {
            Ok(()) => 0,
            Err(e) => {
                println!("ERROR:{e}");
                1
            }
        };
    }

    let (mut config, _path) = match config::load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("ERROR:{e}");
            return 1;
        }
    };

    if let Some(state_db) = &args.state_db {
        config.automation.state_db = state_db.clone();
    }
    if args.no_codex {
        config.automation.use_codex = false;
    }

    // Unsupported backend or a broken auth mode is fatal before any cycle.
    if config.automation.use_codex {
        if let Err(e) = config::resolve_codex_settings(&config) {
            println!("ERROR:{e}");
            return 1;
        }
    }

    let store = match StateStore::open(&config.automation.state_db_path()) {
        Ok(store) => store,
        Err(e) => {
            println!("ERROR:{e}");
            return 1;
        }
    };

    if let Err(e) = store.seed_vip_senders(&config.triage.vip_senders) {
        println!("ERROR:{e}");
        return 1;
    }

    let opts = RunOptions {
        apply_mode: args.apply,
        limit_override: args.limit,
        reprocess: args.reprocess,
        json_output: args.json,
        loop_seconds: args.loop_seconds,
        cycles: args.cycles,
    };
    daemon::run(&config, &store, &opts).await
}

fn run_admin(args: &TriageArgs, list: SenderList) -> Result<()> {
    let db_path = expand_tilde(args.state_db.as_deref().unwrap_or(DEFAULT_STATE_DB));
    let store = StateStore::open(&db_path)?;

    let (add_raw, remove_raw, list_requested) = match list {
        SenderList::Vip => (&args.vip_add, &args.vip_remove, args.vip_list),
        SenderList::DraftBlock => (
            &args.draft_block_add,
            &args.draft_block_remove,
            args.draft_block_list,
        ),
    };

    let outcome = manage_senders(&store, list, add_raw, remove_raw)?;
    let changed = !add_raw.is_empty() || !remove_raw.is_empty();
    print_admin(&outcome, list, list_requested || changed, args.json);
    Ok(())
}

fn manage_senders(
    store: &StateStore,
    list: SenderList,
    add_raw: &[String],
    remove_raw: &[String],
) -> Result<AdminOutcome> {
    let mut outcome = AdminOutcome::default();

    for email in address::split_list(add_raw) {
        let added = match list {
            SenderList::Vip => store.add_vip_sender(&email, VipSource::Manual)?,
            SenderList::DraftBlock => {
                store.add_draft_blocked_sender(&email, VipSource::Manual)?
            }
        };
        if added {
            outcome.added.push(email);
        } else if email.contains('@') {
            outcome.already_present.push(email);
        } else {
            outcome.invalid.push(email);
        }
    }

    for email in address::split_list(remove_raw) {
        let removed = match list {
            SenderList::Vip => store.remove_vip_sender(&email)?,
            SenderList::DraftBlock => store.remove_draft_blocked_sender(&email)?,
        };
        if removed {
            outcome.removed.push(email);
        } else if email.contains('@') {
            outcome.not_present.push(email);
        } else {
            outcome.invalid.push(email);
        }
    }

    outcome.current = match list {
        SenderList::Vip => store.list_vip_senders()?,
        SenderList::DraftBlock => store.list_draft_blocked_senders()?,
    };
    Ok(outcome)
}

fn print_admin(outcome: &AdminOutcome, list: SenderList, show_list: bool, as_json: bool) {
    if as_json {
        let mut object = serde_json::Map::new();
        object.insert("added".to_string(), json!(outcome.added));
        object.insert(
            "already_present".to_string(),
            json!(outcome.already_present),
        );
        object.insert("removed".to_string(), json!(outcome.removed));
        object.insert("not_present".to_string(), json!(outcome.not_present));
        object.insert("invalid".to_string(), json!(outcome.invalid));
        object.insert(list.json_key().to_string(), json!(outcome.current));
        println!("{}", serde_json::Value::Object(object));
        return;
    }

    let groups: [(&str, &Vec<String>); 5] = [
        ("added", &outcome.added),
        ("already present", &outcome.already_present),
        ("removed", &outcome.removed),
        ("not present", &outcome.not_present),
        ("invalid", &outcome.invalid),
    ];
    for (label, values) in groups {
        if !values.is_empty() {
            println!("{label}: {}", values.join(", "));
        }
    }

    if show_list {
        println!("{}:", list.json_key());
        if outcome.current.is_empty() {
            println!("- none");
        } else {
            for email in &outcome.current {
                println!("- {email}");
            }
        }
    }
}
