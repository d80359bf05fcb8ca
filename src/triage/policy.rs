//! Decision rules gating draft creation, archival, and VIP auto-promotion.

use std::collections::HashSet;

use crate::address;
use crate::config::AutomationConfig;
use crate::error::Result;
use crate::jmap::types::Email;
use crate::store::StateStore;

use super::Priority;

/// All gates must hold for a reply draft to be created:
/// apply mode, auto-draft enabled, sender not blocked, no existing draft,
/// message addressed directly (`to`, not `cc`) to one of the operator's
/// identities, priority at least the configured minimum, and, when
/// `draft_actionable_only` is set, an actionable classification.
///
/// An empty identity set fails closed: no draft.
#[allow(clippy::too_many_arguments)]
pub fn should_create_draft(
    apply_mode: bool,
    automation: &AutomationConfig,
    blocked_senders: &HashSet<String>,
    identities: &HashSet<String>,
    email: &Email,
    sender_email: &str,
    priority: Priority,
    actionable: bool,
    has_existing_draft: bool,
) -> bool {
    if !apply_mode || !automation.auto_draft {
        return false;
    }
    if !sender_email.is_empty() && blocked_senders.contains(sender_email) {
        return false;
    }
    if has_existing_draft {
        return false;
    }
    if !address::targets_identity(email, identities, false) {
        return false;
    }
    if priority < automation.min_priority_for_draft {
        return false;
    }
    if automation.draft_actionable_only && !actionable {
        return false;
    }
    true
}

/// Archive when apply mode is on and the priority is in the configured
/// archive set. Archive takes precedence over draft creation.
pub fn should_archive(apply_mode: bool, automation: &AutomationConfig, priority: Priority) -> bool {
    apply_mode && automation.archive_priorities().contains(&priority)
}

/// Promote a sender to VIP once their high-priority history reaches the
/// threshold.
///
/// Fires only when this message is `high` and the previously stored
/// priority was not, so a long thread from one sender cannot re-count the
/// same message. The inserted row is visible to subsequent cycles; the
/// current cycle's classification is unchanged.
pub fn maybe_auto_promote_vip(
    store: &StateStore,
    threshold: u32,
    sender_email: &str,
    previous_priority: Option<Priority>,
    current_priority: Priority,
) -> Result<bool> {
    if threshold == 0 {
        return Ok(false);
    }

    let normalized = address::normalize(sender_email);
    if normalized.is_empty() || !normalized.contains('@') {
        return Ok(false);
    }
    if current_priority != Priority::High {
        return Ok(false);
    }
    if previous_priority == Some(Priority::High) {
        return Ok(false);
    }

    let prior_count = store.count_high_priority_from(&normalized)?;
    if prior_count + 1 < threshold {
        return Ok(false);
    }

    if store.is_vip(&normalized)? {
        return Ok(false);
    }

    let note = format!(
        "auto-promoted after {} high-priority emails",
        prior_count + 1
    );
    store.upsert_auto_vip(&normalized, &note)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_temp;
    use crate::triage::MessageStatus;
    use serde_json::json;

    fn email(value: serde_json::Value) -> Email {
        serde_json::from_value(value).unwrap()
    }

    fn identities(addrs: &[&str]) -> HashSet<String> {
        addrs.iter().map(|a| a.to_string()).collect()
    }

    fn draftable_email() -> Email {
        email(json!({
            "id": "m1",
            "from": [{"email": "boss@example.com"}],
            "to": [{"email": "me@example.com"}]
        }))
    }

    #[test]
    fn draft_requires_apply_mode() {
        let automation = AutomationConfig::default();
        let email = draftable_email();
        let ids = identities(&["me@example.com"]);

        assert!(should_create_draft(
            true,
            &automation,
            &HashSet::new(),
            &ids,
            &email,
            "boss@example.com",
            Priority::High,
            true,
            false,
        ));
        assert!(!should_create_draft(
            false,
            &automation,
            &HashSet::new(),
            &ids,
            &email,
            "boss@example.com",
            Priority::High,
            true,
            false,
        ));
    }

    #[test]
    fn cc_only_self_address_does_not_qualify() {
        let automation = AutomationConfig::default();
        let msg = email(json!({
            "id": "m1",
            "from": [{"email": "boss@example.com"}],
            "to": [{"email": "other@example.com"}],
            "cc": [{"email": "me@example.com"}]
        }));
        let ids = identities(&["me@example.com"]);

        assert!(!should_create_draft(
            true,
            &automation,
            &HashSet::new(),
            &ids,
            &msg,
            "boss@example.com",
            Priority::High,
            true,
            false,
        ));
    }

    #[test]
    fn no_identities_fails_closed() {
        let automation = AutomationConfig::default();
        let email = draftable_email();

        assert!(!should_create_draft(
            true,
            &automation,
            &HashSet::new(),
            &HashSet::new(),
            &email,
            "boss@example.com",
            Priority::High,
            true,
            false,
        ));
    }

    #[test]
    fn blocked_sender_and_existing_draft_are_gates() {
        let automation = AutomationConfig::default();
        let email = draftable_email();
        let ids = identities(&["me@example.com"]);
        let blocked: HashSet<String> = ["boss@example.com".to_string()].into_iter().collect();

        assert!(!should_create_draft(
            true,
            &automation,
            &blocked,
            &ids,
            &email,
            "boss@example.com",
            Priority::High,
            true,
            false,
        ));
        assert!(!should_create_draft(
            true,
            &automation,
            &HashSet::new(),
            &ids,
            &email,
            "boss@example.com",
            Priority::High,
            true,
            true,
        ));
    }

    #[test]
    fn min_priority_and_actionable_gates() {
        let automation = AutomationConfig::default();
        let email = draftable_email();
        let ids = identities(&["me@example.com"]);

        // Default minimum is high.
        assert!(!should_create_draft(
            true,
            &automation,
            &HashSet::new(),
            &ids,
            &email,
            "boss@example.com",
            Priority::Medium,
            true,
            false,
        ));

        // Default draft_actionable_only is on.
        assert!(!should_create_draft(
            true,
            &automation,
            &HashSet::new(),
            &ids,
            &email,
            "boss@example.com",
            Priority::High,
            false,
            false,
        ));

        let relaxed = AutomationConfig {
            min_priority_for_draft: Priority::Medium,
            draft_actionable_only: false,
            ..AutomationConfig::default()
        };
        assert!(should_create_draft(
            true,
            &relaxed,
            &HashSet::new(),
            &ids,
            &email,
            "boss@example.com",
            Priority::Medium,
            false,
            false,
        ));
    }

    #[test]
    fn archive_respects_mode_and_priority_set() {
        let automation = AutomationConfig::default();
        assert!(should_archive(true, &automation, Priority::Low));
        assert!(should_archive(true, &automation, Priority::Medium));
        assert!(!should_archive(true, &automation, Priority::High));
        assert!(!should_archive(false, &automation, Priority::Low));

        let none = AutomationConfig {
            auto_archive_priorities: Some(Vec::new()),
            ..AutomationConfig::default()
        };
        assert!(!should_archive(true, &none, Priority::Low));
    }

    fn seed_high_rows(store: &StateStore, sender: &str, count: u32) {
        for i in 0..count {
            let now = crate::store::utc_now_iso();
            store
                .upsert_state(&crate::store::TriageState {
                    email_id: format!("{sender}-m{i}"),
                    subject: String::new(),
                    sender: sender.to_string(),
                    sender_email: sender.to_string(),
                    received_at: String::new(),
                    priority: Some(Priority::High),
                    actionable: false,
                    reason: String::new(),
                    summary: String::new(),
                    reply_text: String::new(),
                    drafted: false,
                    draft_id: None,
                    status: MessageStatus::Triaged,
                    error: String::new(),
                    raw_email: String::new(),
                    first_seen_at: now.clone(),
                    last_seen_at: now.clone(),
                    updated_at: now,
                })
                .unwrap();
        }
    }

    #[test]
    fn promotion_fires_at_threshold() {
        let (_dir, store) = open_temp();
        seed_high_rows(&store, "boss@example.com", 2);

        let promoted =
            maybe_auto_promote_vip(&store, 3, "boss@example.com", None, Priority::High).unwrap();
        assert!(promoted);
        assert!(store.is_vip("boss@example.com").unwrap());
    }

    #[test]
    fn promotion_below_threshold_is_a_noop() {
        let (_dir, store) = open_temp();
        seed_high_rows(&store, "boss@example.com", 1);

        let promoted =
            maybe_auto_promote_vip(&store, 3, "boss@example.com", None, Priority::High).unwrap();
        assert!(!promoted);
        assert!(!store.is_vip("boss@example.com").unwrap());
    }

    #[test]
    fn promotion_skips_already_high_rows_and_existing_vips() {
        let (_dir, store) = open_temp();
        seed_high_rows(&store, "boss@example.com", 5);

        // Previous priority already high: re-observing the same sender's
        // message does not promote.
        assert!(!maybe_auto_promote_vip(
            &store,
            3,
            "boss@example.com",
            Some(Priority::High),
            Priority::High
        )
        .unwrap());

        store
            .add_vip_sender("boss@example.com", crate::store::VipSource::Manual)
            .unwrap();
        assert!(!maybe_auto_promote_vip(&store, 3, "boss@example.com", None, Priority::High)
            .unwrap());
    }

    #[test]
    fn promotion_requires_current_high_and_threshold() {
        let (_dir, store) = open_temp();
        seed_high_rows(&store, "boss@example.com", 5);

        assert!(!maybe_auto_promote_vip(&store, 3, "boss@example.com", None, Priority::Medium)
            .unwrap());
        assert!(!maybe_auto_promote_vip(&store, 0, "boss@example.com", None, Priority::High)
            .unwrap());
        assert!(!maybe_auto_promote_vip(&store, 3, "not-an-address", None, Priority::High)
            .unwrap());
    }
}
