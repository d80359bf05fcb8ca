//! Email address normalization and sender-identity helpers.

use std::collections::HashSet;

use crate::config::MailConfig;
use crate::jmap::types::Email;

/// Normalize an address for comparison and storage: lowercase, trim, strip
/// a leading `mailto:`, and extract the inner part of a
/// `Display Name <local@host>` form when present.
pub fn normalize(value: &str) -> String {
    let mut normalized = value.trim().to_lowercase();

    if let Some(rest) = normalized.strip_prefix("mailto:") {
        normalized = rest.to_string();
    }

    let lt = normalized.rfind('<');
    let gt = normalized.rfind('>');
    if let (Some(lt), Some(gt)) = (lt, gt) {
        if gt > lt {
            normalized = normalized[lt + 1..gt].trim().to_string();
        }
    }

    normalized
}

/// Split raw values on `,`, `;`, and newlines, normalize each piece, and
/// deduplicate preserving first-seen order.
pub fn split_list<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut ordered: Vec<String> = Vec::new();

    for raw in values {
        for part in raw.as_ref().split([',', ';', '\n']) {
            let normalized = normalize(part);
            if normalized.is_empty() || seen.contains(&normalized) {
                continue;
            }
            seen.insert(normalized.clone());
            ordered.push(normalized);
        }
    }

    ordered
}

/// The operator's configured identities from `mail.sender_emails`.
///
/// Accepts either one delimited string or a list; each entry may itself be
/// comma/semicolon/newline separated.
pub fn sender_identities(mail: &MailConfig) -> HashSet<String> {
    match &mail.sender_emails {
        Some(values) => split_list(values.values()).into_iter().collect(),
        None => HashSet::new(),
    }
}

/// True when any recipient of the message (always `to`; `cc` only when
/// `include_cc`) matches one of the identities. Empty identity sets never
/// match.
pub fn targets_identity(email: &Email, identities: &HashSet<String>, include_cc: bool) -> bool {
    if identities.is_empty() {
        return false;
    }

    let cc: &[_] = if include_cc { email.cc_list() } else { &[] };

    email
        .to_list()
        .iter()
        .chain(cc.iter())
        .filter_map(|person| person.email.as_deref())
        .any(|addr| {
            let normalized = normalize(addr);
            !normalized.is_empty() && identities.contains(&normalized)
        })
}
