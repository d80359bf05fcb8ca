//! Fallback reply templates and signature handling.

use crate::jmap::types::Email;

use super::Priority;

/// Markers that start a trailing signature block (matched case-insensitively
/// at the beginning of a line, with or without a trailing comma).
const SIGNATURE_MARKERS: &[&str] = &[
    "regards",
    "best",
    "sincerely",
    "thanks",
    "thank you",
    "cheers",
    "best regards",
    "kind regards",
    "with appreciation",
    "sent from",
];

/// Template reply used when the assistant is disabled or fails, with the
/// configured signature appended.
pub fn compose_auto_reply(email: &Email, priority: Priority, signature: Option<&str>) -> String {
    let subject = {
        let trimmed = email.subject_str().trim();
        if trimmed.is_empty() {
            "your message"
        } else {
            trimmed
        }
    };

    let (first_line, second_line) = match priority {
        Priority::High => (
            format!(
                "Thanks for your email about \"{subject}\". I received this and I'm prioritizing it now."
            ),
            "I'll follow up shortly with a full response.".to_string(),
        ),
        Priority::Medium => (
            format!(
                "Thanks for the note about \"{subject}\". I received it and will review it shortly."
            ),
            "I'll send a full response after I've gone through the details.".to_string(),
        ),
        Priority::Low => (
            format!("Thanks for sharing this update about \"{subject}\"."),
            "I've received it and will follow up if anything is needed from my side.".to_string(),
        ),
    };

    append_signature(&format!("{first_line}\n\n{second_line}"), signature)
}

/// Append the configured signature, stripping any trailing signature already
/// present first. Appending twice yields the same text as appending once.
pub fn append_signature(reply_text: &str, signature: Option<&str>) -> String {
    let signature = match signature.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => return reply_text.to_string(),
    };

    let reply = reply_text.trim_end();
    if reply.is_empty() {
        return signature.to_string();
    }

    let body = strip_trailing_signature(reply);
    if body.ends_with(signature) {
        return body;
    }
    if body.is_empty() {
        return signature.to_string();
    }
    format!("{}\n\n{signature}", body.trim_end())
}

/// Remove a trailing signature block: either everything from a `--`
/// separator line down, or a marker-led closing (plus the contiguous
/// non-blank lines directly above it, which carry the name).
fn strip_trailing_signature(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return text.to_string();
    }

    for idx in (0..lines.len()).rev() {
        let candidate = lines[idx].trim();
        if candidate.is_empty() {
            continue;
        }
        if candidate == "--" {
            return lines[..idx].join("\n").trim_end().to_string();
        }
    }

    for idx in (0..lines.len()).rev() {
        let lower = lines[idx].trim().to_lowercase();
        if SIGNATURE_MARKERS.iter().any(|m| lower.starts_with(m)) {
            let mut start = idx;
            while start > 0 && !lines[start - 1].trim().is_empty() {
                start -= 1;
            }
            return lines[..start].join("\n").trim_end().to_string();
        }
    }

    text.to_string()
}
