//! Instruction templates sent to the local model

use crate::models::{truncate_chars, EmailData};

/// Characters of snippet included per email in a summary prompt
const SUMMARY_SNIPPET_CHARS: usize = 100;

const CLASSIFICATION_TEMPLATE: &str = r#"Classify this email into exactly one category:
- NEEDS_REPLY: Requires a response from me
- NEEDS_ACTION: Requires me to do something (not a reply)
- FYI: Informational, read later, no action needed
- ARCHIVE: Low value, newsletters I don't read, notifications
- IGNORE: Spam, marketing, completely irrelevant

Email:
From: {sender}
Subject: {subject}
Preview: {snippet}
Date: {date}

Respond with JSON only:
{"category": "...", "reason": "one sentence"}"#;

const SUMMARY_TEMPLATE: &str = r#"Summarize these emails in a bullet list. Each bullet should be one short sentence describing what the email is about.

Emails:
{emails}

Respond with bullet points only, one per email."#;

/// Render the classification instruction for one email
pub fn build_classification_prompt(email: &EmailData) -> String {
    // Single pass so placeholders inside email text are never re-expanded
    let mut out = String::with_capacity(CLASSIFICATION_TEMPLATE.len() + email.snippet.len());
    let mut rest = CLASSIFICATION_TEMPLATE;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (value, consumed) = if tail.starts_with("{sender}") {
            (email.sender.as_str(), "{sender}".len())
        } else if tail.starts_with("{subject}") {
            (email.subject.as_str(), "{subject}".len())
        } else if tail.starts_with("{snippet}") {
            (email.snippet.as_str(), "{snippet}".len())
        } else if tail.starts_with("{date}") {
            (email.date.as_str(), "{date}".len())
        } else {
            ("{", 1)
        };
        out.push_str(value);
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

/// Render the summary instruction for a group of emails
pub fn build_summary_prompt(emails: &[EmailData]) -> String {
    let email_list = emails
        .iter()
        .map(|e| {
            format!(
                "- From: {}, Subject: {}, Preview: {}",
                e.sender,
                e.subject,
                truncate_chars(&e.snippet, SUMMARY_SNIPPET_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    SUMMARY_TEMPLATE.replacen("{emails}", &email_list, 1)
}
