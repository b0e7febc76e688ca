//! Human-readable triage report

use std::collections::HashMap;
use tracing::warn;

use crate::inference::{ChatMessage, InferenceBackend};
use crate::models::{truncate_chars, Category, ClassificationResult, EmailData};
use crate::prompt::build_summary_prompt;

/// Subject characters shown in a fallback bullet
const FALLBACK_SUBJECT_CHARS: usize = 50;

fn pluralize(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Group emails by their assigned category, dropping results with no known email
pub fn group_by_category<'a>(
    emails: &'a [EmailData],
    results: &[ClassificationResult],
) -> HashMap<Category, Vec<&'a EmailData>> {
    let by_id: HashMap<&str, &EmailData> = emails.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut groups: HashMap<Category, Vec<&EmailData>> = HashMap::new();

    for result in results {
        if let Some(email) = by_id.get(result.email_id.as_str()) {
            groups.entry(result.category).or_default().push(email);
        }
    }

    groups
}

/// Normalise model output to one `• ` bullet per non-empty line
fn normalize_bullets(summary: &str) -> Vec<String> {
    summary
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let body = line.trim_start_matches(|c: char| matches!(c, '*' | '-' | '•' | ' '));
            format!("• {}", body)
        })
        .collect()
}

fn fallback_bullets(emails: &[&EmailData]) -> Vec<String> {
    emails
        .iter()
        .map(|e| {
            format!(
                "• {}: {}",
                e.sender,
                truncate_chars(&e.subject, FALLBACK_SUBJECT_CHARS)
            )
        })
        .collect()
}

/// Build the report shown to the operator before review
///
/// Important categories get a header and one model-written bullet per email;
/// if the model call fails the bullets fall back to sender and subject. The
/// low-value categories only get a count.
pub async fn generate_summaries(
    backend: &dyn InferenceBackend,
    emails: &[EmailData],
    results: &[ClassificationResult],
    model: &str,
) -> String {
    let groups = group_by_category(emails, results);
    let mut lines: Vec<String> = Vec::new();

    for category in Category::IMPORTANT {
        let Some(members) = groups.get(&category).filter(|m| !m.is_empty()) else {
            continue;
        };
        let count = members.len();

        lines.push(String::new());
        lines.push(format!(
            "{} ({} email{}):",
            category.display_name(),
            count,
            pluralize(count)
        ));

        let owned: Vec<EmailData> = members.iter().map(|e| (*e).clone()).collect();
        let prompt = build_summary_prompt(&owned);

        match backend.chat(model, &[ChatMessage::user(prompt)]).await {
            Ok(response) => lines.extend(normalize_bullets(&response.message.content)),
            Err(e) => {
                warn!("Summary for {} failed, listing subjects instead: {}", category, e);
                lines.extend(fallback_bullets(members));
            }
        }
    }

    for category in Category::LOW_VALUE {
        if let Some(members) = groups.get(&category).filter(|m| !m.is_empty()) {
            let count = members.len();
            lines.push(String::new());
            lines.push(format!("{}: {} email{}", category, count, pluralize(count)));
        }
    }

    lines.join("\n")
}
