//! Operator edits applied to classification results before they are acted on

use crate::models::{truncate_chars, Category, ClassificationResult, EmailData};

const SENDER_COLUMN: usize = 30;
const SUBJECT_COLUMN: usize = 40;

/// One category bucket shown in the review menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryGroup {
    pub category: Category,
    /// Indices into the results slice
    pub indices: Vec<usize>,
}

/// Group result indices by category in order of first appearance
///
/// Skipped results and results whose email is unknown are left out.
pub fn group_for_review(
    emails: &[EmailData],
    results: &[ClassificationResult],
) -> Vec<CategoryGroup> {
    let known: std::collections::HashSet<&str> = emails.iter().map(|e| e.id.as_str()).collect();
    let mut groups: Vec<CategoryGroup> = Vec::new();

    for (index, result) in results.iter().enumerate() {
        if result.skip || !known.contains(result.email_id.as_str()) {
            continue;
        }
        match groups.iter_mut().find(|g| g.category == result.category) {
            Some(group) => group.indices.push(index),
            None => groups.push(CategoryGroup {
                category: result.category,
                indices: vec![index],
            }),
        }
    }

    groups
}

/// Move a result to another category; returns false for an unknown id
pub fn reclassify(results: &mut [ClassificationResult], email_id: &str, category: Category) -> bool {
    match results.iter_mut().find(|r| r.email_id == email_id) {
        Some(result) => {
            result.category = category;
            true
        }
        None => false,
    }
}

/// Exclude a result from mailbox changes; returns false for an unknown id
pub fn mark_skipped(results: &mut [ClassificationResult], email_id: &str) -> bool {
    match results.iter_mut().find(|r| r.email_id == email_id) {
        Some(result) => {
            result.skip = true;
            true
        }
        None => false,
    }
}

/// `<sender> - <subject>` with both columns truncated for menu display
pub fn email_label(email: &EmailData) -> String {
    format!(
        "{} - {}",
        truncate_chars(&email.sender, SENDER_COLUMN),
        truncate_chars(&email.subject, SUBJECT_COLUMN)
    )
}
