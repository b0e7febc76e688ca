use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of characters kept from a message snippet
pub const SNIPPET_MAX_CHARS: usize = 200;

/// Header data for one inbox message, as fetched from the mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailData {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    pub date: String,
}

/// Action category assigned to an email
///
/// The set is closed. Anything the model returns outside of it collapses to
/// [`Category::Fyi`], which keeps the email in the inbox for a later read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    NeedsReply,
    NeedsAction,
    Fyi,
    Archive,
    Ignore,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::NeedsReply,
        Category::NeedsAction,
        Category::Fyi,
        Category::Archive,
        Category::Ignore,
    ];

    /// Categories that get a per-email summary, in report order
    pub const IMPORTANT: [Category; 3] =
        [Category::NeedsReply, Category::NeedsAction, Category::Fyi];

    /// Categories reported as a count only, in report order
    pub const LOW_VALUE: [Category; 2] = [Category::Archive, Category::Ignore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NeedsReply => "NEEDS_REPLY",
            Category::NeedsAction => "NEEDS_ACTION",
            Category::Fyi => "FYI",
            Category::Archive => "ARCHIVE",
            Category::Ignore => "IGNORE",
        }
    }

    /// Name with underscores replaced by spaces, e.g. `NEEDS REPLY`
    pub fn display_name(&self) -> String {
        self.as_str().replace('_', " ")
    }

    /// Whether applying this category removes the email from the inbox
    pub fn should_archive(&self) -> bool {
        matches!(self, Category::Archive | Category::Ignore)
    }

    /// Default Gmail label for the category
    pub fn default_label(&self) -> &'static str {
        match self {
            Category::NeedsReply => "Auto/Needs Reply",
            Category::NeedsAction => "Auto/Needs Action",
            Category::Fyi => "Auto/FYI",
            Category::Archive => "Auto/Archive",
            Category::Ignore => "Auto/Ignore",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the five category names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Outcome of classifying one email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub email_id: String,
    pub category: Category,
    pub reason: String,
    /// Leave the mailbox untouched for this email regardless of category
    #[serde(default)]
    pub skip: bool,
}

impl ClassificationResult {
    pub fn new(email_id: impl Into<String>, category: Category, reason: impl Into<String>) -> Self {
        Self {
            email_id: email_id.into(),
            category,
            reason: reason.into(),
            skip: false,
        }
    }
}

/// Durable projection of a reviewed classification awaiting application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEmail {
    pub account: String,
    pub email_id: String,
    pub category: Category,
    pub skip: bool,
    pub subject: String,
    pub sender: String,
}

/// The single saved-for-later snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingResults {
    pub created_at: DateTime<Utc>,
    pub results: Vec<PendingEmail>,
}

/// Truncate to at most `max_chars` characters (UTF-8 safe, no ellipsis)
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
