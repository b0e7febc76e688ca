//! Gmail API client with retry logic

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use google_gmail1::api::{Label, Message, ModifyMessageRequest};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::GmailHub;
use crate::config::LabelConfig;
use crate::error::{Result, TriageError};
use crate::models::{truncate_chars, EmailData, SNIPPET_MAX_CHARS};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Gmail caps `messages.list` pages at 500 ids
const MAX_PAGE_SIZE: usize = 500;

/// Parallel `messages.get` calls while fetching a batch
const FETCH_CONCURRENCY: usize = 10;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Mailbox operations used by the triage pipeline
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Ids of messages matching `query`, at most `max_results`
    async fn list_message_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>>;

    /// Sender, subject, snippet and date of one message
    async fn get_email(&self, id: &str) -> Result<EmailData>;

    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a visible label, returning its id
    async fn create_label(&self, name: &str) -> Result<String>;

    async fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()>;

    /// Address of the authenticated account
    async fn profile_email(&self) -> Result<String>;
}

/// Query for inbox messages that carry none of the triage labels
///
/// `is:inbox AND NOT label:"Auto/Needs Reply" AND NOT label:"Auto/FYI" ...`
pub fn build_exclusion_query(labels: &LabelConfig) -> String {
    let exclusions = labels
        .iter()
        .map(|(_, name)| format!("NOT label:\"{}\"", name))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("is:inbox AND {}", exclusions)
}

/// Fetch emails in input order with bounded concurrency
///
/// Messages that fail to load are logged and left out.
pub async fn fetch_emails(client: &dyn MailboxClient, ids: &[String]) -> Vec<EmailData> {
    stream::iter(ids)
        .map(|id| async move { (id, client.get_email(id).await) })
        .buffered(FETCH_CONCURRENCY)
        .filter_map(|(id, result)| async move {
            match result {
                Ok(email) => Some(email),
                Err(e) => {
                    warn!("Skipping message {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
        .await
}

/// Fetch the untriaged inbox messages for one run
pub async fn fetch_untriaged(
    client: &dyn MailboxClient,
    labels: &LabelConfig,
    max_emails: usize,
) -> Result<Vec<EmailData>> {
    let query = build_exclusion_query(labels);
    debug!("Candidate query: {}", query);

    let ids = client.list_message_ids(&query, max_emails).await?;
    info!("Found {} untriaged messages", ids.len());

    Ok(fetch_emails(client, &ids).await)
}

/// Production Gmail client with retry logic
pub struct GmailMailboxClient {
    hub: GmailHub,
}

impl GmailMailboxClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    /// Check if an error is retryable
    fn should_retry(error: &TriageError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(operation_name: &str, max_retries: u32, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    if let TriageError::RateLimitExceeded { retry_after } = e {
                        delay = delay.max(Duration::from_secs(retry_after));
                    }
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Bound a single API call so a stalled connection cannot hang the run
    async fn timed<T, Fut>(operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(API_TIMEOUT, call).await {
            Ok(result) => result.map_err(TriageError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, API_TIMEOUT);
                Err(TriageError::NetworkError(format!(
                    "API call timed out after {:?}",
                    API_TIMEOUT
                )))
            }
        }
    }
}

/// Parse a metadata-format Gmail message into [`EmailData`]
pub fn parse_email_data(msg: Message) -> Result<EmailData> {
    let id = msg
        .id
        .ok_or_else(|| TriageError::InvalidMessageFormat("Missing message ID".to_string()))?;
    let thread_id = msg.thread_id.unwrap_or_default();

    let mut sender = None;
    let mut subject = None;
    let mut date = None;

    let headers = msg.payload.and_then(|p| p.headers).unwrap_or_default();
    for header in headers {
        if let (Some(name), Some(value)) = (header.name, header.value) {
            match name.to_lowercase().as_str() {
                "from" => sender = Some(value),
                "subject" => subject = Some(value),
                "date" => date = Some(value),
                _ => {}
            }
        }
    }

    let snippet = msg.snippet.unwrap_or_default();

    Ok(EmailData {
        id,
        thread_id,
        sender: sender.unwrap_or_else(|| "Unknown".to_string()),
        subject: subject.unwrap_or_else(|| "(no subject)".to_string()),
        snippet: truncate_chars(&snippet, SNIPPET_MAX_CHARS).to_string(),
        date: date.unwrap_or_default(),
    })
}

#[async_trait]
impl MailboxClient for GmailMailboxClient {
    async fn list_message_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        while all_ids.len() < max_results {
            let page_size = (max_results - all_ids.len()).min(MAX_PAGE_SIZE) as u32;
            let token = page_token.clone();

            let (_, response) = Self::with_retry("list_message_ids", 3, || {
                let mut call = self
                    .hub
                    .users()
                    .messages_list("me")
                    .q(query)
                    .max_results(page_size);
                if let Some(token) = token.as_deref() {
                    call = call.page_token(token);
                }
                Self::timed("messages.list", call.add_scope(MODIFY_SCOPE).doit())
            })
            .await?;

            all_ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        all_ids.truncate(max_results);
        Ok(all_ids)
    }

    async fn get_email(&self, id: &str) -> Result<EmailData> {
        let (_, msg) = Self::with_retry("get_email", 3, || {
            Self::timed(
                "messages.get",
                self.hub
                    .users()
                    .messages_get("me", id)
                    .format("metadata")
                    .add_metadata_headers("From")
                    .add_metadata_headers("Subject")
                    .add_metadata_headers("Date")
                    .add_scope(MODIFY_SCOPE)
                    .doit(),
            )
        })
        .await?;

        parse_email_data(msg)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let (_, response) = Self::with_retry("list_labels", 3, || {
            debug!("Calling Gmail API to list labels...");
            Self::timed(
                "labels.list",
                self.hub.users().labels_list("me").add_scope(LABELS_SCOPE).doit(),
            )
        })
        .await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let (_, created_label) = Self::with_retry("create_label", 3, || {
            let label = Label {
                name: Some(name.to_string()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };
            Self::timed(
                "labels.create",
                self.hub.users().labels_create(label, "me").add_scope(LABELS_SCOPE).doit(),
            )
        })
        .await?;

        created_label
            .id
            .ok_or_else(|| TriageError::LabelError("Created label has no ID".to_string()))
    }

    async fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()> {
        Self::with_retry("modify_labels", 3, || {
            let request = ModifyMessageRequest {
                add_label_ids: (!add.is_empty()).then(|| add.to_vec()),
                remove_label_ids: (!remove.is_empty()).then(|| remove.to_vec()),
            };
            Self::timed(
                "messages.modify",
                self.hub
                    .users()
                    .messages_modify(request, "me", message_id)
                    .add_scope(MODIFY_SCOPE)
                    .doit(),
            )
        })
        .await?;

        Ok(())
    }

    async fn profile_email(&self) -> Result<String> {
        let (_, profile) = Self::with_retry("get_profile", 3, || {
            Self::timed(
                "users.getProfile",
                self.hub.users().get_profile("me").add_scope(MODIFY_SCOPE).doit(),
            )
        })
        .await?;

        profile
            .email_address
            .ok_or_else(|| TriageError::ApiError("Profile has no email address".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use google_gmail1::api::{MessagePart, MessagePartHeader};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    mockall::mock! {
        pub Mailbox {}

        #[async_trait]
        impl MailboxClient for Mailbox {
            async fn list_message_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
            async fn get_email(&self, id: &str) -> Result<EmailData>;
            async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
            async fn create_label(&self, name: &str) -> Result<String>;
            async fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()>;
            async fn profile_email(&self) -> Result<String>;
        }
    }

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    fn message(id: &str, headers: Vec<MessagePartHeader>, snippet: &str) -> Message {
        Message {
            id: Some(id.to_string()),
            thread_id: Some(format!("thread_{}", id)),
            snippet: Some(snippet.to_string()),
            payload: Some(MessagePart {
                headers: Some(headers),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn email(id: &str) -> EmailData {
        EmailData {
            id: id.to_string(),
            thread_id: format!("thread_{}", id),
            sender: "a@example.com".to_string(),
            subject: format!("Subject {}", id),
            snippet: String::new(),
            date: String::new(),
        }
    }

    #[test]
    fn test_build_exclusion_query() {
        let query = build_exclusion_query(&LabelConfig::default());
        assert_eq!(
            query,
            "is:inbox AND NOT label:\"Auto/Needs Reply\" AND NOT label:\"Auto/Needs Action\" \
             AND NOT label:\"Auto/FYI\" AND NOT label:\"Auto/Archive\" AND NOT label:\"Auto/Ignore\""
        );
    }

    #[test]
    fn test_build_exclusion_query_custom_label() {
        let mut labels = LabelConfig::default();
        labels.set_label(Category::Fyi, "Read Later".to_string());
        assert!(build_exclusion_query(&labels).contains("NOT label:\"Read Later\""));
    }

    #[test]
    fn test_parse_email_data_headers() {
        let msg = message(
            "m1",
            vec![
                header("From", "John Doe <john@example.com>"),
                header("Subject", "Lunch?"),
                header("Date", "Mon, 1 Jan 2024 10:00:00 -0800"),
                header("To", "me@example.com"),
            ],
            "Want to grab lunch",
        );

        let email = parse_email_data(msg).unwrap();
        assert_eq!(email.id, "m1");
        assert_eq!(email.thread_id, "thread_m1");
        assert_eq!(email.sender, "John Doe <john@example.com>");
        assert_eq!(email.subject, "Lunch?");
        assert_eq!(email.date, "Mon, 1 Jan 2024 10:00:00 -0800");
        assert_eq!(email.snippet, "Want to grab lunch");
    }

    #[test]
    fn test_parse_email_data_defaults() {
        let email = parse_email_data(message("m2", vec![], &"x".repeat(300))).unwrap();
        assert_eq!(email.sender, "Unknown");
        assert_eq!(email.subject, "(no subject)");
        assert_eq!(email.date, "");
        assert_eq!(email.snippet.chars().count(), 200);
    }

    #[test]
    fn test_parse_email_data_requires_id() {
        let mut msg = message("m3", vec![], "");
        msg.id = None;
        assert!(matches!(
            parse_email_data(msg),
            Err(TriageError::InvalidMessageFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_emails_preserves_order_and_skips_failures() {
        let mut client = MockMailbox::new();
        client.expect_get_email().times(4).returning(|id| {
            if id == "gone" {
                Err(TriageError::MessageNotFound(id.to_string()))
            } else {
                Ok(email(id))
            }
        });

        let ids: Vec<String> = ["c", "a", "gone", "b"].iter().map(|s| s.to_string()).collect();
        let emails = fetch_emails(&client, &ids).await;

        let fetched: Vec<&str> = emails.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(fetched, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_untriaged_uses_query_and_cap() {
        let mut client = MockMailbox::new();
        client
            .expect_list_message_ids()
            .withf(|query, max| query.starts_with("is:inbox AND NOT label:") && *max == 2)
            .times(1)
            .returning(|_, _| Ok(vec!["1".to_string(), "2".to_string()]));
        client.expect_get_email().returning(|id| Ok(email(id)));

        let emails = fetch_untriaged(&client, &LabelConfig::default(), 2).await.unwrap();
        assert_eq!(emails.len(), 2);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = GmailMailboxClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&counter);
            async move {
                if count.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TriageError::NetworkError("Connection timeout".to_string()))
                } else {
                    Ok("success".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_fails_on_permanent_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = GmailMailboxClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&counter);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(TriageError::AuthError("Invalid credentials".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_all_retries() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = GmailMailboxClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&counter);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(TriageError::RateLimitExceeded { retry_after: 1 })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
    }
}
