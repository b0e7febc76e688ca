//! Email classification through the local model
//!
//! Classification is fail-open: any model or transport problem produces
//! [`Category::Fyi`] with a diagnostic reason, so no email is ever dropped from
//! the batch and nothing destructive happens on ambiguity.

use serde_json::Value;
use std::io::Write;
use tracing::{debug, warn};

use crate::inference::{ChatMessage, InferenceBackend};
use crate::models::{Category, ClassificationResult, EmailData};
use crate::prompt::build_classification_prompt;

/// Called after every email with `(completed, total)`
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Turn raw model text into a category and reason
///
/// Never fails. Leading and trailing prose around the JSON object is ignored.
pub fn parse_classification_response(response: &str) -> (Category, String) {
    match decode_classification(response) {
        Ok(parsed) => parsed,
        Err(e) => (Category::Fyi, format!("Failed to parse response: {}", e)),
    }
}

fn decode_classification(response: &str) -> std::result::Result<(Category, String), String> {
    let trimmed = response.trim();
    let candidate = match trimmed.find('{') {
        Some(start) => {
            let end = trimmed
                .rfind('}')
                .filter(|end| *end > start)
                .ok_or_else(|| "unterminated JSON object".to_string())?;
            &trimmed[start..=end]
        }
        None => trimmed,
    };

    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| e.to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    let reason = match object.get("reason") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let category = match object.get("category") {
        None => Category::Fyi,
        Some(Value::String(name)) => match name.parse::<Category>() {
            Ok(category) => category,
            Err(unknown) => return Ok((Category::Fyi, unknown.to_string())),
        },
        Some(other) => return Ok((Category::Fyi, format!("Unknown category: {}", other))),
    };

    Ok((category, reason))
}

/// Classify one email with a single inference attempt
pub async fn classify_single_email(
    backend: &dyn InferenceBackend,
    email: &EmailData,
    model: &str,
) -> ClassificationResult {
    let prompt = build_classification_prompt(email);

    match backend.chat(model, &[ChatMessage::user(prompt)]).await {
        Ok(response) => {
            let (category, reason) = parse_classification_response(&response.message.content);
            debug!("Classified {} as {} ({})", email.id, category, reason);
            ClassificationResult::new(email.id.clone(), category, reason)
        }
        Err(e) => {
            warn!("Classification of {} failed: {}", email.id, e);
            ClassificationResult::new(
                email.id.clone(),
                Category::Fyi,
                format!("Classification failed: {}", e),
            )
        }
    }
}

/// Classify a batch sequentially, preserving input order
///
/// Without a callback, progress is written as a single rewritten line on stdout.
pub async fn classify_emails(
    backend: &dyn InferenceBackend,
    emails: &[EmailData],
    model: &str,
    progress: Option<ProgressCallback<'_>>,
) -> Vec<ClassificationResult> {
    let total = emails.len();
    let mut results = Vec::with_capacity(total);

    for (i, email) in emails.iter().enumerate() {
        results.push(classify_single_email(backend, email, model).await);

        match progress {
            Some(callback) => callback(i + 1, total),
            None => {
                let mut stdout = std::io::stdout();
                let _ = write!(stdout, "\rClassifying... [{}/{}]", i + 1, total);
                let _ = stdout.flush();
            }
        }
    }

    if progress.is_none() && total > 0 {
        println!();
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TriageError};
    use crate::inference::ChatResponse;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    mockall::mock! {
        pub Backend {}

        #[async_trait]
        impl InferenceBackend for Backend {
            async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse>;
            async fn list_models(&self) -> Result<Vec<String>>;
        }
    }

    fn email(id: &str) -> EmailData {
        EmailData {
            id: id.to_string(),
            thread_id: format!("thread_{}", id),
            sender: "john@example.com".to_string(),
            subject: "Meeting Thursday?".to_string(),
            snippet: "Are you free?".to_string(),
            date: "2026-02-03".to_string(),
        }
    }

    fn reply(content: &str) -> ChatResponse {
        ChatResponse {
            message: ChatMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
        }
    }

    #[test]
    fn test_parse_valid_json() {
        let (category, reason) =
            parse_classification_response(r#"{"category": "NEEDS_REPLY", "reason": "r"}"#);
        assert_eq!(category, Category::NeedsReply);
        assert_eq!(reason, "r");
    }

    #[test]
    fn test_parse_json_surrounded_by_prose() {
        let raw = "Sure! Here you go:\n{\"category\": \"ARCHIVE\", \"reason\": \"Newsletter\"}\nHope that helps.";
        assert_eq!(
            parse_classification_response(raw),
            (Category::Archive, "Newsletter".to_string())
        );
    }

    #[test]
    fn test_parse_missing_fields_use_defaults() {
        assert_eq!(
            parse_classification_response("{}"),
            (Category::Fyi, String::new())
        );
        assert_eq!(
            parse_classification_response(r#"{"category": "IGNORE"}"#),
            (Category::Ignore, String::new())
        );
    }

    #[test]
    fn test_parse_unknown_category() {
        let (category, reason) =
            parse_classification_response(r#"{"category": "URGENT", "reason": "x"}"#);
        assert_eq!(category, Category::Fyi);
        assert_eq!(reason, "Unknown category: URGENT");
    }

    #[test]
    fn test_parse_non_string_category() {
        let (category, reason) = parse_classification_response(r#"{"category": 5}"#);
        assert_eq!(category, Category::Fyi);
        assert!(reason.contains("Unknown category: 5"));
    }

    #[test]
    fn test_parse_non_string_reason_is_rendered() {
        let (category, reason) =
            parse_classification_response(r#"{"category": "FYI", "reason": 42}"#);
        assert_eq!(category, Category::Fyi);
        assert_eq!(reason, "42");
    }

    #[test]
    fn test_parse_malformed() {
        for raw in ["", "not json at all", "{broken", "{\"category\": }", "[1, 2]"] {
            let (category, reason) = parse_classification_response(raw);
            assert_eq!(category, Category::Fyi, "input {:?}", raw);
            assert!(
                reason.starts_with("Failed to parse response: "),
                "input {:?} gave {:?}",
                raw,
                reason
            );
        }
    }

    proptest! {
        #[test]
        fn prop_parse_never_fails(raw in ".*") {
            let (_, reason) = parse_classification_response(&raw);
            // Only a well-formed object with a valid category may have an empty reason
            if reason.is_empty() {
                prop_assert!(raw.contains('{'), "empty reason for {:?}", raw);
            }
        }

        #[test]
        fn prop_unknown_categories_collapse_to_fyi(name in "[a-z][a-z_ ]{0,20}") {
            let raw = serde_json::json!({"category": name, "reason": "r"}).to_string();
            let (category, reason) = parse_classification_response(&raw);
            prop_assert_eq!(category, Category::Fyi);
            prop_assert!(reason.contains(&name));
        }
    }

    #[tokio::test]
    async fn test_classify_single_email_success() {
        let mut backend = MockBackend::new();
        backend
            .expect_chat()
            .withf(|model, messages| {
                model == "mistral:7b"
                    && messages.len() == 1
                    && messages[0].role == "user"
                    && messages[0].content.contains("Subject: Meeting Thursday?")
            })
            .times(1)
            .returning(|_, _| Ok(reply(r#"{"category": "NEEDS_REPLY", "reason": "Asks a question"}"#)));

        let result = classify_single_email(&backend, &email("abc"), "mistral:7b").await;
        assert_eq!(result.email_id, "abc");
        assert_eq!(result.category, Category::NeedsReply);
        assert_eq!(result.reason, "Asks a question");
        assert!(!result.skip);
    }

    #[tokio::test]
    async fn test_classify_single_email_backend_failure() {
        let mut backend = MockBackend::new();
        backend
            .expect_chat()
            .times(1)
            .returning(|_, _| Err(TriageError::NetworkError("Connection refused".to_string())));

        let result = classify_single_email(&backend, &email("abc"), "mistral:7b").await;
        assert_eq!(result.category, Category::Fyi);
        assert!(result.reason.starts_with("Classification failed: "));
        assert!(result.reason.contains("Connection refused"));
        assert!(!result.skip);
    }

    #[tokio::test]
    async fn test_classify_emails_preserves_order_and_reports_progress() {
        let mut backend = MockBackend::new();
        backend.expect_chat().times(3).returning(|_, messages| {
            let category = if messages[0].content.contains("From: boss@") {
                "NEEDS_ACTION"
            } else {
                "ARCHIVE"
            };
            Ok(reply(&format!(r#"{{"category": "{}", "reason": "r"}}"#, category)))
        });

        let mut emails = vec![email("1"), email("2"), email("3")];
        emails[1].sender = "boss@work.com".to_string();

        let seen = Mutex::new(Vec::new());
        let callback: ProgressCallback = &|done, total| seen.lock().unwrap().push((done, total));
        let results = classify_emails(&backend, &emails, "mistral:7b", Some(callback)).await;

        let ids: Vec<&str> = results.iter().map(|r| r.email_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(results[1].category, Category::NeedsAction);
        assert_eq!(results[0].category, Category::Archive);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_classify_emails_all_failures_default_to_fyi() {
        let mut backend = MockBackend::new();
        backend
            .expect_chat()
            .times(4)
            .returning(|_, _| Err(TriageError::InferenceError("HTTP 500".to_string())));

        let emails: Vec<EmailData> = (0..4).map(|i| email(&i.to_string())).collect();
        let noop: ProgressCallback = &|_, _| {};
        let results = classify_emails(&backend, &emails, "m", Some(noop)).await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.category == Category::Fyi));
    }

    #[tokio::test]
    async fn test_classify_emails_empty_input() {
        let backend = MockBackend::new();
        let results = classify_emails(&backend, &[], "m", None).await;
        assert!(results.is_empty());
    }
}
