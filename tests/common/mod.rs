//! Common test utilities and fixtures
#![allow(dead_code)]

use gmail_triage::actions::{ActionApplier, ApplierFactory};
use gmail_triage::client::{LabelInfo, MailboxClient};
use gmail_triage::config::{AccountConfig, Config};
use gmail_triage::error::Result;
use gmail_triage::inference::{ChatMessage, ChatResponse, InferenceBackend};
use gmail_triage::models::EmailData;
use mockall::mock;
use std::path::Path;

/// Create a test email with default values
pub fn create_test_email(id: &str, sender: &str, subject: &str) -> EmailData {
    EmailData {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        sender: sender.to_string(),
        subject: subject.to_string(),
        snippet: format!("Snippet of {}", subject),
        date: "Mon, 1 Jan 2024 10:00:00 -0800".to_string(),
    }
}

/// Four emails covering a reply, an action, a newsletter and spam
pub fn sample_inbox() -> Vec<EmailData> {
    vec![
        create_test_email("m1", "John <john@example.com>", "Can we meet Tuesday?"),
        create_test_email("m2", "billing@utility.com", "Your bill is due"),
        create_test_email("m3", "news@weekly.io", "This week in tech"),
        create_test_email("m4", "promo@shop.biz", "50% off everything"),
    ]
}

/// Chat reply carrying `content` as the assistant message
pub fn chat_reply(content: &str) -> ChatResponse {
    ChatResponse {
        message: ChatMessage {
            role: "assistant".to_string(),
            content: content.to_string(),
        },
    }
}

pub fn classification_json(category: &str, reason: &str) -> String {
    format!(r#"{{"category": "{}", "reason": "{}"}}"#, category, reason)
}

/// Config with one account per `(nickname, email)` pair, tokens under `dir`
pub fn config_with_accounts(dir: &Path, accounts: &[(&str, &str)]) -> Config {
    let mut config = Config::default();
    for (nickname, email) in accounts {
        config
            .add_account(
                nickname,
                AccountConfig {
                    email: email.to_string(),
                    token_cache: dir.join(format!("{}.json", nickname)),
                },
            )
            .unwrap();
    }
    config
}

pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

// Mock implementation of InferenceBackend for testing
mock! {
    pub Inference {}

    #[async_trait::async_trait]
    impl InferenceBackend for Inference {
        async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse>;
        async fn list_models(&self) -> Result<Vec<String>>;
    }
}

// Mock implementation of MailboxClient for testing
mock! {
    pub Mailbox {}

    #[async_trait::async_trait]
    impl MailboxClient for Mailbox {
        async fn list_message_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
        async fn get_email(&self, id: &str) -> Result<EmailData>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()>;
        async fn profile_email(&self) -> Result<String>;
    }
}

// Mock implementation of ActionApplier for testing
mock! {
    pub Applier {}

    #[async_trait::async_trait]
    impl ActionApplier for Applier {
        async fn ensure_label_exists(&mut self, name: &str) -> Result<String>;
        async fn apply_label_and_archive(
            &mut self,
            email_id: &str,
            label_id: &str,
            should_archive: bool,
        ) -> Result<()>;
    }
}

// Mock implementation of ApplierFactory for testing
mock! {
    pub Factory {}

    #[async_trait::async_trait]
    impl ApplierFactory for Factory {
        async fn applier_for(
            &self,
            account_name: &str,
            account: &AccountConfig,
        ) -> Result<Box<dyn ActionApplier>>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_email() {
        let email = create_test_email("m1", "a@example.com", "Hello");
        assert_eq!(email.id, "m1");
        assert_eq!(email.thread_id, "thread_m1");
        assert_eq!(email.snippet, "Snippet of Hello");
    }

    #[test]
    fn test_config_with_accounts() {
        let config = config_with_accounts(Path::new("/tmp"), &[("Work", "me@work.com")]);
        assert_eq!(config.accounts["work"].email, "me@work.com");
    }
}
