//! Single-slot snapshot of reviewed results waiting to be applied
//!
//! The snapshot lives in one JSON file. Saving overwrites it, applying consumes
//! it, and an unreadable file is treated the same as no file.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::actions::{apply_actions, ActionItem, ApplierFactory};
use crate::config::Config;
use crate::error::Result;
use crate::models::{Category, ClassificationResult, EmailData, PendingEmail, PendingResults};

/// On-disk shape accepted by [`PendingStore::load`]; lenient except for ids
#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    results: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawEntry {
    account: String,
    email_id: String,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    skip: bool,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    sender: String,
}

impl RawEntry {
    fn into_pending(self) -> PendingEmail {
        let category = match &self.category {
            None => Category::Fyi,
            Some(Value::String(name)) => name.parse().unwrap_or_else(|_| {
                warn!(
                    "Pending entry {} has unknown category '{}', using FYI",
                    self.email_id, name
                );
                Category::Fyi
            }),
            Some(other) => {
                warn!(
                    "Pending entry {} has invalid category {}, using FYI",
                    self.email_id, other
                );
                Category::Fyi
            }
        };

        PendingEmail {
            account: self.account,
            email_id: self.email_id,
            category,
            skip: self.skip,
            subject: self.subject,
            sender: self.sender,
        }
    }
}

fn parse_created_at(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return Utc::now();
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    warn!("Unreadable pending timestamp '{}', using now", raw);
    Utc::now()
}

pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist reviewed results for one account, replacing any earlier snapshot
    pub async fn save(
        &self,
        account_name: &str,
        emails: &[EmailData],
        results: &[ClassificationResult],
    ) -> Result<PendingResults> {
        let by_id: HashMap<&str, &EmailData> = emails.iter().map(|e| (e.id.as_str(), e)).collect();

        let entries: Vec<PendingEmail> = results
            .iter()
            .filter_map(|result| {
                by_id.get(result.email_id.as_str()).map(|email| PendingEmail {
                    account: account_name.to_string(),
                    email_id: result.email_id.clone(),
                    category: result.category,
                    skip: result.skip,
                    subject: email.subject.clone(),
                    sender: email.sender.clone(),
                })
            })
            .collect();

        let snapshot = PendingResults {
            created_at: Utc::now(),
            results: entries,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.path, json).await?;

        info!(
            "Saved {} pending results to {:?}",
            snapshot.results.len(),
            self.path
        );
        Ok(snapshot)
    }

    /// Read the snapshot; `None` when absent or unreadable
    pub async fn load(&self) -> Option<PendingResults> {
        if !self.exists() {
            return None;
        }

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read pending file {:?}: {}", self.path, e);
                return None;
            }
        };

        let raw: RawSnapshot = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Ignoring unreadable pending file {:?}: {}", self.path, e);
                return None;
            }
        };

        let created_at = parse_created_at(raw.created_at.as_deref());
        let results = raw.results.into_iter().map(RawEntry::into_pending).collect();

        Some(PendingResults {
            created_at,
            results,
        })
    }

    /// Remove the snapshot; succeeds when there is nothing to remove
    pub async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Deleted pending file {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a snapshot account by account, then delete it
    ///
    /// Best effort: accounts missing from `config` or failing to authenticate are
    /// skipped, and the snapshot is removed afterwards either way.
    pub async fn apply(
        &self,
        pending: &PendingResults,
        config: &Config,
        factory: &dyn ApplierFactory,
    ) -> Result<usize> {
        let mut by_account: BTreeMap<&str, Vec<ActionItem>> = BTreeMap::new();
        for entry in &pending.results {
            by_account
                .entry(entry.account.as_str())
                .or_default()
                .push(ActionItem::from(entry));
        }

        let mut total_applied = 0;
        for (account_name, items) in &by_account {
            let Some(account) = config.accounts.get(*account_name) else {
                warn!(
                    "Account '{}' is no longer configured, skipping {} pending emails",
                    account_name,
                    items.len()
                );
                continue;
            };

            let mut applier = match factory.applier_for(account_name, account).await {
                Ok(applier) => applier,
                Err(e) => {
                    warn!("Could not connect to account '{}': {}", account_name, e);
                    for item in items.iter().filter(|i| !i.skip) {
                        warn!("Not applied: email {} in account '{}'", item.email_id, account_name);
                    }
                    continue;
                }
            };

            total_applied +=
                apply_actions(applier.as_mut(), &config.labels, account_name, items).await;
        }

        self.delete().await?;
        Ok(total_applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionApplier;
    use crate::config::AccountConfig;
    use crate::error::TriageError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn email(id: &str, subject: &str) -> EmailData {
        EmailData {
            id: id.to_string(),
            thread_id: format!("thread_{}", id),
            sender: format!("{}@example.com", id),
            subject: subject.to_string(),
            snippet: String::new(),
            date: String::new(),
        }
    }

    /// Records every modification and accepts all labels
    struct RecordingApplier {
        applied: Arc<Mutex<Vec<(String, bool)>>>,
    }

    #[async_trait]
    impl ActionApplier for RecordingApplier {
        async fn ensure_label_exists(&mut self, name: &str) -> Result<String> {
            Ok(format!("id:{}", name))
        }

        async fn apply_label_and_archive(
            &mut self,
            email_id: &str,
            _label_id: &str,
            should_archive: bool,
        ) -> Result<()> {
            self.applied
                .lock()
                .unwrap()
                .push((email_id.to_string(), should_archive));
            Ok(())
        }
    }

    struct RecordingFactory {
        applied: Arc<Mutex<Vec<(String, bool)>>>,
        failing_account: Option<&'static str>,
    }

    #[async_trait]
    impl ApplierFactory for RecordingFactory {
        async fn applier_for(
            &self,
            account_name: &str,
            _account: &AccountConfig,
        ) -> Result<Box<dyn ActionApplier>> {
            if Some(account_name) == self.failing_account {
                return Err(TriageError::AuthError("token expired".to_string()));
            }
            Ok(Box::new(RecordingApplier {
                applied: Arc::clone(&self.applied),
            }))
        }
    }

    fn config_with(accounts: &[&str]) -> Config {
        let mut config = Config::default();
        for name in accounts {
            config
                .add_account(
                    name,
                    AccountConfig {
                        email: format!("{}@gmail.com", name),
                        token_cache: PathBuf::from(format!("{}.json", name)),
                    },
                )
                .unwrap();
        }
        config
    }

    fn entry(account: &str, id: &str, category: Category, skip: bool) -> PendingEmail {
        PendingEmail {
            account: account.to_string(),
            email_id: id.to_string(),
            category,
            skip,
            subject: String::new(),
            sender: String::new(),
        }
    }

    #[tokio::test]
    async fn test_save_load_round_trip_skips_unknown_emails() {
        let dir = tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("nested").join("pending.json"));

        let emails = vec![email("a", "Hello"), email("b", "Promo")];
        let mut skipped = ClassificationResult::new("b", Category::Archive, "");
        skipped.skip = true;
        let results = vec![
            ClassificationResult::new("a", Category::NeedsReply, "question"),
            skipped,
            ClassificationResult::new("ghost", Category::Fyi, ""),
        ];

        let saved = store.save("personal", &emails, &results).await.unwrap();
        assert!(store.exists());
        assert_eq!(saved.results.len(), 2);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.results, saved.results);
        assert_eq!(loaded.created_at, saved.created_at);
        assert_eq!(loaded.results[0], PendingEmail {
            account: "personal".to_string(),
            email_id: "a".to_string(),
            category: Category::NeedsReply,
            skip: false,
            subject: "Hello".to_string(),
            sender: "a@example.com".to_string(),
        });
        assert!(loaded.results[1].skip);

        store.delete().await.unwrap();
        assert!(!store.exists());
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        let emails = vec![email("a", "x"), email("b", "y")];

        store
            .save("one", &emails, &[ClassificationResult::new("a", Category::Fyi, "")])
            .await
            .unwrap();
        store
            .save("two", &emails, &[ClassificationResult::new("b", Category::Ignore, "")])
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.results[0].account, "two");
    }

    #[tokio::test]
    async fn test_load_missing_and_corrupted() {
        let dir = tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        assert!(store.load().await.is_none());

        tokio::fs::write(store.path(), "{ not json").await.unwrap();
        assert!(store.load().await.is_none());

        tokio::fs::write(store.path(), r#"{"results": [{"category": "FYI"}]}"#)
            .await
            .unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_load_coerces_category_and_timestamp() {
        let dir = tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        tokio::fs::write(
            store.path(),
            r#"{
                "created_at": "yesterday-ish",
                "results": [
                    {"account": "p", "email_id": "1", "category": "URGENT"},
                    {"account": "p", "email_id": "2", "category": 7, "skip": true},
                    {"account": "p", "email_id": "3"}
                ]
            }"#,
        )
        .await
        .unwrap();

        let before = Utc::now();
        let loaded = store.load().await.unwrap();
        assert!(loaded.created_at >= before);
        assert!(loaded.results.iter().all(|r| r.category == Category::Fyi));
        assert!(loaded.results[1].skip);
        assert_eq!(loaded.results[2].subject, "");
    }

    #[test]
    fn test_parse_created_at_formats() {
        let rfc = parse_created_at(Some("2026-01-15T10:30:00+02:00"));
        assert_eq!(rfc.to_rfc3339(), "2026-01-15T08:30:00+00:00");

        let naive = parse_created_at(Some("2026-01-15T10:30:00.123456"));
        assert_eq!(naive.format("%H:%M:%S").to_string(), "10:30:00");
    }

    #[tokio::test]
    async fn test_apply_skips_unknown_and_failing_accounts_then_deletes() {
        let dir = tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        tokio::fs::write(store.path(), "{}").await.unwrap();

        let pending = PendingResults {
            created_at: Utc::now(),
            results: vec![
                entry("personal", "p1", Category::NeedsReply, false),
                entry("personal", "p2", Category::Archive, false),
                entry("personal", "p3", Category::Ignore, true),
                entry("removed", "r1", Category::Fyi, false),
                entry("work", "w1", Category::Fyi, false),
            ],
        };

        let applied = Arc::new(Mutex::new(Vec::new()));
        let factory = RecordingFactory {
            applied: Arc::clone(&applied),
            failing_account: Some("work"),
        };
        let config = config_with(&["personal", "work"]);

        let count = store.apply(&pending, &config, &factory).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            *applied.lock().unwrap(),
            vec![("p1".to_string(), false), ("p2".to_string(), true)]
        );
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_apply_without_file_still_succeeds() {
        let dir = tempdir().unwrap();
        let store = PendingStore::new(dir.path().join("pending.json"));
        let factory = RecordingFactory {
            applied: Arc::new(Mutex::new(Vec::new())),
            failing_account: None,
        };
        let pending = PendingResults {
            created_at: Utc::now(),
            results: vec![],
        };

        let count = store
            .apply(&pending, &config_with(&["personal"]), &factory)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
