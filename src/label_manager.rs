//! Label resolution and message labelling for one Gmail account
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::actions::{ActionApplier, ApplierFactory};
use crate::auth;
use crate::client::MailboxClient;
use crate::config::AccountConfig;
use crate::error::{Result, TriageError};

/// System label removed to archive a message
pub const INBOX_LABEL: &str = "INBOX";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*/+\s*").unwrap());

/// Normalise a label name: collapse whitespace and repeated slashes, strip edge slashes
///
/// Case is preserved, so `"  auto//Needs   reply/ "` becomes `"auto/Needs reply"`.
pub fn normalize_label_name(name: &str) -> Result<String> {
    let collapsed = WHITESPACE.replace_all(name.trim(), " ");
    let joined = SLASHES.replace_all(&collapsed, "/");
    let normalized = joined.trim_matches('/').trim().to_string();

    if normalized.is_empty() {
        return Err(TriageError::LabelError(format!(
            "Label name '{}' is empty after normalisation",
            name
        )));
    }
    Ok(normalized)
}

/// Gmail-backed [`ActionApplier`] with a case-insensitive label cache
pub struct LabelManager {
    client: Box<dyn MailboxClient>,
    label_cache: HashMap<String, String>, // lowercase name -> id
    cache_loaded: bool,
    created_labels: Vec<String>,
}

impl LabelManager {
    pub fn new(client: Box<dyn MailboxClient>) -> Self {
        Self {
            client,
            label_cache: HashMap::new(),
            cache_loaded: false,
            created_labels: Vec::new(),
        }
    }

    /// Loads all existing labels from Gmail into the cache
    pub async fn load_existing_labels(&mut self) -> Result<usize> {
        let labels = self.client.list_labels().await?;
        let count = labels.len();

        for label in labels {
            self.cache_insert(&label.name, label.id);
        }
        self.cache_loaded = true;

        info!("Loaded {} existing labels into cache", count);
        Ok(count)
    }

    fn cache_get(&self, name: &str) -> Option<&String> {
        self.label_cache.get(&name.to_lowercase())
    }

    fn cache_insert(&mut self, name: &str, id: String) {
        self.label_cache.insert(name.to_lowercase(), id);
    }

    /// Ids of labels created by this manager, parents first
    pub fn created_labels(&self) -> &[String] {
        &self.created_labels
    }

    async fn create_and_cache(&mut self, name: &str) -> Result<String> {
        info!("Creating label: {}", name);
        let label_id = self.client.create_label(name).await.map_err(|e| {
            TriageError::LabelError(format!("Failed to create label '{}': {}", name, e))
        })?;

        self.cache_insert(name, label_id.clone());
        self.created_labels.push(label_id.clone());
        Ok(label_id)
    }

    /// Ensures all parent labels exist in the hierarchy
    ///
    /// For `Auto/Triage/FYI` this creates `Auto` and `Auto/Triage` when missing.
    async fn ensure_parent_labels(&mut self, label_name: &str) -> Result<()> {
        let parts: Vec<&str> = label_name.split('/').collect();

        for i in 1..parts.len() {
            let parent_path = parts[..i].join("/");
            if self.cache_get(&parent_path).is_none() {
                debug!("Creating parent label: {}", parent_path);
                self.create_and_cache(&parent_path).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ActionApplier for LabelManager {
    async fn ensure_label_exists(&mut self, name: &str) -> Result<String> {
        let name = normalize_label_name(name)?;

        if !self.cache_loaded {
            self.load_existing_labels().await?;
        }

        if let Some(id) = self.cache_get(&name) {
            debug!("Label '{}' already exists in cache", name);
            return Ok(id.clone());
        }

        if name.contains('/') {
            self.ensure_parent_labels(&name).await?;
        }

        self.create_and_cache(&name).await
    }

    async fn apply_label_and_archive(
        &mut self,
        email_id: &str,
        label_id: &str,
        should_archive: bool,
    ) -> Result<()> {
        let add = vec![label_id.to_string()];
        let remove = if should_archive {
            vec![INBOX_LABEL.to_string()]
        } else {
            Vec::new()
        };

        self.client.modify_labels(email_id, &add, &remove).await
    }
}

/// Opens a [`LabelManager`] per account from its cached OAuth token
pub struct GmailApplierFactory {
    credentials_path: PathBuf,
}

impl GmailApplierFactory {
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
        }
    }
}

#[async_trait]
impl ApplierFactory for GmailApplierFactory {
    async fn applier_for(
        &self,
        account_name: &str,
        account: &AccountConfig,
    ) -> Result<Box<dyn ActionApplier>> {
        debug!("Connecting to account '{}' ({})", account_name, account.email);
        let client = auth::connect_account(&self.credentials_path, &account.token_cache).await?;
        Ok(Box::new(LabelManager::new(Box::new(client))))
    }
}
