use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, TriageError};
use crate::models::Category;

/// Upper bound for `max_emails_per_run`; one Gmail list page is 500 ids
const MAX_EMAILS_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_emails_per_run")]
    pub max_emails_per_run: usize,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_emails_per_run: default_max_emails_per_run(),
            inference: InferenceConfig::default(),
            labels: LabelConfig::default(),
            accounts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Gmail label name used for each category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelConfig {
    #[serde(default = "default_needs_reply_label")]
    pub needs_reply: String,
    #[serde(default = "default_needs_action_label")]
    pub needs_action: String,
    #[serde(default = "default_fyi_label")]
    pub fyi: String,
    #[serde(default = "default_archive_label")]
    pub archive: String,
    #[serde(default = "default_ignore_label")]
    pub ignore: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            needs_reply: default_needs_reply_label(),
            needs_action: default_needs_action_label(),
            fyi: default_fyi_label(),
            archive: default_archive_label(),
            ignore: default_ignore_label(),
        }
    }
}

impl LabelConfig {
    pub fn label_for(&self, category: Category) -> &str {
        match category {
            Category::NeedsReply => &self.needs_reply,
            Category::NeedsAction => &self.needs_action,
            Category::Fyi => &self.fyi,
            Category::Archive => &self.archive,
            Category::Ignore => &self.ignore,
        }
    }

    pub fn set_label(&mut self, category: Category, name: String) {
        let slot = match category {
            Category::NeedsReply => &mut self.needs_reply,
            Category::NeedsAction => &mut self.needs_action,
            Category::Fyi => &mut self.fyi,
            Category::Archive => &mut self.archive,
            Category::Ignore => &mut self.ignore,
        };
        *slot = name;
    }

    /// (category, label name) pairs in category order
    pub fn iter(&self) -> impl Iterator<Item = (Category, &str)> + '_ {
        Category::ALL.into_iter().map(move |c| (c, self.label_for(c)))
    }
}

/// One connected Gmail account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountConfig {
    pub email: String,
    /// OAuth token cache for this account
    pub token_cache: PathBuf,
}

fn default_model() -> String {
    "mistral:7b".to_string()
}

fn default_max_emails_per_run() -> usize {
    100
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_needs_reply_label() -> String {
    Category::NeedsReply.default_label().to_string()
}

fn default_needs_action_label() -> String {
    Category::NeedsAction.default_label().to_string()
}

fn default_fyi_label() -> String {
    Category::Fyi.default_label().to_string()
}

fn default_archive_label() -> String {
    Category::Archive.default_label().to_string()
}

fn default_ignore_label() -> String {
    Category::Ignore.default_label().to_string()
}

/// Normalise a user-supplied account nickname: `" Work Mail "` -> `"work-mail"`
pub fn normalize_account_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TriageError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TriageError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TriageError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(TriageError::ConfigError("model cannot be empty".to_string()));
        }

        if self.max_emails_per_run == 0 {
            return Err(TriageError::ConfigError(
                "max_emails_per_run must be at least 1".to_string(),
            ));
        }
        if self.max_emails_per_run > MAX_EMAILS_LIMIT {
            return Err(TriageError::ConfigError(format!(
                "max_emails_per_run cannot exceed {}",
                MAX_EMAILS_LIMIT
            )));
        }

        if self.inference.timeout_secs == 0 {
            return Err(TriageError::ConfigError(
                "inference.timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.inference.endpoint.starts_with("http://")
            && !self.inference.endpoint.starts_with("https://")
        {
            return Err(TriageError::ConfigError(format!(
                "inference.endpoint must be an http(s) URL, got '{}'",
                self.inference.endpoint
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for (category, label) in self.labels.iter() {
            if label.trim().is_empty() {
                return Err(TriageError::ConfigError(format!(
                    "label for {} cannot be empty",
                    category
                )));
            }
            if !seen.insert(label.to_lowercase()) {
                return Err(TriageError::ConfigError(format!(
                    "label '{}' is used for more than one category",
                    label
                )));
            }
        }

        Ok(())
    }

    /// Register a new account under a normalised nickname
    pub fn add_account(&mut self, nickname: &str, account: AccountConfig) -> Result<String> {
        let name = normalize_account_name(nickname);
        if name.is_empty() {
            return Err(TriageError::ConfigError(
                "account nickname cannot be empty".to_string(),
            ));
        }
        if self.accounts.contains_key(&name) {
            return Err(TriageError::ConfigError(format!(
                "Account '{}' already exists. Choose a different name.",
                name
            )));
        }
        self.accounts.insert(name.clone(), account);
        Ok(name)
    }

    /// Remove an account; the last remaining account cannot be removed
    pub fn remove_account(&mut self, nickname: &str) -> Result<AccountConfig> {
        let name = normalize_account_name(nickname);
        if !self.accounts.contains_key(&name) {
            return Err(TriageError::ConfigError(format!(
                "Account '{}' not found",
                name
            )));
        }
        if self.accounts.len() <= 1 {
            return Err(TriageError::ConfigError(
                "Cannot remove last account.".to_string(),
            ));
        }
        self.accounts
            .remove(&name)
            .ok_or_else(|| TriageError::ConfigError(format!("Account '{}' not found", name)))
    }

    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
