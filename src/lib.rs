//! Gmail Triage
//!
//! Sorts unlabelled inbox email into five action categories with a local
//! Ollama model, lets the operator review the result, then labels and
//! archives in Gmail or saves the decisions to apply later.
//!
//! # Pipeline
//!
//! 1. [`client::fetch_untriaged`] lists inbox mail without any triage label
//! 2. [`classifier::classify_emails`] asks the model for one category per email
//! 3. [`summary::generate_summaries`] builds the report shown before review
//! 4. [`interactive::review_loop`] lets the operator reclassify or skip emails
//! 5. [`actions::apply_actions`] labels and archives, or
//!    [`pending::PendingStore::save`] keeps the decisions for later
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_triage::{classifier, cli, config::Config, inference::OllamaClient, models::EmailData};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(&cli::data_dir().join("config.toml")).await?;
//!     let backend = OllamaClient::new(&config.inference)?;
//!
//!     let emails: Vec<EmailData> = Vec::new();
//!     let results = classifier::classify_emails(&backend, &emails, &config.model, None).await;
//!     println!("{} classified", results.len());
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod inference;
pub mod interactive;
pub mod label_manager;
pub mod models;
pub mod pending;
pub mod prompt;
pub mod review;
pub mod summary;

pub use error::{Result, TriageError};

pub use models::{Category, ClassificationResult, EmailData, PendingEmail, PendingResults};

pub use config::{AccountConfig, Config, InferenceConfig, LabelConfig};

pub use actions::{apply_actions, ActionApplier, ActionItem, ApplierFactory};
pub use classifier::{classify_emails, classify_single_email, parse_classification_response};
pub use client::{GmailMailboxClient, MailboxClient};
pub use inference::{InferenceBackend, OllamaClient};
pub use label_manager::LabelManager;
pub use pending::PendingStore;
pub use summary::generate_summaries;

pub use cli::{Cli, Commands};
