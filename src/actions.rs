//! Applying reviewed classifications to a mailbox

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::{AccountConfig, LabelConfig};
use crate::error::Result;
use crate::models::{Category, ClassificationResult, PendingEmail};

/// Mailbox mutations the pipeline needs
#[async_trait]
pub trait ActionApplier: Send {
    /// Return the id of the label with this name, creating it if absent
    async fn ensure_label_exists(&mut self, name: &str) -> Result<String>;

    /// Add `label_id` to the message and optionally remove it from the inbox
    async fn apply_label_and_archive(
        &mut self,
        email_id: &str,
        label_id: &str,
        should_archive: bool,
    ) -> Result<()>;
}

/// Builds an authenticated applier for a configured account
#[async_trait]
pub trait ApplierFactory: Send + Sync {
    async fn applier_for(
        &self,
        account_name: &str,
        account: &AccountConfig,
    ) -> Result<Box<dyn ActionApplier>>;
}

/// The fields of a decision that matter when applying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionItem {
    pub email_id: String,
    pub category: Category,
    pub skip: bool,
}

impl From<&ClassificationResult> for ActionItem {
    fn from(result: &ClassificationResult) -> Self {
        Self {
            email_id: result.email_id.clone(),
            category: result.category,
            skip: result.skip,
        }
    }
}

impl From<&PendingEmail> for ActionItem {
    fn from(pending: &PendingEmail) -> Self {
        Self {
            email_id: pending.email_id.clone(),
            category: pending.category,
            skip: pending.skip,
        }
    }
}

/// Label and archive every non-skipped item, returning how many succeeded
///
/// A category whose label cannot be resolved is left alone for this run. A
/// failed modification is logged and not counted; it never aborts the batch.
pub async fn apply_actions(
    applier: &mut dyn ActionApplier,
    labels: &LabelConfig,
    account_name: &str,
    items: &[ActionItem],
) -> usize {
    let mut label_ids: HashMap<Category, String> = HashMap::new();
    for (category, label_name) in labels.iter() {
        match applier.ensure_label_exists(label_name).await {
            Ok(id) if !id.is_empty() => {
                label_ids.insert(category, id);
            }
            Ok(_) => warn!("Label '{}' resolved to an empty id, skipping {}", label_name, category),
            Err(e) => warn!("Could not ensure label '{}': {}", label_name, e),
        }
    }

    let mut applied = 0;
    for item in items {
        if item.skip {
            debug!("Skipping {} at operator request", item.email_id);
            continue;
        }
        if item.email_id.is_empty() {
            continue;
        }
        let Some(label_id) = label_ids.get(&item.category) else {
            continue;
        };

        match applier
            .apply_label_and_archive(&item.email_id, label_id, item.category.should_archive())
            .await
        {
            Ok(()) => applied += 1,
            Err(e) => warn!(
                "Failed to apply {} to email {} in account '{}': {}",
                item.category, item.email_id, account_name, e
            ),
        }
    }

    info!(
        "Applied {}/{} actions for account '{}'",
        applied,
        items.len(),
        account_name
    );
    applied
}
