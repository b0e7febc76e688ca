//! Terminal menus for reviewing results and editing settings
//!
//! Every prompt goes through [`select`], which maps Esc to "no choice" and
//! Ctrl-C to [`TriageError::OperationCancelled`].

use chrono::{DateTime, Local, Utc};
use inquire::{Confirm, InquireError, Select, Text};
use std::fmt;

use crate::config::Config;
use crate::error::{Result, TriageError};
use crate::inference::{self, InferenceBackend};
use crate::models::{truncate_chars, Category, ClassificationResult, EmailData};
use crate::review;

const PAGE_SIZE: usize = 12;

/// Characters of subject shown in the per-email action prompt
const ACTION_SUBJECT_CHARS: usize = 50;

fn map_prompt_error<T>(result: std::result::Result<T, InquireError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled) => Ok(None),
        Err(InquireError::OperationInterrupted) => {
            Err(TriageError::OperationCancelled("interrupted by user".to_string()))
        }
        Err(e) => Err(TriageError::Unknown(format!("Prompt failed: {}", e))),
    }
}

fn select<T: fmt::Display>(message: &str, options: Vec<T>) -> Result<Option<T>> {
    map_prompt_error(Select::new(message, options).with_page_size(PAGE_SIZE).prompt())
}

pub fn confirm(message: &str, default: bool) -> Result<bool> {
    Ok(map_prompt_error(Confirm::new(message).with_default(default).prompt())?.unwrap_or(false))
}

fn text(message: &str, default: &str) -> Result<Option<String>> {
    map_prompt_error(Text::new(message).with_default(default).prompt())
}

/// Ask for a nickname for a new account
pub fn prompt_nickname() -> Result<Option<String>> {
    let answer = map_prompt_error(
        Text::new("Enter a nickname for this account (e.g., 'personal', 'work'):").prompt(),
    )?;
    Ok(answer.filter(|s| !s.trim().is_empty()))
}

// ---------------------------------------------------------------------------
// Review drill-down
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum CategoryChoice {
    Category { category: Category, count: usize },
    Done,
}

impl fmt::Display for CategoryChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryChoice::Category { category, count } => {
                write!(f, "{} ({} email{})", category, count, if *count == 1 { "" } else { "s" })
            }
            CategoryChoice::Done => f.write_str("Done - continue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EmailChoice {
    Email { index: usize, label: String },
    Back,
}

impl fmt::Display for EmailChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailChoice::Email { label, .. } => f.write_str(label),
            EmailChoice::Back => f.write_str("Back"),
        }
    }
}

/// What the operator can do with one email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    ChangeTo(Category),
    Skip,
    Back,
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewAction::ChangeTo(category) => write!(f, "Change to {}", category),
            ReviewAction::Skip => f.write_str("Skip this email"),
            ReviewAction::Back => f.write_str("Back"),
        }
    }
}

/// Actions offered for an email currently in `current`
pub fn review_actions(current: Category) -> Vec<ReviewAction> {
    Category::ALL
        .into_iter()
        .filter(|c| *c != current)
        .map(ReviewAction::ChangeTo)
        .chain([ReviewAction::Skip, ReviewAction::Back])
        .collect()
}

/// Apply one chosen action to the results
pub fn apply_review_action(
    results: &mut [ClassificationResult],
    email_id: &str,
    action: ReviewAction,
) -> bool {
    match action {
        ReviewAction::ChangeTo(category) => review::reclassify(results, email_id, category),
        ReviewAction::Skip => review::mark_skipped(results, email_id),
        ReviewAction::Back => false,
    }
}

fn category_choices(emails: &[EmailData], results: &[ClassificationResult]) -> Vec<CategoryChoice> {
    review::group_for_review(emails, results)
        .into_iter()
        .map(|g| CategoryChoice::Category {
            category: g.category,
            count: g.indices.len(),
        })
        .chain(std::iter::once(CategoryChoice::Done))
        .collect()
}

/// Let the operator reclassify or skip individual emails until "Done"
pub fn review_loop(emails: &[EmailData], results: &mut [ClassificationResult]) -> Result<()> {
    loop {
        let choices = category_choices(emails, results);
        let category = match select("Drill down into category?", choices)? {
            Some(CategoryChoice::Category { category, .. }) => category,
            Some(CategoryChoice::Done) | None => return Ok(()),
        };

        let groups = review::group_for_review(emails, results);
        let Some(group) = groups.into_iter().find(|g| g.category == category) else {
            continue;
        };

        let email_choices: Vec<EmailChoice> = group
            .indices
            .iter()
            .filter_map(|&index| {
                let id = &results[index].email_id;
                emails.iter().find(|e| &e.id == id).map(|email| EmailChoice::Email {
                    index,
                    label: review::email_label(email),
                })
            })
            .chain(std::iter::once(EmailChoice::Back))
            .collect();

        let index = match select(&format!("Emails in {}:", category), email_choices)? {
            Some(EmailChoice::Email { index, .. }) => index,
            Some(EmailChoice::Back) | None => continue,
        };

        let email_id = results[index].email_id.clone();
        let subject = emails
            .iter()
            .find(|e| e.id == email_id)
            .map(|e| truncate_chars(&e.subject, ACTION_SUBJECT_CHARS).to_string())
            .unwrap_or_default();

        if let Some(action) = select(&format!("Action for: {}", subject), review_actions(category))? {
            apply_review_action(results, &email_id, action);
        }
    }
}

// ---------------------------------------------------------------------------
// Final and pending prompts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalAction {
    ApplyNow,
    SaveForLater,
    Discard,
}

impl fmt::Display for FinalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FinalAction::ApplyNow => "Apply now",
            FinalAction::SaveForLater => "Save for later",
            FinalAction::Discard => "Discard",
        })
    }
}

pub fn final_action() -> Result<FinalAction> {
    let options = vec![
        FinalAction::ApplyNow,
        FinalAction::SaveForLater,
        FinalAction::Discard,
    ];
    Ok(select("What would you like to do?", options)?.unwrap_or(FinalAction::Discard))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingChoice {
    Apply,
    Discard,
    Cancel,
}

impl fmt::Display for PendingChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PendingChoice::Apply => "Apply pending results",
            PendingChoice::Discard => "Discard pending results",
            PendingChoice::Cancel => "Cancel",
        })
    }
}

pub fn pending_prompt(created_at: DateTime<Utc>, count: usize) -> Result<PendingChoice> {
    let message = format!(
        "You have {} pending results from {}. What would you like to do?",
        count,
        created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    let options = vec![PendingChoice::Apply, PendingChoice::Discard, PendingChoice::Cancel];
    Ok(select(&message, options)?.unwrap_or(PendingChoice::Cancel))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AccountChoice {
    Account { name: String, email: String },
    Cancel,
}

impl fmt::Display for AccountChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountChoice::Account { name, email } => write!(f, "{} ({})", name, email),
            AccountChoice::Cancel => f.write_str("Cancel"),
        }
    }
}

fn account_choices(config: &Config) -> Vec<AccountChoice> {
    config
        .accounts
        .iter()
        .map(|(name, account)| AccountChoice::Account {
            name: name.clone(),
            email: account.email.clone(),
        })
        .chain(std::iter::once(AccountChoice::Cancel))
        .collect()
}

/// Ask for one of the configured accounts; `None` on Cancel
pub fn pick_account(config: &Config, message: &str) -> Result<Option<String>> {
    match select(message, account_choices(config))? {
        Some(AccountChoice::Account { name, .. }) => Ok(Some(name)),
        Some(AccountChoice::Cancel) | None => Ok(None),
    }
}

/// Pick the account to triage; a single account is chosen without asking
pub fn select_account(config: &Config) -> Result<Option<String>> {
    if config.accounts.len() == 1 {
        return Ok(config.accounts.keys().next().cloned());
    }
    pick_account(config, "Select account:")
}

/// Entries of the menu shown when no subcommand is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainMenuChoice {
    ApplyPending,
    Run,
    AddAccount,
    RemoveAccount,
    Settings,
    Exit,
}

impl fmt::Display for MainMenuChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MainMenuChoice::ApplyPending => "Apply pending results",
            MainMenuChoice::Run => "Run triage",
            MainMenuChoice::AddAccount => "Add account",
            MainMenuChoice::RemoveAccount => "Remove account",
            MainMenuChoice::Settings => "Settings",
            MainMenuChoice::Exit => "Exit",
        })
    }
}

/// Main menu entries; pending and removal only appear when they can do something
pub fn main_menu_choices(pending_exists: bool, account_count: usize) -> Vec<MainMenuChoice> {
    let mut choices = Vec::new();
    if pending_exists {
        choices.push(MainMenuChoice::ApplyPending);
    }
    choices.push(MainMenuChoice::Run);
    choices.push(MainMenuChoice::AddAccount);
    if account_count > 1 {
        choices.push(MainMenuChoice::RemoveAccount);
    }
    choices.push(MainMenuChoice::Settings);
    choices.push(MainMenuChoice::Exit);
    choices
}

pub fn main_menu(pending_exists: bool, account_count: usize) -> Result<MainMenuChoice> {
    let choices = main_menu_choices(pending_exists, account_count);
    Ok(select("Gmail Triage - Main Menu", choices)?.unwrap_or(MainMenuChoice::Exit))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Parse a positive emails-per-run value
pub fn parse_max_emails(input: &str) -> Result<usize> {
    match input.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        Ok(_) => Err(TriageError::ConfigError("Must be a positive number.".to_string())),
        Err(_) => Err(TriageError::ConfigError("Invalid number.".to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsItem {
    Model,
    Labels,
    MaxEmails,
    Back,
}

/// Interactive settings editor; returns true when `config` changed
pub async fn settings_menu(config: &mut Config, backend: &dyn InferenceBackend) -> Result<bool> {
    let mut changed = false;

    loop {
        let items = [
            (SettingsItem::Model, format!("Change model (current: {})", config.model)),
            (SettingsItem::Labels, "Customize label names".to_string()),
            (
                SettingsItem::MaxEmails,
                format!("Max emails per run (current: {})", config.max_emails_per_run),
            ),
            (SettingsItem::Back, "Back".to_string()),
        ];
        let titles: Vec<String> = items.iter().map(|(_, t)| t.clone()).collect();

        let Some(choice) = select("Settings:", titles)? else {
            break;
        };
        let item = items
            .iter()
            .find(|(_, t)| *t == choice)
            .map(|(i, _)| *i)
            .unwrap_or(SettingsItem::Back);

        match item {
            SettingsItem::Back => break,
            SettingsItem::Model => {
                let Some(model) = text("Enter model name:", &config.model)? else {
                    continue;
                };
                let model = model.trim().to_string();
                if model.is_empty() {
                    continue;
                }
                if inference::model_available(backend, &model).await {
                    config.model = model.clone();
                    changed = true;
                    println!("Model changed to {}", model);
                } else {
                    println!("Model '{}' not found in Ollama.", model);
                }
            }
            SettingsItem::Labels => {
                if edit_labels(config)? {
                    changed = true;
                }
            }
            SettingsItem::MaxEmails => {
                let current = config.max_emails_per_run.to_string();
                let Some(answer) = text("Enter max emails per run:", &current)? else {
                    continue;
                };
                match parse_max_emails(&answer) {
                    Ok(value) => {
                        let previous = config.max_emails_per_run;
                        config.max_emails_per_run = value;
                        match config.validate() {
                            Ok(()) => {
                                changed = true;
                                println!("Max emails set to {}", value);
                            }
                            Err(e) => {
                                config.max_emails_per_run = previous;
                                println!("{}", e);
                            }
                        }
                    }
                    Err(TriageError::ConfigError(msg)) => println!("{}", msg),
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(changed)
}

fn edit_labels(config: &mut Config) -> Result<bool> {
    println!("\nCurrent label mappings:");
    for (category, label) in config.labels.iter() {
        println!("  {}: {}", category, label);
    }
    println!();

    let previous = config.labels.clone();
    for category in Category::ALL {
        let current = config.labels.label_for(category).to_string();
        if let Some(answer) = text(&format!("Label for {}:", category), &current)? {
            let answer = answer.trim();
            if !answer.is_empty() {
                config.labels.set_label(category, answer.to_string());
            }
        }
    }

    if let Err(e) = config.validate() {
        println!("{}", e);
        config.labels = previous;
        return Ok(false);
    }

    let changed = config.labels != previous;
    if changed {
        println!("Labels updated.");
    }
    Ok(changed)
}
