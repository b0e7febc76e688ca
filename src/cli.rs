//! Command-line interface and run orchestration

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actions::{apply_actions, ActionItem};
use crate::auth;
use crate::classifier::{classify_emails, ProgressCallback};
use crate::client::{fetch_untriaged, MailboxClient};
use crate::config::{normalize_account_name, AccountConfig, Config};
use crate::error::{Result, TriageError};
use crate::inference::{self, InferenceBackend, OllamaClient};
use crate::interactive::{self, FinalAction, MainMenuChoice, PendingChoice};
use crate::label_manager::{GmailApplierFactory, LabelManager};
use crate::pending::PendingStore;
use crate::summary::generate_summaries;

const DATA_DIR_NAME: &str = ".gmail-triage";

/// Readiness checks after launching `ollama serve`
const OLLAMA_START_ATTEMPTS: u32 = 5;
const OLLAMA_START_DELAY: Duration = Duration::from_secs(1);

/// Per-user directory for config, credentials, tokens and pending results
///
/// `~/.gmail-triage`, falling back to the platform config directory and then
/// to the working directory when neither can be determined.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .or_else(dirs::config_dir)
        .map(|base| base.join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}

fn default_data_path(name: &str) -> PathBuf {
    data_dir().join(name)
}

#[derive(Parser, Debug)]
#[command(name = "gmail-triage")]
#[command(version)]
#[command(about = "Sort your Gmail inbox with a local language model", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = default_data_path("config.toml"))]
    pub config: PathBuf,

    /// Path to OAuth2 client credentials
    #[arg(long, default_value_os_t = default_data_path("credentials.json"))]
    pub credentials: PathBuf,

    /// Directory holding one token cache per account
    #[arg(long, default_value_os_t = default_data_path("tokens"))]
    pub token_dir: PathBuf,

    /// Path to the saved-for-later results
    #[arg(long, default_value_os_t = default_data_path("pending.json"))]
    pub pending_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Without a command the main menu is shown
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Fetch, classify and review unlabelled inbox emails
    Run {
        /// Account nickname (asked for when several are configured)
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Apply the saved-for-later results
    ApplyPending,

    /// Delete the saved-for-later results
    DiscardPending,

    /// Show configuration, accounts, backend and pending state
    Status,

    /// Connect a Gmail account
    AddAccount {
        /// Nickname for the account (asked for when omitted)
        nickname: Option<String>,
    },

    /// Disconnect a Gmail account
    RemoveAccount {
        nickname: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Change model, label names and batch size
    Settings,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value_os_t = default_data_path("config.toml"))]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn pending_store(&self) -> PendingStore {
        PendingStore::new(&self.pending_file)
    }

    /// Token cache location for an account nickname
    pub fn token_cache_for(&self, nickname: &str) -> PathBuf {
        token_cache_path(&self.token_dir, nickname)
    }
}

pub fn token_cache_path(token_dir: &Path, nickname: &str) -> PathBuf {
    token_dir.join(format!("{}.json", normalize_account_name(nickname)))
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    /// Share the MultiProgress the log writer prints through
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>4}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>4}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }
}

/// Check credentials, printing setup help when they are missing
async fn ensure_credentials(cli: &Cli) -> Result<()> {
    if !cli.credentials.exists() {
        println!("{}", auth::setup_instructions(&cli.credentials));
    }
    auth::validate_credentials(&cli.credentials).await
}

/// Poll the backend until it answers, giving up after `attempts` checks
pub async fn wait_for_backend(
    backend: &dyn InferenceBackend,
    attempts: u32,
    delay: Duration,
) -> bool {
    for attempt in 1..=attempts {
        tokio::time::sleep(delay).await;
        if inference::is_available(backend).await {
            return true;
        }
        debug!("Ollama not ready ({}/{})", attempt, attempts);
    }
    false
}

/// Launch `ollama serve` in the background with its output discarded
fn spawn_ollama() -> Result<()> {
    tokio::process::Command::new("ollama")
        .arg("serve")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

/// Offer to start Ollama; true once it answers
async fn offer_to_start_ollama(backend: &dyn InferenceBackend) -> Result<bool> {
    if !interactive::confirm("Ollama is not running. Start it now?", true)? {
        return Ok(false);
    }
    if let Err(e) = spawn_ollama() {
        warn!("Could not launch ollama: {}", e);
        println!("Start it manually with: ollama serve");
        return Ok(false);
    }
    println!("Started Ollama. Waiting for it to be ready...");
    Ok(wait_for_backend(backend, OLLAMA_START_ATTEMPTS, OLLAMA_START_DELAY).await)
}

/// Backend health check before classification; false means do not classify
async fn check_backend(backend: &dyn InferenceBackend, model: &str) -> Result<bool> {
    if !inference::is_available(backend).await && !offer_to_start_ollama(backend).await? {
        println!("Cannot proceed without Ollama running.");
        return Ok(false);
    }
    if !inference::model_available(backend, model).await {
        println!("Model '{}' not found. Install with: ollama pull {}", model, model);
        return Ok(false);
    }
    Ok(true)
}

/// Apply the pending snapshot to every account it mentions
pub async fn apply_pending(cli: &Cli, config: &Config) -> Result<Option<usize>> {
    let store = cli.pending_store();
    let Some(pending) = store.load().await else {
        println!("No pending results to apply.");
        return Ok(None);
    };

    let factory = GmailApplierFactory::new(&cli.credentials);
    let count = store.apply(&pending, config, &factory).await?;
    println!("Applied to {} emails.", count);
    Ok(Some(count))
}

/// Fetch, classify, summarise and review one account, then act on the result
pub async fn run_triage(cli: &Cli, account: Option<&str>, multi: MultiProgress) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    let store = cli.pending_store();

    if let Some(pending) = store.load().await {
        match interactive::pending_prompt(pending.created_at, pending.results.len())? {
            PendingChoice::Apply => {
                let factory = GmailApplierFactory::new(&cli.credentials);
                let count = store.apply(&pending, &config, &factory).await?;
                println!("Applied to {} emails.", count);
                return Ok(());
            }
            PendingChoice::Discard => store.delete().await?,
            PendingChoice::Cancel => return Ok(()),
        }
    }

    if config.accounts.is_empty() {
        println!("No accounts configured. Add an account first: gmail-triage add-account");
        return Ok(());
    }

    let account_name = match account {
        Some(name) => {
            let name = normalize_account_name(name);
            if !config.accounts.contains_key(&name) {
                return Err(TriageError::ConfigError(format!(
                    "Account '{}' not found",
                    name
                )));
            }
            name
        }
        None => match interactive::select_account(&config)? {
            Some(name) => name,
            None => return Ok(()),
        },
    };
    let account = &config.accounts[&account_name];

    ensure_credentials(cli).await?;

    let reporter = ProgressReporter::with_multi_progress(multi);
    let client = auth::connect_account(&cli.credentials, &account.token_cache).await?;

    println!("\nFetching emails from {}...", account.email);
    let spinner = reporter.add_spinner("Listing unprocessed inbox emails...");
    let fetched = fetch_untriaged(&client, &config.labels, config.max_emails_per_run).await;
    spinner.finish_and_clear();
    let emails = fetched?;

    if emails.is_empty() {
        println!("No unprocessed emails found.");
        return Ok(());
    }
    println!("Found {} emails to process.", emails.len());

    let backend = OllamaClient::new(&config.inference)?;
    if !check_backend(&backend, &config.model).await? {
        return Ok(());
    }

    println!("\nClassifying emails using {}...", config.model);
    let bar = reporter.add_progress_bar(emails.len() as u64, "Classifying");
    let on_progress: ProgressCallback = &|done: usize, _total: usize| bar.set_position(done as u64);
    let mut results = classify_emails(&backend, &emails, &config.model, Some(on_progress)).await;
    bar.finish_and_clear();

    let spinner = reporter.add_spinner("Summarising...");
    let summaries = generate_summaries(&backend, &emails, &results, &config.model).await;
    spinner.finish_and_clear();
    println!("\n{}", summaries);

    interactive::review_loop(&emails, &mut results)?;

    match interactive::final_action()? {
        FinalAction::ApplyNow => {
            let mut manager = LabelManager::new(Box::new(client));
            let items: Vec<ActionItem> = results.iter().map(ActionItem::from).collect();
            let count = apply_actions(&mut manager, &config.labels, &account_name, &items).await;
            println!("Done. Applied to {} emails.", count);
        }
        FinalAction::SaveForLater => {
            store.save(&account_name, &emails, &results).await?;
            println!("Results saved. Run 'gmail-triage apply-pending' to apply them later.");
        }
        FinalAction::Discard => info!("Discarded {} classifications", results.len()),
    }

    Ok(())
}

/// Authorise a new account and register it under a nickname
pub async fn add_account(cli: &Cli, nickname: Option<&str>) -> Result<()> {
    let mut config = Config::load(&cli.config).await?;

    let nickname = match nickname {
        Some(n) => Some(n.to_string()),
        None => interactive::prompt_nickname()?,
    };
    let Some(nickname) = nickname else {
        println!("Account addition cancelled.");
        return Ok(());
    };

    let name = normalize_account_name(&nickname);
    if config.accounts.contains_key(&name) {
        println!("Account '{}' already exists. Choose a different name.", name);
        return Ok(());
    }

    ensure_credentials(cli).await?;

    let token_cache = cli.token_cache_for(&name);
    let email = match connect_and_identify(&cli.credentials, &token_cache).await {
        Ok(email) => email,
        Err(e) => {
            warn!("Authentication for '{}' failed: {}", name, e);
            println!("Authentication failed. Please try again.");
            return Ok(());
        }
    };

    config.add_account(&name, AccountConfig { email, token_cache })?;
    config.save(&cli.config).await?;
    println!("Account '{}' added successfully!", name);
    Ok(())
}

async fn connect_and_identify(credentials: &Path, token_cache: &Path) -> Result<String> {
    let client = auth::connect_account(credentials, token_cache).await?;
    client.profile_email().await
}

/// Remove an account and its token cache
pub async fn remove_account(cli: &Cli, nickname: &str, force: bool) -> Result<()> {
    let mut config = Config::load(&cli.config).await?;
    let name = normalize_account_name(nickname);

    if let Some(account) = config.accounts.get(&name) {
        if config.accounts.len() > 1
            && !force
            && !interactive::confirm(&format!("Remove {}?", account.email), false)?
        {
            return Ok(());
        }
    }

    let removed = config.remove_account(&name)?;
    config.save(&cli.config).await?;

    match tokio::fs::remove_file(&removed.token_cache).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not delete token cache {:?}: {}", removed.token_cache, e),
    }

    println!("Account '{}' removed.", name);
    Ok(())
}

pub async fn settings(cli: &Cli) -> Result<()> {
    let mut config = Config::load(&cli.config).await?;
    let backend = OllamaClient::new(&config.inference)?;

    if interactive::settings_menu(&mut config, &backend).await? {
        config.save(&cli.config).await?;
    }
    Ok(())
}

pub async fn status(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    let backend = OllamaClient::new(&config.inference)?;

    println!("\n========================================");
    println!("Gmail Triage Status");
    println!("========================================");
    println!("Config: {:?}", cli.config);
    println!("Model: {}", config.model);
    println!("Max emails per run: {}", config.max_emails_per_run);

    let backend_state = if !inference::is_available(&backend).await {
        "not running"
    } else if inference::model_available(&backend, &config.model).await {
        "ready"
    } else {
        "model not installed"
    };
    println!("Ollama ({}): {}", backend.endpoint(), backend_state);

    println!("\nLabels:");
    for (category, label) in config.labels.iter() {
        println!("  {}: {}", category, label);
    }

    println!("\nAccounts:");
    if config.accounts.is_empty() {
        println!("  (none)");
    }
    for (name, account) in &config.accounts {
        println!("  {} ({})", name, account.email);
    }

    match cli.pending_store().load().await {
        Some(pending) => {
            println!(
                "\nPending: {} results saved {}",
                pending.results.len(),
                pending.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        None => println!("\nPending: none"),
    }
    println!("========================================");

    Ok(())
}

pub async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(TriageError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }

    Config::create_example(output).await?;

    println!("Created example configuration file at: {:?}", output);
    println!("\nKey settings to review:");
    println!("  - model: Ollama model used for classification");
    println!("  - max_emails_per_run: How many inbox emails one run looks at");
    println!("  - [labels]: Gmail label applied for each category");
    Ok(())
}

/// Menu loop used when no subcommand is given
pub async fn main_menu(cli: &Cli, multi: MultiProgress) -> Result<()> {
    ensure_credentials(cli).await?;

    let config = Config::load(&cli.config).await?;
    if config.accounts.is_empty() {
        println!("Welcome to Gmail Triage!\n");
        if interactive::confirm("Add your first account?", true)? {
            add_account(cli, None).await?;
        }
        if Config::load(&cli.config).await?.accounts.is_empty() {
            println!("No accounts configured. Run again to add an account.");
            return Ok(());
        }
    }

    loop {
        let config = Config::load(&cli.config).await?;
        let choice = interactive::main_menu(cli.pending_store().exists(), config.accounts.len())?;

        match choice {
            MainMenuChoice::Exit => break,
            MainMenuChoice::Run => run_triage(cli, None, multi.clone()).await?,
            MainMenuChoice::ApplyPending => {
                apply_pending(cli, &config).await?;
            }
            MainMenuChoice::AddAccount => add_account(cli, None).await?,
            MainMenuChoice::RemoveAccount => {
                if let Some(name) = interactive::pick_account(&config, "Select account to remove:")? {
                    remove_account(cli, &name, false).await?;
                }
            }
            MainMenuChoice::Settings => settings(cli).await?,
        }
    }

    Ok(())
}
