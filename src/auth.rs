//! OAuth2 authentication management for Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::path::Path;

use crate::client::GmailMailboxClient;
use crate::error::{Result, TriageError};

/// Gmail API scopes required for labelling and archiving
///
/// - gmail.modify: read headers, add/remove labels (no permanent deletion)
/// - gmail.labels: label management
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

const SETUP_INSTRUCTIONS: &str = r#"
Gmail Triage Setup
==================

To use gmail-triage, you need to set up Google Cloud credentials:

1. Go to the Google Cloud Console:
   https://console.cloud.google.com/

2. Create a new project or select an existing one

3. Enable the Gmail API:
   https://console.cloud.google.com/apis/library/gmail.googleapis.com

4. Create OAuth 2.0 credentials:
   https://console.cloud.google.com/apis/credentials
   - Click "Create Credentials" > "OAuth client ID"
   - Application type: "Desktop app"
   - Download the JSON file

5. Save the downloaded file as:
   {credentials_path}

After saving credentials.json, run this tool again.
"#;

/// First-run instructions pointing at where credentials are expected
pub fn setup_instructions(credentials_path: &Path) -> String {
    SETUP_INSTRUCTIONS.replace("{credentials_path}", &credentials_path.display().to_string())
}

/// Check that the OAuth client secret file exists and parses
pub async fn validate_credentials(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(TriageError::ConfigError(format!(
            "credentials.json not found at {}",
            path.display()
        )));
    }

    let content = tokio::fs::read_to_string(path).await?;
    yup_oauth2::parse_application_secret(content.as_bytes()).map_err(|e| {
        TriageError::ConfigError(format!("credentials.json is malformed: {}", e))
    })?;

    Ok(())
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Runs the installed-app flow in the browser the first time; afterwards the
/// token cache at `token_cache_path` is refreshed silently.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to read credentials: {}", e)))?;

    if let Some(parent) = token_cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| TriageError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so it is cached with every scope we use
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| TriageError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Authenticate one account and wrap it in a mailbox client
pub async fn connect_account(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailMailboxClient> {
    let hub = initialize_gmail_hub(credentials_path, token_cache_path).await?;
    Ok(GmailMailboxClient::new(hub))
}

/// Secure token file permissions on Unix systems (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the profile directory ACLs
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
