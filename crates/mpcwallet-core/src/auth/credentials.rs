use anyhow::{Context, Result};
use keyring::Entry;
use reqwest::Url;
use tracing::debug;

/// Keychain service prefix; the backend host is appended
const SERVICE_PREFIX: &str = "mpcwallet";

/// Remembered login passwords in the OS keychain.
///
/// Entries are scoped to one backend, so the same email used against
/// staging and production keeps two separate passwords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStore {
    service: String,
}

impl CredentialStore {
    /// Store for the backend at `api_url`
    pub fn for_backend(api_url: &str) -> Self {
        Self {
            service: service_name(api_url),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, email: &str) -> Result<Entry> {
        Entry::new(&self.service, &account_key(email))
            .with_context(|| format!("Failed to open keychain entry in {}", self.service))
    }

    pub fn store(&self, email: &str, password: &str) -> Result<()> {
        self.entry(email)?
            .set_password(password)
            .context("Failed to store password in keychain")?;
        debug!(service = %self.service, "Password stored");
        Ok(())
    }

    pub fn get_password(&self, email: &str) -> Result<String> {
        self.entry(email)?
            .get_password()
            .context("No remembered password in keychain")
    }

    /// Forget the password for `email`. A missing entry is not an error.
    pub fn delete(&self, email: &str) -> Result<()> {
        match self.entry(email)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete password from keychain"),
        }
    }

    pub fn has_credentials(&self, email: &str) -> bool {
        self.entry(email)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}

/// `mpcwallet@host[:port]`, or the bare prefix when the URL has no host
fn service_name(api_url: &str) -> String {
    let host = Url::parse(api_url.trim())
        .ok()
        .and_then(|url| {
            let host = url.host_str()?.to_ascii_lowercase();
            Some(match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            })
        });
    match host {
        Some(host) => format!("{}@{}", SERVICE_PREFIX, host),
        None => SERVICE_PREFIX.to_string(),
    }
}

/// Emails are case-insensitive at the backend
fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}
