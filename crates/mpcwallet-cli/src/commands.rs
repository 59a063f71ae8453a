//! Command parsing and execution for the `mpcwallet` binary.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use mpcwallet_core::models::{
    CreateApiKeyRequest, SubmitTransactionRequest, TransactionFilter, DEFAULT_CHAIN_ID,
};
use mpcwallet_core::{ApiClient, Config, CredentialStore, LoginOutcome};
use serde::Serialize;
use tracing::{debug, info};

/// Default page size for transaction listings
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Default page size for organization listings
const DEFAULT_ORG_LIMIT: u32 = 10;

/// Token sent when `transfer` gets no `--symbol`
const DEFAULT_SYMBOL: &str = "ETH";

/// Client key share used for signing when `--share-data` is not given
const SHARE_DATA_ENV: &str = "MPCWALLET_SHARE_DATA";

pub const USAGE: &str = "\
Usage: mpcwallet <command> [args]

Commands:
  signup <email>                    Create an account (prompts for the password)
  login <email> [--remember]        Log in (prompts for the password and one-time code)
  verify-login <email> <code>       Finish a login with the emailed one-time code
  logout [<email>]                  Forget the stored session and password
  me                                Show the current user
  balance                           Show the wallet balance
  transactions [<wallet>] [--chain-id N] [--page N] [--page-size N]
  transaction <id>                  Show one transaction
  transfer <to> <amount> [--symbol S] [--chain-id N] [--share-data X]
                                    Send funds (prompts for the security code)
  overview                          Profile and balance together
  orgs [--page N] [--limit N]       List organizations
  org <id>                          Show one organization
  api-keys <org>                    List API keys of an organization
  create-api-key <org> <name> <permission>...
  delete-api-key <org> <key>
  usage <org>                       API usage of an organization
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Signup { email: String },
    Login { email: String, remember: bool },
    VerifyLogin { email: String, otp: String },
    Logout { email: Option<String> },
    Me,
    Balance,
    Transactions { filter: TransactionFilter },
    Transaction { id: String },
    Transfer {
        to: String,
        amount: String,
        symbol: String,
        chain_id: u64,
        share_data: Option<String>,
    },
    Overview,
    Orgs { page: u32, limit: u32 },
    Org { id: String },
    ApiKeys { org: String },
    CreateApiKey { org: String, name: String, permissions: Vec<String> },
    DeleteApiKey { org: String, key: String },
    Usage { org: String },
}

impl Command {
    /// Parse the arguments following the program name
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Help);
        };

        let command = match name.as_str() {
            "help" | "--help" | "-h" => Command::Help,
            "signup" => Command::Signup {
                email: positional(rest, 0, "email")?,
            },
            "login" => Command::Login {
                email: positional(rest, 0, "email")?,
                remember: rest.iter().any(|a| a == "--remember"),
            },
            "verify-login" => Command::VerifyLogin {
                email: positional(rest, 0, "email")?,
                otp: positional(rest, 1, "one-time code")?,
            },
            "logout" => Command::Logout {
                email: rest.iter().find(|a| !a.starts_with("--")).cloned(),
            },
            "me" => Command::Me,
            "balance" => Command::Balance,
            "transactions" => Command::Transactions {
                filter: TransactionFilter {
                    wallet_address: first_positional(rest),
                    chain_id: flag_value(rest, "--chain-id")?,
                    page: flag_value(rest, "--page")?.unwrap_or(1),
                    page_size: flag_value(rest, "--page-size")?.unwrap_or(DEFAULT_PAGE_SIZE),
                },
            },
            "transaction" => Command::Transaction {
                id: positional(rest, 0, "transaction id")?,
            },
            "transfer" => {
                let to = positional(rest, 0, "recipient address")?;
                let amount = positional(rest, 1, "amount")?;
                if amount.parse::<f64>().map(|a| a <= 0.0 || !a.is_finite()).unwrap_or(true) {
                    bail!("Amount must be a positive number, got {:?}", amount);
                }
                Command::Transfer {
                    to,
                    amount,
                    symbol: flag_value(rest, "--symbol")?.unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
                    chain_id: flag_value(rest, "--chain-id")?.unwrap_or(DEFAULT_CHAIN_ID),
                    share_data: flag_value(rest, "--share-data")?,
                }
            }
            "overview" => Command::Overview,
            "orgs" => Command::Orgs {
                page: flag_value(rest, "--page")?.unwrap_or(1),
                limit: flag_value(rest, "--limit")?.unwrap_or(DEFAULT_ORG_LIMIT),
            },
            "org" => Command::Org {
                id: positional(rest, 0, "organization id")?,
            },
            "api-keys" => Command::ApiKeys {
                org: positional(rest, 0, "organization id")?,
            },
            "create-api-key" => {
                let org = positional(rest, 0, "organization id")?;
                let name = positional(rest, 1, "key name")?;
                let permissions: Vec<String> = rest.iter().skip(2).cloned().collect();
                if permissions.is_empty() {
                    bail!("create-api-key needs at least one permission");
                }
                Command::CreateApiKey { org, name, permissions }
            }
            "delete-api-key" => Command::DeleteApiKey {
                org: positional(rest, 0, "organization id")?,
                key: positional(rest, 1, "key id")?,
            },
            "usage" => Command::Usage {
                org: positional(rest, 0, "organization id")?,
            },
            other => bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }

    /// Whether the command needs a logged-in session before it runs
    pub fn needs_auth(&self) -> bool {
        !matches!(
            self,
            Command::Help
                | Command::Signup { .. }
                | Command::Login { .. }
                | Command::VerifyLogin { .. }
                | Command::Logout { .. }
        )
    }
}

fn positional(args: &[String], index: usize, what: &str) -> Result<String> {
    args.get(index)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .ok_or_else(|| anyhow!("Missing {}\n\n{}", what, USAGE))
}

/// First argument that is neither a flag nor a flag's value
fn first_positional(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
            continue;
        }
        return Some(arg.clone());
    }
    None
}

fn flag_value<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match args.iter().position(|a| a == flag) {
        Some(i) => {
            let raw = args
                .get(i + 1)
                .filter(|v| !v.starts_with("--"))
                .ok_or_else(|| anyhow!("{} needs a value", flag))?;
            let value = raw
                .parse()
                .map_err(|e| anyhow!("Invalid value {:?} for {}: {}", raw, flag, e))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Log in, asking for the one-time code if the backend wants one
async fn complete_login(client: &ApiClient, email: &str, password: &str) -> Result<()> {
    let outcome = client
        .login(email, password)
        .await
        .with_context(|| format!("Login failed for {}", email))?;

    if let LoginOutcome::OtpRequired { message } = outcome {
        if let Some(message) = message {
            eprintln!("{}", message);
        }
        let otp = rpassword::prompt_password("One-time code: ")?;
        client
            .verify_login(email, &otp)
            .await
            .with_context(|| format!("Verification failed for {}", email))?;
    }
    Ok(())
}

/// Log in with the remembered password, or ask for it
pub async fn ensure_logged_in(client: &ApiClient, config: &Config) -> Result<()> {
    if client.session().is_authenticated().await {
        return Ok(());
    }
    let email = config
        .last_email
        .as_deref()
        .ok_or_else(|| anyhow!("Not logged in. Run `mpcwallet login <email>` first."))?;

    let store = CredentialStore::for_backend(client.base_url());
    let password = match store.get_password(email) {
        Ok(password) => {
            debug!(service = store.service(), "Using remembered password");
            password
        }
        Err(_) => rpassword::prompt_password(format!("Password for {}: ", email))?,
    };

    complete_login(client, email, &password).await
}

#[derive(Serialize)]
struct Overview {
    profile: mpcwallet_core::models::Profile,
    balance: mpcwallet_core::models::WalletBalance,
}

pub async fn run(command: Command, client: &ApiClient, config: &mut Config) -> Result<()> {
    if command.needs_auth() {
        ensure_logged_in(client, config).await?;
    }

    match command {
        Command::Help => {
            print!("{}", USAGE);
        }
        Command::Signup { email } => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirm = rpassword::prompt_password("Repeat password: ")?;
            if password != confirm {
                bail!("Passwords do not match");
            }
            let message = client
                .signup(&email, &password)
                .await
                .with_context(|| format!("Signup failed for {}", email))?;
            eprintln!(
                "{}",
                message.unwrap_or_else(|| format!("Account created for {}", email))
            );
        }
        Command::Login { email, remember } => {
            let password = rpassword::prompt_password("Password: ")?;
            complete_login(client, &email, &password).await?;

            if remember {
                CredentialStore::for_backend(client.base_url()).store(&email, &password)?;
                info!("Password stored in keychain");
            }
            config.last_email = Some(email.clone());
            config.save().context("Failed to save config")?;
            eprintln!("Logged in as {}", email);
        }
        Command::VerifyLogin { email, otp } => {
            client
                .verify_login(&email, &otp)
                .await
                .with_context(|| format!("Verification failed for {}", email))?;
            config.last_email = Some(email.clone());
            config.save().context("Failed to save config")?;
            eprintln!("Logged in as {}", email);
        }
        Command::Logout { email } => {
            let email = email.or_else(|| config.last_email.clone());
            if let Some(ref email) = email {
                let store = CredentialStore::for_backend(client.base_url());
                if store.has_credentials(email) {
                    store.delete(email)?;
                }
            }
            client.logout().await;
            if config.last_email.is_some() && config.last_email == email {
                config.last_email = None;
            }
            config.save().context("Failed to save config")?;
            eprintln!("Logged out");
        }
        Command::Me => print_json(&client.fetch_profile().await?)?,
        Command::Balance => print_json(&client.fetch_balance().await?)?,
        Command::Transactions { filter } => print_json(&client.fetch_transactions(&filter).await?)?,
        Command::Transaction { id } => print_json(&client.fetch_transaction(&id).await?)?,
        Command::Transfer { to, amount, symbol, chain_id, share_data } => {
            let share_data = match share_data {
                Some(share) => share,
                None => std::env::var(SHARE_DATA_ENV).map_err(|_| {
                    anyhow!("No key share: pass --share-data or set {}", SHARE_DATA_ENV)
                })?,
            };
            let from_address = client
                .fetch_profile()
                .await?
                .wallet_address
                .ok_or_else(|| anyhow!("This account has no wallet address yet"))?;
            let security_code = rpassword::prompt_password("Security code: ")?;

            let request = SubmitTransactionRequest {
                from_address,
                to_address: to,
                amount,
                symbol,
                share_data,
                chain_id,
                security_code,
            };
            let tx = client.submit_transaction(&request).await?;
            eprintln!("Transaction submitted");
            print_json(&tx)?;
        }
        Command::Overview => {
            let (profile, balance) =
                futures::try_join!(client.fetch_profile(), client.fetch_balance())?;
            print_json(&Overview { profile, balance })?;
        }
        Command::Orgs { page, limit } => print_json(&client.fetch_organizations(page, limit).await?)?,
        Command::Org { id } => print_json(&client.fetch_organization(&id).await?)?,
        Command::ApiKeys { org } => print_json(&client.fetch_api_keys(&org).await?)?,
        Command::CreateApiKey { org, name, permissions } => {
            let request = CreateApiKeyRequest {
                name,
                permissions,
                expires_at: None,
            };
            let created = client.create_api_key(&org, &request).await?;
            eprintln!("Store this key now, it will not be shown again.");
            print_json(&created)?;
        }
        Command::DeleteApiKey { org, key } => {
            client.delete_api_key(&org, &key).await?;
            eprintln!("Deleted API key {}", key);
        }
        Command::Usage { org } => print_json(&client.fetch_usage(&org).await?)?,
    }
    Ok(())
}
