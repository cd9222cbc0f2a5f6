//! ValTools command-line front end.
//!
//! Works against the same remote vault and worker scripts as the desktop
//! client. Secrets (blob-store access key, shared vault key, admin password)
//! are taken from flags or environment variables and never written to disk.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{debug, info};
use valtools_app_lib::commands;
use valtools_app_lib::security::{decode_token, encode_token_text, token_timestamp, KeyMaterial};
use valtools_app_lib::storage::{default_data_dir, SettingsStore};
use valtools_app_lib::worker::{actions, next_status, StatusEvent, WorkerSupervisor};
use valtools_app_lib::{guard_supervisor, init_state, init_tracing, AppState};

/// ValTools credential vault client
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding settings.json (defaults to the per-user data dir)
    #[arg(long, env = "VALTOOLS_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(flatten)]
    secrets: Secrets,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct Secrets {
    /// Access key for the remote blob store
    #[arg(long, env = "VALTOOLS_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Shared vault key (URL-safe base64, 32 bytes)
    #[arg(long, env = "VALTOOLS_SHARED_KEY", hide_env_values = true, global = true)]
    shared_key: Option<String>,

    /// Admin password, required for commands that modify the vault
    #[arg(long, env = "VALTOOLS_ADMIN_PASSWORD", hide_env_values = true, global = true)]
    admin_password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new random vault key
    Keygen,
    /// Encrypt text (argument or stdin) into a token with the shared key
    Encrypt { text: Option<String> },
    /// Decrypt a token with the shared key
    Decrypt { token: String },
    /// List stored accounts by category
    List,
    /// Add or replace an account
    Add {
        alias: String,
        username: String,
        password: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Remove an account
    Remove { alias: String },
    /// Set (or change) the admin password
    SetupAdmin {
        #[arg(long)]
        new_password: String,
    },
    /// Upload the current vault unchanged
    Push,
    /// Log in with a stored account through the automation worker
    Inject { alias: String },
    /// Steam Guard worker actions
    #[command(subcommand)]
    Guard(GuardCommand),
    /// Show or change local settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum GuardCommand {
    LoginAdmin {
        #[arg(long)]
        password: String,
    },
    LoginGuest {
        #[arg(long)]
        code: String,
    },
    SetupAdmin {
        #[arg(long)]
        password: String,
    },
    /// Save the accounts JSON in FILE
    SaveAccounts {
        #[arg(long)]
        master_key: String,
        file: PathBuf,
    },
    CreateVoucher {
        #[arg(long)]
        master_key: String,
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        steam_path: Option<String>,
        #[arg(long)]
        python: Option<String>,
        #[arg(long)]
        backend_dir: Option<PathBuf>,
        #[arg(long)]
        bin_id: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
    },
}

impl Secrets {
    fn shared_key(&self) -> Result<KeyMaterial> {
        let text = self
            .shared_key
            .as_deref()
            .context("Shared key missing (--shared-key or VALTOOLS_SHARED_KEY)")?;
        KeyMaterial::from_base64(text).context("Invalid shared key")
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("Blob store access key missing (--api-key or VALTOOLS_API_KEY)")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("valtools=info,valtools_app_lib=info")?;

    let args = Args::parse();
    let data_dir = match args.data_dir.clone() {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    debug!("Data directory: {:?}", data_dir);

    match args.command {
        Command::Keygen => {
            println!("{}", KeyMaterial::generate()?.to_base64());
        }
        Command::Encrypt { ref text } => {
            let text = match text {
                Some(text) => text.clone(),
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read stdin")?;
                    buf
                }
            };
            let key = args.secrets.shared_key()?;
            println!("{}", encode_token_text(text.as_bytes(), &key)?);
        }
        Command::Decrypt { ref token } => {
            let key = args.secrets.shared_key()?;
            let plaintext = decode_token(token.as_bytes(), &key)?;
            info!("Token issued at {}", token_timestamp(token.as_bytes())?);
            println!("{}", String::from_utf8_lossy(&plaintext));
        }
        Command::Settings(command) => run_settings(SettingsStore::in_dir(&data_dir), command)?,
        // Guard actions talk to their own backend and do not need the vault
        Command::Guard(command) => {
            let guard = guard_supervisor(&data_dir)?;
            let reply = run_guard(&guard, command).await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        command => {
            let state = init_state(
                &data_dir,
                args.secrets.api_key()?,
                args.secrets.shared_key()?,
            )?;
            run_vault_command(&state, &args.secrets, command).await?;
        }
    }

    Ok(())
}

async fn run_vault_command(state: &AppState, secrets: &Secrets, command: Command) -> Result<()> {
    commands::load_cloud_data(state)
        .await
        .context("Failed to load vault")?;

    // A vault without an admin password only accepts `setup-admin`
    if command_needs_admin(&command) && state.payload().await?.has_admin() {
        let password = secrets
            .admin_password
            .clone()
            .context("Admin password missing (--admin-password or VALTOOLS_ADMIN_PASSWORD)")?;
        if !commands::login_admin(state, password).await? {
            bail!("Wrong admin password");
        }
    }

    match command {
        Command::List => {
            let payload = state.payload().await?;
            for (category, aliases) in payload.categories() {
                println!("{}", category);
                for alias in aliases {
                    if let Some(record) = payload.account(&alias) {
                        println!("  {} ({})", alias, record.username);
                    }
                }
            }
        }
        Command::Add {
            alias,
            username,
            password,
            category,
        } => {
            commands::upsert_account(state, alias, username, password, category).await?;
        }
        Command::Remove { alias } => {
            commands::delete_account(state, alias).await?;
        }
        Command::SetupAdmin { new_password } => {
            commands::setup_admin(state, new_password).await?;
        }
        Command::Push => {
            commands::save_cloud_data(state).await?;
        }
        Command::Inject { alias } => {
            let result = run_injection(state, alias).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Keygen
        | Command::Encrypt { .. }
        | Command::Decrypt { .. }
        | Command::Guard(_)
        | Command::Settings(_) => unreachable!("handled before the vault is loaded"),
    }

    Ok(())
}

fn command_needs_admin(command: &Command) -> bool {
    matches!(
        command,
        Command::Add { .. } | Command::Remove { .. } | Command::SetupAdmin { .. }
    )
}

async fn run_guard(guard: &WorkerSupervisor, command: GuardCommand) -> Result<serde_json::Value> {
    let invocation = match command {
        GuardCommand::LoginAdmin { password } => actions::login_admin(&password),
        GuardCommand::LoginGuest { code } => actions::login_guest(&code),
        GuardCommand::SetupAdmin { password } => actions::setup_admin(&password),
        GuardCommand::SaveAccounts { master_key, file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read accounts from {:?}", file))?;
            let accounts: serde_json::Value =
                serde_json::from_str(&content).context("Accounts file is not valid JSON")?;
            actions::save_accounts(&master_key, accounts)
        }
        GuardCommand::CreateVoucher { master_key, days } => {
            actions::create_voucher(&master_key, days.unwrap_or(actions::DEFAULT_VOUCHER_DAYS))
        }
    };
    Ok(actions::run_guard_action(guard, invocation).await?)
}

/// Run the injection while printing status events. Ctrl-C aborts the worker.
async fn run_injection(state: &AppState, alias: String) -> Result<serde_json::Value> {
    let mut events = state.events.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = next_status(&mut events).await {
            print_status(&event);
        }
    });

    let injection = commands::run_injection(state, alias);
    tokio::pin!(injection);

    let finished = tokio::select! {
        result = &mut injection => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let result = match finished {
        Some(result) => result,
        None => {
            info!("Interrupted, stopping worker");
            commands::abort_injection(state).await?;
            injection.await
        }
    };

    printer.abort();
    Ok(result?)
}

fn print_status(event: &StatusEvent) {
    match &event.subtext {
        Some(subtext) => println!("» {} ({})", event.text, subtext),
        None => println!("» {}", event.text),
    }
}

fn run_settings(store: SettingsStore, command: SettingsCommand) -> Result<()> {
    let mut settings = store.load()?;

    if let SettingsCommand::Set {
        steam_path,
        python,
        backend_dir,
        bin_id,
        base_url,
    } = command
    {
        if let Some(steam_path) = steam_path {
            settings.steam_path = steam_path;
        }
        if let Some(python) = python {
            settings.python_program = python;
        }
        if let Some(backend_dir) = backend_dir {
            settings.backend_dir = backend_dir;
        }
        if let Some(bin_id) = bin_id {
            settings.cloud.bin_id = bin_id;
        }
        if let Some(base_url) = base_url {
            settings.cloud.base_url = base_url;
        }
        store.save(&settings)?;
        info!("Saved settings to {:?}", store.path());
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
