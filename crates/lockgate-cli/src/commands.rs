//! CLI command implementations

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use lockgate_core::connectivity::ProbeHandle;
use lockgate_core::lockout::format_countdown;
use lockgate_core::{
    AttemptOutcome, ConnectivityMonitor, CredentialStore, DemoAuthenticator, FailureRecord,
    FileStore, GuardConfig, LockoutPolicy, LoginController, TcpProbe,
};

/// Lockgate - login guard with failure lockout
#[derive(Parser, Debug)]
#[command(name = "lockgate")]
#[command(about = "Login guard with failure tracking and timed lockout")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to $LOCKGATE_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Attempt a login
    Login {
        /// Username
        #[arg(short, long)]
        username: String,

        /// Password (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,

        /// Remember the auth token after a successful login
        #[arg(long)]
        remember_me: bool,

        /// Treat the device as offline
        #[arg(long, conflicts_with = "assume_online")]
        offline: bool,

        /// Skip the connectivity probe and treat the device as online
        #[arg(long)]
        assume_online: bool,

        /// Follow the lockout countdown until it lifts
        #[arg(long)]
        wait: bool,

        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the persisted failure record
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the persisted failure record and remembered token
    Reset,

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

/// How the login command decides it is online
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    Probe,
    Online,
    Offline,
}

impl ConnectivityMode {
    pub fn from_flags(offline: bool, assume_online: bool) -> Self {
        if offline {
            ConnectivityMode::Offline
        } else if assume_online {
            ConnectivityMode::Online
        } else {
            ConnectivityMode::Probe
        }
    }
}

/// Run the CLI; returns whether the command succeeded
pub async fn run(cli: Cli) -> Result<bool> {
    let config_path = cli.config.clone().or_else(GuardConfig::config_file_path);
    let config = load_config(config_path.as_deref())?;

    match cli.command {
        Commands::Login {
            username,
            password,
            remember_me,
            offline,
            assume_online,
            wait,
            json,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            let mode = ConnectivityMode::from_flags(offline, assume_online);
            login(&config, &username, &password, remember_me, mode, wait, json).await
        }

        Commands::Status { json } => {
            let store = FileStore::open(&config.store_path)?;
            let record = store.failure_record()?;
            let remembered = store.saved_token()?.is_some();
            let policy = config.policy();

            if json {
                let value = serde_json::json!({
                    "failureCount": record.failure_count,
                    "lockoutUntil": record.lockout_until,
                    "attemptsRemaining": policy.attempts_remaining(record.failure_count),
                    "tokenRemembered": remembered,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Store: {}", store.path().display());
                for line in describe_status(&record, &policy, remembered) {
                    println!("{}", line);
                }
            }
            Ok(true)
        }

        Commands::Reset => {
            let store = FileStore::open(&config.store_path)?;
            store.clear()?;
            println!("Cleared {}", store.path().display());
            Ok(true)
        }

        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                let path = config_path.context("Could not determine config directory")?;
                config.save(&path)?;
                println!("Wrote {}", path.display());
            }
            Ok(true)
        }
    }
}

/// Human-readable lines for the persisted failure record
pub fn describe_status(
    record: &FailureRecord,
    policy: &LockoutPolicy,
    token_remembered: bool,
) -> Vec<String> {
    let locked = match record.lockout_until {
        Some(until) => format!("Locked until: {} (epoch ms)", until),
        None => "Locked: No".to_string(),
    };
    vec![
        format!(
            "Failed attempts: {}/{} ({})",
            record.failure_count,
            policy.threshold,
            policy.describe_lockout(record.failure_count)
        ),
        locked,
        format!(
            "Token remembered: {}",
            if token_remembered { "Yes" } else { "No" }
        ),
    ]
}

fn load_config(path: Option<&Path>) -> Result<GuardConfig> {
    match path {
        Some(path) if path.exists() => {
            debug!("Loading config from {:?}", path);
            Ok(GuardConfig::load(path)?)
        }
        _ => Ok(GuardConfig::default()),
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn login(
    config: &GuardConfig,
    username: &str,
    password: &str,
    remember_me: bool,
    mode: ConnectivityMode,
    wait: bool,
    json: bool,
) -> Result<bool> {
    config.ensure_directories()?;
    let store = Arc::new(FileStore::open(&config.store_path)?);

    let monitor = ConnectivityMonitor::default();
    let _probe = start_connectivity(config, &monitor, mode).await;

    let controller = LoginController::builder(
        store,
        Arc::new(DemoAuthenticator::default()),
        Arc::new(monitor.clone()),
    )
    .settings(config.controller_settings())
    .start();

    if controller.state().is_locked_out {
        println!(
            "Locked out: try again in {}",
            format_countdown(controller.state().lockout_seconds_remaining)
        );
        if !wait {
            return Ok(false);
        }
        wait_for_unlock(&controller).await?;
    }

    controller.on_username_change(username);
    controller.on_password_change(password);
    controller.on_remember_me_change(remember_me);

    let outcome = controller.login().await;
    if json {
        let snapshot = controller.snapshot().redacted();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", describe_outcome(&outcome, &controller));
    }

    if matches!(outcome, AttemptOutcome::LockedOut { .. }) && wait {
        wait_for_unlock(&controller).await?;
    }

    controller.cancel_lockout_timer();
    Ok(outcome == AttemptOutcome::Succeeded)
}

async fn start_connectivity(
    config: &GuardConfig,
    monitor: &ConnectivityMonitor,
    mode: ConnectivityMode,
) -> Option<ProbeHandle> {
    match mode {
        ConnectivityMode::Offline => {
            monitor.set_online(false);
            None
        }
        ConnectivityMode::Online => {
            monitor.set_online(true);
            None
        }
        ConnectivityMode::Probe => {
            let probe = TcpProbe::new(
                config.probe_addr.clone(),
                config.probe_interval(),
                config.probe_timeout(),
            );
            monitor.set_online(probe.check().await);
            Some(probe.spawn(monitor.clone()))
        }
    }
}

/// Print the countdown until the lockout lifts or the user interrupts
async fn wait_for_unlock(controller: &LoginController) -> Result<()> {
    let mut rx = controller.subscribe();
    loop {
        let state = rx.borrow_and_update().clone();
        if !state.is_locked_out {
            eprintln!();
            println!("Lockout lifted");
            return Ok(());
        }
        eprint!(
            "\rLocked out: {} remaining ",
            format_countdown(state.lockout_seconds_remaining)
        );
        io::stderr().flush()?;

        tokio::select! {
            changed = rx.changed() => changed.context("Controller stopped")?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                anyhow::bail!("Interrupted while locked out");
            }
        }
    }
}

/// One-line description of an attempt
pub fn describe_outcome(outcome: &AttemptOutcome, controller: &LoginController) -> String {
    match outcome {
        AttemptOutcome::Ignored => {
            let state = controller.state();
            if state.is_locked_out {
                "Locked out".to_string()
            } else {
                format!(
                    "Login not attempted: username required and password must be at least {} characters",
                    controller.settings().min_password_len
                )
            }
        }
        AttemptOutcome::Offline => "No internet connection".to_string(),
        AttemptOutcome::Succeeded => {
            if controller.remembered_token().is_some() {
                "Login succeeded (token remembered)".to_string()
            } else {
                "Login succeeded".to_string()
            }
        }
        AttemptOutcome::Failed { attempt, threshold } => {
            format!("Login failed (Attempt {}/{})", attempt, threshold)
        }
        AttemptOutcome::LockedOut { seconds } => {
            format!("Too many failed attempts: locked for {}", format_countdown(*seconds))
        }
        AttemptOutcome::Unrecorded => "Login failed".to_string(),
    }
}
