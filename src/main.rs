//! Tip Jar CLI
//!
//! Drives a wallet session against a JSON-RPC wallet endpoint.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tipjar_wallet::units::parse_units;
use tipjar_wallet::{
    Config, Error, HttpProvider, IdentityClient, NetworkConfig, NetworkOutcome, Result, TxStatus,
    WalletSession,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tipjar")]
#[command(about = "Tip jar wallet session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wallet state for already-authorized accounts
    Status,

    /// Ask the wallet for account access
    Connect,

    /// Switch the wallet to a network, adding it if unknown
    SwitchNetwork {
        /// Network name (ethereum, arbitrum, optimism, base, polygon, sepolia) or chain ID.
        /// Defaults to the configured network.
        #[arg(short, long)]
        network: Option<String>,
    },

    /// Deposit into the tip jar
    Deposit {
        /// Amount in whole currency units (e.g. 0.01)
        #[arg(long)]
        amount: String,

        /// Return after broadcast instead of waiting for confirmation
        #[arg(long)]
        no_wait: bool,
    },

    /// Withdraw from the tip jar
    Withdraw {
        /// Amount in whole currency units (e.g. 0.01)
        #[arg(long)]
        amount: String,

        /// Return after broadcast instead of waiting for confirmation
        #[arg(long)]
        no_wait: bool,
    },

    /// Print wallet state whenever accounts or chain change
    Watch,

    /// Link a Discord identity to the connected address
    Link {
        /// Discord user ID; resolved through the backend when omitted
        #[arg(long)]
        discord_id: Option<String>,
    },

    /// Show current configuration
    Config,
}

#[derive(Clone, Copy)]
enum Action {
    Deposit,
    Withdraw,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Status => run_status(&config).await?,
        Commands::Connect => run_connect(&config).await?,
        Commands::SwitchNetwork { network } => run_switch(&config, network).await?,
        Commands::Deposit { amount, no_wait } => {
            run_transaction(&config, Action::Deposit, &amount, no_wait).await?
        }
        Commands::Withdraw { amount, no_wait } => {
            run_transaction(&config, Action::Withdraw, &amount, no_wait).await?
        }
        Commands::Watch => run_watch(&config).await?,
        Commands::Link { discord_id } => run_link(&config, discord_id).await?,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn open_session(config: &Config) -> Result<WalletSession<HttpProvider>> {
    match WalletSession::detect(config).await? {
        Some(session) => Ok(session),
        None => {
            tracing::warn!(
                "No wallet provider found. Set TIPJAR_RPC_URL or provider.rpc_url in the config file"
            );
            Err(Error::ProviderAbsent)
        }
    }
}

fn print_state(session: &WalletSession<HttpProvider>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(session.state())?);
    Ok(())
}

async fn run_status(config: &Config) -> Result<()> {
    let mut session = open_session(config).await?;
    session.start().await?;
    print_state(&session)
}

/// Start the session and make sure an account is available, prompting if needed
async fn ensure_connected(session: &mut WalletSession<HttpProvider>) -> Result<()> {
    session.start().await?;
    if !session.is_connected() {
        session.connect().await?;
    }
    if session.is_connected() {
        Ok(())
    } else {
        Err(Error::NotConnected)
    }
}

async fn run_connect(config: &Config) -> Result<()> {
    let mut session = open_session(config).await?;
    match session.connect().await {
        Ok(state) if !state.is_connected() => {
            println!("Wallet returned no accounts");
            Ok(())
        }
        Ok(_) => print_state(&session),
        Err(e) if e.is_expected() => {
            println!("Connection declined: {}", session.error().message);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn run_switch(config: &Config, network: Option<String>) -> Result<()> {
    let target = match network {
        Some(name) => NetworkConfig::from_name_or_id(&name)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown network: {}", name)))?,
        None => config.network.clone(),
    };

    let mut session = open_session(config).await?;
    session.start().await?;

    match session.ensure_network(&target).await {
        NetworkOutcome::AlreadyActive => println!("Already on {}", target.chain_name),
        NetworkOutcome::Switched => println!("Switched to {}", target.chain_name),
        NetworkOutcome::Added => println!("Added and switched to {}", target.chain_name),
        NetworkOutcome::AddedNotSwitched(e) => {
            println!("Added {} but could not switch: {}", target.chain_name, e)
        }
        NetworkOutcome::SwitchFailed(e) | NetworkOutcome::AddFailed(e) => {
            println!("Staying on current network: {}", e)
        }
    }
    Ok(())
}

async fn run_transaction(config: &Config, action: Action, amount: &str, no_wait: bool) -> Result<()> {
    let amount = parse_units(amount, config.network.native_currency.decimals)?;

    let mut session = open_session(config).await?;
    ensure_connected(&mut session).await?;

    let outcome = session.ensure_network(&config.network).await;
    if !outcome.is_on_target() {
        tracing::warn!(
            target_chain = config.network.chain_id,
            current_chain = %session.state().chain_id,
            "Continuing on the current network"
        );
    }

    let mut handle = match action {
        Action::Deposit => session.deposit(amount)?,
        Action::Withdraw => session.withdraw(amount)?,
    };
    println!("Confirm the {} in your wallet", handle.method());

    let mut updates = handle.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(15));
    ticker.tick().await;
    let mut announced = false;
    loop {
        let status = updates.borrow_and_update().clone();
        if let Some(hash) = status.hash() {
            if !announced {
                println!("Transaction hash: {}", hash);
                announced = true;
            }
            if no_wait {
                return Ok(());
            }
        }
        if status.is_final() {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                tracing::info!(method = handle.method(), status = status.label(), "Still waiting");
            }
            _ = tokio::signal::ctrl_c() => {
                handle.abandon();
                break;
            }
        }
    }

    match session.observe_transaction(&handle) {
        TxStatus::Success(hash) => println!("Confirmed: {}", hash),
        TxStatus::Rejected(_) => println!("Not sent: {}", session.error().message),
        TxStatus::Failed(reason) => println!("Failed: {}", reason),
        other => println!("Stopped while {}", other.label()),
    }
    Ok(())
}

async fn run_watch(config: &Config) -> Result<()> {
    let mut session = open_session(config).await?;
    session.start().await?;
    session
        .provider()
        .spawn_watcher(Duration::from_millis(config.provider.watch_interval_ms));
    print_state(&session)?;

    loop {
        tokio::select! {
            result = session.next_event() => {
                match result {
                    Ok(_) => print_state(&session)?,
                    Err(e) => tracing::warn!(error = %e, "Failed to apply wallet event"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watch");
                break;
            }
        }
    }

    session.teardown();
    Ok(())
}

async fn run_link(config: &Config, discord_id: Option<String>) -> Result<()> {
    let client = IdentityClient::from_config(&config.identity)?.ok_or_else(|| {
        Error::Config("Identity endpoint not configured (TIPJAR_IDENTITY_URL)".to_string())
    })?;

    let mut session = open_session(config).await?;
    ensure_connected(&mut session).await?;

    let response = session.link_identity(&client, discord_id.as_deref()).await?;
    println!(
        "Linked {} to Discord user {}",
        session.state().primary_account().unwrap_or_default(),
        response.discord_id.as_deref().unwrap_or("(unknown)")
    );
    Ok(())
}
