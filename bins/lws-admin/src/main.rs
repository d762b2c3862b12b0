//! Light-wallet store administration.
//!
//! Opens the account store and prints accounts and account views as JSON.
//! Hidden accounts are listed by `accounts` but cannot be viewed.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use lws_core::types::{AccountAddress, AccountId, AccountStatus, BlockId, ViewKey};
use lws_db::{LwsConfig, Storage, StorageReader};
use lws_view::{
    LockContext, UnspentRequest, address_info, address_txs, open_account, output_view,
    unspent_outputs,
};

#[derive(Parser, Debug)]
#[command(name = "lws-admin", version, about = "Inspect a light-wallet server account store")]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory holding the store; overrides the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Account credentials, both hex encoded.
#[derive(clap::Args, Debug)]
struct Credentials {
    /// Spend public key followed by view public key (128 hex chars)
    address: String,
    /// View secret key (64 hex chars)
    view_key: String,
}

impl Credentials {
    fn parse(&self) -> anyhow::Result<(AccountAddress, ViewKey)> {
        let address = AccountAddress::from_hex(&self.address).context("invalid address")?;
        let view_key = ViewKey::from_hex(&self.view_key).context("invalid view key")?;
        Ok((address, view_key))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every account grouped by status, hidden ones included
    Accounts,
    /// Print the last synced block
    LastBlock,
    /// Totals and spent outputs of an account
    AddressInfo(Credentials),
    /// Per-transaction history of an account
    AddressTxs(Credentials),
    /// Every output of an account with spends and RingCT fields
    Outputs(Credentials),
    /// Outputs selectable as transaction inputs
    Unspent {
        #[command(flatten)]
        credentials: Credentials,
        /// Minimum total the selected outputs must reach
        #[arg(long, default_value_t = 0)]
        amount: u64,
        /// Minimum ring size of a selected output
        #[arg(long)]
        mixin: Option<u32>,
        /// Include outputs below the dust threshold
        #[arg(long)]
        use_dust: bool,
        #[arg(long)]
        dust_threshold: Option<u64>,
    },
}

#[derive(Serialize)]
struct AccountEntry {
    id: AccountId,
    status: AccountStatus,
    address: AccountAddress,
    scan_height: BlockId,
    start_height: BlockId,
    access_time: u64,
    creation_time: u64,
}

fn main() {
    let args = Args::parse();

    let mut config = match LwsConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            process::exit(1);
        }
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    config.create_if_missing = false;

    init_logging(&config.log_level, &config.log_format);
    info!("lws-admin v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);

    if let Err(e) = run(&config, args.command) {
        error!("{e:#}");
        process::exit(1);
    }
}

fn run(config: &LwsConfig, command: Command) -> anyhow::Result<()> {
    let store = Storage::open_with(config).context("failed to open store")?;
    let reader = store.start_read()?;

    match command {
        Command::Accounts => print(&list_accounts(&reader)?),
        Command::LastBlock => print(&reader.get_last_block()?),
        Command::AddressInfo(credentials) => {
            let (address, view_key) = credentials.parse()?;
            let account = open_account(&reader, &address, &view_key)?;
            let lock = LockContext::for_reader(&reader)?;
            print(&address_info(&reader, &account, &lock)?)
        }
        Command::AddressTxs(credentials) => {
            let (address, view_key) = credentials.parse()?;
            let account = open_account(&reader, &address, &view_key)?;
            let lock = LockContext::for_reader(&reader)?;
            print(&address_txs(&reader, &account, &lock)?)
        }
        Command::Outputs(credentials) => {
            let (address, view_key) = credentials.parse()?;
            let account = open_account(&reader, &address, &view_key)?;
            let lock = LockContext::for_reader(&reader)?;
            print(&output_view(&reader, &account, &lock)?)
        }
        Command::Unspent { credentials, amount, mixin, use_dust, dust_threshold } => {
            let (address, view_key) = credentials.parse()?;
            let account = open_account(&reader, &address, &view_key)?;
            let lock = LockContext::for_reader(&reader)?;
            let request =
                UnspentRequest { amount, mixin, use_dust: Some(use_dust), dust_threshold };
            print(&unspent_outputs(&reader, &account, &lock, &request)?)
        }
    }
}

fn list_accounts(reader: &StorageReader<'_>) -> anyhow::Result<Vec<AccountEntry>> {
    let mut stream = reader.get_accounts()?;
    let mut entries = Vec::new();
    {
        let mut groups = stream.make_iterator();
        while let Some((status, accounts)) = groups.next_group() {
            entries.extend(accounts.map(|account| AccountEntry {
                id: account.id,
                status,
                address: account.address,
                scan_height: account.scan_height,
                start_height: account.start_height,
                access_time: account.access_time,
                creation_time: account.creation_time,
            }));
        }
    }
    stream.status()?;
    Ok(entries)
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `RUST_LOG` takes precedence over `level_str`. Pass `format = "json"` for
/// structured output; any other value selects human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    // Logs go to stderr so stdout stays valid JSON.
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
