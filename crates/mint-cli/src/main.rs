use alloy::primitives::Address;
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use mint_data::blocks::{BlockFetcher, BlockSource};
use mint_data::etherscan::EtherscanClient;
use mint_data::notify::{NotificationSink, WebhookNotifier};
use mint_data::store::{CacheStore, Store};
use mint_scan::config::{parse_token_id_ceiling, ConfigError, TokenStandard, DEFAULT_BURN_ADDRESS};
use mint_scan::{MonitorConfig, TransferClassifier};
use mint_trending::{CycleDriver, History, TrendingWindow};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct AppContext {
    db_path: String,
    rpc_url: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "free-mint-watch")]
#[command(about = "Watches Ethereum blocks for trending free NFT mints")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[arg(long, global = true, default_value = "data/free-mint.sqlite")]
    db_path: String,

    #[arg(long, global = true, env = "FREE_MINT_RPC_URL")]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll new blocks and announce trending free mints.
    Watch(WatchArgs),
    /// Scan one block for free-mint transfers without ABI lookups.
    Scan(ScanArgs),
    /// List contracts already announced.
    History(HistoryArgs),
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(long, env = "ETHERSCAN_API_KEY")]
    etherscan_api_key: String,

    #[arg(long, env = "FREE_MINT_CHAIN_ID", default_value_t = 1)]
    chain_id: u64,

    /// Discord-compatible webhook; entries are logged when unset.
    #[arg(long, env = "DISCORD_API_ENDPOINT")]
    webhook_url: Option<String>,

    #[command(flatten)]
    monitor: MonitorArgs,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Block to scan; defaults to the chain head.
    #[arg(long)]
    block: Option<u64>,

    #[command(flatten)]
    monitor: MonitorArgs,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    #[arg(
        long,
        env = "URI_BLOCK_EXPLORER_ADDRESS",
        default_value = "https://etherscan.io/address/"
    )]
    explorer_url: String,
}

/// Pipeline tunables shared by `watch` and `scan`.
#[derive(Args, Debug)]
struct MonitorArgs {
    #[arg(
        long,
        env = "URI_BLOCK_EXPLORER_ADDRESS",
        default_value = "https://etherscan.io/address/"
    )]
    explorer_url: String,

    #[arg(long, env = "INTERVAL_CHECK_MILLISECONDS", default_value_t = 12_000)]
    poll_interval_ms: u64,

    #[arg(long, env = "INTERVAL_PROCESS_MILLISECONDS", default_value_t = 300_000)]
    process_interval_ms: u64,

    #[arg(long, env = "MAX_TRENDING_RESULTS", default_value_t = 10)]
    max_trending_results: usize,

    #[arg(long, env = "MAX_TRANSFERS_PER_TRANSACTION", default_value_t = 5)]
    max_transfers_per_transaction: usize,

    /// Exclusive token id ceiling, decimal or 0x hex.
    #[arg(long, env = "MAX_TRANSFER_TOKEN_ID_VALUE", default_value = "10000")]
    max_token_id: String,

    /// External ABI fetches per cycle.
    #[arg(long, env = "ETHERSCAN_RATE_LIMIT_PER_SECOND", default_value_t = 5)]
    abi_fetch_limit: u32,

    #[arg(long, env = "FREE_MINT_CONFIRMATIONS", default_value_t = 1)]
    confirmations: u64,

    #[arg(
        long,
        env = "FREE_MINT_STANDARDS",
        value_delimiter = ',',
        default_value = "erc721,erc1155"
    )]
    standards: Vec<String>,

    #[arg(long, value_delimiter = ',', default_value = "mint,public")]
    function_whitelist: Vec<String>,

    #[arg(long, value_delimiter = ',', default_value = "private,whitelist")]
    function_blacklist: Vec<String>,

    #[arg(long, value_delimiter = ',', default_value = "sign,root,proof,whitelist")]
    parameter_blacklist: Vec<String>,

    #[arg(long)]
    burn_address: Option<String>,
}

impl MonitorArgs {
    fn into_config(self) -> Result<MonitorConfig, ConfigError> {
        let standards = self
            .standards
            .iter()
            .map(|s| s.parse::<TokenStandard>())
            .collect::<Result<Vec<_>, _>>()?;

        let burn_address = match self.burn_address {
            Some(raw) => raw.parse::<Address>().map_err(|err| ConfigError::Invalid {
                field: "burn_address",
                reason: err.to_string(),
            })?,
            None => DEFAULT_BURN_ADDRESS,
        };

        MonitorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            process_interval: Duration::from_millis(self.process_interval_ms),
            max_trending_results: self.max_trending_results,
            max_transfers_per_transaction: self.max_transfers_per_transaction,
            max_token_id: parse_token_id_ceiling(&self.max_token_id)?,
            abi_fetch_limit: self.abi_fetch_limit,
            confirmations: self.confirmations,
            standards,
            function_whitelist: self.function_whitelist,
            function_blacklist: self.function_blacklist,
            parameter_blacklist: self.parameter_blacklist,
            burn_address,
            explorer_url: self.explorer_url,
        }
        .validate()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        db_path: cli.db_path,
        rpc_url: cli.rpc_url,
    };

    match cli.command {
        Commands::Watch(args) => handle_watch(&ctx, args).await,
        Commands::Scan(args) => handle_scan(&ctx, args).await,
        Commands::History(args) => handle_history(&ctx, args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn open_store(db_path: &str) -> Result<Arc<Store>> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(Arc::new(Store::new(db_path)?))
}

fn require_rpc_url<'a>(ctx: &'a AppContext, command: &str) -> Result<&'a str> {
    ctx.rpc_url
        .as_deref()
        .ok_or_else(|| eyre!("FREE_MINT_RPC_URL is required for {} command", command))
}

async fn handle_watch(ctx: &AppContext, args: WatchArgs) -> Result<()> {
    let config = args
        .monitor
        .into_config()
        .wrap_err("invalid monitor configuration")?;
    let rpc_url = require_rpc_url(ctx, "watch")?;

    let store: Arc<dyn CacheStore> = open_store(&ctx.db_path)?;
    let blocks = BlockFetcher::new(rpc_url).await?;
    let etherscan = EtherscanClient::new(args.etherscan_api_key, args.chain_id, HTTP_TIMEOUT)?;
    let sink = match args.webhook_url {
        Some(url) => NotificationSink::Webhook(WebhookNotifier::new(url, HTTP_TIMEOUT)?),
        None => NotificationSink::Log,
    };

    let poll_interval = config.poll_interval;
    let driver = CycleDriver::new(config, blocks, etherscan, sink, store);
    let mut state = driver.initial_state(Utc::now());
    info!(
        history = state.history.len(),
        poll_ms = poll_interval.as_millis() as u64,
        process_ms = driver.config().process_interval.as_millis() as u64,
        "watching for free mints"
    );

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (next, report) = driver.run_cycle(state, Utc::now()).await;
                state = next;
                if let Some(entries) = report.flushed {
                    for entry in &entries {
                        info!(
                            rank = entry.rank,
                            contract = %entry.address,
                            transactions = entry.transaction_count,
                            transfers = entry.transfer_count,
                            "trending"
                        );
                    }
                }
            }
            signal = &mut shutdown => {
                signal.wrap_err("failed to listen for ctrl-c")?;
                info!("shutting down");
                break;
            }
        }
    }

    driver
        .persist_history(&state)
        .wrap_err("failed to persist history on shutdown")?;
    info!(history = state.history.len(), "history saved");
    Ok(())
}

async fn handle_scan(ctx: &AppContext, args: ScanArgs) -> Result<()> {
    let config = args
        .monitor
        .into_config()
        .wrap_err("invalid monitor configuration")?;
    let rpc_url = require_rpc_url(ctx, "scan")?;
    let blocks = BlockFetcher::new(rpc_url).await?;

    let number = match args.block {
        Some(number) => number,
        None => blocks.latest_block_number().await?,
    };
    let block = blocks
        .fetch_block(number)
        .await?
        .ok_or_else(|| eyre!("block {} not found", number))?;

    let classifier = TransferClassifier::new(&config);
    let mut window = TrendingWindow::new();
    let observed_at = Utc::now();
    for tx in &block.transactions {
        if let Some(matched) = classifier.classify_transaction(tx) {
            window.record(matched.contract, matched.transfer_count(), observed_at);
        }
    }

    let ranked = window.rank(window.len());
    if ranked.is_empty() {
        println!("No free-mint transfers in block {}.", block.number);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Rank", "Contract", "Transactions", "Transfers", "Explorer"]);
    for entry in &ranked {
        table.add_row(vec![
            entry.rank.to_string(),
            entry.address.to_string(),
            entry.transaction_count.to_string(),
            entry.transfer_count.to_string(),
            format!("{}{}", config.explorer_url, entry.address),
        ]);
    }

    println!("Block {} ({} transactions)", block.number, block.transactions.len());
    println!("{}", table);
    Ok(())
}

fn handle_history(ctx: &AppContext, args: HistoryArgs) -> Result<()> {
    let store = open_store(&ctx.db_path)?;
    let history = History::load(store.as_ref());

    if history.is_empty() {
        println!("No contracts announced yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "Contract", "Explorer"]);
    for (i, address) in history.addresses().iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            address.to_string(),
            format!("{}{}", args.explorer_url, address),
        ]);
    }

    println!("{}", table);
    println!("Announced contracts: {}", history.len());
    Ok(())
}
