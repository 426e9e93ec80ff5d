//! Sweeper - moves every asset held by one wallet to another.
//!
//! # Usage
//!
//! ```bash
//! # Preview the batches without submitting anything
//! sweeper --keypair ~/.config/solana/id.json --destination <PUBKEY> --dry-run
//!
//! # Sweep with environment overrides
//! RPC_URL=https://api.devnet.solana.com KEYPAIR_PATH=id.json DESTINATION=<PUBKEY> sweeper -y
//! ```

use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use sweeper_core::metrics::init_metrics;
use sweeper_core::models::{
    Address, BatchStatus, FinalityTier, Instruction, RunResult, TokenBalance, TransferPlan,
};
use sweeper_core::ports::{BalanceIndex, TransactionSigner};
use sweeper_core::services::{
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_RENT_EXEMPT_RESERVE, ScanOrder, SweepConfig, SweepRequest,
    SweepService, SweepSplit, TokenPriority,
};
use sweeper_solana::instructions::{to_address, to_pubkey};
use sweeper_solana::{HttpBalanceIndex, KeypairSigner, SolanaRpcClient, SolanaRpcConfig};

/// Sweeper CLI - multi-asset batch transfer.
#[derive(Parser, Debug)]
#[command(name = "sweeper")]
#[command(about = "Sweeper - move every token and the native balance to one destination")]
#[command(version)]
struct Cli {
    /// Solana JSON-RPC URL.
    #[arg(long, env = "RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    rpc_url: String,

    /// Path to the source wallet keypair (JSON byte array).
    #[arg(long, env = "KEYPAIR_PATH")]
    keypair: String,

    /// Destination wallet public key.
    #[arg(long, env = "DESTINATION", value_parser = parse_address)]
    destination: Address,

    /// Wallet balance index base URL (fast scan path).
    #[arg(long, env = "INDEX_URL")]
    index_url: Option<String>,

    /// API key for the balance index.
    #[arg(long, env = "INDEX_API_KEY", hide_env_values = true)]
    index_api_key: Option<String>,

    /// Maximum token transfers per transaction.
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    max_batch_size: usize,

    /// Native units kept on the source wallet.
    #[arg(long, env = "RENT_EXEMPT_RESERVE", default_value_t = DEFAULT_RENT_EXEMPT_RESERVE)]
    reserve: u64,

    /// Share of the usable native balance sent with the last token batch.
    #[arg(long, default_value_t = 70)]
    final_batch_percent: u8,

    /// Share of the usable native balance sent in the trailing batch.
    #[arg(long, default_value_t = 30)]
    trailing_percent: u8,

    /// Finality tier: processed, confirmed or finalized.
    #[arg(long, env = "FINALITY", default_value = "confirmed")]
    finality: FinalityTier,

    /// Transport resend budget per transaction.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Skip the node's pre-submission simulation.
    #[arg(long)]
    skip_preflight: bool,

    /// Delay before the post-run balance refresh, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    settle_delay_ms: u64,

    /// Token ordering: scan (as listed) or amount (largest display amount first).
    #[arg(long, default_value = "scan", value_parser = parse_priority)]
    priority: PriorityMode,

    /// Build and print the batches without submitting.
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    yes: bool,

    /// Print the run result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Prometheus metrics port; metrics are disabled when unset.
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Copy)]
enum PriorityMode {
    Scan,
    Amount,
}

impl PriorityMode {
    fn into_priority(self) -> Arc<dyn TokenPriority> {
        match self {
            Self::Scan => Arc::new(ScanOrder),
            Self::Amount => Arc::new(|token: &TokenBalance| token.ui_amount()),
        }
    }
}

/// Parse token priority from string.
fn parse_priority(s: &str) -> Result<PriorityMode, String> {
    match s.to_lowercase().as_str() {
        "scan" => Ok(PriorityMode::Scan),
        "amount" => Ok(PriorityMode::Amount),
        _ => Err(format!("Invalid priority '{}'. Use 'scan' or 'amount'.", s)),
    }
}

/// Parse a base58 public key.
fn parse_address(s: &str) -> Result<Address, String> {
    Pubkey::from_str(s)
        .map(|key| to_address(&key))
        .map_err(|e| format!("Invalid public key '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    if let Some(port) = cli.metrics_port {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => {
                init_metrics();
                info!("📊 Metrics: http://localhost:{}/metrics", port);
            }
            Err(e) => {
                warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 🔑 WALLET
    // ─────────────────────────────────────────────────────────────────────────
    let keypair = read_keypair_file(&cli.keypair)
        .map_err(|e| anyhow!("Failed to read keypair {}: {}", cli.keypair, e))?;
    let signer = Arc::new(KeypairSigner::new(keypair));
    let source = signer.fee_payer();

    info!("🚀 Starting Sweeper");
    info!(
        source = %to_pubkey(&source),
        destination = %to_pubkey(&cli.destination),
        "🔑 Wallets"
    );
    debug!(rpc_url = %mask_url(&cli.rpc_url), "RPC endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 ADAPTERS
    // ─────────────────────────────────────────────────────────────────────────
    let rpc = Arc::new(
        SolanaRpcClient::new(SolanaRpcConfig {
            url: cli.rpc_url.clone(),
            commitment: cli.finality,
            ..Default::default()
        })
        .context("Failed to create RPC client")?,
    );

    let index: Option<Arc<dyn BalanceIndex>> = match &cli.index_url {
        Some(url) => {
            debug!(index_url = %mask_url(url), "Balance index endpoint");
            let index = HttpBalanceIndex::new(url, cli.index_api_key.clone(), Duration::from_secs(10))
                .context("Failed to create balance index client")?;
            Some(Arc::new(index) as Arc<dyn BalanceIndex>)
        }
        None => None,
    };

    let config = SweepConfig {
        max_batch_size: cli.max_batch_size,
        rent_exempt_reserve: cli.reserve,
        sweep_split: SweepSplit::new(cli.final_batch_percent, cli.trailing_percent)?,
        finality: cli.finality,
        max_send_retries: cli.max_retries,
        skip_preflight: cli.skip_preflight,
        settle_delay: Duration::from_millis(cli.settle_delay_ms),
    };
    let settle_delay = config.settle_delay;

    let service = SweepService::new(config, rpc.clone(), rpc, signer, index)?;
    let request = SweepRequest::new(source, cli.destination)
        .with_priority(cli.priority.into_priority());

    // ─────────────────────────────────────────────────────────────────────────
    // 📋 PREVIEW
    // ─────────────────────────────────────────────────────────────────────────
    let plans = service.preview(&request).await?;
    print_plans(&plans);

    if plans.is_empty() {
        info!("✅ Nothing to sweep");
        return Ok(());
    }
    if cli.dry_run {
        info!("🛑 --dry-run flag set, exiting");
        return Ok(());
    }
    if !cli.yes && !confirm()? {
        info!("❌ Sweep cancelled");
        return Ok(());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 🧹 SWEEP
    // ─────────────────────────────────────────────────────────────────────────
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("🛑 Interrupt received, stopping after the current batch");
        let _ = cancel_tx.send(true);
    });

    let mut balances = service.subscribe_balances();
    let result = service.run_until(&request, cancel_rx).await?;

    report(&result, cli.json)?;

    // ─────────────────────────────────────────────────────────────────────────
    // 🔄 REFRESH
    // ─────────────────────────────────────────────────────────────────────────
    match tokio::time::timeout(settle_delay + Duration::from_secs(30), balances.changed()).await {
        Ok(Ok(())) => {
            if let Some(refreshed) = balances.borrow().as_ref() {
                info!(
                    native = refreshed.native.amount_units,
                    tokens = refreshed.tokens.len(),
                    source = ?refreshed.source,
                    "🔄 Remaining balances"
                );
            }
        }
        Ok(Err(_)) => debug!("Refresh channel closed"),
        Err(_) => warn!("⚠️  Balance refresh timed out"),
    }

    if !result.is_complete() {
        error!(failed = result.failed(), cancelled = result.cancelled, "❌ Sweep incomplete");
        std::process::exit(2);
    }
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }
}

/// Mask credentials in an endpoint URL for logging.
///
/// Hides the password and any `api-key`/`api_key` query value.
fn mask_url(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            let has_key = url.query_pairs().any(|(k, _)| is_key_param(&k));
            if has_key {
                let pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .map(|(k, v)| {
                        let v = if is_key_param(&k) { "****".to_string() } else { v.into_owned() };
                        (k.into_owned(), v)
                    })
                    .collect();
                url.query_pairs_mut().clear().extend_pairs(pairs);
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

fn is_key_param(name: &str) -> bool {
    matches!(name.to_lowercase().as_str(), "api-key" | "api_key" | "apikey")
}

fn print_plans(plans: &[TransferPlan]) {
    for plan in plans {
        let tokens: Vec<String> = plan
            .instructions
            .iter()
            .filter_map(|ix| match ix {
                Instruction::TokenTransfer { mint, amount, .. } => {
                    Some(format!("{}={}", to_pubkey(mint), amount))
                }
                _ => None,
            })
            .collect();
        info!(
            batch = plan.batch_index,
            creations = plan.creation_count(),
            native = plan.native_amount(),
            tokens = %tokens.join(", "),
            "📋 Planned batch"
        );
    }
}

fn report(result: &RunResult, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(result).context("Failed to serialize run result")?;
        println!("{}", out);
        return Ok(());
    }

    for batch in &result.batches {
        match &batch.status {
            BatchStatus::Confirmed { transaction } => info!(
                batch = batch.index,
                tokens = batch.token_transfers,
                native = batch.native_units,
                %transaction,
                "   ✅ Confirmed"
            ),
            BatchStatus::Failed { stage, kind, reason } => warn!(
                batch = batch.index,
                ?stage,
                %kind,
                %reason,
                "   ❌ Failed"
            ),
            BatchStatus::Skipped => info!(batch = batch.index, "   ⏭️  Skipped"),
        }
    }
    info!(
        confirmed = result.confirmed,
        attempted = result.attempted,
        skipped = result.skipped,
        native = ?result.native_sweep,
        "🧹 Sweep summary"
    );
    Ok(())
}

/// Ask for confirmation before moving funds.
fn confirm() -> Result<bool> {
    warn!("⚠️  This will move ALL tokens and the native balance to the destination!");
    print!("\n🔴 Proceed with the sweep? [y/N] ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
