use alloy::network::EthereumWallet;
use alloy::primitives::U256;
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use approval_guard::address::short_address;
use approval_guard::{
    AlloyChain, AppConfig, ApprovalDiscovery, ApprovalRecord, ApprovalSession, ChainWriter,
    GuardError, RevocationReport, ScanReport,
};

#[derive(Parser)]
#[command(name = "approval-guard")]
#[command(about = "Find and revoke token approvals granted by an account")]
struct Cli {
    /// Network key in the scan configuration (overrides NETWORK)
    #[arg(long, global = true)]
    network: Option<String>,

    /// Account to inspect (overrides OWNER_ADDRESS, defaults to the PRIVATE_KEY account)
    #[arg(long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List active approvals
    Scan,
    /// Revoke approvals by their number in the scan table
    Revoke {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        numbers: Vec<usize>,

        /// Revoke every discovered approval
        #[arg(long)]
        all: bool,
    },
    /// Check one ERC-721 token for a per-token approval
    Token { contract: String, token_id: String },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), GuardError> {
    let mut config = AppConfig::from_env();
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(owner) = cli.owner {
        config.owner = Some(owner);
    }

    let scan_config = config.scan_config()?;
    let network = scan_config.network(&config.network)?;
    let rpc_url = config.resolve_rpc_url(network);
    let url = rpc_url
        .parse::<Url>()
        .map_err(|e| GuardError::ConfigError(format!("invalid RPC_URL {rpc_url}: {e}")))?;
    let discovery = ApprovalDiscovery::from_network(network).with_engine_config(&config.engine);

    println!("Network: {} (chain {})", config.network, network.chain_id);
    println!("RPC:     {rpc_url}");

    match &config.private_key {
        Some(key) => {
            let signer = key
                .parse::<PrivateKeySigner>()
                .map_err(|e| GuardError::ConfigError(format!("invalid PRIVATE_KEY: {e}")))?;
            let signer_address = signer.address();
            let owner = config
                .owner
                .clone()
                .unwrap_or_else(|| signer_address.to_string());

            let provider = ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(url);
            let chain = AlloyChain::new(provider)
                .with_signer(signer_address)
                .with_receipt_timeout(config.engine.receipt_timeout);
            execute(&chain, discovery, &owner, cli.command).await
        }
        None => {
            let owner = config.owner.clone().ok_or_else(|| {
                GuardError::ConfigError("set OWNER_ADDRESS or PRIVATE_KEY".to_string())
            })?;
            let chain = AlloyChain::new(ProviderBuilder::new().connect_http(url));
            execute(&chain, discovery, &owner, cli.command).await
        }
    }
}

async fn execute<C: ChainWriter>(
    chain: &C,
    discovery: ApprovalDiscovery,
    owner: &str,
    command: Command,
) -> Result<(), GuardError> {
    let mut session = ApprovalSession::new(chain, discovery, owner)?;
    println!("Owner:   {}\n", session.owner());

    match command {
        Command::Scan => {
            let report = session.refresh().await?;
            print_scan(&report);
        }
        Command::Revoke { numbers, all } => {
            let report = session.refresh().await?;
            print_scan(&report);

            if all {
                session.select_all();
            } else {
                for number in numbers {
                    let key = number
                        .checked_sub(1)
                        .and_then(|i| session.records().get(i))
                        .map(ApprovalRecord::key);
                    match key {
                        Some(key) => {
                            session.select(key);
                        }
                        None => tracing::warn!(number, "no approval with this number, skipping"),
                    }
                }
            }

            if session.selection().is_empty() {
                println!("\nNothing to revoke.");
                return Ok(());
            }
            println!("\nRevoking {} approval(s)...", session.selection().len());
            let reports = session.revoke_selected().await?;
            print_revocations(&reports);
        }
        Command::Token { contract, token_id } => {
            let token_id = token_id
                .parse::<U256>()
                .map_err(|e| GuardError::ConfigError(format!("invalid token id {token_id}: {e}")))?;
            match session.probe_token(&contract, token_id).await? {
                Some(record) => {
                    println!("Token #{token_id} is approved for {}", spender_name(&record));
                    println!("Revoke with: approve(0x0000000000000000000000000000000000000000, {token_id})");
                }
                None => println!("Token #{token_id} has no per-token approval."),
            }
        }
    }
    Ok(())
}

fn spender_name(record: &ApprovalRecord) -> String {
    match &record.spender_label {
        Some(label) => format!("{label} ({})", short_address(&record.spender)),
        None => record.spender.to_string(),
    }
}

fn print_scan(report: &ScanReport) {
    if report.records.is_empty() {
        println!("No active approvals found ({} probes).", report.probes);
    } else {
        println!(
            "{:>3}  {:<8} {:<24} {:<36} VALUE AT RISK",
            "#", "STANDARD", "ASSET", "SPENDER"
        );
        for (i, record) in report.records.iter().enumerate() {
            println!(
                "{:>3}  {:<8} {:<24} {:<36} {}",
                i + 1,
                record.standard.to_string(),
                record.asset_label,
                spender_name(record),
                record.value_at_risk
            );
        }
    }
    if report.failed_probes > 0 {
        println!(
            "\n{} of {} probes failed; those pairs are not shown.",
            report.failed_probes, report.probes
        );
    }
}

fn print_revocations(reports: &[RevocationReport]) {
    for report in reports {
        for outcome in &report.outcomes {
            let tx = outcome.transaction.as_deref().unwrap_or("-");
            match &outcome.error {
                None => println!("  ok      {}  {:?}  tx: {tx}", outcome.key, outcome.status),
                Some(error) => println!("  FAILED  {}  {error}  tx: {tx}", outcome.key),
            }
        }
    }
    let failed: usize = reports.iter().map(|r| r.failed().count()).sum();
    if failed > 0 {
        println!("\n{failed} revocation(s) did not complete; scan again before retrying.");
    }
}
