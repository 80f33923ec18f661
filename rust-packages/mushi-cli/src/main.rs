//! Mushi CLI - command-line interface for the Mushi lending program.
//!
//! Read commands print JSON; operation commands print the receipt of the
//! confirmed transaction. Ctrl-C while waiting for confirmation stops polling
//! and reports the transaction as expired.

use std::{future::Future, io};

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use mushi_sdk::{
    calendar, state::fee_percent, AssetScales, ClientConfig, ConfigUpdate, MushiClient, Operation,
    Receipt, SolanaRpc, UserLoan,
};
use serde_json::{json, Value};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signer},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mushi")]
#[command(about = "Mushi lending program CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// RPC URL
    #[arg(short, long, env = "MUSHI_RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    rpc_url: String,

    /// Mushi program id
    #[arg(short, long, env = "MUSHI_PROGRAM_ID")]
    program_id: Option<Pubkey>,

    /// Signer keypair file
    #[arg(short, long, env = "MUSHI_KEYPAIR", default_value = "~/.config/solana/id.json")]
    keypair: String,

    /// Base token decimals (read from the mint when unset)
    #[arg(long, env = "MUSHI_BASE_DECIMALS")]
    base_decimals: Option<u8>,

    /// Quote token decimals (read from the mint when unset)
    #[arg(long, env = "MUSHI_QUOTE_DECIMALS")]
    quote_decimals: Option<u8>,

    /// Build the transaction and print it instead of sending
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show program information
    Info,
    /// Print the daily bucket key for a unix timestamp (default: now)
    Day { timestamp: Option<i64> },
    /// Show the program configuration
    Config,
    /// Show the global counters
    Global,
    /// Show a loan (default: the signer's)
    Loan { owner: Option<Pubkey> },
    /// Show a daily bucket (default: today)
    Bucket { day: Option<String> },
    /// Create the program configuration
    Initialize {
        fee_receiver: Pubkey,
        quote_mint: Pubkey,
        /// Fees in percent, e.g. 9.75
        #[arg(long)]
        buy_fee: String,
        #[arg(long)]
        sell_fee: String,
        #[arg(long)]
        leverage_fee: String,
    },
    /// Change configuration fields
    UpdateConfig(UpdateConfigArgs),
    /// Create the base mint and open trading
    Start {
        quote_amount: String,
        name: String,
        symbol: String,
        uri: String,
    },
    Buy {
        quote_amount: String,
        #[arg(long)]
        referral: Option<Pubkey>,
    },
    Sell { base_amount: String },
    Borrow { quote_amount: String, days: u64 },
    BorrowMore { quote_amount: String },
    Leverage { quote_amount: String, days: u64 },
    ExtendLoan { days: u64 },
    Repay { quote_amount: String },
    RemoveCollateral { base_amount: String },
    ClosePosition { quote_amount: String },
    FlashClosePosition,
    Liquidate,
    Stake { base_amount: String },
    Unstake { base_amount: String },
}

#[derive(Args)]
struct UpdateConfigArgs {
    #[arg(long)]
    admin: Option<Pubkey>,
    #[arg(long)]
    fee_receiver: Option<Pubkey>,
    #[arg(long)]
    buy_fee: Option<String>,
    #[arg(long)]
    sell_fee: Option<String>,
    #[arg(long)]
    leverage_fee: Option<String>,
    #[arg(long)]
    quote_token: Option<Pubkey>,
    #[arg(long)]
    stake_token: Option<Pubkey>,
    #[arg(long)]
    stake_vault_program: Option<Pubkey>,
    #[arg(long)]
    stake_enabled: Option<bool>,
    #[arg(long)]
    started: Option<bool>,
}

impl From<UpdateConfigArgs> for ConfigUpdate {
    fn from(args: UpdateConfigArgs) -> Self {
        Self {
            admin: args.admin,
            fee_receiver: args.fee_receiver,
            buy_fee: args.buy_fee,
            sell_fee: args.sell_fee,
            leverage_fee: args.leverage_fee,
            quote_token: args.quote_token,
            stake_token: args.stake_token,
            stake_vault_program: args.stake_vault_program,
            stake_enabled: args.stake_enabled,
            started: args.started,
        }
    }
}

impl Commands {
    /// The operation a write command stands for.
    fn into_operation(self) -> Option<Operation> {
        let op = match self {
            Commands::Initialize {
                fee_receiver,
                quote_mint,
                buy_fee,
                sell_fee,
                leverage_fee,
            } => Operation::Initialize {
                fee_receiver,
                quote_mint,
                buy_fee,
                sell_fee,
                leverage_fee,
            },
            Commands::UpdateConfig(args) => Operation::UpdateConfig(args.into()),
            Commands::Start {
                quote_amount,
                name,
                symbol,
                uri,
            } => Operation::Start {
                quote_amount,
                token_name: name,
                token_symbol: symbol,
                token_uri: uri,
            },
            Commands::Buy {
                quote_amount,
                referral,
            } => Operation::Buy {
                quote_amount,
                referral,
            },
            Commands::Sell { base_amount } => Operation::Sell { base_amount },
            Commands::Borrow { quote_amount, days } => Operation::Borrow { quote_amount, days },
            Commands::BorrowMore { quote_amount } => Operation::BorrowMore { quote_amount },
            Commands::Leverage { quote_amount, days } => Operation::Leverage { quote_amount, days },
            Commands::ExtendLoan { days } => Operation::ExtendLoan { days },
            Commands::Repay { quote_amount } => Operation::Repay { quote_amount },
            Commands::RemoveCollateral { base_amount } => Operation::RemoveCollateral { base_amount },
            Commands::ClosePosition { quote_amount } => Operation::ClosePosition { quote_amount },
            Commands::FlashClosePosition => Operation::FlashClosePosition,
            Commands::Liquidate => Operation::Liquidate,
            Commands::Stake { base_amount } => Operation::Stake { base_amount },
            Commands::Unstake { base_amount } => Operation::Unstake { base_amount },
            Commands::Info
            | Commands::Day { .. }
            | Commands::Config
            | Commands::Global
            | Commands::Loan { .. }
            | Commands::Bucket { .. } => return None,
        };
        Some(op)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Info => {
            println!("Mushi lending program");
            match cli.program_id {
                Some(id) => println!("Program ID: {}", id),
                None => println!("Program ID: not set (MUSHI_PROGRAM_ID)"),
            }
            println!("RPC: {}", cli.rpc_url);
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Day { timestamp } => {
            let ts = timestamp.unwrap_or_else(calendar::now_unix);
            let mut out = json!({ "timestamp": ts, "day": calendar::day_string(ts)? });
            if let Some(id) = cli.program_id {
                out["daily_stats"] = json!(mushi_sdk::Pdas::new(id).daily_stats_at(ts)?.0.to_string());
            }
            return print_json(&out);
        }
        _ => {}
    }

    let client = connect(&cli)?;
    match cli.command {
        Commands::Config => {
            let c = client.config().await?;
            print_json(&json!({
                "admin": c.admin.to_string(),
                "fee_receiver": c.fee_receiver.to_string(),
                "buy_fee": fee_percent(c.buy_fee),
                "sell_fee": fee_percent(c.sell_fee),
                "leverage_fee": fee_percent(c.buy_fee_leverage),
                "quote_token": c.quote_token.to_string(),
                "stake_token": c.stake_token.to_string(),
                "stake_vault_program": c.stake_vault_program.to_string(),
                "stake_enabled": c.stake_enabled,
                "started": c.started,
            }))
        }
        Commands::Global => {
            let g = client.global().await?;
            print_json(&json!({
                "last_liquidation_date": g.last_liquidation_date,
                "last_liquidation_day": calendar::day_string(g.last_liquidation_date)?,
                "total_borrowed": g.total_borrowed,
                "total_collateral": g.total_collateral,
                "total_quote_staked": g.total_quote_staked,
                "token_supply": g.token_supply,
                "last_price": g.last_price,
                "base_token": g.base_token.to_string(),
                "started": g.started,
            }))
        }
        Commands::Loan { owner } => {
            let owner = match owner {
                Some(owner) => owner,
                None => load_keypair(&cli.keypair)?.pubkey(),
            };
            let loan = client.user_loan(&owner).await?;
            print_json(&json!({ "owner": owner.to_string(), "loan": loan.as_ref().map(loan_json) }))
        }
        Commands::Bucket { day } => {
            let day = match day {
                Some(day) => day,
                None => calendar::today()?,
            };
            let bucket = client.daily_bucket(&day).await?;
            print_json(&json!({
                "day": day,
                "address": client.pdas().daily_stats(&day).0.to_string(),
                "bucket": bucket.map(|b| json!({
                    "date": b.date,
                    "borrowed": b.borrowed,
                    "collateral": b.collateral,
                })),
            }))
        }
        command => {
            let op = command
                .into_operation()
                .ok_or_else(|| anyhow!("not an operation"))?;
            let signer = load_keypair(&cli.keypair)?;
            if cli.dry_run {
                let batch = client.prepare(&op, &signer.pubkey()).await?;
                println!("{:#?}", batch);
                return Ok(());
            }
            info!(instruction = op.instruction().name(), signer = %signer.pubkey(), "submitting");
            let cancel = cancel_on(tokio::signal::ctrl_c());
            let receipt = client.execute_until(&op, &signer, cancel).await?;
            print_json(&receipt_json(&receipt))
        }
    }
}

/// Resolves when `signal` fires. If the handler cannot be installed it never
/// resolves, so polling runs to its own end.
async fn cancel_on(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!(error = %e, "Ctrl-C handler unavailable, polling runs to completion");
        std::future::pending::<()>().await;
    }
}

fn connect(cli: &Cli) -> anyhow::Result<MushiClient<SolanaRpc>> {
    let program_id = cli
        .program_id
        .context("program id required (--program-id or MUSHI_PROGRAM_ID)")?;
    let mut config = ClientConfig::new(cli.rpc_url.clone(), program_id);
    config.scales = match (cli.base_decimals, cli.quote_decimals) {
        (Some(base), Some(quote)) => Some(AssetScales { base, quote }),
        (None, None) => None,
        _ => bail!("set both --base-decimals and --quote-decimals, or neither"),
    };
    Ok(MushiClient::new(config)?)
}

fn load_keypair(path: &str) -> anyhow::Result<Keypair> {
    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home, rest),
        _ => path.to_string(),
    };
    read_keypair_file(&path).map_err(|e| anyhow!("failed to read keypair {}: {}", path, e))
}

fn loan_json(loan: &UserLoan) -> Value {
    json!({
        "collateral": loan.collateral,
        "borrowed": loan.borrowed,
        "end_date": loan.end_date,
        "end_day": calendar::day_string(loan.end_date).ok(),
        "number_of_days": loan.number_of_days,
    })
}

fn receipt_json(receipt: &Receipt) -> Value {
    json!({
        "signature": receipt.signature.to_string(),
        "instruction": receipt.instruction.name(),
        "days": receipt.days,
        "loan": receipt.loan.as_ref().map(loan_json),
        "created_mint": receipt.created_mint.map(|m| m.to_string()),
    })
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
