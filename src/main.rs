use std::{process::ExitCode, time::Duration};

use alloy::{providers::ProviderBuilder, signers::local::PrivateKeySigner};
use clap::Parser;
use eyre::WrapErr;

use builder::BuilderAuth;
use claimer::{claim_batch, claim_sequential, Tally};
use config::{Config, Settings, SubmissionMode};
use logger::init_default_logger;
use relayer::RelayClient;
use report::Reporter;
use transaction::{build_redeem_tx, RedeemTransaction};

mod builder;
mod claimer;
mod classify;
mod config;
mod constants;
mod logger;
mod positions;
mod relayer;
mod report;
mod transaction;

const USAGE: &str = "Usage: proxy-claimer <conditionId1> [conditionId2] ...";

/// Redeem resolved positions through the relayer using the PROXY wallet type.
#[derive(Parser, Debug)]
#[command(name = "proxy-claimer", version)]
struct Cli {
    /// Condition ids to redeem (32-byte hex, `0x` prefix optional).
    condition_ids: Vec<String>,

    /// Submission strategy; overrides MODE from claimer.toml.
    #[arg(long, value_enum)]
    mode: Option<SubmissionMode>,

    /// Also redeem every redeemable position the Data API reports for the proxy wallet.
    #[arg(long)]
    redeemable: bool,

    /// Print the encoded calls without contacting the relayer.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let condition_ids = match requested_ids(&cli.condition_ids, cli.redeemable) {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = match load_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_default_logger(&settings.log_dir);

    match run(&cli, &condition_ids, settings).await {
        Ok(tally) if tally.all_succeeded() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `.env` first, then `claimer.toml`, both next to the executable's parent directory.
async fn load_settings() -> eyre::Result<Settings> {
    let base_dir = config::base_dir()?;
    config::load_env_file(&base_dir)?;

    let mut settings = Settings::read(&base_dir).await?;
    settings.log_dir = base_dir.join(&settings.log_dir);

    Ok(settings)
}

#[derive(Debug, thiserror::Error)]
#[error("{}", USAGE)]
struct UsageError;

/// Trimmed, non-blank ids. At least one is required unless positions are discovered.
fn requested_ids(raw: &[String], redeemable: bool) -> Result<Vec<String>, UsageError> {
    let condition_ids: Vec<String> = raw
        .iter()
        .map(|cid| cid.trim())
        .filter(|cid| !cid.is_empty())
        .map(str::to_string)
        .collect();

    if condition_ids.is_empty() && !redeemable {
        return Err(UsageError);
    }

    Ok(condition_ids)
}

/// Credentials are checked before any condition id is parsed.
fn prepare(
    condition_ids: &[String],
    lookup: impl Fn(&str) -> Option<String>,
    settings: Settings,
) -> eyre::Result<(Config, Vec<RedeemTransaction>)> {
    let config = Config::from_lookup(lookup, settings)?;

    let transactions = condition_ids
        .iter()
        .map(|cid| build_redeem_tx(cid))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((config, transactions))
}

async fn run(cli: &Cli, condition_ids: &[String], settings: Settings) -> eyre::Result<Tally> {
    let mode = cli.mode.unwrap_or(settings.mode);
    let (config, mut transactions) =
        prepare(condition_ids, |key| std::env::var(key).ok(), settings)?;

    let signer: PrivateKeySigner = config
        .credentials
        .private_key
        .parse()
        .wrap_err("PRIVATE_KEY is not a valid private key")?;

    let http = reqwest::Client::new();
    let provider = ProviderBuilder::new().on_http(
        config
            .rpc_url
            .parse()
            .wrap_err_with(|| format!("invalid RPC_URL {:?}", config.rpc_url))?,
    );
    let relayer = RelayClient::new(
        http.clone(),
        config.relayer_url.as_str(),
        BuilderAuth::new(&config.credentials),
        signer.clone(),
        provider,
    )
    .with_polling(
        Duration::from_millis(config.settings.poll_interval_ms),
        config.settings.max_polls,
    );

    tracing::info!(
        "Owner {} | proxy wallet {} | chain {} | mode {mode:?}",
        signer.address(),
        relayer.proxy_wallet(),
        config.chain
    );

    if cli.redeemable {
        let discovered =
            discover_redeemable(&http, &config, relayer.proxy_wallet(), &transactions).await?;
        transactions.extend(discovered);
    }

    let mut report = Reporter::new(std::io::stdout());

    if cli.dry_run {
        for tx in &transactions {
            report.dry_run(tx)?;
        }
        return Ok(Tally::new(transactions.len(), transactions.len()));
    }

    match mode {
        SubmissionMode::Batch => {
            claim_batch(&relayer, config.chain, &transactions, &mut report).await
        }
        SubmissionMode::Sequential => {
            claim_sequential(&relayer, config.chain, &transactions, &mut report).await
        }
    }
}

/// Redeemable positions of `proxy_wallet` not already in `known`.
async fn discover_redeemable(
    http: &reqwest::Client,
    config: &Config,
    proxy_wallet: alloy::primitives::Address,
    known: &[RedeemTransaction],
) -> eyre::Result<Vec<RedeemTransaction>> {
    let positions =
        positions::fetch_redeemable_positions(http, &config.settings.data_api_url, proxy_wallet)
            .await
            .wrap_err("failed to fetch redeemable positions")?;

    let condition_ids = positions::unique_condition_ids(&positions);
    tracing::info!(
        "Redeemable: {} market(s) across {} position(s)",
        condition_ids.len(),
        positions.len()
    );
    for position in &positions {
        tracing::info!(
            "  {}: {:.2} shares",
            position.title.as_deref().unwrap_or("-"),
            position.size.unwrap_or_default()
        );
    }

    let mut discovered: Vec<RedeemTransaction> = Vec::new();
    for cid in condition_ids {
        let tx = build_redeem_tx(&cid)?;
        let already_known = known
            .iter()
            .chain(discovered.iter())
            .any(|k| k.condition_id == tx.condition_id);

        if !already_known {
            discovered.push(tx);
        }
    }

    Ok(discovered)
}
