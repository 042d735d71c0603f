use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use zkusd_operations::application::simulation::{
    advance_context, mock_utxos, select_simulation_utxos, FailurePoint, SimulationDriver,
};
use zkusd_operations::application::{RetryHandler, RetryingUtxoSource};
use zkusd_operations::config::AppConfig;
use zkusd_operations::domain::models::{OperationRequest, VaultOperation};
use zkusd_operations::domain::services::operation_machine::{
    create_initial_context, get_action_button_text, handle_error, handle_success, start_operation,
};
use zkusd_operations::infrastructure::explorer::ExplorerClient;
use zkusd_operations::utils::logging;

/// Rehearse a vault operation without proving or broadcasting anything
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wallet address whose UTXOs fund the operation
    #[arg(short, long)]
    address: String,

    /// Collateral to lock, in sats
    #[arg(short, long, default_value_t = 150_000)]
    collateral: u64,

    /// zkUSD to mint
    #[arg(long, default_value_t = 5_000)]
    debt: u64,

    /// Sats reserved for fees
    #[arg(long, default_value_t = 20_000)]
    fee_buffer: u64,

    /// Inject a failure at this step
    #[arg(long, value_enum)]
    fail_at: Option<FailurePoint>,

    /// Multiplier for step durations (0 runs instantly)
    #[arg(long)]
    time_scale: Option<f64>,

    /// Skip the explorer and use mock UTXOs
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logger();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    config.validate().context("invalid configuration")?;
    logging::log_endpoint_details(
        &config.network.network,
        &config.network.explorer_url,
        &config.network.prover_url,
    );

    let request = OperationRequest::new(
        VaultOperation::Open {
            collateral_sats: cli.collateral,
            debt_amount: cli.debt,
        },
        cli.address.clone(),
        cli.fee_buffer,
    );

    let selection = if cli.offline {
        mock_utxos(&request)
    } else {
        let explorer = ExplorerClient::new(&config).context("failed to create explorer client")?;
        let source = RetryingUtxoSource::new(Arc::new(explorer), RetryHandler::new());
        select_simulation_utxos(&source, &request).await
    };
    println!(
        "collateral {} ({} sats), fee {} ({} sats)",
        selection.collateral.id,
        selection.collateral.value_sats,
        selection.fee.id,
        selection.fee.value_sats
    );

    let driver = match cli.time_scale {
        Some(time_scale) => SimulationDriver::new(time_scale),
        None => SimulationDriver::from_config(&config.simulation),
    }
    .with_failure(cli.fail_at);

    let mut ctx = start_operation(&create_initial_context(), request.clone());
    let outcome = driver
        .run(&request, &selection, |update| {
            ctx = advance_context(&ctx, update, &request, &selection);
            println!(
                "[{:>3}%] {:<12} {:<20} {}",
                ctx.progress,
                ctx.state().as_str(),
                get_action_button_text(&ctx),
                ctx.status_message
            );
        })
        .await;

    let ctx = match outcome {
        Ok(result) => handle_success(&ctx, result),
        Err(e) => handle_error(&ctx, &e.to_string(), None),
    };

    println!("[{:>3}%] {:<12} {}", ctx.progress, ctx.state().as_str(), ctx.status_message);
    if let Some(result) = ctx.result() {
        println!("commit txid: {}", result.commit_txid);
        println!("spell txid:  {}", result.spell_txid);
        if let Some(vault_id) = &result.vault_id {
            println!("vault id:    {}", vault_id);
        }
    }
    if let Some(error_type) = ctx.error_type() {
        println!("error type:  {}", error_type);
    }

    Ok(())
}
