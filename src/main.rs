use anyhow::Result;
use dotenv::dotenv;
use ethers::{
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::Address,
};
use std::env;

mod amounts;
mod batch;
mod calls;
mod consts;
mod errors;
mod indexer;
mod primitives;
mod traits;
mod transfer;
mod types;

use crate::amounts::{format_token_amount, parse_token_amount};
use crate::batch::{build_batch_request, parse_recipients_csv, AssetKind};
use crate::consts::{ENTRY_POINT_V7, NATIVE_DECIMALS, TRANSFER_EVENT_WRAPPER};
use crate::errors::BatchInputError;
use crate::indexer::IndexerClient;
use crate::transfer::TransferOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let private_key = env::var("PRIVATE_KEY").expect("PRIVATE_KEY not found");
    let wallet: LocalWallet = private_key.parse().expect("Invalid private key");
    let chain_id: u64 = env::var("CHAIN_ID")
        .map(|v| v.parse().expect("Invalid CHAIN_ID"))
        .unwrap_or(10143); // Monad testnet
    let wallet = wallet.with_chain_id(chain_id);

    let rpc_url = env::var("RPC_ENDPOINT").expect("RPC_ENDPOINT not found");
    let provider = Provider::try_from(rpc_url)?;
    let bundler_url = env::var("BUNDLER_ENDPOINT").expect("BUNDLER_ENDPOINT not found");

    let sender: Address = env::var("SMART_ACCOUNT_ADDRESS")
        .expect("SMART_ACCOUNT_ADDRESS not found")
        .parse()?;
    let validator: Address = env::var("VALIDATOR_ADDRESS")
        .expect("VALIDATOR_ADDRESS not found")
        .parse()?;
    let wrapper: Address = env::var("EVENT_WRAPPER_ADDRESS")
        .unwrap_or_else(|_| TRANSFER_EVENT_WRAPPER.to_string())
        .parse()?;

    let orchestrator: TransferOrchestrator<Provider<Http>> = TransferOrchestrator::new(
        provider,
        ENTRY_POINT_V7.parse::<Address>().unwrap(),
        bundler_url,
        wallet,
        sender,
        validator,
        wrapper,
    );

    let tx_hash = if let Ok(csv_path) = env::var("RECIPIENTS_CSV") {
        let csv = std::fs::read_to_string(&csv_path)?;
        let rows = parse_recipients_csv(&csv)?;

        let (asset, decimals) = match env::var("TOKEN_ADDRESS") {
            Ok(token) => {
                let token: Address = token.parse()?;
                let info = orchestrator.get_token_info(token, sender).await?;
                println!(
                    "token {} ({}), balance {}",
                    info.name,
                    info.symbol,
                    format_token_amount(info.balance, info.decimals)
                );
                (AssetKind::Erc20(token), info.decimals)
            }
            Err(_) => (AssetKind::Native, NATIVE_DECIMALS),
        };

        let request = build_batch_request(&rows, asset, decimals)?;
        let total = request.total_amount().ok_or(BatchInputError::TotalOverflow)?;
        println!(
            "batch: {} recipients, total {}",
            request.len(),
            format_token_amount(total, decimals)
        );
        orchestrator.batch_transfer(&request).await?
    } else {
        let to: Address = env::var("TO_ADDRESS").expect("TO_ADDRESS not found").parse()?;
        let amount = env::var("AMOUNT").expect("AMOUNT not found");

        match env::var("TOKEN_ADDRESS") {
            Ok(token) => {
                let token: Address = token.parse()?;
                let info = orchestrator.get_token_info(token, sender).await?;
                let amount = parse_token_amount(&amount, info.decimals)?;
                orchestrator.transfer_erc20(token, to, amount).await?
            }
            Err(_) => {
                let amount = parse_token_amount(&amount, NATIVE_DECIMALS)?;
                orchestrator.transfer_native(to, amount).await?
            }
        }
    };

    println!("confirmed: {:?}", tx_hash);

    if let Ok(indexer_url) = env::var("INDEXER_URL") {
        let indexer = IndexerClient::new(indexer_url);
        let history = indexer.transfer_history(sender).await?;
        println!(
            "indexed: {} sent ({} wei), {} received ({} wei)",
            history.sent.len(),
            history.total_sent(),
            history.received.len(),
            history.total_received()
        );

        let events = indexer.wrapper_event_history(sender).await?;
        println!(
            "wrapper events: {} transfers, {} batches, {} failures",
            events.executed.len(),
            events.batches.len(),
            events.failed.len()
        );
    }

    Ok(())
}
