mod agents;
mod bot;
mod chain;
mod config;
mod error;
mod session;
mod telegram;

use anyhow::{Result, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, error, warn, Level};
use tracing_subscriber::FmtSubscriber;

use agents::{BitteAnalysisService, BitteDefiAgent};
use bot::{AnalysisOrchestrator, ConversationStateMachine, SwapOrchestrator};
use chain::{JsonRpcChainClient, TransactionExecutor, Wallet};
use session::SessionStore;
use telegram::{InboundMessage, TelegramApi, UpdatePoller};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and begin processing messages
    Run,
    /// Check configuration and connectivity
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("Starting ScoreSwap - Twitter Analysis & Swap Bot");

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Run) => {
            run_bot().await?;
        }
        Some(Commands::Init) => {
            config::initialize_config().await?;
        }
        None => {
            info!("No command specified. Use --help for available commands.");
        }
    }

    Ok(())
}

async fn run_bot() -> Result<()> {
    info!("Loading configuration...");
    let config = config::load_config()?;

    let telegram = Arc::new(TelegramApi::new(config.telegram_bot_token.clone()));

    let analysis_service = Arc::new(BitteAnalysisService::new(
        config.chat_api_url.clone(),
        config.bitte_api_key.clone(),
        config.analysis_agent_id.clone(),
    ));
    let defi_agent = Arc::new(BitteDefiAgent::new(
        config.chat_api_url.clone(),
        config.bitte_api_key.clone(),
        config.defi_agent_id.clone(),
    ));

    // All sessions share this one signer, so there is at most one executor.
    let executor = match &config.private_key {
        Some(key) => {
            let wallet = Wallet::from_hex(key).context("loading signing wallet")?;
            info!("Connected with address: {}", wallet.address());
            let chain = Arc::new(JsonRpcChainClient::new(config.rpc_url.clone()));
            Some(Arc::new(TransactionExecutor::new(
                chain,
                wallet,
                config.chain_id,
                Duration::from_secs(config.receipt_timeout_secs),
            )))
        }
        None => {
            warn!("No PRIVATE_KEY found - transaction features disabled");
            None
        }
    };

    let agent_timeout = Duration::from_secs(config.agent_timeout_secs);
    let machine = Arc::new(ConversationStateMachine::new(
        Arc::new(SessionStore::new()),
        telegram.clone(),
        AnalysisOrchestrator::new(analysis_service, agent_timeout),
        SwapOrchestrator::new(defi_agent, executor, agent_timeout, config.quote_ttl_secs),
    ));

    // Create the channel between the Telegram poller and the dispatcher
    let (tx, mut rx) = mpsc::channel::<InboundMessage>(100);

    let poller = UpdatePoller::new(telegram.clone(), tx);
    tokio::spawn(async move {
        if let Err(e) = poller.start_polling().await {
            error!("Telegram poller error: {}", e);
        }
    });

    info!("ScoreSwap is running. Waiting for messages...");

    // One task per inbound message; the per-session lock keeps turns for the
    // same chat strictly ordered while different chats run concurrently.
    while let Some(message) = rx.recv().await {
        let machine = machine.clone();
        tokio::spawn(async move {
            machine.handle_message(message.chat_id, &message.text).await;
        });
    }

    Ok(())
}
