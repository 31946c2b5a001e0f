use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram_bot_token: String,
    pub bitte_api_key: String,
    pub chat_api_url: String,
    pub analysis_agent_id: String,
    pub defi_agent_id: String,
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,

    // Flow settings
    pub quote_ttl_secs: i64,
    pub agent_timeout_secs: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            bitte_api_key: String::new(),
            chat_api_url: "https://ai-runtime-446257178793.europe-west1.run.app/chat".to_string(),
            analysis_agent_id: "agent-rating.vercel.app".to_string(),
            defi_agent_id: "bitte-defi".to_string(),
            rpc_url: "https://arb1.arbitrum.io/rpc".to_string(),
            chain_id: 42161, // Arbitrum One
            private_key: None,
            quote_ttl_secs: 60,
            agent_timeout_secs: 30,
            receipt_timeout_secs: 120,
        }
    }
}

pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    // Required credentials
    config.telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
        .context("TELEGRAM_BOT_TOKEN environment variable is required")?;
    config.bitte_api_key = env::var("BITTE_API_KEY")
        .context("BITTE_API_KEY environment variable is required")?;

    // Override defaults with environment variables
    if let Ok(chat_api_url) = env::var("CHAT_API_URL") {
        config.chat_api_url = chat_api_url;
    }

    if let Ok(analysis_agent_id) = env::var("ANALYSIS_AGENT_ID") {
        config.analysis_agent_id = analysis_agent_id;
    }

    if let Ok(defi_agent_id) = env::var("DEFI_AGENT_ID") {
        config.defi_agent_id = defi_agent_id;
    }

    if let Ok(rpc_url) = env::var("RPC_URL") {
        config.rpc_url = rpc_url;
    }

    if let Ok(chain_id) = env::var("CHAIN_ID") {
        config.chain_id = chain_id
            .parse()
            .context("CHAIN_ID must be a decimal chain id")?;
    }

    if let Ok(private_key) = env::var("PRIVATE_KEY") {
        config.private_key = Some(private_key);
    } else {
        warn!("No PRIVATE_KEY found - swap execution disabled");
    }

    if let Ok(ttl) = env::var("QUOTE_TTL_SECS") {
        config.quote_ttl_secs = ttl.parse().context("QUOTE_TTL_SECS must be seconds")?;
    }

    Ok(config)
}

pub async fn initialize_config() -> Result<()> {
    info!("Initializing configuration...");

    let config = load_config()?;

    // Check that the Telegram token works
    let telegram = crate::telegram::TelegramApi::new(config.telegram_bot_token.clone());
    match telegram.get_me().await {
        Ok(username) => info!("Telegram bot authenticated as @{}", username),
        Err(e) => warn!("Could not reach the Telegram API: {}", e),
    }

    // Check that we can reach the chain RPC
    let chain = crate::chain::JsonRpcChainClient::new(config.rpc_url.clone());
    match chain.chain_id().await {
        Ok(id) if id == config.chain_id => info!("Connected to chain id {}", id),
        Ok(id) => warn!(
            "RPC chain id {} does not match configured chain id {}",
            id, config.chain_id
        ),
        Err(e) => warn!("Could not connect to RPC at {}: {}", config.rpc_url, e),
    }

    // Check the signing wallet
    match &config.private_key {
        Some(key) => match crate::chain::Wallet::from_hex(key) {
            Ok(wallet) => info!("Using wallet: {}", wallet.address()),
            Err(e) => warn!("Could not load signing wallet: {}", e),
        },
        None => warn!("PRIVATE_KEY not set - swaps will be quoted but never executed"),
    }

    info!("Configuration initialized successfully!");
    Ok(())
}
