use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Result, ScoreSwapError};
use crate::session::{TokenInfo, TxRequest};
use super::stream::{parse_stream, AgentReply};

/// Remote agent that turns a natural-language swap request into a prepared
/// transaction. The response-shape contract is a `swap` tool result carrying
/// tokenIn/tokenOut descriptors plus a `generate-evm-tx` result carrying the
/// sign request.
#[async_trait]
pub trait DefiAgent: Send + Sync {
    fn agent_id(&self) -> &str;

    async fn request_swap(
        &self,
        session_id: &str,
        messages: &[Value],
        wallet_address: &str,
    ) -> Result<AgentReply>;
}

/// Swap fields pulled out of an agent reply, before quote expiry is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapIntent {
    pub token_in: TokenInfo,
    pub token_out: TokenInfo,
    pub amount_in: String,
    pub expected_amount_out: String,
    pub tx_request: TxRequest,
}

#[derive(Debug, Deserialize)]
struct WireToken {
    symbol: String,
    address: String,
    decimals: u8,
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSwapData {
    token_in: WireToken,
    token_out: WireToken,
}

#[derive(Debug, Deserialize)]
struct WireTxParams {
    to: String,
    #[serde(default = "default_value")]
    value: String,
    #[serde(default = "default_data")]
    data: String,
}

fn default_value() -> String {
    "0x0".to_string()
}

fn default_data() -> String {
    "0x".to_string()
}

impl From<WireToken> for TokenInfo {
    fn from(token: WireToken) -> Self {
        TokenInfo {
            symbol: token.symbol,
            address: token.address,
            decimals: token.decimals,
        }
    }
}

/// Extract the swap intent from an agent reply, or None when the reply lacks
/// the structured tool invocations. The runtime nests the swap payload one
/// level deeper than the sign request, so both spots are checked.
pub fn extract_swap_intent(reply: &AgentReply) -> Option<SwapIntent> {
    let mut swap_data: Option<WireSwapData> = None;
    let mut tx_params: Option<WireTxParams> = None;

    for inv in &reply.tool_invocations {
        match inv.tool_name.as_str() {
            "swap" => {
                for candidate in [&inv.result["data"]["data"], &inv.result["data"]] {
                    if let Ok(data) = serde_json::from_value::<WireSwapData>((*candidate).clone()) {
                        swap_data = Some(data);
                        break;
                    }
                }
            }
            "generate-evm-tx" => {
                let params = &inv.result["data"]["evmSignRequest"]["params"][0];
                if let Ok(parsed) = serde_json::from_value::<WireTxParams>(params.clone()) {
                    tx_params = Some(parsed);
                }
            }
            _ => {}
        }
    }

    let (swap, tx) = (swap_data?, tx_params?);

    Some(SwapIntent {
        amount_in: swap.token_in.amount.clone(),
        expected_amount_out: swap.token_out.amount.clone(),
        token_in: swap.token_in.into(),
        token_out: swap.token_out.into(),
        tx_request: TxRequest {
            to: tx.to,
            value: tx.value,
            data: tx.data,
        },
    })
}

pub struct BitteDefiAgent {
    client: Client,
    api_url: String,
    api_key: String,
    agent_id: String,
}

impl BitteDefiAgent {
    pub fn new(api_url: String, api_key: String, agent_id: String) -> Self {
        Self {
            client: Client::new(),
            api_url,
            api_key,
            agent_id,
        }
    }
}

#[async_trait]
impl DefiAgent for BitteDefiAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn request_swap(
        &self,
        session_id: &str,
        messages: &[Value],
        wallet_address: &str,
    ) -> Result<AgentReply> {
        info!("Sending swap request to agent {}", self.agent_id);

        let payload = json!({
            "id": session_id,
            "messages": messages,
            "config": {
                "mode": "debug",
                "agentId": self.agent_id,
                "mcpServerUrl": "https://mcp.bitte.ai/sse",
            },
            "nearWalletId": "",
            "accountId": "",
            "evmAddress": wallet_address,
            "suiAddress": "",
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScoreSwapError::swap_parse_error(format!(
                "DeFi agent request failed with status {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        debug!("DeFi agent response: {} bytes", body.len());

        Ok(parse_stream(&body, &self.agent_id))
    }
}
