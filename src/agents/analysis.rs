use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Result, ScoreSwapError};
use super::stream::{parse_stream, AgentReply};

/// Remote agent that scores a Twitter/X URL. The response-shape contract is
/// an assistant message whose tool result or text yields an integer score.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    fn agent_id(&self) -> &str;

    async fn analyze(&self, session_id: &str, messages: &[Value]) -> Result<AgentReply>;
}

/// Pull a numeric score out of an agent reply. Tool results win over plain
/// text; range validation is the caller's job.
pub fn extract_score(reply: &AgentReply) -> Option<i64> {
    for inv in &reply.tool_invocations {
        let data = &inv.result["data"];
        match data {
            Value::String(s) => {
                if let Ok(score) = s.trim().parse::<i64>() {
                    return Some(score);
                }
            }
            Value::Number(n) => {
                if let Some(score) = n.as_i64() {
                    return Some(score);
                }
                if let Some(score) = n.as_f64() {
                    return Some(score as i64);
                }
            }
            _ => {}
        }
    }

    reply.content.trim().parse::<i64>().ok()
}

pub struct BitteAnalysisService {
    client: Client,
    api_url: String,
    api_key: String,
    agent_id: String,
}

impl BitteAnalysisService {
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
impl AnalysisService for BitteAnalysisService {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn analyze(&self, session_id: &str, messages: &[Value]) -> Result<AgentReply> {
        info!("Sending analysis request to agent {}", self.agent_id);

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
            return Err(ScoreSwapError::analysis_error(format!(
                "analysis API request failed with status {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        debug!("Analysis response: {} bytes", body.len());

        Ok(parse_stream(&body, &self.agent_id))
    }
}
