use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::agents::{extract_score, user_message, AgentReply, AnalysisService};
use crate::error::{Result, ScoreSwapError};
use crate::session::{
    is_valid_twitter_url, is_valid_wallet_address, AnalysisResult, Reward, Session, SessionState,
};

/// Drives the Twitter-analysis sub-flow: URL and wallet validation, the
/// single AnalysisService call per Analyzing entry, and reward computation.
pub struct AnalysisOrchestrator {
    service: Arc<dyn AnalysisService>,
    timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(service: Arc<dyn AnalysisService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn submit_url(&self, session: &mut Session, url: &str) -> Result<String> {
        let url = url.trim();
        if !is_valid_twitter_url(url) {
            session.touch();
            return Err(ScoreSwapError::validation_error(
                "Please provide a valid Twitter URL (e.g. https://twitter.com/username/status/123456789)",
            ));
        }

        session.twitter_url = Some(url.to_string());
        session.state = SessionState::AwaitingWalletAddress;
        session.touch();
        Ok("✅ Twitter URL received!\n\nNow please provide your wallet address:".to_string())
    }

    pub fn submit_wallet(&self, session: &mut Session, address: &str) -> Result<()> {
        let address = address.trim();
        if !is_valid_wallet_address(address) {
            session.touch();
            return Err(ScoreSwapError::validation_error(
                "Please provide a valid wallet address (42 characters starting with 0x).",
            ));
        }

        session.wallet_address = Some(address.to_string());
        session.state = SessionState::Analyzing;
        session.touch();
        Ok(())
    }

    /// Makes the one AnalysisService call for this Analyzing entry. A retry
    /// is a new explicit call triggered by the user, never automatic.
    pub async fn run_analysis(&self, session: &mut Session) -> Result<String> {
        let url = session
            .twitter_url
            .clone()
            .ok_or_else(|| ScoreSwapError::system_error("no twitter url recorded"))?;

        info!("Running analysis for chat {}: {}", session.chat_id, url);

        session
            .history
            .push(user_message(&url, self.service.agent_id()));

        let call = self
            .service
            .analyze(&session.agent_session_id, session.history.turns());
        let reply = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err @ ScoreSwapError::Analysis(_))) => {
                // Malformed agent response: stay in Analyzing so the user can
                // retry or abort.
                session.touch();
                return Err(err);
            }
            Ok(Err(err)) => {
                // Transport failure: revert to the state that preceded the
                // call so the session is never stuck.
                session.state = SessionState::AwaitingWalletAddress;
                session.touch();
                return Err(err);
            }
            Err(_) => {
                session.state = SessionState::Failed;
                session.last_failure = Some("analysis timed out".to_string());
                session.touch();
                return Err(ScoreSwapError::system_error("analysis timed out"));
            }
        };

        if let Some(msg) = reply.assistant_message.clone() {
            session.history.push(msg);
        }

        self.complete_analysis(session, &reply)
    }

    pub fn complete_analysis(&self, session: &mut Session, reply: &AgentReply) -> Result<String> {
        let score = extract_score(reply)
            .ok_or_else(|| ScoreSwapError::analysis_error("no score in the analysis response"))?;

        if !(1..=10).contains(&score) {
            return Err(ScoreSwapError::analysis_error(format!(
                "score {} is out of range",
                score
            )));
        }
        let score = score as u8;

        let reward = Reward::from_score(score);
        let source_url = session.twitter_url.clone().unwrap_or_default();
        session.analysis = Some(AnalysisResult {
            score,
            reward,
            source_url: source_url.clone(),
            summary: reply.content.clone(),
        });
        session.state = SessionState::AwaitingTokenPreference;
        session.touch();

        info!(
            "Analysis complete for chat {}: score {}/10, reward {} USDC",
            session.chat_id, score, reward
        );

        Ok(format!(
            "✅ Analysis complete!\n\n\
            🔗 Twitter URL: {}\n\
            📊 Score: {}/10\n\
            🎉 You have won {} USDC!\n\n\
            Tell me how you would like to swap your USDC. Just describe it, for example:\n\
            • \"Swap all to WETH\"\n\
            • \"Keep 30% in USDC and convert the rest to WETH\"",
            source_url, score, reward
        ))
    }
}
