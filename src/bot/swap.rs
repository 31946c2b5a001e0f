use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::agents::{extract_swap_intent, user_message, DefiAgent};
use crate::chain::{Transaction, TransactionExecutor, TxStatus};
use crate::error::{Result, ScoreSwapError};
use crate::session::{Session, SessionState, SwapQuote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Pending swap discarded, back to the request stage.
    Rejected,
    /// Quote is still valid; execution may proceed.
    Proceed,
}

/// Drives the swap sub-flow: natural-language intent parsing via the DeFi
/// agent, quote confirmation, and execution through the TransactionExecutor.
pub struct SwapOrchestrator {
    agent: Arc<dyn DefiAgent>,
    executor: Option<Arc<TransactionExecutor>>,
    timeout: Duration,
    quote_ttl_secs: i64,
}

impl SwapOrchestrator {
    pub fn new(
        agent: Arc<dyn DefiAgent>,
        executor: Option<Arc<TransactionExecutor>>,
        timeout: Duration,
        quote_ttl_secs: i64,
    ) -> Self {
        Self {
            agent,
            executor,
            timeout,
            quote_ttl_secs,
        }
    }

    pub async fn submit_swap_request(&self, session: &mut Session, text: &str) -> Result<String> {
        let analysis = session.analysis.clone().ok_or_else(|| {
            ScoreSwapError::validation_error(
                "Missing prize information. Please use /start to begin again.",
            )
        })?;
        let wallet = session.wallet_address.clone().ok_or_else(|| {
            ScoreSwapError::validation_error(
                "Missing wallet address. Please use /start to begin again.",
            )
        })?;

        // Entering the request stage discards any stale pending quote.
        session.pending_swap = None;
        session.state = SessionState::AwaitingSwapRequest;

        let enhanced = format!(
            "I want to swap {} USDC. {}. I'm on Arbitrum.",
            analysis.reward, text
        );
        info!("Swap request for chat {}: {}", session.chat_id, enhanced);

        session
            .history
            .push(user_message(&enhanced, self.agent.agent_id()));

        let call = self
            .agent
            .request_swap(&session.agent_session_id, session.history.turns(), &wallet);
        let reply = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                session.touch();
                return Err(err);
            }
            Err(_) => {
                session.state = SessionState::Failed;
                session.last_failure = Some("swap agent timed out".to_string());
                session.touch();
                return Err(ScoreSwapError::system_error("swap agent timed out"));
            }
        };

        if let Some(msg) = reply.assistant_message.clone() {
            session.history.push(msg);
        }

        let Some(intent) = extract_swap_intent(&reply) else {
            session.touch();
            return Err(ScoreSwapError::swap_parse_error(
                "the agent did not return an executable swap",
            ));
        };

        let quote = SwapQuote {
            token_in: intent.token_in,
            token_out: intent.token_out,
            amount_in: intent.amount_in,
            expected_amount_out: intent.expected_amount_out,
            tx_request: intent.tx_request,
            expires_at: Session::quote_expiry(self.quote_ttl_secs),
        };

        let summary = format!(
            "{}\n\n💱 Swap: {} {} → {} {}\n\nDo you want to proceed with this transaction? (yes/no)",
            reply.content,
            quote.amount_in,
            quote.token_in.symbol,
            quote.expected_amount_out,
            quote.token_out.symbol
        );

        session.pending_swap = Some(quote);
        session.state = SessionState::AwaitingSwapConfirmation;
        session.touch();
        Ok(summary)
    }

    pub fn confirm(&self, session: &mut Session, decision: ConfirmDecision) -> Result<ConfirmOutcome> {
        match decision {
            ConfirmDecision::Reject => {
                session.pending_swap = None;
                session.state = SessionState::AwaitingSwapRequest;
                session.touch();
                Ok(ConfirmOutcome::Rejected)
            }
            ConfirmDecision::Accept => {
                let quote = session
                    .pending_swap
                    .as_ref()
                    .ok_or_else(|| ScoreSwapError::system_error("no pending swap to confirm"))?;

                if quote.is_expired(Utc::now()) {
                    // An expired quote is never executed.
                    session.pending_swap = None;
                    session.touch();
                    return Err(ScoreSwapError::expired_quote_error(
                        "That quote has expired. Please describe your swap again for a fresh one.",
                    ));
                }

                session.state = SessionState::ExecutingSwap;
                session.touch();
                Ok(ConfirmOutcome::Proceed)
            }
        }
    }

    pub async fn run_execution(&self, session: &mut Session) -> Result<String> {
        let quote = session
            .pending_swap
            .clone()
            .ok_or_else(|| ScoreSwapError::system_error("no pending swap to execute"))?;

        let executor = match &self.executor {
            Some(executor) => executor.clone(),
            None => {
                session.state = SessionState::Failed;
                session.last_failure = Some("no signing wallet configured".to_string());
                session.touch();
                return Err(ScoreSwapError::chain_error(
                    "No wallet configured - cannot execute transactions.",
                ));
            }
        };

        let transaction = match executor.execute(&quote).await {
            Ok(transaction) => transaction,
            Err(err) => {
                session.state = SessionState::Failed;
                session.last_failure = Some(err.to_string());
                session.touch();
                return Err(err);
            }
        };

        Ok(self.on_execution_result(session, &transaction))
    }

    pub fn on_execution_result(&self, session: &mut Session, transaction: &Transaction) -> String {
        match transaction.status {
            TxStatus::Confirmed => {
                // The quote is consumed by a successful execution.
                session.pending_swap = None;
                session.state = SessionState::Completed;
                session.touch();

                let hash = transaction
                    .hash
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "N/A".to_string());
                format!(
                    "✅ Transaction complete!\n\n\
                    🔗 View on Arbiscan: https://arbiscan.io/tx/{}\n\n\
                    Thank you for using the bot! Use /start for another round.",
                    hash
                )
            }
            TxStatus::Pending | TxStatus::Failed | TxStatus::TimedOut => {
                let detail = transaction
                    .detail
                    .clone()
                    .unwrap_or_else(|| "the swap could not be completed".to_string());
                session.state = SessionState::Failed;
                session.last_failure = Some(detail.clone());
                session.touch();

                format!(
                    "❌ Transaction failed: {}\n\n\
                    Send \"retry\" to describe a new swap, or /start to begin from scratch.",
                    detail
                )
            }
        }
    }

    /// Explicit retry command after a failure: back to the request stage.
    pub fn retry_after_failure(&self, session: &mut Session) -> Result<String> {
        let analysis = session.analysis.clone().ok_or_else(|| {
            ScoreSwapError::validation_error("Nothing to retry. Please use /start to begin again.")
        })?;

        session.pending_swap = None;
        session.last_failure = None;
        session.state = SessionState::AwaitingSwapRequest;
        session.touch();

        Ok(format!(
            "Let's try again. Tell me how you would like to swap your {} USDC.",
            analysis.reward
        ))
    }
}
