use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Result, ScoreSwapError};
use crate::session::{Session, SessionState, SessionStore};
use super::analysis::AnalysisOrchestrator;
use super::swap::{ConfirmDecision, ConfirmOutcome, SwapOrchestrator};

/// Outbound side of the messaging transport. The core only ever sends plain
/// text through it.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}

const WELCOME: &str = "🐦 Welcome to the Twitter Analysis & Token Swap Bot!\n\n\
    This bot will:\n\
    1. 📊 Analyze your Twitter URL and give you a score\n\
    2. 🎁 Award you USDC tokens based on your score\n\
    3. 🔄 Swap the reward into any token you prefer\n\n\
    Please share a Twitter URL that you'd like me to analyze.";

const HELP: &str = "🤖 Twitter Analysis & Swap Bot\n\n\
    Commands:\n\
    /start - Start the analysis process\n\
    /help - Show this help message\n\
    /wallet - Show wallet information\n\
    /reset - Reset the conversation\n\n\
    How it works:\n\
    1. Use /start to begin\n\
    2. Share a Twitter URL\n\
    3. Provide your wallet address\n\
    4. Get your analysis score and USDC prize\n\
    5. Describe the swap you want in natural language\n\n\
    Network: Arbitrum One";

/// Top-level dispatcher. Looks up the session, routes the message to the
/// orchestrator matching the current state, and persists the new state
/// together with the outbound reply under the per-user lock.
pub struct ConversationStateMachine {
    store: Arc<SessionStore>,
    channel: Arc<dyn MessagingChannel>,
    analysis: AnalysisOrchestrator,
    swap: SwapOrchestrator,
}

impl ConversationStateMachine {
    pub fn new(
        store: Arc<SessionStore>,
        channel: Arc<dyn MessagingChannel>,
        analysis: AnalysisOrchestrator,
        swap: SwapOrchestrator,
    ) -> Self {
        Self {
            store,
            channel,
            analysis,
            swap,
        }
    }

    /// Processes one inbound message. The session slot lock is held for the
    /// whole turn, so messages from the same chat are strictly serialized.
    pub async fn handle_message(&self, chat_id: i64, text: &str) {
        let slot = self.store.checkout(chat_id).await;
        let mut session = slot.lock().await;

        let reply = self.dispatch(&mut session, text.trim()).await;

        if let Err(e) = self.channel.send_text(chat_id, &reply).await {
            error!("Failed to send reply to chat {}: {}", chat_id, e);
        }
    }

    async fn dispatch(&self, session: &mut Session, text: &str) -> String {
        info!(
            "Chat {} in state {:?}: handling message",
            session.chat_id, session.state
        );

        if text.starts_with('/') {
            return self.handle_command(session, text);
        }

        match session.state {
            SessionState::Idle | SessionState::Completed => {
                "Please use /start to begin the Twitter analysis process.".to_string()
            }
            SessionState::AwaitingTwitterUrl => self
                .analysis
                .submit_url(session, text)
                .unwrap_or_else(|e| self.error_reply(session, e)),
            SessionState::AwaitingWalletAddress => self.on_wallet(session, text).await,
            SessionState::Analyzing => self.on_analyzing(session, text).await,
            SessionState::AwaitingTokenPreference | SessionState::AwaitingSwapRequest => {
                self.on_swap_request(session, text).await
            }
            SessionState::AwaitingSwapConfirmation => self.on_confirmation(session, text).await,
            SessionState::ExecutingSwap => {
                "⏳ Your swap is being executed, hang tight.".to_string()
            }
            SessionState::Failed => self.on_failed(session, text).await,
        }
    }

    fn handle_command(&self, session: &mut Session, text: &str) -> String {
        let command = text.split_whitespace().next().unwrap_or(text);
        match command {
            "/start" => {
                session.reset();
                session.state = SessionState::AwaitingTwitterUrl;
                session.touch();
                WELCOME.to_string()
            }
            "/help" => HELP.to_string(),
            "/wallet" => match &session.wallet_address {
                Some(address) => format!(
                    "👛 Wallet address: {}\n🌐 Network: Arbitrum One\n\
                    🔗 Explorer: https://arbiscan.io/address/{}",
                    address, address
                ),
                None => {
                    "❌ No wallet address found. Please use /start to begin the process."
                        .to_string()
                }
            },
            "/reset" => {
                session.reset();
                "✅ Conversation has been reset. Use /start to begin a new session.".to_string()
            }
            _ => "Unknown command. Use /help to see what I can do.".to_string(),
        }
    }

    async fn on_wallet(&self, session: &mut Session, text: &str) -> String {
        if let Err(e) = self.analysis.submit_wallet(session, text) {
            return self.error_reply(session, e);
        }

        self.notify(session.chat_id, "🔄 Processing your request...")
            .await;

        match self.analysis.run_analysis(session).await {
            Ok(reply) => reply,
            Err(e) => self.error_reply(session, e),
        }
    }

    async fn on_analyzing(&self, session: &mut Session, text: &str) -> String {
        match text.to_lowercase().as_str() {
            "retry" => match self.analysis.run_analysis(session).await {
                Ok(reply) => reply,
                Err(e) => self.error_reply(session, e),
            },
            "abort" | "cancel" => {
                session.reset();
                "Analysis aborted. Use /start to begin again.".to_string()
            }
            _ => "The analysis hit a snag. Send \"retry\" to try again or \"abort\" to start over."
                .to_string(),
        }
    }

    async fn on_swap_request(&self, session: &mut Session, text: &str) -> String {
        match self.swap.submit_swap_request(session, text).await {
            Ok(reply) => reply,
            Err(e) => self.error_reply(session, e),
        }
    }

    async fn on_confirmation(&self, session: &mut Session, text: &str) -> String {
        match text.to_lowercase().as_str() {
            "yes" | "confirm" | "proceed" | "do it" | "execute" => {
                match self.swap.confirm(session, ConfirmDecision::Accept) {
                    Ok(ConfirmOutcome::Proceed) => {
                        self.notify(session.chat_id, "🔄 Executing swap...").await;
                        match self.swap.run_execution(session).await {
                            Ok(reply) => reply,
                            Err(e) => self.error_reply(session, e),
                        }
                    }
                    Ok(ConfirmOutcome::Rejected) => {
                        "❌ Swap cancelled. You can make another swap request or use /start \
                        to begin again."
                            .to_string()
                    }
                    Err(e) => self.error_reply(session, e),
                }
            }
            "no" | "cancel" | "stop" | "abort" => {
                match self.swap.confirm(session, ConfirmDecision::Reject) {
                    Ok(_) => "❌ Swap cancelled. You can make another swap request or use /start \
                        to begin again."
                        .to_string(),
                    Err(e) => self.error_reply(session, e),
                }
            }
            // Anything else is a fresh swap request.
            _ => self.on_swap_request(session, text).await,
        }
    }

    async fn on_failed(&self, session: &mut Session, text: &str) -> String {
        if text.eq_ignore_ascii_case("retry") {
            return match self.swap.retry_after_failure(session) {
                Ok(reply) => reply,
                Err(e) => self.error_reply(session, e),
            };
        }

        let detail = session
            .last_failure
            .clone()
            .unwrap_or_else(|| "something went wrong".to_string());
        format!(
            "❌ The last step failed: {}\n\nSend \"retry\" to try the swap again, or /start to \
            begin from scratch.",
            detail
        )
    }

    /// Every orchestrator error becomes a user-facing message here; the state
    /// decision was already made by the orchestrator that raised it.
    fn error_reply(&self, session: &Session, err: ScoreSwapError) -> String {
        warn!("Chat {} error: {}", session.chat_id, err);
        match err {
            ScoreSwapError::Validation(msg) => format!("❌ {}", msg),
            ScoreSwapError::Analysis(msg) => format!(
                "❌ Analysis failed: {}.\n\nSend \"retry\" to try again or \"abort\" to start over.",
                msg
            ),
            ScoreSwapError::SwapParse(msg) => format!(
                "❌ {}.\n\nPlease try another swap request or be more specific.",
                msg
            ),
            ScoreSwapError::ExpiredQuote(msg) => format!("⌛ {}", msg),
            ScoreSwapError::Chain(msg) => format!("❌ Transaction failed: {}", msg),
            ScoreSwapError::Config(_) | ScoreSwapError::System(_) => {
                "⚠️ Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }

    async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.channel.send_text(chat_id, text).await {
            error!("Failed to send notification to chat {}: {}", chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentReply, AnalysisService, DefiAgent, ToolInvocation};
    use crate::chain::client::{ChainClient, ReceiptStatus, TxParams};
    use crate::chain::{TransactionExecutor, Wallet};
    use async_trait::async_trait;
    use alloy::primitives::{Address, Bytes, B256};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const WALLET: &str = "0xAbCdEf0123456789AbCdEf0123456789AbCdEf01";

    struct MockChannel {
        sent: StdMutex<Vec<(i64, String)>>,
    }

    impl MockChannel {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
            }
        }

        fn last(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl MessagingChannel for MockChannel {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct ScriptedAnalysis {
        reply: AgentReply,
    }

    #[async_trait]
    impl AnalysisService for ScriptedAnalysis {
        fn agent_id(&self) -> &str {
            "agent-rating.vercel.app"
        }

        async fn analyze(&self, _session_id: &str, _messages: &[Value]) -> Result<AgentReply> {
            Ok(self.reply.clone())
        }
    }

    struct ScriptedDefi {
        reply: AgentReply,
    }

    #[async_trait]
    impl DefiAgent for ScriptedDefi {
        fn agent_id(&self) -> &str {
            "bitte-defi"
        }

        async fn request_swap(
            &self,
            _session_id: &str,
            _messages: &[Value],
            _wallet_address: &str,
        ) -> Result<AgentReply> {
            Ok(self.reply.clone())
        }
    }

    struct MockChain {
        calls: AtomicUsize,
        receipt: Option<ReceiptStatus>,
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn estimate_gas(&self, _tx: &TxParams) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(100_000)
        }

        async fn gas_price(&self) -> Result<u128> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(100_000_000)
        }

        async fn transaction_count(&self, _address: Address) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        async fn submit(&self, _raw_tx: Bytes) -> Result<B256> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(B256::with_last_byte(1))
        }

        async fn wait_for_receipt(
            &self,
            _hash: B256,
            _timeout: Duration,
        ) -> Result<Option<ReceiptStatus>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.receipt)
        }
    }

    fn score_reply(score: &str) -> AgentReply {
        AgentReply {
            content: "Nice tweet.".to_string(),
            tool_invocations: vec![ToolInvocation {
                tool_call_id: "call-1".to_string(),
                tool_name: "rate".to_string(),
                args: Value::Null,
                result: json!({ "data": score }),
                state: "completed".to_string(),
            }],
            assistant_message: Some(json!({ "role": "assistant" })),
        }
    }

    fn swap_reply() -> AgentReply {
        AgentReply {
            content: "Here is your quote.".to_string(),
            tool_invocations: vec![
                ToolInvocation {
                    tool_call_id: "call-swap".to_string(),
                    tool_name: "swap".to_string(),
                    args: Value::Null,
                    result: json!({
                        "data": { "data": {
                            "tokenIn": {
                                "symbol": "USDC",
                                "address": "0xaf88d065e77c8cC2239327C5EDb3A432268e5831",
                                "decimals": 6,
                                "amount": "700000"
                            },
                            "tokenOut": {
                                "symbol": "WETH",
                                "address": "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1",
                                "decimals": 18,
                                "amount": "200000000000000"
                            }
                        } }
                    }),
                    state: "completed".to_string(),
                },
                ToolInvocation {
                    tool_call_id: "call-tx".to_string(),
                    tool_name: "generate-evm-tx".to_string(),
                    args: Value::Null,
                    result: json!({
                        "data": { "evmSignRequest": { "params": [{
                            "to": "0x9008D19f58AAbD9eD0D60971565AA8510560ab41",
                            "value": "0x0",
                            "data": "0xdeadbeef"
                        }] } }
                    }),
                    state: "completed".to_string(),
                },
            ],
            assistant_message: Some(json!({ "role": "assistant" })),
        }
    }

    struct Harness {
        machine: ConversationStateMachine,
        channel: Arc<MockChannel>,
        store: Arc<SessionStore>,
        chain: Arc<MockChain>,
    }

    fn harness(
        analysis: AgentReply,
        defi: AgentReply,
        receipt: Option<ReceiptStatus>,
    ) -> Harness {
        let store = Arc::new(SessionStore::new());
        let channel = Arc::new(MockChannel::new());
        let chain = Arc::new(MockChain {
            calls: AtomicUsize::new(0),
            receipt,
        });
        let executor = TransactionExecutor::new(
            chain.clone(),
            Wallet::from_hex(TEST_KEY).unwrap(),
            42161,
            Duration::from_secs(120),
        );
        let machine = ConversationStateMachine::new(
            store.clone(),
            channel.clone(),
            AnalysisOrchestrator::new(Arc::new(ScriptedAnalysis { reply: analysis }), Duration::from_secs(30)),
            SwapOrchestrator::new(
                Arc::new(ScriptedDefi { reply: defi }),
                Some(Arc::new(executor)),
                Duration::from_secs(30),
                60,
            ),
        );
        Harness {
            machine,
            channel,
            store,
            chain,
        }
    }

    async fn state_of(harness: &Harness, chat_id: i64) -> SessionState {
        harness.store.checkout(chat_id).await.lock().await.state
    }

    async fn run_analysis_flow(harness: &Harness, chat_id: i64) {
        harness.machine.handle_message(chat_id, "/start").await;
        harness
            .machine
            .handle_message(chat_id, "https://twitter.com/foo/status/1")
            .await;
        harness.machine.handle_message(chat_id, WALLET).await;
    }

    #[tokio::test]
    async fn test_scenario_a_analysis_reaches_token_preference() {
        let harness = harness(score_reply("7"), swap_reply(), None);
        run_analysis_flow(&harness, 1).await;

        assert_eq!(
            state_of(&harness, 1).await,
            SessionState::AwaitingTokenPreference
        );
        let slot = harness.store.checkout(1).await;
        let session = slot.lock().await;
        assert_eq!(session.analysis.as_ref().unwrap().reward.to_string(), "0.7");
        assert!(harness.channel.last().contains("0.7 USDC"));
    }

    #[tokio::test]
    async fn test_scenario_b_invalid_url_keeps_state() {
        let harness = harness(score_reply("7"), swap_reply(), None);
        harness.machine.handle_message(1, "/start").await;
        harness
            .machine
            .handle_message(1, "http://example.com/x")
            .await;

        assert_eq!(state_of(&harness, 1).await, SessionState::AwaitingTwitterUrl);
        assert!(harness.channel.last().contains("valid Twitter URL"));
    }

    #[tokio::test]
    async fn test_invalid_wallet_keeps_state() {
        let harness = harness(score_reply("7"), swap_reply(), None);
        harness.machine.handle_message(1, "/start").await;
        harness
            .machine
            .handle_message(1, "https://x.com/foo/status/1")
            .await;
        harness.machine.handle_message(1, "0xnotawallet").await;

        assert_eq!(
            state_of(&harness, 1).await,
            SessionState::AwaitingWalletAddress
        );
        assert!(harness.channel.last().contains("valid wallet address"));
    }

    #[tokio::test]
    async fn test_full_swap_flow_completes() {
        let harness = harness(score_reply("7"), swap_reply(), Some(ReceiptStatus::Success));
        run_analysis_flow(&harness, 1).await;

        harness.machine.handle_message(1, "swap all to WETH").await;
        assert_eq!(
            state_of(&harness, 1).await,
            SessionState::AwaitingSwapConfirmation
        );

        harness.machine.handle_message(1, "yes").await;
        assert_eq!(state_of(&harness, 1).await, SessionState::Completed);
        assert!(harness.channel.last().contains("Transaction complete"));

        // Terminal state: further messages just prompt for /start.
        harness.machine.handle_message(1, "again please").await;
        assert_eq!(state_of(&harness, 1).await, SessionState::Completed);
        assert!(harness.channel.last().contains("/start"));
    }

    #[tokio::test]
    async fn test_rejecting_quote_returns_to_request_stage() {
        let harness = harness(score_reply("7"), swap_reply(), Some(ReceiptStatus::Success));
        run_analysis_flow(&harness, 1).await;
        harness.machine.handle_message(1, "swap all to WETH").await;

        harness.machine.handle_message(1, "no").await;
        assert_eq!(
            state_of(&harness, 1).await,
            SessionState::AwaitingSwapRequest
        );
        assert!(harness.channel.last().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_scenario_c_expired_quote_is_never_executed() {
        let harness = harness(score_reply("7"), swap_reply(), Some(ReceiptStatus::Success));
        run_analysis_flow(&harness, 1).await;
        harness.machine.handle_message(1, "swap all to WETH").await;

        {
            let slot = harness.store.checkout(1).await;
            let mut session = slot.lock().await;
            session.pending_swap.as_mut().unwrap().expires_at =
                chrono::Utc::now() - chrono::Duration::seconds(1);
        }

        harness.machine.handle_message(1, "yes").await;
        assert_eq!(
            state_of(&harness, 1).await,
            SessionState::AwaitingSwapConfirmation
        );
        assert!(harness.channel.last().contains("expired"));
        assert_eq!(harness.chain.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_d_receipt_timeout_fails_session_with_retry_prompt() {
        let harness = harness(score_reply("7"), swap_reply(), None);
        run_analysis_flow(&harness, 1).await;
        harness.machine.handle_message(1, "swap all to WETH").await;

        harness.machine.handle_message(1, "yes").await;
        assert_eq!(state_of(&harness, 1).await, SessionState::Failed);
        assert!(harness.channel.last().contains("retry"));

        harness.machine.handle_message(1, "retry").await;
        assert_eq!(
            state_of(&harness, 1).await,
            SessionState::AwaitingSwapRequest
        );
    }

    #[tokio::test]
    async fn test_unparseable_swap_reply_keeps_request_stage() {
        let vague = AgentReply {
            content: "Which token did you mean?".to_string(),
            ..Default::default()
        };
        let harness = harness(score_reply("7"), vague, None);
        run_analysis_flow(&harness, 1).await;

        harness.machine.handle_message(1, "swap it").await;
        assert_eq!(
            state_of(&harness, 1).await,
            SessionState::AwaitingSwapRequest
        );
        assert!(harness.channel.last().contains("more specific"));
    }

    #[tokio::test]
    async fn test_wrong_step_messages_leave_state_unchanged() {
        let harness = harness(score_reply("7"), swap_reply(), None);

        // Idle: arbitrary text does not start a flow.
        harness.machine.handle_message(1, "hello there").await;
        assert_eq!(state_of(&harness, 1).await, SessionState::Idle);
        assert!(harness.channel.last().contains("/start"));

        // ExecutingSwap: inbound text cannot disturb the execution.
        {
            let slot = harness.store.checkout(2).await;
            slot.lock().await.state = SessionState::ExecutingSwap;
        }
        harness.machine.handle_message(2, "cancel").await;
        assert_eq!(state_of(&harness, 2).await, SessionState::ExecutingSwap);

        // Analyzing: only retry/abort are meaningful.
        {
            let slot = harness.store.checkout(3).await;
            slot.lock().await.state = SessionState::Analyzing;
        }
        harness.machine.handle_message(3, "how long?").await;
        assert_eq!(state_of(&harness, 3).await, SessionState::Analyzing);
        assert!(harness.channel.last().contains("retry"));
    }

    #[tokio::test]
    async fn test_out_of_range_score_prompts_retry_then_abort_resets() {
        let harness = harness(score_reply("42"), swap_reply(), None);
        run_analysis_flow(&harness, 1).await;

        assert_eq!(state_of(&harness, 1).await, SessionState::Analyzing);
        assert!(harness.channel.last().contains("retry"));

        harness.machine.handle_message(1, "abort").await;
        assert_eq!(state_of(&harness, 1).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_reset_command() {
        let harness = harness(score_reply("7"), swap_reply(), None);
        run_analysis_flow(&harness, 1).await;

        harness.machine.handle_message(1, "/reset").await;
        assert_eq!(state_of(&harness, 1).await, SessionState::Idle);
        let slot = harness.store.checkout(1).await;
        let session = slot.lock().await;
        assert!(session.history.is_empty());
        // Wallet survives a reset for the next round.
        assert_eq!(session.wallet_address.as_deref(), Some(WALLET));
    }

    #[tokio::test]
    async fn test_wallet_command() {
        let harness = harness(score_reply("7"), swap_reply(), None);
        harness.machine.handle_message(1, "/wallet").await;
        assert!(harness.channel.last().contains("No wallet address"));

        run_analysis_flow(&harness, 1).await;
        harness.machine.handle_message(1, "/wallet").await;
        assert!(harness.channel.last().contains(WALLET));
    }

    #[tokio::test]
    async fn test_users_are_processed_independently() {
        let harness = Arc::new(harness(score_reply("7"), swap_reply(), None));

        let mut tasks = Vec::new();
        for chat_id in 1..=8i64 {
            let harness = harness.clone();
            tasks.push(tokio::spawn(async move {
                run_analysis_flow(&harness, chat_id).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for chat_id in 1..=8i64 {
            assert_eq!(
                state_of(&harness, chat_id).await,
                SessionState::AwaitingTokenPreference
            );
        }
    }
}
