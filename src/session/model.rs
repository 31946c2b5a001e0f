use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

/// Maximum number of chat turns kept per session before the oldest is dropped.
const MAX_HISTORY_TURNS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    AwaitingTwitterUrl,
    AwaitingWalletAddress,
    Analyzing,
    AwaitingTokenPreference,
    AwaitingSwapRequest,
    AwaitingSwapConfirmation,
    ExecutingSwap,
    Completed,
    Failed,
}

/// Reward amount in tenths of USDC. Keeping the amount as an integer count of
/// tenths makes `score * 0.1` exact for every score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward(u32);

impl Reward {
    pub fn from_score(score: u8) -> Self {
        Reward(score as u32)
    }

    pub fn tenths(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Reward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub score: u8,
    pub reward: Reward,
    pub source_url: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
}

/// Prepared call data extracted from the DeFi agent's tool result. Hex fields
/// stay as strings until execution time, when they are parsed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub to: String,
    pub value: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    pub token_in: TokenInfo,
    pub token_out: TokenInfo,
    pub amount_in: String,
    pub expected_amount_out: String,
    pub tx_request: TxRequest,
    pub expires_at: DateTime<Utc>,
}

impl SwapQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Ordered chat turns in the external agents' wire shape. The turns are kept
/// as opaque JSON and passed verbatim to the agent endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    turns: Vec<Value>,
}

impl ChatHistory {
    pub fn push(&mut self, turn: Value) {
        self.turns.push(turn);
        if self.turns.len() > MAX_HISTORY_TURNS {
            let excess = self.turns.len() - MAX_HISTORY_TURNS;
            self.turns.drain(..excess);
        }
    }

    pub fn turns(&self) -> &[Value] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub chat_id: i64,
    pub state: SessionState,
    pub twitter_url: Option<String>,
    pub wallet_address: Option<String>,
    pub analysis: Option<AnalysisResult>,
    pub pending_swap: Option<SwapQuote>,
    pub history: ChatHistory,
    /// Conversation id sent to the DeFi agent, stable for the session.
    pub agent_session_id: String,
    pub last_failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(chat_id: i64) -> Self {
        let now = Utc::now();
        Self {
            chat_id,
            state: SessionState::Idle,
            twitter_url: None,
            wallet_address: None,
            analysis: None,
            pending_swap: None,
            history: ChatHistory::default(),
            agent_session_id: uuid::Uuid::new_v4().to_string(),
            last_failure: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Back to Idle. The wallet address and agent conversation id survive so a
    /// returning user can run another round without re-entering them.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.twitter_url = None;
        self.analysis = None;
        self.pending_swap = None;
        self.last_failure = None;
        self.history.clear();
        self.touch();
    }

    pub fn quote_expiry(ttl_secs: i64) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(ttl_secs)
    }
}

/// A wallet address is exactly 42 characters: "0x" followed by 40 hex digits.
pub fn is_valid_wallet_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Recognized Twitter/X hosts.
const TWITTER_HOSTS: [&str; 5] = [
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
    "x.com",
    "www.x.com",
];

pub fn is_valid_twitter_url(url: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    match parsed.host_str() {
        Some(host) => TWITTER_HOSTS.contains(&host.to_ascii_lowercase().as_str()),
        None => false,
    }
}
