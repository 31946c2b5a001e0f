pub mod model;
pub mod store;

pub use model::{
    is_valid_twitter_url, is_valid_wallet_address, AnalysisResult, ChatHistory, Reward, Session,
    SessionState, SwapQuote, TokenInfo, TxRequest,
};
pub use store::SessionStore;
