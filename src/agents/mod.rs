pub mod analysis;
pub mod defi;
pub mod stream;

pub use analysis::{extract_score, AnalysisService, BitteAnalysisService};
pub use defi::{extract_swap_intent, BitteDefiAgent, DefiAgent, SwapIntent};
pub use stream::{parse_stream, user_message, AgentReply, ToolInvocation};
