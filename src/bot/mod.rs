pub mod analysis;
pub mod machine;
pub mod swap;

pub use analysis::AnalysisOrchestrator;
pub use machine::{ConversationStateMachine, MessagingChannel};
pub use swap::{ConfirmDecision, ConfirmOutcome, SwapOrchestrator};
