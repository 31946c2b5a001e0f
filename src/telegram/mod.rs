pub mod api;

pub use api::{InboundMessage, TelegramApi, UpdatePoller};
