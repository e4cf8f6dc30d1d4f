pub mod schema;

pub use schema::{
    CompletionConfig, Config, GatewayConfig, HistoryConfig, ReliabilityConfig, TelegramConfig,
    TransportMode,
};
