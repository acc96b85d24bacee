pub mod bridge;
pub mod brightness;
pub mod config;
pub mod gateway;
pub mod intent;
pub mod processor;
pub mod resolver;

pub use config::Config;
pub use config::LogLevel;
pub use gateway::SessionGateway;
pub use intent::Intent;
pub use intent::IntentKind;
pub use processor::CommandProcessor;
pub use processor::Feedback;
pub use resolver::EntityResolver;
