mod settings;

pub use settings::{LogFormat, LoggingConfig, RoomsConfig, ServerConfig, Settings, WebSocketConfig};
