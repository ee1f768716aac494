pub mod client;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod protocol;
pub mod server;

pub use client::{AgentClient, QueryMethod};
pub use config::ClientConfig;
pub use decoder::FrameDecoder;
pub use dispatch::{EventKind, StreamCallbacks};
pub use protocol::{
    AgentError, FilePayload, HealthStatus, StreamFrame, ToolDefinition, ToolExecutionResponse,
};
