pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use cli::run_cli;
pub use client::{ChatClient, ChatEvent, EventSink, SessionState};
pub use config::Config;
pub use error::{ClientError, TransportError};
