//! OffGridChat CLI library
//!
//! Terminal front end for the BLE link: scanning, an interactive chat
//! session with attachment support, and one-shot sends.

pub mod app;
pub mod attachments;
pub mod chat_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;

pub use app::ChatSession;
pub use chat_log::{ChatEntry, ChatLog};
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
