//! Parsing of lines typed into the chat prompt

use std::path::PathBuf;

use crate::error::{CliError, Result};

pub const HELP: &str = "\
Commands:
  /photo <path>   send an image file
  /audio <path>   send a voice recording
  /history [n]    show the last n messages (default 20)
  /save <path>    write the chat log as JSON
  /status         show the link state
  /reconnect      connect again after the link dropped
  /quit           leave the chat
Anything else is sent as a text message.";

const DEFAULT_HISTORY_LINES: usize = 20;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Photo(PathBuf),
    Audio(PathBuf),
    History(usize),
    Save(PathBuf),
    Status,
    Reconnect,
    Help,
    Quit,
    Empty,
}

impl ChatInput {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ChatInput::Empty);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(ChatInput::Message(line.to_string()));
        };

        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        let path = |what: &str| {
            if argument.is_empty() {
                Err(CliError::InvalidInput(format!("/{} needs a file path", what)))
            } else {
                Ok(PathBuf::from(argument))
            }
        };

        match name {
            "photo" => Ok(ChatInput::Photo(path("photo")?)),
            "audio" => Ok(ChatInput::Audio(path("audio")?)),
            "save" => Ok(ChatInput::Save(path("save")?)),
            "history" if argument.is_empty() => Ok(ChatInput::History(DEFAULT_HISTORY_LINES)),
            "history" => argument
                .parse()
                .map(ChatInput::History)
                .map_err(|_| CliError::InvalidInput(format!("not a count: {}", argument))),
            "status" => Ok(ChatInput::Status),
            "reconnect" => Ok(ChatInput::Reconnect),
            "help" => Ok(ChatInput::Help),
            "quit" | "exit" => Ok(ChatInput::Quit),
            other => Err(CliError::InvalidInput(format!(
                "unknown command /{} (try /help)",
                other
            ))),
        }
    }
}
