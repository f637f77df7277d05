//! In-memory log of the messages exchanged in a chat session

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use offgrid_core::FrameKind;
use serde::{Deserialize, Serialize};

use crate::error::Result;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One sent or received message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Increases by one per entry within a session
    pub id: u64,
    pub kind: FrameKind,
    pub is_mine: bool,
    pub timestamp_millis: u64,
    /// Message text, for text frames
    pub text: Option<String>,
    /// Local copy of an attachment
    pub file: Option<PathBuf>,
    /// Payload size in bytes
    pub size: usize,
}

impl fmt::Display for ChatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = if self.is_mine { "me" } else { "peer" };
        write!(f, "#{} {:>4}: ", self.id, who)?;
        match (&self.text, &self.file) {
            (Some(text), _) => write!(f, "{}", text),
            (None, Some(file)) => write!(f, "[{} {} bytes] {}", self.kind, self.size, file.display()),
            (None, None) => write!(f, "[{} {} bytes]", self.kind, self.size),
        }
    }
}

/// Bounded chat history, oldest entries evicted first
#[derive(Debug)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    next_id: u64,
    limit: usize,
}

impl ChatLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 0,
            limit: limit.max(1),
        }
    }

    pub fn record_text(&mut self, text: &str, is_mine: bool) -> &ChatEntry {
        self.push(FrameKind::Text, is_mine, Some(text.trim().to_string()), None, text.len())
    }

    pub fn record_attachment(
        &mut self,
        kind: FrameKind,
        is_mine: bool,
        file: Option<PathBuf>,
        size: usize,
    ) -> &ChatEntry {
        self.push(kind, is_mine, None, file, size)
    }

    fn push(
        &mut self,
        kind: FrameKind,
        is_mine: bool,
        text: Option<String>,
        file: Option<PathBuf>,
        size: usize,
    ) -> &ChatEntry {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(ChatEntry {
            id,
            kind,
            is_mine,
            timestamp_millis: now_millis(),
            text,
            file,
            size,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    /// The most recent `count` entries, oldest first
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter().skip(self.entries.len().saturating_sub(count))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Write the log as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
