use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Reply mode allows filtering which replies are recorded.
///
/// Recording is purely diagnostic and never changes the bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// No replies are recorded
    #[default]
    None,
    /// Only errors are recorded
    OnlyErr,
    /// All replies are recorded
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Error(String),
    Reply(String),
}

/// Bounded ring of recently sent replies
#[derive(Debug)]
pub struct ReplyRecorder {
    mode: ReplyMode,
    capacity: usize,
    entries: VecDeque<Recorded>,
}

impl ReplyRecorder {
    pub fn new(mode: ReplyMode, capacity: usize) -> Self {
        Self {
            mode,
            capacity,
            entries: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> ReplyMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ReplyMode) {
        self.mode = mode;
        if mode == ReplyMode::None {
            self.entries.clear();
        }
    }

    /// Record an error message. In FULL mode the error frame is already
    /// captured by [`ReplyRecorder::reply`].
    pub fn error(&mut self, msg: &str) {
        if self.mode == ReplyMode::OnlyErr {
            trace!(error = msg, "recorded error reply");
            self.push(Recorded::Error(msg.to_string()));
        }
    }

    /// Record a physical reply frame
    pub fn reply(&mut self, parts: &[&[u8]]) {
        if self.mode != ReplyMode::Full {
            return;
        }
        let text: String = parts.iter().map(|p| String::from_utf8_lossy(p)).collect();
        trace!(reply = %text.escape_debug(), "recorded reply");
        self.push(Recorded::Reply(text));
    }

    pub fn entries(&self) -> impl Iterator<Item = &Recorded> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, entry: Recorded) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}
