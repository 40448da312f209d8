//! Short rolling log of connection events, meant for on-screen display
//! while a player waits for an opponent.

use log::info;
use std::collections::VecDeque;

/// Lines kept for display.
pub const LOG_CAPACITY: usize = 10;

#[derive(Debug, Default, Clone)]
pub struct SessionLog {
    lines: VecDeque<String>,
}

impl SessionLog {
    /// Record a line, also forwarding it to the `log` facade.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.lines.push_back(line);
        while self.lines.len() > LOG_CAPACITY {
            self.lines.pop_front();
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// All kept lines joined with newlines.
    pub fn render(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }
}
