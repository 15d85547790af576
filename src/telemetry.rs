use std::collections::VecDeque;

use rand::Rng;

const MAX_LOG_LINES: usize = 50;

/// Probability per timer tick that a synthetic feed line is emitted.
const FEED_CHANCE: f64 = 0.3;

const FEED_MESSAGES: [&str; 8] = [
    "Order book depth resync complete",
    "Risk engine heartbeat OK",
    "Market data snapshot refreshed",
    "Primary uplink latency nominal",
    "Portfolio marks recomputed",
    "Volatility surface rebuilt",
    "Session keepalive acknowledged",
    "Quote cache compacted",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Crit,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Crit => "CRIT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub timestamp: String,
    pub level: Level,
    pub message: String,
}

/// Newest-first system log feed, capped at MAX_LOG_LINES entries.
/// Entries are immutable once inserted and leave only by eviction.
#[derive(Debug, Default)]
pub struct SystemLog {
    entries: VecDeque<Entry>,
    seq: u64,
}

impl SystemLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: Into<String>>(&mut self, level: Level, message: T) {
        let entry = Entry {
            id: format!("evt-{}", self.seq),
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            level,
            message: message.into(),
        };
        self.seq += 1;
        self.entries.push_front(entry);
        self.entries.truncate(MAX_LOG_LINES);
    }

    pub fn info<T: Into<String>>(&mut self, message: T) {
        self.push(Level::Info, message);
    }

    /// Emits one line from the fixed feed set with probability FEED_CHANCE.
    /// Cosmetic only; nothing else depends on these entries.
    pub fn synthetic_tick(&mut self) {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(FEED_CHANCE) {
            let message = FEED_MESSAGES[rng.gen_range(0..FEED_MESSAGES.len())];
            self.push(Level::Info, message);
        }
    }

    /// Newest first.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
