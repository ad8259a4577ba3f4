use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Listener priority. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGHEST: Priority = Priority(100_000);
    pub const HIGH: Priority = Priority(1_000);
    pub const NORMAL: Priority = Priority(0);
    pub const LOW: Priority = Priority(-1_000);
    pub const LOWEST: Priority = Priority(-100_000);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown priority '{0}'")]
pub struct InvalidPriority(pub String);

impl FromStr for Priority {
    type Err = InvalidPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highest" => Ok(Priority::HIGHEST),
            "high" => Ok(Priority::HIGH),
            "normal" => Ok(Priority::NORMAL),
            "low" => Ok(Priority::LOW),
            "lowest" => Ok(Priority::LOWEST),
            other => other
                .parse::<i32>()
                .map(Priority)
                .map_err(|_| InvalidPriority(other.to_string())),
        }
    }
}

/// Entries kept sorted by descending priority. Equal priorities keep
/// registration order, so the first registered entry wins ties.
#[derive(Debug, Clone)]
pub struct PriorityList<T> {
    entries: Vec<PriorityEntry<T>>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
pub struct PriorityEntry<T> {
    pub priority: Priority,
    /// Registration sequence number, unique within the list.
    pub seq: u64,
    pub item: T,
}

impl<T> Default for PriorityList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<T> PriorityList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit sequence number. Callers sharing one counter
    /// across several lists can later merge them while keeping global order.
    pub fn insert_with_seq(&mut self, priority: Priority, seq: u64, item: T) {
        let key = (std::cmp::Reverse(priority), seq);
        let index = self
            .entries
            .iter()
            .position(|e| (std::cmp::Reverse(e.priority), e.seq) > key)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, PriorityEntry { priority, seq, item });
        self.next_seq = self.next_seq.max(seq + 1);
    }

    pub fn insert(&mut self, priority: Priority, item: T) -> u64 {
        let seq = self.next_seq;
        self.insert_with_seq(priority, seq, item);
        seq
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&PriorityEntry<T>) -> bool) {
        self.entries.retain(|e| keep(e));
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriorityEntry<T>> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PriorityEntry<T>> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
