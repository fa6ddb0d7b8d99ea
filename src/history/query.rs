use std::collections::VecDeque;

pub const QUERY_HISTORY_CAPACITY: usize = 3;

/// Rolling window of the most recent user queries, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryHistory {
    entries: VecDeque<String>,
}

impl QueryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new history with `query` appended, evicting the oldest entry at capacity.
    pub fn append(mut self, query: impl Into<String>) -> Self {
        self.push(query);
        self
    }

    pub fn push(&mut self, query: impl Into<String>) {
        if self.entries.len() == QUERY_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(query.into());
    }

    pub fn window(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
