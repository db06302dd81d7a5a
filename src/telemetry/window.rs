//! Bounded FIFO of recent deltas for moving averages.

use std::collections::VecDeque;

/// Keeps the most recent `capacity` values, evicting the oldest first.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<i32>,
    capacity: usize,
}

impl RollingWindow {
    /// Creates an empty window. A capacity of 0 is treated as 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a value, evicting the oldest if the window is full.
    pub fn push(&mut self, value: i32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Arithmetic mean of the current contents, 0.0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: i64 = self.values.iter().map(|&v| i64::from(v)).sum();
        sum as f64 / self.values.len() as f64
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &i32> {
        self.values.iter()
    }
}
