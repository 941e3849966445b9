use std::collections::VecDeque;

/// The last few seconds of signal: paired frequency and volume samples.
///
/// Both sequences are pushed and evicted together, so they always have the
/// same length and never exceed `capacity`. Readers get owned snapshots and
/// cannot mutate the history.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    capacity: usize,
    frequencies: VecDeque<f32>,
    volumes: VecDeque<f32>,
}

/// An immutable copy of the history at one tick, oldest entry first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    pub frequencies: Vec<f32>,
    pub volumes: Vec<f32>,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frequencies: VecDeque::with_capacity(capacity),
            volumes: VecDeque::with_capacity(capacity),
        }
    }

    /// Append the newest reading, evicting the oldest once full.
    pub fn push(&mut self, frequency_hz: f32, volume: f32) {
        while self.frequencies.len() >= self.capacity {
            self.frequencies.pop_front();
            self.volumes.pop_front();
        }
        self.frequencies.push_back(frequency_hz);
        self.volumes.push_back(volume);
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            frequencies: self.frequencies.iter().copied().collect(),
            volumes: self.volumes.iter().copied().collect(),
        }
    }

    /// Up to `n` most recent non-zero frequencies, oldest first.
    pub fn recent_voiced(&self, n: usize) -> Vec<f32> {
        let mut recent: Vec<f32> = self
            .frequencies
            .iter()
            .rev()
            .copied()
            .filter(|&f| f > 0.0)
            .take(n)
            .collect();
        recent.reverse();
        recent
    }

    /// Forget everything. Only a session reset does this.
    pub fn clear(&mut self) {
        self.frequencies.clear();
        self.volumes.clear();
    }
}

impl HistorySnapshot {
    /// Non-zero frequencies, in order.
    pub fn voiced_frequencies(&self) -> Vec<f32> {
        self.frequencies.iter().copied().filter(|&f| f > 0.0).collect()
    }

    /// Non-zero volumes, in order.
    pub fn audible_volumes(&self) -> Vec<f32> {
        self.volumes.iter().copied().filter(|&v| v > 0.0).collect()
    }
}
