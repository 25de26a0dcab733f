use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of a transfer in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub name: String,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub bytes_per_second: f64,
}

impl TransferProgress {
    /// Completion ratio in `0.0..=1.0`; an empty file is complete.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.transferred_bytes as f64 / self.total_bytes as f64
    }

    pub fn is_complete(&self) -> bool {
        self.transferred_bytes >= self.total_bytes
    }
}

/// Callback invoked after every chunk sent or received.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Transfer speed over a sliding window of samples.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 100)
    }
}

impl SpeedCalculator {
    pub fn new(window_size: Duration, max_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.max(2),
            window_size,
        }
    }

    /// Records `bytes` moved now.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&mut self, bytes: u64, timestamp: Instant) {
        self.samples.push_back(SpeedSample { bytes, timestamp });

        while let Some(front) = self.samples.front() {
            let stale = timestamp.duration_since(front.timestamp) > self.window_size;
            if !stale && self.samples.len() <= self.max_samples {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Average bytes/second across the window; 0 until two samples exist.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }

        // The first sample marks the start of the window.
        let bytes: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Time left for `remaining_bytes` at the current speed.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// Feeds a [`ProgressCallback`] for one transfer.
pub(crate) struct ProgressReporter {
    name: String,
    total_bytes: u64,
    transferred_bytes: u64,
    speed: SpeedCalculator,
    callback: ProgressCallback,
}

impl ProgressReporter {
    pub(crate) fn new(name: &str, total_bytes: u64, callback: ProgressCallback) -> Self {
        let mut speed = SpeedCalculator::default();
        speed.add_sample(0);
        Self {
            name: name.to_string(),
            total_bytes,
            transferred_bytes: 0,
            speed,
            callback,
        }
    }

    pub(crate) fn advance(&mut self, bytes: u64) {
        self.transferred_bytes += bytes;
        self.speed.add_sample(bytes);
        (self.callback)(TransferProgress {
            name: self.name.clone(),
            total_bytes: self.total_bytes,
            transferred_bytes: self.transferred_bytes,
            bytes_per_second: self.speed.bytes_per_second(),
        });
    }
}
