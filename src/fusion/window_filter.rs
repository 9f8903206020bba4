use std::collections::VecDeque;

/// Fixed-size window over the last `N` samples.
///
/// Once full, every insert evicts the oldest sample. The order of the samples is
/// never changed.
#[derive(Debug, Clone)]
pub struct WindowFilter<const N: usize> {
    /// `VecDeque` holding the samples, oldest at the front
    samples: VecDeque<f64>,
}

impl<const N: usize> Default for WindowFilter<N> {
    fn default() -> Self { Self::new() }
}

impl<const N: usize> WindowFilter<N> {
    pub fn new() -> Self { Self { samples: VecDeque::with_capacity(N) } }

    /// Pushes a sample to the back, evicting the front one if the window is full.
    pub fn push(&mut self, sample: f64) {
        if N == 0 {
            return;
        }
        if self.samples.len() == N {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize { self.samples.len() }
    pub fn is_empty(&self) -> bool { self.samples.is_empty() }
    pub fn is_full(&self) -> bool { self.samples.len() == N }
    pub fn capacity(&self) -> usize { N }
    pub fn clear(&mut self) { self.samples.clear(); }

    /// Arithmetic mean of the window, `None` while empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Median of the window, `None` while empty. Rejects single spikes completely.
    pub fn median(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }
}
