use std::collections::VecDeque;

/// Moving-average smoothing for one scalar axis of the IMU stream.
///
/// Keeps the last `window_size` samples in arrival order and returns their
/// arithmetic mean. Oldest samples are evicted first.
#[derive(Clone, Debug)]
pub struct MovingAverage {
    window: VecDeque<f64>,
    window_size: usize,
}

impl MovingAverage {
    /// Create a new smoother with given window size (typically 10)
    pub fn new(window_size: usize) -> Self {
        MovingAverage {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Push a sample and return the mean of the retained window
    pub fn update(&mut self, value: f64) -> f64 {
        self.window.push_back(value);

        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        // Zero capacity keeps no history: pass the sample straight through
        if self.window.is_empty() {
            return value;
        }

        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Shrink or grow the capacity. Excess history is dropped from the front,
    /// nothing is replayed.
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = window_size;
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Retained samples, oldest first
    pub fn samples(&self) -> impl Iterator<Item = &f64> {
        self.window.iter()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Get current window size (actual, not max)
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Check if window is empty
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_value() {
        let mut smoother = MovingAverage::new(10);
        let result = smoother.update(5.0);
        assert_eq!(result, 5.0);
    }

    #[test]
    fn test_mean_of_partial_window() {
        let mut smoother = MovingAverage::new(5);
        let inputs = [1.0, 4.0, -2.0, 7.0];
        let mut seen = Vec::new();
        for value in inputs {
            seen.push(value);
            let result = smoother.update(value);
            let mean = seen.iter().sum::<f64>() / seen.len() as f64;
            assert_relative_eq!(result, mean, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_window_wrapping() {
        let mut smoother = MovingAverage::new(3);
        for value in [10.0, 1.0, 2.0, 3.0, 4.0] {
            smoother.update(value);
        }
        assert_eq!(smoother.len(), 3);
        // Only [2, 3, 4] survive
        let result = smoother.update(5.0);
        assert_relative_eq!(result, (3.0 + 4.0 + 5.0) / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shrink_truncates_from_front() {
        let mut smoother = MovingAverage::new(5);
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            smoother.update(value);
        }
        smoother.set_window_size(2);
        assert_eq!(smoother.samples().copied().collect::<Vec<_>>(), vec![4.0, 5.0]);

        let result = smoother.update(6.0);
        assert_relative_eq!(result, 5.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_capacity_passthrough() {
        let mut smoother = MovingAverage::new(0);
        assert_eq!(smoother.update(3.25), 3.25);
        assert_eq!(smoother.update(-1.0), -1.0);
        assert!(smoother.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut smoother = MovingAverage::new(4);
        smoother.update(1.0);
        smoother.update(2.0);
        smoother.clear();
        assert!(smoother.is_empty());
        assert_eq!(smoother.update(8.0), 8.0);
    }
}
