use serde::Serialize;
use std::collections::VecDeque;

/// One photoplethysmographic reading: mean ROI brightness at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Milliseconds on the session's monotonic clock
    pub time_ms: f64,
    pub brightness: f64,
}

/// Rolling sample store; never holds more than `capacity` samples
pub struct SampleBuffer {
    data: VecDeque<Sample>,
    capacity: usize,
}

pub trait SeriesStatsExt {
    fn mean(&self) -> Option<f64>;
    fn std_dev(&self) -> Option<f64>;
    fn coefficient_of_variation(&self) -> f64;
}

// Population statistics over brightness values or RR intervals
impl SeriesStatsExt for [f64] {
    fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len() as f64)
    }

    fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / self.len() as f64;
        Some(variance.sqrt())
    }

    /// std / |mean|; an empty or zero-mean series counts as perfectly flat
    fn coefficient_of_variation(&self) -> f64 {
        match (self.mean(), self.std_dev()) {
            (Some(mean), Some(std)) if mean.abs() > f64::EPSILON => std / mean.abs(),
            _ => 0.0,
        }
    }
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_point(&self) -> Option<&Sample> {
        self.data.back()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Copy-on-read snapshot for the batch stages
    pub fn snapshot(&self) -> Vec<Sample> {
        self.data.iter().copied().collect()
    }

    pub fn brightness(&self) -> Vec<f64> {
        self.data.iter().map(|s| s.brightness).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize) -> Sample {
        Sample { time_ms: i as f64 * 10.0, brightness: i as f64 }
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buffer = SampleBuffer::new(3);
        for i in 0..5 {
            buffer.push(sample(i));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.brightness(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.last_point().map(|s| s.brightness), Some(4.0));
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buffer = SampleBuffer::new(512);
        for i in 0..2000 {
            buffer.push(sample(i));
            assert!(buffer.len() <= 512);
        }
        assert_eq!(buffer.len(), buffer.capacity());
    }

    #[test]
    fn test_clear() {
        let mut buffer = SampleBuffer::new(10);
        for i in 0..4 {
            buffer.push(sample(i));
        }
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.last_point().is_none());
    }

    #[test]
    fn test_brightness_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(values.mean(), Some(5.0));
        assert_eq!(values.std_dev(), Some(2.0));
        assert!((values.coefficient_of_variation() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_coefficient_of_variation_degenerate() {
        let empty: [f64; 0] = [];
        assert_eq!(empty.coefficient_of_variation(), 0.0);
        assert_eq!([0.0, 0.0].coefficient_of_variation(), 0.0);
        assert_eq!([120.0; 10].coefficient_of_variation(), 0.0);
    }
}
