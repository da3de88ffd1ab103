//! Fixed-capacity ring buffer backing the windowed detector

/// Ring buffer that overwrites its oldest element when full
///
/// Storage is allocated once at construction and never grows, so the
/// window can hold at most `capacity` values.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    slots: Vec<f64>,
    /// Index of the oldest element
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create an empty buffer; `capacity` must be non-zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            slots: vec![0.0; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Append a value, returning the evicted oldest value if the buffer was full
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let capacity = self.capacity();

        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = value;
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head];
            self.slots[self.head] = value;
            self.head = (self.head + 1) % capacity;
            Some(evicted)
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let capacity = self.capacity();
        (0..self.len).map(move |i| self.slots[(self.head + i) % capacity])
    }

    /// Population mean and standard deviation (`ddof = 0`) of the contents
    ///
    /// Returns `None` when the buffer is empty.
    pub fn mean_and_std(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }

        let n = self.len as f64;
        let mean = self.iter().sum::<f64>() / n;
        let variance = self.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some((mean, variance.sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut ring = RingBuffer::new(3);
        assert!(ring.is_empty());

        assert_eq!(ring.push(1.0), None);
        assert_eq!(ring.push(2.0), None);
        assert!(!ring.is_full());
        assert_eq!(ring.push(3.0), None);

        assert!(ring.is_full());
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut ring = RingBuffer::new(3);
        for v in [1.0, 2.0, 3.0] {
            ring.push(v);
        }

        assert_eq!(ring.push(4.0), Some(1.0));
        assert_eq!(ring.push(5.0), Some(2.0));

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut ring = RingBuffer::new(4);
        for i in 0..1000 {
            ring.push(i as f64);
            assert!(ring.len() <= ring.capacity());
        }
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![996.0, 997.0, 998.0, 999.0]);
    }

    #[test]
    fn test_population_statistics() {
        let mut ring = RingBuffer::new(8);
        assert!(ring.mean_and_std().is_none());

        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            ring.push(v);
        }

        let (mean, std) = ring.mean_and_std().unwrap();
        assert!((mean - 5.0).abs() < 1e-12);
        // Population std of this classic sample is exactly 2
        assert!((std - 2.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        RingBuffer::new(0);
    }
}
