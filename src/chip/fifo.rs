//! Bounded data word FIFO used for the region FIFOs and the DMU FIFO
//!
//! Mirrors the nonblocking peek/get/put interface of the hardware FIFOs: a put
//! on a full FIFO fails instead of overwriting, a get/peek on an empty FIFO
//! returns nothing.

use ringbuffer::{AllocRingBuffer, RingBuffer};

use crate::words::data_word::AlpideDataWord;

/// A fixed-capacity FIFO of 24-bit data words
#[derive(Debug)]
pub struct WordFifo {
    inner: AllocRingBuffer<AlpideDataWord>,
}

impl WordFifo {
    /// Create a FIFO with the given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FIFO capacity must be at least 1");
        Self {
            inner: AllocRingBuffer::new(capacity),
        }
    }

    /// Nonblocking put. Returns false and drops nothing if the FIFO is full.
    pub fn put(&mut self, word: AlpideDataWord) -> bool {
        if self.inner.is_full() {
            return false;
        }
        let _ = self.inner.enqueue(word);
        true
    }

    /// Nonblocking get of the oldest word
    pub fn get(&mut self) -> Option<AlpideDataWord> {
        self.inner.dequeue()
    }

    /// Peek at the oldest word without removing it
    pub fn peek(&self) -> Option<&AlpideDataWord> {
        self.inner.peek()
    }

    /// Current occupancy
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if no words are stored
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// True if a put would fail
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn put_fails_when_full() {
        let mut fifo = WordFifo::new(2);
        assert!(fifo.put(AlpideDataWord::Comma));
        assert!(fifo.put(AlpideDataWord::Idle));
        assert!(fifo.is_full());
        assert!(!fifo.put(AlpideDataWord::BusyOn));
        assert_eq!(fifo.len(), 2);
        // The rejected word did not overwrite anything
        assert_eq!(fifo.get(), Some(AlpideDataWord::Comma));
        assert_eq!(fifo.get(), Some(AlpideDataWord::Idle));
        assert_eq!(fifo.get(), None);
    }

    #[test]
    fn peek_is_nondestructive() {
        let mut fifo = WordFifo::new(4);
        assert!(fifo.put(AlpideDataWord::RegionTrailer));
        assert_eq!(fifo.peek(), Some(&AlpideDataWord::RegionTrailer));
        assert_eq!(fifo.len(), 1);
        assert_eq!(fifo.get(), Some(AlpideDataWord::RegionTrailer));
        assert!(fifo.is_empty());
    }
}
