//! Byte buffer for stream reassembly. Data is appended at the tail and
//! consumed from the head; after a decode pass the unconsumed tail is
//! compacted to the front so the capacity check stays meaningful.

use crate::support::{EpsError, EpsResult};

pub struct Buffer {
    data: Vec<u8>,
    head: usize,
    limit: usize,
}

impl Buffer {
    pub fn new(limit: usize) -> Buffer {
        Buffer {
            data: Vec::with_capacity(limit.min(64 * 1024)),
            head: 0,
            limit,
        }
    }

    /// The number of unconsumed bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.limit - self.len()
    }

    /// Appends incoming bytes, failing when the unconsumed region would
    /// exceed the configured limit.
    pub fn extend(&mut self, bytes: &[u8]) -> EpsResult<()> {
        if bytes.len() > self.free_capacity() {
            return Err(EpsError::Socket("receive buffer overrun".to_string()));
        }
        if self.data.len() + bytes.len() > self.limit {
            self.compact();
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Unconsumed bytes.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Marks `count` bytes consumed.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        self.head += count;
        debug_assert!(self.head <= self.data.len());
        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        }
    }

    /// Moves the unconsumed tail to the front of the storage.
    pub fn compact(&mut self) {
        if self.head > 0 {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_consume() {
        let mut buffer = Buffer::new(16);
        buffer.extend(b"abcdef").unwrap();
        assert_eq!(buffer.read_slice(), b"abcdef");
        assert_eq!(buffer.len(), 6);

        buffer.consume(2);
        assert_eq!(buffer.read_slice(), b"cdef");
        assert_eq!(buffer.len(), 4);

        buffer.consume(4);
        assert!(buffer.is_empty());
        assert_eq!(buffer.read_slice(), b"");
    }

    #[test]
    fn test_compact_moves_tail_to_front() {
        let mut buffer = Buffer::new(8);
        buffer.extend(b"abcdef").unwrap();
        buffer.consume(4);
        buffer.compact();
        assert_eq!(buffer.read_slice(), b"ef");

        // After compaction the freed room is usable again.
        buffer.extend(b"ghijkl").unwrap();
        assert_eq!(buffer.read_slice(), b"efghijkl");
    }

    #[test]
    fn test_overrun_rejected() {
        let mut buffer = Buffer::new(4);
        buffer.extend(b"abcd").unwrap();
        let err = buffer.extend(b"e").unwrap_err();
        assert_eq!(err, EpsError::Socket("receive buffer overrun".to_string()));

        // Consuming frees capacity.
        buffer.consume(2);
        buffer.extend(b"ef").unwrap();
        assert_eq!(buffer.read_slice(), b"cdef");
    }

    #[test]
    fn test_clear() {
        let mut buffer = Buffer::new(8);
        buffer.extend(b"abc").unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.extend(b"12345678").unwrap();
        assert_eq!(buffer.read_slice(), b"12345678");
    }
}
