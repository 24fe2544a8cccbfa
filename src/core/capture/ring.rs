//! Round-robin capture ring

/// Independent read positions into a [`CaptureRing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureReader {
    /// Bytes not yet appended to the log file
    File,
    /// Text not yet forwarded to the publish channel
    Publish,
}

/// Fixed-size ring of captured bytes.
///
/// Writers never wait: once the ring is full the oldest bytes are
/// overwritten, and each reader's pending count is clamped to the capacity.
/// Anything a reader had not consumed by then is lost, which is why the idle
/// loop stops receiving while published text is still outstanding.
#[derive(Debug)]
pub struct CaptureRing {
    buf: Box<[u8]>,
    head: usize,
    file_pending: usize,
    publish_pending: usize,
    written: u64,
    overwritten: u64,
    locks: u64,
}

impl CaptureRing {
    /// Create a ring holding at most `capacity` bytes (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            head: 0,
            file_pending: 0,
            publish_pending: 0,
            written: 0,
            overwritten: 0,
            locks: 0,
        }
    }

    /// Ring capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Append bytes, tracking them for the file reader and/or the publish reader.
    ///
    /// A reader's window always ends at the write head, so a reader that does
    /// not take these bytes loses whatever it still had pending.
    pub fn put(&mut self, bytes: &[u8], to_file: bool, to_publish: bool) {
        if bytes.is_empty() {
            return;
        }
        if !to_file {
            self.drop_pending(CaptureReader::File);
        }
        if !to_publish {
            self.drop_pending(CaptureReader::Publish);
        }

        let cap = self.buf.len();
        for &b in bytes {
            self.buf[self.head] = b;
            self.head = (self.head + 1) % cap;
            self.written += 1;

            if to_file {
                if self.file_pending == cap {
                    self.overwritten += 1;
                } else {
                    self.file_pending += 1;
                }
            }
            if to_publish {
                if self.publish_pending == cap {
                    self.overwritten += 1;
                } else {
                    self.publish_pending += 1;
                }
            }
        }
    }

    /// Bytes waiting for `reader`
    pub fn pending(&self, reader: CaptureReader) -> usize {
        match reader {
            CaptureReader::File => self.file_pending,
            CaptureReader::Publish => self.publish_pending,
        }
    }

    /// Pending bytes for `reader`, oldest first, as at most two slices
    pub fn peek(&self, reader: CaptureReader) -> (&[u8], &[u8]) {
        let cap = self.buf.len();
        let pending = self.pending(reader);
        let start = (self.head + cap - pending) % cap;

        if start + pending <= cap {
            (&self.buf[start..start + pending], &[])
        } else {
            let first = cap - start;
            (&self.buf[start..], &self.buf[..pending - first])
        }
    }

    /// Mark `n` of `reader`'s oldest pending bytes as consumed
    pub fn consume(&mut self, reader: CaptureReader, n: usize) {
        let pending = match reader {
            CaptureReader::File => &mut self.file_pending,
            CaptureReader::Publish => &mut self.publish_pending,
        };
        *pending = pending.saturating_sub(n);
    }

    fn drop_pending(&mut self, reader: CaptureReader) {
        let pending = match reader {
            CaptureReader::File => &mut self.file_pending,
            CaptureReader::Publish => &mut self.publish_pending,
        };
        self.overwritten += *pending as u64;
        *pending = 0;
    }

    /// Drop everything pending for both readers
    pub fn clear(&mut self) {
        self.file_pending = 0;
        self.publish_pending = 0;
    }

    /// Total bytes ever written
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bytes lost to overwrite before a reader consumed them
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// How many times the ring has been locked by a dispatch cycle
    pub fn lock_count(&self) -> u64 {
        self.locks
    }

    pub(super) fn note_locked(&mut self) {
        self.locks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_peek_contiguous() {
        let mut ring = CaptureRing::new(8);
        ring.put(b"abc", true, false);

        assert_eq!(ring.pending(CaptureReader::File), 3);
        assert_eq!(ring.pending(CaptureReader::Publish), 0);
        assert_eq!(ring.peek(CaptureReader::File), (&b"abc"[..], &b""[..]));
    }

    #[test]
    fn test_peek_wraps() {
        let mut ring = CaptureRing::new(4);
        ring.put(b"xyz", true, false);
        ring.consume(CaptureReader::File, 3);
        ring.put(b"123", true, false);

        let (a, b) = ring.peek(CaptureReader::File);
        assert_eq!(a, b"1");
        assert_eq!(b, b"23");
    }

    #[test]
    fn test_overwrite_clamps_pending() {
        let mut ring = CaptureRing::new(4);
        ring.put(b"abcdef", false, true);

        assert_eq!(ring.pending(CaptureReader::Publish), 4);
        assert_eq!(ring.overwritten(), 2);
        let (a, b) = ring.peek(CaptureReader::Publish);
        let mut joined = a.to_vec();
        joined.extend_from_slice(b);
        assert_eq!(joined, b"cdef");
    }

    #[test]
    fn test_readers_are_independent() {
        let mut ring = CaptureRing::new(16);
        ring.put(b"hello", true, true);
        ring.consume(CaptureReader::File, 5);

        assert_eq!(ring.pending(CaptureReader::File), 0);
        assert_eq!(ring.pending(CaptureReader::Publish), 5);
    }

    #[test]
    fn test_untracked_write_drops_stale_window() {
        let mut ring = CaptureRing::new(16);
        ring.put(b"old", true, true);
        ring.consume(CaptureReader::File, 3);
        ring.put(b"new", true, false);

        assert_eq!(ring.pending(CaptureReader::Publish), 0);
        assert_eq!(ring.overwritten(), 3);
        assert_eq!(ring.peek(CaptureReader::File), (&b"new"[..], &b""[..]));

        ring.put(b"!", true, true);
        assert_eq!(ring.peek(CaptureReader::Publish), (&b"!"[..], &b""[..]));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let ring = CaptureRing::new(0);
        assert_eq!(ring.capacity(), 1);
    }
}
