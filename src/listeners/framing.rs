//! # Newline framing of a byte stream.
//!
//! [`Framer`] accumulates bytes received across any number of reads and cuts them
//! into messages on [`SEPARATOR`]. Empty segments (a bare separator is a liveness
//! ping) are never produced, and the trailing partial message stays buffered until
//! its separator arrives.
//!
//! ```text
//! push(b"a\nb")   → ["a"]        pending: "b"
//! push(b"c\n\n")  → ["bc"]       pending: ""
//! push(b"\n")     → []           (ping)
//! ```
//!
//! A message longer than `max_pending` is dropped whole. When the cap is hit
//! before its separator arrived, the framer skips everything up to and including
//! that separator, so no tail of the dropped message is ever produced.

/// Message separator.
pub const SEPARATOR: u8 = b'\n';

/// Largest partial message kept while waiting for its separator.
pub const MAX_PENDING: usize = 64 * 1024;

/// Result of feeding one chunk to a [`Framer`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Frames {
    /// Complete, non-empty messages in arrival order.
    pub items: Vec<Vec<u8>>,
    /// Bytes of oversized messages discarded by this push.
    ///
    /// The tail of a message already dropped by an earlier push is skipped
    /// silently and not counted again.
    pub dropped: usize,
}

/// Stateful newline splitter.
#[derive(Debug)]
pub struct Framer {
    pending: Vec<u8>,
    max_pending: usize,
    discarding: bool,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(MAX_PENDING)
    }
}

impl Framer {
    /// Creates a framer that keeps at most `max_pending` bytes of partial message.
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
            discarding: false,
        }
    }

    /// Appends `chunk` and returns every message it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Frames {
        let chunk = if self.discarding {
            match chunk.iter().position(|&b| b == SEPARATOR) {
                Some(pos) => {
                    self.discarding = false;
                    &chunk[pos + 1..]
                }
                None => return Frames::default(),
            }
        } else {
            chunk
        };
        self.pending.extend_from_slice(chunk);

        let mut frames = Frames::default();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == SEPARATOR) {
            let end = start + pos;
            match end - start {
                0 => {}
                n if n > self.max_pending => frames.dropped += n,
                _ => frames.items.push(self.pending[start..end].to_vec()),
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > self.max_pending {
            frames.dropped += self.pending.len();
            self.pending.clear();
            self.discarding = true;
        }
        frames
    }

    /// Bytes of the partial message currently buffered.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discards the partial message; returns how many bytes were thrown away.
    ///
    /// The next push starts a fresh message even if an oversized one was being
    /// skipped.
    pub fn reset(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        self.discarding = false;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(frames: &Frames) -> Vec<&str> {
        frames
            .items
            .iter()
            .map(|i| std::str::from_utf8(i).unwrap())
            .collect()
    }

    #[test]
    fn splits_and_keeps_partial() {
        let mut f = Framer::default();
        assert_eq!(strings(&f.push(b"a:f:1\nb:g:2\nc:h")), vec!["a:f:1", "b:g:2"]);
        assert_eq!(f.pending_len(), 3);
        assert_eq!(strings(&f.push(b":3\n")), vec!["c:h:3"]);
        assert_eq!(f.pending_len(), 0);
    }

    #[test]
    fn separators_alone_produce_nothing() {
        let mut f = Framer::default();
        assert!(f.push(b"\n").items.is_empty());
        assert!(f.push(b"\n\n\n").items.is_empty());
        assert_eq!(strings(&f.push(b"\n\nx\n\n\ny\n\n")), vec!["x", "y"]);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let stream: &[u8] = b"/a/b.php:foo:10\n\n/a/c.php:bar:20\n1234\n\n\nlast:one:3\n";
        let whole: Vec<Vec<u8>> = Framer::default().push(stream).items;
        assert_eq!(whole.len(), 4);

        for size in 1..stream.len() {
            let mut f = Framer::default();
            let mut got = Vec::new();
            for chunk in stream.chunks(size) {
                got.extend(f.push(chunk).items);
            }
            assert_eq!(got, whole, "chunk size {size}");
            assert_eq!(f.pending_len(), 0);
        }

        // Every two-way split as well.
        for cut in 0..=stream.len() {
            let mut f = Framer::default();
            let mut got = f.push(&stream[..cut]).items;
            got.extend(f.push(&stream[cut..]).items);
            assert_eq!(got, whole, "cut at {cut}");
        }
    }

    #[test]
    fn oversized_partial_is_dropped() {
        let mut f = Framer::new(4);
        let frames = f.push(b"ok\n123456");
        assert_eq!(strings(&frames), vec!["ok"]);
        assert_eq!(frames.dropped, 6);
        assert_eq!(f.pending_len(), 0);
        assert!(f.push(b"78").items.is_empty());
        assert_eq!(strings(&f.push(b"9\nx\n")), vec!["x"]);
    }

    #[test]
    fn tail_of_dropped_message_is_never_an_item() {
        let mut f = Framer::new(8);
        let frames = f.push(b"/a/b.php:foo");
        assert!(frames.items.is_empty());
        assert_eq!(frames.dropped, 12);

        let frames = f.push(b":1234567\n/a:f:1\n");
        assert_eq!(strings(&frames), vec!["/a:f:1"]);
        assert_eq!(frames.dropped, 0);
    }

    #[test]
    fn oversized_message_is_dropped_wherever_it_is_cut() {
        let stream: &[u8] = b"a:f:1\n/far/too/long.php:fn:99\nb:g:2\n";
        for cut in 0..=stream.len() {
            let mut f = Framer::new(8);
            let first = f.push(&stream[..cut]);
            let second = f.push(&stream[cut..]);
            let mut got = strings(&first);
            got.extend(strings(&second));
            assert_eq!(got, vec!["a:f:1", "b:g:2"], "cut at {cut}");
            assert!(first.dropped + second.dropped > 0, "cut at {cut}");
        }
    }

    #[test]
    fn reset_ends_skipping() {
        let mut f = Framer::new(4);
        assert_eq!(f.push(b"123456").dropped, 6);
        f.reset();
        assert_eq!(strings(&f.push(b"ok\n")), vec!["ok"]);
    }

    #[test]
    fn reset_discards_partial() {
        let mut f = Framer::default();
        f.push(b"half");
        assert_eq!(f.reset(), 4);
        assert_eq!(strings(&f.push(b"whole\n")), vec!["whole"]);
    }
}
