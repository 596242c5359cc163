//! Event log cursor.
//!
//! The cursor is the highest `sequence` the client has consumed. It is sent
//! back on every poll so the server only returns strictly newer events.

use palaver_shared::constants::INITIAL_CURSOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    last_sequence: u64,
}

impl SyncCursor {
    pub fn new() -> Self {
        Self {
            last_sequence: INITIAL_CURSOR,
        }
    }

    /// The value to send as `since` on the next poll.
    pub fn position(&self) -> u64 {
        self.last_sequence
    }

    /// Record an observed sequence number. The cursor never moves backwards;
    /// returns `true` if it advanced.
    pub fn observe(&mut self, sequence: u64) -> bool {
        if sequence > self.last_sequence {
            self.last_sequence = sequence;
            true
        } else {
            false
        }
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(SyncCursor::new().position(), 0);
    }

    #[test]
    fn test_tracks_maximum() {
        let mut cursor = SyncCursor::new();
        assert!(cursor.observe(4));
        assert!(cursor.observe(9));
        assert_eq!(cursor.position(), 9);
    }

    #[test]
    fn test_never_moves_backwards() {
        let mut cursor = SyncCursor::new();
        cursor.observe(12);
        assert!(!cursor.observe(3));
        assert!(!cursor.observe(12));
        assert_eq!(cursor.position(), 12);
    }
}
