//! Network identifiers: server IDs (SID) and user IDs (UID).
//!
//! A UUID on the wire is `SID + UID`, e.g. `042AAAAAB`.

use parking_lot::Mutex;

/// Length of a UID (the part after the SID).
pub const UID_LEN: usize = 6;

const FIRST_UID: [u8; UID_LEN] = [b'A'; UID_LEN];

/// Hands out UIDs `AAAAAA`, `AAAAAB`, ..., `ZZZZZZ`, then starts over.
///
/// Each server owns one. The lock makes the read-increment-store step
/// atomic, so two registrations can never be given the same value.
#[derive(Debug, Default)]
pub struct UidGenerator {
    last: Mutex<Option<[u8; UID_LEN]>>,
}

impl UidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next UID.
    pub fn next(&self) -> String {
        let mut last = self.last.lock();
        let uid = match *last {
            None => FIRST_UID,
            Some(prev) => increment(prev),
        };
        *last = Some(uid);
        let uid: String = uid.iter().map(|&b| char::from(b)).collect();
        tracing::trace!(%uid, "uid generated");
        uid
    }
}

/// Base-26 increment over `A`..=`Z`: bump the rightmost non-`Z` position
/// and reset everything to its right. `ZZZZZZ` wraps to `AAAAAA`.
fn increment(mut uid: [u8; UID_LEN]) -> [u8; UID_LEN] {
    for i in (0..UID_LEN).rev() {
        if uid[i] < b'Z' {
            uid[i] += 1;
            for slot in &mut uid[i + 1..] {
                *slot = b'A';
            }
            return uid;
        }
    }
    FIRST_UID
}

/// Derives a three-digit SID from a server's name and description.
///
/// Each character is folded in as `sid = sid * 5 + code` (wrapping), then
/// the total is reduced modulo 999 and zero-padded.
pub fn generate_sid(name: &str, description: &str) -> String {
    let sid = name
        .chars()
        .chain(description.chars())
        .fold(0u32, |acc, c| acc.wrapping_mul(5).wrapping_add(c as u32));
    format!("{:03}", sid % 999)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // UidGenerator
    // =====================================================================

    #[test]
    fn test_next_first_uid_is_all_a() {
        let uids = UidGenerator::new();
        assert_eq!(uids.next(), "AAAAAA");
        assert_eq!(uids.next(), "AAAAAB");
    }

    #[test]
    fn test_next_sequence_is_strictly_increasing() {
        let uids = UidGenerator::new();
        let issued: Vec<String> = (0..100).map(|_| uids.next()).collect();
        for pair in issued.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_increment_carries_into_next_column() {
        assert_eq!(&increment(*b"AAAAAZ"), b"AAAABA");
        assert_eq!(&increment(*b"AAAZZZ"), b"AABAAA");
    }

    #[test]
    fn test_increment_wraps_after_exhaustion() {
        assert_eq!(&increment(*b"ZZZZZZ"), b"AAAAAA");
    }

    #[test]
    fn test_next_concurrent_callers_get_distinct_values() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let uids = Arc::new(UidGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let uids = Arc::clone(&uids);
                std::thread::spawn(move || (0..250).map(|_| uids.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for uid in handle.join().unwrap() {
                assert!(seen.insert(uid));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    // =====================================================================
    // generate_sid()
    // =====================================================================

    #[test]
    fn test_generate_sid_is_deterministic() {
        let a = generate_sid("irc.example", "test server");
        let b = generate_sid("irc.example", "test server");
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_sid_short_input_is_zero_padded() {
        // 'A' = 65; 65 % 999 = 65.
        assert_eq!(generate_sid("A", ""), "065");
        // 5 * 65 + 66 = 391.
        assert_eq!(generate_sid("A", "B"), "391");
    }

    #[test]
    fn test_generate_sid_differs_by_description() {
        assert_ne!(generate_sid("irc.example", "a"), generate_sid("irc.example", "b"));
    }
}
