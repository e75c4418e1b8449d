use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::Ms;

/// Process-wide counter so two references minted in the same millisecond
/// still differ.
static REFERENCE_SEQ: AtomicU64 = AtomicU64::new(0);

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

/// Short, human-readable booking reference: `BK-<base36 millis>-<seq>`.
/// Timestamp-derived so references sort roughly by creation time. The suffix
/// is the raw monotonic counter, never wrapped, so no two references minted
/// by this process collide regardless of how many land in one millisecond.
pub fn booking_reference(now: Ms) -> String {
    let seq = REFERENCE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("BK-{}-{:0>2}", base36(now.max(0) as u64), base36(seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn base36_digits() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "Z");
        assert_eq!(base36(36), "10");
    }

    #[test]
    fn references_are_unique_and_prefixed() {
        let now = 1_767_225_600_000;
        // Well past two base36 digits (1296) of same-millisecond mints
        let n = 3000;
        let refs: HashSet<String> = (0..n).map(|_| booking_reference(now)).collect();
        assert_eq!(refs.len(), n);
        assert!(refs.iter().all(|r| r.starts_with("BK-")));
    }

    #[test]
    fn reference_has_timestamp_and_sequence_parts() {
        let r = booking_reference(4_102_444_800_000);
        let parts: Vec<_> = r.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "BK");
        assert!(!parts[1].is_empty() && !parts[2].is_empty());
    }
}
