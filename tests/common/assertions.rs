//! Domain-specific assertion macros for relay harnesses.
//!
//! These wrap `pretty_assertions` and add failure messages that say which
//! delivery or cursor expectation was violated.

// ---------------------------------------------------------------------------
// Delivery assertions
// ---------------------------------------------------------------------------

/// Assert that a cycle delivered `count` items and advanced the cursor to `cursor`.
///
/// ```rust
/// assert_delivered!(outcome, 3, "103");
/// ```
#[macro_export]
macro_rules! assert_delivered {
    ($outcome:expr, $count:expr, $cursor:expr) => {{
        match &$outcome {
            relay::notify::CycleOutcome::Delivered {
                count,
                cursor,
                persisted,
            } => {
                pretty_assertions::assert_eq!(*count, $count, "delivered item count");
                pretty_assertions::assert_eq!(cursor.as_str(), $cursor, "advanced cursor");
                assert!(*persisted, "cursor was delivered but not persisted");
            }
            other => panic!(
                "assert_delivered! failed: expected Delivered {{ count: {}, cursor: {:?} }}, got {:?}",
                $count, $cursor, other
            ),
        }
    }};
}

/// Assert that the OneBot message text lists blocks in the given order.
///
/// ```rust
/// assert_blocks_in_order!(text, ["103", "102", "101"]);
/// ```
#[macro_export]
macro_rules! assert_blocks_in_order {
    ($text:expr, [$($needle:expr),+ $(,)?]) => {{
        let text: &str = &$text;
        let mut from = 0usize;
        $(
            match text[from..].find($needle) {
                Some(at) => from += at + $needle.len(),
                None => panic!(
                    "assert_blocks_in_order! failed: {:?} not found after byte {}\n  text:\n{}",
                    $needle, from, text
                ),
            }
        )+
    }};
}

// ---------------------------------------------------------------------------
// Cursor assertions
// ---------------------------------------------------------------------------

/// Assert the cursor file at `path` holds `expected`.
#[macro_export]
macro_rules! assert_cursor {
    ($path:expr, $expected:expr) => {{
        let actual = $crate::common::stored_cursor($path);
        pretty_assertions::assert_eq!(actual, $expected, "stored cursor in {}", $path.display());
    }};
}
