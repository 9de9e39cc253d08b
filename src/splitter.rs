//! Size-aware batch splitter (C1).
//!
//! Pure function, no I/O: partitions a list of events into sub-lists each
//! satisfying `(count <= max_records, bytes <= max_bytes)`.

use crate::types::Event;

/// Partition `events` into sub-batches honoring `max_records` and
/// `max_bytes`.
///
/// Contract: the sublists, concatenated in order, equal the input. Each
/// sublist satisfies `len(sublist) <= max_records` and
/// `sum(size_of(e)) <= max_bytes`, except that a single event whose size
/// alone exceeds `max_bytes` is placed alone in its own sublist — callers
/// that cannot transmit oversized events must filter them out first.
///
/// Tie-break is greedy: append the next event to the current sublist if
/// both limits still hold, otherwise start a new sublist with it.
pub fn split<F>(events: Vec<Event>, size_of: F, max_records: usize, max_bytes: usize) -> Vec<Vec<Event>>
where
    F: Fn(&Event) -> usize,
{
    let mut out = Vec::new();
    let mut current: Vec<Event> = Vec::new();
    let mut current_bytes = 0usize;

    for event in events {
        let size = size_of(&event);

        let fits_count = current.len() + 1 <= max_records;
        let fits_bytes = current_bytes + size <= max_bytes;

        if !current.is_empty() && (!fits_count || !fits_bytes) {
            out.push(std::mem::take(&mut current));
            current_bytes = 0;
        }

        current.push(event);
        current_bytes += size;
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}
