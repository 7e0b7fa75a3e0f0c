//! In-place partitioning used by both index builders

/// Reorder `items` so every element satisfying `goes_left` precedes every
/// element that does not; returns the size of the left group
///
/// Two cursors close in from both ends, so each element is inspected once.
/// Relative order within a group is not preserved.
pub fn partition_in_place<T>(items: &mut [T], mut goes_left: impl FnMut(&T) -> bool) -> usize {
    let mut lo = 0;
    let mut hi = items.len();
    while lo < hi {
        if goes_left(&items[lo]) {
            lo += 1;
        } else {
            hi -= 1;
            items.swap(lo, hi);
        }
    }
    lo
}
