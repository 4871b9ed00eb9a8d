// src/stakers/capacity.rs

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Maximum total weight a validator will ever carry over the half-open
/// window `[window_start, window_end)`, given its already-active
/// delegators and the queued ones.
///
/// `current_stake` seeds the walk: validator self-weight plus the weight
/// of every delegator in `current_delegators`. `pending_delegators` must
/// be sorted by start time. Entries are `(end, weight)` for current and
/// `(start, end, weight)` for pending.
///
/// A delegation overlaps the window iff its `end > window_start`
/// (intervals are half-open). The maximum always lands on a start or end
/// boundary, so it suffices to sample the running stake at those points.
/// Removal ordering uses a real binary-heap pop keyed by end time; the
/// whole walk is O((n_current + n_pending) log n).
///
/// Returns `None` if the arithmetic overflows (callers treat that as
/// over-delegated; the sums involved are bounded by total token supply in
/// any honest state).
pub fn max_weight_over_window(
    current_stake: u64,
    current_delegators: &[(u64, u64)],
    pending_delegators: &[(u64, u64, u64)],
    window_start: u64,
    window_end: u64,
) -> Option<u64> {
    // min-heap of active delegations keyed by end time
    let mut to_remove: BinaryHeap<Reverse<(u64, u64)>> = BinaryHeap::with_capacity(
        current_delegators.len() + pending_delegators.len(),
    );
    for &(end, weight) in current_delegators {
        to_remove.push(Reverse((end, weight)));
    }

    let mut stake = current_stake;
    let mut max_seen: u64 = 0;

    for &(start, end, weight) in pending_delegators {
        if start > window_end {
            break;
        }

        // Retire every delegation that ends before this one begins. The
        // stake level just before a retirement is a candidate maximum, but
        // only if the retiring delegation overlapped the window.
        while let Some(&Reverse((retire_end, retire_weight))) = to_remove.peek() {
            if retire_end > start {
                break;
            }
            if retire_end > window_start {
                max_seen = max_seen.max(stake);
            }
            stake = stake.checked_sub(retire_weight)?;
            to_remove.pop();
        }

        stake = stake.checked_add(weight)?;
        if start >= window_start {
            max_seen = max_seen.max(stake);
        }
        to_remove.push(Reverse((end, weight)));
    }

    // Price in the retirements that happen before the window opens; what
    // remains is the stake level at window_start.
    while let Some(&Reverse((retire_end, retire_weight))) = to_remove.peek() {
        if retire_end > window_start {
            break;
        }
        stake = stake.checked_sub(retire_weight)?;
        to_remove.pop();
    }

    Some(max_seen.max(stake))
}
