//! Outgoing edit buffering and poll pacing.
//!
//! Both the fetch and the flush loop are self-paced: each schedules its next
//! attempt only after the current one resolves, so slow networks never build
//! up a queue of overlapping requests. After thirty seconds without user
//! input both loops degrade to a slow interval; the next input restores full
//! rate starting with the following cycle.

use std::time::{Duration, Instant};

use mural_proto::Edit;
use time::OffsetDateTime;

/// Fetch pacing while the user is active.
pub const FETCH_INTERVAL: Duration = Duration::from_millis(997);
/// Edit-flush pacing while the user is active.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(1997);
/// Mandatory-window recomputation cadence.
pub const RENDER_INTERVAL: Duration = Duration::from_millis(197);
/// Input silence after which polling is considered idle.
pub const IDLE_AFTER: Duration = Duration::from_millis(30_000);
/// Shared fetch/flush pacing while idle.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(9_973);

/// Wall-clock milliseconds since the Unix epoch, the timestamp unit of the
/// edit wire contract.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Client-local identifier assigned to every recorded edit. The wire only
/// carries the six-field ack shape, but ids keep queue entries and pending
/// entries correlated and make acknowledgement matching unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditId(u64);

/// A queued edit together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEdit {
    pub id: EditId,
    pub edit: Edit,
}

/// Ordered buffer of local edits awaiting the next flush. Entries are
/// created on keystroke and cleared on flush, independent of
/// acknowledgement.
#[derive(Debug, Default)]
pub struct EditQueue {
    entries: Vec<QueuedEdit>,
    next_id: u64,
}

impl EditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edit, assigning it a fresh id.
    pub fn record(&mut self, edit: Edit) -> EditId {
        let id = EditId(self.next_id);
        self.next_id += 1;
        self.entries.push(QueuedEdit { id, edit });
        id
    }

    /// Drain the whole queue as one batch. The queue is empty afterwards
    /// whether or not the batch ultimately lands; a failed send is not
    /// re-queued, the periodic fetch corrects any cell whose edit was lost.
    pub fn take_batch(&mut self) -> Vec<QueuedEdit> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Tracks the last observed input event and derives poll delays from it.
#[derive(Debug, Clone, Copy)]
pub struct SyncPacer {
    last_input: Instant,
}

impl SyncPacer {
    pub fn new(now: Instant) -> Self {
        Self { last_input: now }
    }

    /// Record an input event, restoring full polling rate.
    pub fn touch(&mut self, now: Instant) {
        self.last_input = now;
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_input) > IDLE_AFTER
    }

    pub fn fetch_delay(&self, now: Instant) -> Duration {
        if self.is_idle(now) {
            IDLE_INTERVAL
        } else {
            FETCH_INTERVAL
        }
    }

    pub fn flush_delay(&self, now: Instant) -> Duration {
        if self.is_idle(now) {
            IDLE_INTERVAL
        } else {
            FLUSH_INTERVAL
        }
    }
}
