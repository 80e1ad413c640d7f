//! Heap tracing
//!
//! A global allocator wrapper around `System` counts bytes allocated and
//! freed while tracing is active. `MemoryTracker` is the only way to turn
//! tracing on: it is acquired before a run, read in between, and releases
//! tracing when stopped or dropped.
//!
//! Every block carries a one-word header holding the tracing epoch it was
//! allocated in (0 when tracing was off). Frees only count against the
//! running total when the block belongs to the live epoch, so releasing
//! memory allocated before `start` leaves traced bytes untouched.

use crate::models::MemorySnapshot;
use crate::{DemoBenchError, Result};
use std::alloc::{GlobalAlloc, Layout, System};
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Size of the epoch header in front of every block
const TAG_SIZE: usize = size_of::<u64>();

/// Epoch value for blocks allocated while tracing is off
const UNTRACED: u64 = 0;

/// Global memory tracking allocator
pub struct TrackingAllocator {
    /// Live tracing epoch, `UNTRACED` when off
    epoch: AtomicU64,
    last_epoch: AtomicU64,
    current: AtomicU64,
    peak: AtomicU64,
}

impl TrackingAllocator {
    const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(UNTRACED),
            last_epoch: AtomicU64::new(UNTRACED),
            current: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        }
    }

    /// Zero the counters and open a new epoch
    fn activate(&self) {
        self.current.store(0, Ordering::SeqCst);
        self.peak.store(0, Ordering::SeqCst);
        let epoch = self.last_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        self.epoch.store(UNTRACED, Ordering::SeqCst);
    }

    /// Count a new block and return the epoch to stamp it with
    fn record_alloc(&self, size: usize) -> u64 {
        let epoch = self.epoch.load(Ordering::SeqCst);
        if epoch == UNTRACED {
            return UNTRACED;
        }
        let size = size as u64;
        let current = self.current.fetch_add(size, Ordering::SeqCst) + size;
        self.peak.fetch_max(current, Ordering::SeqCst);
        epoch
    }

    fn record_dealloc(&self, tag: u64, size: usize) {
        if tag == UNTRACED || tag != self.epoch.load(Ordering::SeqCst) {
            return;
        }
        let size = size as u64;
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(c.saturating_sub(size))
            });
    }

    fn snapshot(&self) -> MemorySnapshot {
        let current = self.current.load(Ordering::SeqCst);
        let peak = self.peak.load(Ordering::SeqCst);
        MemorySnapshot::new(current, peak)
    }
}

/// Layout of the underlying block and the offset of the user pointer in it
///
/// The offset is a multiple of the requested alignment and at least one
/// header wide, so the header sits directly in front of the user pointer
/// and is itself aligned.
fn outer_layout(layout: Layout) -> Option<(Layout, usize)> {
    let offset = layout.align().max(TAG_SIZE);
    let size = layout.size().checked_add(offset)?;
    let outer = Layout::from_size_align(size, offset).ok()?;
    Some((outer, offset))
}

unsafe fn write_tag(ptr: *mut u8, tag: u64) {
    (ptr.sub(TAG_SIZE) as *mut u64).write(tag);
}

unsafe fn read_tag(ptr: *mut u8) -> u64 {
    (ptr.sub(TAG_SIZE) as *const u64).read()
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let Some((outer, offset)) = outer_layout(layout) else {
            return ptr::null_mut();
        };
        let base = System.alloc(outer);
        if base.is_null() {
            return base;
        }
        let ptr = base.add(offset);
        write_tag(ptr, self.record_alloc(layout.size()));
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let Some((outer, offset)) = outer_layout(layout) else {
            return ptr::null_mut();
        };
        let base = System.alloc_zeroed(outer);
        if base.is_null() {
            return base;
        }
        let ptr = base.add(offset);
        write_tag(ptr, self.record_alloc(layout.size()));
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // The layout was accepted by `alloc`, so this cannot fail.
        let Some((outer, offset)) = outer_layout(layout) else {
            return;
        };
        self.record_dealloc(read_tag(ptr), layout.size());
        System.dealloc(ptr.sub(offset), outer);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some((outer, offset)) = outer_layout(layout) else {
            return ptr::null_mut();
        };
        let Some(new_outer_size) = new_size.checked_add(offset) else {
            return ptr::null_mut();
        };
        let tag = read_tag(ptr);

        let base = System.realloc(ptr.sub(offset), outer, new_outer_size);
        if base.is_null() {
            return base;
        }
        let new_ptr = base.add(offset);
        self.record_dealloc(tag, layout.size());
        write_tag(new_ptr, self.record_alloc(new_size));
        new_ptr
    }
}

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

static TRACKER_LOCK: Mutex<()> = Mutex::new(());

/// Scoped ownership of heap tracing
///
/// At most one tracker exists at a time. Counters start from zero when the
/// tracker is acquired.
#[derive(Debug)]
pub struct MemoryTracker {
    _guard: MutexGuard<'static, ()>,
}

impl MemoryTracker {
    /// Acquire the tracker, waiting for any current holder to release it
    pub fn start() -> Self {
        let guard = TRACKER_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::activate(guard)
    }

    /// Acquire the tracker if no one else holds it
    pub fn try_start() -> Result<Self> {
        match TRACKER_LOCK.try_lock() {
            Ok(guard) => Ok(Self::activate(guard)),
            Err(TryLockError::Poisoned(poisoned)) => Ok(Self::activate(poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => Err(DemoBenchError::TrackerError(
                "memory tracking is already active".to_string(),
            )),
        }
    }

    fn activate(guard: MutexGuard<'static, ()>) -> Self {
        ALLOCATOR.activate();
        Self { _guard: guard }
    }

    /// Current and peak traced bytes since `start`
    pub fn snapshot(&self) -> MemorySnapshot {
        ALLOCATOR.snapshot()
    }

    /// Stop tracing and return the final snapshot
    pub fn stop(self) -> MemorySnapshot {
        self.snapshot()
    }
}

impl Drop for MemoryTracker {
    fn drop(&mut self) {
        ALLOCATOR.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hint::black_box;

    #[test]
    fn test_snapshot_tracks_live_allocation() {
        let tracker = MemoryTracker::start();
        let buffer: Vec<u8> = black_box(vec![1u8; 1 << 20]);
        let during = tracker.snapshot();
        drop(buffer);
        let after = tracker.stop();

        assert!(during.peak >= 1 << 20);
        assert!(during.peak >= during.current);
        assert!(after.peak >= 1 << 20);
        assert!(after.peak >= after.current);
    }

    #[test]
    fn test_counters_reset_on_start() {
        {
            let tracker = MemoryTracker::start();
            drop(black_box(vec![0u8; 4 << 20]));
            assert!(tracker.snapshot().peak >= 4 << 20);
        }
        let tracker = MemoryTracker::start();
        let snapshot = tracker.snapshot();
        assert!(snapshot.peak < 4 << 20);
        assert!(snapshot.peak >= snapshot.current);
    }

    #[test]
    fn test_free_of_untraced_block_keeps_traced_bytes() {
        let untraced: Vec<u8> = black_box(vec![1u8; 1 << 20]);
        let tracker = MemoryTracker::start();
        let traced: Vec<u8> = black_box(vec![2u8; 1 << 20]);

        drop(untraced);
        let snapshot = tracker.snapshot();

        assert!(snapshot.current >= 1 << 20);
        assert!(snapshot.peak >= 1 << 20);
        drop(traced);
    }

    #[test]
    fn test_free_of_traced_block_is_counted() {
        let tracker = MemoryTracker::start();
        let traced: Vec<u8> = black_box(vec![3u8; 8 << 20]);
        let during = tracker.snapshot();
        drop(traced);
        let after = tracker.snapshot();

        assert!(during.current >= 8 << 20);
        assert!(after.current < during.current);
        assert!(after.peak >= 8 << 20);
    }

    #[test]
    fn test_realloc_preserves_contents_and_alignment() {
        #[repr(align(64))]
        #[derive(Clone, Copy)]
        struct Wide(u8);

        let tracker = MemoryTracker::start();
        let mut items: Vec<Wide> = Vec::with_capacity(1);
        for i in 0..1000u32 {
            items.push(Wide(i as u8));
        }
        assert_eq!(items.as_ptr() as usize % 64, 0);
        assert!(items.iter().enumerate().all(|(i, w)| w.0 == i as u8));
        assert!(tracker.snapshot().peak >= 64 * 1000);
    }

    #[test]
    fn test_try_start_while_held() {
        let tracker = MemoryTracker::start();
        assert!(matches!(
            MemoryTracker::try_start(),
            Err(DemoBenchError::TrackerError(_))
        ));
        drop(tracker);
    }
}
