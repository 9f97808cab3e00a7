//! Two-phase mmap tracker.
//!
//! Entry: capture `length` and `prot`, arm a return watcher on the calling
//! frame. Return: read the mapped base, match configured absolute targets,
//! install on the first hit. Each tracker is consumed exactly once.

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::arch;
use crate::error::Result;
use crate::host::{BreakpointId, DebugHost, FrameId, Stop};
use crate::installer::{BreakpointInstaller, Origin};
use crate::matcher::match_absolute;
use crate::output::MatchReport;
use crate::region::{MAP_FAILED, PROT_EXEC, Region};

/// State of one in-flight mmap call, between entry and return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmapTracker {
    /// Activation the watcher is bound to.
    frame: FrameId,
    /// Return watcher armed for `frame`.
    watcher: BreakpointId,
    length: u64,
    prot: u64,
}

impl MmapTracker {
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn watcher(&self) -> BreakpointId {
        self.watcher
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn prot(&self) -> u64 {
        self.prot
    }
}

/// What happened when a tracked call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapOutcome {
    /// A target was inside the region; a breakpoint was placed on it.
    Matched(MatchReport),
    /// No target inside the region.
    Unmatched,
    /// The call failed (`MAP_FAILED` or an impossible range).
    Failed,
}

/// Entry handler: decode arguments and arm the return watcher.
///
/// Returns `None` when the call is not worth following.
pub fn on_entry<H: DebugHost + ?Sized>(
    host: &mut H,
    stop: &Stop,
    requires_exec: bool,
) -> Result<Option<MmapTracker>> {
    let abi = arch::current_abi(&*host)?;
    // the address hint is up to the kernel, only length and prot matter
    let [_hint, length, prot] = abi.read_args(&*host, stop.frame)?;
    log::debug!(
        "mmap: entry frame={:?} length={:#x} prot={:#x}",
        stop.frame,
        length,
        prot
    );

    if requires_exec && prot & PROT_EXEC == 0 {
        log::trace!("mmap: prot {:#x} not executable, skipping", prot);
        return Ok(None);
    }

    let watcher = host.break_on_return(stop.frame)?;
    Ok(Some(MmapTracker {
        frame: stop.frame,
        watcher,
        length,
        prot,
    }))
}

/// Return handler: evaluate the produced region and consume the tracker.
///
/// The return watcher is retired on every path, including host errors, so a
/// consumed tracker never leaves a watcher armed behind it.
pub fn on_return<H: DebugHost + ?Sized>(
    host: &mut H,
    tracker: MmapTracker,
    targets: &[u64],
    installer: &mut BreakpointInstaller,
) -> Result<MmapOutcome> {
    let outcome = evaluate(host, &tracker, targets, installer);
    let retired = installer.retire(host, tracker.watcher);
    let outcome = outcome?;
    retired?;
    Ok(outcome)
}

fn evaluate<H: DebugHost + ?Sized>(
    host: &mut H,
    tracker: &MmapTracker,
    targets: &[u64],
    installer: &mut BreakpointInstaller,
) -> Result<MmapOutcome> {
    let abi = arch::current_abi(&*host)?;
    let base = abi.read_ret(&*host, tracker.frame)?;

    if base == MAP_FAILED {
        log::warn!("mmap: call in frame {:?} returned MAP_FAILED", tracker.frame);
        return Ok(MmapOutcome::Failed);
    }
    let region = match Region::new(base, tracker.length, tracker.prot) {
        Ok(region) => region,
        Err(e) => {
            log::warn!("mmap: discarding call in frame {:?}: {}", tracker.frame, e);
            return Ok(MmapOutcome::Failed);
        }
    };

    match match_absolute(&region, targets) {
        Some(target) => {
            installer.install(host, target, Origin::Mmap)?;
            let report = MatchReport::new(target, &region);
            report.emit(host);
            Ok(MmapOutcome::Matched(report))
        }
        None => {
            log::trace!(
                "mmap: region {:#x} - {:#x} holds no target",
                region.base(),
                region.end()
            );
            Ok(MmapOutcome::Unmatched)
        }
    }
}

/// In-flight mmap trackers, keyed by their return watcher.
#[derive(Debug, Default)]
pub struct InFlightTable {
    trackers: HashMap<BreakpointId, MmapTracker>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self {
            trackers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, tracker: MmapTracker) {
        if let Some(stale) = self.trackers.insert(tracker.watcher, tracker) {
            log::warn!(
                "mmap: watcher {} reused, dropping tracker for frame {:?}",
                stale.watcher,
                stale.frame
            );
        }
    }

    /// Take the tracker armed as `stop.breakpoint`, provided the stop happened
    /// in the frame it is bound to.
    pub fn take(&mut self, stop: &Stop) -> Option<MmapTracker> {
        let bound = self.trackers.get(&stop.breakpoint)?.frame;
        if bound != stop.frame {
            log::warn!(
                "mmap: watcher {} hit in frame {:?}, bound to {:?}",
                stop.breakpoint,
                stop.frame,
                bound
            );
            return None;
        }
        self.trackers.remove(&stop.breakpoint)
    }

    /// Drop a tracker without evaluating it.
    pub fn discard(&mut self, watcher: BreakpointId) -> Option<MmapTracker> {
        self.trackers.remove(&watcher)
    }

    /// Return watchers of every pending tracker.
    pub fn watchers(&self) -> Vec<BreakpointId> {
        self.trackers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn tracker(frame: u64, watcher: u32) -> MmapTracker {
        MmapTracker {
            frame: FrameId(frame),
            watcher: BreakpointId(watcher),
            length: 0x1000,
            prot: 0x3,
        }
    }

    #[test]
    fn test_take_requires_bound_frame() {
        let mut table = InFlightTable::new();
        table.insert(tracker(1, 10));

        let wrong = Stop::new(BreakpointId(10), FrameId(2));
        assert!(table.take(&wrong).is_none());
        assert_eq!(table.len(), 1);

        let right = Stop::new(BreakpointId(10), FrameId(1));
        assert_eq!(table.take(&right), Some(tracker(1, 10)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_is_single_use() {
        let mut table = InFlightTable::new();
        table.insert(tracker(1, 10));
        let stop = Stop::new(BreakpointId(10), FrameId(1));
        assert!(table.take(&stop).is_some());
        assert!(table.take(&stop).is_none());
    }

    #[test]
    fn test_independent_trackers() {
        let mut table = InFlightTable::new();
        table.insert(tracker(1, 10));
        table.insert(tracker(2, 11));
        assert!(table.take(&Stop::new(BreakpointId(11), FrameId(2))).is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.watchers(), vec![BreakpointId(10)]);
        assert!(table.discard(BreakpointId(10)).is_some());
        assert!(table.is_empty());
    }
}
