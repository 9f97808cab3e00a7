//! Interception session.
//!
//! [`JitWatch`] owns everything that lives for one traced process: the
//! configuration, the function-entry breakpoints, in-flight mmap trackers,
//! the single-fire mprotect flag and the ledger of installed breakpoints.
//! The host feeds it stops one at a time; it never runs concurrently with
//! the target.

#[cfg(feature = "shared")]
use alloc::sync::Arc;

use crate::config::WatchConfig;
use crate::error::{Error, Result};
use crate::host::{BreakpointId, DebugHost, Stop};
use crate::installer::{BreakpointInstaller, InstalledBreakpoint};
use crate::tracker::TrackerKind;

#[cfg(feature = "mmap-watch")]
use crate::tracker::mmap::{self, InFlightTable, MmapOutcome};
#[cfg(feature = "mprotect-watch")]
use crate::tracker::mprotect::{self, ExecProtectPolicy, ProtectOutcome};

/// What the host should do after a stop was handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    /// The stop was ours; resume the target.
    Resume,
    /// Not one of our watchers; the host decides.
    NotHandled,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// mmap entries seen.
    pub mmap_calls: u64,
    /// mmap returns evaluated.
    pub mmap_returns: u64,
    /// mmap regions that contained a target.
    pub mmap_matches: u64,
    /// mprotect entries seen.
    pub mprotect_calls: u64,
    /// Executable mprotects whose offsets were installed.
    pub exec_protects: u64,
    /// Breakpoints placed inside JIT regions.
    pub breakpoints_installed: u64,
    /// Trackers dropped without evaluation (skipped, failed or unwound).
    pub trackers_discarded: u64,
}

impl WatchStats {
    fn record_hit(&mut self, kind: TrackerKind) {
        log::trace!("jitprobe: {} hit", kind.label());
        match kind {
            TrackerKind::MmapEntry => self.mmap_calls += 1,
            TrackerKind::MmapReturn => self.mmap_returns += 1,
            TrackerKind::MprotectEntry => self.mprotect_calls += 1,
        }
    }
}

/// Engine handle for hosts that dispatch stops from shared callbacks.
#[cfg(feature = "shared")]
pub type SharedWatch = Arc<spin::Mutex<JitWatch>>;

/// One interception session over a single traced process.
#[derive(Debug)]
pub struct JitWatch {
    config: WatchConfig,
    mmap_entry: Option<BreakpointId>,
    mprotect_entry: Option<BreakpointId>,
    #[cfg(feature = "mmap-watch")]
    in_flight: InFlightTable,
    #[cfg(feature = "mprotect-watch")]
    exec_policy: ExecProtectPolicy,
    installer: BreakpointInstaller,
    stats: WatchStats,
}

impl JitWatch {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            mmap_entry: None,
            mprotect_entry: None,
            #[cfg(feature = "mmap-watch")]
            in_flight: InFlightTable::new(),
            #[cfg(feature = "mprotect-watch")]
            exec_policy: ExecProtectPolicy::new(),
            installer: BreakpointInstaller::new(),
            stats: WatchStats::default(),
        }
    }

    /// Wrap the session for callback-driven hosts.
    #[cfg(feature = "shared")]
    pub fn into_shared(self) -> SharedWatch {
        Arc::new(spin::Mutex::new(self))
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Arm the function-entry breakpoints of the enabled pipelines.
    ///
    /// Pipelines that are already armed are left alone.
    pub fn attach<H: DebugHost + ?Sized>(&mut self, host: &mut H) -> Result<()> {
        if self.config.watch_mmap && !cfg!(feature = "mmap-watch") {
            return Err(Error::Config("mmap pipeline requires the mmap-watch feature"));
        }
        if self.config.watch_mprotect && !cfg!(feature = "mprotect-watch") {
            return Err(Error::Config(
                "mprotect pipeline requires the mprotect-watch feature",
            ));
        }

        if self.config.watch_mmap && self.mmap_entry.is_none() {
            let id = host.break_on_function(&self.config.mmap_symbol)?;
            self.mmap_entry = Some(id);
            log::info!(
                "jitprobe: watching {} ({} targets) via {}",
                self.config.mmap_symbol,
                self.config.targets.len(),
                id
            );
        }
        if self.config.watch_mprotect && self.mprotect_entry.is_none() {
            let id = host.break_on_function(&self.config.mprotect_symbol)?;
            self.mprotect_entry = Some(id);
            log::info!(
                "jitprobe: watching {} ({} offsets) via {}",
                self.config.mprotect_symbol,
                self.config.offsets.len(),
                id
            );
        }
        Ok(())
    }

    /// Remove entry breakpoints and pending return watchers.
    ///
    /// Breakpoints installed inside JIT regions stay in place. A breakpoint
    /// the host fails to remove stays owned by the session; the remaining ones
    /// are still removed and the first error is returned.
    pub fn detach<H: DebugHost + ?Sized>(&mut self, host: &mut H) -> Result<()> {
        let mut first_err = None;
        for slot in [&mut self.mmap_entry, &mut self.mprotect_entry] {
            let Some(id) = *slot else { continue };
            match host.remove_breakpoint(id) {
                Ok(()) => *slot = None,
                Err(e) => {
                    log::warn!("jitprobe: failed to remove entry breakpoint {}: {:?}", id, e);
                    first_err.get_or_insert(Error::from(e));
                }
            }
        }
        #[cfg(feature = "mmap-watch")]
        for watcher in self.in_flight.watchers() {
            match self.installer.retire(host, watcher) {
                Ok(()) => {
                    self.in_flight.discard(watcher);
                    self.stats.trackers_discarded += 1;
                }
                Err(e) => {
                    log::warn!("jitprobe: failed to retire watcher {}: {}", watcher, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                log::info!("jitprobe: detached");
                Ok(())
            }
        }
    }

    /// Handle one stop of the target.
    ///
    /// Errors are fatal for the session: they mean the configuration does not
    /// describe the traced program.
    pub fn handle_stop<H: DebugHost + ?Sized>(
        &mut self,
        host: &mut H,
        stop: Stop,
    ) -> Result<StopAction> {
        if self.mmap_entry == Some(stop.breakpoint) {
            #[cfg(feature = "mmap-watch")]
            {
                self.on_mmap_entry(host, &stop)?;
                return Ok(StopAction::Resume);
            }
        }

        if self.mprotect_entry == Some(stop.breakpoint) {
            #[cfg(feature = "mprotect-watch")]
            {
                self.on_mprotect_entry(host, &stop)?;
                return Ok(StopAction::Resume);
            }
        }

        #[cfg(feature = "mmap-watch")]
        if let Some(tracker) = self.in_flight.take(&stop) {
            self.on_mmap_return(host, tracker)?;
            return Ok(StopAction::Resume);
        }

        log::trace!(
            "jitprobe: stop at {} in frame {:?} not ours",
            stop.breakpoint,
            stop.frame
        );
        Ok(StopAction::NotHandled)
    }

    /// The host dropped a return watcher because its frame unwound without
    /// returning. Forget the matching tracker.
    pub fn handle_out_of_scope(&mut self, breakpoint: BreakpointId) -> Result<()> {
        #[cfg(feature = "mmap-watch")]
        if let Some(tracker) = self.in_flight.discard(breakpoint) {
            log::warn!(
                "mmap: frame {:?} unwound before returning, tracker discarded",
                tracker.frame()
            );
            self.stats.trackers_discarded += 1;
            return Ok(());
        }
        Err(Error::UnknownBreakpoint(breakpoint))
    }

    #[cfg(feature = "mmap-watch")]
    fn on_mmap_entry<H: DebugHost + ?Sized>(&mut self, host: &mut H, stop: &Stop) -> Result<()> {
        self.stats.record_hit(TrackerKind::MmapEntry);
        match mmap::on_entry(host, stop, self.config.mmap_requires_exec)? {
            Some(tracker) => self.in_flight.insert(tracker),
            None => self.stats.trackers_discarded += 1,
        }
        Ok(())
    }

    #[cfg(feature = "mmap-watch")]
    fn on_mmap_return<H: DebugHost + ?Sized>(
        &mut self,
        host: &mut H,
        tracker: mmap::MmapTracker,
    ) -> Result<()> {
        self.stats.record_hit(TrackerKind::MmapReturn);
        match mmap::on_return(host, tracker, &self.config.targets, &mut self.installer)? {
            MmapOutcome::Matched(_) => {
                self.stats.mmap_matches += 1;
                self.stats.breakpoints_installed += 1;
            }
            MmapOutcome::Unmatched => {}
            MmapOutcome::Failed => self.stats.trackers_discarded += 1,
        }
        Ok(())
    }

    #[cfg(feature = "mprotect-watch")]
    fn on_mprotect_entry<H: DebugHost + ?Sized>(&mut self, host: &mut H, stop: &Stop) -> Result<()> {
        self.stats.record_hit(TrackerKind::MprotectEntry);
        let outcome = mprotect::on_entry(
            host,
            stop,
            &self.exec_policy,
            &self.config.offsets,
            &mut self.installer,
        )?;
        if let ProtectOutcome::Installed(addrs) = outcome {
            self.stats.exec_protects += 1;
            self.stats.breakpoints_installed += addrs.len() as u64;
        }
        Ok(())
    }

    /// Number of mmap calls between entry and return.
    pub fn in_flight(&self) -> usize {
        #[cfg(feature = "mmap-watch")]
        {
            self.in_flight.len()
        }
        #[cfg(not(feature = "mmap-watch"))]
        {
            0
        }
    }

    /// Whether the executable mprotect has been seen.
    pub fn exec_protect_fired(&self) -> bool {
        #[cfg(feature = "mprotect-watch")]
        {
            self.exec_policy.has_fired()
        }
        #[cfg(not(feature = "mprotect-watch"))]
        {
            false
        }
    }

    /// Breakpoints installed inside JIT regions so far.
    pub fn installed(&self) -> &[InstalledBreakpoint] {
        self.installer.installed()
    }

    pub fn stats(&self) -> WatchStats {
        self.stats
    }
}
