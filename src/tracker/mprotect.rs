//! Single-phase mprotect tracker.
//!
//! The JIT maps its code blob writable, fills it, then flips it to
//! executable with one mprotect. At that point base, length and protection
//! are all call arguments, and every configured offset becomes a breakpoint.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch;
use crate::error::{Error, Result};
use crate::host::{DebugHost, Stop};
use crate::installer::{BreakpointInstaller, Origin};
use crate::matcher::match_offsets;
use crate::output::ExecProtectReport;
use crate::region::{PROT_EXEC, Region};

/// Session-scoped "already fired" flag.
///
/// Only one executable mprotect per session is supported; a second one means
/// the offset table cannot be trusted to describe it.
#[derive(Debug, Default)]
pub struct ExecProtectPolicy {
    fired: AtomicBool,
}

impl ExecProtectPolicy {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Record the executable event for `base..end`, failing if one was
    /// already recorded.
    pub fn claim(&self, base: u64, end: u64) -> Result<()> {
        if self.fired.swap(true, Ordering::SeqCst) {
            log::error!("mprotect: second PROT_EXEC region {:#x} - {:#x}", base, end);
            return Err(Error::DuplicateExecProtect { base, end });
        }
        Ok(())
    }
}

/// What an mprotect entry led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectOutcome {
    /// Protection change without `PROT_EXEC`.
    NotExec,
    /// Breakpoints placed at these addresses, in offset order.
    Installed(Vec<u64>),
}

/// Entry handler: decide and install immediately.
pub fn on_entry<H: DebugHost + ?Sized>(
    host: &mut H,
    stop: &Stop,
    policy: &ExecProtectPolicy,
    offsets: &[u64],
    installer: &mut BreakpointInstaller,
) -> Result<ProtectOutcome> {
    let abi = arch::current_abi(&*host)?;
    let [base, length, prot] = abi.read_args(&*host, stop.frame)?;
    log::debug!(
        "mprotect: entry frame={:?} addr={:#x} length={:#x} prot={:#x}",
        stop.frame,
        base,
        length,
        prot
    );

    if prot & PROT_EXEC == 0 {
        return Ok(ProtectOutcome::NotExec);
    }

    // reported and claimed even when the range is impossible
    let report = ExecProtectReport::from_call(base, length);
    report.emit(host);
    policy.claim(report.base, report.end)?;
    let region = Region::new(base, length, prot)?;

    let addrs = match_offsets(&region, offsets).inspect_err(|e| log::error!("mprotect: {}", e))?;
    for &addr in &addrs {
        installer.install(host, addr, Origin::Mprotect)?;
    }
    Ok(ProtectOutcome::Installed(addrs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::PROT_READ;

    #[test]
    fn test_policy_fires_once() {
        let policy = ExecProtectPolicy::new();
        let region = Region::new(0x1000, 0x800, PROT_READ | PROT_EXEC).unwrap();
        assert!(!policy.has_fired());
        assert!(policy.claim(region.base(), region.end()).is_ok());
        assert!(policy.has_fired());
        assert!(matches!(
            policy.claim(region.base(), region.end()),
            Err(Error::DuplicateExecProtect { base: 0x1000, end: 0x1800 })
        ));
    }
}
