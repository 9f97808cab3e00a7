//! Breakpoint installer.
//!
//! Thin side-effecting layer between the trackers and the host: places
//! address breakpoints inside JIT regions and retires the watchers that
//! found them. Every breakpoint placed here is recorded so the operator can
//! list them later.

use alloc::vec::Vec;

use crate::error::Result;
use crate::host::{BreakpointId, DebugHost};

/// Which pipeline produced a breakpoint.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Absolute target found in an mmap'ed region.
    Mmap = 0,
    /// Offset applied to an executable mprotect'ed region.
    Mprotect = 1,
}

impl Origin {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Origin::Mmap => "mmap",
            Origin::Mprotect => "mprotect",
        }
    }
}

/// One breakpoint placed inside a JIT region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstalledBreakpoint {
    pub addr: u64,
    pub id: BreakpointId,
    pub origin: Origin,
}

/// Installs execution breakpoints and keeps a ledger of them.
///
/// Installing twice at the same address is not guarded against; neither
/// pipeline does it.
#[derive(Debug, Default)]
pub struct BreakpointInstaller {
    installed: Vec<InstalledBreakpoint>,
}

impl BreakpointInstaller {
    pub fn new() -> Self {
        Self {
            installed: Vec::new(),
        }
    }

    /// Ask the host to stop at `addr`.
    pub fn install<H: DebugHost + ?Sized>(
        &mut self,
        host: &mut H,
        addr: u64,
        origin: Origin,
    ) -> Result<BreakpointId> {
        let id = host.break_at(addr)?;
        self.installed.push(InstalledBreakpoint { addr, id, origin });
        log::info!(
            "installer: breakpoint {} at {:#x} ({})",
            id,
            addr,
            origin.label()
        );
        Ok(id)
    }

    /// Remove a watcher breakpoint that has served its purpose.
    pub fn retire<H: DebugHost + ?Sized>(&mut self, host: &mut H, id: BreakpointId) -> Result<()> {
        host.remove_breakpoint(id)?;
        log::debug!("installer: retired watcher {}", id);
        Ok(())
    }

    /// Breakpoints placed so far, in installation order.
    pub fn installed(&self) -> &[InstalledBreakpoint] {
        &self.installed
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}
