//! Operator-facing diagnostic lines.
//!
//! Reports are written through [`DebugHost::write_line`] and mirrored into
//! the log.

use alloc::format;
use alloc::string::String;

use crate::host::DebugHost;
use crate::region::Region;

/// A target address found inside an mmap'ed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchReport {
    pub target: u64,
    pub base: u64,
    pub end: u64,
    pub prot: u64,
}

impl MatchReport {
    pub fn new(target: u64, region: &Region) -> Self {
        Self {
            target,
            base: region.base(),
            end: region.end(),
            prot: region.prot(),
        }
    }

    /// Output format: `target: 0x.., start: 0x.., end: 0x.., prot: N`
    pub fn summary(&self) -> String {
        format!(
            "target: {:#x}, start: {:#x}, end: {:#x}, prot: {}",
            self.target, self.base, self.end, self.prot
        )
    }

    /// Output format: `JIT memory found at 0x.. - setting breakpoint at 0x..`
    pub fn action(&self) -> String {
        format!(
            "JIT memory found at {:#x} - setting breakpoint at {:#x}",
            self.base, self.target
        )
    }

    pub fn emit<H: DebugHost + ?Sized>(&self, host: &mut H) {
        let summary = self.summary();
        let action = self.action();
        log::info!("{}", summary);
        log::info!("{}", action);
        host.write_line(&summary);
        host.write_line(&action);
    }
}

/// An executable `mprotect` observed at call entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecProtectReport {
    pub base: u64,
    pub end: u64,
}

impl ExecProtectReport {
    pub fn new(region: &Region) -> Self {
        Self {
            base: region.base(),
            end: region.end(),
        }
    }

    /// Report straight from the call arguments. `end` saturates when
    /// `base + length` does not fit.
    pub fn from_call(base: u64, length: u64) -> Self {
        Self {
            base,
            end: base.saturating_add(length),
        }
    }

    /// Output format: `mprotect+PROT_EXEC detected at region (0x.., 0x..)`
    pub fn summary(&self) -> String {
        format!(
            "mprotect+PROT_EXEC detected at region ({:#x}, {:#x})",
            self.base, self.end
        )
    }

    pub fn emit<H: DebugHost + ?Sized>(&self, host: &mut H) {
        let summary = self.summary();
        log::info!("{}", summary);
        host.write_line(&summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{PROT_EXEC, PROT_READ};

    #[test]
    fn test_match_report_lines() {
        let region = Region::new(0x3fb8003000, 0x2000, PROT_READ | PROT_EXEC).unwrap();
        let report = MatchReport::new(0x3fb8003020, &region);
        assert_eq!(
            report.summary(),
            "target: 0x3fb8003020, start: 0x3fb8003000, end: 0x3fb8005000, prot: 5"
        );
        assert_eq!(
            report.action(),
            "JIT memory found at 0x3fb8003000 - setting breakpoint at 0x3fb8003020"
        );
    }

    #[test]
    fn test_exec_protect_line() {
        let region = Region::new(0x7f00_0000, 0x800, PROT_READ | PROT_EXEC).unwrap();
        assert_eq!(
            ExecProtectReport::new(&region).summary(),
            "mprotect+PROT_EXEC detected at region (0x7f000000, 0x7f000800)"
        );
        assert_eq!(
            ExecProtectReport::from_call(0x7f00_0000, 0x800),
            ExecProtectReport::new(&region)
        );
        assert_eq!(ExecProtectReport::from_call(u64::MAX - 0x10, 0x1000).end, u64::MAX);
    }
}
