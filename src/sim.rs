//! In-memory debugging host.
//!
//! Implements [`DebugHost`] over a per-frame register file and a breakpoint
//! table, so interception sessions can be exercised without a live target:
//! in tests, or to replay stops recorded from a real run.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use axerrno::AxResult;

use crate::arch;
use crate::host::{BreakpointId, DebugHost, FrameId, Stop};

/// gdb's description of an x86-64 target.
pub const ARCH_X86_64: &str = "The target architecture is set to \"auto\" (currently \"i386:x86-64\").";
/// gdb's description of an aarch64 target.
pub const ARCH_AARCH64: &str = "The target architecture is set to \"auto\" (currently \"aarch64\").";
/// gdb's description of a riscv64 target.
pub const ARCH_RISCV64: &str = "The target architecture is set to \"auto\" (currently \"riscv:rv64\").";

/// A breakpoint placed on the simulated target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimBreakpoint {
    Function(String),
    Return(FrameId),
    Address(u64),
}

/// Simulated target and debugger.
#[derive(Debug, Default)]
pub struct SimHost {
    arch: String,
    registers: BTreeMap<(FrameId, String), u64>,
    breakpoints: BTreeMap<BreakpointId, SimBreakpoint>,
    removed: Vec<BreakpointId>,
    lines: Vec<String>,
    next_id: u32,
    fail_address_breakpoints: bool,
}

impl SimHost {
    /// Create a host reporting `arch` as its architecture description.
    pub fn new(arch: &str) -> Self {
        Self {
            arch: arch.to_string(),
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn x86_64() -> Self {
        Self::new(ARCH_X86_64)
    }

    pub fn aarch64() -> Self {
        Self::new(ARCH_AARCH64)
    }

    pub fn riscv64() -> Self {
        Self::new(ARCH_RISCV64)
    }

    /// Make every subsequent `break_at` fail.
    pub fn set_fail_address_breakpoints(&mut self, fail: bool) {
        self.fail_address_breakpoints = fail;
    }

    pub fn set_register(&mut self, frame: FrameId, name: &str, value: u64) {
        self.registers.insert((frame, name.to_string()), value);
    }

    /// Simulate `frame` entering `symbol` with three integer arguments.
    ///
    /// Returns the stop to hand to the engine, or `None` when no breakpoint
    /// is armed on `symbol`.
    pub fn enter(&mut self, symbol: &str, frame: FrameId, args: [u64; 3]) -> Option<Stop> {
        let id = self.breakpoints.iter().find_map(|(id, bp)| match bp {
            SimBreakpoint::Function(name) if name == symbol => Some(*id),
            _ => None,
        })?;
        let abi = arch::current_abi(&*self).ok()?;
        for (reg, value) in abi.args().into_iter().zip(args) {
            self.set_register(frame, reg, value);
        }
        Some(Stop::new(id, frame))
    }

    /// Simulate the activation `frame` returning `ret`.
    ///
    /// Returns the stop to hand to the engine, or `None` when no return
    /// watcher is armed for `frame`.
    pub fn leave(&mut self, frame: FrameId, ret: u64) -> Option<Stop> {
        let id = self.breakpoints.iter().find_map(|(id, bp)| match bp {
            SimBreakpoint::Return(f) if *f == frame => Some(*id),
            _ => None,
        })?;
        let abi = arch::current_abi(&*self).ok()?;
        self.set_register(frame, abi.ret, ret);
        Some(Stop::new(id, frame))
    }

    /// Simulate execution reaching `addr`.
    pub fn execute(&self, addr: u64, frame: FrameId) -> Option<Stop> {
        self.breakpoints.iter().find_map(|(id, bp)| match bp {
            SimBreakpoint::Address(a) if *a == addr => Some(Stop::new(*id, frame)),
            _ => None,
        })
    }

    /// Live breakpoints.
    pub fn breakpoints(&self) -> &BTreeMap<BreakpointId, SimBreakpoint> {
        &self.breakpoints
    }

    /// Addresses of live address breakpoints, in creation order.
    pub fn address_breakpoints(&self) -> Vec<u64> {
        self.breakpoints
            .values()
            .filter_map(|bp| match bp {
                SimBreakpoint::Address(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    /// Number of live return watchers.
    pub fn return_watchers(&self) -> usize {
        self.breakpoints
            .values()
            .filter(|bp| matches!(bp, SimBreakpoint::Return(_)))
            .count()
    }

    /// Breakpoints removed so far, in removal order.
    pub fn removed(&self) -> &[BreakpointId] {
        &self.removed
    }

    /// Diagnostic lines written so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn add(&mut self, bp: SimBreakpoint) -> BreakpointId {
        let id = BreakpointId(self.next_id);
        self.next_id += 1;
        self.breakpoints.insert(id, bp);
        id
    }
}

impl DebugHost for SimHost {
    fn architecture(&self) -> AxResult<String> {
        Ok(self.arch.clone())
    }

    fn read_register(&self, frame: FrameId, name: &str) -> AxResult<u64> {
        match self.registers.get(&(frame, name.to_string())) {
            Some(value) => Ok(*value),
            None => axerrno::ax_err!(NotFound, "register not set in frame"),
        }
    }

    fn break_on_function(&mut self, symbol: &str) -> AxResult<BreakpointId> {
        Ok(self.add(SimBreakpoint::Function(symbol.to_string())))
    }

    fn break_on_return(&mut self, frame: FrameId) -> AxResult<BreakpointId> {
        Ok(self.add(SimBreakpoint::Return(frame)))
    }

    fn break_at(&mut self, addr: u64) -> AxResult<BreakpointId> {
        if self.fail_address_breakpoints {
            return axerrno::ax_err!(Unsupported, "address breakpoints disabled");
        }
        Ok(self.add(SimBreakpoint::Address(addr)))
    }

    fn remove_breakpoint(&mut self, id: BreakpointId) -> AxResult<()> {
        match self.breakpoints.remove(&id) {
            Some(_) => {
                self.removed.push(id);
                Ok(())
            }
            None => axerrno::ax_err!(NotFound, "no such breakpoint"),
        }
    }

    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_sets_argument_registers() {
        let mut host = SimHost::aarch64();
        let bp = host.break_on_function("mmap").unwrap();
        let stop = host.enter("mmap", FrameId(7), [0, 0x1000, 0x3]).unwrap();
        assert_eq!(stop.breakpoint, bp);
        assert_eq!(host.read_register(FrameId(7), "x1").unwrap(), 0x1000);
        assert_eq!(host.read_register(FrameId(7), "x2").unwrap(), 0x3);
        assert!(host.read_register(FrameId(8), "x1").is_err());
    }

    #[test]
    fn test_leave_needs_watcher() {
        let mut host = SimHost::riscv64();
        assert!(host.leave(FrameId(1), 0x5000).is_none());
        let watcher = host.break_on_return(FrameId(1)).unwrap();
        let stop = host.leave(FrameId(1), 0x5000).unwrap();
        assert_eq!(stop.breakpoint, watcher);
        assert_eq!(host.read_register(FrameId(1), "a0").unwrap(), 0x5000);
    }

    #[test]
    fn test_remove_unknown_fails() {
        let mut host = SimHost::x86_64();
        assert!(host.remove_breakpoint(BreakpointId(42)).is_err());
        let id = host.break_at(0x1000).unwrap();
        assert!(host.remove_breakpoint(id).is_ok());
        assert_eq!(host.removed(), &[id]);
        assert!(host.address_breakpoints().is_empty());
    }
}
