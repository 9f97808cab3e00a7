//! Contract with the debugging host.
//!
//! The engine never drives the target itself. A debugger (gdb bridge,
//! ptrace loop, gdbstub, hypervisor probe layer, ...) implements
//! [`DebugHost`], forwards every stop to [`crate::JitWatch::handle_stop`],
//! and resumes the target once the handler returns.

use alloc::string::String;
use axerrno::AxResult;

/// Opaque handle of a breakpoint owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreakpointId(pub u32);

impl core::fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one activation record in the traced process.
///
/// Two calls of the same function, recursive or not, never share a frame id
/// while both are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

/// A stop reported by the host: which breakpoint fired, in which frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stop {
    /// Breakpoint that caused the stop.
    pub breakpoint: BreakpointId,
    /// Newest frame at the time of the stop.
    pub frame: FrameId,
}

impl Stop {
    /// Create a stop record.
    pub fn new(breakpoint: BreakpointId, frame: FrameId) -> Self {
        Self { breakpoint, frame }
    }
}

/// Services the engine consumes from the debugger.
///
/// All methods are called synchronously from inside a stop handler while the
/// target is halted.
pub trait DebugHost {
    /// Free-form description of the target architecture
    /// (e.g. the output of gdb's `show architecture`).
    fn architecture(&self) -> AxResult<String>;

    /// Read a named integer register in the context of `frame`.
    fn read_register(&self, frame: FrameId, name: &str) -> AxResult<u64>;

    /// Stop whenever `symbol` is entered.
    fn break_on_function(&mut self, symbol: &str) -> AxResult<BreakpointId>;

    /// Stop when the activation `frame` returns to its caller.
    ///
    /// Must not fire for any other activation of the same function.
    fn break_on_return(&mut self, frame: FrameId) -> AxResult<BreakpointId>;

    /// Stop when execution reaches the absolute address `addr`.
    fn break_at(&mut self, addr: u64) -> AxResult<BreakpointId>;

    /// Remove a breakpoint previously returned by this host.
    fn remove_breakpoint(&mut self, id: BreakpointId) -> AxResult<()>;

    /// Emit one human-readable diagnostic line to the operator.
    fn write_line(&mut self, line: &str);
}
