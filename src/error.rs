//! Error types for the interception engine.

use alloc::string::String;
use axerrno::AxError;

use crate::host::BreakpointId;

/// Errors raised while handling a stop of the traced process.
///
/// Policy errors are never retried: they mean the configured addresses or
/// offsets do not describe the program actually being traced.
#[derive(Debug)]
pub enum Error {
    /// The target reported an architecture with no known calling convention.
    UnsupportedArchitecture(String),
    /// A second executable `mprotect` was observed in the same session.
    DuplicateExecProtect {
        /// Base of the second region.
        base: u64,
        /// End (exclusive) of the second region.
        end: u64,
    },
    /// A configured offset lies outside the protected region.
    OffsetOutOfBounds {
        /// Offending offset, in configured order.
        offset: u64,
        /// Length of the region actually observed.
        length: u64,
    },
    /// `base + length` does not fit in the address space.
    RegionOverflow {
        /// Region base.
        base: u64,
        /// Region length as passed by the target.
        length: u64,
    },
    /// A stop referenced a breakpoint this engine does not own.
    UnknownBreakpoint(BreakpointId),
    /// Invalid configuration.
    Config(&'static str),
    /// An address or offset literal could not be parsed.
    InvalidAddress(String),
    /// The debugging host failed to carry out a request.
    Host(AxError),
}

impl Error {
    /// Whether this error is one of the session-ending policy violations.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedArchitecture(_)
                | Self::DuplicateExecProtect { .. }
                | Self::OffsetOutOfBounds { .. }
                | Self::RegionOverflow { .. }
        )
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedArchitecture(arch) => write!(f, "Unknown arch: {}", arch.trim()),
            Self::DuplicateExecProtect { base, end } => write!(
                f,
                "Only a single mprotect+PROT_EXEC supported (second region {:#x} - {:#x})",
                base, end
            ),
            Self::OffsetOutOfBounds { offset, length } => write!(
                f,
                "offset {:#x} from base, but mprotect'ed length is {:#x}",
                offset, length
            ),
            Self::RegionOverflow { base, length } => write!(
                f,
                "region {:#x} + {:#x} overflows the address space",
                base, length
            ),
            Self::UnknownBreakpoint(id) => write!(f, "Breakpoint not owned by this session: {}", id),
            Self::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::InvalidAddress(text) => write!(f, "Invalid address: {:?}", text),
            Self::Host(e) => write!(f, "Debug host error: {:?}", e),
        }
    }
}

impl core::error::Error for Error {}

impl From<AxError> for Error {
    fn from(e: AxError) -> Self {
        Self::Host(e)
    }
}

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
