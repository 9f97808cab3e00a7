//! JIT region interception engine.
//!
//! Watches a traced process map and re-protect memory, recognizes the
//! regions a just-in-time compiler fills with code, and installs execution
//! breakpoints at addresses of interest inside them.
//!
//! # Features
//!
//! - `mmap-watch` - two-phase tracking of `mmap` (default)
//! - `mprotect-watch` - single-phase tracking of `mprotect` (default)
//! - `shared` - `Arc<Mutex<_>>` session handle for callback-driven hosts (default)
//!
//! # Quick Start
//!
//! ```ignore
//! use jitprobe::{JitWatch, StopAction, WatchConfig};
//!
//! let config = WatchConfig::builder()
//!     .with_targets(jitprobe::config::parse_address_list("0x3fb8003020")?)
//!     .build()?;
//! let mut watch = JitWatch::new(config);
//! watch.attach(&mut host)?;
//!
//! // In the host's stop loop:
//! match watch.handle_stop(&mut host, stop)? {
//!     StopAction::Resume => host.resume(),
//!     StopAction::NotHandled => { /* a breakpoint the operator owns */ }
//! }
//! ```

#![no_std]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod error;
pub mod host;
pub mod installer;
pub mod matcher;
pub mod output;
pub mod region;
pub mod sim;
pub mod tracker;
pub mod watch;

// Re-export key types for convenience
pub use arch::{Abi, CpuArch, lookup_convention, resolve_architecture};
pub use config::WatchConfig;
pub use error::{Error, Result};
pub use host::{BreakpointId, DebugHost, FrameId, Stop};
pub use installer::{BreakpointInstaller, InstalledBreakpoint, Origin};
pub use matcher::{match_absolute, match_offsets};
pub use region::Region;
pub use watch::{JitWatch, StopAction, WatchStats};

#[cfg(feature = "shared")]
pub use watch::SharedWatch;
