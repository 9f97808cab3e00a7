//! Call-boundary trackers.
//!
//! Two pipelines observe the target's memory management:
//! - mmap: the region base is only known when the call returns, so the entry
//!   handler arms a return watcher bound to the calling frame (two-phase).
//! - mprotect: base, length and protection are all arguments, so the entry
//!   handler decides on the spot (single-phase).
//!
//! Neither pipeline alters or blocks the intercepted call.

#[cfg(feature = "mmap-watch")]
pub mod mmap;

#[cfg(feature = "mprotect-watch")]
pub mod mprotect;

/// Pipeline classification, used in stats and logs.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerKind {
    /// mmap entry (argument capture)
    MmapEntry = 0,
    /// mmap return (region evaluation)
    MmapReturn = 1,
    /// mprotect entry (capture and evaluation)
    MprotectEntry = 2,
}

impl TrackerKind {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            TrackerKind::MmapEntry => "mmap",
            TrackerKind::MmapReturn => "mmap-ret",
            TrackerKind::MprotectEntry => "mprotect",
        }
    }
}
