//! Memory regions produced by `mmap` / `mprotect`.

use crate::error::{Error, Result};

pub const PROT_READ: u64 = 0x1;
pub const PROT_WRITE: u64 = 0x2;
pub const PROT_EXEC: u64 = 0x4;

/// Value returned by a failed `mmap`.
pub const MAP_FAILED: u64 = u64::MAX;

/// A contiguous address range `[base, base + length)` with the protection
/// the target asked for.
///
/// `length` comes straight from the traced process, so construction checks
/// that the end address is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    base: u64,
    length: u64,
    prot: u64,
}

impl Region {
    /// Build a region, rejecting `base + length` overflow.
    pub fn new(base: u64, length: u64, prot: u64) -> Result<Self> {
        if base.checked_add(length).is_none() {
            return Err(Error::RegionOverflow { base, length });
        }
        Ok(Self { base, length, prot })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Requested protection bits.
    pub fn prot(&self) -> u64 {
        self.prot
    }

    /// Exclusive end address.
    pub fn end(&self) -> u64 {
        // checked in `new`
        self.base + self.length
    }

    /// Whether `addr` lies in `[base, end)`.
    pub fn contains(&self, addr: u64) -> bool {
        self.base <= addr && addr < self.end()
    }

    /// Whether the executable bit was requested.
    pub fn is_exec(&self) -> bool {
        self.prot & PROT_EXEC != 0
    }
}
