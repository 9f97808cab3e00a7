//! Region matching policy.
//!
//! Pure functions deciding where, inside a freshly produced region, execution
//! breakpoints belong. No host access happens here.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::region::Region;

/// First target address (in configured order) that falls inside `region`.
pub fn match_absolute(region: &Region, targets: &[u64]) -> Option<u64> {
    targets.iter().copied().find(|&t| region.contains(t))
}

/// Translate every offset to an absolute address inside `region`.
///
/// Fails on the first offset (in configured order) that is not strictly
/// below the region length; nothing is returned for the others.
pub fn match_offsets(region: &Region, offsets: &[u64]) -> Result<Vec<u64>> {
    offsets
        .iter()
        .map(|&offset| {
            if offset >= region.length() {
                return Err(Error::OffsetOutOfBounds {
                    offset,
                    length: region.length(),
                });
            }
            // offset < length and base + length does not overflow
            Ok(region.base() + offset)
        })
        .collect()
}
