//! Session configuration.
//!
//! Addresses and offsets are fixed for the whole session. They are usually
//! captured from an earlier run of the JIT (e.g. with `--print-code`) and
//! pasted in as a comma separated list.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Default symbol intercepted by the mmap pipeline.
pub const DEFAULT_MMAP_SYMBOL: &str = "mmap";
/// Default symbol intercepted by the mprotect pipeline.
pub const DEFAULT_MPROTECT_SYMBOL: &str = "mprotect";

/// Immutable configuration of a [`crate::JitWatch`] session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Absolute addresses to break at once an mmap'ed region covers them.
    pub targets: Vec<u64>,
    /// Offsets from the base of the executable mprotect'ed region.
    pub offsets: Vec<u64>,
    /// Function entered for every mapping request.
    pub mmap_symbol: String,
    /// Function entered for every protection change.
    pub mprotect_symbol: String,
    pub watch_mmap: bool,
    pub watch_mprotect: bool,
    /// Only watch mmap calls that request `PROT_EXEC`.
    ///
    /// Off by default: JITs commonly map RW first and flip to RX later, so
    /// every mapping is followed to completion.
    pub mmap_requires_exec: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            offsets: Vec::new(),
            mmap_symbol: DEFAULT_MMAP_SYMBOL.to_string(),
            mprotect_symbol: DEFAULT_MPROTECT_SYMBOL.to_string(),
            watch_mmap: false,
            watch_mprotect: false,
            mmap_requires_exec: false,
        }
    }
}

impl WatchConfig {
    /// Start building a configuration.
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }
}

/// Builder for [`WatchConfig`].
///
/// A pipeline is enabled as soon as its address list is set, unless it was
/// explicitly switched off.
#[derive(Debug, Default)]
pub struct WatchConfigBuilder {
    config: WatchConfig,
    mmap_override: Option<bool>,
    mprotect_override: Option<bool>,
}

impl WatchConfigBuilder {
    /// Set absolute target addresses (mmap pipeline).
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = u64>) -> Self {
        self.config.targets = targets.into_iter().collect();
        self
    }

    /// Set offsets from the protected region base (mprotect pipeline).
    pub fn with_offsets(mut self, offsets: impl IntoIterator<Item = u64>) -> Self {
        self.config.offsets = offsets.into_iter().collect();
        self
    }

    pub fn with_mmap_symbol(mut self, symbol: &str) -> Self {
        self.config.mmap_symbol = symbol.to_string();
        self
    }

    pub fn with_mprotect_symbol(mut self, symbol: &str) -> Self {
        self.config.mprotect_symbol = symbol.to_string();
        self
    }

    pub fn with_mmap_watch(mut self, enabled: bool) -> Self {
        self.mmap_override = Some(enabled);
        self
    }

    pub fn with_mprotect_watch(mut self, enabled: bool) -> Self {
        self.mprotect_override = Some(enabled);
        self
    }

    pub fn with_mmap_requires_exec(mut self, enabled: bool) -> Self {
        self.config.mmap_requires_exec = enabled;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<WatchConfig> {
        let mut config = self.config;
        config.watch_mmap = self.mmap_override.unwrap_or(!config.targets.is_empty());
        config.watch_mprotect = self
            .mprotect_override
            .unwrap_or(!config.offsets.is_empty());

        if config.watch_mmap && config.mmap_symbol.is_empty() {
            return Err(Error::Config("mmap symbol must not be empty"));
        }
        if config.watch_mprotect && config.mprotect_symbol.is_empty() {
            return Err(Error::Config("mprotect symbol must not be empty"));
        }
        if !config.watch_mmap && !config.watch_mprotect {
            return Err(Error::Config("no pipeline enabled"));
        }
        Ok(config)
    }
}

/// Parse one integer literal, hex with a `0x` prefix or decimal.
pub fn parse_address(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|_| Error::InvalidAddress(text.to_string()))
}

/// Parse a comma and/or whitespace separated list of addresses, keeping the
/// given order.
pub fn parse_address_list(text: &str) -> Result<Vec<u64>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|entry| !entry.is_empty())
        .map(parse_address)
        .collect()
}

/// Turn absolute addresses recorded against a region at `base` into offsets.
pub fn offsets_from_base(addresses: &[u64], base: u64) -> Result<Vec<u64>> {
    addresses
        .iter()
        .map(|&addr| {
            addr.checked_sub(base)
                .ok_or(Error::Config("address below region base"))
        })
        .collect()
}
