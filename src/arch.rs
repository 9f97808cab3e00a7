//! Architecture profile: which registers carry syscall-wrapper arguments.
//!
//! The target architecture is taken from the host's free-form description
//! string and matched against the identifiers gdb prints for the three
//! supported families.

use alloc::string::String;
use axerrno::AxResult;

use crate::error::{Error, Result};
use crate::host::{DebugHost, FrameId};

/// Instruction-set family of the traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArch {
    X86_64,
    Aarch64,
    Riscv64,
    /// The description matched none of the known identifiers.
    Unknown,
}

impl CpuArch {
    /// All families with a known calling convention.
    pub const SUPPORTED: [CpuArch; 3] = [CpuArch::X86_64, CpuArch::Aarch64, CpuArch::Riscv64];

    /// Classify an architecture description by substring.
    pub fn detect(description: &str) -> Self {
        if description.contains("aarch64") {
            CpuArch::Aarch64
        } else if description.contains("x86-64") {
            CpuArch::X86_64
        } else if description.contains("riscv:rv64") {
            CpuArch::Riscv64
        } else {
            CpuArch::Unknown
        }
    }

    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            CpuArch::X86_64 => "x86_64",
            CpuArch::Aarch64 => "aarch64",
            CpuArch::Riscv64 => "riscv64",
            CpuArch::Unknown => "unknown",
        }
    }
}

/// Registers holding the first three integer arguments and the return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abi {
    pub arg0: &'static str,
    pub arg1: &'static str,
    pub arg2: &'static str,
    pub ret: &'static str,
}

impl Abi {
    /// Argument registers in positional order.
    pub fn args(&self) -> [&'static str; 3] {
        [self.arg0, self.arg1, self.arg2]
    }

    /// Read the three argument registers of `frame`.
    pub fn read_args<H: DebugHost + ?Sized>(&self, host: &H, frame: FrameId) -> AxResult<[u64; 3]> {
        Ok([
            host.read_register(frame, self.arg0)?,
            host.read_register(frame, self.arg1)?,
            host.read_register(frame, self.arg2)?,
        ])
    }

    /// Read the return-value register of `frame`.
    pub fn read_ret<H: DebugHost + ?Sized>(&self, host: &H, frame: FrameId) -> AxResult<u64> {
        host.read_register(frame, self.ret)
    }
}

const X86_64_ABI: Abi = Abi {
    arg0: "rdi",
    arg1: "rsi",
    arg2: "rdx",
    ret: "rax",
};

const AARCH64_ABI: Abi = Abi {
    arg0: "x0",
    arg1: "x1",
    arg2: "x2",
    ret: "x0",
};

const RISCV64_ABI: Abi = Abi {
    arg0: "a0",
    arg1: "a1",
    arg2: "a2",
    ret: "a0",
};

/// Calling convention for `arch`.
pub fn lookup_convention(arch: CpuArch) -> Result<Abi> {
    match arch {
        CpuArch::X86_64 => Ok(X86_64_ABI),
        CpuArch::Aarch64 => Ok(AARCH64_ABI),
        CpuArch::Riscv64 => Ok(RISCV64_ABI),
        CpuArch::Unknown => Err(Error::UnsupportedArchitecture(String::from(arch.label()))),
    }
}

/// Query the host and classify its architecture, never failing on an
/// unrecognized description.
pub fn resolve_architecture<H: DebugHost + ?Sized>(host: &H) -> Result<CpuArch> {
    let description = host.architecture()?;
    Ok(CpuArch::detect(&description))
}

/// Like [`resolve_architecture`] but an unrecognized description is an
/// [`Error::UnsupportedArchitecture`].
pub fn resolve_architecture_strict<H: DebugHost + ?Sized>(host: &H) -> Result<CpuArch> {
    let description = host.architecture()?;
    match CpuArch::detect(&description) {
        CpuArch::Unknown => Err(Error::UnsupportedArchitecture(description)),
        arch => Ok(arch),
    }
}

/// Resolve the calling convention of the stopped target.
///
/// Re-read on every hit; nothing is cached across stops.
pub fn current_abi<H: DebugHost + ?Sized>(host: &H) -> Result<Abi> {
    let arch = resolve_architecture_strict(host)?;
    log::trace!("arch: target is {}", arch.label());
    lookup_convention(arch)
}
