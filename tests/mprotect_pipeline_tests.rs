//! Integration tests for the single-phase mprotect pipeline.

#![cfg(feature = "mprotect-watch")]

use jitprobe::config::{offsets_from_base, parse_address_list};
use jitprobe::sim::SimHost;
use jitprobe::{Error, FrameId, JitWatch, Origin, StopAction, WatchConfig};

const PROT_RW: u64 = 0x3;
const PROT_RX: u64 = 0x5;

const JIT_BASE: u64 = 0x3fb8003000;

fn session(offsets: &[u64]) -> JitWatch {
    let config = WatchConfig::builder()
        .with_offsets(offsets.iter().copied())
        .build()
        .unwrap();
    JitWatch::new(config)
}

// =============================================================================
// Offset Installation Tests
// =============================================================================

#[test]
fn test_every_offset_installed() {
    let mut host = SimHost::x86_64();
    let mut watch = session(&[0x20, 0x7a0]);
    watch.attach(&mut host).unwrap();

    let stop = host
        .enter("mprotect", FrameId(1), [JIT_BASE, 0x800, PROT_RX])
        .unwrap();
    assert_eq!(watch.handle_stop(&mut host, stop).unwrap(), StopAction::Resume);

    assert_eq!(
        host.address_breakpoints(),
        vec![JIT_BASE + 0x20, JIT_BASE + 0x7a0]
    );
    assert!(watch.installed().iter().all(|bp| bp.origin == Origin::Mprotect));
    assert!(watch.exec_protect_fired());
    assert_eq!(
        host.lines(),
        &["mprotect+PROT_EXEC detected at region (0x3fb8003000, 0x3fb8003800)".to_string()]
    );
}

#[test]
fn test_out_of_bounds_offset_installs_nothing() {
    let mut host = SimHost::x86_64();
    let mut watch = session(&[0x20, 0x900]);
    watch.attach(&mut host).unwrap();

    let stop = host
        .enter("mprotect", FrameId(1), [JIT_BASE, 0x800, PROT_RX])
        .unwrap();
    let err = watch.handle_stop(&mut host, stop).unwrap_err();

    assert!(matches!(
        err,
        Error::OffsetOutOfBounds {
            offset: 0x900,
            length: 0x800
        }
    ));
    assert!(err.is_fatal());
    assert!(format!("{}", err).contains("0x900"));
    assert!(host.address_breakpoints().is_empty());
    assert!(watch.installed().is_empty());
}

#[test]
fn test_non_exec_protect_is_ignored() {
    let mut host = SimHost::aarch64();
    let mut watch = session(&[0x20]);
    watch.attach(&mut host).unwrap();

    let stop = host
        .enter("mprotect", FrameId(1), [JIT_BASE, 0x800, PROT_RW])
        .unwrap();
    assert_eq!(watch.handle_stop(&mut host, stop).unwrap(), StopAction::Resume);

    assert!(host.address_breakpoints().is_empty());
    assert!(!watch.exec_protect_fired());
    assert!(host.lines().is_empty());
    assert_eq!(watch.stats().mprotect_calls, 1);
}

#[test]
fn test_non_exec_protect_with_wrapping_range_is_ignored() {
    let mut host = SimHost::x86_64();
    let mut watch = session(&[0x20]);
    watch.attach(&mut host).unwrap();

    let stop = host
        .enter("mprotect", FrameId(1), [u64::MAX - 0x10, 0x1000, PROT_RW])
        .unwrap();
    assert!(watch.handle_stop(&mut host, stop).is_ok());
}

#[test]
fn test_exec_protect_with_wrapping_range_is_fatal() {
    let mut host = SimHost::x86_64();
    let mut watch = session(&[0x20]);
    watch.attach(&mut host).unwrap();

    let stop = host
        .enter("mprotect", FrameId(1), [u64::MAX - 0x10, 0x1000, PROT_RX])
        .unwrap();
    assert!(matches!(
        watch.handle_stop(&mut host, stop),
        Err(Error::RegionOverflow { .. })
    ));
    assert!(host.address_breakpoints().is_empty());
    // The event is still reported and counts as the session's one exec.
    assert_eq!(
        host.lines(),
        &["mprotect+PROT_EXEC detected at region (0xffffffffffffffef, 0xffffffffffffffff)".to_string()]
    );
    assert!(watch.exec_protect_fired());
}

// =============================================================================
// Single-Fire Tests
// =============================================================================

#[test]
fn test_second_exec_protect_is_fatal() {
    let mut host = SimHost::riscv64();
    let mut watch = session(&[0x20]);
    watch.attach(&mut host).unwrap();

    let first = host
        .enter("mprotect", FrameId(1), [JIT_BASE, 0x800, PROT_RX])
        .unwrap();
    assert!(watch.handle_stop(&mut host, first).is_ok());

    // A non-exec change in between does not count.
    let rw = host
        .enter("mprotect", FrameId(2), [JIT_BASE, 0x800, PROT_RW])
        .unwrap();
    assert!(watch.handle_stop(&mut host, rw).is_ok());

    let second = host
        .enter("mprotect", FrameId(3), [0x4000_0000, 0x1000, PROT_RX])
        .unwrap();
    let err = watch.handle_stop(&mut host, second).unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateExecProtect {
            base: 0x4000_0000,
            end: 0x4000_1000
        }
    ));
    assert!(err.is_fatal());

    // Only the first event's breakpoint exists.
    assert_eq!(host.address_breakpoints(), vec![JIT_BASE + 0x20]);
    assert_eq!(watch.stats().exec_protects, 1);
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_offsets_from_recorded_run() {
    // Instruction addresses printed by the JIT in an earlier run.
    let recorded = parse_address_list(
        "0x3fb8003020,0x3fb80037a0,0x3fb8003f40,0x3fb8004760,0x3fb8004f80",
    )
    .unwrap();
    let offsets = offsets_from_base(&recorded, JIT_BASE).unwrap();

    let mut host = SimHost::x86_64();
    let mut watch = session(&offsets);
    watch.attach(&mut host).unwrap();

    // This run maps the blob somewhere else.
    let base = 0x5500_0000_0000;
    let stop = host
        .enter("mprotect", FrameId(1), [base, 0x5000, PROT_RX])
        .unwrap();
    watch.handle_stop(&mut host, stop).unwrap();

    assert_eq!(
        host.address_breakpoints(),
        vec![base + 0x20, base + 0x7a0, base + 0xf40, base + 0x1760, base + 0x1f80]
    );
    assert_eq!(watch.stats().breakpoints_installed, 5);
}

#[test]
fn test_host_failure_propagates() {
    let mut host = SimHost::x86_64();
    host.set_fail_address_breakpoints(true);
    let mut watch = session(&[0x20]);
    watch.attach(&mut host).unwrap();

    let stop = host
        .enter("mprotect", FrameId(1), [JIT_BASE, 0x800, PROT_RX])
        .unwrap();
    let err = watch.handle_stop(&mut host, stop).unwrap_err();
    assert!(matches!(err, Error::Host(_)));
    assert!(!err.is_fatal());
}
