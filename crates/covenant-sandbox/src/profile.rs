// crates/covenant-sandbox/src/profile.rs
// ============================================================================
// Module: Violation Profiles
// Description: Classification tables for syscalls, paths, and probes.
// Purpose: Map observed behavior onto violation kinds and severities.
// Dependencies: covenant-core
// ============================================================================

//! ## Overview
//! Classification is table-driven: syscall names, sensitive paths, and
//! probe behaviors map onto violation kinds with fixed severities. The
//! tables encode the hardening profile: anything that could cross the
//! isolation boundary is critical, visibility probes are medium, and
//! unexpected-but-contained behavior is low.

// ============================================================================
// SECTION: Imports
// ============================================================================

use covenant_core::ViolationKind;
use covenant_core::ViolationSeverity;

// ============================================================================
// SECTION: Syscall Classification
// ============================================================================

/// Classifies a syscall attempt.
///
/// Returns `None` for syscalls the profile allows.
#[must_use]
pub fn classify_syscall(name: &str) -> Option<(ViolationKind, ViolationSeverity)> {
    match name {
        "mount" | "umount" | "pivot_root" | "chroot" => {
            Some((ViolationKind::ContainerBreakout, ViolationSeverity::Critical))
        }
        "ptrace" | "process_vm_readv" | "process_vm_writev" => {
            Some((ViolationKind::DangerousSyscall, ViolationSeverity::Critical))
        }
        "init_module" | "finit_module" | "delete_module" | "kexec_load" => {
            Some((ViolationKind::DangerousSyscall, ViolationSeverity::Critical))
        }
        "reboot" | "settimeofday" | "clock_settime" => {
            Some((ViolationKind::DangerousSyscall, ViolationSeverity::High))
        }
        "socket" | "connect" | "bind" => {
            Some((ViolationKind::NetworkEscape, ViolationSeverity::High))
        }
        "kill" | "tgkill" => Some((ViolationKind::ProcessVisibility, ViolationSeverity::Medium)),
        _ => None,
    }
}

// ============================================================================
// SECTION: Path Classification
// ============================================================================

/// Classifies a file-open attempt.
///
/// Returns `None` for paths the read-only profile allows.
#[must_use]
pub fn classify_open(path: &str) -> Option<(ViolationKind, ViolationSeverity)> {
    if path.starts_with("/var/run/docker.sock") || path.starts_with("/run/docker.sock") {
        return Some((ViolationKind::ContainerBreakout, ViolationSeverity::Critical));
    }
    if path.starts_with("/dev/mem") || path.starts_with("/dev/kmem") {
        return Some((ViolationKind::PrivilegedFileAccess, ViolationSeverity::Critical));
    }
    if path.starts_with("/boot") || path.starts_with("/proc/config") {
        return Some((ViolationKind::PrivilegedFileAccess, ViolationSeverity::High));
    }
    if path.starts_with("/etc/shadow") || path.starts_with("/root") {
        return Some((ViolationKind::PrivilegedFileAccess, ViolationSeverity::High));
    }
    if path.starts_with("/proc/") && !path.starts_with("/proc/self") {
        return Some((ViolationKind::ProcessVisibility, ViolationSeverity::Medium));
    }
    None
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use covenant_core::ViolationKind;
    use covenant_core::ViolationSeverity;

    use super::classify_open;
    use super::classify_syscall;

    #[test]
    fn breakout_syscalls_are_critical() {
        for name in ["mount", "pivot_root", "chroot"] {
            let classified = classify_syscall(name);
            assert_eq!(
                classified,
                Some((ViolationKind::ContainerBreakout, ViolationSeverity::Critical)),
                "syscall {name}"
            );
        }
    }

    #[test]
    fn benign_syscalls_are_allowed() {
        assert_eq!(classify_syscall("read"), None);
        assert_eq!(classify_syscall("write"), None);
        assert_eq!(classify_syscall("futex"), None);
    }

    #[test]
    fn host_process_probes_are_medium() {
        assert_eq!(
            classify_open("/proc/1/status"),
            Some((ViolationKind::ProcessVisibility, ViolationSeverity::Medium))
        );
        assert_eq!(classify_open("/proc/self/status"), None);
    }

    #[test]
    fn docker_socket_access_is_a_breakout() {
        assert_eq!(
            classify_open("/var/run/docker.sock"),
            Some((ViolationKind::ContainerBreakout, ViolationSeverity::Critical))
        );
    }
}
