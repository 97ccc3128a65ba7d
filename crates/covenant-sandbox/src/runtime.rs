// crates/covenant-sandbox/src/runtime.rs
// ============================================================================
// Module: Sandbox Runtimes
// Description: Isolation runtime seam and the built-in profile runtime.
// Purpose: Abstract kernel-isolation and micro-VM launchers behind one trait.
// Dependencies: crate::profile, covenant-core, tokio
// ============================================================================

//! ## Overview
//! A runtime launches one program under isolation and reports what it
//! observed: output, resource usage, and raw violations. The controller
//! owns policy (caps, kills, admission); runtimes own mechanism.
//! [`ProfileRuntime`] interprets a line-oriented scripted program format so
//! the full controller path is exercisable without privileged launchers:
//!
//! ```text
//! print hello          # emit output
//! sleep 50             # consume wall-clock milliseconds
//! cpu 20               # consume cpu milliseconds
//! alloc 128            # raise peak memory (MiB)
//! write 4              # write disk (MiB)
//! syscall mount        # attempt a syscall
//! open /proc/1/status  # attempt a file open
//! connect 10.0.0.1:80  # attempt an outbound connection
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use covenant_core::ExecutionSpec;
use covenant_core::ResourceUsage;
use covenant_core::SandboxRuntimeKind;
use covenant_core::Timestamp;
use covenant_core::Violation;
use covenant_core::ViolationKind;
use covenant_core::ViolationSeverity;
use covenant_core::interfaces::SandboxError;
use tokio::time::sleep;

use crate::profile::classify_open;
use crate::profile::classify_syscall;

// ============================================================================
// SECTION: Runtime Seam
// ============================================================================

/// What a runtime observed while executing one program.
///
/// # Invariants
/// - `usage` is a best-effort sample, present even for partial runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOutcome {
    /// True when the program ran to completion with success.
    pub exit_success: bool,
    /// Captured output.
    pub output: String,
    /// Observed resource usage.
    pub usage: ResourceUsage,
    /// Raw detected violations, in detection order.
    pub violations: Vec<Violation>,
}

/// Isolation runtime launching one program per call.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Isolation kind this runtime provides.
    fn kind(&self) -> SandboxRuntimeKind;

    /// Simulated or measured cold-start latency for this runtime.
    fn cold_start(&self) -> Duration;

    /// Runs the program to completion or first critical violation.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Runtime`] for launcher failures; violations
    /// are observations, not errors.
    async fn run(&self, spec: &ExecutionSpec) -> Result<RuntimeOutcome, SandboxError>;
}

// ============================================================================
// SECTION: Profile Runtime
// ============================================================================

/// Built-in scripted runtime used for tests and local development.
///
/// # Invariants
/// - Stops interpreting at the first critical violation, as a hardened
///   launcher would.
#[derive(Debug, Clone)]
pub struct ProfileRuntime {
    /// Isolation kind this instance reports.
    kind: SandboxRuntimeKind,
}

impl ProfileRuntime {
    /// Creates a profile runtime reporting the given isolation kind.
    #[must_use]
    pub const fn new(kind: SandboxRuntimeKind) -> Self {
        Self {
            kind,
        }
    }
}

#[async_trait]
impl SandboxRuntime for ProfileRuntime {
    fn kind(&self) -> SandboxRuntimeKind {
        self.kind
    }

    fn cold_start(&self) -> Duration {
        // Well under the contract targets (100 ms / 200 ms P95).
        match self.kind {
            SandboxRuntimeKind::KernelIsolation => Duration::from_millis(15),
            SandboxRuntimeKind::MicroVm => Duration::from_millis(45),
        }
    }

    async fn run(&self, spec: &ExecutionSpec) -> Result<RuntimeOutcome, SandboxError> {
        let mut output = String::new();
        let mut usage = ResourceUsage::default();
        let mut violations = Vec::new();
        let mut exit_success = true;

        for line in spec.program.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
            match command {
                "print" => {
                    output.push_str(argument);
                    output.push('\n');
                }
                "sleep" => {
                    let millis: u64 = argument.parse().unwrap_or(0);
                    sleep(Duration::from_millis(millis)).await;
                    usage.wall_clock_millis += millis;
                }
                "cpu" => {
                    usage.cpu_millis += argument.parse::<u64>().unwrap_or(0);
                }
                "alloc" => {
                    let mib: u64 = argument.parse().unwrap_or(0);
                    usage.peak_memory_mib = usage.peak_memory_mib.max(mib);
                }
                "write" => {
                    let mib: u64 = argument.parse().unwrap_or(0);
                    if spec.allow_writes {
                        usage.disk_written_mib += mib;
                    } else {
                        violations.push(violation(
                            ViolationKind::PrivilegedFileAccess,
                            ViolationSeverity::Low,
                            format!("write of {mib} MiB on read-only filesystem"),
                        ));
                    }
                }
                "syscall" => {
                    if let Some((kind, severity)) = classify_syscall(argument) {
                        let critical = severity == ViolationSeverity::Critical;
                        violations.push(violation(
                            kind,
                            severity,
                            format!("syscall {argument}"),
                        ));
                        if critical {
                            exit_success = false;
                            break;
                        }
                    }
                }
                "open" => {
                    if let Some((kind, severity)) = classify_open(argument) {
                        let critical = severity == ViolationSeverity::Critical;
                        violations.push(violation(
                            kind,
                            severity,
                            format!("open {argument}"),
                        ));
                        if critical {
                            exit_success = false;
                            break;
                        }
                    }
                }
                "connect" => {
                    if !spec.allow_network {
                        violations.push(violation(
                            ViolationKind::NetworkEscape,
                            ViolationSeverity::High,
                            format!("connect {argument}"),
                        ));
                    }
                }
                "exit" => {
                    exit_success = argument.trim() == "0";
                    break;
                }
                other => {
                    return Err(SandboxError::Runtime(format!(
                        "unknown program directive: {other}"
                    )));
                }
            }
        }

        Ok(RuntimeOutcome {
            exit_success,
            output,
            usage,
            violations,
        })
    }
}

/// Builds a violation record stamped now.
fn violation(kind: ViolationKind, severity: ViolationSeverity, detail: String) -> Violation {
    Violation {
        kind,
        severity,
        detail,
        detected_at: Timestamp::now(),
    }
}
