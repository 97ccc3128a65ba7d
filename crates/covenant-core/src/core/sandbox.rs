// crates/covenant-core/src/core/sandbox.rs
// ============================================================================
// Module: Sandbox Execution Model
// Description: Execution specs, resource caps, violations, and results.
// Purpose: Capture isolated execution contracts and their observed outcomes.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A sandbox execution runs candidate or agent code under strict resource
//! caps with network disabled and a read-only filesystem. Violations are
//! classified by kind and severity; any critical violation kills the
//! sandbox and blocks the candidate. Terminal execution states are
//! immutable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CandidateId;
use crate::core::identifiers::ExecutionId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Runtimes
// ============================================================================

/// Supported sandbox isolation runtimes.
///
/// # Invariants
/// - Variants are stable for serialization and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxRuntimeKind {
    /// Kernel-level isolation with syscall filtering; fast cold start.
    #[default]
    KernelIsolation,
    /// Micro-VM isolation; stronger boundary, slower cold start.
    MicroVm,
}

impl SandboxRuntimeKind {
    /// Returns a stable label for the runtime.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KernelIsolation => "kernel_isolation",
            Self::MicroVm => "microvm",
        }
    }

    /// Cold-start P95 target in milliseconds for this runtime.
    #[must_use]
    pub const fn cold_start_target_millis(self) -> u64 {
        match self {
            Self::KernelIsolation => 100,
            Self::MicroVm => 200,
        }
    }
}

// ============================================================================
// SECTION: Resource Caps
// ============================================================================

/// Resource caps applied to one execution.
///
/// # Invariants
/// - All caps are hard limits; breaches kill the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCaps {
    /// Memory cap in mebibytes.
    pub memory_mib: u64,
    /// CPU cap in millicores.
    pub cpu_millicores: u64,
    /// Wall-clock cap in milliseconds.
    pub wall_clock_millis: u64,
    /// Disk cap in mebibytes.
    pub disk_mib: u64,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        Self {
            memory_mib: 256,
            cpu_millicores: 500,
            wall_clock_millis: 30_000,
            disk_mib: 64,
        }
    }
}

/// Observed resource usage sample.
///
/// # Invariants
/// - Samples are monotone best-effort observations, not exact accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceUsage {
    /// Peak memory observed, in mebibytes.
    pub peak_memory_mib: u64,
    /// CPU time consumed, in milliseconds.
    pub cpu_millis: u64,
    /// Wall-clock time elapsed, in milliseconds.
    pub wall_clock_millis: u64,
    /// Disk bytes written, in mebibytes.
    pub disk_written_mib: u64,
}

// ============================================================================
// SECTION: Violations
// ============================================================================

/// Category of a detected sandbox violation.
///
/// # Invariants
/// - Variants are stable for serialization and security triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Attempted container breakout.
    ContainerBreakout,
    /// Privileged file access attempt.
    PrivilegedFileAccess,
    /// Dangerous syscall attempt.
    DangerousSyscall,
    /// Attempted network escape.
    NetworkEscape,
    /// Host process visibility probe.
    ProcessVisibility,
}

impl ViolationKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContainerBreakout => "container_breakout",
            Self::PrivilegedFileAccess => "privileged_file_access",
            Self::DangerousSyscall => "dangerous_syscall",
            Self::NetworkEscape => "network_escape",
            Self::ProcessVisibility => "process_visibility",
        }
    }
}

/// Severity assigned to a violation.
///
/// # Invariants
/// - Ordering is ascending severity; `Critical` kills the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Informational.
    Low,
    /// Suspicious but tolerated.
    Medium,
    /// Serious; surfaced to the orchestrator.
    High,
    /// Kills the sandbox and blocks the candidate.
    Critical,
}

impl ViolationSeverity {
    /// Returns a stable label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One detected violation with evidence.
///
/// # Invariants
/// - `detected_at` falls within the execution's start/end window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation category.
    pub kind: ViolationKind,
    /// Assigned severity.
    pub severity: ViolationSeverity,
    /// Evidence detail (matched syscall, path, destination).
    pub detail: String,
    /// Detection timestamp.
    pub detected_at: Timestamp,
}

// ============================================================================
// SECTION: Execution Lifecycle
// ============================================================================

/// Sandbox execution lifecycle state.
///
/// # Invariants
/// - Terminal states (`Completed`, `Failed`, `Killed`) are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Admitted, awaiting a slot.
    Queued,
    /// Running in the sandbox.
    Running,
    /// Finished within caps with exit success.
    Completed,
    /// Finished with a nonzero exit or a blocking violation.
    Failed,
    /// Killed on cap breach or critical violation.
    Killed,
}

impl ExecutionState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Killed => "killed",
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Killed)
    }
}

/// Specification for one sandbox execution.
///
/// # Invariants
/// - Network stays disabled and the filesystem read-only unless the spec
///   explicitly relaxes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpec {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Candidate the execution belongs to.
    pub candidate_id: CandidateId,
    /// Isolation runtime to use.
    pub runtime: SandboxRuntimeKind,
    /// Program payload (interpreted by the runtime adapter).
    pub program: String,
    /// Resource caps.
    pub caps: ResourceCaps,
    /// Allow outbound network (defaults to false).
    pub allow_network: bool,
    /// Allow filesystem writes (defaults to false).
    pub allow_writes: bool,
}

/// Result of one sandbox execution.
///
/// # Invariants
/// - `state` is terminal.
/// - `usage` is non-null even for killed executions (partial sample).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Terminal lifecycle state.
    pub state: ExecutionState,
    /// True when the program completed within caps with exit success.
    pub success: bool,
    /// Captured output (possibly truncated by the runtime adapter).
    pub output: String,
    /// Observed resource usage sample.
    pub usage: ResourceUsage,
    /// Detected violations, ordered by detection time.
    pub violations: Vec<Violation>,
    /// Cold-start latency in milliseconds.
    pub cold_start_millis: u64,
    /// Total latency in milliseconds, including cold start.
    pub total_millis: u64,
    /// Execution start timestamp.
    pub started_at: Timestamp,
    /// Execution end timestamp.
    pub ended_at: Timestamp,
}

impl ExecutionResult {
    /// Returns the most severe violation, if any were detected.
    #[must_use]
    pub fn worst_violation(&self) -> Option<&Violation> {
        self.violations.iter().max_by_key(|violation| violation.severity)
    }

    /// Returns true when a critical violation was detected.
    #[must_use]
    pub fn has_critical_violation(&self) -> bool {
        self.violations
            .iter()
            .any(|violation| violation.severity == ViolationSeverity::Critical)
    }
}
