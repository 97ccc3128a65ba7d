// crates/covenant-sandbox/src/controller.rs
// ============================================================================
// Module: Sandbox Controller
// Description: Slot-pool admission, cap enforcement, and violation policy.
// Purpose: Own every policy decision around isolated program execution.
// Dependencies: crate::runtime, covenant-core, tokio
// ============================================================================

//! ## Overview
//! The controller admits executions through a bounded semaphore (admission
//! blocks when the pool is full), launches the selected runtime, and races
//! the run against the wall-clock cap and cooperative cancellation. Policy
//! after the run: a critical violation fails the execution; a memory
//! sample more than ten percent over its cap kills it; a wall-clock breach
//! kills it with the partial usage sample preserved. Terminal states are
//! immutable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use covenant_core::ExecutionId;
use covenant_core::ExecutionResult;
use covenant_core::ExecutionSpec;
use covenant_core::ExecutionState;
use covenant_core::ResourceUsage;
use covenant_core::SandboxRuntimeKind;
use covenant_core::Timestamp;
use covenant_core::interfaces::SandboxController;
use covenant_core::interfaces::SandboxError;
use tokio::sync::Semaphore;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;

use crate::runtime::RuntimeOutcome;
use crate::runtime::SandboxRuntime;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Memory overshoot tolerated before a kill, as a fraction of the cap.
const MEMORY_OVERSHOOT_TOLERANCE: f64 = 0.10;

/// Sandbox controller configuration.
///
/// # Invariants
/// - `max_concurrent >= 1`.
#[derive(Debug, Clone)]
pub struct SandboxControllerConfig {
    /// Slot pool size; admission blocks when full.
    pub max_concurrent: usize,
    /// Grace period between a cancel request and the kill.
    pub cancel_grace: Duration,
}

impl Default for SandboxControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            cancel_grace: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// SECTION: Sandbox Pool
// ============================================================================

/// Bounded pool of sandbox slots over registered runtimes.
///
/// # Invariants
/// - At most `max_concurrent` executions run at any instant.
/// - Every admitted execution reaches a terminal state.
pub struct SandboxPool {
    /// Controller configuration.
    config: SandboxControllerConfig,
    /// Registered runtimes by isolation kind.
    runtimes: BTreeMap<SandboxRuntimeKind, Arc<dyn SandboxRuntime>>,
    /// Slot permits.
    permits: Arc<Semaphore>,
    /// Cancellation signals for in-flight executions.
    cancels: Mutex<BTreeMap<ExecutionId, watch::Sender<bool>>>,
}

impl SandboxPool {
    /// Creates a pool over the given runtimes.
    #[must_use]
    pub fn new(
        config: SandboxControllerConfig,
        runtimes: Vec<Arc<dyn SandboxRuntime>>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let runtimes = runtimes.into_iter().map(|runtime| (runtime.kind(), runtime)).collect();
        Self {
            config,
            runtimes,
            permits,
            cancels: Mutex::new(BTreeMap::new()),
        }
    }

    /// Admits and runs one execution to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Runtime`] when no runtime serves the
    /// requested isolation kind and [`SandboxError::PoolExhausted`] when
    /// the pool has shut down.
    pub async fn run(&self, spec: ExecutionSpec) -> Result<ExecutionResult, SandboxError> {
        let runtime = self
            .runtimes
            .get(&spec.runtime)
            .cloned()
            .ok_or_else(|| {
                SandboxError::Runtime(format!("no runtime for {}", spec.runtime.as_str()))
            })?;

        // Admission blocks while the pool is full.
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::PoolExhausted)?;

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.register_cancel(&spec.execution_id, cancel_tx)?;

        let started_at = Timestamp::now();
        let launch = Instant::now();
        sleep(runtime.cold_start()).await;
        let cold_start_millis =
            u64::try_from(launch.elapsed().as_millis()).unwrap_or(u64::MAX);

        let wall_cap = Duration::from_millis(spec.caps.wall_clock_millis);
        let verdict = tokio::select! {
            outcome = runtime.run(&spec) => RunVerdict::Finished(outcome),
            () = sleep(wall_cap) => RunVerdict::WallClockBreach,
            changed = cancel_rx.changed() => {
                if changed.is_ok() && *cancel_rx.borrow() {
                    // Cooperative window before the kill.
                    sleep(self.config.cancel_grace).await;
                    RunVerdict::Cancelled
                } else {
                    RunVerdict::WallClockBreach
                }
            }
        };
        self.unregister_cancel(&spec.execution_id);

        let ended_at = Timestamp::now();
        let total_millis = u64::try_from(launch.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = match verdict {
            RunVerdict::Finished(Ok(outcome)) => {
                finished_result(&spec, outcome, cold_start_millis, total_millis, started_at, ended_at)
            }
            RunVerdict::Finished(Err(err)) => return Err(err),
            RunVerdict::WallClockBreach => ExecutionResult {
                execution_id: spec.execution_id.clone(),
                state: ExecutionState::Killed,
                success: false,
                output: String::new(),
                usage: ResourceUsage {
                    wall_clock_millis: spec.caps.wall_clock_millis,
                    ..ResourceUsage::default()
                },
                violations: Vec::new(),
                cold_start_millis,
                total_millis,
                started_at,
                ended_at,
            },
            RunVerdict::Cancelled => ExecutionResult {
                execution_id: spec.execution_id.clone(),
                state: ExecutionState::Killed,
                success: false,
                output: String::new(),
                usage: ResourceUsage {
                    wall_clock_millis: total_millis.saturating_sub(cold_start_millis),
                    ..ResourceUsage::default()
                },
                violations: Vec::new(),
                cold_start_millis,
                total_millis,
                started_at,
                ended_at,
            },
        };
        debug!(
            execution = %result.execution_id,
            state = result.state.as_str(),
            "execution reached terminal state"
        );
        Ok(result)
    }

    /// Requests cooperative cancellation of an in-flight execution.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::UnknownExecution`] when the id is not
    /// in flight.
    pub fn request_cancel(&self, execution_id: &ExecutionId) -> Result<(), SandboxError> {
        let cancels = self
            .cancels
            .lock()
            .map_err(|_| SandboxError::Runtime("cancel registry poisoned".to_string()))?;
        let sender = cancels
            .get(execution_id)
            .ok_or_else(|| SandboxError::UnknownExecution(execution_id.to_string()))?;
        let _ = sender.send(true);
        Ok(())
    }

    /// Registers a cancel signal for an execution.
    fn register_cancel(
        &self,
        execution_id: &ExecutionId,
        sender: watch::Sender<bool>,
    ) -> Result<(), SandboxError> {
        self.cancels
            .lock()
            .map_err(|_| SandboxError::Runtime("cancel registry poisoned".to_string()))?
            .insert(execution_id.clone(), sender);
        Ok(())
    }

    /// Removes the cancel signal after the execution settles.
    fn unregister_cancel(&self, execution_id: &ExecutionId) {
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.remove(execution_id);
        }
    }
}

// ============================================================================
// SECTION: Terminal Policy
// ============================================================================

/// Raw outcome of the select race.
enum RunVerdict {
    /// Runtime finished (successfully or with a launcher error).
    Finished(Result<RuntimeOutcome, SandboxError>),
    /// Wall-clock cap elapsed first.
    WallClockBreach,
    /// Cancellation was requested and the grace period elapsed.
    Cancelled,
}

/// Applies terminal policy to a finished runtime outcome.
fn finished_result(
    spec: &ExecutionSpec,
    outcome: RuntimeOutcome,
    cold_start_millis: u64,
    total_millis: u64,
    started_at: Timestamp,
    ended_at: Timestamp,
) -> ExecutionResult {
    let critical = outcome
        .violations
        .iter()
        .any(|violation| violation.severity == covenant_core::ViolationSeverity::Critical);

    // Memory policy: a sample within ten percent of the cap is tolerated;
    // beyond that the execution is killed.
    #[allow(clippy::cast_precision_loss, reason = "cap values are small")]
    let memory_limit =
        (spec.caps.memory_mib as f64 * (1.0 + MEMORY_OVERSHOOT_TOLERANCE)).floor();
    #[allow(clippy::cast_precision_loss, reason = "usage values are small")]
    let memory_breached = outcome.usage.peak_memory_mib as f64 > memory_limit;

    let state = if critical {
        ExecutionState::Failed
    } else if memory_breached {
        ExecutionState::Killed
    } else if outcome.exit_success {
        ExecutionState::Completed
    } else {
        ExecutionState::Failed
    };

    ExecutionResult {
        execution_id: spec.execution_id.clone(),
        state,
        success: state == ExecutionState::Completed && outcome.violations.is_empty(),
        output: outcome.output,
        usage: outcome.usage,
        violations: outcome.violations,
        cold_start_millis,
        total_millis,
        started_at,
        ended_at,
    }
}

// ============================================================================
// SECTION: Interface Implementation
// ============================================================================

#[async_trait]
impl SandboxController for SandboxPool {
    async fn execute(&self, spec: ExecutionSpec) -> Result<ExecutionResult, SandboxError> {
        self.run(spec).await
    }

    async fn cancel(&self, execution_id: &ExecutionId) -> Result<(), SandboxError> {
        self.request_cancel(execution_id)
    }
}
