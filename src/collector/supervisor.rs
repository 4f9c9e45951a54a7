//! The process-wide collector supervisor.
//!
//! The supervisor owns the running flag and the collector's single timer.
//! Timer handles live in a [`TimerRegistry`] that outlives any one
//! supervisor: when the application is rebuilt (for example on a config
//! reload), [`CollectorSupervisor::initialize`] cancels whatever timer the
//! previous generation left behind before the new one can arm its own.
//! At most one collector timer is armed per registry at any instant.

use super::cycle::{CollectionCycle, CycleOutcome};
use super::SkipPolicy;
use crate::error::ControlError;
use crate::utils::sync::lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest interval the timer accepts.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

struct RegisteredTimer {
    timer_id: u64,
    instance_id: i64,
    handle: AbortHandle,
}

/// Durable storage for the collector's timer handle.
///
/// Clones share the same slot. Arming a timer always aborts the one
/// already registered.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    slot: Arc<Mutex<Option<RegisteredTimer>>>,
    next_timer_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("armed_instance", &self.armed_instance())
            .finish()
    }
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the registered timer, if any, and returns its instance id.
    pub fn cancel(&self) -> Option<i64> {
        let previous = lock(&self.slot).take()?;
        previous.handle.abort();
        Some(previous.instance_id)
    }

    /// The instance id owning the armed timer, if one is armed.
    pub fn armed_instance(&self) -> Option<i64> {
        lock(&self.slot).as_ref().map(|t| t.instance_id)
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.slot).is_some()
    }

    fn arm(&self, instance_id: i64, spawn: impl FnOnce(u64) -> JoinHandle<()>) -> u64 {
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.take() {
            debug!(instance_id = previous.instance_id, "Aborting previously armed timer");
            previous.handle.abort();
        }
        let timer_id = self.next_timer_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = spawn(timer_id).abort_handle();
        *slot = Some(RegisteredTimer {
            timer_id,
            instance_id,
            handle,
        });
        timer_id
    }

    /// Aborts the timer if it is still the registered one.
    fn disarm(&self, timer_id: u64) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|t| t.timer_id == timer_id) {
            if let Some(timer) = slot.take() {
                timer.handle.abort();
            }
        }
    }

    /// Forgets the timer without aborting it; used by a timer stopping itself.
    fn release(&self, timer_id: u64) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|t| t.timer_id == timer_id) {
            slot.take();
        }
    }

    fn is_current(&self, timer_id: u64) -> bool {
        lock(&self.slot).as_ref().is_some_and(|t| t.timer_id == timer_id)
    }
}

struct CollectorState {
    running: bool,
    instance_id: i64,
    started_at: DateTime<Utc>,
    timer_id: Option<u64>,
}

/// A point-in-time view of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStatus {
    pub running: bool,
    pub instance_id: i64,
    pub started_at: DateTime<Utc>,
}

/// Owns the running flag and the collector timer.
#[derive(Clone)]
pub struct CollectorSupervisor {
    state: Arc<Mutex<CollectorState>>,
    registry: TimerRegistry,
    cycle: Arc<dyn CollectionCycle>,
    skip_policy: SkipPolicy,
    default_interval: Duration,
}

impl CollectorSupervisor {
    /// Creates a supervisor generation, cancelling any timer a previous
    /// generation registered in `registry`. Calling this repeatedly with the
    /// same registry never leaves more than one timer behind.
    pub fn initialize(
        registry: TimerRegistry,
        cycle: Arc<dyn CollectionCycle>,
        skip_policy: SkipPolicy,
        default_interval: Duration,
    ) -> Self {
        if let Some(previous) = registry.cancel() {
            info!(previous_instance = previous, "Clearing timer left by previous instance");
        }
        let now = Utc::now();
        Self {
            state: Arc::new(Mutex::new(CollectorState {
                running: false,
                instance_id: now.timestamp_millis(),
                started_at: now,
                timer_id: None,
            })),
            registry,
            cycle,
            skip_policy,
            default_interval,
        }
    }

    /// Runs one collection right away and arms the repeating timer.
    ///
    /// Returns `false` without side effects if already running. The
    /// immediate collection is not part of the timer, so a `stop()` that
    /// follows right after does not cancel it.
    pub fn start(&self, interval: Duration) -> bool {
        let mut state = lock(&self.state);
        if state.running {
            debug!(instance_id = state.instance_id, "Collector already running");
            return false;
        }
        state.running = true;
        state.started_at = Utc::now();
        let timer_id = self.arm(state.instance_id, interval);
        state.timer_id = Some(timer_id);
        self.collect_now(state.instance_id, timer_id);
        info!(instance_id = state.instance_id, interval = ?interval, "Collector started");
        true
    }

    /// Cancels the timer. Returns `false` if the collector was not running.
    pub fn stop(&self) -> bool {
        let mut state = lock(&self.state);
        if !state.running {
            return false;
        }
        if let Some(timer_id) = state.timer_id.take() {
            self.registry.disarm(timer_id);
        }
        state.running = false;
        info!(instance_id = state.instance_id, "Collector stopped");
        true
    }

    /// Cancels any armed timer, mints a new instance id, collects right away
    /// and arms a fresh timer.
    pub fn restart(&self, interval: Duration) -> SupervisorStatus {
        let mut state = lock(&self.state);
        if let Some(timer_id) = state.timer_id.take() {
            self.registry.disarm(timer_id);
        }
        let previous = state.instance_id;
        state.instance_id = next_instance_id(previous);
        state.started_at = Utc::now();
        state.running = true;
        let timer_id = self.arm(state.instance_id, interval);
        state.timer_id = Some(timer_id);
        self.collect_now(state.instance_id, timer_id);
        info!(
            previous_instance = previous,
            instance_id = state.instance_id,
            interval = ?interval,
            "Collector restarted"
        );
        snapshot(&state)
    }

    /// Runs exactly one cycle without touching the timer or running flag.
    pub async fn collect_once(&self) -> CycleOutcome {
        self.cycle.run().await
    }

    pub fn status(&self) -> SupervisorStatus {
        snapshot(&lock(&self.state))
    }

    /// Applies a control request from the out-of-band control surface.
    pub async fn apply(&self, request: ControlRequest) -> Result<ControlResponse, ControlError> {
        let action: ControlAction = request.action.parse()?;
        let interval = match request.interval_seconds {
            Some(0) => return Err(ControlError::InvalidInterval),
            Some(seconds) => Duration::from_secs(seconds),
            None => self.default_interval,
        };

        match action {
            ControlAction::Start => {
                if !self.start(interval) {
                    return Err(ControlError::InapplicableAction { running: true });
                }
                let status = self.status();
                Ok(ControlResponse::new(
                    &status,
                    format!("Directory size monitoring started (instance {})", status.instance_id),
                ))
            }
            ControlAction::Stop => {
                if !self.stop() {
                    return Err(ControlError::InapplicableAction { running: false });
                }
                let status = self.status();
                Ok(ControlResponse::new(
                    &status,
                    format!("Directory size monitoring stopped (instance {})", status.instance_id),
                ))
            }
            ControlAction::Restart => {
                let status = self.restart(interval);
                Ok(ControlResponse::new(
                    &status,
                    format!(
                        "Directory size monitoring restarted with new instance {}",
                        status.instance_id
                    ),
                ))
            }
            ControlAction::Collect => {
                let outcome = self.collect_once().await;
                let status = self.status();
                let mut response = ControlResponse::new(
                    &status,
                    format!("Directory sizes collected ({})", outcome.describe()),
                );
                response.outcome = Some(outcome);
                Ok(response)
            }
        }
    }

    /// Spawns the immediate collection of a start or restart outside the
    /// timer's abort handle.
    fn collect_now(&self, instance_id: i64, timer_id: u64) {
        let cycle = self.cycle.clone();
        let registry = self.registry.clone();
        let state = self.state.clone();
        let skip_policy = self.skip_policy;
        tokio::spawn(async move {
            let outcome = cycle.run().await;
            if outcome.is_skipped() && skip_policy == SkipPolicy::Stop {
                halt(&state, timer_id, instance_id);
                registry.disarm(timer_id);
            }
        });
    }

    fn arm(&self, instance_id: i64, interval: Duration) -> u64 {
        let period = interval.max(MIN_INTERVAL);
        let cycle = self.cycle.clone();
        let registry = self.registry.clone();
        let state = self.state.clone();
        let skip_policy = self.skip_policy;
        self.registry.arm(instance_id, move |timer_id| {
            tokio::spawn(run_timer(
                timer_id,
                instance_id,
                period,
                cycle,
                registry,
                state,
                skip_policy,
            ))
        })
    }
}

async fn run_timer(
    timer_id: u64,
    instance_id: i64,
    period: Duration,
    cycle: Arc<dyn CollectionCycle>,
    registry: TimerRegistry,
    state: Arc<Mutex<CollectorState>>,
    skip_policy: SkipPolicy,
) {
    // The immediate collection runs separately; the timer waits one period.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if !registry.is_current(timer_id) {
            debug!(instance_id, "Discarding stale timer");
            break;
        }

        let outcome = cycle.run().await;
        if outcome.is_skipped() && skip_policy == SkipPolicy::Stop {
            halt(&state, timer_id, instance_id);
            registry.release(timer_id);
            break;
        }
    }
}

/// Clears the running flag if `timer_id` is still the supervisor's timer.
fn halt(state: &Mutex<CollectorState>, timer_id: u64, instance_id: i64) {
    let mut state = lock(state);
    if state.timer_id == Some(timer_id) {
        warn!(instance_id, "Stopping collector after skipped cycle");
        state.timer_id = None;
        state.running = false;
    }
}

fn snapshot(state: &CollectorState) -> SupervisorStatus {
    SupervisorStatus {
        running: state.running,
        instance_id: state.instance_id,
        started_at: state.started_at,
    }
}

/// A wall-clock id strictly greater than `previous`.
fn next_instance_id(previous: i64) -> i64 {
    Utc::now().timestamp_millis().max(previous + 1)
}

/// Actions accepted by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Collect,
}

impl FromStr for ControlAction {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            "restart" => Ok(ControlAction::Restart),
            "collect" => Ok(ControlAction::Collect),
            other => Err(ControlError::UnknownAction(other.to_string())),
        }
    }
}

/// Body of a control request, e.g. `{"action": "start", "intervalSeconds": 30}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

impl ControlRequest {
    pub fn new(action: &str, interval_seconds: Option<u64>) -> Self {
        Self {
            action: action.to_string(),
            interval_seconds,
        }
    }
}

/// Successful result of a control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    pub instance_id: i64,
    pub monitoring: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CycleOutcome>,
}

impl ControlResponse {
    fn new(status: &SupervisorStatus, message: String) -> Self {
        Self {
            success: true,
            instance_id: status.instance_id,
            monitoring: status.running,
            message,
            outcome: None,
        }
    }
}
