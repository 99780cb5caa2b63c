//! Session state for one learning run.
//!
//! A [`Session`] wraps the opaque handle issued by the service together with
//! the local view of how far the run has progressed. Every client operation
//! takes the session by `&mut`, so one run can never have two calls in
//! flight, while independent sessions share nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::configure::ConfigStep;
use crate::error::{ClientError, Result};

/// Opaque identifier issued by the service for one learning run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a session through the protocol.
///
/// Transitions are strictly linear: `Created → Configured → Initialized →
/// Learned`. Any terminal failure moves the session to `Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    /// Handle issued, nothing configured yet.
    #[default]
    Created,
    /// All four configuration steps confirmed.
    Configured,
    /// `init` completed.
    Initialized,
    /// `learn` returned a concept; the handle is spent.
    Learned,
    /// Failed, cancelled or released; the handle must not be reused.
    Abandoned,
}

impl SessionStage {
    /// Whether no further calls may be made with this session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStage::Learned | SessionStage::Abandoned)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStage::Created => "created",
            SessionStage::Configured => "configured",
            SessionStage::Initialized => "initialized",
            SessionStage::Learned => "learned",
            SessionStage::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cooperative cancellation flag shared between a session and its owner.
///
/// Cloning yields a handle to the same flag, so another thread can cancel a
/// session that is blocked in a round trip; the cancellation takes effect
/// before the next call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a single remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum CallOutcome {
    Ok,
    Failed(String),
}

/// Telemetry for one round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Wire name of the operation.
    pub operation: String,
    /// When the call was issued.
    pub started_at: DateTime<Utc>,
    /// Wall-clock time until the response or failure.
    pub elapsed: Duration,
    pub outcome: CallOutcome,
}

/// One learning run against the service.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    stage: SessionStage,
    /// Stage reached before the session was abandoned.
    reached: SessionStage,
    /// Configuration steps the service has acknowledged, in order.
    confirmed: Vec<ConfigStep>,
    elapsed_init: Option<Duration>,
    created_at: DateTime<Utc>,
    cancel: CancelToken,
    deadline: Option<Instant>,
    /// Whether the service was told to release the handle.
    released: bool,
    trace: Vec<CallRecord>,
}

impl Session {
    /// Wrap a handle issued by the service.
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            stage: SessionStage::Created,
            reached: SessionStage::Created,
            confirmed: Vec::new(),
            elapsed_init: None,
            created_at: Utc::now(),
            cancel: CancelToken::new(),
            deadline: None,
            released: false,
            trace: Vec::new(),
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    /// The furthest stage reached, including for abandoned sessions.
    pub fn reached_stage(&self) -> SessionStage {
        self.reached
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time spent in `init`, once the session is initialized.
    pub fn elapsed_init(&self) -> Option<Duration> {
        self.elapsed_init
    }

    /// Whether the service was asked to release this session's handle.
    pub fn released(&self) -> bool {
        self.released
    }

    /// Round trips made on behalf of this session, oldest first.
    pub fn trace(&self) -> &[CallRecord] {
        &self.trace
    }

    /// Configuration steps already acknowledged by the service.
    pub fn confirmed_steps(&self) -> &[ConfigStep] {
        &self.confirmed
    }

    /// A token that cancels this session from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Abort the session once `timeout` has elapsed from now.
    ///
    /// A timeout too far in the future to represent leaves the session
    /// without a deadline.
    pub fn set_deadline(&mut self, timeout: Duration) {
        self.deadline = Instant::now().checked_add(timeout);
    }

    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.set_deadline(timeout);
        self
    }

    /// Whether the caller asked to stop or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Timeout for the next round trip.
    ///
    /// The smaller of the operation's ceiling and the time left before the
    /// deadline; `None` means wait indefinitely.
    pub fn call_budget(&self, ceiling: Option<Duration>) -> Option<Duration> {
        let remaining = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match (ceiling, remaining) {
            (Some(c), Some(r)) => Some(c.min(r)),
            (c, r) => c.or(r),
        }
    }

    /// Reject an operation unless the session is in `expected`.
    pub fn require(&self, operation: &'static str, expected: SessionStage) -> Result<()> {
        if self.stage != expected {
            return Err(ClientError::sequence(
                self.handle.as_str(),
                operation,
                self.stage,
            ));
        }
        Ok(())
    }

    /// Move forward to `next`.
    pub(crate) fn advance(&mut self, next: SessionStage) {
        self.stage = next;
        self.reached = next;
    }

    /// Mark the session unusable, remembering how far it got.
    pub(crate) fn abandon(&mut self) {
        if self.stage != SessionStage::Abandoned {
            self.reached = self.stage;
            self.stage = SessionStage::Abandoned;
        }
    }

    pub(crate) fn confirm_step(&mut self, step: ConfigStep) {
        if !self.confirmed.contains(&step) {
            self.confirmed.push(step);
        }
    }

    pub(crate) fn mark_released(&mut self) {
        self.released = true;
    }

    pub(crate) fn set_elapsed_init(&mut self, elapsed: Duration) {
        self.elapsed_init = Some(elapsed);
    }

    pub(crate) fn record(&mut self, record: CallRecord) {
        self.trace.push(record);
    }
}
