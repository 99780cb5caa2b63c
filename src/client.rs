//! Learner client: drives one learning run end to end.
//!
//! The client owns the service descriptor and a transport. It creates
//! sessions, pushes them through the configuration stage, and runs `init`
//! and `learn`, measuring both. The per-session stage order is enforced
//! locally, so an out-of-order call costs no round trip.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::core::{
    AlgorithmChoice, CallOutcome, CallRecord, ConfigurationStage, KnowledgeSource, LearnResult,
    LearningProblem, LearningRequest, Operation, ReasonerChoice, ServiceEndpoint, Session,
    SessionHandle, SessionStage,
};
use crate::descriptor::Descriptor;
use crate::error::{CallError, ClientError, Result, TransportFault};
use crate::transport::Transport;

/// Per-operation timeout ceilings. `None` waits indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    /// Session creation and configuration calls.
    pub call: Option<Duration>,
    /// `init`, where the service does its expensive reasoner setup.
    pub init: Option<Duration>,
    /// `learn`, where the service runs the refinement search.
    pub learn: Option<Duration>,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            call: Some(Duration::from_secs(60)),
            init: Some(Duration::from_secs(3600)),
            learn: Some(Duration::from_secs(3600)),
        }
    }
}

/// Orchestrates learning runs against one service endpoint.
///
/// The client holds no per-session state and is safe to share between
/// threads; each thread drives its own [`Session`].
#[derive(Debug)]
pub struct LearnerClient<T: Transport> {
    endpoint: ServiceEndpoint,
    descriptor: Arc<Descriptor>,
    transport: T,
    timeouts: CallTimeouts,
    /// Remote teardown operation, if the service offers one.
    release_operation: Option<String>,
}

impl<T: Transport> LearnerClient<T> {
    /// Create a client.
    ///
    /// Fails with a protocol error if the descriptor does not advertise
    /// every operation a learning run needs.
    pub fn new(
        endpoint: ServiceEndpoint,
        descriptor: impl Into<Arc<Descriptor>>,
        transport: T,
    ) -> Result<Self> {
        let descriptor = descriptor.into();
        descriptor.require(&Operation::REQUIRED)?;

        Ok(Self {
            endpoint,
            descriptor,
            transport,
            timeouts: CallTimeouts::default(),
            release_operation: None,
        })
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Name a remote operation to call when a session is abandoned.
    ///
    /// It is only called if the descriptor advertises it.
    pub fn with_release_operation(mut self, operation: Option<String>) -> Self {
        self.release_operation = operation;
        self
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn timeouts(&self) -> CallTimeouts {
        self.timeouts
    }

    /// Ask the service for a new session.
    pub fn new_session(&self) -> Result<Session> {
        let operation = Operation::GenerateId;
        let call = self.descriptor.prepare(operation.name(), Vec::new())?;

        let started_at = Utc::now();
        let started = Instant::now();
        let result = self.transport.call(&call, self.timeouts.call);
        let elapsed = started.elapsed();

        let handle = match result {
            Ok(Value::String(id)) if !id.trim().is_empty() => SessionHandle::new(id.trim()),
            Ok(other) => {
                return Err(ClientError::protocol(
                    operation.name(),
                    format!("expected a non-empty session identifier, got {}", other),
                ));
            }
            Err(TransportFault::Fault { message, .. }) => {
                return Err(ClientError::protocol(
                    operation.name(),
                    format!("service refused to issue a session: {}", message),
                ));
            }
            Err(fault) => return Err(ClientError::transport(operation.name(), None, fault)),
        };

        info!(session = %handle, endpoint = %self.endpoint, "session created");

        let mut session = Session::new(handle);
        session.record(CallRecord {
            operation: operation.name().to_string(),
            started_at,
            elapsed,
            outcome: CallOutcome::Ok,
        });
        Ok(session)
    }

    /// Attach knowledge source, reasoner, learning problem and algorithm.
    ///
    /// The four calls are sent in that order; the first failure stops the
    /// rest and is reported as a configuration error naming the step. The
    /// session stays in `Created` and a later `configure` resumes from the
    /// failed step.
    pub fn configure(
        &self,
        session: &mut Session,
        knowledge_source: &KnowledgeSource,
        reasoner: &ReasonerChoice,
        problem: &LearningProblem,
        algorithm: &AlgorithmChoice,
    ) -> Result<()> {
        let stage = ConfigurationStage::new(knowledge_source, reasoner, problem, algorithm);
        self.run_stage(session, &stage)
    }

    /// [`configure`](Self::configure) from a bundled request.
    pub fn configure_request(&self, session: &mut Session, request: &LearningRequest) -> Result<()> {
        self.run_stage(session, &ConfigurationStage::from_request(request))
    }

    fn run_stage(&self, session: &mut Session, stage: &ConfigurationStage<'_>) -> Result<()> {
        let ceiling = self.timeouts.call;
        stage.run(session, |session, operation, args| {
            self.round_trip(session, operation, args, ceiling)
        })?;
        info!(session = %session.handle(), "session configured");
        Ok(())
    }

    /// Initialize the configured components and return the time it took.
    pub fn initialize(&self, session: &mut Session) -> Result<Duration> {
        session.require("initialize", SessionStage::Configured)?;

        let operation = Operation::Init;
        let args = vec![json!(session.handle().as_str())];
        let started = Instant::now();

        match self.round_trip(session, operation, args, self.timeouts.init) {
            Ok(_) => {
                let elapsed = started.elapsed();
                session.set_elapsed_init(elapsed);
                session.advance(SessionStage::Initialized);
                info!(
                    session = %session.handle(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "components initialised"
                );
                Ok(elapsed)
            }
            Err(err) => {
                session.abandon();
                Err(self.computation_error(err, operation, session.handle()))
            }
        }
    }

    /// Run the learning algorithm and return the learned concept.
    ///
    /// The session is spent afterwards, whether or not learning succeeded.
    pub fn learn(&self, session: &mut Session) -> Result<LearnResult> {
        session.require("learn", SessionStage::Initialized)?;

        let operation = Operation::Learn;
        let args = vec![json!(session.handle().as_str())];
        let started = Instant::now();
        let result = self.round_trip(session, operation, args, self.timeouts.learn);
        let elapsed_learn = started.elapsed();

        let concept = match result {
            Ok(Value::String(concept)) => concept,
            Ok(other) => {
                session.abandon();
                return Err(ClientError::remote_computation(
                    session.handle().as_str(),
                    operation.name(),
                    format!("expected a concept expression, got {}", other),
                ));
            }
            Err(err) => {
                session.abandon();
                return Err(self.computation_error(err, operation, session.handle()));
            }
        };

        session.advance(SessionStage::Learned);
        info!(
            session = %session.handle(),
            elapsed_ms = elapsed_learn.as_millis() as u64,
            concept = %concept,
            "concept learned"
        );

        Ok(LearnResult {
            concept_expression: concept,
            elapsed_init: session.elapsed_init().unwrap_or_default(),
            elapsed_learn,
        })
    }

    /// Give up on a session.
    ///
    /// Marks the session abandoned. When a release operation is configured
    /// and advertised, the service is told as well, at most once per
    /// session; a failed release is only logged. A session that finished
    /// learning is left untouched.
    pub fn abandon(&self, session: &mut Session) {
        if session.stage() == SessionStage::Learned || session.released() {
            return;
        }
        session.abandon();

        let Some(release) = self.release_operation.as_deref() else {
            debug!(session = %session.handle(), "session abandoned locally");
            return;
        };
        if !self.descriptor.supports(release) {
            debug!(
                session = %session.handle(),
                operation = release,
                "release operation not advertised, abandoning locally"
            );
            return;
        }

        let result = self
            .descriptor
            .prepare(release, vec![json!(session.handle().as_str())])
            .map_err(|e| e.to_string())
            .and_then(|call| {
                self.transport
                    .call(&call, self.timeouts.call)
                    .map_err(|f| f.to_string())
            });
        session.mark_released();
        match result {
            Ok(_) => info!(session = %session.handle(), "session released"),
            Err(e) => warn!(session = %session.handle(), error = %e, "failed to release session"),
        }
    }

    /// Drive a whole learning run: create, configure, initialize, learn.
    ///
    /// With a `deadline`, the run is abandoned once it has taken that long.
    pub fn run(&self, request: &LearningRequest, deadline: Option<Duration>) -> Result<LearnResult> {
        let mut session = self.new_session()?;
        if let Some(deadline) = deadline {
            session.set_deadline(deadline);
        }

        let outcome = self
            .configure_request(&mut session, request)
            .and_then(|()| self.initialize(&mut session))
            .and_then(|_| self.learn(&mut session));

        if outcome.is_err() {
            self.abandon(&mut session);
        }
        outcome
    }

    /// One round trip on behalf of a session.
    ///
    /// Checks cancellation and the deadline first, marshals against the
    /// descriptor, and records the call in the session trace.
    fn round_trip(
        &self,
        session: &mut Session,
        operation: Operation,
        args: Vec<Value>,
        ceiling: Option<Duration>,
    ) -> std::result::Result<Value, CallError> {
        if session.is_cancelled() {
            warn!(session = %session.handle(), operation = %operation, "session cancelled");
            session.abandon();
            return Err(CallError::Cancelled);
        }
        let timeout = session.call_budget(ceiling);

        let call = match self.descriptor.prepare(operation.name(), args) {
            Ok(call) => call,
            Err(e) => {
                session.abandon();
                return Err(CallError::Protocol(e.to_string()));
            }
        };

        let started_at = Utc::now();
        let started = Instant::now();
        let result = self.transport.call(&call, timeout);
        let elapsed = started.elapsed();

        debug!(
            session = %session.handle(),
            operation = %operation,
            elapsed_ms = elapsed.as_millis() as u64,
            ok = result.is_ok(),
            "round trip"
        );
        session.record(CallRecord {
            operation: operation.name().to_string(),
            started_at,
            elapsed,
            outcome: match &result {
                Ok(_) => CallOutcome::Ok,
                Err(fault) => CallOutcome::Failed(fault.to_string()),
            },
        });

        result.map_err(CallError::Fault)
    }

    /// Map a failed `init`/`learn` call: service faults are computation
    /// failures, everything else keeps its default meaning.
    fn computation_error(
        &self,
        err: CallError,
        operation: Operation,
        handle: &SessionHandle,
    ) -> ClientError {
        match err {
            CallError::Fault(TransportFault::Fault { message, .. }) => {
                ClientError::remote_computation(handle.as_str(), operation.name(), message)
            }
            other => other.into_client_error(operation, handle),
        }
    }
}
