//! Configuration stage of a learning run.
//!
//! The service needs the knowledge source and reasoner in place before a
//! learning problem can refer to them, and the algorithm last. This module
//! owns that order. It keeps no state of its own: acknowledged steps are
//! recorded on the [`Session`], so a run that failed halfway resumes from
//! the first step the service has not confirmed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::model::{
    AlgorithmChoice, KnowledgeSource, LearningProblem, LearningRequest, ReasonerChoice,
};
use crate::core::operation::Operation;
use crate::core::session::{Session, SessionHandle, SessionStage};
use crate::error::{CallError, ClientError, Result};

/// One of the four configuration calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStep {
    KnowledgeSource,
    Reasoner,
    LearningProblem,
    Algorithm,
}

impl ConfigStep {
    /// The order in which steps are sent.
    pub const ORDER: [ConfigStep; 4] = [
        ConfigStep::KnowledgeSource,
        ConfigStep::Reasoner,
        ConfigStep::LearningProblem,
        ConfigStep::Algorithm,
    ];

    /// The remote operation implementing this step.
    pub fn operation(&self) -> Operation {
        match self {
            ConfigStep::KnowledgeSource => Operation::AddKnowledgeSource,
            ConfigStep::Reasoner => Operation::SetReasoner,
            ConfigStep::LearningProblem => Operation::SetLearningProblem,
            ConfigStep::Algorithm => Operation::SetLearningAlgorithm,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConfigStep::KnowledgeSource => "knowledge_source",
            ConfigStep::Reasoner => "reasoner",
            ConfigStep::LearningProblem => "learning_problem",
            ConfigStep::Algorithm => "algorithm",
        }
    }
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The ordered configuration calls for one session.
#[derive(Debug, Clone, Copy)]
pub struct ConfigurationStage<'a> {
    knowledge_source: &'a KnowledgeSource,
    reasoner: &'a ReasonerChoice,
    problem: &'a LearningProblem,
    algorithm: &'a AlgorithmChoice,
}

impl<'a> ConfigurationStage<'a> {
    pub fn new(
        knowledge_source: &'a KnowledgeSource,
        reasoner: &'a ReasonerChoice,
        problem: &'a LearningProblem,
        algorithm: &'a AlgorithmChoice,
    ) -> Self {
        Self {
            knowledge_source,
            reasoner,
            problem,
            algorithm,
        }
    }

    pub fn from_request(request: &'a LearningRequest) -> Self {
        Self::new(
            &request.knowledge_source,
            &request.reasoner,
            &request.problem,
            &request.algorithm,
        )
    }

    /// Wire arguments for a step; the session handle always comes first.
    pub fn arguments(&self, step: ConfigStep, handle: &SessionHandle) -> Vec<Value> {
        let id = json!(handle.as_str());
        match step {
            ConfigStep::KnowledgeSource => vec![
                id,
                json!(self.knowledge_source.kind.wire_name()),
                json!(self.knowledge_source.locator),
            ],
            ConfigStep::Reasoner => vec![id, json!(self.reasoner.as_str())],
            ConfigStep::LearningProblem => vec![
                id,
                json!(self.problem.positive_examples),
                json!(self.problem.negative_examples),
            ],
            ConfigStep::Algorithm => vec![id, json!(self.algorithm.as_str())],
        }
    }

    /// Send every unconfirmed step in order through `send`.
    ///
    /// Stops at the first failure; later steps are not sent. On success the
    /// session moves to `Configured`.
    pub(crate) fn run<F>(&self, session: &mut Session, mut send: F) -> Result<()>
    where
        F: FnMut(&mut Session, Operation, Vec<Value>) -> std::result::Result<Value, CallError>,
    {
        session.require("configure", SessionStage::Created)?;

        let overlap = self.problem.overlapping();
        if !overlap.is_empty() {
            warn!(
                session = %session.handle(),
                overlap = ?overlap,
                "positive and negative examples overlap; sending unchanged"
            );
        }

        for step in ConfigStep::ORDER {
            if session.confirmed_steps().contains(&step) {
                continue;
            }

            let operation = step.operation();
            let args = self.arguments(step, session.handle());
            match send(session, operation, args) {
                Ok(_) => {
                    debug!(session = %session.handle(), step = %step, "configuration step confirmed");
                    session.confirm_step(step);
                }
                Err(CallError::Fault(fault)) => {
                    return Err(ClientError::configuration(
                        session.handle().as_str(),
                        step,
                        fault,
                    ));
                }
                Err(other) => {
                    session.abandon();
                    return Err(other.into_client_error(operation, session.handle()));
                }
            }
        }

        session.advance(SessionStage::Configured);
        Ok(())
    }
}
