//! Core protocol types for the session client.
//!
//! This module contains the data model of a learning run, the per-session
//! state machine, and the ordered configuration stage.

pub mod configure;
pub mod model;
pub mod operation;
pub mod session;

pub use configure::{ConfigStep, ConfigurationStage};
pub use model::{
    AlgorithmChoice, KnowledgeSource, KnowledgeSourceKind, LearnResult, LearningProblem,
    LearningRequest, ReasonerChoice, ServiceEndpoint,
};
pub use operation::Operation;
pub use session::{
    CallOutcome, CallRecord, CancelToken, Session, SessionHandle, SessionStage,
};
