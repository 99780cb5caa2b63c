//! dlsession - DL-Learner session client
//!
//! Drives concept-learning sessions against a remote DL-Learner service:
//! fetch the service descriptor, create a session, attach a knowledge
//! source, reasoner, learning problem and algorithm, then initialize and
//! learn. Stage order is enforced locally and every failure is reported
//! with the session, operation and cause.

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod descriptor;
pub mod error;
pub mod sampling;
pub mod transport;

pub use client::{CallTimeouts, LearnerClient};
pub use config::Config;
pub use core::{
    AlgorithmChoice, CancelToken, ConfigStep, ConfigurationStage, KnowledgeSource,
    KnowledgeSourceKind, LearnResult, LearningProblem, LearningRequest, Operation,
    ReasonerChoice, ServiceEndpoint, Session, SessionHandle, SessionStage,
};
pub use descriptor::{Descriptor, DescriptorLoader};
pub use error::{ClientError, Result, TransportFault};
pub use sampling::{ExampleSampler, Sample};
pub use transport::{HttpTransport, RemoteCall, ScriptedTransport, Transport};
