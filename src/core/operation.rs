//! Remote operations issued by the client.

use std::fmt;

/// An operation on the remote learning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Allocate a new session identifier.
    GenerateId,
    /// Attach an ontology to the session.
    AddKnowledgeSource,
    /// Select the reasoner.
    SetReasoner,
    /// Define positive and negative examples.
    SetLearningProblem,
    /// Select the learning algorithm.
    SetLearningAlgorithm,
    /// Initialize all configured components.
    Init,
    /// Run the learning algorithm and return the concept.
    Learn,
}

impl Operation {
    /// Every operation a learning run needs, in protocol order.
    pub const REQUIRED: [Operation; 7] = [
        Operation::GenerateId,
        Operation::AddKnowledgeSource,
        Operation::SetReasoner,
        Operation::SetLearningProblem,
        Operation::SetLearningAlgorithm,
        Operation::Init,
        Operation::Learn,
    ];

    /// The operation name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GenerateId => "generateID",
            Operation::AddKnowledgeSource => "addKnowledgeSource",
            Operation::SetReasoner => "setReasoner",
            Operation::SetLearningProblem => "setLearningProblemPosNeg",
            Operation::SetLearningAlgorithm => "setLearningAlgorithm",
            Operation::Init => "init",
            Operation::Learn => "learn",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
