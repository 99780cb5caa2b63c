//! In-memory scripted transport for testing.
//!
//! Replies come from per-operation scripts instead of a live service, and
//! every call is recorded so tests can assert exactly which calls were made
//! and in what order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};

use crate::core::Operation;
use crate::error::TransportFault;
use crate::transport::traits::{RemoteCall, Transport};

/// A scripted reply: a result value or a fault.
pub type Reply = Result<Value, TransportFault>;

/// Transport answering from scripts and recording every call.
///
/// Each operation has an optional queue of one-shot replies, consumed in
/// order, and an optional standing reply used once the queue is empty.
/// Calls to unscripted operations fail with a service fault.
#[derive(Debug)]
pub struct ScriptedTransport {
    descriptor: Mutex<Value>,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    standing: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(RemoteCall, Option<Duration>)>>,
    describe_count: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Descriptor document advertising every operation the client uses.
pub fn standard_descriptor() -> Value {
    json!({
        "service": "DL-Learner",
        "operations": [
            { "name": "generateID", "params": [], "returns": "string" },
            { "name": "addKnowledgeSource", "params": ["id", "kind", "locator"], "returns": "int" },
            { "name": "setReasoner", "params": ["id", "reasoner"], "returns": "int" },
            { "name": "setLearningProblemPosNeg", "params": ["id", "positiveExamples", "negativeExamples"] },
            { "name": "setLearningAlgorithm", "params": ["id", "algorithm"], "returns": "int" },
            { "name": "init", "params": ["id"] },
            { "name": "learn", "params": ["id"], "returns": "string" }
        ]
    })
}

impl ScriptedTransport {
    /// Create a transport with the standard descriptor and no scripts.
    pub fn new() -> Self {
        Self {
            descriptor: Mutex::new(standard_descriptor()),
            queued: Mutex::new(HashMap::new()),
            standing: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            describe_count: AtomicUsize::new(0),
        }
    }

    /// A transport behaving like a healthy service.
    ///
    /// `generateID` answers `session_id`, configuration calls and `init`
    /// succeed, and `learn` returns `concept`.
    pub fn healthy(session_id: &str, concept: &str) -> Self {
        let transport = Self::new();
        transport.set_reply(Operation::GenerateId.name(), Ok(json!(session_id)));
        transport.set_reply(Operation::AddKnowledgeSource.name(), Ok(json!(0)));
        transport.set_reply(Operation::SetReasoner.name(), Ok(json!(0)));
        transport.set_reply(Operation::SetLearningProblem.name(), Ok(Value::Null));
        transport.set_reply(Operation::SetLearningAlgorithm.name(), Ok(json!(0)));
        transport.set_reply(Operation::Init.name(), Ok(Value::Null));
        transport.set_reply(Operation::Learn.name(), Ok(json!(concept)));
        transport
    }

    /// Replace the descriptor returned by `describe`.
    pub fn set_descriptor(&self, descriptor: Value) {
        *lock(&self.descriptor) = descriptor;
    }

    /// Set the standing reply for an operation.
    pub fn set_reply(&self, operation: &str, reply: Reply) {
        lock(&self.standing).insert(operation.to_string(), reply);
    }

    /// Queue a one-shot reply, used before the standing reply.
    pub fn push_reply(&self, operation: &str, reply: Reply) {
        lock(&self.queued)
            .entry(operation.to_string())
            .or_default()
            .push_back(reply);
    }

    /// All calls made so far, oldest first.
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).iter().map(|(c, _)| c.clone()).collect()
    }

    /// Operation names of all calls made so far, oldest first.
    pub fn operations(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|(c, _)| c.operation.clone())
            .collect()
    }

    /// Timeouts handed to each call, oldest first.
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        lock(&self.calls).iter().map(|(_, t)| *t).collect()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Number of times the descriptor was fetched.
    pub fn describe_count(&self) -> usize {
        self.describe_count.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedTransport {
    fn call(&self, call: &RemoteCall, timeout: Option<Duration>) -> Result<Value, TransportFault> {
        lock(&self.calls).push((call.clone(), timeout));

        if let Some(reply) = lock(&self.queued)
            .get_mut(&call.operation)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }

        lock(&self.standing)
            .get(&call.operation)
            .cloned()
            .unwrap_or_else(|| {
                Err(TransportFault::fault(
                    Some("unscripted".to_string()),
                    format!("no scripted reply for {}", call.operation),
                ))
            })
    }

    fn describe(&self, _timeout: Option<Duration>) -> Result<Value, TransportFault> {
        self.describe_count.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.descriptor).clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscripted_operation_faults() {
        let transport = ScriptedTransport::new();
        let result = transport.call(&RemoteCall::new("learn", vec![]), None);
        assert!(matches!(result, Err(TransportFault::Fault { .. })));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_queued_replies_precede_standing_reply() {
        let transport = ScriptedTransport::new();
        transport.set_reply("learn", Ok(json!("standing")));
        transport.push_reply("learn", Ok(json!("first")));
        transport.push_reply("learn", Err(TransportFault::timeout(Duration::from_secs(1))));

        let call = RemoteCall::new("learn", vec![json!("s")]);
        assert_eq!(transport.call(&call, None).unwrap(), json!("first"));
        assert!(transport.call(&call, None).is_err());
        assert_eq!(transport.call(&call, None).unwrap(), json!("standing"));
    }

    #[test]
    fn test_records_calls_and_timeouts() {
        let transport = ScriptedTransport::healthy("sess-1", "C");
        transport
            .call(&RemoteCall::new("generateID", vec![]), Some(Duration::from_secs(3)))
            .unwrap();
        transport
            .call(&RemoteCall::new("init", vec![json!("sess-1")]), None)
            .unwrap();

        assert_eq!(transport.operations(), vec!["generateID", "init"]);
        assert_eq!(
            transport.timeouts(),
            vec![Some(Duration::from_secs(3)), None]
        );
        assert_eq!(transport.calls()[1].args, vec![json!("sess-1")]);
    }

    #[test]
    fn test_describe_counts_fetches() {
        let transport = ScriptedTransport::new();
        transport.describe(None).unwrap();
        transport.describe(None).unwrap();
        assert_eq!(transport.describe_count(), 2);
        // Describing is not a call
        assert_eq!(transport.call_count(), 0);
    }
}
