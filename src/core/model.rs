//! Data model for a learning run.
//!
//! These are the values a caller hands to the client: where the service
//! lives, which ontology to load, the examples, and the opaque reasoner and
//! algorithm keys. None of them are validated beyond what the wire needs;
//! the service is the authority on whether an example or key is acceptable.

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Address of the remote learning service.
///
/// Immutable after construction and safe to share between sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    address: Url,
    descriptor_cache_enabled: bool,
}

impl ServiceEndpoint {
    /// Parse and validate an endpoint address.
    ///
    /// Only absolute `http` and `https` URLs are accepted.
    pub fn new(address: &str, descriptor_cache_enabled: bool) -> Result<Self> {
        let parsed = Url::parse(address.trim())
            .map_err(|e| ClientError::config(format!("invalid endpoint '{}': {}", address, e)))?;

        match parsed.scheme() {
            "http" | "https" => Ok(Self {
                address: parsed,
                descriptor_cache_enabled,
            }),
            other => Err(ClientError::config(format!(
                "invalid endpoint '{}': unsupported scheme '{}'",
                address, other
            ))),
        }
    }

    /// The service URL.
    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Whether descriptors for this endpoint may be cached on disk.
    pub fn descriptor_cache_enabled(&self) -> bool {
        self.descriptor_cache_enabled
    }

    /// A filesystem-safe key identifying this endpoint.
    ///
    /// Distinct addresses always get distinct keys: the scheme is kept, and
    /// every byte other than an ASCII letter, digit, `-` or `.` is written
    /// as `_` plus two hex digits.
    pub fn cache_key(&self) -> String {
        let raw = self.address.as_str();
        let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);

        let mut key = format!("{}_", self.address.scheme());
        for byte in rest.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
                key.push(char::from(byte));
            } else {
                key.push_str(&format!("_{:02x}", byte));
            }
        }
        key
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// How the service should fetch a knowledge source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSourceKind {
    /// An ontology file readable by the service (`file:` locator).
    File,
    /// An ontology document fetched over HTTP.
    Url,
}

impl KnowledgeSourceKind {
    /// The key the service expects for this kind.
    pub fn wire_name(&self) -> &'static str {
        match self {
            KnowledgeSourceKind::File => "owlfile",
            KnowledgeSourceKind::Url => "url",
        }
    }
}

/// An ontology document the remote reasoner loads before learning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub kind: KnowledgeSourceKind,
    pub locator: String,
}

impl KnowledgeSource {
    /// A knowledge source read from a file on the service host.
    pub fn file(locator: impl Into<String>) -> Self {
        Self {
            kind: KnowledgeSourceKind::File,
            locator: locator.into(),
        }
    }

    /// A knowledge source fetched from a URL.
    pub fn url(locator: impl Into<String>) -> Self {
        Self {
            kind: KnowledgeSourceKind::Url,
            locator: locator.into(),
        }
    }
}

/// Positive and negative examples defining the concept to induce.
///
/// The two lists are expected to be disjoint, but that is the service's
/// business: they are sent exactly as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningProblem {
    #[serde(default)]
    pub positive_examples: Vec<String>,
    #[serde(default)]
    pub negative_examples: Vec<String>,
}

impl LearningProblem {
    /// Create a positive/negative learning problem.
    pub fn new<P, N>(positive: P, negative: N) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            positive_examples: positive.into_iter().map(Into::into).collect(),
            negative_examples: negative.into_iter().map(Into::into).collect(),
        }
    }

    /// Examples that appear in both lists.
    pub fn overlapping(&self) -> Vec<&str> {
        self.positive_examples
            .iter()
            .filter(|p| self.negative_examples.contains(p))
            .map(String::as_str)
            .collect()
    }
}

/// Reasoner selection, passed to the service unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonerChoice(String);

impl ReasonerChoice {
    /// The DIG reasoner interface.
    pub const DIG: &'static str = "dig";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn dig() -> Self {
        Self::new(Self::DIG)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReasonerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Learning algorithm selection, passed to the service unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmChoice(String);

impl AlgorithmChoice {
    /// Refinement-operator based learning.
    pub const REFINEMENT: &'static str = "refinement";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn refinement() -> Self {
        Self::new(Self::REFINEMENT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlgorithmChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to configure one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningRequest {
    pub knowledge_source: KnowledgeSource,
    pub reasoner: ReasonerChoice,
    pub problem: LearningProblem,
    pub algorithm: AlgorithmChoice,
}

/// Outcome of a completed learning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnResult {
    /// The learned class description, as returned by the service.
    pub concept_expression: String,
    /// Wall-clock time spent in `init`.
    pub elapsed_init: Duration,
    /// Wall-clock time spent in `learn`.
    pub elapsed_learn: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_accepts_http() {
        let endpoint = ServiceEndpoint::new("http://localhost:8181/services", false).unwrap();
        assert_eq!(endpoint.address().as_str(), "http://localhost:8181/services");
        assert!(!endpoint.descriptor_cache_enabled());
    }

    #[test]
    fn test_endpoint_rejects_relative() {
        let err = ServiceEndpoint::new("localhost:8181", true).unwrap_err();
        assert!(matches!(err, ClientError::Config { .. }));
    }

    #[test]
    fn test_endpoint_rejects_other_schemes() {
        let err = ServiceEndpoint::new("ftp://example.com/services", true).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'ftp'"));
    }

    #[test]
    fn test_endpoint_cache_key_is_filesystem_safe() {
        let endpoint = ServiceEndpoint::new("http://localhost:8181/services?x=1", true).unwrap();
        assert_eq!(
            endpoint.cache_key(),
            "http_localhost_3a8181_2fservices_3fx_3d1"
        );
    }

    #[test]
    fn test_endpoint_cache_keys_are_distinct() {
        let key = |address: &str| ServiceEndpoint::new(address, true).unwrap().cache_key();

        assert_ne!(key("http://host/learner"), key("https://host/learner"));
        assert_ne!(key("http://host/a_b"), key("http://host/a/b"));
        assert_ne!(key("http://host/a_2fb"), key("http://host/a/b"));
        assert_eq!(key("http://host/learner"), key("http://host/learner"));
    }

    #[test]
    fn test_knowledge_source_wire_names() {
        assert_eq!(KnowledgeSource::file("a.owl").kind.wire_name(), "owlfile");
        assert_eq!(KnowledgeSource::url("http://x/a.owl").kind.wire_name(), "url");
    }

    #[test]
    fn test_overlapping_examples() {
        let problem = LearningProblem::new(["a", "b"], ["b", "c"]);
        assert_eq!(problem.overlapping(), vec!["b"]);

        let disjoint = LearningProblem::new(["a"], ["c"]);
        assert!(disjoint.overlapping().is_empty());
    }

    #[test]
    fn test_choices_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ReasonerChoice::dig()).unwrap();
        assert_eq!(json, "\"dig\"");
        let algo: AlgorithmChoice = serde_json::from_str("\"refinement\"").unwrap();
        assert_eq!(algo, AlgorithmChoice::refinement());
    }
}
