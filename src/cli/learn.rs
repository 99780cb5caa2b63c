//! Learn command for dlsession.
//!
//! Runs one full learning session: create, configure, initialize, learn.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::cli::load_descriptor;
use crate::client::LearnerClient;
use crate::config::Config;
use crate::core::{
    AlgorithmChoice, KnowledgeSource, LearnResult, LearningProblem, LearningRequest,
    ReasonerChoice,
};
use crate::error::{exit_codes, ClientError, Result};
use crate::transport::Transport;

/// Options for the learn command.
#[derive(Debug, Clone, Default)]
pub struct LearnOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Refetch the service descriptor even if a cached copy exists.
    pub refresh: bool,
    /// Overall deadline for the session.
    pub deadline: Option<Duration>,
    /// Reasoner key; the configured default when absent.
    pub reasoner: Option<String>,
    /// Algorithm key; the configured default when absent.
    pub algorithm: Option<String>,
}

/// Output format for the learn command.
#[derive(Debug, Clone, Serialize)]
pub struct LearnOutput {
    /// Whether a concept was learned.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_init_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_learn_ms: Option<u64>,
    /// Session the failure happened in, if one was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Process exit code for this outcome.
    #[serde(skip)]
    pub exit_code: i32,
}

impl LearnOutput {
    /// Create a successful output.
    pub fn success(result: &LearnResult) -> Self {
        Self {
            success: true,
            concept: Some(result.concept_expression.clone()),
            elapsed_init_ms: Some(result.elapsed_init.as_millis() as u64),
            elapsed_learn_ms: Some(result.elapsed_learn.as_millis() as u64),
            session: None,
            error: None,
            exit_code: exit_codes::SUCCESS,
        }
    }

    /// Create a failed output.
    pub fn failure(err: &ClientError) -> Self {
        Self {
            success: false,
            concept: None,
            elapsed_init_ms: None,
            elapsed_learn_ms: None,
            session: err.session().map(str::to_string),
            error: Some(err.to_string()),
            exit_code: exit_codes::for_error(err),
        }
    }
}

/// The learn command implementation.
pub struct LearnCommand<T: Transport + Clone> {
    config: Config,
    transport: T,
    cache_dir: Option<PathBuf>,
}

impl<T: Transport + Clone> LearnCommand<T> {
    /// Create a new learn command.
    pub fn new(config: Config, transport: T, cache_dir: Option<PathBuf>) -> Self {
        Self {
            config,
            transport,
            cache_dir,
        }
    }

    /// Learn a concept for `problem` over `knowledge_source`.
    pub fn run(
        &self,
        knowledge_source: &KnowledgeSource,
        problem: &LearningProblem,
        options: &LearnOptions,
    ) -> LearnOutput {
        let request = LearningRequest {
            knowledge_source: knowledge_source.clone(),
            reasoner: options
                .reasoner
                .as_deref()
                .map(ReasonerChoice::new)
                .unwrap_or_else(|| self.config.reasoner()),
            problem: problem.clone(),
            algorithm: options
                .algorithm
                .as_deref()
                .map(AlgorithmChoice::new)
                .unwrap_or_else(|| self.config.algorithm()),
        };

        match self.execute(&request, options) {
            Ok(result) => LearnOutput::success(&result),
            Err(e) => LearnOutput::failure(&e),
        }
    }

    fn execute(&self, request: &LearningRequest, options: &LearnOptions) -> Result<LearnResult> {
        let (endpoint, descriptor) = load_descriptor(
            &self.config,
            &self.transport,
            self.cache_dir.as_deref(),
            options.refresh,
        )?;

        let client = LearnerClient::new(endpoint, descriptor, self.transport.clone())?
            .with_timeouts(self.config.timeouts.call_timeouts())
            .with_release_operation(self.config.endpoint.release_operation.clone());

        client.run(request, options.deadline)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &LearnOutput, options: &LearnOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &LearnOutput) -> String {
        if output.success {
            format!(
                "{} (init {}ms, learn {}ms)",
                output.concept.as_deref().unwrap_or_default(),
                output.elapsed_init_ms.unwrap_or_default(),
                output.elapsed_learn_ms.unwrap_or_default()
            )
        } else {
            format!(
                "Learning failed: {}",
                output.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportFault;
    use crate::transport::ScriptedTransport;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn command(transport: Arc<ScriptedTransport>) -> LearnCommand<Arc<ScriptedTransport>> {
        LearnCommand::new(Config::default(), transport, None)
    }

    fn problem() -> LearningProblem {
        LearningProblem::new(["a", "b"], ["c"])
    }

    #[test]
    fn test_learn_success() {
        let transport = Arc::new(ScriptedTransport::healthy("sess-1", "Person"));
        let cmd = command(Arc::clone(&transport));

        let output = cmd.run(
            &KnowledgeSource::file("ontology.owl"),
            &problem(),
            &LearnOptions::default(),
        );

        assert!(output.success);
        assert_eq!(output.concept.as_deref(), Some("Person"));
        assert_eq!(output.exit_code, exit_codes::SUCCESS);
        assert_eq!(transport.describe_count(), 1);
        assert_eq!(transport.call_count(), 7);
    }

    #[test]
    fn test_learn_uses_option_overrides() {
        let transport = Arc::new(ScriptedTransport::healthy("sess-1", "Person"));
        let cmd = command(Arc::clone(&transport));
        let options = LearnOptions {
            reasoner: Some("fastInstanceChecker".to_string()),
            algorithm: Some("celoe".to_string()),
            ..Default::default()
        };

        cmd.run(&KnowledgeSource::url("http://example.org/o.owl"), &problem(), &options);

        let calls = transport.calls();
        assert_eq!(calls[1].args[1], serde_json::json!("url"));
        assert_eq!(calls[2].args[1], serde_json::json!("fastInstanceChecker"));
        assert_eq!(calls[4].args[1], serde_json::json!("celoe"));
    }

    #[test]
    fn test_learn_failure_reports_session_and_exit_code() {
        let transport = Arc::new(ScriptedTransport::healthy("sess-1", "Person"));
        transport.set_reply("learn", Err(TransportFault::fault(None, "no solution")));
        let cmd = command(transport);

        let output = cmd.run(
            &KnowledgeSource::file("ontology.owl"),
            &problem(),
            &LearnOptions::default(),
        );

        assert!(!output.success);
        assert_eq!(output.session.as_deref(), Some("sess-1"));
        assert_eq!(output.exit_code, exit_codes::REMOTE);
        assert!(output.error.unwrap().contains("no solution"));
    }

    #[test]
    fn test_learn_non_concept_reply_reports_session() {
        let transport = Arc::new(ScriptedTransport::healthy("sess-1", "Person"));
        transport.set_reply("learn", Ok(serde_json::json!(42)));
        let cmd = command(transport);

        let output = cmd.run(
            &KnowledgeSource::file("ontology.owl"),
            &problem(),
            &LearnOptions::default(),
        );

        assert!(!output.success);
        assert_eq!(output.session.as_deref(), Some("sess-1"));
        assert_eq!(output.exit_code, exit_codes::REMOTE);
    }

    #[test]
    fn test_learn_fails_without_required_operations() {
        let transport = Arc::new(ScriptedTransport::healthy("sess-1", "Person"));
        transport.set_descriptor(serde_json::json!({"operations": []}));
        let cmd = command(Arc::clone(&transport));

        let output = cmd.run(
            &KnowledgeSource::file("ontology.owl"),
            &problem(),
            &LearnOptions::default(),
        );

        assert!(!output.success);
        assert_eq!(output.exit_code, exit_codes::TRANSPORT);
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_learn_honours_descriptor_cache() {
        let cache = TempDir::new().unwrap();
        let mut config = Config::default();
        config.endpoint.descriptor_cache = true;
        config.endpoint.force_refresh = false;
        let transport = Arc::new(ScriptedTransport::healthy("sess-1", "Person"));
        let cmd = LearnCommand::new(
            config,
            Arc::clone(&transport),
            Some(cache.path().to_path_buf()),
        );
        let source = KnowledgeSource::file("ontology.owl");

        cmd.run(&source, &problem(), &LearnOptions::default());
        cmd.run(&source, &problem(), &LearnOptions::default());
        assert_eq!(transport.describe_count(), 1);

        let refresh = LearnOptions {
            refresh: true,
            ..Default::default()
        };
        cmd.run(&source, &problem(), &refresh);
        assert_eq!(transport.describe_count(), 2);
    }

    #[test]
    fn test_format_output() {
        let transport = Arc::new(ScriptedTransport::healthy("sess-1", "Person"));
        let cmd = command(transport);
        let output = LearnOutput::success(&LearnResult {
            concept_expression: "Person".to_string(),
            elapsed_init: Duration::from_millis(1200),
            elapsed_learn: Duration::from_millis(30),
        });

        let text = cmd.format_output(&output, &LearnOptions::default());
        assert_eq!(text, "Person (init 1200ms, learn 30ms)");

        let json = cmd.format_output(
            &output,
            &LearnOptions {
                json: true,
                ..Default::default()
            },
        );
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["concept"], "Person");
        assert_eq!(parsed["elapsed_init_ms"], 1200);
        assert!(parsed.get("exit_code").is_none());

        let quiet = LearnOptions {
            quiet: true,
            ..Default::default()
        };
        assert!(cmd.format_output(&output, &quiet).is_empty());
    }
}
