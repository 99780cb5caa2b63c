//! Describe command for dlsession.
//!
//! Loads the service descriptor and reports the advertised operations.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::load_descriptor;
use crate::config::Config;
use crate::core::Operation;
use crate::descriptor::Descriptor;
use crate::transport::Transport;

/// Options for the describe command.
#[derive(Debug, Clone, Default)]
pub struct DescribeOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Refetch even if a cached copy exists.
    pub refresh: bool,
}

/// One advertised operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationInfo {
    pub name: String,
    pub params: Vec<String>,
}

/// Output format for the describe command.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeOutput {
    /// Whether the descriptor was loaded.
    pub success: bool,
    pub service: String,
    pub endpoint: String,
    pub operations: Vec<OperationInfo>,
    /// Operations a learning run needs that the service does not advertise.
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DescribeOutput {
    /// Create a successful output.
    pub fn success(descriptor: &Descriptor) -> Self {
        Self {
            success: true,
            service: descriptor.service.clone(),
            endpoint: descriptor.endpoint.clone(),
            operations: descriptor
                .operations
                .values()
                .map(|op| OperationInfo {
                    name: op.name.clone(),
                    params: op.params.clone(),
                })
                .collect(),
            missing: Operation::REQUIRED
                .iter()
                .map(Operation::name)
                .filter(|name| !descriptor.supports(name))
                .map(str::to_string)
                .collect(),
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            service: String::new(),
            endpoint: String::new(),
            operations: Vec::new(),
            missing: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The describe command implementation.
pub struct DescribeCommand<T: Transport> {
    config: Config,
    transport: T,
    cache_dir: Option<PathBuf>,
}

impl<T: Transport> DescribeCommand<T> {
    /// Create a new describe command.
    pub fn new(config: Config, transport: T, cache_dir: Option<PathBuf>) -> Self {
        Self {
            config,
            transport,
            cache_dir,
        }
    }

    /// Run the describe command.
    pub fn run(&self, options: &DescribeOptions) -> DescribeOutput {
        match load_descriptor(
            &self.config,
            &self.transport,
            self.cache_dir.as_deref(),
            options.refresh,
        ) {
            Ok((_, descriptor)) => DescribeOutput::success(&descriptor),
            Err(e) => DescribeOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &DescribeOutput, options: &DescribeOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &DescribeOutput) -> String {
        if !output.success {
            return format!(
                "Describe failed: {}",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let names: Vec<&str> = output.operations.iter().map(|op| op.name.as_str()).collect();
        let mut line = format!(
            "{} at {}: {}",
            output.service,
            output.endpoint,
            names.join(", ")
        );
        if !output.missing.is_empty() {
            line.push_str(&format!(" (missing: {})", output.missing.join(", ")));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;
    use serde_json::json;

    #[test]
    fn test_describe_standard_service() {
        let cmd = DescribeCommand::new(Config::default(), ScriptedTransport::new(), None);

        let output = cmd.run(&DescribeOptions::default());

        assert!(output.success);
        assert_eq!(output.service, "DL-Learner");
        assert_eq!(output.operations.len(), 7);
        assert!(output.missing.is_empty());
    }

    #[test]
    fn test_describe_reports_missing_operations() {
        let transport = ScriptedTransport::new();
        transport.set_descriptor(json!({
            "service": "partial",
            "operations": [{"name": "generateID"}, {"name": "learn", "params": ["id"]}]
        }));
        let cmd = DescribeCommand::new(Config::default(), transport, None);

        let output = cmd.run(&DescribeOptions::default());

        assert!(output.success);
        assert_eq!(output.missing.len(), 5);
        assert!(output.missing.contains(&"init".to_string()));
        let text = cmd.format_output(&output, &DescribeOptions::default());
        assert!(text.starts_with("partial at http://localhost:8181/services: generateID, learn"));
        assert!(text.contains("missing: addKnowledgeSource"));
    }

    #[test]
    fn test_describe_bad_endpoint_fails() {
        let mut config = Config::default();
        config.endpoint.address = "mailto:someone".to_string();
        let cmd = DescribeCommand::new(config, ScriptedTransport::new(), None);

        let output = cmd.run(&DescribeOptions::default());

        assert!(!output.success);
        assert!(output.error.is_some());
    }
}
