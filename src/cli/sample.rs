//! Sample command for dlsession.
//!
//! Draws a seeded instance sample from known positives and a record list.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::sampling::{load_records, ExampleSampler, Sample};

/// Options for the sample command.
#[derive(Debug, Clone, Default)]
pub struct SampleOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Instance budget; the configured value when absent.
    pub instances: Option<usize>,
    pub seed: Option<u64>,
    /// Record list; the configured path when absent.
    pub records: Option<PathBuf>,
}

/// Output format for the sample command.
#[derive(Debug, Clone, Serialize)]
pub struct SampleOutput {
    /// Whether a sample was drawn.
    pub success: bool,
    pub seed: u64,
    pub positives: Vec<String>,
    /// Sampled instances that are not positives.
    pub negatives: Vec<String>,
    pub instances: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SampleOutput {
    /// Create a successful output.
    pub fn success(seed: u64, sample: Sample) -> Self {
        let negatives = sample.others().into_iter().map(str::to_string).collect();
        Self {
            success: true,
            seed,
            positives: sample.positives,
            negatives,
            instances: sample.instances,
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(seed: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            seed,
            positives: Vec::new(),
            negatives: Vec::new(),
            instances: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The sample command implementation.
pub struct SampleCommand {
    config: Config,
}

impl SampleCommand {
    /// Create a new sample command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Sample instances around `positives`.
    pub fn run(&self, positives: &[String], options: &SampleOptions) -> SampleOutput {
        let sampler = ExampleSampler::new(
            options.instances.unwrap_or(self.config.sampling.instances),
            options.seed.unwrap_or(self.config.sampling.seed),
        );

        match self.records(options) {
            Ok(records) => SampleOutput::success(sampler.seed(), sampler.sample(positives, &records)),
            Err(e) => SampleOutput::failure(sampler.seed(), e.to_string()),
        }
    }

    fn records(&self, options: &SampleOptions) -> Result<Vec<String>> {
        let path = options
            .records
            .as_ref()
            .or(self.config.sampling.records_path.as_ref())
            .ok_or_else(|| {
                ClientError::config("no record list given and sampling.records_path is not set")
            })?;
        load_records(path)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &SampleOutput, options: &SampleOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else if output.success {
            output.instances.join(" ")
        } else {
            format!(
                "Sampling failed: {}",
                output.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn positives() -> Vec<String> {
        ["p1", "p2", "p3", "p4"].iter().map(|s| s.to_string()).collect()
    }

    fn records_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("records.txt");
        let body: Vec<String> = (0..40).map(|i| format!("record/{}", i)).collect();
        fs::write(&path, body.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_sample_from_configured_records() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.sampling.records_path = Some(records_file(&dir));
        config.sampling.seed = 9;
        let cmd = SampleCommand::new(config);

        let output = cmd.run(&positives(), &SampleOptions::default());

        assert!(output.success);
        assert_eq!(output.seed, 9);
        assert_eq!(output.positives, vec!["p4", "p3", "p2"]);
        assert_eq!(
            output.negatives.len() + output.positives.len(),
            output.instances.len()
        );
    }

    #[test]
    fn test_options_override_config() {
        let dir = TempDir::new().unwrap();
        let cmd = SampleCommand::new(Config::default());
        let options = SampleOptions {
            instances: Some(3),
            seed: Some(1),
            records: Some(records_file(&dir)),
            ..Default::default()
        };

        let output = cmd.run(&positives(), &options);

        assert!(output.success);
        assert_eq!(output.positives, vec!["p4"]);
        assert!(output.instances.len() <= 3);
        assert_eq!(cmd.format_output(&output, &options), output.instances.join(" "));
    }

    #[test]
    fn test_sample_without_records_fails() {
        let cmd = SampleCommand::new(Config::default());
        let output = cmd.run(&positives(), &SampleOptions::default());

        assert!(!output.success);
        assert!(output.error.unwrap().contains("records_path"));
    }
}
