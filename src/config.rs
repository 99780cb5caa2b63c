//! Configuration loading for dlsession.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.dlsession/config.toml`)
//! 3. User config (`~/.dlsession/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. With no config at all the client talks to
//! a local service on the standard port and always fetches a fresh
//! descriptor.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::CallTimeouts;
use crate::core::{AlgorithmChoice, ReasonerChoice, ServiceEndpoint};
use crate::error::{ClientError, Result};
use crate::sampling::{ExampleSampler, DEFAULT_INSTANCES};

/// Default service address.
pub const DEFAULT_ADDRESS: &str = "http://localhost:8181/services";

/// Main configuration struct for dlsession.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Service endpoint and descriptor handling.
    pub endpoint: EndpointConfig,
    /// Component choices used when the caller names none.
    pub defaults: DefaultsConfig,
    /// Per-operation timeouts.
    pub timeouts: TimeoutsConfig,
    /// Example sampling.
    pub sampling: SamplingConfig,
}

/// Service endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Service address (`http` or `https`).
    pub address: String,
    /// Whether fetched descriptors are cached on disk.
    pub descriptor_cache: bool,
    /// Always refetch the descriptor, discarding any cached copy.
    pub force_refresh: bool,
    /// Remote operation releasing an abandoned session, if the service
    /// offers one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_operation: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            descriptor_cache: false,
            force_refresh: true,
            release_operation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    pub reasoner: String,
    pub algorithm: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            reasoner: ReasonerChoice::DIG.to_string(),
            algorithm: AlgorithmChoice::REFINEMENT.to_string(),
        }
    }
}

/// Timeouts in seconds. Zero means no ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Connection establishment.
    pub connect_secs: u64,
    /// Session creation and configuration calls.
    pub call_secs: u64,
    /// `init`; reasoner setup on large ontologies can take a long time.
    pub init_secs: u64,
    /// `learn`, the refinement search itself.
    pub learn_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            call_secs: 60,
            init_secs: 3600,
            learn_secs: 3600,
        }
    }
}

fn ceiling(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Option<Duration> {
        ceiling(self.connect_secs)
    }

    /// Per-operation ceilings for the client.
    pub fn call_timeouts(&self) -> CallTimeouts {
        CallTimeouts {
            call: ceiling(self.call_secs),
            init: ceiling(self.init_secs),
            learn: ceiling(self.learn_secs),
        }
    }
}

/// Example sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Record list to draw random instances from, one per line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_path: Option<PathBuf>,
    /// Instances per sample.
    pub instances: usize,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            records_path: None,
            instances: DEFAULT_INSTANCES,
            seed: 0,
        }
    }
}

impl SamplingConfig {
    pub fn sampler(&self) -> ExampleSampler {
        ExampleSampler::new(self.instances, self.seed)
    }
}

/// One config file as written: only the keys it actually sets.
///
/// Layers are applied on top of each other, so a key present in a later
/// layer always wins, even when it restates the default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigLayer {
    pub endpoint: EndpointLayer,
    pub defaults: DefaultsLayer,
    pub timeouts: TimeoutsLayer,
    pub sampling: SamplingLayer,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointLayer {
    pub address: Option<String>,
    pub descriptor_cache: Option<bool>,
    pub force_refresh: Option<bool>,
    pub release_operation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsLayer {
    pub reasoner: Option<String>,
    pub algorithm: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutsLayer {
    pub connect_secs: Option<u64>,
    pub call_secs: Option<u64>,
    pub init_secs: Option<u64>,
    pub learn_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingLayer {
    pub records_path: Option<PathBuf>,
    pub instances: Option<usize>,
    pub seed: Option<u64>,
}

impl ConfigLayer {
    /// Parse a single config file.
    pub fn load(path: &Path) -> Result<ConfigLayer> {
        let content = fs::read_to_string(path).map_err(|e| ClientError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| ClientError::config(e.to_string()))
    }
}

/// Replace `target` when the layer sets a value.
fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration relative to a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    fn load_user_config() -> Option<ConfigLayer> {
        let home = dlsession_home()?;
        Self::load_layer(&home.join("config.toml"))
    }

    fn load_project_config(cwd: &Path) -> Option<ConfigLayer> {
        Self::load_layer(&cwd.join(".dlsession").join("config.toml"))
    }

    /// A missing file is silently skipped; an unreadable one is skipped
    /// with a warning.
    fn load_layer(path: &Path) -> Option<ConfigLayer> {
        if !path.exists() {
            return None;
        }
        match ConfigLayer::load(path) {
            Ok(layer) => Some(layer),
            Err(e) => {
                tracing::warn!("ignoring config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load a single config file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Ok(Config::default().merge(ConfigLayer::load(path)?))
    }

    fn apply_env_overrides(&mut self) {
        // DLSESSION_ENDPOINT
        if let Ok(val) = env::var("DLSESSION_ENDPOINT") {
            match ServiceEndpoint::new(&val, self.endpoint.descriptor_cache) {
                Ok(_) => self.endpoint.address = val,
                Err(e) => tracing::warn!(
                    "Invalid DLSESSION_ENDPOINT value '{}': {}. Using '{}'.",
                    val,
                    e,
                    self.endpoint.address
                ),
            }
        }

        // DLSESSION_REASONER
        if let Ok(val) = env::var("DLSESSION_REASONER") {
            if val.trim().is_empty() {
                tracing::warn!(
                    "DLSESSION_REASONER is empty. Using '{}'.",
                    self.defaults.reasoner
                );
            } else {
                self.defaults.reasoner = val;
            }
        }

        // DLSESSION_ALGORITHM
        if let Ok(val) = env::var("DLSESSION_ALGORITHM") {
            if val.trim().is_empty() {
                tracing::warn!(
                    "DLSESSION_ALGORITHM is empty. Using '{}'.",
                    self.defaults.algorithm
                );
            } else {
                self.defaults.algorithm = val;
            }
        }

        // DLSESSION_DESCRIPTOR_CACHE
        if let Ok(val) = env::var("DLSESSION_DESCRIPTOR_CACHE") {
            self.endpoint.descriptor_cache = val == "true" || val == "1";
        }

        // DLSESSION_FORCE_REFRESH
        if let Ok(val) = env::var("DLSESSION_FORCE_REFRESH") {
            self.endpoint.force_refresh = val == "true" || val == "1";
        }

        override_secs("DLSESSION_CALL_TIMEOUT_SECS", &mut self.timeouts.call_secs);
        override_secs("DLSESSION_INIT_TIMEOUT_SECS", &mut self.timeouts.init_secs);
        override_secs("DLSESSION_LEARN_TIMEOUT_SECS", &mut self.timeouts.learn_secs);
    }

    /// Apply a layer on top of this config. Every key the layer sets
    /// replaces the current value.
    fn merge(mut self, layer: ConfigLayer) -> Self {
        let ConfigLayer {
            endpoint,
            defaults,
            timeouts,
            sampling,
        } = layer;

        set(&mut self.endpoint.address, endpoint.address);
        set(&mut self.endpoint.descriptor_cache, endpoint.descriptor_cache);
        set(&mut self.endpoint.force_refresh, endpoint.force_refresh);
        if endpoint.release_operation.is_some() {
            self.endpoint.release_operation = endpoint.release_operation;
        }

        set(&mut self.defaults.reasoner, defaults.reasoner);
        set(&mut self.defaults.algorithm, defaults.algorithm);

        set(&mut self.timeouts.connect_secs, timeouts.connect_secs);
        set(&mut self.timeouts.call_secs, timeouts.call_secs);
        set(&mut self.timeouts.init_secs, timeouts.init_secs);
        set(&mut self.timeouts.learn_secs, timeouts.learn_secs);

        if sampling.records_path.is_some() {
            self.sampling.records_path = sampling.records_path;
        }
        set(&mut self.sampling.instances, sampling.instances);
        set(&mut self.sampling.seed, sampling.seed);

        self
    }

    /// The configured endpoint, validated.
    pub fn service_endpoint(&self) -> Result<ServiceEndpoint> {
        ServiceEndpoint::new(&self.endpoint.address, self.endpoint.descriptor_cache)
    }

    pub fn reasoner(&self) -> ReasonerChoice {
        ReasonerChoice::new(self.defaults.reasoner.as_str())
    }

    pub fn algorithm(&self) -> AlgorithmChoice {
        AlgorithmChoice::new(self.defaults.algorithm.as_str())
    }

    /// Serialize as TOML, for display.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ClientError::config(e.to_string()))
    }
}

/// Apply a seconds override, keeping the current value on a parse error.
fn override_secs(var: &str, target: &mut u64) {
    if let Ok(val) = env::var(var) {
        match val.parse::<u64>() {
            Ok(n) => *target = n,
            Err(_) => tracing::warn!(
                "Invalid {} value '{}'. Expected a whole number of seconds. Using '{}'.",
                var,
                val,
                target
            ),
        }
    }
}

/// Get the dlsession home directory.
///
/// Uses `DLSESSION_HOME` if set, otherwise `~/.dlsession`.
pub fn dlsession_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("DLSESSION_HOME") {
        if home.is_empty() {
            tracing::warn!("DLSESSION_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("DLSESSION_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    dirs::home_dir().map(|home| home.join(".dlsession"))
}

/// Get the descriptor cache directory.
///
/// Returns `<dlsession_home>/descriptors/`.
pub fn descriptor_cache_dir() -> Option<PathBuf> {
    dlsession_home().map(|h| h.join("descriptors"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "DLSESSION_HOME",
        "DLSESSION_ENDPOINT",
        "DLSESSION_REASONER",
        "DLSESSION_ALGORITHM",
        "DLSESSION_DESCRIPTOR_CACHE",
        "DLSESSION_FORCE_REFRESH",
        "DLSESSION_CALL_TIMEOUT_SECS",
        "DLSESSION_INIT_TIMEOUT_SECS",
        "DLSESSION_LEARN_TIMEOUT_SECS",
    ];

    /// Clear every override and point the home directory at `home`.
    fn isolate(home: &Path) {
        for var in ENV_VARS {
            env::remove_var(var);
        }
        env::set_var("DLSESSION_HOME", home);
    }

    fn write_config(dir: &Path, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.endpoint.address, DEFAULT_ADDRESS);
        assert!(!config.endpoint.descriptor_cache);
        assert!(config.endpoint.force_refresh);
        assert!(config.endpoint.release_operation.is_none());

        assert_eq!(config.defaults.reasoner, "dig");
        assert_eq!(config.defaults.algorithm, "refinement");

        assert_eq!(config.timeouts.connect_secs, 10);
        assert_eq!(config.timeouts.call_secs, 60);
        assert_eq!(config.timeouts.init_secs, 3600);
        assert_eq!(config.timeouts.learn_secs, 3600);

        assert_eq!(config.sampling.instances, 10);
        assert_eq!(config.sampling.seed, 0);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [endpoint]
            address = "https://learner.example.org/services"

            [timeouts]
            init_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint.address, "https://learner.example.org/services");
        assert!(config.endpoint.force_refresh);
        assert_eq!(config.timeouts.init_secs, 0);
        assert_eq!(config.timeouts.call_secs, 60);
    }

    #[test]
    fn test_zero_timeout_means_no_ceiling() {
        let timeouts = TimeoutsConfig {
            connect_secs: 0,
            call_secs: 5,
            init_secs: 0,
            learn_secs: 120,
        };
        let call = timeouts.call_timeouts();

        assert_eq!(timeouts.connect(), None);
        assert_eq!(call.call, Some(Duration::from_secs(5)));
        assert_eq!(call.init, None);
        assert_eq!(call.learn, Some(Duration::from_secs(120)));
    }

    fn layer(content: &str) -> ConfigLayer {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_merge_applies_keys_the_layer_sets() {
        let merged = Config::default().merge(layer(
            "[endpoint]\ndescriptor_cache = true\n[defaults]\nalgorithm = \"celoe\"\n[sampling]\nseed = 7\n",
        ));

        assert!(merged.endpoint.descriptor_cache);
        assert_eq!(merged.defaults.algorithm, "celoe");
        assert_eq!(merged.defaults.reasoner, "dig");
        assert_eq!(merged.sampling.seed, 7);
    }

    #[test]
    fn test_merge_keeps_base_for_absent_keys() {
        let mut base = Config::default();
        base.timeouts.call_secs = 15;
        base.endpoint.release_operation = Some("releaseSession".to_string());

        let merged = base.merge(layer("[timeouts]\ninit_secs = 0\n"));

        assert_eq!(merged.timeouts.call_secs, 15);
        assert_eq!(merged.timeouts.init_secs, 0);
        assert_eq!(
            merged.endpoint.release_operation.as_deref(),
            Some("releaseSession")
        );
    }

    #[test]
    fn test_merge_can_restore_default_values() {
        let mut base = Config::default();
        base.timeouts.call_secs = 30;
        base.endpoint.descriptor_cache = true;
        base.defaults.reasoner = "fastInstanceChecker".to_string();

        let merged = base.merge(layer(
            "[endpoint]\ndescriptor_cache = false\n[defaults]\nreasoner = \"dig\"\n[timeouts]\ncall_secs = 60\n",
        ));

        assert_eq!(merged, Config::default());
    }

    #[test]
    fn test_load_from_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sampling]\ninstances = 4\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();

        assert_eq!(config.sampling.instances, 4);
        assert_eq!(config.timeouts, TimeoutsConfig::default());
    }

    #[test]
    fn test_load_from_file_rejects_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "endpoint = [").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ClientError::Config { .. }));
    }

    #[test]
    #[serial]
    fn test_project_config_overrides_user_config() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        isolate(home.path());

        write_config(
            home.path(),
            "[defaults]\nreasoner = \"fastInstanceChecker\"\n[timeouts]\ncall_secs = 30\n",
        );
        write_config(
            &project.path().join(".dlsession"),
            "[timeouts]\ncall_secs = 90\n",
        );

        let config = Config::load_from_cwd(project.path());

        assert_eq!(config.defaults.reasoner, "fastInstanceChecker");
        assert_eq!(config.timeouts.call_secs, 90);

        env::remove_var("DLSESSION_HOME");
    }

    #[test]
    #[serial]
    fn test_project_config_restores_default_over_user_config() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        isolate(home.path());

        write_config(
            home.path(),
            "[endpoint]\ndescriptor_cache = true\n[timeouts]\ncall_secs = 30\n",
        );
        write_config(
            &project.path().join(".dlsession"),
            "[endpoint]\ndescriptor_cache = false\n[timeouts]\ncall_secs = 60\n",
        );

        let config = Config::load_from_cwd(project.path());

        assert!(!config.endpoint.descriptor_cache);
        assert_eq!(config.timeouts.call_secs, 60);

        env::remove_var("DLSESSION_HOME");
    }

    #[test]
    #[serial]
    fn test_unreadable_layer_is_skipped() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        isolate(home.path());
        write_config(home.path(), "this is not toml");

        let config = Config::load_from_cwd(project.path());
        assert_eq!(config, Config::default());

        env::remove_var("DLSESSION_HOME");
    }

    #[test]
    #[serial]
    fn test_env_overrides_win() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        isolate(home.path());
        write_config(home.path(), "[endpoint]\nforce_refresh = true\n");

        env::set_var("DLSESSION_ENDPOINT", "https://learner.example.org/ws");
        env::set_var("DLSESSION_ALGORITHM", "celoe");
        env::set_var("DLSESSION_DESCRIPTOR_CACHE", "1");
        env::set_var("DLSESSION_FORCE_REFRESH", "false");
        env::set_var("DLSESSION_INIT_TIMEOUT_SECS", "0");

        let config = Config::load_from_cwd(project.path());

        assert_eq!(config.endpoint.address, "https://learner.example.org/ws");
        assert_eq!(config.defaults.algorithm, "celoe");
        assert!(config.endpoint.descriptor_cache);
        assert!(!config.endpoint.force_refresh);
        assert_eq!(config.timeouts.call_timeouts().init, None);

        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_keep_previous() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        isolate(home.path());

        env::set_var("DLSESSION_ENDPOINT", "ftp://learner.example.org");
        env::set_var("DLSESSION_CALL_TIMEOUT_SECS", "soon");
        env::set_var("DLSESSION_REASONER", "  ");

        let config = Config::load_from_cwd(project.path());

        assert_eq!(config.endpoint.address, DEFAULT_ADDRESS);
        assert_eq!(config.timeouts.call_secs, 60);
        assert_eq!(config.defaults.reasoner, "dig");

        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_dlsession_home_from_env() {
        let home = TempDir::new().unwrap();
        env::set_var("DLSESSION_HOME", home.path());

        assert_eq!(dlsession_home(), Some(home.path().to_path_buf()));
        assert_eq!(
            descriptor_cache_dir(),
            Some(home.path().join("descriptors"))
        );

        env::remove_var("DLSESSION_HOME");
    }

    #[test]
    fn test_service_endpoint_validates_address() {
        let mut config = Config::default();
        assert!(config.service_endpoint().is_ok());

        config.endpoint.address = "not a url".to_string();
        assert!(config.service_endpoint().is_err());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = Config::default();
        config.sampling.records_path = Some(PathBuf::from("/data/records.txt"));
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
