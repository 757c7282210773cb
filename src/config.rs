use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Immutable per-run configuration handed to every pipeline phase.
///
/// The original orchestration surface was a pile of environment variables;
/// here they are collapsed into one explicit struct so no phase reads
/// hidden shared state.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Requested build-variant tag, matched case-insensitively.
    pub variant_tag: String,

    /// Directory the build and test tools run in.
    pub build_dir: PathBuf,

    /// Per-run scratch root that tests must leave empty on success.
    pub scratch_dir: PathBuf,

    /// How many times a flaky test may be attempted. 1 disables retries.
    pub flaky_attempts: u32,

    /// Address of the flaky-test list service, e.g. "http://flaky.example:8080".
    pub flaky_server: Option<String>,

    /// Include tests labelled slow.
    pub slow_tests: bool,

    /// Run the secondary-language (Java) suite after the primary phase.
    pub java_tests: bool,

    /// Compress raw test logs after the run completes.
    pub compress_logs: bool,

    /// CI-triggered run: registers the artifact cleanup guard.
    pub is_ci: bool,

    /// Test-runner worker count; 0 means one per available CPU.
    pub parallelism: usize,
}

impl RunConfig {
    /// Directory where the test tool writes structured (JUnit XML) reports.
    pub fn reports_dir(&self) -> PathBuf {
        self.build_dir.join("test-reports")
    }

    /// Directory where the test tool writes raw captured output.
    pub fn logs_dir(&self) -> PathBuf {
        self.build_dir.join("test-logs")
    }

    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism > 0 {
            self.parallelism
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        }
    }
}

/// Configuration file structure for buildgate.
///
/// Lets users persist common run settings instead of repeating flags.
/// Loaded from the current directory or a specified path; CLI flags and
/// environment variables always win over file values.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Default run parameters
    #[serde(default)]
    pub run: RunSection,

    /// Flaky-retry parameters
    #[serde(default)]
    pub flaky: FlakySection,

    /// Output preferences
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSection {
    /// Default build-variant tag
    #[serde(default = "default_variant")]
    pub variant: String,

    /// Build working directory
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Scratch root for test state
    pub scratch_dir: Option<PathBuf>,

    /// Include tests labelled slow
    #[serde(default)]
    pub slow_tests: bool,

    /// Run the secondary-language suite
    #[serde(default)]
    pub java_tests: bool,

    /// Test-runner worker count; 0 = one per CPU
    #[serde(default)]
    pub parallelism: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlakySection {
    /// Flaky-test list server address
    pub server: Option<String>,

    /// Retry attempts for known-flaky tests
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct OutputSection {
    /// Pretty-print the JSON run summary
    #[serde(default)]
    pub pretty: bool,

    /// Compress raw test logs after the run
    #[serde(default)]
    pub compress_logs: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            build_dir: default_build_dir(),
            scratch_dir: None,
            slow_tests: false,
            java_tests: false,
            parallelism: 0,
        }
    }
}

impl Default for FlakySection {
    fn default() -> Self {
        Self {
            server: None,
            attempts: default_attempts(),
        }
    }
}

fn default_variant() -> String {
    "debug".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_attempts() -> u32 {
    1
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./buildgate.toml
    /// 3. ./buildgate.json
    /// 4. ./buildgate.yaml
    /// 5. ./buildgate.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "buildgate.toml",
            "buildgate.json",
            "buildgate.yaml",
            "buildgate.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        // No config file found, return defaults
        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.run.variant, "debug");
        assert_eq!(config.run.build_dir, PathBuf::from("build"));
        assert_eq!(config.flaky.attempts, 1);
        assert!(config.flaky.server.is_none());
        assert!(!config.output.compress_logs);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[run]
variant = "asan"
build-dir = "out"
slow-tests = true

[flaky]
server = "http://flaky.internal:8080"
attempts = 3

[output]
compress-logs = true
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.run.variant, "asan");
        assert_eq!(config.run.build_dir, PathBuf::from("out"));
        assert!(config.run.slow_tests);
        assert_eq!(
            config.flaky.server,
            Some("http://flaky.internal:8080".to_string())
        );
        assert_eq!(config.flaky.attempts, 3);
        assert!(config.output.compress_logs);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "run": {
    "variant": "tsan",
    "java-tests": true
  },
  "flaky": {
    "attempts": 2,
    "server": "http://flaky.json:1234"
  }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.run.variant, "tsan");
        assert!(config.run.java_tests);
        assert_eq!(config.flaky.attempts, 2);
    }

    #[test]
    fn test_load_nonexistent_config_is_error() {
        assert!(Config::load(Some(Path::new("nonexistent.toml"))).is_err());
    }

    #[test]
    fn test_run_config_dirs() {
        let config = RunConfig {
            variant_tag: "debug".to_string(),
            build_dir: PathBuf::from("/tmp/b"),
            scratch_dir: PathBuf::from("/tmp/s"),
            flaky_attempts: 1,
            flaky_server: None,
            slow_tests: false,
            java_tests: false,
            compress_logs: false,
            is_ci: false,
            parallelism: 4,
        };
        assert_eq!(config.reports_dir(), PathBuf::from("/tmp/b/test-reports"));
        assert_eq!(config.logs_dir(), PathBuf::from("/tmp/b/test-logs"));
        assert_eq!(config.effective_parallelism(), 4);
    }
}
