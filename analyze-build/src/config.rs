// SPDX-License-Identifier: GPL-3.0-or-later

//! This module defines the configuration of the application.
//!
//! The configuration is either loaded from a file or used with default
//! values, which are defined in the code. The command line arguments
//! are merged on top of it.
//!
//! The configuration file syntax is based on the YAML format.
//! The default configuration file name is `analyze-build.yml`.
//!
//! The configuration file location is searched in the following order:
//! 1. The current working directory
//! 2. The local configuration directory of the user
//! 3. The configuration directory of the user
//! 4. The local configuration directory of the application
//! 5. The configuration directory of the application
//!
//! ```yaml
//! schema: 1.0
//!
//! analyzer:
//!   path: clang-tidy
//!   arguments: ["-quiet", "-checks=-*,clang-analyzer-*"]
//!
//! jobs: 4
//!
//! sources:
//!   include:
//!     - "/opt/project/src/"
//!   exclude:
//!     - "/third_party/"
//!     - "\\.pb\\.cc$"
//! ```

// Re-Export the types and the loader module content.
pub use loader::{ConfigError, Loader};
pub use types::*;
pub use validation::Validator;

/// The name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "analyze-build.yml";

mod types {
    use serde::Deserialize;
    use std::fmt;
    use std::path::PathBuf;

    pub(super) const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

    /// The default analyzer executable name.
    pub const DEFAULT_ANALYZER: &str = "clang-tidy";

    /// Represents the application configuration.
    #[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
    pub struct Main {
        #[serde(deserialize_with = "validate_schema_version")]
        pub schema: String,
        #[serde(default)]
        pub analyzer: Analyzer,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub jobs: Option<usize>,
        #[serde(default)]
        pub sources: Sources,
    }

    impl Default for Main {
        fn default() -> Self {
            Self {
                schema: String::from(SUPPORTED_SCHEMA_VERSION),
                analyzer: Analyzer::default(),
                jobs: None,
                sources: Sources::default(),
            }
        }
    }

    impl fmt::Display for Main {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            writeln!(f, "Configuration:")?;
            let yaml_string = serde_yml::to_string(self).map_err(|_| fmt::Error)?;
            for line in yaml_string.lines() {
                writeln!(f, "{line}")?;
            }
            Ok(())
        }
    }

    /// The analyzer executable and the arguments passed to every invocation.
    #[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
    pub struct Analyzer {
        #[serde(default = "default_analyzer")]
        pub path: PathBuf,
        #[serde(default)]
        pub arguments: Vec<String>,
    }

    impl Default for Analyzer {
        fn default() -> Self {
            Self { path: default_analyzer(), arguments: vec![] }
        }
    }

    /// Regular expressions to select the source files to analyze.
    ///
    /// A file is analyzed if it matches any of the `include` patterns (or there
    /// are no `include` patterns), and it does not match any `exclude` pattern.
    #[derive(Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
    pub struct Sources {
        #[serde(default)]
        pub include: Vec<String>,
        #[serde(default)]
        pub exclude: Vec<String>,
    }

    fn default_analyzer() -> PathBuf {
        PathBuf::from(DEFAULT_ANALYZER)
    }

    // Custom deserialization function to validate the schema version
    fn validate_schema_version<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let schema: String = Deserialize::deserialize(deserializer)?;
        if schema != SUPPORTED_SCHEMA_VERSION {
            use serde::de::Error;
            Err(Error::custom(format!(
                "Unsupported schema version: {schema}. Expected: {SUPPORTED_SCHEMA_VERSION}"
            )))
        } else {
            Ok(schema)
        }
    }
}

pub mod validation {

    use super::types::*;
    use std::collections::HashSet;
    use thiserror::Error;

    /// Trait for validating configuration objects
    pub trait Validator<T> {
        type Error: std::error::Error;

        fn validate(config: &T) -> Result<(), Self::Error>;
    }

    /// Validation errors for configuration
    #[derive(Debug, Error)]
    pub enum ValidationError {
        #[error("Empty string value for field '{field}'")]
        EmptyString { field: String },
        #[error("Duplicate {field} entry at: {idx}")]
        DuplicateEntry { field: &'static str, idx: usize },
        #[error("Multiple validation errors: {errors:?}")]
        Multiple { errors: Vec<ValidationError> },
    }

    /// Combinator for collecting and handling validation errors
    #[derive(Default)]
    struct ValidationCollector {
        errors: Vec<ValidationError>,
    }

    impl ValidationCollector {
        fn new() -> Self {
            Self { errors: Vec::new() }
        }

        fn add(&mut self, error: ValidationError) {
            self.errors.push(error);
        }

        fn add_result(&mut self, result: Result<(), ValidationError>) {
            if let Err(error) = result {
                match error {
                    ValidationError::Multiple { errors } => {
                        self.errors.extend(errors);
                    }
                    single_error => self.errors.push(single_error),
                }
            }
        }

        fn finish(self) -> Result<(), ValidationError> {
            let mut errors = self.errors;
            match errors.len() {
                0 => Ok(()),
                1 => Err(errors.remove(0)),
                _ => Err(ValidationError::Multiple { errors }),
            }
        }
    }

    impl Validator<Main> for Main {
        type Error = ValidationError;

        fn validate(config: &Main) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::new();

            collector.add_result(Analyzer::validate(&config.analyzer));
            collector.add_result(Sources::validate(&config.sources));

            collector.finish()
        }
    }

    impl Validator<Analyzer> for Analyzer {
        type Error = ValidationError;

        fn validate(config: &Analyzer) -> Result<(), Self::Error> {
            if config.path.as_os_str().is_empty() {
                return Err(ValidationError::EmptyString { field: "analyzer.path".to_string() });
            }
            Ok(())
        }
    }

    impl Validator<Sources> for Sources {
        type Error = ValidationError;

        fn validate(config: &Sources) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::new();

            for (field, patterns) in [("include", &config.include), ("exclude", &config.exclude)] {
                let mut already_seen = HashSet::new();
                for (idx, pattern) in patterns.iter().enumerate() {
                    if pattern.is_empty() {
                        collector.add(ValidationError::EmptyString { field: format!("sources.{field}[{idx}]") });
                    } else if !already_seen.insert(pattern) {
                        collector.add(ValidationError::DuplicateEntry { field, idx });
                    }
                }
            }

            collector.finish()
        }
    }

}

pub mod loader {
    use super::{CONFIG_FILE_NAME, Main, Validator};
    use crate::context::Context;
    use directories::{BaseDirs, ProjectDirs};
    use log::{debug, info};
    use std::fs::OpenOptions;
    use std::path::{Path, PathBuf};
    use thiserror::Error;

    pub struct Loader {}

    impl Loader {
        /// Loads the configuration from the specified file or the default locations.
        ///
        /// If the configuration file is specified, it will be used. Otherwise, the default locations
        /// will be searched for the configuration file. If the configuration file is not found, the
        /// default configuration will be returned.
        pub fn load(context: &Context, filename: &Option<String>) -> Result<Main, ConfigError> {
            if let Some(path) = filename {
                return Self::from_file(Path::new(path));
            }

            for location in Self::file_locations(context) {
                debug!("Checking configuration file: {}", location.display());
                if location.exists() {
                    return Self::from_file(location.as_path());
                }
            }
            debug!("Configuration file not found. Using the default configuration.");
            Ok(Main::default())
        }

        /// The default locations where the configuration file can be found.
        fn file_locations(context: &Context) -> Vec<PathBuf> {
            let mut locations = vec![context.current_directory.clone()];

            if let Some(base_dirs) = BaseDirs::new() {
                locations.push(base_dirs.config_local_dir().to_path_buf());
                locations.push(base_dirs.config_dir().to_path_buf());
            }
            if let Some(proj_dirs) = ProjectDirs::from("com.github", "rizsotto", "analyze-build") {
                locations.push(proj_dirs.config_local_dir().to_path_buf());
                locations.push(proj_dirs.config_dir().to_path_buf());
            }
            // filter out duplicate elements from the list
            locations.dedup();

            locations.iter().map(|p| p.join(CONFIG_FILE_NAME)).collect()
        }

        /// Loads the configuration from the specified file.
        pub fn from_file(path: &Path) -> Result<Main, ConfigError> {
            info!("Loading configuration file: {}", path.display());

            let reader = OpenOptions::new()
                .read(true)
                .open(path)
                .map_err(|source| ConfigError::FileAccess { path: path.to_path_buf(), source })?;

            let content: Main = Self::from_reader(reader)
                .map_err(|source| ConfigError::ParseError { path: path.to_path_buf(), source })?;

            Main::validate(&content)
                .map_err(|source| ConfigError::ValidationError { path: path.to_path_buf(), source })?;

            Ok(content)
        }

        /// Define the deserialization format of the config file.
        fn from_reader<R, T>(rdr: R) -> serde_yml::Result<T>
        where
            R: std::io::Read,
            T: serde::de::DeserializeOwned,
        {
            serde_yml::from_reader(rdr)
        }
    }

    /// Represents all possible configuration-related errors.
    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("Failed to access configuration file '{path}': {source}", path = path.display())]
        FileAccess {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("Failed to parse configuration from file '{path}': {source}", path = path.display())]
        ParseError {
            path: PathBuf,
            #[source]
            source: serde_yml::Error,
        },
        #[error("Configuration validation failed in '{path}': {source}", path = path.display())]
        ValidationError {
            path: PathBuf,
            #[source]
            source: crate::config::validation::ValidationError,
        },
    }

}
