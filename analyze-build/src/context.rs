// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Context as AnyhowContext, Result};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variables worth to show in the log.
const RELEVANT_KEYS: [&str; 2] = ["PATH", "RUST_LOG"];

/// Application context containing runtime environment information.
///
/// The context is captured once at startup. The later phases (configuration,
/// analyzer lookup) are working from this snapshot, instead of querying the
/// process state again.
#[derive(Debug, Clone)]
pub struct Context {
    /// Path to the current executable
    pub current_executable: PathBuf,
    /// Current working directory when the program was invoked
    pub current_directory: PathBuf,
    /// The value of the PATH environment variable (if it was set)
    pub path: Option<OsString>,
    /// Relevant environment variables for the log
    pub environment: Vec<(String, String)>,
}

impl Context {
    /// Capture the current application context.
    ///
    /// This function performs I/O operations to gather system state and should
    /// be called early in the application lifecycle, before any validation phase.
    pub fn capture() -> Result<Self> {
        let current_executable =
            env::current_exe().with_context(|| "Failed to get current executable path")?;

        let current_directory =
            env::current_dir().with_context(|| "Failed to get current working directory")?;

        let path = env::var_os("PATH");

        let environment = env::vars()
            .filter(|(key, _)| RELEVANT_KEYS.contains(&key.to_uppercase().as_str()))
            .collect();

        Ok(Context { current_executable, current_directory, path, environment })
    }

    /// The directory where the current executable is installed.
    ///
    /// Companion executables (like the analyzer) are looked up from here first.
    pub fn install_directory(&self) -> &Path {
        self.current_executable.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Application Context:")?;
        writeln!(f, "Current Executable: {}", self.current_executable.display())?;
        writeln!(f, "Current Directory: {}", self.current_directory.display())?;
        writeln!(f, "Install Directory: {}", self.install_directory().display())?;
        writeln!(f, "Relevant Environment Variables:")?;
        for (key, value) in &self.environment {
            writeln!(f, "  {key}={value}")?;
        }
        Ok(())
    }
}
