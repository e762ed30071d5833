// SPDX-License-Identifier: GPL-3.0-or-later

//! Assembles the analyzer command lines.
//!
//! Every analyzer invocation shares the same prefix: the executable, the build
//! path and the pass-through arguments. The `InvocationTemplate` holds this
//! prefix, and a concrete `Invocation` is made by appending one source file.

use crate::context::Context;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The flag to pass the build directory (where the compilation database is) to the analyzer.
pub const BUILD_PATH_FLAG: &str = "-p";
/// The flag to turn on the analyzer debug output.
pub const DEBUG_FLAG: &str = "-debug";
/// The flag to query the analyzer version. Used to check the analyzer is runnable.
pub const VERSION_FLAG: &str = "--version";

/// The immutable part of the analyzer command line.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationTemplate {
    executable: PathBuf,
    arguments: Vec<OsString>,
}

impl InvocationTemplate {
    /// Creates the template.
    ///
    /// The pass-through arguments are not interpreted, they are passed
    /// to the analyzer as they are.
    pub fn new<I, S>(executable: &Path, build_path: &Path, passthrough: I, debug: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut arguments = vec![OsString::from(BUILD_PATH_FLAG), build_path.as_os_str().to_owned()];
        arguments.extend(passthrough.into_iter().map(|argument| argument.as_ref().to_owned()));
        if debug {
            arguments.push(OsString::from(DEBUG_FLAG));
        }

        InvocationTemplate { executable: executable.to_path_buf(), arguments }
    }

    /// Makes the invocation for the given source file.
    pub fn for_file(&self, file: &Path) -> Invocation {
        let mut arguments = self.arguments.clone();
        arguments.push(file.as_os_str().to_owned());

        Invocation { executable: self.executable.clone(), arguments }
    }
}

/// A concrete analyzer command line.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub executable: PathBuf,
    /// The arguments without the program name.
    pub arguments: Vec<OsString>,
}

impl From<&Invocation> for Command {
    fn from(val: &Invocation) -> Self {
        let mut command = Command::new(&val.executable);
        command.args(&val.arguments);
        command
    }
}

/// Prints the command line in a shell-quoted form.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = std::iter::once(self.executable.as_os_str())
            .chain(self.arguments.iter().map(OsString::as_os_str))
            .map(|word| word.to_string_lossy().into_owned())
            .collect();
        write!(f, "{}", shell_words::join(words))
    }
}

/// Finds the analyzer executable.
///
/// - A path with directory components is used as it is (relative paths are
///   taken from the working directory).
/// - A bare executable name gets the platform executable suffix, and it is
///   looked up next to the current executable, then in the `PATH`.
///
/// When the lookup fails, it returns the candidate next to the current
/// executable. That will fail the availability check with a proper message.
pub fn resolve_analyzer(context: &Context, analyzer: &Path) -> PathBuf {
    if analyzer.is_absolute() {
        return analyzer.to_path_buf();
    }
    if analyzer.components().count() > 1 {
        return context.current_directory.join(analyzer);
    }

    let name = with_executable_suffix(analyzer);
    let installed = context.install_directory().join(&name);
    if installed.is_file() {
        log::debug!("Analyzer found in install directory: {}", installed.display());
        return installed;
    }

    match which::which_in(&name, context.path.as_ref(), &context.current_directory) {
        Ok(found) => {
            log::debug!("Analyzer found in PATH: {}", found.display());
            found
        }
        Err(error) => {
            log::debug!("Analyzer '{}' not found in PATH: {error}", name.display());
            installed
        }
    }
}

fn with_executable_suffix(name: &Path) -> PathBuf {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || name.to_string_lossy().ends_with(suffix) {
        name.to_path_buf()
    } else {
        let mut value = name.as_os_str().to_owned();
        value.push(suffix);
        PathBuf::from(value)
    }
}
