// SPDX-License-Identifier: GPL-3.0-or-later

//! This module reads the JSON compilation database of a project.
//!
//! A compilation database is a set of records which describe the compilation of the
//! source files in a given project. The definition of the JSON compilation database
//! files is done in the LLVM project
//! [documentation](https://clang.llvm.org/docs/JSONCompilationDatabase.html).
//!
//! This module only cares about which source files are in the database. The compiler
//! invocation of the entries (`command` or `arguments` fields) is not interpreted,
//! the analyzer reads the database itself.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

/// The file name of the compilation database inside the build directory.
pub const DATABASE_FILE_NAME: &str = "compile_commands.json";

/// Represents an entry of the compilation database.
///
/// Only the fields which are needed to locate the source file are read,
/// all the other fields are ignored.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Entry {
    /// The main translation unit source processed by this compilation step.
    pub file: PathBuf,
    /// The working directory of the compilation. The `file` field is either
    /// absolute or relative to this directory.
    pub directory: PathBuf,
}

impl Entry {
    pub fn new(file: impl Into<PathBuf>, directory: impl Into<PathBuf>) -> Self {
        Entry { file: file.into(), directory: directory.into() }
    }

    /// The path of the source file this entry is about.
    ///
    /// Absolute file names are taken as they are, relative ones are joined to
    /// the working directory of the entry. The join takes care of directories
    /// which are already terminated by a path separator. The `.` and `..`
    /// components are resolved.
    pub fn source_path(&self) -> PathBuf {
        // Joining an absolute path replaces the directory.
        normalize(&self.directory.join(&self.file))
    }
}

/// Resolves the `.` and `..` components of a path without touching the file system.
///
/// A `..` which would step above the root (or above the start of a relative
/// path) is kept.
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => result.push(component),
            },
            _ => result.push(component),
        }
    }
    result
}

/// Returns the location of the compilation database in the given build directory.
///
/// Fails with `DatabaseError::NotFound` when the build directory does not contain
/// the database file.
pub fn locate(build_path: &Path) -> Result<PathBuf, DatabaseError> {
    let candidate = build_path.join(DATABASE_FILE_NAME);
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(DatabaseError::NotFound { build_path: build_path.to_path_buf() })
    }
}

/// Reads all entries from the compilation database file.
pub fn read(path: &Path) -> Result<Vec<Entry>, DatabaseError> {
    let reader = fs::File::open(path)
        .map(io::BufReader::new)
        .map_err(|source| DatabaseError::FileAccess { path: path.to_path_buf(), source })?;

    serde_json::from_reader(reader)
        .map_err(|source| DatabaseError::Syntax { path: path.to_path_buf(), source })
}

/// Turns compilation database entries into the working set of source files.
///
/// Every path in the result is a regular file at the time of the call, and appears
/// only once. Paths are compared by their canonical form, so different spellings
/// of the same file (through `..` or symbolic links) count as one. The order of the
/// result follows the first occurrence of the file in the entries. Entries pointing
/// to non-existing files are dropped, because compilation databases might reference
/// generated or temporary files.
pub fn source_paths(entries: impl IntoIterator<Item = Entry>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for entry in entries {
        if entry.file.as_os_str().is_empty() {
            log::warn!("Entry without file name ignored (directory: {})", entry.directory.display());
            continue;
        }
        let path = entry.source_path();
        if !path.is_file() {
            log::debug!("Source file does not exist, ignored: {}", path.display());
            continue;
        }
        let identity = path.canonicalize().unwrap_or_else(|_| path.clone());
        if seen.insert(identity) {
            result.push(path);
        } else {
            log::debug!("Source file is already in the working set: {}", path.display());
        }
    }
    result
}

/// Locates and reads the compilation database of the build directory, and
/// returns the unique, existing source files from it.
pub fn load(build_path: &Path) -> Result<Vec<PathBuf>, DatabaseError> {
    let database = locate(build_path)?;
    log::info!("Reading compilation database: {}", database.display());

    let entries = read(&database)?;
    let count = entries.len();
    let paths = source_paths(entries);
    log::info!("Compilation database has {count} entries, {} unique source files", paths.len());

    Ok(paths)
}

/// Represents the possible errors of reading the compilation database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Compilation database not found in '{build_path}'", build_path = build_path.display())]
    NotFound { build_path: PathBuf },
    #[error("Failed to read compilation database '{path}': {source}", path = path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse compilation database '{path}': {source}", path = path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
