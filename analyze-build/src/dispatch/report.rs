// SPDX-License-Identifier: GPL-3.0-or-later

//! Writes the captured analyzer outputs to the output stream.
//!
//! Each analyzer run is written as one block:
//!
//! ```text
//! [<completed>/<total>] <source file>
//! <the analyzer command line, in verbose mode>
//! <the captured output of the analyzer>
//! ```

use super::{Captured, ExecutionError};
use crate::invocation::Invocation;
use crossbeam_channel::Receiver;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// The outcome of one analyzer run, sent by the workers to the collector.
#[derive(Debug)]
pub struct Report {
    pub file: PathBuf,
    pub invocation: Invocation,
    pub result: Result<Captured, ExecutionError>,
}

/// Counters of the reported analyzer runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    /// Number of files reported.
    pub analyzed: usize,
    /// Number of analyzer runs which did not exit successfully.
    pub failed: usize,
    /// Number of analyzer runs which could not be started.
    pub not_started: usize,
}

impl Summary {
    fn record(&mut self, result: &Result<Captured, ExecutionError>) {
        self.analyzed += 1;
        match result {
            Ok(captured) if !captured.success() => self.failed += 1,
            Ok(_) => {}
            Err(_) => self.not_started += 1,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Analyzed {} files ({} analyzer runs failed, {} could not be started)",
            self.analyzed, self.failed, self.not_started
        )
    }
}

/// The single owner of the output stream.
pub struct Collector<W: Write> {
    output: W,
    total: usize,
    verbose: bool,
    summary: Summary,
}

impl<W: Write> Collector<W> {
    pub fn new(output: W, total: usize, verbose: bool) -> Self {
        Self { output, total, verbose, summary: Summary::default() }
    }

    /// Writes the reports as they arrive, until every sender is gone.
    ///
    /// Returns the output stream and the summary of the reports.
    pub fn consume(mut self, reports: Receiver<Report>) -> io::Result<(W, Summary)> {
        for report in reports {
            self.write(&report)?;
        }
        self.output.flush()?;
        Ok((self.output, self.summary))
    }

    fn write(&mut self, report: &Report) -> io::Result<()> {
        self.summary.record(&report.result);

        // The block is assembled first, to hand it over in one write call.
        let mut block = Vec::new();
        writeln!(block, "[{}/{}] {}", self.summary.analyzed, self.total, report.file.display())?;
        if self.verbose {
            writeln!(block, "{}", report.invocation)?;
        }
        match &report.result {
            Ok(captured) => block.extend_from_slice(&captured.output),
            Err(error) => writeln!(block, "error: {error}")?,
        }

        self.output.write_all(&block)?;
        self.output.flush()
    }
}

/// The destination of the analyzer outputs.
pub enum OutputSink {
    Stdout(io::Stdout),
    /// Writes into a temporary file next to the destination, which is renamed
    /// to the destination when the analysis is complete.
    File { writer: io::BufWriter<NamedTempFile>, destination: PathBuf },
}

impl OutputSink {
    pub fn stdout() -> Self {
        OutputSink::Stdout(io::stdout())
    }

    pub fn file(destination: &Path) -> io::Result<Self> {
        let directory = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temporary = tempfile::Builder::new()
            .prefix(".analyze-build-")
            .suffix(".tmp")
            .tempfile_in(directory)?;
        log::debug!("Temporary output file: {}", temporary.path().display());

        Ok(OutputSink::File {
            writer: io::BufWriter::new(temporary),
            destination: destination.to_path_buf(),
        })
    }

    /// The temporary file which has to be removed when the analysis is interrupted.
    pub fn temporary_path(&self) -> Option<PathBuf> {
        match self {
            OutputSink::Stdout(_) => None,
            OutputSink::File { writer, .. } => Some(writer.get_ref().path().to_path_buf()),
        }
    }

    /// Flushes the output and moves the temporary file to its final place.
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(mut stdout) => stdout.flush(),
            OutputSink::File { writer, destination } => {
                let temporary = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
                temporary.persist(&destination).map_err(|error| error.error)?;
                log::debug!("Output written to: {}", destination.display());
                Ok(())
            }
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(stdout) => stdout.write(buf),
            OutputSink::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(stdout) => stdout.flush(),
            OutputSink::File { writer, .. } => writer.flush(),
        }
    }
}

/// Removes a temporary file, ignoring when it's already gone.
pub(crate) fn remove_temporary(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Temporary file removed: {}", path.display()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => log::warn!("Failed to remove temporary file {}: {error}", path.display()),
    }
}
