// SPDX-License-Identifier: GPL-3.0-or-later

//! Controls the run of the application.
//!
//! The run has two phases. The configuration phase merges the command line
//! arguments with the configuration file, and prepares every component.
//! The run phase verifies the analyzer before it reads the compilation
//! database and dispatches the analyzer runs. While the analyzers are
//! running, it watches for termination signals.

use crate::args::Arguments;
use crate::config;
use crate::context::Context;
use crate::database::{self, DatabaseError};
use crate::dispatch::{
    self, CancelToken, DispatchError, Dispatcher, OutputSink, ProcessExecutor, Running, Summary,
};
use crate::filter::{FilterError, SourceFilter};
use crate::invocation::{self, InvocationTemplate, VERSION_FLAG};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Exit code when the analyzer can't be executed.
pub const EXIT_ANALYZER_UNAVAILABLE: u8 = 3;
/// Exit code when the compilation database is not found.
pub const EXIT_CONFIG_NOT_FOUND: u8 = 4;

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The configured application, ready to run.
#[derive(Debug)]
pub struct Application {
    analyzer: PathBuf,
    build_path: PathBuf,
    filter: SourceFilter,
    template: InvocationTemplate,
    jobs: Option<usize>,
    verbose: bool,
    output: Option<PathBuf>,
}

impl Application {
    /// Configure the application based on the command line arguments and the configuration.
    ///
    /// Command line values take precedence over the configuration. The pattern
    /// and analyzer argument lists are concatenated: configuration first.
    pub fn configure(context: Context, arguments: Arguments, config: config::Main) -> Result<Self, RunError> {
        let analyzer_name = arguments.analyzer.map(PathBuf::from).unwrap_or(config.analyzer.path);
        let analyzer = invocation::resolve_analyzer(&context, &analyzer_name);
        log::debug!("Analyzer: {}", analyzer.display());

        let build_path = context.current_directory.join(&arguments.build_path);

        let include = config.sources.include.iter().chain(arguments.include.iter());
        let exclude = config.sources.exclude.iter().chain(arguments.exclude.iter());
        let filter = SourceFilter::new(include, exclude)?;

        let passthrough = config.analyzer.arguments.iter().chain(arguments.analyzer_arguments.iter());
        let template = InvocationTemplate::new(&analyzer, &build_path, passthrough, arguments.debug);

        let output = arguments.output.map(|file| context.current_directory.join(file));

        Ok(Self {
            analyzer,
            build_path,
            filter,
            template,
            jobs: arguments.jobs.or(config.jobs),
            verbose: arguments.verbose,
            output,
        })
    }

    /// It actually runs the analysis.
    ///
    /// Failures of the analyzer runs are reported in the output, and do not
    /// make the run fail. Cancellation by a signal does not return.
    pub fn run(self) -> ExitCode {
        match self.execute() {
            Ok(summary) => {
                log::info!("{summary}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                log::error!("analyze-build: {error}");
                ExitCode::from(error.exit_code())
            }
        }
    }

    fn execute(self) -> Result<Summary, RunError> {
        verify_analyzer(&self.analyzer)?;

        let files = database::load(&self.build_path)?;
        let files = self.filter.apply(files);
        log::info!("{} files selected for analysis", files.len());

        let signaled = register_signals()?;

        let sink = match &self.output {
            Some(path) => {
                OutputSink::file(path).map_err(|source| RunError::Output { path: path.clone(), source })?
            }
            None => OutputSink::stdout(),
        };
        let temporary = sink.temporary_path();

        let dispatcher = Dispatcher::new(
            Arc::new(ProcessExecutor),
            self.template,
            dispatch::jobs_or_default(self.jobs),
            self.verbose,
        );
        log::debug!("Running the analysis with {} workers", dispatcher.jobs());

        let cancel = CancelToken::new();
        let running = dispatcher.start(files, sink, cancel.clone())?;

        if let Some(signal) = wait_or_signal(&running, &signaled) {
            cancel_run(running, &cancel, temporary.as_deref(), signal);
        }

        let (sink, summary) = running.wait()?;
        if let Some(signal) = pending_signal(&signaled) {
            eprintln!("Cancelled by signal {signal}");
            discard_and_terminate(temporary.as_deref(), signal);
        }
        sink.finish().map_err(|source| RunError::Output {
            path: self.output.clone().unwrap_or_else(|| PathBuf::from("<stdout>")),
            source,
        })?;
        // The handlers stay installed until the process exits.
        if let Some(signal) = pending_signal(&signaled) {
            eprintln!("Cancelled by signal {signal}");
            terminate(signal);
        }

        Ok(summary)
    }
}

/// Runs the analyzer with the version flag, to check that it's usable.
fn verify_analyzer(analyzer: &Path) -> Result<(), RunError> {
    log::debug!("Checking analyzer: {} {VERSION_FLAG}", analyzer.display());

    let status = Command::new(analyzer)
        .arg(VERSION_FLAG)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|error| RunError::AnalyzerUnavailable {
            analyzer: analyzer.to_path_buf(),
            reason: error.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(RunError::AnalyzerUnavailable {
            analyzer: analyzer.to_path_buf(),
            reason: format!("version check exited with {status}"),
        })
    }
}

fn register_signals() -> Result<Arc<AtomicUsize>, RunError> {
    let signaled = Arc::new(AtomicUsize::new(0));
    for signal in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register_usize(*signal, Arc::clone(&signaled), *signal as usize)
            .map_err(RunError::SignalRegistration)?;
    }
    Ok(signaled)
}

/// Waits for the analysis to finish. Returns the signal number if a
/// termination signal arrived before that.
fn wait_or_signal<W>(running: &Running<W>, signaled: &AtomicUsize) -> Option<usize> {
    loop {
        if let Some(signal) = pending_signal(signaled) {
            return Some(signal);
        }
        if running.is_finished() {
            return None;
        }
        thread::sleep(SIGNAL_POLL_INTERVAL);
    }
}

/// The number of the termination signal received so far, if any.
fn pending_signal(signaled: &AtomicUsize) -> Option<usize> {
    match signaled.load(Ordering::SeqCst) {
        0 => None,
        signal => Some(signal),
    }
}

/// Stops every analyzer process, then terminates the process as the signal
/// would have done. The temporary report file is removed before that.
fn cancel_run<W>(running: Running<W>, cancel: &CancelToken, temporary: Option<&Path>, signal: usize) -> ! {
    eprintln!("Cancelled by signal {signal}");
    log::debug!("Stopping the analyzer processes");

    cancel.cancel();
    running.abandon();
    discard_and_terminate(temporary, signal)
}

fn discard_and_terminate(temporary: Option<&Path>, signal: usize) -> ! {
    if let Some(path) = temporary {
        dispatch::remove_temporary(path);
    }
    terminate(signal)
}

fn terminate(signal: usize) -> ! {
    let code = i32::try_from(signal).unwrap_or(0);
    #[cfg(unix)]
    if let Err(error) = signal_hook::low_level::emulate_default_handler(code) {
        log::warn!("Failed to terminate by signal {signal}: {error}");
    }
    std::process::exit(128 + code)
}

/// Errors of the application run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Analyzer '{analyzer}' is not available: {reason}", analyzer = analyzer.display())]
    AnalyzerUnavailable { analyzer: PathBuf, reason: String },
    #[error("No compilation database found in '{build_path}'", build_path = build_path.display())]
    ConfigNotFound { build_path: PathBuf },
    #[error(transparent)]
    Database(DatabaseError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("Failed to register signal handler: {0}")]
    SignalRegistration(#[source] io::Error),
    #[error("Failed to write report '{path}': {source}", path = path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl RunError {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::AnalyzerUnavailable { .. } => EXIT_ANALYZER_UNAVAILABLE,
            RunError::ConfigNotFound { .. } => EXIT_CONFIG_NOT_FOUND,
            _ => 1,
        }
    }
}

impl From<DatabaseError> for RunError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { build_path } => RunError::ConfigNotFound { build_path },
            other => RunError::Database(other),
        }
    }
}
