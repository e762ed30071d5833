// SPDX-License-Identifier: GPL-3.0-or-later

//! Runs the analyzer on every source file with a fixed size worker pool.
//!
//! The moving parts are:
//! - a feeder thread, which puts the source files into a bounded work queue
//!   in the order they were given,
//! - `jobs` number of worker threads, each takes a file from the queue, runs
//!   the analyzer on it and waits for its completion,
//! - a collector thread, which receives the captured output of the workers
//!   and writes them to the output stream.
//!
//! Since a worker runs only one analyzer at a time, the number of concurrently
//! running analyzer processes is never more than the number of workers.
//! The collector is the only owner of the output stream, so the output of
//! two analyzer runs is never interleaved. The order of the output blocks
//! follows the completion of the analyzer runs, not the order of the files.

mod executor;
mod report;

pub use executor::{ExecutionError, ProcessExecutor};
pub use report::{Collector, OutputSink, Report, Summary};
pub(crate) use report::remove_temporary;

use crate::invocation::{Invocation, InvocationTemplate};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// A shared flag to ask the running analyzers to stop.
///
/// Once cancelled it stays cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The result of a completed analyzer run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Captured {
    /// The exit code of the process. `None` when it was terminated by a signal.
    pub exit_code: Option<i32>,
    /// The standard output and standard error of the process in one stream.
    pub output: Vec<u8>,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one analyzer invocation to completion.
///
/// # Thread Safety
/// Implementers must be `Send + Sync`, because all workers share one instance.
#[cfg_attr(test, mockall::automock)]
pub trait Executor: Send + Sync {
    /// Executes the invocation and captures its output.
    ///
    /// This is a blocking operation. When the cancel token is set during the
    /// execution, the process shall be terminated and `ExecutionError::Cancelled`
    /// returned.
    fn execute(&self, invocation: &Invocation, cancel: &CancelToken) -> Result<Captured, ExecutionError>;
}

/// Returns the number of workers to use.
///
/// An explicit non-zero value is taken as it is, otherwise it is the number
/// of available processing units.
pub fn jobs_or_default(jobs: Option<usize>) -> NonZeroUsize {
    jobs.and_then(NonZeroUsize::new).unwrap_or_else(|| {
        thread::available_parallelism().unwrap_or_else(|error| {
            log::warn!("Failed to query available parallelism: {error}");
            NonZeroUsize::MIN
        })
    })
}

pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    template: Arc<InvocationTemplate>,
    jobs: NonZeroUsize,
    verbose: bool,
}

impl Dispatcher {
    pub fn new(
        executor: Arc<dyn Executor>,
        template: InvocationTemplate,
        jobs: NonZeroUsize,
        verbose: bool,
    ) -> Self {
        Self { executor, template: Arc::new(template), jobs, verbose }
    }

    pub fn jobs(&self) -> NonZeroUsize {
        self.jobs
    }

    /// Starts the analysis of the files in the background.
    ///
    /// The returned handle shall be used to wait for the completion.
    pub fn start<W>(
        &self,
        files: Vec<PathBuf>,
        output: W,
        cancel: CancelToken,
    ) -> Result<Running<W>, DispatchError>
    where
        W: io::Write + Send + 'static,
    {
        let total = files.len();
        let jobs = self.jobs.get();
        log::debug!("Dispatching {total} files to {jobs} workers");

        let (queue_sender, queue) = bounded::<PathBuf>(jobs);
        let (report_sender, reports) = unbounded::<Report>();

        let collector = {
            let collector = Collector::new(output, total, self.verbose);
            thread::Builder::new()
                .name("collector".into())
                .spawn(move || collector.consume(reports))
                .map_err(DispatchError::ThreadSpawn)?
        };

        let mut workers = Vec::with_capacity(jobs);
        for index in 0..jobs {
            let worker = Worker {
                queue: queue.clone(),
                reports: report_sender.clone(),
                executor: Arc::clone(&self.executor),
                template: Arc::clone(&self.template),
                cancel: cancel.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("worker-{index}"))
                .spawn(move || worker.run())
                .map_err(DispatchError::ThreadSpawn)?;
            workers.push(handle);
        }
        // Only the workers shall hold these, to see the channels closing.
        drop(queue);
        drop(report_sender);

        let feeder = thread::Builder::new()
            .name("feeder".into())
            .spawn(move || feed(files, queue_sender, cancel))
            .map_err(DispatchError::ThreadSpawn)?;

        Ok(Running { feeder, workers, collector })
    }

    /// Analyzes the files and waits for the completion.
    pub fn run<W>(&self, files: Vec<PathBuf>, output: W) -> Result<(W, Summary), DispatchError>
    where
        W: io::Write + Send + 'static,
    {
        self.start(files, output, CancelToken::new())?.wait()
    }
}

fn feed(files: Vec<PathBuf>, queue: Sender<PathBuf>, cancel: CancelToken) {
    for file in files {
        if cancel.is_cancelled() {
            log::debug!("Cancelled, stop feeding the work queue");
            break;
        }
        if queue.send(file).is_err() {
            log::debug!("Work queue is closed, stop feeding it");
            break;
        }
    }
}

struct Worker {
    queue: Receiver<PathBuf>,
    reports: Sender<Report>,
    executor: Arc<dyn Executor>,
    template: Arc<InvocationTemplate>,
    cancel: CancelToken,
}

impl Worker {
    /// Processes files from the queue until it's closed and drained.
    fn run(self) {
        for file in self.queue.iter() {
            if self.cancel.is_cancelled() {
                break;
            }
            let invocation = self.template.for_file(&file);
            log::debug!("Running: {invocation}");

            let result = self.executor.execute(&invocation, &self.cancel);
            if let Err(ExecutionError::Cancelled) = result {
                break;
            }
            if self.reports.send(Report { file, invocation, result }).is_err() {
                log::error!("Failed to send report, the output collector is gone");
                break;
            }
        }
    }
}

/// Handle of a started analysis.
pub struct Running<W> {
    feeder: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    collector: JoinHandle<io::Result<(W, Summary)>>,
}

impl<W> Running<W> {
    /// Returns true when every file was processed and reported.
    pub fn is_finished(&self) -> bool {
        self.feeder.is_finished()
            && self.workers.iter().all(JoinHandle::is_finished)
            && self.collector.is_finished()
    }

    /// Waits until every file is processed and reported.
    ///
    /// Returns the output stream and the summary of the analysis.
    pub fn wait(self) -> Result<(W, Summary), DispatchError> {
        self.feeder.join().map_err(|_| DispatchError::Thread("Feeder thread panicked"))?;
        for worker in self.workers {
            worker.join().map_err(|_| DispatchError::Thread("Worker thread panicked"))?;
        }
        self.collector
            .join()
            .map_err(|_| DispatchError::Thread("Collector thread panicked"))?
            .map_err(DispatchError::Output)
    }

    /// Waits only for the workers to stop.
    ///
    /// Used after cancellation: the workers terminate their analyzer processes,
    /// while the output collector is not waited for.
    pub fn abandon(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                log::warn!("Worker thread panicked");
            }
        }
    }
}

/// Errors of running the worker pool.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to start thread: {0}")]
    ThreadSpawn(#[source] io::Error),
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),
    #[error("Thread error: {0}")]
    Thread(&'static str),
}
