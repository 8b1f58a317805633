//! Execution contexts on which scan results are delivered.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Where a completion callback runs. Chosen by the caller per scan.
pub trait CompletionContext: Send + Sync {
    fn execute(&self, task: Completion);
}

/// Runs the callback on the worker thread that finished the scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl CompletionContext for Inline {
    fn execute(&self, task: Completion) {
        task();
    }
}

/// Spawns the callback onto the runtime. A runtime that has shut down drops
/// the spawned task, and the callback then runs on the dropping thread.
impl CompletionContext for tokio::runtime::Handle {
    fn execute(&self, task: Completion) {
        let task = RunOnDrop(Some(task));
        self.spawn(async move { task.run() });
    }
}

struct RunOnDrop(Option<Completion>);

impl RunOnDrop {
    fn run(mut self) {
        if let Some(task) = self.0.take() {
            task();
        }
    }
}

impl Drop for RunOnDrop {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            warn!("runtime dropped a completion, running it inline");
            task();
        }
    }
}

impl<T: CompletionContext + ?Sized> CompletionContext for Arc<T> {
    fn execute(&self, task: Completion) {
        (**self).execute(task);
    }
}

/// A dedicated thread running callbacks one at a time in submission order.
///
/// The usual choice when results must be consumed on a single owner thread.
pub struct SerialQueue {
    tx: Option<mpsc::UnboundedSender<Completion>>,
    thread: Option<JoinHandle<()>>,
}

impl SerialQueue {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let queue_name = name.to_string();
        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(task) = rx.blocking_recv() {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!(queue = queue_name, "completion callback panicked");
                }
            }
            debug!(queue = queue_name, "serial queue drained");
        })?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }
}

impl CompletionContext for SerialQueue {
    fn execute(&self, task: Completion) {
        let Some(tx) = &self.tx else { return };
        if tx.send(task).is_err() {
            warn!("serial queue thread is gone, dropping completion");
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        // Closing the channel lets the thread finish the backlog and exit.
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                error!("serial queue thread panicked");
            }
        }
    }
}
