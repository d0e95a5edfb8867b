//! Worker execution for page and point jobs.
//!
//! Uses `rayon::spawn` for pooled work, or runs the job on the calling
//! thread when the executor is inline. Either way results travel back
//! through a crossbeam channel that the coordinator drains once per tick,
//! so callers see the same ordering contract in both modes.
//!
//! # Usage
//!
//! ```ignore
//! let executor = TaskExecutor::new(ExecutionMode::Pool);
//!
//! // Queue work (non-blocking)
//! executor.spawn(move || decode(bytes));
//!
//! // Drain finished results each tick
//! for result in executor.drain() {
//!   // Commit on the coordinator
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};

/// Where spawned work runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
  /// Run on the calling thread during `spawn`. Deterministic; used by tests.
  Inline,
  /// Run on rayon's global pool.
  #[default]
  Pool,
}

/// Spawns jobs producing `T` and collects their results.
pub struct TaskExecutor<T> {
  mode: ExecutionMode,
  sender: Sender<T>,
  receiver: Receiver<T>,
  /// Spawned and not yet drained.
  pending: Arc<AtomicUsize>,
}

impl<T: Send + 'static> TaskExecutor<T> {
  pub fn new(mode: ExecutionMode) -> Self {
    let (sender, receiver) = channel::unbounded();
    Self {
      mode,
      sender,
      receiver,
      pending: Arc::new(AtomicUsize::new(0)),
    }
  }

  #[inline]
  pub fn mode(&self) -> ExecutionMode {
    self.mode
  }

  /// Queues `work`. Its result shows up in a later `drain`.
  pub fn spawn<F>(&self, work: F)
  where
    F: FnOnce() -> T + Send + 'static,
  {
    self.pending.fetch_add(1, Ordering::Relaxed);
    match self.mode {
      ExecutionMode::Inline => {
        // Receiver lives in self, so the send cannot fail.
        let _ = self.sender.send(work());
      }
      ExecutionMode::Pool => {
        let sender = self.sender.clone();
        rayon::spawn(move || {
          let _ = sender.send(work());
        });
      }
    }
  }

  /// Takes every finished result without blocking.
  pub fn drain(&self) -> Vec<T> {
    let results: Vec<T> = self.receiver.try_iter().collect();
    self.pending.fetch_sub(results.len(), Ordering::Relaxed);
    results
  }

  /// Blocks up to `timeout` for one result.
  pub fn wait_one(&self, timeout: Duration) -> Option<T> {
    match self.receiver.recv_timeout(timeout) {
      Ok(result) => {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Some(result)
      }
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
  }

  /// Jobs spawned whose results have not been drained yet.
  #[inline]
  pub fn pending_count(&self) -> usize {
    self.pending.load(Ordering::Relaxed)
  }

  #[inline]
  pub fn is_idle(&self) -> bool {
    self.pending_count() == 0
  }

  /// Number of worker threads in rayon's pool.
  pub fn num_threads(&self) -> usize {
    match self.mode {
      ExecutionMode::Inline => 1,
      ExecutionMode::Pool => rayon::current_num_threads(),
    }
  }
}
