use crate::error::CommandError;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a non-blocking command. Transitions are monotonic: once a
/// terminal status (`Completed`, `Cancelled`, `Failed`) is reached, the
/// handle never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Cancelled | CommandStatus::Failed)
    }
}

struct HandleInner {
    status: Mutex<CommandStatus>,
    progress: Mutex<f64>,
    error: Mutex<Option<CommandError>>,
    done: Notify,
    cancel: CancellationToken,
}

/// Cancellable, progress-reporting proxy for an in-flight vehicle command.
///
/// Cloning yields another view of the same command; the runtime keeps one
/// clone to drive status and progress while the script holds the other.
#[derive(Clone)]
pub struct CommandHandle {
    inner: Arc<HandleInner>,
}

impl CommandHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                status: Mutex::new(CommandStatus::Pending),
                progress: Mutex::new(0.0),
                error: Mutex::new(None),
                done: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn status(&self) -> CommandStatus { *self.inner.status.lock().unwrap() }

    /// Progress in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 { *self.inner.progress.lock().unwrap() }

    /// Requests cancellation. A no-op once the command is terminal; the
    /// in-flight wait observes the request on its next poll.
    pub fn cancel(&self) {
        let mut status = self.inner.status.lock().unwrap();
        if status.is_terminal() {
            return;
        }
        *status = CommandStatus::Cancelled;
        drop(status);
        self.inner.cancel.cancel();
        self.inner.done.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool { self.status() == CommandStatus::Cancelled }

    /// Waits until the command reaches a terminal status. A failure is
    /// returned once; later calls report `Ok` with the status unchanged.
    pub async fn wait_done(&self) -> Result<(), CommandError> {
        loop {
            let notified = self.inner.done.notified();
            if self.status().is_terminal() {
                return match self.inner.error.lock().unwrap().take() {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
            }
            notified.await;
        }
    }

    pub(crate) fn set_progress(&self, value: f64) {
        *self.inner.progress.lock().unwrap() = value.clamp(0.0, 1.0);
    }

    pub(crate) fn set_running(&self) {
        let mut status = self.inner.status.lock().unwrap();
        if *status == CommandStatus::Pending {
            *status = CommandStatus::Running;
        }
    }

    pub(crate) fn complete(&self) {
        self.finish(CommandStatus::Completed, None);
        self.set_progress(1.0);
    }

    pub(crate) fn fail(&self, error: CommandError) {
        self.finish(CommandStatus::Failed, Some(error));
    }

    pub(crate) fn mark_cancelled(&self) {
        self.finish(CommandStatus::Cancelled, None);
    }

    pub(crate) fn cancelled_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    fn finish(&self, terminal: CommandStatus, error: Option<CommandError>) {
        let mut status = self.inner.status.lock().unwrap();
        if status.is_terminal() {
            return;
        }
        *status = terminal;
        drop(status);
        if let Some(e) = error {
            *self.inner.error.lock().unwrap() = Some(e);
        }
        self.inner.done.notify_waiters();
    }
}
