//! Per-user operation lane.
//!
//! Every operation on a user's store runs on one dedicated worker thread,
//! in submission order. The worker owns the [`Session`]; callers hand it
//! closures and get the result back over a reply channel. A slow operation
//! only ever blocks the callers that wait on it.

use crate::engine::Session;
use crate::error::{StoreError, StoreResult};
use jsonstore_storage::StorageError;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce(&mut Session) + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

/// FIFO executor bound to one user's session.
pub(crate) struct Lane {
    username: String,
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Lane {
    /// Starts the worker thread with a closed session for `username`.
    pub(crate) fn spawn(username: &str) -> StoreResult<Self> {
        let (sender, receiver) = mpsc::channel::<Message>();
        let owner = username.to_string();
        let worker = thread::Builder::new()
            .name(format!("jsonstore-{username}"))
            .spawn(move || run_worker(Session::new(owner), receiver))
            .map_err(|e| StoreError::from(StorageError::from(e)))?;
        debug!(username, "lane started");

        Ok(Self {
            username: username.to_string(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    /// Queues `op` behind every operation submitted before it.
    ///
    /// If the lane has stopped the returned handle resolves to
    /// [`StoreError::LaneClosed`].
    pub(crate) fn submit<T, F>(&self, op: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> StoreResult<T> + Send + 'static,
    {
        let (reply, rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |session| {
            // the caller may have dropped its handle
            let _ = reply.send(op(session));
        });
        if let Some(sender) = self.sender.lock().as_ref() {
            // a failed send drops the job and with it the reply sender
            let _ = sender.send(Message::Run(job));
        }
        Pending { rx }
    }

    /// Runs `op` and waits for its result.
    pub(crate) fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> StoreResult<T> + Send + 'static,
    {
        self.submit(op).wait()
    }

    /// Stops accepting work, lets queued operations finish, and closes the
    /// session.
    pub(crate) fn shutdown(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Message::Shutdown);
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(username = %self.username, "lane worker panicked");
            }
        }
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("username", &self.username)
            .field("running", &self.sender.lock().is_some())
            .finish()
    }
}

fn run_worker(mut session: Session, receiver: Receiver<Message>) {
    for message in receiver {
        match message {
            Message::Run(job) => {
                if panic::catch_unwind(AssertUnwindSafe(|| job(&mut session))).is_err() {
                    error!(username = %session.username(), "operation panicked; transaction rolled back");
                    session.abort_transaction();
                }
            }
            Message::Shutdown => break,
        }
    }
    if let Err(err) = session.close() {
        warn!(username = %session.username(), error = %err, "closing store on lane shutdown failed");
    }
    debug!(username = %session.username(), "lane stopped");
}

/// Handle to an operation queued on a lane.
#[derive(Debug)]
#[must_use = "the operation's result is lost unless waited on"]
pub struct Pending<T> {
    rx: Receiver<StoreResult<T>>,
}

impl<T> Pending<T> {
    /// Blocks until the operation completes.
    pub fn wait(self) -> StoreResult<T> {
        self.rx.recv().unwrap_or(Err(StoreError::LaneClosed))
    }

    /// Returns the result if the operation has completed.
    ///
    /// Once this has returned `Some`, the result has been taken and a later
    /// [`wait`](Self::wait) reports [`StoreError::LaneClosed`].
    pub fn try_wait(&self) -> Option<StoreResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(StoreError::LaneClosed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    #[test]
    fn operations_run_in_submission_order() {
        let lane = Lane::spawn("jsonstore").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pending: Vec<_> = (0..50)
            .map(|i| {
                let seen = Arc::clone(&seen);
                lane.submit(move |_| {
                    seen.lock().push(i);
                    Ok(i)
                })
            })
            .collect();
        let results: Vec<i32> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
        assert_eq!(results, (0..50).collect::<Vec<_>>());
        assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn session_state_persists_between_operations() {
        let lane = Lane::spawn("jsonstore").unwrap();
        lane.run(|s| s.open(Config::in_memory())).unwrap();
        assert!(lane.run(|s| Ok(s.is_open())).unwrap());
    }

    #[test]
    fn stopped_lane_reports_closed() {
        let lane = Lane::spawn("jsonstore").unwrap();
        lane.shutdown();
        assert!(matches!(
            lane.run(|_| Ok(())),
            Err(StoreError::LaneClosed)
        ));
    }

    #[test]
    fn panicking_operation_does_not_kill_the_lane() {
        let lane = Lane::spawn("jsonstore").unwrap();
        lane.run(|s| s.open(Config::in_memory())).unwrap();
        let result: StoreResult<()> = lane.run(|s| {
            s.driver()?.begin()?;
            panic!("boom");
        });
        assert!(matches!(result, Err(StoreError::LaneClosed)));
        let in_txn = lane.run(|s| Ok(s.driver()?.in_transaction())).unwrap();
        assert!(!in_txn);
    }

    #[test]
    fn try_wait_eventually_yields() {
        let lane = Lane::spawn("jsonstore").unwrap();
        let pending = lane.submit(|_| Ok(7));
        let value = loop {
            if let Some(result) = pending.try_wait() {
                break result.unwrap();
            }
            thread::yield_now();
        };
        assert_eq!(value, 7);
    }
}
