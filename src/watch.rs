//! Hot-plug identification queue.
//!
//! Platform notification callbacks hand device paths to
//! [`PendingDevices`]; a single worker drains the queue and identifies one
//! device at a time. The queue is a bounded channel, so a callback only
//! ever enqueues and is never blocked behind device I/O.

use std::path::PathBuf;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use tracing::warn;

/// Notifications beyond this many pending devices are dropped.
const QUEUE_DEPTH: usize = 64;

/// Producer half handed to notification callbacks.
#[derive(Clone)]
pub struct PendingDevices {
    tx: SyncSender<PathBuf>,
}

impl PendingDevices {
    /// Queue one device for identification. Never blocks; a full queue
    /// drops the notification with a warning.
    pub fn push(&self, path: PathBuf) {
        match self.tx.try_send(path) {
            Ok(()) => {}
            Err(TrySendError::Full(path)) => {
                warn!(device = %path.display(), "identification queue full, dropping notification");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Spawn the single consumer worker.
///
/// The worker runs `handle` for one device at a time, in notification
/// order, and exits once every [`PendingDevices`] clone has been dropped
/// and the queue is drained.
pub fn spawn_worker<F>(mut handle: F) -> (PendingDevices, JoinHandle<()>)
where
    F: FnMut(PathBuf) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<PathBuf>(QUEUE_DEPTH);

    let worker = thread::spawn(move || {
        while let Ok(path) = rx.recv() {
            handle(path);
        }
    });

    (PendingDevices { tx }, worker)
}

#[cfg(test)]
mod tests {
    use super::spawn_worker;
    use std::path::PathBuf;
    use std::sync::mpsc;

    #[test]
    fn worker_drains_in_notification_order() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let (pending, worker) = spawn_worker(move |path: PathBuf| {
            seen_tx.send(path).unwrap();
        });

        for n in 0..3 {
            pending.push(PathBuf::from(format!("/dev/hidraw{n}")));
        }
        drop(pending);
        worker.join().unwrap();

        let seen: Vec<PathBuf> = seen_rx.iter().collect();
        assert_eq!(
            seen,
            vec![
                PathBuf::from("/dev/hidraw0"),
                PathBuf::from("/dev/hidraw1"),
                PathBuf::from("/dev/hidraw2"),
            ]
        );
    }

    #[test]
    fn worker_exits_when_all_producers_drop() {
        let (pending, worker) = spawn_worker(|_| {});
        let clone = pending.clone();
        drop(pending);
        drop(clone);
        worker.join().unwrap();
    }
}
