use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::repository::{NotificationError, Notifier, QuoteEvent};

const DEFAULT_QUEUE_CAPACITY: usize = 64;

type Outcome = Result<(), NotificationError>;
type Job = (QuoteEvent, SyncSender<Outcome>);

/// Runs the notifier off the request path.
///
/// One long-lived worker thread drains a bounded queue; the caller waits at most `timeout`
/// for its own event. A hung notifier therefore pins that single worker, later events
/// queue behind it, and once the queue is full they are refused with
/// [`NotificationError::Backlogged`] instead of piling up threads. A panicking notifier is
/// reported as [`NotificationError::Aborted`] and the worker keeps serving.
pub struct NotificationDispatcher<N> {
    queue: Option<SyncSender<Job>>,
    timeout: Duration,
    notifier: PhantomData<N>,
}

impl<N> NotificationDispatcher<N>
where
    N: Notifier + 'static,
{
    pub fn new(notifier: Arc<N>, timeout: Duration) -> Self {
        Self::with_capacity(notifier, timeout, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(notifier: Arc<N>, timeout: Duration, capacity: usize) -> Self {
        let (queue, jobs) = mpsc::sync_channel::<Job>(capacity);
        let spawned = thread::Builder::new()
            .name("quote-notifier".to_string())
            .spawn(move || drain(notifier.as_ref(), jobs));

        let queue = match spawned {
            Ok(_) => Some(queue),
            Err(err) => {
                warn!(error = %err, "notifier worker could not be started");
                None
            }
        };
        Self {
            queue,
            timeout,
            notifier: PhantomData,
        }
    }

    pub fn dispatch(&self, event: QuoteEvent) -> Outcome {
        let queue = self.queue.as_ref().ok_or_else(|| {
            NotificationError::Transport("notifier worker is not running".to_string())
        })?;

        let (reply, outcome) = mpsc::sync_channel(1);
        queue.try_send((event, reply)).map_err(|err| match err {
            TrySendError::Full(_) => NotificationError::Backlogged,
            TrySendError::Disconnected(_) => NotificationError::Aborted,
        })?;

        match outcome.recv_timeout(self.timeout) {
            Ok(outcome) => {
                debug!(ok = outcome.is_ok(), "notifier finished");
                outcome
            }
            Err(RecvTimeoutError::Timeout) => Err(NotificationError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(NotificationError::Aborted),
        }
    }
}

/// Exits once the dispatcher, and with it the last sender, is dropped.
fn drain<N: Notifier>(notifier: &N, jobs: Receiver<Job>) {
    for (event, reply) in jobs {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| notifier.notify(&event)))
            .unwrap_or(Err(NotificationError::Aborted));
        // The caller may have stopped waiting already.
        let _ = reply.send(outcome);
    }
}
