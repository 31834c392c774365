//! Background worker driving one session.
//!
//! The worker runs rounds back to back while they make progress, then waits
//! until it is woken by new writes or the idle interval elapses. Rounds are
//! blocking (storage scans, socket writes), so each one runs on the blocking
//! thread pool. A failed round stops the worker; restarting is left to the
//! caller, which can build a new session that resumes from the persisted
//! knowledge.

use crate::cancel::CancellationSignal;
use crate::error::{ReplicationError, ReplicationResult};
use crate::session::{OutgoingReplicationSession, RoundOutcome, SessionStats};
use crate::transport::ReplicationTransport;
use docrepl_storage::{KnowledgeStore, SnapshotSource};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};

/// Runs an [`OutgoingReplicationSession`] on a tokio task.
pub struct ReplicationWorker<S, K, T>
where
    S: SnapshotSource,
    K: KnowledgeStore,
{
    session: OutgoingReplicationSession<S, K>,
    transport: T,
}

impl<S, K, T> ReplicationWorker<S, K, T>
where
    S: SnapshotSource + 'static,
    K: KnowledgeStore + 'static,
    T: ReplicationTransport + 'static,
{
    /// Creates a worker for `session` over `transport`.
    pub fn new(session: OutgoingReplicationSession<S, K>, transport: T) -> Self {
        Self { session, transport }
    }

    /// Starts the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(self) -> WorkerHandle<S, K> {
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cancel = CancellationSignal::new();
        let stats = Arc::new(RwLock::new(self.session.stats().clone()));

        let span = tracing::info_span!("replication_worker", destination = %self.session.destination());
        let task = tokio::spawn(
            run(
                self.session,
                self.transport,
                Arc::clone(&wake),
                shutdown_rx,
                cancel.clone(),
                Arc::clone(&stats),
            )
            .instrument(span),
        );

        WorkerHandle {
            wake,
            shutdown: shutdown_tx,
            cancel,
            stats,
            task,
        }
    }
}

/// Handle to a running [`ReplicationWorker`].
pub struct WorkerHandle<S, K>
where
    S: SnapshotSource,
    K: KnowledgeStore,
{
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    cancel: CancellationSignal,
    stats: Arc<RwLock<SessionStats>>,
    task: JoinHandle<ReplicationResult<OutgoingReplicationSession<S, K>>>,
}

impl<S, K> WorkerHandle<S, K>
where
    S: SnapshotSource,
    K: KnowledgeStore,
{
    /// Tells the worker that new writes are available.
    pub fn notify_new_writes(&self) {
        self.wake.notify_one();
    }

    /// Session statistics as of the last finished round.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Returns true once the worker task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Aborts the round in progress, if any.
    ///
    /// The round fails with [`ReplicationError::Cancelled`] and the worker
    /// stops with that error. While the round waits for a reply the signal
    /// is only seen between reads, so the transport needs a read timeout for
    /// this to take effect against a peer that never answers.
    pub fn cancel_round(&self) {
        self.cancel.cancel();
    }

    /// Lets the current round finish, stops the worker and returns the session.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the worker before shutdown was
    /// requested, or [`ReplicationError::Worker`] if the task panicked.
    pub async fn shutdown(self) -> ReplicationResult<OutgoingReplicationSession<S, K>> {
        let _ = self.shutdown.send(true);
        self.join().await
    }

    /// Waits for the worker to stop on its own.
    ///
    /// # Errors
    ///
    /// Same as [`shutdown`](Self::shutdown).
    pub async fn join(self) -> ReplicationResult<OutgoingReplicationSession<S, K>> {
        self.task
            .await
            .map_err(|e| ReplicationError::Worker(e.to_string()))?
    }
}

async fn run<S, K, T>(
    mut session: OutgoingReplicationSession<S, K>,
    mut transport: T,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
    cancel: CancellationSignal,
    stats: Arc<RwLock<SessionStats>>,
) -> ReplicationResult<OutgoingReplicationSession<S, K>>
where
    S: SnapshotSource + 'static,
    K: KnowledgeStore + 'static,
    T: ReplicationTransport + 'static,
{
    let mut timer = tokio::time::interval(session.config().idle_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        last_sent_etag = session.knowledge().last_sent_etag,
        "replication worker started"
    );

    'outer: loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break 'outer;
                }
                continue;
            }
            _ = wake.notified() => {}
            _ = timer.tick() => {}
        }

        loop {
            if *shutdown.borrow() {
                break 'outer;
            }

            let round_cancel = cancel.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let result = session.run_round(&mut transport, &round_cancel);
                (session, transport, result)
            })
            .await;

            let (returned_session, returned_transport, result) =
                joined.map_err(|e| ReplicationError::Worker(e.to_string()))?;
            session = returned_session;
            transport = returned_transport;
            *stats.write() = session.stats().clone();

            match result {
                Ok(RoundOutcome::NoModification) => break,
                Ok(outcome) => {
                    debug!(?outcome, "round completed, checking for more changes");
                }
                Err(err) => {
                    warn!(error = %err, "replication worker stopping after failed round");
                    return Err(err);
                }
            }
        }
    }

    info!(
        last_sent_etag = session.knowledge().last_sent_etag,
        "replication worker stopped"
    );
    Ok(session)
}
