//! Debounced score writes.
//!
//! A single worker task owns every write to the player's score, so debounced writes and
//! immediate writes (finish, restart) reach the store in the order they were requested.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};

use crate::{
    dao::{
        competition_store::CompetitionStore,
        models::PlayerPatch,
        storage::{StorageError, StorageResult},
    },
    state::session::PlayerRef,
};

/// Default quiet period before a debounced score write fires.
pub const DEFAULT_SYNC_DELAY: Duration = Duration::from_millis(500);

/// Write waiting for the quiet period to elapse.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingWrite {
    target: PlayerRef,
    score: u32,
}

enum SyncCommand {
    Schedule(PendingWrite),
    WriteNow {
        target: PlayerRef,
        patch: PlayerPatch,
        reply: Option<oneshot::Sender<StorageResult<()>>>,
    },
    Cancel,
}

/// Handle on the score sync worker. The worker stops when the handle is dropped.
pub struct ScoreSync {
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl ScoreSync {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn(store: Arc<dyn CompetitionStore>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, delay, rx));
        Self { tx }
    }

    /// Schedule a write of `score`, replacing any pending value and restarting the timer.
    pub fn schedule(&self, target: PlayerRef, score: u32) {
        self.send(SyncCommand::Schedule(PendingWrite { target, score }));
    }

    /// Drop the pending write, if any.
    pub fn cancel(&self) {
        self.send(SyncCommand::Cancel);
    }

    /// Drop the pending write and perform `patch` right away, in order with earlier writes.
    pub async fn write_now(&self, target: PlayerRef, patch: PlayerPatch) -> StorageResult<()> {
        let (reply, response) = oneshot::channel();
        self.send(SyncCommand::WriteNow {
            target,
            patch,
            reply: Some(reply),
        });
        response.await.map_err(|err| {
            StorageError::unavailable("score sync worker stopped".into(), err)
        })?
    }

    /// Queue `patch` behind every earlier write without waiting for it to land.
    ///
    /// Failures are only logged.
    pub fn write_detached(&self, target: PlayerRef, patch: PlayerPatch) {
        self.send(SyncCommand::WriteNow {
            target,
            patch,
            reply: None,
        });
    }

    fn send(&self, command: SyncCommand) {
        if self.tx.send(command).is_err() {
            warn!("score sync worker is gone; dropping command");
        }
    }
}

async fn run(
    store: Arc<dyn CompetitionStore>,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<SyncCommand>,
) {
    let mut pending: Option<PendingWrite> = None;
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(SyncCommand::Schedule(write)) => {
                    pending = Some(write);
                    deadline = Instant::now() + delay;
                }
                Some(SyncCommand::WriteNow { target, patch, reply }) => {
                    pending = None;
                    let outcome = store
                        .update_player(&target.competition_id, &target.player_id, patch)
                        .await;
                    match reply {
                        Some(reply) => {
                            let _ = reply.send(outcome);
                        }
                        None => {
                            if let Err(err) = outcome {
                                warn!(
                                    player_id = %target.player_id,
                                    error = %err,
                                    "detached player write failed"
                                );
                            }
                        }
                    }
                }
                Some(SyncCommand::Cancel) => pending = None,
                None => break,
            },
            _ = sleep_until(deadline), if pending.is_some() => {
                if let Some(write) = pending.take() {
                    flush(store.as_ref(), write).await;
                }
            }
        }
    }

    debug!("score sync worker stopped");
}

/// Best-effort write: failures are logged and never retried.
async fn flush(store: &dyn CompetitionStore, write: PendingWrite) {
    let PendingWrite { target, score } = write;
    match store
        .update_player(
            &target.competition_id,
            &target.player_id,
            PlayerPatch::score(score),
        )
        .await
    {
        Ok(()) => debug!(player_id = %target.player_id, score, "score synced"),
        Err(err) => warn!(
            player_id = %target.player_id,
            score,
            error = %err,
            "score sync failed; remote score may lag"
        ),
    }
}
