//! Live "current leader" view.
//!
//! At most one subscription is attached at a time. The forwarding task is aborted when the
//! subscription is detached or its handle dropped.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures::StreamExt;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        competition_store::{CompetitionStore, PlayerQuery},
        models::PlayerEntity,
    },
    services::sse_events::broadcast_leader_updated,
    state::{SseHub, session::Athlete},
};

/// Highest scoring player of the competition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leader {
    pub player_id: String,
    pub name: String,
    pub icon: Option<Athlete>,
    pub score: u32,
}

impl From<&PlayerEntity> for Leader {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            player_id: player.id.clone(),
            name: player.name.clone(),
            icon: player.icon.parse().ok(),
            score: player.score,
        }
    }
}

/// Handle on a running leader subscription. Dropping it stops the feed.
struct LeaderSubscription {
    competition_id: String,
    task: JoinHandle<()>,
}

impl Drop for LeaderSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps the leader view in sync with the store.
pub struct LeaderFeed {
    store: Arc<dyn CompetitionStore>,
    hub: SseHub,
    view: Arc<watch::Sender<Option<Leader>>>,
    epoch: Arc<AtomicU64>,
    subscription: Mutex<Option<LeaderSubscription>>,
}

impl LeaderFeed {
    pub fn new(store: Arc<dyn CompetitionStore>, hub: SseHub) -> Self {
        let (view, _rx) = watch::channel(None);
        Self {
            store,
            hub,
            view: Arc::new(view),
            epoch: Arc::new(AtomicU64::new(0)),
            subscription: Mutex::new(None),
        }
    }

    /// Latest leader seen on the feed.
    pub fn current(&self) -> Option<Leader> {
        self.view.borrow().clone()
    }

    /// Receive every change of the leader view.
    pub fn watch(&self) -> watch::Receiver<Option<Leader>> {
        self.view.subscribe()
    }

    /// Competition the feed is currently attached to.
    pub async fn attached_to(&self) -> Option<String> {
        self.subscription
            .lock()
            .await
            .as_ref()
            .map(|subscription| subscription.competition_id.clone())
    }

    /// Subscribe to the leader of `competition_id`, replacing any previous subscription.
    pub async fn attach(&self, competition_id: &str) {
        let mut slot = self.subscription.lock().await;
        if let Some(previous) = slot.take() {
            debug!(competition_id = %previous.competition_id, "detaching previous leader feed");
            self.retire(previous);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let feed = self
            .store
            .subscribe_players(competition_id, PlayerQuery::leader());
        let task = tokio::spawn(forward(
            feed,
            competition_id.to_string(),
            self.view.clone(),
            self.epoch.clone(),
            epoch,
            self.hub.clone(),
        ));

        info!(competition_id, "leader feed attached");
        *slot = Some(LeaderSubscription {
            competition_id: competition_id.to_string(),
            task,
        });
    }

    /// Stop the feed and forget the leader. No-op when nothing is attached.
    pub async fn detach(&self) {
        let previous = self.subscription.lock().await.take();
        if let Some(previous) = previous {
            info!(competition_id = %previous.competition_id, "leader feed detached");
            self.retire(previous);
        }
    }

    fn retire(&self, subscription: LeaderSubscription) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        drop(subscription);
        self.view.send_replace(None);
    }
}

async fn forward(
    mut feed: crate::dao::competition_store::PlayerFeed,
    competition_id: String,
    view: Arc<watch::Sender<Option<Leader>>>,
    epoch: Arc<AtomicU64>,
    own_epoch: u64,
    hub: SseHub,
) {
    while let Some(next) = feed.next().await {
        let players = match next {
            Ok(players) => players,
            Err(err) => {
                warn!(%competition_id, error = %err, "leader subscription failed; leader display may go stale");
                return;
            }
        };

        // An empty competition keeps whatever leader is on screen.
        let Some(top) = players.first() else {
            continue;
        };
        let leader = Leader::from(top);

        let changed = view.send_if_modified(|current| {
            if epoch.load(Ordering::SeqCst) != own_epoch || current.as_ref() == Some(&leader) {
                return false;
            }
            *current = Some(leader.clone());
            true
        });

        if changed {
            debug!(%competition_id, leader = %leader.name, score = leader.score, "leader updated");
            broadcast_leader_updated(&hub, &leader);
        }
    }
}
