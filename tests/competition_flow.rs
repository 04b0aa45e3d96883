use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::{BoxFuture, ready};
use raclette_back::{
    config::AppConfig,
    dao::{
        competition_store::{
            CompetitionStore, PlayerFeed, PlayerQuery, memory::MemoryCompetitionStore,
        },
        models::{CompetitionEntity, NewPlayerEntity, PlayerEntity, PlayerPatch},
        session_store::{MemorySessionStore, SessionStore},
        storage::{StorageError, StorageResult},
    },
    dto::competition::{PageView, RegisterRequest},
    error::ServiceError,
    identity::{self, SESSION_KEY},
    services::competition_service,
    state::{AppState, SharedState, state_machine::Page},
};

/// Memory store with switchable failures, slow player writes and call counters.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryCompetitionStore,
    fail_writes: AtomicBool,
    fail_queries: AtomicBool,
    write_delay_ms: AtomicU64,
    updates: AtomicUsize,
    queries: AtomicUsize,
}

impl FlakyStore {
    fn failure() -> StorageError {
        StorageError::unavailable("injected failure".into(), io::Error::other("boom"))
    }

    fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    fn slow_writes(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms.load(Ordering::SeqCst))
    }

    fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn writes_fail(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

impl CompetitionStore for FlakyStore {
    fn upsert_competition(
        &self,
        competition: CompetitionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        if self.writes_fail() {
            return Box::pin(ready(Err(Self::failure())));
        }
        self.inner.upsert_competition(competition)
    }

    fn add_player(
        &self,
        competition_id: &str,
        player: NewPlayerEntity,
    ) -> BoxFuture<'static, StorageResult<PlayerEntity>> {
        if self.writes_fail() {
            return Box::pin(ready(Err(Self::failure())));
        }
        self.inner.add_player(competition_id, player)
    }

    fn update_player(
        &self,
        competition_id: &str,
        player_id: &str,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.writes_fail() {
            return Box::pin(ready(Err(Self::failure())));
        }

        let delay = self.write_delay();
        if delay.is_zero() {
            return self.inner.update_player(competition_id, player_id, patch);
        }
        let inner = self.inner.clone();
        let competition_id = competition_id.to_string();
        let player_id = player_id.to_string();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            inner
                .update_player(&competition_id, &player_id, patch)
                .await
        })
    }

    fn query_players(
        &self,
        competition_id: &str,
        query: PlayerQuery,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Box::pin(ready(Err(Self::failure())));
        }
        self.inner.query_players(competition_id, query)
    }

    fn subscribe_players(&self, competition_id: &str, query: PlayerQuery) -> PlayerFeed {
        self.inner.subscribe_players(competition_id, query)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
}

struct Kiosk {
    state: SharedState,
    store: Arc<FlakyStore>,
    sessions: Arc<MemorySessionStore>,
}

impl Kiosk {
    fn new() -> Self {
        Self::with_store(Arc::new(FlakyStore::default()))
    }

    fn with_store(store: Arc<FlakyStore>) -> Self {
        Self::with_parts(store, Arc::new(MemorySessionStore::new()))
    }

    fn with_parts(store: Arc<FlakyStore>, sessions: Arc<MemorySessionStore>) -> Self {
        let state = AppState::new(AppConfig::default(), store.clone(), sessions.clone());
        Self {
            state,
            store,
            sessions,
        }
    }

    async fn register(&self, name: &str, icon: &str) -> Result<(), ServiceError> {
        let request = RegisterRequest {
            name: name.into(),
            icon: icon.into(),
        };
        competition_service::register(&self.state, request)
            .await
            .map(|_| ())
    }

    async fn player(&self) -> PlayerEntity {
        let session = self.state.session().read().await.clone();
        let player_ref = session.player_ref().expect("bound player");
        self.store
            .inner
            .player(&player_ref.competition_id, &player_ref.player_id)
            .expect("stored player")
    }

    async fn chomp(&self, times: u32) -> u32 {
        let mut count = 0;
        for _ in 0..times {
            count = competition_service::increment(&self.state)
                .await
                .expect("increment")
                .count;
        }
        count
    }
}

async fn settle_sync() {
    tokio::time::sleep(Duration::from_millis(600)).await;
}

#[tokio::test]
async fn registration_requires_name_and_athlete() {
    let kiosk = Kiosk::new();

    let err = kiosk.register("   ", "luge").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = kiosk.register("Heidi", "").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = kiosk.register("Heidi", "zamboni").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert_eq!(kiosk.state.page().await, Page::Registration);
    let competition_id = identity::resolve_competition_id();
    assert!(kiosk.store.inner.competition(&competition_id).is_none());
}

#[tokio::test]
async fn registration_creates_competition_and_player() {
    let kiosk = Kiosk::new();
    kiosk.register("  Heidi ", "ski-jumper").await.unwrap();

    assert_eq!(kiosk.state.page().await, Page::Game);

    let competition_id = identity::resolve_competition_id();
    let competition = kiosk.store.inner.competition(&competition_id).unwrap();
    assert!(competition.created_at.is_some());
    assert_eq!(competition_id, format!("comp-{}", competition.date));

    let player = kiosk.player().await;
    assert_eq!(player.name, "Heidi");
    assert_eq!(player.icon, "ski-jumper");
    assert_eq!(player.score, 0);
    assert!(player.is_active);
    assert_eq!(
        kiosk.sessions.get(SESSION_KEY).unwrap(),
        Some(player.session_id.clone())
    );

    let view = competition_service::current_view(&kiosk.state).await;
    assert_eq!(view.page, PageView::Game);
    assert_eq!(view.competition_id.as_deref(), Some(competition_id.as_str()));
    assert!(!view.player.unwrap().returning);
    assert!(view.podium.is_none());
}

#[tokio::test]
async fn failed_registration_stays_on_registration() {
    let kiosk = Kiosk::new();
    kiosk.store.fail_writes(true);

    let err = kiosk.register("Heidi", "luge").await.unwrap_err();
    assert!(matches!(err, ServiceError::RemoteWrite(_)));
    assert_eq!(kiosk.state.page().await, Page::Registration);
    assert!(kiosk.state.session().read().await.player.is_none());

    kiosk.store.fail_writes(false);
    kiosk.register("Heidi", "luge").await.unwrap();
    assert_eq!(kiosk.state.page().await, Page::Game);
}

#[tokio::test]
async fn increment_outside_the_game_is_rejected() {
    let kiosk = Kiosk::new();
    let err = competition_service::increment(&kiosk.state)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(kiosk.state.session().read().await.trays, 0);
}

#[tokio::test(start_paused = true)]
async fn burst_of_increments_is_one_remote_write() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();

    assert_eq!(kiosk.chomp(7).await, 7);
    assert_eq!(kiosk.state.session().read().await.trays, 7);
    assert_eq!(kiosk.player().await.score, 0);

    settle_sync().await;
    assert_eq!(kiosk.store.updates(), 1);
    assert_eq!(kiosk.player().await.score, 7);

    // A second burst after a quiet period carries the running total.
    assert_eq!(kiosk.chomp(3).await, 10);
    settle_sync().await;
    assert_eq!(kiosk.store.updates(), 2);
    assert_eq!(kiosk.player().await.score, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_chomps_announce_counts_in_order() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    let mut events = kiosk.state.sse().subscribe();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let state = kiosk.state.clone();
            tokio::spawn(async move { competition_service::increment(&state).await.map(|_| ()) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut counts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.event.as_deref() == Some("trays.updated") {
            let payload: serde_json::Value = serde_json::from_str(&event.data).unwrap();
            counts.push(payload["count"].as_u64().unwrap());
        }
    }
    assert_eq!(counts, (1..=16).collect::<Vec<u64>>());
}

#[tokio::test(start_paused = true)]
async fn failed_sync_keeps_local_count() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();

    kiosk.store.fail_writes(true);
    kiosk.chomp(4).await;
    settle_sync().await;

    assert_eq!(kiosk.state.session().read().await.trays, 4);
    assert_eq!(kiosk.player().await.score, 0);
}

#[tokio::test(start_paused = true)]
async fn finish_flushes_local_count_and_builds_podium() {
    let store = Arc::new(FlakyStore::default());
    let rival = Kiosk::with_store(store.clone());
    rival.register("Franz", "downhill-skier").await.unwrap();
    rival.chomp(9).await;
    settle_sync().await;

    let kiosk = Kiosk::with_store(store.clone());
    kiosk.register("Heidi", "luge").await.unwrap();
    kiosk.chomp(5).await;

    // Finish before the debounce fires: the local counter wins.
    let view = competition_service::finish(&kiosk.state).await.unwrap();
    assert_eq!(view.page, PageView::Ceremony);
    assert_eq!(view.final_score, Some(5));

    let podium = view.podium.unwrap();
    assert_eq!(podium.len(), 3);
    assert_eq!(podium[0].name, "Franz");
    assert_eq!(podium[0].score, 9);
    assert_eq!(podium[1].name, "Heidi");
    assert_eq!(podium[1].score, 5);
    assert_eq!(podium[2].name, "---");
    assert_eq!(podium[2].score, 0);

    let player = kiosk.player().await;
    assert_eq!(player.score, 5);
    assert!(!player.is_active);

    // The superseded debounced write never lands.
    settle_sync().await;
    assert_eq!(kiosk.player().await.score, 5);
}

#[tokio::test]
async fn failed_finish_write_stays_in_game() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    kiosk.chomp(2).await;

    kiosk.store.fail_writes(true);
    let err = competition_service::finish(&kiosk.state).await.unwrap_err();
    assert!(matches!(err, ServiceError::RemoteWrite(_)));
    assert_eq!(kiosk.state.page().await, Page::Game);
    assert!(kiosk.player().await.is_active);
    assert_eq!(kiosk.state.session().read().await.trays, 2);
}

#[tokio::test(start_paused = true)]
async fn timed_out_finish_leaves_player_active() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    kiosk.chomp(1).await;
    settle_sync().await;

    kiosk.store.slow_writes(Duration::from_secs(8));
    let err = competition_service::finish(&kiosk.state).await.unwrap_err();
    assert!(matches!(err, ServiceError::Timeout));
    assert_eq!(kiosk.state.page().await, Page::Game);

    // The late finish write lands, then the kiosk puts the player back in play.
    tokio::time::sleep(Duration::from_secs(20)).await;
    let player = kiosk.player().await;
    assert!(player.is_active);
    assert_eq!(player.score, 1);
    assert_eq!(kiosk.state.session().read().await.trays, 1);
}

#[tokio::test]
async fn failed_podium_query_stays_in_game_and_retry_succeeds() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    kiosk.chomp(3).await;

    kiosk.store.fail_queries(true);
    let err = competition_service::finish(&kiosk.state).await.unwrap_err();
    assert!(matches!(err, ServiceError::RemoteRead(_)));
    assert_eq!(kiosk.state.page().await, Page::Game);
    let player = kiosk.player().await;
    assert!(player.is_active);
    assert_eq!(player.score, 3);

    kiosk.store.fail_queries(false);
    let queries_before = kiosk.store.queries();
    let view = competition_service::finish(&kiosk.state).await.unwrap();
    assert_eq!(view.page, PageView::Ceremony);
    assert_eq!(kiosk.store.queries(), queries_before + 1);

    // Writing the same final score again leaves it unchanged.
    let player = kiosk.player().await;
    assert_eq!(player.score, 3);
    assert!(!player.is_active);
}

#[tokio::test]
async fn restart_zeroes_score_for_same_player() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    kiosk.chomp(6).await;
    competition_service::finish(&kiosk.state).await.unwrap();
    let before = kiosk.player().await;

    let view = competition_service::restart(&kiosk.state).await.unwrap();
    assert_eq!(view.page, PageView::Game);
    assert_eq!(view.trays.count, 0);
    assert!(view.podium.is_none());
    assert!(view.final_score.is_none());

    let after = kiosk.player().await;
    assert_eq!(after.id, before.id);
    assert_eq!(after.score, 0);
    assert!(after.is_active);
}

#[tokio::test]
async fn failed_restart_write_stays_in_ceremony() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    kiosk.chomp(2).await;
    competition_service::finish(&kiosk.state).await.unwrap();

    kiosk.store.fail_writes(true);
    let err = competition_service::restart(&kiosk.state).await.unwrap_err();
    assert!(matches!(err, ServiceError::RemoteWrite(_)));
    assert_eq!(kiosk.state.page().await, Page::Ceremony);

    let view = competition_service::current_view(&kiosk.state).await;
    assert_eq!(view.trays.count, 2);
    assert_eq!(view.final_score, Some(2));
    assert!(view.podium.is_some());

    let player = kiosk.player().await;
    assert_eq!(player.score, 2);
    assert!(!player.is_active);
}

#[tokio::test(start_paused = true)]
async fn timed_out_restart_restores_final_score() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    kiosk.chomp(2).await;
    competition_service::finish(&kiosk.state).await.unwrap();

    kiosk.store.slow_writes(Duration::from_secs(8));
    let err = competition_service::restart(&kiosk.state).await.unwrap_err();
    assert!(matches!(err, ServiceError::Timeout));
    assert_eq!(kiosk.state.page().await, Page::Ceremony);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let view = competition_service::current_view(&kiosk.state).await;
    assert_eq!(view.trays.count, 2);
    assert_eq!(view.final_score, Some(2));
    assert!(view.podium.is_some());

    let player = kiosk.player().await;
    assert_eq!(player.score, 2);
    assert!(!player.is_active);
}

#[tokio::test]
async fn reset_then_register_uses_fresh_session_and_player() {
    let kiosk = Kiosk::new();
    kiosk.register("Heidi", "luge").await.unwrap();
    let first = kiosk.player().await;

    let view = competition_service::reset_to_registration(&kiosk.state)
        .await
        .unwrap();
    assert_eq!(view.page, PageView::Registration);
    assert!(view.player.is_none());
    assert!(view.leader.is_none());
    assert_eq!(view.trays.count, 0);
    assert_eq!(kiosk.sessions.get(SESSION_KEY).unwrap(), None);
    assert_eq!(kiosk.state.leader().attached_to().await, None);

    kiosk.register("Heidi", "luge").await.unwrap();
    let second = kiosk.player().await;
    assert_ne!(second.session_id, first.session_id);
    assert_ne!(second.id, first.id);

    // The first document is still there, untouched.
    let competition_id = identity::resolve_competition_id();
    assert!(kiosk.store.inner.player(&competition_id, &first.id).is_some());
}

#[tokio::test]
async fn returning_player_is_restored_into_the_game() {
    let store = Arc::new(FlakyStore::default());
    let sessions = Arc::new(MemorySessionStore::new());

    let first_visit = Kiosk::with_parts(store.clone(), sessions.clone());
    first_visit.register("Heidi", "curler").await.unwrap();
    let player = first_visit.player().await;
    let competition_id = identity::resolve_competition_id();
    store
        .update_player(&competition_id, &player.id, PlayerPatch::score(4))
        .await
        .unwrap();

    let reload = Kiosk::with_parts(store.clone(), sessions.clone());
    assert!(competition_service::restore_session(&reload.state).await);

    let view = competition_service::current_view(&reload.state).await;
    assert_eq!(view.page, PageView::Game);
    assert_eq!(view.trays.count, 4);
    let restored = view.player.unwrap();
    assert_eq!(restored.id, player.id);
    assert!(restored.returning);
    assert_eq!(
        reload.state.leader().attached_to().await.as_deref(),
        Some(competition_id.as_str())
    );
}

#[tokio::test]
async fn unknown_session_lands_in_registration() {
    let kiosk = Kiosk::new();
    assert!(!competition_service::restore_session(&kiosk.state).await);
    assert_eq!(kiosk.state.page().await, Page::Registration);
}

#[tokio::test]
async fn failing_restoration_lands_in_registration() {
    let store = Arc::new(FlakyStore::default());
    let sessions = Arc::new(MemorySessionStore::new());
    Kiosk::with_parts(store.clone(), sessions.clone())
        .register("Heidi", "luge")
        .await
        .unwrap();

    store.fail_queries(true);
    let reload = Kiosk::with_parts(store, sessions);
    assert!(!competition_service::restore_session(&reload.state).await);
    assert_eq!(reload.state.page().await, Page::Registration);
}

#[tokio::test]
async fn leader_follows_highest_score_across_kiosks() {
    let store = Arc::new(FlakyStore::default());
    let heidi = Kiosk::with_store(store.clone());
    let franz = Kiosk::with_store(store.clone());
    heidi.register("Heidi", "luge").await.unwrap();
    franz.register("Franz", "bobsled").await.unwrap();

    let mut leader = heidi.state.leader().watch();
    let competition_id = identity::resolve_competition_id();
    let franz_id = franz.player().await.id;
    store
        .update_player(&competition_id, &franz_id, PlayerPatch::score(12))
        .await
        .unwrap();

    let caught_up = tokio::time::timeout(
        Duration::from_secs(2),
        leader.wait_for(|current| {
            current
                .as_ref()
                .is_some_and(|leader| leader.player_id == franz_id && leader.score == 12)
        }),
    )
    .await
    .is_ok();
    assert!(caught_up, "leader view never caught up");

    let view = competition_service::current_view(&heidi.state).await;
    assert_eq!(view.leader.unwrap().name, "Franz");
}
