pub mod session;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::{sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{competition_store::CompetitionStore, session_store::SessionStore},
    error::ServiceError,
    services::{leader_feed::LeaderFeed, podium::Podium, score_sync::ScoreSync},
    state::{session::LocalSession, state_machine::Page},
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::state_machine::{CompetitionEvent, CompetitionStateMachine};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);
/// Buffered events per SSE subscriber before it starts lagging.
const SSE_CAPACITY: usize = 32;

/// Controller of one kiosk: the page state machine, the local session and its collaborators.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn CompetitionStore>,
    sessions: Arc<dyn SessionStore>,
    sse: SseHub,
    machine: RwLock<CompetitionStateMachine>,
    session: RwLock<LocalSession>,
    podium: RwLock<Option<Podium>>,
    leader: LeaderFeed,
    score_sync: ScoreSync,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Spawns the score sync worker, so it must be called from within a Tokio runtime.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CompetitionStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> SharedState {
        let sse = SseHub::new(SSE_CAPACITY);
        let leader = LeaderFeed::new(store.clone(), sse.clone());
        let score_sync = ScoreSync::spawn(store.clone(), config.score_sync_delay);
        let transition_timeout = config.transition_timeout;

        Arc::new(Self {
            config,
            store,
            sessions,
            sse,
            machine: RwLock::new(CompetitionStateMachine::new()),
            session: RwLock::new(LocalSession::default()),
            podium: RwLock::new(None),
            leader,
            score_sync,
            transition_gate: Mutex::new(()),
            transition_timeout,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared competition document store.
    pub fn store(&self) -> &Arc<dyn CompetitionStore> {
        &self.store
    }

    /// Local store holding the session identifier.
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// Broadcast hub used for the kiosk SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    pub fn session(&self) -> &RwLock<LocalSession> {
        &self.session
    }

    /// Podium computed by the last successful finish.
    pub fn podium(&self) -> &RwLock<Option<Podium>> {
        &self.podium
    }

    pub fn leader(&self) -> &LeaderFeed {
        &self.leader
    }

    pub fn score_sync(&self) -> &ScoreSync {
        &self.score_sync
    }

    /// Current page of the kiosk.
    pub async fn page(&self) -> Page {
        self.machine.read().await.page()
    }

    pub async fn snapshot(&self) -> Snapshot {
        let sm = self.machine.read().await;
        sm.snapshot()
    }

    /// Validate an in-page event against the state machine without planning it.
    pub async fn check_transition(&self, event: CompetitionEvent) -> Result<Page, PlanError> {
        self.machine.read().await.check(event)
    }

    /// Plan a transition to the state machine, returning the plan.
    async fn plan_transition(&self, event: CompetitionEvent) -> Result<Plan, PlanError> {
        let mut sm = self.machine.write().await;
        sm.plan(event)
    }

    /// Apply the planned transition, returning the next page.
    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<Page, ApplyError> {
        let mut sm = self.machine.write().await;
        sm.apply(plan_id)
    }

    /// Abort a planned transition of the state machine.
    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.machine.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, run its remote work, then apply the plan or abort it.
    ///
    /// Transitions are serialised by a gate. Work that fails or outlives the transition timeout
    /// leaves the machine on its source page.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: CompetitionEvent,
        work: F,
    ) -> Result<(T, Page), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{
        competition_store::memory::MemoryCompetitionStore, session_store::MemorySessionStore,
    };

    fn state_with_timeout(limit: Option<Duration>) -> SharedState {
        let config = AppConfig {
            transition_timeout: limit,
            ..AppConfig::default()
        };
        AppState::new(
            config,
            Arc::new(MemoryCompetitionStore::new()),
            Arc::new(MemorySessionStore::new()),
        )
    }

    #[tokio::test]
    async fn successful_work_applies_the_plan() {
        let state = state_with_timeout(None);
        let (value, page) = state
            .run_transition(CompetitionEvent::Register, || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(page, Page::Game);
        assert_eq!(state.snapshot().await.pending, None);
    }

    #[tokio::test]
    async fn failed_work_stays_on_source_page() {
        let state = state_with_timeout(None);
        let err = state
            .run_transition(CompetitionEvent::Register, || async {
                Err::<(), _>(ServiceError::InvalidState("nope".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(state.page().await, Page::Registration);
        assert_eq!(state.snapshot().await.pending, None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_times_out_and_aborts() {
        let state = state_with_timeout(Some(Duration::from_secs(5)));
        let err = state
            .run_transition(CompetitionEvent::Register, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout));
        assert_eq!(state.page().await, Page::Registration);
        assert_eq!(
            state.check_transition(CompetitionEvent::Register).await,
            Ok(Page::Game)
        );
    }

    #[tokio::test]
    async fn invalid_event_is_rejected_before_work_runs() {
        let state = state_with_timeout(None);
        let mut ran = false;
        let err = state
            .run_transition(CompetitionEvent::Finish, || {
                ran = true;
                async { Ok(()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(!ran);
    }
}
