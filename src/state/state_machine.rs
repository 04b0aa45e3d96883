use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// Pages the kiosk can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Name and athlete selection.
    Registration,
    /// Tray counting, with the live leader on screen.
    Game,
    /// Podium and final score after the player finished.
    Ceremony,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompetitionEvent {
    /// A new player registered.
    Register,
    /// A returning player was found for the persisted session.
    Restore,
    /// One more tray eaten.
    Increment,
    /// The player is done; show the podium.
    Finish,
    /// Zero the score and keep playing with the same player.
    Restart,
    /// Forget the player and go back to registration.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The page the state machine was on when the invalid event was received.
    pub from: Page,
    /// The event that cannot be applied from this page.
    pub event: CompetitionEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current page.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine page changed since the plan was created.
    PageMismatch {
        /// Page when plan was created.
        expected: Page,
        /// Current page.
        actual: Page,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Page the state machine is currently on.
    pub from: Page,
    /// Page the state machine will transition to.
    pub to: Page,
    /// Event that triggered this transition.
    pub event: CompetitionEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current page.
    pub page: Page,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Target page of the pending transition, if any.
    pub pending: Option<Page>,
}

/// State machine driving the kiosk pages.
#[derive(Debug, Clone)]
pub struct CompetitionStateMachine {
    page: Page,
    version: usize,
    pending: Option<Plan>,
}

impl Default for CompetitionStateMachine {
    fn default() -> Self {
        Self {
            page: Page::Registration,
            version: 0,
            pending: None,
        }
    }
}

impl CompetitionStateMachine {
    /// Create a new state machine on the registration page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current page.
    pub fn page(&self) -> Page {
        self.page
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            page: self.page,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate an event without planning it. Used for in-page events that need no remote work.
    pub fn check(&self, event: CompetitionEvent) -> Result<Page, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        self.compute_transition(event)
            .map_err(PlanError::InvalidTransition)
    }

    /// Plan a transition by validating that the event can be applied from the current page.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: CompetitionEvent) -> Result<Plan, PlanError> {
        let next = self.check(event)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.page,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next page.
    /// Returns the new page after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<Page, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.page != plan.from {
            return Err(ApplyError::PageMismatch {
                expected: plan.from,
                actual: self.page,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.page = plan.to;
        self.version = plan.version_next;

        Ok(self.page)
    }

    /// Abort a planned transition without applying it, leaving the page unchanged.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: CompetitionEvent) -> Result<Page, InvalidTransition> {
        let next = match (self.page, event) {
            (Page::Registration, CompetitionEvent::Register)
            | (Page::Registration, CompetitionEvent::Restore) => Page::Game,
            (Page::Game, CompetitionEvent::Increment) => Page::Game,
            (Page::Game, CompetitionEvent::Finish) => Page::Ceremony,
            (Page::Ceremony, CompetitionEvent::Restart) => Page::Game,
            (Page::Game | Page::Ceremony, CompetitionEvent::Reset) => Page::Registration,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
