//! Guided onboarding tours. Each tour is a fixed sequence of steps, and
//! every step lives on a page of the frontend, so moving between steps
//! tells the client where to navigate.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tour {
    ProfileSetup,
    BusinessSetup,
    Marketplace,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TourStep {
    pub id: &'static str,
    pub title: &'static str,
    pub route: &'static str,
}

const fn step(id: &'static str, title: &'static str, route: &'static str) -> TourStep {
    TourStep { id, title, route }
}

const PROFILE_SETUP: &[TourStep] = &[
    step("personal_information", "Tell us who you are", "/profile/edit"),
    step("experience", "Add your experience", "/profile/edit#experience"),
    step("skills", "List your skills", "/profile/edit#skills"),
    step("certifications", "Upload certifications", "/profile/edit#certifications"),
    step("review", "Review your public profile", "/profile/me"),
];

const BUSINESS_SETUP: &[TourStep] = &[
    step("create_business", "Create your business page", "/businesses/new"),
    step("branding", "Add a logo and description", "/businesses/me/edit"),
    step("team", "Invite your team", "/businesses/me/team"),
    step("first_job", "Post your first job", "/businesses/me/jobs/new"),
];

const MARKETPLACE: &[TourStep] = &[
    step("browse", "Browse products", "/marketplace"),
    step("catalog", "List your own products", "/marketplace/products/new"),
    step("rfq", "Request a quote", "/marketplace/rfqs/new"),
    step("orders", "Track your orders", "/marketplace/orders"),
];

impl Tour {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tour::ProfileSetup => "profile_setup",
            Tour::BusinessSetup => "business_setup",
            Tour::Marketplace => "marketplace",
        }
    }

    pub fn steps(&self) -> &'static [TourStep] {
        match self {
            Tour::ProfileSetup => PROFILE_SETUP,
            Tour::BusinessSetup => BUSINESS_SETUP,
            Tour::Marketplace => MARKETPLACE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TourState {
    #[default]
    NotStarted,
    InProgress { step: usize },
    Completed,
    Skipped,
}

impl TourState {
    fn is_finished(&self) -> bool {
        matches!(self, TourState::Completed | TourState::Skipped)
    }

    fn name(&self) -> &'static str {
        match self {
            TourState::NotStarted => "not started",
            TourState::InProgress { .. } => "in progress",
            TourState::Completed => "completed",
            TourState::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TourAction {
    Start,
    Next,
    Back,
    GoTo { step: usize },
    Skip,
    Complete,
    Restart,
}

/// Computes the state after `action`. Finished tours only accept `restart`.
pub fn advance(tour: Tour, state: TourState, action: TourAction) -> Result<TourState, AppError> {
    let last = tour.steps().len().saturating_sub(1);

    if state.is_finished() && action != TourAction::Restart {
        return Err(AppError::Validation(format!(
            "The {} tour is {}; restart it first",
            tour.as_str(),
            state.name()
        )));
    }

    let next = match (state, action) {
        (_, TourAction::Restart) => TourState::InProgress { step: 0 },
        (TourState::NotStarted, TourAction::Start) => TourState::InProgress { step: 0 },
        // Starting again resumes where the user left off.
        (TourState::InProgress { step }, TourAction::Start) => TourState::InProgress { step },
        (TourState::InProgress { step }, TourAction::Next) if step >= last => TourState::Completed,
        (TourState::InProgress { step }, TourAction::Next) => TourState::InProgress { step: step + 1 },
        (TourState::InProgress { step }, TourAction::Back) => TourState::InProgress {
            step: step.saturating_sub(1),
        },
        (TourState::InProgress { .. } | TourState::NotStarted, TourAction::GoTo { step }) => {
            if step > last {
                return Err(AppError::Validation(format!(
                    "The {} tour has no step {step}",
                    tour.as_str()
                )));
            }
            TourState::InProgress { step }
        }
        (TourState::InProgress { .. } | TourState::NotStarted, TourAction::Skip) => TourState::Skipped,
        (TourState::InProgress { .. }, TourAction::Complete) => TourState::Completed,
        (state, _) => {
            return Err(AppError::Validation(format!(
                "That action is not available while the tour is {}",
                state.name()
            )))
        }
    };
    Ok(next)
}

/// What the client renders: the state plus the page to be on.
#[derive(Debug, Clone, Serialize)]
pub struct TourView {
    pub tour: Tour,
    pub state: TourState,
    pub total_steps: usize,
    pub current_step: Option<TourStep>,
    pub route: Option<&'static str>,
}

impl TourView {
    pub fn new(tour: Tour, state: TourState) -> Self {
        let current_step = match state {
            TourState::InProgress { step } => tour.steps().get(step).copied(),
            _ => None,
        };
        Self {
            tour,
            state,
            total_steps: tour.steps().len(),
            route: current_step.map(|s| s.route),
            current_step,
        }
    }
}
