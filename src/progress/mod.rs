//! Challenge progress tracking
//!
//! Persists the user's 7-day challenge progress as a JSON file and listens
//! for completed sessions to keep it current.

mod challenge;
mod store;

pub use challenge::{challenge_day, ChallengeDay, CHALLENGE_DAYS};
pub use store::{
    spawn_progress_listener, ChallengeOutcome, ProgressError, ProgressStore, UserProgress,
};
