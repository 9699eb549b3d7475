use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::challenge::CHALLENGE_DAYS;
use crate::session::{PracticeMode, SessionEvent};

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode progress: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted challenge progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProgress {
    /// Day of the current cycle, 1..=7
    pub current_challenge: u8,
    pub current_streak: u32,
    /// Full 7-day cycles finished
    pub completed_challenges: u32,
    pub last_challenge_completed: Option<NaiveDate>,
    pub completed_topics: BTreeSet<String>,
    pub total_practice_secs: u64,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            current_challenge: 1,
            current_streak: 0,
            completed_challenges: 0,
            last_challenge_completed: None,
            completed_topics: BTreeSet::new(),
            total_practice_secs: 0,
        }
    }
}

/// Result of completing today's challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChallengeOutcome {
    AlreadyCompletedToday,
    Advanced {
        completed_day: u8,
        next_day: u8,
        streak: u32,
    },
}

impl UserProgress {
    pub fn has_completed_today(&self, today: NaiveDate) -> bool {
        self.last_challenge_completed == Some(today)
    }

    /// Complete the current day. At most once per calendar day.
    pub fn complete_challenge(&mut self, today: NaiveDate) -> ChallengeOutcome {
        if self.has_completed_today(today) {
            return ChallengeOutcome::AlreadyCompletedToday;
        }

        let last_day = CHALLENGE_DAYS.len() as u8;
        let day = self.current_challenge.clamp(1, last_day);

        self.last_challenge_completed = Some(today);
        if day == last_day {
            self.current_streak = 0;
            self.completed_challenges += 1;
            self.current_challenge = 1;
        } else {
            self.current_streak = day as u32;
            self.current_challenge = day + 1;
        }

        ChallengeOutcome::Advanced {
            completed_day: day,
            next_day: self.current_challenge,
            streak: self.current_streak,
        }
    }

    /// Returns false if the topic was already marked
    pub fn mark_topic_completed(&mut self, topic: &str) -> bool {
        self.completed_topics.insert(topic.to_string())
    }
}

/// JSON-file-backed progress store
pub struct ProgressStore {
    path: PathBuf,
    progress: Mutex<UserProgress>,
}

impl ProgressStore {
    /// Load progress from `path`, starting fresh if the file is missing or unreadable
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ProgressError> {
        let path = path.into();

        let progress = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(progress) => progress,
                Err(e) => {
                    warn!(
                        "Progress file {} is corrupt ({}); starting fresh",
                        path.display(),
                        e
                    );
                    UserProgress::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No progress file at {}; starting fresh", path.display());
                UserProgress::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Progress store opened: {}", path.display());

        Ok(Self {
            path,
            progress: Mutex::new(progress),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> UserProgress {
        self.progress.lock().await.clone()
    }

    pub async fn complete_challenge(
        &self,
        today: NaiveDate,
    ) -> Result<ChallengeOutcome, ProgressError> {
        let mut progress = self.progress.lock().await;
        let outcome = progress.complete_challenge(today);
        if let ChallengeOutcome::Advanced {
            completed_day,
            next_day,
            streak,
        } = outcome
        {
            info!(
                "Challenge day {} completed (streak {}, next day {})",
                completed_day, streak, next_day
            );
            self.persist(&progress).await?;
        }
        Ok(outcome)
    }

    pub async fn mark_topic_completed(&self, topic: &str) -> Result<bool, ProgressError> {
        let mut progress = self.progress.lock().await;
        let added = progress.mark_topic_completed(topic);
        if added {
            self.persist(&progress).await?;
        }
        Ok(added)
    }

    pub async fn record_practice(&self, secs: u64) -> Result<(), ProgressError> {
        let mut progress = self.progress.lock().await;
        progress.total_practice_secs += secs;
        self.persist(&progress).await
    }

    pub async fn reset(&self) -> Result<(), ProgressError> {
        let mut progress = self.progress.lock().await;
        *progress = UserProgress::default();
        info!("Progress reset");
        self.persist(&progress).await
    }

    async fn persist(&self, progress: &UserProgress) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(progress)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Fold completed sessions into the store until the event stream closes
pub fn spawn_progress_listener(
    store: Arc<ProgressStore>,
    mut events: broadcast::Receiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Progress listener lagged; {} events skipped", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let SessionEvent::SessionCompleted {
                mode,
                duration_secs,
                ..
            } = event
            else {
                continue;
            };

            if let Err(e) = store.record_practice(duration_secs).await {
                error!("Failed to record practice time: {}", e);
            }

            if mode == PracticeMode::Challenge {
                let today = Local::now().date_naive();
                match store.complete_challenge(today).await {
                    Ok(ChallengeOutcome::AlreadyCompletedToday) => {
                        debug!("Challenge already completed today")
                    }
                    Ok(_) => {}
                    Err(e) => error!("Failed to save challenge progress: {}", e),
                }
            }
        }
        debug!("Progress listener stopped");
    })
}
