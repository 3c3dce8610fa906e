use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::create_timestamp;
use crate::database as db;
use crate::events::{CommsHub, Event, FinalScores};
use crate::queue::{Category, QueuedPlayer};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipantProgress {
    pub id: String,
    pub tests_passed: u32,
    pub total_tests: u32,
    pub completed: bool,
}

/// One timed two-player contest bound to a single sampled problem.
#[derive(Clone, Debug, Serialize)]
pub struct Match {
    pub id: String,
    pub player1: ParticipantProgress,
    pub player2: ParticipantProgress,
    pub category: Category,
    pub problem_id: u32,
    pub start_time: String,
    pub duration_secs: u64,
    pub is_active: bool,
}

impl Match {
    /// The participant with the strictly higher tests-passed ratio, or none
    /// on an exact tie. Ratios compare by cross-multiplication so the result
    /// is exact; a zero-test participant counts as a zero ratio.
    pub fn winner(&self) -> Option<String> {
        let lhs =
            self.player1.tests_passed as u64 * self.player2.total_tests.max(1) as u64;
        let rhs =
            self.player2.tests_passed as u64 * self.player1.total_tests.max(1) as u64;
        match lhs.cmp(&rhs) {
            std::cmp::Ordering::Greater => Some(self.player1.id.clone()),
            std::cmp::Ordering::Less => Some(self.player2.id.clone()),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Owns the active-match table and every match's lifecycle: creation with a
/// deferred end-of-match timer, progress updates, and the single terminal
/// transition that persists a snapshot and notifies the communication group.
pub struct MatchManager {
    pool: Arc<SqlitePool>,
    hub: Arc<CommsHub>,
    active: Mutex<HashMap<String, Match>>,
    timers: Mutex<HashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

impl MatchManager {
    pub fn new(pool: Arc<SqlitePool>, hub: Arc<CommsHub>, shutdown: CancellationToken) -> Self {
        Self {
            pool,
            hub,
            active: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Creates an active match with zero progress and schedules the one-shot
    /// timer that ends it after `duration` unless something ended it first.
    /// Takes the shared handle because the timer task keeps the manager
    /// alive for the lifetime of the match.
    pub fn create(
        manager: &Arc<Self>,
        player1: &QueuedPlayer,
        player2: &QueuedPlayer,
        problem_id: u32,
        total_tests: u32,
        category: Category,
        duration: Duration,
    ) -> Match {
        let record = Match {
            id: Uuid::new_v4().to_string(),
            player1: ParticipantProgress {
                id: player1.player_id.clone(),
                tests_passed: 0,
                total_tests,
                completed: false,
            },
            player2: ParticipantProgress {
                id: player2.player_id.clone(),
                tests_passed: 0,
                total_tests,
                completed: false,
            },
            category,
            problem_id,
            start_time: create_timestamp(),
            duration_secs: duration.as_secs(),
            is_active: true,
        };

        manager.active.lock().insert(record.id.clone(), record.clone());

        let token = CancellationToken::new();
        manager.timers.lock().insert(record.id.clone(), token.clone());

        let manager = Arc::clone(manager);
        let match_id = record.id.clone();
        let shutdown = manager.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    log::info!("Match {match_id} reached its time limit");
                    manager.end(&match_id).await;
                }
            }
        });

        record
    }

    pub fn get(&self, match_id: &str) -> Option<Match> {
        self.active.lock().get(match_id).cloned()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.active.lock().keys().cloned().collect()
    }

    /// Overwrites the matching participant's tests-passed counter. The value
    /// is taken as reported; no re-validation happens here. Returns false if
    /// the match is not active or the player is not in it.
    pub fn record_progress(&self, match_id: &str, player_id: &str, tests_passed: u32) -> bool {
        let mut active = self.active.lock();
        let Some(record) = active.get_mut(match_id) else {
            return false;
        };

        let participant = if record.player1.id == player_id {
            &mut record.player1
        } else if record.player2.id == player_id {
            &mut record.player2
        } else {
            return false;
        };

        participant.tests_passed = tests_passed;
        participant.completed =
            participant.total_tests > 0 && tests_passed >= participant.total_tests;
        true
    }

    /// Ends a match exactly once. Safe to call concurrently from the timer
    /// and an explicit trigger: the terminal transition happens under the
    /// table lock, and every later call is a no-op.
    pub async fn end(&self, match_id: &str) {
        let ended = {
            let mut active = self.active.lock();
            match active.get(match_id) {
                Some(record) if record.is_active => active.remove(match_id).map(|mut record| {
                    record.is_active = false;
                    record
                }),
                _ => None,
            }
        };
        let Some(ended) = ended else {
            return;
        };

        if let Some(token) = self.timers.lock().remove(match_id) {
            token.cancel();
        }

        let winner_id = ended.winner();
        if let Err(e) = db::insert_match_record(&self.pool, &ended, winner_id.as_deref()).await {
            log::error!("Failed to persist match {match_id}: {e}");
        }

        self.hub.broadcast(
            match_id,
            Event::MatchEnded {
                winner_id: winner_id.clone(),
                final_scores: FinalScores {
                    player1: ended.player1.clone(),
                    player2: ended.player2.clone(),
                },
            },
        );
        self.hub.drop_room(match_id);

        log::info!(
            "Match {match_id} ended, winner: {}",
            winner_id.as_deref().unwrap_or("none")
        );
    }
}
