use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::matches::ParticipantProgress;

#[derive(Clone, Debug, Serialize)]
pub struct OpponentInfo {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FinalScores {
    pub player1: ParticipantProgress,
    pub player2: ParticipantProgress,
}

/// Lifecycle notifications delivered to player sessions.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    MatchFound {
        match_id: String,
        opponent: OpponentInfo,
        problem: serde_json::Value,
        total_tests: u32,
    },
    OpponentProgress {
        tests_passed: u32,
        total_tests: u32,
    },
    MatchEnded {
        winner_id: Option<String>,
        final_scores: FinalScores,
    },
}

struct Session {
    tx: mpsc::UnboundedSender<Event>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>>,
}

/// Routes events to player sessions and tracks which sessions belong to a
/// match's communication group. Registry mutation is guarded by plain
/// mutexes; delivery itself goes through per-session unbounded channels so
/// senders never block.
#[derive(Default)]
pub struct CommsHub {
    sessions: Mutex<HashMap<String, Session>>,
    rooms: Mutex<HashMap<String, Vec<String>>>,
}

impl CommsHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session channel if it does not exist yet. Re-registering
    /// keeps any still-undelivered events.
    pub fn register(&self, session_id: &str) {
        let mut sessions = self.sessions.lock();
        sessions.entry(session_id.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            Session {
                tx,
                rx: Arc::new(tokio::sync::Mutex::new(rx)),
            }
        });
    }

    pub fn unregister(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
        let mut rooms = self.rooms.lock();
        for members in rooms.values_mut() {
            members.retain(|member| member != session_id);
        }
        rooms.retain(|_, members| !members.is_empty());
    }

    pub fn send(&self, session_id: &str, event: Event) {
        if let Some(session) = self.sessions.lock().get(session_id) {
            // A dropped receiver only means the session is gone; nothing to do.
            let _ = session.tx.send(event);
        }
    }

    pub fn join_room(&self, room: &str, session_id: &str) {
        let mut rooms = self.rooms.lock();
        let members = rooms.entry(room.to_string()).or_default();
        if !members.iter().any(|member| member == session_id) {
            members.push(session_id.to_string());
        }
    }

    pub fn room_contains(&self, room: &str, session_id: &str) -> bool {
        self.rooms
            .lock()
            .get(room)
            .is_some_and(|members| members.iter().any(|member| member == session_id))
    }

    pub fn drop_room(&self, room: &str) {
        self.rooms.lock().remove(room);
    }

    fn members_of(&self, room: &str) -> Vec<String> {
        self.rooms.lock().get(room).cloned().unwrap_or_default()
    }

    pub fn broadcast(&self, room: &str, event: Event) {
        for member in self.members_of(room) {
            self.send(&member, event.clone());
        }
    }

    pub fn broadcast_except(&self, room: &str, skip_session_id: &str, event: Event) {
        for member in self.members_of(room) {
            if member != skip_session_id {
                self.send(&member, event.clone());
            }
        }
    }

    /// Drains the session's pending events, waiting up to `wait` for the
    /// first one when none are queued. Returns `None` for unknown sessions.
    pub async fn poll(&self, session_id: &str, wait: Duration) -> Option<Vec<Event>> {
        let rx = {
            let sessions = self.sessions.lock();
            Arc::clone(&sessions.get(session_id)?.rx)
        };
        let mut rx = rx.lock().await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        if events.is_empty() && !wait.is_zero() {
            if let Ok(Some(event)) = tokio::time::timeout(wait, rx.recv()).await {
                events.push(event);
                while let Ok(event) = rx.try_recv() {
                    events.push(event);
                }
            }
        }
        Some(events)
    }
}
