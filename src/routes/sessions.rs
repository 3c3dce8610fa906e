use std::time::Duration;

use actix_web::{HttpResponse, Responder, web};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::ErrorResponse;
use crate::events::CommsHub;
use crate::matches::MatchManager;
use crate::queue::WaitingQueues;

// Long-poll ceiling; clients asking for more are clamped.
const MAX_WAIT_MS: u64 = 30_000;

#[derive(Deserialize)]
pub struct EventsQuery {
    pub wait_ms: Option<u64>,
}

#[derive(Serialize)]
struct SessionAck {
    status: &'static str,
}

/// Drains the session's pending events, optionally long-polling for the
/// first one.
pub async fn get_events(
    path: web::Path<String>,
    hub: web::Data<CommsHub>,
    query: web::Query<EventsQuery>,
) -> impl Responder {
    let session_id = path.into_inner();
    let wait = Duration::from_millis(query.wait_ms.unwrap_or(0).min(MAX_WAIT_MS));

    match hub.poll(&session_id, wait).await {
        Some(events) => HttpResponse::Ok().json(events),
        None => HttpResponse::NotFound().json(ErrorResponse {
            reason: "ERR_NOT_FOUND",
            code: 3,
        }),
    }
}

/// Removes the session from every queue and force-ends any active match
/// whose communication group still contains it.
pub async fn post_disconnect(
    path: web::Path<String>,
    queues: web::Data<Mutex<WaitingQueues>>,
    manager: web::Data<MatchManager>,
    hub: web::Data<CommsHub>,
) -> impl Responder {
    let session_id = path.into_inner();
    log::info!("Session {session_id} disconnected");

    queues.lock().remove(&session_id);

    for match_id in manager.active_ids() {
        if hub.room_contains(&match_id, &session_id) {
            manager.end(&match_id).await;
        }
    }

    hub.unregister(&session_id);
    HttpResponse::Ok().json(SessionAck {
        status: "disconnected",
    })
}
