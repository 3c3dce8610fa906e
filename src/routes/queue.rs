use std::sync::Arc;

use actix_web::{HttpResponse, Responder, web};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::ErrorResponse;
use crate::config::GameConfig;
use crate::database as db;
use crate::events::{CommsHub, Event, OpponentInfo};
use crate::matches::MatchManager;
use crate::queue::{Category, QueuedPlayer, WaitingQueues};

#[derive(Serialize, Deserialize, Debug)]
pub struct JoinQueueRequest {
    pub session_id: String,
    pub player_id: String,
    pub player_name: String,
    /// Missing means no preference, same as the wildcard.
    pub category: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LeaveQueueRequest {
    pub session_id: String,
}

#[derive(Serialize)]
struct QueueAck {
    status: &'static str,
}

pub async fn post_join_queue(
    pool: web::Data<SqlitePool>,
    queues: web::Data<Mutex<WaitingQueues>>,
    manager: web::Data<MatchManager>,
    hub: web::Data<CommsHub>,
    game: web::Data<GameConfig>,
    body: web::Json<JoinQueueRequest>,
) -> impl Responder {
    let Some(category) = Category::parse(body.category.as_deref().unwrap_or("random")) else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
        });
    };

    if let Err(e) = db::upsert_player(&pool, &body.player_id, &body.player_name).await {
        log::error!("Failed to upsert player {}: {e}", body.player_id);
        return HttpResponse::InternalServerError().json(ErrorResponse {
            reason: "ERR_EXTERNAL",
            code: 5,
        });
    }

    hub.register(&body.session_id);

    let player = QueuedPlayer {
        session_id: body.session_id.clone(),
        player_id: body.player_id.clone(),
        name: body.player_name.clone(),
    };
    let pair = {
        let mut queues = queues.lock();
        queues.enqueue(player, category);
        queues.find_match(category)
    };
    log::info!(
        "Player {} ({}) joined the {category} queue",
        body.player_name,
        body.player_id
    );

    let Some((player1, player2, resolved)) = pair else {
        return HttpResponse::Ok().json(QueueAck { status: "waiting" });
    };

    let manager = manager.clone().into_inner();
    match start_match(&pool, &manager, &hub, &game, player1, player2, resolved).await {
        Ok(()) => HttpResponse::Ok().json(QueueAck { status: "matched" }),
        Err(e) => {
            log::error!("Failed to start a {resolved} match: {e}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            })
        }
    }
}

/// Promotes a freshly paired couple into an active match: samples a problem
/// of the resolved category, creates the match record with its timer, joins
/// both sessions into the communication group and notifies each of them.
async fn start_match(
    pool: &SqlitePool,
    manager: &Arc<MatchManager>,
    hub: &CommsHub,
    game: &GameConfig,
    player1: QueuedPlayer,
    player2: QueuedPlayer,
    category: Category,
) -> anyhow::Result<()> {
    let problem = db::random_problem(pool, category)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no problem seeded for category {category}"))?;
    let total_tests = problem.cases()?.len() as u32;

    let record = MatchManager::create(
        manager,
        &player1,
        &player2,
        problem.id,
        total_tests,
        category,
        std::time::Duration::from_secs(game.match_duration_secs),
    );

    hub.join_room(&record.id, &player1.session_id);
    hub.join_room(&record.id, &player2.session_id);

    let payload = problem.to_payload();
    hub.send(
        &player1.session_id,
        Event::MatchFound {
            match_id: record.id.clone(),
            opponent: OpponentInfo {
                id: player2.player_id.clone(),
                name: player2.name.clone(),
            },
            problem: payload.clone(),
            total_tests,
        },
    );
    hub.send(
        &player2.session_id,
        Event::MatchFound {
            match_id: record.id.clone(),
            opponent: OpponentInfo {
                id: player1.player_id.clone(),
                name: player1.name.clone(),
            },
            problem: payload,
            total_tests,
        },
    );

    log::info!(
        "Match {} created between {} and {} on a {category} problem",
        record.id,
        player1.name,
        player2.name
    );
    Ok(())
}

pub async fn post_leave_queue(
    queues: web::Data<Mutex<WaitingQueues>>,
    body: web::Json<LeaveQueueRequest>,
) -> impl Responder {
    queues.lock().remove(&body.session_id);
    log::info!("Session {} left the queue", body.session_id);
    HttpResponse::Ok().json(QueueAck { status: "left" })
}
