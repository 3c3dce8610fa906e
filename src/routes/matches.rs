use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::ErrorResponse;
use crate::database as db;
use crate::events::{CommsHub, Event};
use crate::harness::Harness;
use crate::matches::MatchManager;

#[derive(Serialize, Deserialize, Debug)]
pub struct ProgressReport {
    pub session_id: String,
    pub player_id: String,
    pub tests_passed: u32,
    pub total_tests: u32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CodeSubmission {
    pub session_id: String,
    pub player_id: String,
    pub code: String,
}

#[derive(Serialize)]
struct ProgressAck {
    status: &'static str,
}

pub async fn post_progress(
    path: web::Path<String>,
    manager: web::Data<MatchManager>,
    hub: web::Data<CommsHub>,
    body: web::Json<ProgressReport>,
) -> impl Responder {
    let match_id = path.into_inner();

    if !apply_progress(
        &manager,
        &hub,
        &match_id,
        &body.session_id,
        &body.player_id,
        body.tests_passed,
        body.total_tests,
    ) {
        return HttpResponse::NotFound().json(ErrorResponse {
            reason: "ERR_NOT_FOUND",
            code: 3,
        });
    }

    HttpResponse::Ok().json(ProgressAck { status: "recorded" })
}

/// Records the reported counter and relays it to the other participant only.
/// The reported value is trusted as-is; the submission path funnels harness
/// output through here as well.
pub(super) fn apply_progress(
    manager: &MatchManager,
    hub: &CommsHub,
    match_id: &str,
    session_id: &str,
    player_id: &str,
    tests_passed: u32,
    total_tests: u32,
) -> bool {
    if !manager.record_progress(match_id, player_id, tests_passed) {
        return false;
    }

    hub.broadcast_except(
        match_id,
        session_id,
        Event::OpponentProgress {
            tests_passed,
            total_tests,
        },
    );
    true
}

pub async fn post_submission(
    path: web::Path<String>,
    pool: web::Data<SqlitePool>,
    manager: web::Data<MatchManager>,
    hub: web::Data<CommsHub>,
    harness: web::Data<Harness>,
    body: web::Json<CodeSubmission>,
) -> impl Responder {
    let match_id = path.into_inner();

    let Some(record) = manager.get(&match_id) else {
        return HttpResponse::NotFound().json(ErrorResponse {
            reason: "ERR_NOT_FOUND",
            code: 3,
        });
    };

    let problem = match db::fetch_problem(&pool, record.problem_id).await {
        Ok(Some(problem)) => problem,
        Ok(None) => {
            log::error!("Match {match_id} references missing problem {}", record.problem_id);
            return HttpResponse::NotFound().json(ErrorResponse {
                reason: "ERR_NOT_FOUND",
                code: 3,
            });
        }
        Err(e) => {
            log::error!("Failed to fetch problem {}: {e}", record.problem_id);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            });
        }
    };
    let cases = match problem.cases() {
        Ok(cases) => cases,
        Err(e) => {
            log::error!("Stored test cases for problem {} are unreadable: {e}", problem.id);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            });
        }
    };

    let report = match harness.run(body.code.clone(), cases).await {
        Ok(report) => report,
        Err(e) => {
            log::error!("Execution harness failure for match {match_id}: {e}");
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            });
        }
    };
    log::info!(
        "Player {} passed {}/{} on match {match_id}",
        body.player_id,
        report.passed,
        report.total
    );

    apply_progress(
        &manager,
        &hub,
        &match_id,
        &body.session_id,
        &body.player_id,
        report.passed,
        report.total,
    );

    HttpResponse::Ok().json(report)
}
