use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;

use crate::config::{GameConfig, ServerConfig};
use crate::events::CommsHub;
use crate::harness::Harness;
use crate::matches::MatchManager;
use crate::queue::WaitingQueues;
use crate::routes::{
    get_events, home, json_error_handler, post_disconnect, post_join_queue, post_leave_queue,
    post_progress, post_submission, query_error_handler,
};

/// Registers every route of the service. Shared between the production
/// server and in-process test apps.
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(home)
        .service(web::resource("/queue/join").route(web::post().to(post_join_queue)))
        .service(web::resource("/queue/leave").route(web::post().to(post_leave_queue)))
        .service(web::resource("/matches/{match_id}/progress").route(web::post().to(post_progress)))
        .service(
            web::resource("/matches/{match_id}/submissions")
                .route(web::post().to(post_submission)),
        )
        .service(web::resource("/sessions/{session_id}/events").route(web::get().to(get_events)))
        .service(
            web::resource("/sessions/{session_id}/disconnect")
                .route(web::post().to(post_disconnect)),
        );
}

#[allow(clippy::too_many_arguments)]
pub fn build_server(
    server_config: ServerConfig,
    game_config: GameConfig,
    db_pool: Arc<SqlitePool>,
    queues: Arc<Mutex<WaitingQueues>>,
    manager: Arc<MatchManager>,
    hub: Arc<CommsHub>,
    harness: Arc<Harness>,
) -> std::io::Result<Server> {
    let db_pool = web::Data::from(db_pool);
    let queues = web::Data::from(queues);
    let manager = web::Data::from(manager);
    let hub = web::Data::from(hub);
    let harness = web::Data::from(harness);
    let game_config = web::Data::new(game_config);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(queues.clone())
            .app_data(manager.clone())
            .app_data(hub.clone())
            .app_data(harness.clone())
            .app_data(game_config.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .wrap(middleware::Logger::default())
            .configure(register_routes)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
