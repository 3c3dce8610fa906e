use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use algoduel::config::{CliArgs, Config};
use algoduel::database as db;
use algoduel::events::CommsHub;
use algoduel::harness::Harness;
use algoduel::matches::MatchManager;
use algoduel::queue::WaitingQueues;
use algoduel::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let Config {
        server: server_config,
        game: game_config,
        execution: execution_config,
        problems,
    } = cli.to_config().expect("Failed to load configuration");

    let db_path = db::get_db_path();
    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize database");
    db::seed_problems(&db_pool, &problems)
        .await
        .expect("Failed to seed problems");

    let db_pool = Arc::new(db_pool);
    let hub = Arc::new(CommsHub::new());
    let shutdown_token = CancellationToken::new();
    let manager = Arc::new(MatchManager::new(
        db_pool.clone(),
        hub.clone(),
        shutdown_token.clone(),
    ));
    let queues = Arc::new(Mutex::new(WaitingQueues::new()));
    let harness = Arc::new(Harness::new(&execution_config));

    // ======= PREPARATION END, EXECUTION START =======

    let server = build_server(
        server_config,
        game_config,
        db_pool,
        queues,
        manager,
        hub,
        harness,
    )
    .expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Cancel the deferred timers of still-active matches
    shutdown_token.cancel();

    log::info!("Shutdown complete");
    Ok(())
}
