use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::ProblemConfig;
use crate::create_timestamp;
use crate::harness::TestCase;
use crate::matches::Match;
use crate::queue::Category;

const DATABASE_NAME: &str = "algoduel.sqlite3";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "algoduel").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let pool = init_pool(&db_url).await?;
    log::info!("Initialized database at {}", db_path.as_ref().display());
    Ok(pool)
}

pub async fn init_pool(db_url: &str) -> sqlx::Result<SqlitePool> {
    // A single connection keeps in-memory databases coherent and is plenty
    // for the write volume here.
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(db_url)
        .await?;

    for sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",  // Write-Ahead Logging for better concurrency
        "PRAGMA synchronous = NORMAL;",
        r"
        CREATE TABLE IF NOT EXISTS players (
            id            TEXT    PRIMARY KEY,
            name          TEXT    NOT NULL,
            last_active   TEXT    NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS problems (
            id            INTEGER PRIMARY KEY,
            title         TEXT    NOT NULL,
            category      TEXT    NOT NULL,
            description   TEXT    NOT NULL DEFAULT '',
            test_cases    TEXT    NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS matches (
            id              TEXT    PRIMARY KEY,
            player1_id      TEXT    NOT NULL,
            player1_passed  INTEGER NOT NULL,
            player1_total   INTEGER NOT NULL,
            player2_id      TEXT    NOT NULL,
            player2_passed  INTEGER NOT NULL,
            player2_total   INTEGER NOT NULL,
            category        TEXT    NOT NULL,
            problem_id      INTEGER NOT NULL,
            start_time      TEXT    NOT NULL,
            duration_secs   INTEGER NOT NULL,
            winner_id       TEXT
        );",
    ] {
        sqlx::query(sql).execute(&db_pool).await?;
    }

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Loads the configured problem set, replacing whatever a previous run
/// seeded under the same ids.
pub async fn seed_problems(pool: &SqlitePool, problems: &[ProblemConfig]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for problem in problems {
        let cases = serde_json::to_string(&problem.test_cases)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO problems (id, title, category, description, test_cases)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(problem.id)
        .bind(&problem.title)
        .bind(problem.category.as_str())
        .bind(&problem.description)
        .bind(cases)
        .execute(tx.as_mut())
        .await?;
    }
    tx.commit().await?;
    log::info!("Seeded {} problems", problems.len());
    Ok(())
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ProblemRecord {
    pub id: u32,
    pub title: String,
    pub category: String,
    pub description: String,
    pub test_cases: String,
}

impl ProblemRecord {
    pub fn cases(&self) -> serde_json::Result<Vec<TestCase>> {
        serde_json::from_str(&self.test_cases)
    }

    /// Problem definition as sent to matched players.
    pub fn to_payload(&self) -> serde_json::Value {
        let cases: serde_json::Value =
            serde_json::from_str(&self.test_cases).unwrap_or(serde_json::Value::Null);
        json!({
            "id": self.id,
            "title": self.title,
            "category": self.category,
            "description": self.description,
            "test_cases": cases,
        })
    }
}

/// One randomly sampled problem, filtered by category unless the wildcard
/// was requested.
pub async fn random_problem(
    pool: &SqlitePool,
    category: Category,
) -> sqlx::Result<Option<ProblemRecord>> {
    let record = match category {
        Category::Random => {
            sqlx::query_as::<_, ProblemRecord>(
                r#"
                SELECT id, title, category, description, test_cases
                FROM problems
                ORDER BY RANDOM()
                LIMIT 1
                "#,
            )
            .fetch_optional(pool)
            .await?
        }
        concrete => {
            sqlx::query_as::<_, ProblemRecord>(
                r#"
                SELECT id, title, category, description, test_cases
                FROM problems
                WHERE category = ?
                ORDER BY RANDOM()
                LIMIT 1
                "#,
            )
            .bind(concrete.as_str())
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(record)
}

pub async fn fetch_problem(pool: &SqlitePool, id: u32) -> sqlx::Result<Option<ProblemRecord>> {
    sqlx::query_as::<_, ProblemRecord>(
        r#"
        SELECT id, title, category, description, test_cases
        FROM problems
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Creates or refreshes the player-identity record on queue-join.
pub async fn upsert_player(pool: &SqlitePool, player_id: &str, name: &str) -> sqlx::Result<()> {
    let now = create_timestamp();
    sqlx::query(
        r#"
        INSERT INTO players (id, name, last_active)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET name = excluded.name, last_active = excluded.last_active
        "#,
    )
    .bind(player_id)
    .bind(name)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Write-once terminal snapshot of an ended match.
pub async fn insert_match_record(
    pool: &SqlitePool,
    ended: &Match,
    winner_id: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO matches (
            id,
            player1_id, player1_passed, player1_total,
            player2_id, player2_passed, player2_total,
            category, problem_id, start_time, duration_secs, winner_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&ended.id)
    .bind(&ended.player1.id)
    .bind(ended.player1.tests_passed)
    .bind(ended.player1.total_tests)
    .bind(&ended.player2.id)
    .bind(ended.player2.tests_passed)
    .bind(ended.player2.total_tests)
    .bind(ended.category.as_str())
    .bind(ended.problem_id)
    .bind(&ended.start_time)
    .bind(ended.duration_secs as i64)
    .bind(winner_id)
    .execute(pool)
    .await?;
    Ok(())
}
