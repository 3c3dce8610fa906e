pub mod config;
pub mod database;
pub mod events;
pub mod harness;
pub mod matches;
pub mod queue;
pub mod routes;
pub mod web_server;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
