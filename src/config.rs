use clap::Parser;
use serde::Deserialize;

use crate::harness::TestCase;
use crate::queue::Category;

#[derive(Parser)]
#[command(name = "algoduel", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub problems: Vec<ProblemConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GameConfig {
    /// Wall-clock length of a match before it is force-ended
    #[serde(default = "default_match_duration")]
    pub match_duration_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            match_duration_secs: default_match_duration(),
        }
    }
}

fn default_match_duration() -> u64 {
    1800
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExecutionConfig {
    /// Hard wall-clock budget for one submission invocation
    #[serde(default = "default_execution_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on harness runs executing at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_execution_timeout(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_execution_timeout() -> u64 {
    5
}

fn default_max_concurrent() -> usize {
    8
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProblemConfig {
    pub id: u32,
    pub title: String,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    pub test_cases: Vec<TestCase>,
}
