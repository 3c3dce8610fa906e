mod executor;
mod input;
mod tree;

pub use executor::evaluate;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::ExecutionConfig;

/// One hidden test vector: a JSON input literal and the expected-output
/// literal it should produce.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestCase {
    pub test_id: String,
    pub input: String,
    pub expected_output: String,
}

/// Outcome of a single test case, in input order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_id: String,
    pub passed: bool,
    pub error: Option<String>,
}

/// Aggregate plus per-test outcome of one harness run. Whole-run aborts
/// (syntax failure, missing entry point) carry a single aggregate error and
/// an empty per-test list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub passed: u32,
    pub total: u32,
    pub errors: Vec<String>,
    pub test_results: Vec<TestOutcome>,
}

impl ExecutionReport {
    pub(crate) fn aborted(total: u32, error: String) -> Self {
        Self {
            passed: 0,
            total,
            errors: vec![error],
            test_results: Vec::new(),
        }
    }
}

/// Runs untrusted submissions against test vectors.
///
/// Each run executes on a dedicated blocking worker so the dispatch context
/// never stalls on script execution. Script invocations are bounded by a
/// cooperative deadline inside the engine, so an over-time submission is
/// actually stopped rather than abandoned; the number of in-flight workers
/// is capped by a semaphore.
pub struct Harness {
    budget: Duration,
    limiter: Semaphore,
}

impl Harness {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            budget: Duration::from_secs(config.timeout_secs),
            limiter: Semaphore::new(config.max_concurrent.max(1)),
        }
    }

    pub async fn run(
        &self,
        source: String,
        cases: Vec<TestCase>,
    ) -> anyhow::Result<ExecutionReport> {
        let _permit = self.limiter.acquire().await?;
        let budget = self.budget;
        let report = tokio::task::spawn_blocking(move || evaluate(&source, &cases, budget)).await?;
        Ok(report)
    }
}
