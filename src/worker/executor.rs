use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

/// Outcome reported by a task executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure { error: String },
}

/// External task execution contract. The core never interprets the
/// payload; it dispatches (task-type, payload) and acts on the outcome.
/// Implementations may be long-running; the worker wraps the call so that
/// even an abnormal termination is observed as a failed attempt.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task_type: &str, payload: &Value) -> TaskOutcome;
}

/// Built-in executor for the demo binary: sleeps for the configured work
/// duration and succeeds with the configured probability.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    work_duration: Duration,
    success_rate: f64,
}

impl SimulatedExecutor {
    pub fn new(work_duration: Duration, success_rate: f64) -> Self {
        Self {
            work_duration,
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 0.6)
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task_type: &str, _payload: &Value) -> TaskOutcome {
        tokio::time::sleep(self.work_duration).await;
        let succeeded = rand::thread_rng().gen_bool(self.success_rate);
        if succeeded {
            TaskOutcome::Success
        } else {
            TaskOutcome::Failure {
                error: format!("simulated failure for task '{task_type}'"),
            }
        }
    }
}
