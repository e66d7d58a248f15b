//! Composite action engine (`agent/act`, spec.md §4.9).
//!
//! Grounded on the teacher's `AgentInner::execute_actions`
//! (`src/agent/core/action_executor.rs`) for the per-step translate-then-
//! invoke loop, and on `utils::wait_for_element`'s exponential-backoff
//! polling for the retry/backoff shape. The engine is decoupled from the
//! dispatcher via `ActionInvoker` so it can be unit-tested against a fake.

use crate::error::{BapError, BapResult, ErrorCode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const MAX_STEPS: usize = 50;
pub const DEFAULT_ACT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONDITION_TIMEOUT: Duration = Duration::from_secs(5);

pub const ALLOWED_ACTIONS: &[&str] = &[
    "click", "dblclick", "fill", "type", "press", "hover", "scroll", "select", "check",
    "uncheck", "clear", "upload", "drag", "page/navigate", "page/reload", "page/goBack",
    "page/goForward",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnError {
    Stop,
    Skip,
    Retry,
}

impl Default for OnError {
    fn default() -> Self {
        OnError::Stop
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionState {
    Visible,
    Hidden,
    Enabled,
    Disabled,
    Exists,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCondition {
    pub state: ConditionState,
    pub selector: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActStep {
    pub label: Option<String>,
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub condition: Option<StepCondition>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    1
}
fn default_retry_delay_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step: usize,
    pub label: Option<String>,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<serde_json::Value>,
    pub duration_ms: u64,
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActResult {
    pub success: bool,
    pub completed: usize,
    pub total: usize,
    pub duration_ms: u64,
    pub failed_at: Option<usize>,
    pub steps: Vec<StepResult>,
}

#[derive(Debug, Clone, Copy)]
pub struct ActOptions {
    pub timeout: Duration,
    pub stop_on_first_error: bool,
    pub continue_on_condition_fail: bool,
}

impl Default for ActOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ACT_TIMEOUT,
            stop_on_first_error: true,
            continue_on_condition_fail: false,
        }
    }
}

/// Executes one step's action and checks its pre-condition. Implemented by
/// the dispatcher against live `EngineLocator`s; a fake is substituted in
/// tests.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(&self, action: &str, params: &serde_json::Value) -> BapResult<serde_json::Value>;
    async fn check_condition(&self, condition: &StepCondition, timeout: Duration) -> BapResult<bool>;
}

pub fn validate_steps(steps: &[ActStep]) -> BapResult<()> {
    if steps.is_empty() || steps.len() > MAX_STEPS {
        return Err(BapError::invalid_params(format!(
            "agent/act requires 1..={MAX_STEPS} steps, got {}",
            steps.len()
        )));
    }
    for step in steps {
        if !ALLOWED_ACTIONS.contains(&step.action.as_str()) {
            return Err(BapError::invalid_params(format!("Action not allowed: {}", step.action)));
        }
        if !(1..=5).contains(&step.max_retries) {
            return Err(BapError::invalid_params("maxRetries must be in 1..=5"));
        }
        if !(100..=5000).contains(&step.retry_delay_ms) {
            return Err(BapError::invalid_params("retryDelay must be in 100..=5000ms"));
        }
    }
    Ok(())
}

/// Run the full step sequence against `invoker`, honoring the global
/// deadline, per-step conditions, and the retry/skip/stop error policy
/// (spec.md §4.9 "Execution").
pub async fn execute_act(
    steps: &[ActStep],
    invoker: &dyn ActionInvoker,
    options: ActOptions,
) -> ActResult {
    let start = Instant::now();
    let mut results = Vec::with_capacity(steps.len());
    let mut failed_at = None;

    for (index, step) in steps.iter().enumerate() {
        if start.elapsed() >= options.timeout {
            failed_at = Some(index);
            break;
        }

        if let Some(condition) = &step.condition {
            let timeout = condition
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CONDITION_TIMEOUT);
            match invoker.check_condition(condition, timeout).await {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    if options.continue_on_condition_fail {
                        results.push(StepResult {
                            step: index,
                            label: step.label.clone(),
                            success: false,
                            result: None,
                            error: Some(
                                BapError::invalid_params("Step condition was not satisfied").to_json(),
                            ),
                            duration_ms: 0,
                            retries: None,
                        });
                        continue;
                    }
                    let step_start = Instant::now();
                    let err = BapError::new(ErrorCode::InvalidParams, "Step condition was not satisfied");
                    results.push(StepResult {
                        step: index,
                        label: step.label.clone(),
                        success: false,
                        result: None,
                        error: Some(err.to_json()),
                        duration_ms: step_start.elapsed().as_millis() as u64,
                        retries: None,
                    });
                    failed_at = Some(index);
                    break;
                }
            }
        }

        let step_start = Instant::now();
        let mut attempt = 0u32;
        let outcome = loop {
            let result = invoker.invoke(&step.action, &step.params).await;
            match result {
                Ok(value) => break Ok(value),
                Err(err) if step.on_error == OnError::Retry && attempt < step.max_retries => {
                    let backoff = Duration::from_millis(step.retry_delay_ms) * 2u32.pow(attempt);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    let _ = err;
                    continue;
                }
                Err(err) => break Err(err),
            }
        };

        let duration_ms = step_start.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                results.push(StepResult {
                    step: index,
                    label: step.label.clone(),
                    success: true,
                    result: Some(value),
                    error: None,
                    duration_ms,
                    retries: (attempt > 0).then_some(attempt),
                });
            }
            Err(err) => {
                results.push(StepResult {
                    step: index,
                    label: step.label.clone(),
                    success: false,
                    result: None,
                    error: Some(err.to_json()),
                    duration_ms,
                    retries: (attempt > 0).then_some(attempt),
                });
                match step.on_error {
                    OnError::Skip => continue,
                    OnError::Retry | OnError::Stop => {
                        if options.stop_on_first_error {
                            failed_at = Some(index);
                            break;
                        }
                    }
                }
            }
        }
    }

    let completed = results.iter().filter(|r| r.success).count();
    ActResult {
        success: failed_at.is_none() && results.iter().all(|r| r.success),
        completed,
        total: steps.len(),
        duration_ms: start.elapsed().as_millis() as u64,
        failed_at,
        steps: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FakeInvoker {
        fail_until: AtomicU32,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionInvoker for FakeInvoker {
        async fn invoke(&self, action: &str, _params: &serde_json::Value) -> BapResult<serde_json::Value> {
            self.calls.lock().unwrap().push(action.to_string());
            let attempts_needed = self.fail_until.load(Ordering::SeqCst);
            if attempts_needed > 0 {
                self.fail_until.fetch_sub(1, Ordering::SeqCst);
                return Err(BapError::internal("transient failure"));
            }
            Ok(serde_json::json!({ "ok": true }))
        }

        async fn check_condition(&self, _condition: &StepCondition, _timeout: Duration) -> BapResult<bool> {
            Ok(true)
        }
    }

    fn step(action: &str, on_error: OnError) -> ActStep {
        ActStep {
            label: None,
            action: action.to_string(),
            params: serde_json::json!({}),
            condition: None,
            on_error,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }

    #[test]
    fn rejects_empty_or_oversized_step_list() {
        assert!(validate_steps(&[]).is_err());
        let many: Vec<ActStep> = (0..51).map(|_| step("click", OnError::Stop)).collect();
        assert!(validate_steps(&many).is_err());
    }

    #[test]
    fn rejects_action_outside_allow_list() {
        let steps = vec![step("rm -rf", OnError::Stop)];
        assert!(validate_steps(&steps).is_err());
    }

    #[tokio::test]
    async fn stop_on_first_error_halts_remaining_steps() {
        let invoker = FakeInvoker { fail_until: AtomicU32::new(1), calls: Mutex::new(Vec::new()) };
        let steps = vec![step("click", OnError::Stop), step("fill", OnError::Stop)];
        let result = execute_act(&steps, &invoker, ActOptions::default()).await;
        assert_eq!(result.failed_at, Some(0));
        assert_eq!(result.steps.len(), 1);
    }

    #[tokio::test]
    async fn skip_continues_past_failed_step() {
        let invoker = FakeInvoker { fail_until: AtomicU32::new(1), calls: Mutex::new(Vec::new()) };
        let steps = vec![step("click", OnError::Skip), step("fill", OnError::Stop)];
        let result = execute_act(&steps, &invoker, ActOptions::default()).await;
        assert_eq!(result.steps.len(), 2);
        assert!(!result.steps[0].success);
        assert!(result.steps[1].success);
    }

    #[tokio::test]
    async fn retry_recovers_within_max_retries() {
        let invoker = FakeInvoker { fail_until: AtomicU32::new(2), calls: Mutex::new(Vec::new()) };
        let steps = vec![step("click", OnError::Retry)];
        let result = execute_act(&steps, &invoker, ActOptions::default()).await;
        assert!(result.steps[0].success);
        assert_eq!(result.steps[0].retries, Some(2));
    }

    #[tokio::test]
    async fn global_deadline_aborts_remaining_steps() {
        let invoker = FakeInvoker { fail_until: AtomicU32::new(0), calls: Mutex::new(Vec::new()) };
        let steps = vec![step("click", OnError::Stop), step("fill", OnError::Stop)];
        let options = ActOptions { timeout: Duration::from_nanos(1), ..ActOptions::default() };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = execute_act(&steps, &invoker, options).await;
        assert_eq!(result.failed_at, Some(0));
        assert_eq!(result.steps.len(), 0);
    }
}
