use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{error, info};

use super::call::{complete_validated, CallFailure};
use crate::llm::AiProvider;
use crate::schema::{SchemaName, ValidationErrors, Violation};
use crate::types::{AssessmentError, CandidateItem};
use crate::TARGET_LLM_REQUEST;

/// Auth failures across this many batches end the run.
pub const AUTH_ESCALATION_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub concurrency_limit: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::environment::DEFAULT_BATCH_SIZE,
            concurrency_limit: crate::environment::DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

/// Per-item results of a batched stage, in input order.
#[derive(Debug)]
pub struct BatchRun<T> {
    pub results: Vec<(String, Result<T, AssessmentError>)>,
    pub auth_failures: usize,
    pub batches: usize,
}

impl<T> BatchRun<T> {
    /// Whether provider authentication failed often enough to stop the run.
    pub fn auth_escalated(&self) -> bool {
        auth_escalated(self.auth_failures, self.batches)
    }
}

/// Auth failures escalate once they repeat, or when every attempt failed.
pub fn auth_escalated(auth_failures: usize, attempts: usize) -> bool {
    auth_failures >= AUTH_ESCALATION_THRESHOLD || (auth_failures > 0 && auth_failures == attempts)
}

/// Checks that a batch response covers every requested id exactly once.
pub fn coverage_violations<'a, I>(expected: &[String], returned: I, path: &str) -> Vec<Violation>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut violations = Vec::new();

    for (i, id) in returned.into_iter().enumerate() {
        if !wanted.contains(id) {
            violations.push(Violation {
                path: format!("{}[{}]", path, i),
                message: format!("unknown id {:?}", id),
            });
        } else if !seen.insert(id) {
            violations.push(Violation {
                path: format!("{}[{}]", path, i),
                message: format!("duplicate id {:?}", id),
            });
        }
    }
    for id in expected {
        if !seen.contains(id.as_str()) {
            violations.push(Violation {
                path: path.to_string(),
                message: format!("missing entry for id {:?}", id),
            });
        }
    }
    violations
}

/// Splits `items` into batches and runs them with at most
/// `options.concurrency_limit` provider calls in flight.
///
/// `check` turns one validated batch response into per-id results; it
/// receives the ids of that batch. Items sharing an id are sent once and
/// every position receives that id's result.
pub async fn run_batches<T, P, C>(
    provider: &dyn AiProvider,
    items: &[(String, &CandidateItem)],
    schema: SchemaName,
    options: BatchOptions,
    build_prompt: P,
    check: C,
) -> BatchRun<T>
where
    T: Clone,
    P: Fn(&[(String, &CandidateItem)]) -> String,
    C: Fn(&Value, &[String]) -> Result<HashMap<String, T>, ValidationErrors>,
{
    let batch_size = options.batch_size.max(1);
    let limit = options.concurrency_limit.max(1);
    let mut queued: HashSet<&str> = HashSet::new();
    let mut unique: Vec<(String, &CandidateItem)> = Vec::with_capacity(items.len());
    for (id, item) in items {
        if queued.insert(id.as_str()) {
            unique.push((id.clone(), *item));
        }
    }
    let chunks: Vec<&[(String, &CandidateItem)]> = unique.chunks(batch_size).collect();
    let batches = chunks.len();

    info!(
        target: TARGET_LLM_REQUEST,
        "[{}]: {} items in {} batches, {} in flight", schema, unique.len(), batches, limit
    );

    let build_prompt = &build_prompt;
    let check = &check;
    let completed: Vec<(Vec<String>, Result<HashMap<String, T>, CallFailure>)> = stream::iter(chunks)
        .map(|chunk| async move {
            let ids: Vec<String> = chunk.iter().map(|(id, _)| id.clone()).collect();
            let prompt = build_prompt(chunk);
            let outcome = complete_validated(provider, &prompt, schema, |value| check(value, &ids)).await;
            (ids, outcome)
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    let mut by_id: HashMap<String, Result<T, AssessmentError>> = HashMap::new();
    let mut auth_failures = 0;
    for (ids, outcome) in completed {
        match outcome {
            Ok(mut parsed) => {
                for id in ids {
                    let result = parsed.remove(&id).ok_or_else(|| AssessmentError {
                        item_ids: vec![id.clone()],
                        reason: "no result returned for item".to_string(),
                    });
                    by_id.insert(id, result);
                }
            }
            Err(failure) => {
                if failure.is_auth() {
                    auth_failures += 1;
                }
                error!(target: TARGET_LLM_REQUEST, "[{}]: batch of {} failed: {}", schema, ids.len(), failure);
                let batch_error = AssessmentError {
                    item_ids: ids.clone(),
                    reason: failure.to_string(),
                };
                for id in ids {
                    by_id.insert(id, Err(batch_error.clone()));
                }
            }
        }
    }

    // Reassemble in submission order; arrival order is arbitrary.
    let results = items
        .iter()
        .map(|(id, _)| {
            let result = by_id.get(id).cloned().unwrap_or_else(|| {
                Err(AssessmentError {
                    item_ids: vec![id.clone()],
                    reason: "item was not processed".to_string(),
                })
            });
            (id.clone(), result)
        })
        .collect();

    BatchRun {
        results,
        auth_failures,
        batches,
    }
}

/// Distinct batch errors, in first-seen order.
pub fn distinct_errors<'a, T: 'a, I>(results: I) -> Vec<AssessmentError>
where
    I: IntoIterator<Item = &'a Result<T, AssessmentError>>,
{
    let mut errors: Vec<AssessmentError> = Vec::new();
    for result in results {
        if let Err(e) = result {
            if !errors.contains(e) {
                errors.push(e.clone());
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_violations() {
        let expected = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(coverage_violations(&expected, ["c", "a", "b"], "assessments").is_empty());

        let violations = coverage_violations(&expected, ["a", "a", "z"], "assessments");
        let messages: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "assessments[1]: duplicate id \"a\"",
                "assessments[2]: unknown id \"z\"",
                "assessments: missing entry for id \"b\"",
                "assessments: missing entry for id \"c\"",
            ]
        );
    }

    #[test]
    fn test_auth_escalation_rule() {
        let run = |auth_failures, batches| BatchRun::<()> {
            results: vec![],
            auth_failures,
            batches,
        };
        assert!(!run(0, 3).auth_escalated());
        assert!(!run(1, 3).auth_escalated());
        assert!(run(2, 3).auth_escalated());
        assert!(run(1, 1).auth_escalated());
    }
}
