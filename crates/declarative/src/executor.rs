//! Execution engine - applies resource changes in parallel
//!
//! Each change is handed to the first handler supporting its operation and
//! runs as its own task on a bounded rayon pool. A failing or panicking
//! handler only fails its own change; the batch always yields one
//! [`ChangeResult`] per submitted change, in submission order.

use crate::context::ProgressCallback;
use crate::types::{ChangeResponse, ChangeResult, ExecuteOptions, Operation, ResourceChange};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Instant;

/// Applies changes of some operations against a backend session
pub trait ChangeHandler: Send + Sync {
    fn name(&self) -> String;

    /// Operations this handler can apply
    fn supported_operations(&self) -> Vec<Operation>;

    fn apply(&self, change: &ResourceChange) -> anyhow::Result<ChangeResponse>;

    /// Text shown for the change in plans and results
    fn describe(&self, change: &ResourceChange) -> String {
        change.describe()
    }
}

/// Acknowledges `NONE` changes without touching the backend
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneHandler;

impl ChangeHandler for NoneHandler {
    fn name(&self) -> String {
        "none".to_string()
    }

    fn supported_operations(&self) -> Vec<Operation> {
        vec![Operation::None]
    }

    fn apply(&self, _change: &ResourceChange) -> anyhow::Result<ChangeResponse> {
        Ok(ChangeResponse::default())
    }
}

/// Dispatches changes to handlers and collects their results
pub struct ChangeExecutor {
    handlers: Vec<Arc<dyn ChangeHandler>>,
}

impl ChangeExecutor {
    /// Create an executor; a [`NoneHandler`] is appended when no handler
    /// covers `NONE`.
    pub fn new(mut handlers: Vec<Arc<dyn ChangeHandler>>) -> Self {
        let covers_none = handlers
            .iter()
            .any(|h| h.supported_operations().contains(&Operation::None));
        if !covers_none {
            handlers.push(Arc::new(NoneHandler));
        }
        Self { handlers }
    }

    /// First handler supporting `operation`
    pub fn handler_for(&self, operation: Operation) -> Option<&Arc<dyn ChangeHandler>> {
        self.handlers
            .iter()
            .find(|h| h.supported_operations().contains(&operation))
    }

    /// Execute every change and return one result per change.
    ///
    /// Never fails as a whole: missing handlers, handler errors, panics and
    /// timeouts all become `FAILED` results.
    pub fn execute(
        &self,
        changes: Vec<ResourceChange>,
        opts: &ExecuteOptions,
        progress: &dyn ProgressCallback,
    ) -> Vec<ChangeResult> {
        if changes.is_empty() {
            return Vec::new();
        }

        progress.on_batch_start(changes.len());
        let results = if opts.dry_run {
            self.describe_all(changes, progress)
        } else {
            self.apply_all(changes, opts, progress)
        };
        progress.on_batch_complete();
        results
    }

    /// Dry run: report what would happen without calling any handler
    fn describe_all(&self, changes: Vec<ResourceChange>, progress: &dyn ProgressCallback) -> Vec<ChangeResult> {
        changes
            .into_iter()
            .map(|change| {
                let description = match self.handler_for(change.operation) {
                    Some(handler) => handler.describe(&change),
                    None => change.describe(),
                };
                let mut result = if change.operation.is_mutation() {
                    ChangeResult::changed(change, description)
                } else {
                    ChangeResult::ok(change, description)
                };
                result.dry_run = true;
                progress.on_change_complete(&result);
                result
            })
            .collect()
    }

    fn apply_all(
        &self,
        changes: Vec<ResourceChange>,
        opts: &ExecuteOptions,
        progress: &dyn ProgressCallback,
    ) -> Vec<ChangeResult> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(opts.jobs.max(1))
            .thread_name(|i| format!("change-executor-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("Failed to create thread pool ({e}), applying changes sequentially");
                return changes
                    .into_iter()
                    .map(|change| {
                        let result = match self.handler_for(change.operation) {
                            Some(handler) => apply_one(handler.as_ref(), change),
                            None => missing_handler(change),
                        };
                        progress.on_change_complete(&result);
                        result
                    })
                    .collect();
            }
        };

        let deadline = opts.timeout.map(|t| Instant::now() + t);
        let (tx, rx) = mpsc::channel::<(usize, ChangeResult)>();
        let mut slots: Vec<Option<ChangeResult>> = vec![None; changes.len()];
        let mut submitted: Vec<Option<ResourceChange>> = vec![None; changes.len()];
        let mut outstanding = 0usize;

        for (idx, change) in changes.into_iter().enumerate() {
            let Some(handler) = self.handler_for(change.operation) else {
                let result = missing_handler(change);
                progress.on_change_complete(&result);
                slots[idx] = Some(result);
                continue;
            };
            let handler = Arc::clone(handler);
            let tx = tx.clone();
            submitted[idx] = Some(change.clone());
            outstanding += 1;
            pool.spawn(move || {
                let result = apply_one(handler.as_ref(), change);
                // The receiver is gone once the deadline has passed
                let _ = tx.send((idx, result));
            });
        }
        drop(tx);

        while outstanding > 0 {
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(remaining)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((idx, result)) => {
                    progress.on_change_complete(&result);
                    slots[idx] = Some(result);
                    outstanding -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("{outstanding} change(s) still running after timeout");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        slots
            .into_iter()
            .zip(submitted)
            .filter_map(|(slot, change)| match (slot, change) {
                (Some(result), _) => Some(result),
                (None, Some(change)) => {
                    let description = change.describe();
                    let error = match opts.timeout {
                        Some(t) => format!("timed out after {}s", t.as_secs_f64()),
                        None => "worker exited without a result".to_string(),
                    };
                    let result = ChangeResult::failed(change, description, error);
                    progress.on_change_complete(&result);
                    Some(result)
                }
                (None, None) => None,
            })
            .collect()
    }
}

fn apply_one(handler: &dyn ChangeHandler, change: ResourceChange) -> ChangeResult {
    let description = handler.describe(&change);
    log::debug!("Applying {description} with handler '{}'", handler.name());

    match catch_unwind(AssertUnwindSafe(|| handler.apply(&change))) {
        Ok(Ok(response)) => {
            let description = match response.message {
                Some(message) => format!("{description}: {message}"),
                None => description,
            };
            if change.operation.is_mutation() {
                ChangeResult::changed(change, description)
            } else {
                ChangeResult::ok(change, description)
            }
        }
        Ok(Err(e)) => {
            log::debug!("Change {} failed: {e:#}", change.key());
            ChangeResult::failed(change, description, format!("{e:#}"))
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ChangeResult::failed(
                change,
                description,
                format!("handler '{}' panicked: {message}", handler.name()),
            )
        }
    }
}

fn missing_handler(change: ResourceChange) -> ChangeResult {
    let description = change.describe();
    let error = format!("no handler supports operation {}", change.operation);
    ChangeResult::failed(change, description, error)
}
