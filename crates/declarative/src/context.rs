//! Reconcile context and callback traits
//!
//! These traits keep the pipeline free of any particular UI: the CLI plugs
//! in its own progress display and confirmation prompt.

use crate::config::{Configuration, delete_orphans_property};
use crate::error::{Error, Result};
use crate::selector::{NO_SELECTOR, SharedSelector};
use crate::types::{ChangeResult, ExecuteOptions};
use std::sync::Arc;

/// Progress callback for execution
///
/// Called from the thread driving the executor, never from workers.
pub trait ProgressCallback: Send + Sync {
    /// Called before a batch of changes is submitted
    fn on_batch_start(&self, count: usize);

    /// Called as each change reaches a terminal status
    fn on_change_complete(&self, result: &ChangeResult);

    /// Called once every change of the batch has a result
    fn on_batch_complete(&self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&self, _count: usize) {}
    fn on_change_complete(&self, _result: &ChangeResult) {}
    fn on_batch_complete(&self) {}
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Everything a run needs besides the resources themselves
#[derive(Clone)]
pub struct ReconcileContext {
    /// Settings handed to every extension
    pub configuration: Configuration,
    /// Restricts which resources take part in the run
    pub selector: SharedSelector,
    /// Emit `DELETE` for actual resources missing from the desired set
    pub delete_orphans: bool,
    pub options: ExecuteOptions,
    pub progress: Arc<dyn ProgressCallback>,
}

impl ReconcileContext {
    /// Build a context from configuration, reading `delete-orphans`.
    pub fn new(configuration: Configuration) -> Result<Self> {
        let delete_orphans = delete_orphans_property()
            .get(&configuration)
            .map_err(|source| Error::Configuration {
                extension: "reconciler".to_string(),
                source,
            })?
            .unwrap_or(false);
        Ok(Self {
            configuration,
            selector: Arc::new(NO_SELECTOR),
            delete_orphans,
            options: ExecuteOptions::default(),
            progress: Arc::new(NoProgress),
        })
    }

    pub fn with_selector(mut self, selector: SharedSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_delete_orphans(mut self, enabled: bool) -> Self {
        self.delete_orphans = enabled;
        self
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self {
            configuration: Configuration::new(),
            selector: Arc::new(NO_SELECTOR),
            delete_orphans: false,
            options: ExecuteOptions::default(),
            progress: Arc::new(NoProgress),
        }
    }
}

impl std::fmt::Debug for ReconcileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileContext")
            .field("configuration", &self.configuration)
            .field("selector", &self.selector.name())
            .field("delete_orphans", &self.delete_orphans)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_orphans_from_config() {
        let ctx = ReconcileContext::new(Configuration::new()).unwrap();
        assert!(!ctx.delete_orphans);

        let ctx = ReconcileContext::new(Configuration::new().with("delete-orphans", "true")).unwrap();
        assert!(ctx.delete_orphans);

        let err = ReconcileContext::new(Configuration::new().with("delete-orphans", "maybe")).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_auto_callbacks() {
        assert!(AutoConfirm.confirm("go?").unwrap());
        assert!(!AutoDecline.confirm("go?").unwrap());
    }
}
