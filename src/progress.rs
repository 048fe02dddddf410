//! Progress bar for change execution

use colored::Colorize;
use declarative::{ChangeResult, ChangeStatus, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};

/// Shows one bar per batch of changes; hidden when `quiet`
pub struct BarProgress {
    quiet: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            bar: Mutex::new(None),
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        match self.bar.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&self, count: usize) {
        let pb = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(count as u64)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        *self.bar() = Some(pb);
    }

    fn on_change_complete(&self, result: &ChangeResult) {
        if let Some(pb) = self.bar().as_ref() {
            if result.status == ChangeStatus::Failed {
                pb.println(format!("  {} {}", "✗".red(), result.description));
            }
            pb.set_message(result.change.key());
            pb.inc(1);
        }
    }

    fn on_batch_complete(&self) {
        if let Some(pb) = self.bar().take() {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ObjectMeta, Operation, ResourceChange, ResourceType};

    #[test]
    fn test_batch_lifecycle() {
        let progress = BarProgress::new(true);
        progress.on_batch_start(2);
        let change = ResourceChange {
            resource_type: ResourceType::new("g", "v1", "KafkaTopic"),
            metadata: ObjectMeta::default(),
            operation: Operation::Add,
            changes: vec![],
        };
        progress.on_change_complete(&ChangeResult::changed(change, "Create".into()));
        assert_eq!(progress.bar().as_ref().map(ProgressBar::position), Some(1));
        progress.on_batch_complete();
        assert!(progress.bar().is_none());
    }
}
