use std::sync::atomic::{AtomicI64, Ordering};

/// What to do about a stop with reason `Step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    /// Deliver the stop to the client.
    Surface,
    /// The step landed outside the workspace after a step-in: step back out.
    StepOut,
    /// The step escaped the workspace some other way: keep going.
    Continue,
}

/// Step stops that land outside the user's workspace (libc, the dynamic
/// loader) are never shown; instead a corrective command is re-issued and
/// the `running` notification it triggers is swallowed so the client sees
/// one uninterrupted `continued`.
pub struct StepFilter {
    workspace: String,
    skip_continued_count: AtomicI64,
}

impl StepFilter {
    pub fn new(workspace: impl Into<String>) -> StepFilter {
        StepFilter {
            workspace: workspace.into(),
            skip_continued_count: AtomicI64::new(0),
        }
    }

    pub fn verdict(&self, full_path: &str, pre_action: &str) -> StepVerdict {
        if full_path.starts_with(&self.workspace) {
            return StepVerdict::Surface;
        }
        if pre_action == "exec-step" {
            StepVerdict::StepOut
        } else {
            StepVerdict::Continue
        }
    }

    /// Record that a corrective command was re-issued; its `running`
    /// notification must not reach the client.
    pub fn expect_skipped_continued(&self) {
        self.skip_continued_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Called for every `running` notification. True when this one pairs
    /// with a re-issued command and must be suppressed.
    pub fn consume_skipped_continued(&self) -> bool {
        let mut count = self.skip_continued_count.load(Ordering::SeqCst);
        while count > 0 {
            match self.skip_continued_count.compare_exchange(
                count,
                count - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => count = actual,
            }
        }
        false
    }

    pub fn reset(&self) {
        self.skip_continued_count.store(0, Ordering::SeqCst);
    }
}
