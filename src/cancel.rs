use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag for one pipeline run.
///
/// Cloneable; clones share the same flag. Callers set it, the pipeline only
/// reads it at suspension points, and the orchestrator clears it when a new
/// run begins. Concurrent runs against the same token are not supported.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_canceled());

        token.cancel();
        assert!(observer.is_canceled());

        token.clear();
        assert!(!observer.is_canceled());
    }
}
