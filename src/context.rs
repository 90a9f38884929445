use crate::error::DockvError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Deadline and cancellation signals carried by every request.
///
/// Cloning shares the cancel flag, so a handler can hand a clone to the
/// layer driving the substrate and cancel it from the request side. Every
/// blocking facade operation and iterator advance calls `check` first.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), DockvError> {
        if self.is_cancelled() {
            return Err(DockvError::Cancelled("request cancelled".into()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(DockvError::Cancelled("deadline exceeded".into()));
            }
        }
        Ok(())
    }
}
