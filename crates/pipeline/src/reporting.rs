//! Fire-and-forget error reporting.
//!
//! Both services report every handled failure exactly once, from their
//! outermost scope. Reporting must never fail the caller or hold it up: write
//! failures and timeouts are logged locally and dropped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::types::DEFAULT_ERROR_RETENTION;
use crate::{ErrorLog, ErrorRecord, FunctionName, Timestamp};

/// Upper bound on a single error-log write.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Writes [`ErrorRecord`]s for one function.
#[derive(Clone)]
pub struct ErrorReporter {
    log: Arc<dyn ErrorLog>,
    function_name: FunctionName,
    retention: Duration,
    timeout: Duration,
}

impl ErrorReporter {
    pub fn new(log: Arc<dyn ErrorLog>, function_name: FunctionName) -> Self {
        Self {
            log,
            function_name,
            retention: DEFAULT_ERROR_RETENTION,
            timeout: DEFAULT_REPORT_TIMEOUT,
        }
    }

    /// Overrides how long records are kept before expiry.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Overrides the per-write timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn function_name(&self) -> &FunctionName {
        &self.function_name
    }

    /// Records a failure of `step`. Never fails.
    pub async fn report(&self, step: &str, message: impl std::fmt::Display) {
        let record = ErrorRecord::new(
            &self.function_name,
            step,
            message,
            Timestamp::now(),
            self.retention,
        );

        error!(
            function = %record.lambda_function_name,
            step = %record.method_name,
            error = %record.error,
            "Handled failure"
        );

        match tokio::time::timeout(self.timeout, self.log.append(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Unable to write error record"),
            Err(_) => warn!(
                timeout_ms = self.timeout.as_millis() as u64,
                "Timed out writing error record"
            ),
        }
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("function_name", &self.function_name)
            .field("retention", &self.retention)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
