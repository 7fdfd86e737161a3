//! Observability sink for dispatched operations and tracing setup.

use std::time::Duration;

use cartline_core::{ErrorKind, Outcome};

use crate::service::operation::DispatchError;

/// How a dispatch ended, as seen by the logging stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Success,
    /// Failing outcome, classified by the kind of its first error.
    Failed(ErrorKind),
    /// Failing outcome produced by the cancellation signal.
    Cancelled,
    /// The chain returned a [`DispatchError`].
    Fault,
}

impl OutcomeClass {
    #[must_use]
    pub fn of<T>(result: &Result<Outcome<T>, DispatchError>) -> Self {
        match result {
            Ok(Outcome::Success(_)) => Self::Success,
            Ok(Outcome::Failure(errors)) if errors.first().is_cancelled() => Self::Cancelled,
            Ok(Outcome::Failure(errors)) => Self::Failed(errors.first().kind),
            Err(_) => Self::Fault,
        }
    }

    /// Label used for the `outcome` log field and metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(kind) => kind.as_str(),
            Self::Cancelled => "cancelled",
            Self::Fault => "fault",
        }
    }
}

/// One completed dispatch.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub operation: &'static str,
    pub call_id: u64,
    /// Wall-clock millis since epoch when the dispatch entered the chain.
    pub started_at_ms: i64,
    pub duration: Duration,
    pub outcome: OutcomeClass,
}

/// Destination of [`OperationRecord`]s. Called once per dispatch, after the
/// outcome is known. Must not block.
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, record: &OperationRecord);
}

/// Default sink: a `tracing` event plus `metrics` counter and histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, record: &OperationRecord) {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = record.duration.as_millis() as u64;
        match record.outcome {
            OutcomeClass::Fault | OutcomeClass::Failed(ErrorKind::Unexpected) => {
                tracing::warn!(
                    operation = record.operation,
                    call_id = record.call_id,
                    duration_ms,
                    outcome = record.outcome.as_str(),
                    "operation complete"
                );
            }
            _ => {
                tracing::info!(
                    operation = record.operation,
                    call_id = record.call_id,
                    duration_ms,
                    outcome = record.outcome.as_str(),
                    "operation complete"
                );
            }
        }

        metrics::counter!(
            "cartline_requests_total",
            "operation" => record.operation,
            "outcome" => record.outcome.as_str(),
        )
        .increment(1);
        metrics::histogram!(
            "cartline_request_duration_seconds",
            "operation" => record.operation,
        )
        .record(record.duration.as_secs_f64());
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides
/// `default_directive` when set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat, default_directive: &str) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
