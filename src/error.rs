use thiserror::Error;

/// Structured validation/business-rule errors raised by the Grid Planner.
///
/// None of these carry side effects: a `PlannerError` means nothing was
/// persisted.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("invalid bounds: upper ({upper}) must be greater than lower ({lower}) and lower must be positive")]
    InvalidBounds { lower: String, upper: String },

    #[error("invalid level count {0}: must be in [2, 200]")]
    InvalidLevels(u32),

    #[error("invalid investment amount {0}: must be positive")]
    InvalidCapital(String),

    #[error("symbol {0} could not be resolved to a current price")]
    SymbolUnresolved(String),

    #[error("insufficient historical data for {symbol} ({have} of {want} days requested)")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        want: usize,
    },
}

/// Business-rule and infrastructure errors raised while applying a single
/// transition inside the Execution Engine.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("order {0} is not PENDING; transition is a no-op")]
    NotPending(uuid::Uuid),

    #[error("grid {0} is not ACTIVE; transition aborted")]
    GridNotActive(uuid::Uuid),

    #[error("datastore conflict after {0} retries")]
    SerializationConflict(u32),

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

/// Errors surfaced by the Grid Monitor while evaluating one tick.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("failed to acquire monitor lease; another worker holds it")]
    LeaseHeld,

    #[error("market data port timed out fetching prices")]
    MarketDataTimeout,

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

/// Errors from the Alert & Dedup layer.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("dispatch attempts exhausted for alert {0}")]
    DispatchExhausted(uuid::Uuid),

    #[error("channel transport error: {0}")]
    Transport(String),

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

/// Errors from the Scheduler's lease/single-flight machinery.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("task {0} is already running elsewhere (lease held)")]
    AlreadyRunning(String),

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

/// Top-level error taxonomy composing every component's error kind, the way
/// the teacher's `backend::error::AppError` composes its narrower variants.
///
/// Propagation policy (spec.md §7): components return one of these kinds;
/// only `Fatal` is allowed to escape a tick boundary and abort the process.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(#[from] PlannerError),

    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    #[error("monitor: {0}")]
    Monitor(#[from] MonitorError),

    #[error("alert: {0}")]
    Alert(#[from] AlertError),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Maps an error kind to the HTTP status code the API surface exposes,
    /// per spec.md §7 (Validation → 400, business rule → 409, transient →
    /// 503, fatal → 500).
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Execution(ExecutionError::SerializationConflict(_)) => 503,
            CoreError::Execution(_) => 409,
            CoreError::Monitor(MonitorError::MarketDataTimeout) => 503,
            CoreError::Monitor(_) => 409,
            CoreError::Alert(_) => 503,
            CoreError::Scheduler(SchedulerError::AlreadyRunning(_)) => 409,
            CoreError::Scheduler(_) => 503,
            CoreError::Fatal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let e = CoreError::Validation(PlannerError::InvalidLevels(1));
        assert_eq!(e.http_status(), 400);
    }

    #[test]
    fn serialization_conflict_maps_to_503() {
        let e = CoreError::Execution(ExecutionError::SerializationConflict(3));
        assert_eq!(e.http_status(), 503);
    }

    #[test]
    fn insufficient_cash_style_execution_error_maps_to_409() {
        let e = CoreError::Execution(ExecutionError::GridNotActive(uuid::Uuid::nil()));
        assert_eq!(e.http_status(), 409);
    }

    #[test]
    fn fatal_maps_to_500() {
        let e = CoreError::Fatal("config missing".into());
        assert_eq!(e.http_status(), 500);
    }
}
