// =============================================================================
// qgrad-core - Unified Error Types
// =============================================================================
// Table of Contents:
//   1. QgradError - Main error enum
//   2. TraceError - Tracing-time errors
//   3. DeviceError - Device-side errors
//   4. ArgumentError - Jacobian request errors
// =============================================================================
// Purpose: Unified error handling across the tracer, device adapter, and
//          gradient engine. Every failure reaches the caller synchronously;
//          there is no local recovery (see crate-level docs on QuantumNode).
// =============================================================================

use thiserror::Error;

// =============================================================================
// 1. QgradError - Main error enum
// =============================================================================

#[derive(Debug, Error)]
pub enum QgradError {
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("argument error: {0}")]
    Argument(#[from] ArgumentError),

    #[error("internal error: {0}")]
    Internal(String),
}

// =============================================================================
// 2. TraceError - Tracing-time errors (a.k.a. QuantumFunctionError)
// =============================================================================

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("re-entrant trace: a construction context is already active on this thread")]
    ReentrantTrace,

    #[error("operation appended after an observable was already queued")]
    GateAfterObservable,

    #[error("builder must return a single observable or a non-empty ordered sequence of observables")]
    WrongReturnShape,

    #[error("returned observable carries no return_type")]
    MissingReturnType,

    #[error("all measured observables must be returned in order")]
    ReturnOrderMismatch,

    #[error("tape mixes continuous-variable and qubit operations")]
    MixedFamily,

    #[error("wire {wire} is measured by more than one returned observable")]
    WireMeasuredTwice { wire: usize },

    #[error("wire {wire} is out of range for a device with {num_wires} wires")]
    WireOutOfRange { wire: usize, num_wires: usize },

    #[error("cannot differentiate through a sample observable (slot {slot})")]
    DifferentiatingSample { slot: usize },

    #[error("no active construction context: operations can only be constructed inside a builder")]
    NoActiveContext,
}

// =============================================================================
// 3. DeviceError - Device-side errors
// =============================================================================

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("operation '{0}' is not supported by this device")]
    UnsupportedOperation(String),

    #[error("observable '{0}' is not supported by this device")]
    UnsupportedObservable(String),

    #[error("device does not implement variance measurement for '{0}'")]
    VarianceNotImplemented(String),

    #[error("device does not implement sampling for '{0}'")]
    SampleNotImplemented(String),

    #[error("device execution failed: {0}")]
    ExecutionFailed(String),
}

// =============================================================================
// 4. ArgumentError - Jacobian request errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("unknown gradient method: {0}")]
    UnknownMethod(String),

    #[error("duplicate index {0} in `which`")]
    DuplicateIndex(usize),

    #[error("index {index} in `which` is out of range for {num_params} parameters")]
    IndexOutOfRange { index: usize, num_params: usize },

    #[error("order must be 1 or 2, got {0}")]
    InvalidOrder(u8),

    #[error("parameter {slot} was requested with method 'analytic' but its best method is '{actual}'")]
    AnalyticUnavailable { slot: usize, actual: String },
}

// =============================================================================
// Result type alias
// =============================================================================

pub type QgradResult<T> = Result<T, QgradError>;

// =============================================================================
// Error context extension trait
// =============================================================================

pub trait ErrorContext<T> {
    fn context(self, msg: impl Into<String>) -> QgradResult<T>;
    fn with_context<F>(self, f: F) -> QgradResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: std::error::Error> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: impl Into<String>) -> QgradResult<T> {
        self.map_err(|e| QgradError::Internal(format!("{}: {}", msg.into(), e)))
    }

    fn with_context<F>(self, f: F) -> QgradResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| QgradError::Internal(format!("{}: {}", f(), e)))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, msg: impl Into<String>) -> QgradResult<T> {
        self.ok_or_else(|| QgradError::Internal(msg.into()))
    }

    fn with_context<F>(self, f: F) -> QgradResult<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| QgradError::Internal(f()))
    }
}
