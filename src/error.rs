use thiserror::Error;

/// All errors produced by `vtcore`.
///
/// Stage-local failures (`StageError`, `CircuitOpen`, `RetryExhausted`) are
/// recovered internally by the pipeline and surfaced only via counters and
/// health-check transitions — see `resilience`. Construction-time and
/// capture-time failures propagate to the caller.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("capture device error: {0}")]
    CaptureDevice(String),

    #[error("no input device available")]
    NoDeviceAvailable,

    #[error("capture halted: {0}")]
    CaptureHalted(String),

    #[error("unsupported capture format: {0}")]
    Unsupported(String),

    #[error("permission denied opening capture device")]
    PermissionDenied,

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("circuit '{0}' is open")]
    CircuitOpen(&'static str),

    #[error("retry exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("ring buffer is full — pipeline cannot keep up")]
    RingBufferFull,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
