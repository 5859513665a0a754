//! Error types for the runner
//!
//! The runner itself only reports an exit code to its caller. These errors
//! describe why a run failed and are logged on the way to that exit code;
//! platform implementations return them from their resource hooks.

use thiserror::Error;

/// Exit code reported when a run finished without an explicit request.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code reported when initialization or a platform resource failed.
pub const EXIT_FAILURE: i32 = 1;

/// Result type for platform and runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while bringing a runner up
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Another runner is already driving a main loop on this thread
    #[error("a runner is already active on this thread")]
    AlreadyBound,

    /// The platform subsystem could not be initialized
    #[error("platform initialization failed: {reason}")]
    PlatformInit { reason: String },

    /// The main window could not be created
    #[error("window creation failed: {reason}")]
    WindowCreation { reason: String },

    /// The renderer could not be created for the main window
    #[error("renderer creation failed: {reason}")]
    RendererCreation { reason: String },

    /// The `on_inited` callback rejected the freshly created resources
    #[error("on_inited callback failed")]
    InitCallbackFailed,

    /// The handler's start hook returned failure
    #[error("handler start hook failed")]
    StartFailed,

    /// Backend specific failure
    #[error("platform error")]
    Platform(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl RunnerError {
    /// Create a platform initialization error
    pub fn platform_init(reason: impl Into<String>) -> Self {
        Self::PlatformInit {
            reason: reason.into(),
        }
    }

    /// Create a window creation error
    pub fn window_creation(reason: impl Into<String>) -> Self {
        Self::WindowCreation {
            reason: reason.into(),
        }
    }

    /// Create a renderer creation error
    pub fn renderer_creation(reason: impl Into<String>) -> Self {
        Self::RendererCreation {
            reason: reason.into(),
        }
    }

    /// Wrap a backend error
    pub fn platform<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Platform(Box::new(err))
    }
}
