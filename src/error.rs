use thiserror::Error;

/// Errors surfaced by the depth-peeling pipeline.
///
/// Every variant is fatal for the frame that produced it: the coordinator
/// aborts the remaining passes and hands the error back to the caller. Nothing
/// in the crate retries on its own.
#[derive(Error, Debug)]
pub enum PeelError {
    /// A render target or depth texture could not be created.
    #[error("failed to allocate {label}: {reason}")]
    ResourceAllocation { label: String, reason: String },

    /// A configuration value was rejected; the previous value is still active.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A material program variant failed to compile.
    #[error("shader compilation failed for {label}: {message}")]
    ShaderCompilation { label: String, message: String },

    /// A pass was issued outside of `begin_frame` / `finish_frame`.
    #[error("no frame in flight")]
    FrameNotStarted,

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

impl PeelError {
    pub fn allocation(label: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResourceAllocation {
            label: label.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PeelResult<T> = Result<T, PeelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_error_names_the_resource() {
        let err = PeelError::allocation("PeelLayer3", "out of memory");
        assert_eq!(
            err.to_string(),
            "failed to allocate PeelLayer3: out of memory"
        );
    }

    #[test]
    fn surface_errors_convert() {
        let err: PeelError = wgpu::SurfaceError::Lost.into();
        assert!(matches!(err, PeelError::Surface(wgpu::SurfaceError::Lost)));
    }
}
