use thiserror::Error;

/// Fatal graphics failures.
///
/// Context loss is not an error: objects recreate their native state on the
/// next use and callers never observe it.
#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error("no suitable GPU adapter is available")]
    AdapterUnavailable,
    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),
    #[error("failed to compile shader `{label}`:\n{log}")]
    ShaderCompile { label: String, log: String },
    #[error("the GPU device has been lost")]
    DeviceLost,
    #[error("failed to read back texture: {0}")]
    Readback(String),
}
