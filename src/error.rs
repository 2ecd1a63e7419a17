use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a run. None of these are recoverable: the
/// simulation either starts with a fully valid setup or not at all, and a
/// failed frame leaves device state unverifiable.
#[derive(Debug, Error)]
pub enum SlimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("device error: {0}")]
    Device(String),
    #[error("failed to compile kernel `{kernel}`: {diagnostics}")]
    KernelCompile { kernel: String, diagnostics: String },
    #[error("resource error: {0}")]
    Resource(String),
    #[error("dispatch error during {phase}: {reason}")]
    Dispatch { phase: &'static str, reason: String },
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("window error: {0}")]
    Window(#[from] winit::error::OsError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("preset `{name}` not found at {}", path.display())]
    PresetNotFound { name: String, path: PathBuf },
    #[error("failed to read preset {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed preset {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("unknown simulation shader `{0}` (expected one of: {1})")]
    UnknownKernel(String, String),
}

pub type Result<T> = std::result::Result<T, SlimeError>;
