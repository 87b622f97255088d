//! Fatal failure taxonomy for a live image run.
//!
//! Every step returns `anyhow::Result`. When a step fails for one of the
//! reasons below it raises the matching [`LiveError`], so callers can get the
//! kind back with `err.downcast_ref::<LiveError>()` even after context has
//! been layered on top.
//!
//! Soft conditions (missing EFI assets, missing hybrid or implant tool,
//! missing splash or memtest) are never errors; they are logged with
//! `tracing::warn!` and the run continues with reduced functionality.

use std::path::PathBuf;

use thiserror::Error;

/// A fatal error that ends the current run.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("unable to find valid kernels under {root}/boot, please check the repo")]
    NoKernelFound { root: PathBuf },

    #[error("no initramfs or initrd found for kernel {version} (looked for {})", .searched.join(", "))]
    MissingInitrd {
        version: String,
        searched: Vec<String>,
    },

    #[error("bootloader assets not installed: {detail}")]
    MissingBootloaderAssets { detail: String },

    #[error("unable to copy {} to {}", .src.display(), .dst.display())]
    ArtifactCopyFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ISO creation failed: {detail}")]
    IsoMasteringFailed { detail: String },

    #[error("hybrid ISO creation failed: {detail}")]
    HybridPostprocessFailed { detail: String },

    #[error("architecture '{arch}' is not supported")]
    UnsupportedArchitecture { arch: String },

    #[error("initramfs generation failed: {detail}")]
    InitramfsFailed { detail: String },

    #[error("filesystem compression failed: {detail}")]
    CompressionFailed { detail: String },

    #[error("image minimization failed: {detail}")]
    MinimizeFailed { detail: String },

    #[error("packaging into {} failed: {detail}", .target.display())]
    PackagingFailed { target: PathBuf, detail: String },

    #[error("output {} is locked by another run", .lock.display())]
    OutputLocked { lock: PathBuf },
}

/// Copyable discriminant of [`LiveError`], used by the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoKernelFound,
    MissingInitrd,
    MissingBootloaderAssets,
    ArtifactCopyFailed,
    IsoMasteringFailed,
    HybridPostprocessFailed,
    UnsupportedArchitecture,
    InitramfsFailed,
    CompressionFailed,
    MinimizeFailed,
    PackagingFailed,
    OutputLocked,
    /// Failure not covered by the taxonomy (plain I/O, bad config, ...).
    Other,
}

impl LiveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LiveError::NoKernelFound { .. } => FailureKind::NoKernelFound,
            LiveError::MissingInitrd { .. } => FailureKind::MissingInitrd,
            LiveError::MissingBootloaderAssets { .. } => FailureKind::MissingBootloaderAssets,
            LiveError::ArtifactCopyFailed { .. } => FailureKind::ArtifactCopyFailed,
            LiveError::IsoMasteringFailed { .. } => FailureKind::IsoMasteringFailed,
            LiveError::HybridPostprocessFailed { .. } => FailureKind::HybridPostprocessFailed,
            LiveError::UnsupportedArchitecture { .. } => FailureKind::UnsupportedArchitecture,
            LiveError::InitramfsFailed { .. } => FailureKind::InitramfsFailed,
            LiveError::CompressionFailed { .. } => FailureKind::CompressionFailed,
            LiveError::MinimizeFailed { .. } => FailureKind::MinimizeFailed,
            LiveError::PackagingFailed { .. } => FailureKind::PackagingFailed,
            LiveError::OutputLocked { .. } => FailureKind::OutputLocked,
        }
    }
}

/// Classify an arbitrary error chain.
pub fn failure_kind(err: &anyhow::Error) -> FailureKind {
    err.downcast_ref::<LiveError>()
        .map(LiveError::kind)
        .unwrap_or(FailureKind::Other)
}
