//! Launch errors and the result codes reported to the command layer

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`LaunchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PreconditionMissing,
    FilesystemMissing,
    SpawnFailure,
    IntegrityFault,
    Runtime,
    Store,
}

/// Process exit codes shared with the CLI. Only their distinctness is relied upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    Success = 0,
    Usage = 1,
    EngineNotFound = 2,
    PackageNotFound = 3,
    PresetNameCollision = 4,
    PresetCreateFailure = 5,
    RequiredSettingMissing = 6,
    ExecutableNotFound = 7,
    WorkingDirectoryNotFound = 8,
    ProcessSpawnFailure = 9,
    LaunchRuntimeFailure = 10,
    IntegrityFault = 11,
    StoreFailure = 12,
}

impl ResultCode {
    pub fn all() -> &'static [ResultCode] {
        &[
            Self::Success,
            Self::Usage,
            Self::EngineNotFound,
            Self::PackageNotFound,
            Self::PresetNameCollision,
            Self::PresetCreateFailure,
            Self::RequiredSettingMissing,
            Self::ExecutableNotFound,
            Self::WorkingDirectoryNotFound,
            Self::ProcessSpawnFailure,
            Self::LaunchRuntimeFailure,
            Self::IntegrityFault,
            Self::StoreFailure,
        ]
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ResultCode> for std::process::ExitCode {
    fn from(code: ResultCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("engine '{0}' not found")]
    EngineNotFound(String),

    /// Only reachable from catalog commands, so it is reported as a usage error
    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    #[error("{kind} '{name}' not found")]
    PackageNotFound {
        kind: crate::core::PackageKind,
        name: String,
    },

    #[error("preset name '{0}' is already used by a different combination")]
    PresetNameCollision(String),

    #[error("failed to create preset: {0}")]
    PresetCreateFailure(String),

    #[error("engine '{engine}' has no '{setting}' setting")]
    RequiredSettingMissing { engine: String, setting: &'static str },

    #[error("executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("working directory not found: {}", .0.display())]
    WorkingDirectoryNotFound(PathBuf),

    #[error("failed to start {}: {source}", .program.display())]
    SpawnFailure {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for process {pid}: {source}")]
    Runtime {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("{count} presets share fingerprint {fingerprint}")]
    IntegrityFault { fingerprint: String, count: usize },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl LaunchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EngineNotFound(_) | Self::TemplateNotFound(_) | Self::PackageNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::PresetNameCollision(_) => ErrorKind::AlreadyExists,
            Self::PresetCreateFailure(_) => ErrorKind::Store,
            Self::RequiredSettingMissing { .. } => ErrorKind::PreconditionMissing,
            Self::ExecutableNotFound(_) | Self::WorkingDirectoryNotFound(_) => {
                ErrorKind::FilesystemMissing
            }
            Self::SpawnFailure { .. } => ErrorKind::SpawnFailure,
            Self::Runtime { .. } => ErrorKind::Runtime,
            Self::IntegrityFault { .. } => ErrorKind::IntegrityFault,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::EngineNotFound(_) => ResultCode::EngineNotFound,
            Self::TemplateNotFound(_) => ResultCode::Usage,
            Self::PackageNotFound { .. } => ResultCode::PackageNotFound,
            Self::PresetNameCollision(_) => ResultCode::PresetNameCollision,
            Self::PresetCreateFailure(_) => ResultCode::PresetCreateFailure,
            Self::RequiredSettingMissing { .. } => ResultCode::RequiredSettingMissing,
            Self::ExecutableNotFound(_) => ResultCode::ExecutableNotFound,
            Self::WorkingDirectoryNotFound(_) => ResultCode::WorkingDirectoryNotFound,
            Self::SpawnFailure { .. } => ResultCode::ProcessSpawnFailure,
            Self::Runtime { .. } => ResultCode::LaunchRuntimeFailure,
            Self::IntegrityFault { .. } => ResultCode::IntegrityFault,
            Self::Store(_) => ResultCode::StoreFailure,
        }
    }
}
