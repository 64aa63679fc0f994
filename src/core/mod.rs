//! Core module - Settings resolution, preset identity, launch orchestration and processes

pub mod engine;
mod error;
pub mod launch;
pub mod package;
pub mod preset;
pub mod process;
pub mod settings;
pub mod store;

pub use engine::{Engine, EngineId, Template, TemplateId};
pub use error::{ErrorKind, LaunchError, ResultCode};
pub use launch::{LaunchOutcome, LaunchRequest, Launcher};
pub use package::{Package, PackageId, PackageKind};
pub use preset::{Fingerprint, Preset, PresetId, PresetRegistry};
pub use process::{CommandSpec, ProcessHandle, ProcessRunner, ProcessSpawner};
pub use settings::{Scope, SettingsResolver};
pub use store::{CatalogStore, InsertOutcome, PresetStore, SettingsStore};
