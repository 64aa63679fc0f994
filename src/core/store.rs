//! Storage seams used by the resolver and the launcher
//!
//! The SQLite [`Database`](crate::persistence::Database) implements all three traits;
//! the launcher only ever sees them as trait objects.

use anyhow::Result;

use super::engine::{Engine, EngineId};
use super::package::{Package, PackageId, PackageKind};
use super::preset::{Fingerprint, Preset, PresetId};
use super::settings::Scope;

/// Durable `(scope, owner, name) -> value` table
pub trait SettingsStore: Send + Sync {
    fn get_setting(&self, scope: Scope, owner: &str, name: &str) -> Result<Option<String>>;

    fn set_setting(&self, scope: Scope, owner: &str, name: &str, value: &str) -> Result<()>;

    /// Returns whether a value was removed
    fn remove_setting(&self, scope: Scope, owner: &str, name: &str) -> Result<bool>;

    /// Settings under `owner` whose name starts with `prefix`, ordered by name
    fn list_settings(&self, scope: Scope, owner: &str, prefix: &str)
        -> Result<Vec<(String, String)>>;

    /// Template value captured when `engine` was created from a template
    fn inherited_setting(&self, engine: EngineId, name: &str) -> Result<Option<String>>;
}

/// Name and id lookups over engines and packages
pub trait CatalogStore: Send + Sync {
    fn engine_by_name(&self, name: &str) -> Result<Option<Engine>>;

    fn engine_by_id(&self, id: EngineId) -> Result<Option<Engine>>;

    fn package_by_name(&self, kind: PackageKind, name: &str) -> Result<Option<Package>>;

    fn package_by_id(&self, id: PackageId) -> Result<Option<Package>>;
}

/// Result of an atomic insert-if-absent on the preset table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another preset already carries this fingerprint
    FingerprintExists,
    /// Another preset already carries this name
    NameTaken,
}

pub trait PresetStore: Send + Sync {
    /// All presets carrying `fingerprint`; more than one is an integrity fault
    fn presets_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<Preset>>;

    fn preset_by_name(&self, name: &str) -> Result<Option<Preset>>;

    fn insert_preset(&self, preset: &Preset) -> Result<InsertOutcome>;

    /// Record a successful launch of the preset
    fn mark_preset_used(&self, id: PresetId) -> Result<()>;
}
