//! Presets - Deduplicated, named launch combinations
//!
//! A preset is identified by the fingerprint of `(engine, base, additional...)`.
//! Two launches of the same combination always land on the same preset, whatever
//! name or passthrough arguments the caller supplies.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::EngineId;
use super::error::LaunchError;
use super::package::PackageId;
use super::store::{InsertOutcome, PresetStore};

/// Upper bound on `name`, `name1`, `name2`, ... candidates tried by auto-naming
pub const MAX_NAME_ATTEMPTS: u32 = 10_000;

const TAG_NO_BASE: u8 = 0;
const TAG_BASE: u8 = 1;

/// Unique identifier for a preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetId(pub Uuid);

impl PresetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PresetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PresetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lowercase hex SHA-256 of a launch combination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash an ordered combination.
    ///
    /// Every field is length-prefixed and the base slot carries a tag byte, so the
    /// "no base" case cannot collide with any real id and the additional packages
    /// are hashed in exactly the order given.
    pub fn compute(engine: EngineId, base: Option<PackageId>, additional: &[PackageId]) -> Self {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, engine.0.as_bytes());
        match base {
            Some(id) => {
                hasher.update([TAG_BASE]);
                write_field(&mut hasher, id.0.as_bytes());
            }
            None => hasher.update([TAG_NO_BASE]),
        }
        hasher.update((additional.len() as u64).to_le_bytes());
        for id in additional {
            write_field(&mut hasher, id.0.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a fingerprint read back from storage
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// A persisted launch combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub id: PresetId,
    pub name: String,
    pub engine_id: EngineId,
    pub base_id: Option<PackageId>,
    /// Additional packages in load order
    pub additional_ids: Vec<PackageId>,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub launch_count: u32,
}

impl Preset {
    pub fn new(
        name: impl Into<String>,
        engine_id: EngineId,
        base_id: Option<PackageId>,
        additional_ids: Vec<PackageId>,
    ) -> Self {
        let fingerprint = Fingerprint::compute(engine_id, base_id, &additional_ids);
        Self {
            id: PresetId::new(),
            name: name.into(),
            engine_id,
            base_id,
            additional_ids,
            fingerprint,
            created_at: Utc::now(),
            last_used_at: None,
            launch_count: 0,
        }
    }
}

/// Base name for an unnamed preset: last additional package, else base, else engine
pub fn default_name<'a>(
    engine_name: &'a str,
    base_name: Option<&'a str>,
    additional_names: &'a [String],
) -> &'a str {
    additional_names
        .last()
        .map(String::as_str)
        .or(base_name)
        .unwrap_or(engine_name)
}

/// `base`, `base1`, `base2`, ... up to [`MAX_NAME_ATTEMPTS`] candidates
pub fn name_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((1..MAX_NAME_ATTEMPTS).map(move |n| format!("{}{}", base, n)))
}

/// A combination to find or create
#[derive(Debug, Clone)]
pub struct PresetRequest<'a> {
    pub engine_id: EngineId,
    pub engine_name: &'a str,
    pub base: Option<(PackageId, &'a str)>,
    /// Additional packages as `(id, name)` in load order
    pub additional: Vec<(PackageId, &'a str)>,
    /// Explicit preset name; auto-generated when absent
    pub name: Option<&'a str>,
}

/// Outcome of [`PresetRegistry::find_or_create`]
#[derive(Debug, Clone)]
pub struct PresetResolution {
    pub preset: Preset,
    /// Whether this call inserted the preset
    pub created: bool,
}

/// Find-or-create over a [`PresetStore`]
#[derive(Clone)]
pub struct PresetRegistry {
    store: Arc<dyn PresetStore>,
}

impl PresetRegistry {
    pub fn new(store: Arc<dyn PresetStore>) -> Self {
        Self { store }
    }

    /// Zero or one preset for `fingerprint`; several is an integrity fault
    pub fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Preset>, LaunchError> {
        let mut found = self.store.presets_by_fingerprint(fingerprint)?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            count => Err(LaunchError::IntegrityFault {
                fingerprint: fingerprint.to_string(),
                count,
            }),
        }
    }

    /// Insert a preset under an exact name
    pub fn create(
        &self,
        name: &str,
        engine_id: EngineId,
        base_id: Option<PackageId>,
        additional_ids: Vec<PackageId>,
    ) -> Result<Preset, LaunchError> {
        let preset = Preset::new(name, engine_id, base_id, additional_ids);
        match self.store.insert_preset(&preset)? {
            InsertOutcome::Inserted => {
                info!("Created preset '{}' ({})", preset.name, preset.fingerprint);
                Ok(preset)
            }
            InsertOutcome::NameTaken => Err(LaunchError::PresetNameCollision(name.to_string())),
            InsertOutcome::FingerprintExists => Err(LaunchError::PresetCreateFailure(format!(
                "combination {} already exists",
                preset.fingerprint
            ))),
        }
    }

    /// Reuse the preset for this combination or create one.
    ///
    /// The store's uniqueness constraints are the only enforcement point; losing a
    /// race on the fingerprint re-fetches the winner instead of failing.
    pub fn find_or_create(&self, request: &PresetRequest<'_>) -> Result<PresetResolution, LaunchError> {
        let base_id = request.base.map(|(id, _)| id);
        let additional_ids: Vec<PackageId> = request.additional.iter().map(|(id, _)| *id).collect();
        let fingerprint = Fingerprint::compute(request.engine_id, base_id, &additional_ids);

        if let Some(preset) = self.find_by_fingerprint(&fingerprint)? {
            if let Some(name) = request.name {
                if name != preset.name {
                    warn!(
                        "Combination already saved as preset '{}', ignoring requested name '{}'",
                        preset.name, name
                    );
                }
            }
            debug!("Reusing preset '{}'", preset.name);
            return Ok(PresetResolution {
                preset,
                created: false,
            });
        }

        let base_name = match request.name {
            Some(name) => name.to_string(),
            None => {
                let additional_names: Vec<String> =
                    request.additional.iter().map(|(_, n)| n.to_string()).collect();
                default_name(
                    request.engine_name,
                    request.base.map(|(_, n)| n),
                    &additional_names,
                )
                .to_string()
            }
        };
        let attempts = if request.name.is_some() {
            1
        } else {
            MAX_NAME_ATTEMPTS as usize
        };

        for candidate in name_candidates(&base_name).take(attempts) {
            // Skip names already in use
            if request.name.is_none() && self.store.preset_by_name(&candidate)?.is_some() {
                continue;
            }

            let preset = Preset::new(
                candidate.as_str(),
                request.engine_id,
                base_id,
                additional_ids.clone(),
            );
            match self.store.insert_preset(&preset)? {
                InsertOutcome::Inserted => {
                    info!("Created preset '{}' ({})", preset.name, preset.fingerprint);
                    return Ok(PresetResolution {
                        preset,
                        created: true,
                    });
                }
                InsertOutcome::FingerprintExists => {
                    debug!("Preset for {} appeared concurrently, re-fetching", fingerprint);
                    return match self.find_by_fingerprint(&fingerprint)? {
                        Some(preset) => Ok(PresetResolution {
                            preset,
                            created: false,
                        }),
                        None => Err(LaunchError::PresetCreateFailure(format!(
                            "combination {} reported as existing but could not be read",
                            fingerprint
                        ))),
                    };
                }
                InsertOutcome::NameTaken => {
                    if request.name.is_some() {
                        return Err(LaunchError::PresetNameCollision(candidate));
                    }
                }
            }
        }

        Err(LaunchError::PresetCreateFailure(format!(
            "no free preset name after {} attempts",
            MAX_NAME_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Database;

    fn ids(n: usize) -> Vec<PackageId> {
        (0..n).map(|_| PackageId::new()).collect()
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let engine = EngineId::new();
        let base = PackageId::new();
        let extra = ids(3);
        let a = Fingerprint::compute(engine, Some(base), &extra);
        let b = Fingerprint::compute(engine, Some(base), &extra.clone());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_is_stable_across_runs() {
        let engine = EngineId(Uuid::from_u128(1));
        let base = PackageId(Uuid::from_u128(2));
        let fp = Fingerprint::compute(engine, Some(base), &[]);
        let again = Fingerprint::compute(
            EngineId(Uuid::parse_str(&engine.to_string()).unwrap()),
            Some(PackageId(Uuid::parse_str(&base.to_string()).unwrap())),
            &[],
        );
        assert_eq!(fp, again);
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let engine = EngineId::new();
        let base = Some(PackageId::new());
        let x = PackageId::new();
        let y = PackageId::new();
        assert_ne!(
            Fingerprint::compute(engine, base, &[x, y]),
            Fingerprint::compute(engine, base, &[y, x])
        );
    }

    #[test]
    fn missing_base_differs_from_any_base() {
        let engine = EngineId::new();
        let x = PackageId::new();
        assert_ne!(
            Fingerprint::compute(engine, None, &[x]),
            Fingerprint::compute(engine, Some(x), &[])
        );
        assert_ne!(
            Fingerprint::compute(engine, None, &[]),
            Fingerprint::compute(engine, Some(PackageId(Uuid::nil())), &[])
        );
    }

    #[test]
    fn default_name_prefers_last_additional() {
        let extras = vec!["sigil".to_string(), "brutal".to_string()];
        assert_eq!(default_name("gzdoom", Some("doom2"), &extras), "brutal");
        assert_eq!(default_name("gzdoom", Some("doom2"), &[]), "doom2");
        assert_eq!(default_name("gzdoom", None, &[]), "gzdoom");
    }

    #[test]
    fn name_candidates_append_counter() {
        let names: Vec<String> = name_candidates("doom2").take(3).collect();
        assert_eq!(names, vec!["doom2", "doom21", "doom22"]);
        assert_eq!(name_candidates("x").count(), MAX_NAME_ATTEMPTS as usize);
    }

    #[test]
    fn auto_naming_skips_taken_names() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = PresetRegistry::new(db.clone());
        let engine = EngineId::new();

        let first = PresetRequest {
            engine_id: engine,
            engine_name: "gzdoom",
            base: Some((PackageId::new(), "doom2")),
            additional: vec![],
            name: None,
        };
        let second = PresetRequest {
            base: Some((PackageId::new(), "doom2")),
            ..first.clone()
        };
        let third = PresetRequest {
            base: Some((PackageId::new(), "doom2")),
            ..first.clone()
        };

        assert_eq!(registry.find_or_create(&first).unwrap().preset.name, "doom2");
        assert_eq!(registry.find_or_create(&second).unwrap().preset.name, "doom21");
        assert_eq!(registry.find_or_create(&third).unwrap().preset.name, "doom22");
    }

    #[test]
    fn same_combination_is_reused() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = PresetRegistry::new(db.clone());
        let request = PresetRequest {
            engine_id: EngineId::new(),
            engine_name: "gzdoom",
            base: Some((PackageId::new(), "doom2")),
            additional: vec![(PackageId::new(), "sigil")],
            name: None,
        };

        let first = registry.find_or_create(&request).unwrap();
        assert!(first.created);
        let named = PresetRequest {
            name: Some("other"),
            ..request.clone()
        };
        let second = registry.find_or_create(&named).unwrap();
        assert!(!second.created);
        assert_eq!(first.preset.id, second.preset.id);
        assert_eq!(second.preset.name, "sigil");
    }

    #[test]
    fn explicit_name_collision_is_reported() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = PresetRegistry::new(db.clone());
        let engine = EngineId::new();
        registry
            .create("coop", engine, Some(PackageId::new()), vec![])
            .unwrap();

        let request = PresetRequest {
            engine_id: engine,
            engine_name: "gzdoom",
            base: Some((PackageId::new(), "tnt")),
            additional: vec![],
            name: Some("coop"),
        };
        let err = registry.find_or_create(&request).unwrap_err();
        assert!(matches!(err, LaunchError::PresetNameCollision(ref n) if n == "coop"));
    }

    #[test]
    fn create_refuses_duplicate_fingerprint() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = PresetRegistry::new(db.clone());
        let engine = EngineId::new();
        let base = Some(PackageId::new());
        registry.create("a", engine, base, vec![]).unwrap();

        let err = registry.create("b", engine, base, vec![]).unwrap_err();
        assert!(matches!(err, LaunchError::PresetCreateFailure(_)));
    }

    /// Misses the first fingerprint lookup, as if another writer committed right after it
    struct LateWriterStore {
        inner: Arc<Database>,
        missed: std::sync::atomic::AtomicBool,
    }

    impl PresetStore for LateWriterStore {
        fn presets_by_fingerprint(&self, fingerprint: &Fingerprint) -> anyhow::Result<Vec<Preset>> {
            use std::sync::atomic::Ordering;
            if !self.missed.swap(true, Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            self.inner.presets_by_fingerprint(fingerprint)
        }

        fn preset_by_name(&self, name: &str) -> anyhow::Result<Option<Preset>> {
            self.inner.preset_by_name(name)
        }

        fn insert_preset(&self, preset: &Preset) -> anyhow::Result<InsertOutcome> {
            self.inner.insert_preset(preset)
        }

        fn mark_preset_used(&self, id: PresetId) -> anyhow::Result<()> {
            self.inner.mark_preset_used(id)
        }
    }

    #[test]
    fn lost_insert_race_returns_the_winner() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let engine = EngineId::new();
        let base = PackageId::new();
        let winner = Preset::new("winner", engine, Some(base), vec![]);
        db.insert_preset(&winner).unwrap();

        let registry = PresetRegistry::new(Arc::new(LateWriterStore {
            inner: db.clone(),
            missed: std::sync::atomic::AtomicBool::new(false),
        }));
        let resolution = registry
            .find_or_create(&PresetRequest {
                engine_id: engine,
                engine_name: "gzdoom",
                base: Some((base, "doom2")),
                additional: vec![],
                name: None,
            })
            .unwrap();

        assert!(!resolution.created);
        assert_eq!(resolution.preset.id, winner.id);
        assert_eq!(resolution.preset.name, "winner");
        assert_eq!(db.list_presets().unwrap().len(), 1);
    }
}
