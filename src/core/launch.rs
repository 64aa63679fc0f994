//! Launch orchestration - From a launch request to a running engine process

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::engine::Engine;
use super::error::LaunchError;
use super::package::{Package, PackageKind};
use super::preset::{PresetId, PresetRegistry, PresetRequest};
use super::process::{CommandSpec, ProcessHandle, ProcessSpawner};
use super::settings::{self, SettingsResolver};
use super::store::{CatalogStore, PresetStore, SettingsStore};

/// What the caller wants to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    pub engine: String,
    /// Name for a newly created preset; auto-generated when absent
    pub preset_name: Option<String>,
    pub base: Option<String>,
    /// Additional packages in load order
    pub additional: Vec<String>,
    /// Appended to the command line verbatim
    pub passthrough: Vec<String>,
    /// Leave the engine's cleanup files in place after exit
    pub skip_cleanup: bool,
}

impl LaunchRequest {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            ..Default::default()
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_additional(mut self, names: Vec<String>) -> Self {
        self.additional = names;
        self
    }

    pub fn with_passthrough(mut self, args: Vec<String>) -> Self {
        self.passthrough = args;
        self
    }

    pub fn with_preset_name(mut self, name: impl Into<String>) -> Self {
        self.preset_name = Some(name.into());
        self
    }
}

/// Result of a launch
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub preset_id: PresetId,
    pub preset_name: String,
    /// Whether the preset was created by this launch
    pub preset_created: bool,
    pub command: CommandSpec,
    /// Exit code once the process has been joined
    pub exit_code: Option<i32>,
}

/// Everything needed to spawn, validated against the filesystem
struct PreparedLaunch {
    outcome: LaunchOutcome,
    cleanup: Vec<String>,
}

/// Resolves launch requests and hands them to a [`ProcessSpawner`]
#[derive(Clone)]
pub struct Launcher {
    catalog: Arc<dyn CatalogStore>,
    resolver: SettingsResolver,
    presets: PresetRegistry,
    preset_store: Arc<dyn PresetStore>,
    spawner: Arc<dyn ProcessSpawner>,
}

impl Launcher {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        catalog: Arc<dyn CatalogStore>,
        presets: Arc<dyn PresetStore>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Self {
        Self {
            resolver: SettingsResolver::new(settings),
            catalog,
            presets: PresetRegistry::new(presets.clone()),
            preset_store: presets,
            spawner,
        }
    }

    pub fn resolver(&self) -> &SettingsResolver {
        &self.resolver
    }

    /// Launch and wait for the engine to exit.
    ///
    /// A non-zero exit is still a successful launch; the code is in the outcome.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, LaunchError> {
        let (prepared, mut handle) = self.spawn_prepared(request)?;
        let PreparedLaunch {
            mut outcome,
            cleanup,
        } = prepared;

        let code = handle.join().await?;
        outcome.exit_code = Some(code);
        info!("Preset '{}' exited with code {}", outcome.preset_name, code);

        if request.skip_cleanup {
            debug!("Skipping cleanup for preset '{}'", outcome.preset_name);
        } else {
            remove_cleanup_files(&outcome.command.working_dir, &cleanup).await;
        }

        Ok(outcome)
    }

    /// Launch without waiting. The caller owns the handle and decides when to join;
    /// cleanup files are left alone.
    pub fn start(
        &self,
        request: &LaunchRequest,
    ) -> Result<(LaunchOutcome, ProcessHandle), LaunchError> {
        let (prepared, handle) = self.spawn_prepared(request)?;
        Ok((prepared.outcome, handle))
    }

    /// Run the engine's setup tool from the executable's directory and wait for it
    pub async fn run_setup(&self, engine_name: &str) -> Result<i32, LaunchError> {
        let engine = self.engine(engine_name)?;
        let executable = PathBuf::from(self.required(&engine, settings::EXECUTABLE)?);
        let setup_name = self.required(&engine, settings::SETUP_EXECUTABLE)?;

        let setup = parent_dir(&executable).join(setup_name);
        let working_dir = self.working_dir(&engine, &setup)?;
        validate_paths(&setup, &working_dir)?;

        let command = CommandSpec {
            program: setup,
            args: Vec::new(),
            working_dir,
        };
        info!("Running setup for engine '{}'", engine.name);
        let mut handle = self.spawner.spawn(&command)?;
        handle.join().await
    }

    fn spawn_prepared(
        &self,
        request: &LaunchRequest,
    ) -> Result<(PreparedLaunch, ProcessHandle), LaunchError> {
        let prepared = self.prepare(request)?;
        let handle = self.spawner.spawn(&prepared.outcome.command)?;

        if let Err(e) = self
            .preset_store
            .mark_preset_used(prepared.outcome.preset_id)
        {
            warn!(
                "Failed to record usage of preset '{}': {}",
                prepared.outcome.preset_name, e
            );
        }

        Ok((prepared, handle))
    }

    fn prepare(&self, request: &LaunchRequest) -> Result<PreparedLaunch, LaunchError> {
        let engine = self.engine(&request.engine)?;

        // Resolve every package before touching the preset table
        let base = request
            .base
            .as_deref()
            .map(|name| self.package(PackageKind::Base, name))
            .transpose()?;
        let additional = request
            .additional
            .iter()
            .map(|name| self.package(PackageKind::Additional, name))
            .collect::<Result<Vec<_>, _>>()?;

        let resolution = self.presets.find_or_create(&PresetRequest {
            engine_id: engine.id,
            engine_name: &engine.name,
            base: base.as_ref().map(|p| (p.id, p.name.as_str())),
            additional: additional.iter().map(|p| (p.id, p.name.as_str())).collect(),
            name: request.preset_name.as_deref(),
        })?;
        let preset = resolution.preset;

        let executable = PathBuf::from(self.required(&engine, settings::EXECUTABLE)?);
        let working_dir = self.working_dir(&engine, &executable)?;
        validate_paths(&executable, &working_dir)?;

        // Same fingerprint means the same ids in the same order as the stored preset
        let args = base
            .iter()
            .chain(additional.iter())
            .map(|p| p.path.to_string_lossy().into_owned())
            .chain(request.passthrough.iter().cloned())
            .collect();

        let cleanup = self
            .resolver
            .resolve(engine.id, settings::CLEANUP)?
            .map(|value| parse_cleanup(&value))
            .unwrap_or_default();

        Ok(PreparedLaunch {
            outcome: LaunchOutcome {
                preset_id: preset.id,
                preset_name: preset.name,
                preset_created: resolution.created,
                command: CommandSpec {
                    program: executable,
                    args,
                    working_dir,
                },
                exit_code: None,
            },
            cleanup,
        })
    }

    fn engine(&self, name: &str) -> Result<Engine, LaunchError> {
        self.catalog
            .engine_by_name(name)?
            .ok_or_else(|| LaunchError::EngineNotFound(name.to_string()))
    }

    fn package(&self, kind: PackageKind, name: &str) -> Result<Package, LaunchError> {
        self.catalog
            .package_by_name(kind, name)?
            .ok_or_else(|| LaunchError::PackageNotFound {
                kind,
                name: name.to_string(),
            })
    }

    fn required(&self, engine: &Engine, setting: &'static str) -> Result<String, LaunchError> {
        self.resolver
            .resolve(engine.id, setting)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LaunchError::RequiredSettingMissing {
                engine: engine.name.clone(),
                setting,
            })
    }

    /// Override setting if present, else the directory containing `program`
    fn working_dir(&self, engine: &Engine, program: &Path) -> Result<PathBuf, LaunchError> {
        Ok(match self.resolver.resolve(engine.id, settings::WORKING_DIR)? {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => parent_dir(program),
        })
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn validate_paths(program: &Path, working_dir: &Path) -> Result<(), LaunchError> {
    if !program.is_file() {
        return Err(LaunchError::ExecutableNotFound(program.to_path_buf()));
    }
    if !working_dir.is_dir() {
        return Err(LaunchError::WorkingDirectoryNotFound(working_dir.to_path_buf()));
    }
    Ok(())
}

fn parse_cleanup(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Remove leftover files relative to `working_dir`. Entries escaping the directory
/// are ignored.
async fn remove_cleanup_files(working_dir: &Path, names: &[String]) {
    for name in names {
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            warn!("Ignoring cleanup entry outside the working directory: {}", name);
            continue;
        }

        let path = working_dir.join(relative);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {:?}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_list_is_split_and_trimmed() {
        assert_eq!(
            parse_cleanup(" temp.wad ;; zdoom.log;"),
            vec!["temp.wad".to_string(), "zdoom.log".to_string()]
        );
        assert!(parse_cleanup("").is_empty());
    }

    #[test]
    fn parent_of_bare_name_is_current_dir() {
        assert_eq!(parent_dir(Path::new("gzdoom")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/x/engine.exe")), PathBuf::from("/x"));
    }

    #[tokio::test]
    async fn cleanup_stays_inside_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("engine");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(inner.join("temp.wad"), b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        remove_cleanup_files(
            &inner,
            &["temp.wad".to_string(), "../keep.txt".to_string(), "missing".to_string()],
        )
        .await;

        assert!(!inner.join("temp.wad").exists());
        assert!(dir.path().join("keep.txt").exists());
    }
}
