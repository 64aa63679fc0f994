//! Command line interface - Thin commands over the stores plus launch and setup

mod launch_args;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use crate::core::settings::{self, GLOBAL_OWNER};
use crate::core::{
    CatalogStore, Engine, LaunchError, Launcher, Package, PackageKind, ProcessRunner,
    ResultCode, Scope, SettingsStore, Template,
};
use crate::persistence::Database;

pub use launch_args::{parse_launch_args, ArgsError};

#[derive(Debug, Parser)]
#[command(
    name = "wadrunner",
    version,
    about = "Manage game engines and data packages, and launch them as presets"
)]
pub struct Cli {
    /// Database file (defaults to WADRUNNER_DB, then the user data directory)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch an engine: -e ENGINE [-i BASE] [-f FILE...] [-n NAME] [--no-cleanup] [-a ARGS...]
    Launch {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
        tokens: Vec<String>,
    },

    /// Run an engine's setup tool and wait for it to exit
    Setup { engine: String },

    #[command(subcommand)]
    Engine(EngineCommand),

    #[command(subcommand)]
    Template(TemplateCommand),

    #[command(subcommand)]
    Package(PackageCommand),

    #[command(subcommand)]
    Setting(SettingCommand),

    #[command(subcommand)]
    Preset(PresetCommand),
}

#[derive(Debug, Subcommand)]
pub enum EngineCommand {
    Add {
        name: String,
        /// Path to the engine executable
        #[arg(long)]
        exe: Option<String>,
        /// Inherit settings from a template
        #[arg(long, conflicts_with = "clone")]
        template: Option<String>,
        /// Copy settings from an existing engine
        #[arg(long)]
        clone: Option<String>,
    },
    Rename {
        old: String,
        new: String,
    },
    Remove {
        name: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum TemplateCommand {
    Add { name: String },
    Remove { name: String },
    List,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct KindArgs {
    /// Base package (one per launch)
    #[arg(long)]
    pub base: bool,
    /// Additional package (loaded in order after the base)
    #[arg(long)]
    pub additional: bool,
}

impl KindArgs {
    fn kind(&self) -> PackageKind {
        if self.base {
            PackageKind::Base
        } else {
            PackageKind::Additional
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum PackageCommand {
    Add {
        name: String,
        path: PathBuf,
        #[command(flatten)]
        kind: KindArgs,
        /// Where the file was downloaded from
        #[arg(long)]
        url: Option<String>,
    },
    Remove {
        name: String,
        #[command(flatten)]
        kind: KindArgs,
    },
    List,
}

/// Which scope a setting command addresses; global when neither is given
#[derive(Debug, Args)]
pub struct TargetArgs {
    #[arg(long, conflicts_with = "template")]
    pub engine: Option<String>,
    #[arg(long)]
    pub template: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum SettingCommand {
    Set {
        name: String,
        value: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    Get {
        name: String,
        #[command(flatten)]
        target: TargetArgs,
        /// Resolve through template and global scope (engines only)
        #[arg(long)]
        effective: bool,
    },
    Unset {
        name: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    List {
        #[arg(long, default_value = "")]
        prefix: String,
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum PresetCommand {
    List,
}

/// Stores and launcher wired together for one invocation
pub struct App {
    db: Arc<Database>,
    launcher: Launcher,
}

impl App {
    pub fn new(db: Database) -> Self {
        let db = Arc::new(db);
        let launcher = Launcher::new(
            db.clone(),
            db.clone(),
            db.clone(),
            Arc::new(ProcessRunner::new()),
        );
        Self { db, launcher }
    }

    pub async fn run(&self, command: Command) -> Result<ResultCode, LaunchError> {
        match command {
            Command::Launch { tokens } => {
                let request = match parse_launch_args(tokens) {
                    Ok(request) => request,
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return Ok(ResultCode::Usage);
                    }
                };
                let outcome = self.launcher.launch(&request).await?;
                let code = outcome.exit_code.unwrap_or_default();
                if code != 0 {
                    warn!("Engine exited with code {}", code);
                }
                println!("{}", outcome.preset_name);
                Ok(ResultCode::Success)
            }
            Command::Setup { engine } => {
                let code = self.launcher.run_setup(&engine).await?;
                info!("Setup for '{}' exited with code {}", engine, code);
                Ok(ResultCode::Success)
            }
            Command::Engine(cmd) => self.engine(cmd),
            Command::Template(cmd) => self.template(cmd),
            Command::Package(cmd) => self.package(cmd),
            Command::Setting(cmd) => self.setting(cmd),
            Command::Preset(PresetCommand::List) => self.list_presets(),
        }
    }

    fn engine(&self, cmd: EngineCommand) -> Result<ResultCode, LaunchError> {
        match cmd {
            EngineCommand::Add {
                name,
                exe,
                template,
                clone,
            } => {
                let mut engine = Engine::new(&name);
                let mut source = None;
                if let Some(template) = template {
                    let t = self
                        .db
                        .template_by_name(&template)?
                        .ok_or(LaunchError::TemplateNotFound(template))?;
                    engine = engine.with_template(t.id);
                }
                if let Some(clone) = clone {
                    let existing = self
                        .db
                        .engine_by_name(&clone)?
                        .ok_or(LaunchError::EngineNotFound(clone))?;
                    engine.template_id = existing.template_id;
                    source = Some(existing.id);
                }

                self.db.add_engine(&engine)?;
                if let Some(source) = source {
                    self.db.copy_engine_settings(source, engine.id)?;
                }
                if let Some(exe) = exe {
                    self.db.set_setting(
                        Scope::Engine,
                        &engine.id.to_string(),
                        settings::EXECUTABLE,
                        &exe,
                    )?;
                }
                info!("Added engine '{}'", name);
                Ok(ResultCode::Success)
            }
            EngineCommand::Rename { old, new } => {
                if !self.db.rename_engine(&old, &new)? {
                    return Err(LaunchError::EngineNotFound(old));
                }
                Ok(ResultCode::Success)
            }
            EngineCommand::Remove { name } => {
                if !self.db.remove_engine(&name)? {
                    return Err(LaunchError::EngineNotFound(name));
                }
                Ok(ResultCode::Success)
            }
            EngineCommand::List => {
                for engine in self.db.list_engines()? {
                    let exe = self
                        .launcher
                        .resolver()
                        .resolve(engine.id, settings::EXECUTABLE)?
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}\t{}", engine.name, exe);
                }
                Ok(ResultCode::Success)
            }
        }
    }

    fn template(&self, cmd: TemplateCommand) -> Result<ResultCode, LaunchError> {
        match cmd {
            TemplateCommand::Add { name } => {
                self.db.add_template(&Template::new(name))?;
            }
            TemplateCommand::Remove { name } => {
                if !self.db.remove_template(&name)? {
                    return Err(LaunchError::TemplateNotFound(name));
                }
            }
            TemplateCommand::List => {
                for template in self.db.list_templates()? {
                    println!("{}", template.name);
                }
            }
        }
        Ok(ResultCode::Success)
    }

    fn package(&self, cmd: PackageCommand) -> Result<ResultCode, LaunchError> {
        match cmd {
            PackageCommand::Add {
                name,
                path,
                kind,
                url,
            } => {
                let mut package = Package::new(name, kind.kind(), path);
                if let Some(url) = url {
                    package = package.with_source_url(url);
                }
                self.db.add_package(&package)?;
            }
            PackageCommand::Remove { name, kind } => {
                let kind = kind.kind();
                if !self.db.remove_package(kind, &name)? {
                    return Err(LaunchError::PackageNotFound { kind, name });
                }
            }
            PackageCommand::List => {
                for package in self.db.list_packages()? {
                    println!(
                        "{}\t{}\t{}\t{}",
                        package.kind,
                        package.name,
                        package.path.display(),
                        package.source_url.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Ok(ResultCode::Success)
    }

    fn setting(&self, cmd: SettingCommand) -> Result<ResultCode, LaunchError> {
        match cmd {
            SettingCommand::Set {
                name,
                value,
                target,
            } => {
                let (scope, owner) = self.target(&target)?;
                if !settings::RECOGNIZED.contains(&name.as_str()) {
                    info!("'{}' is not used by launches, storing it as-is", name);
                }
                self.db.set_setting(scope, &owner, &name, &value)?;
            }
            SettingCommand::Get {
                name,
                target,
                effective,
            } => {
                let value = match (&target.engine, effective) {
                    (Some(engine), true) => {
                        let engine = self
                            .db
                            .engine_by_name(engine)?
                            .ok_or_else(|| LaunchError::EngineNotFound(engine.clone()))?;
                        self.launcher
                            .resolver()
                            .resolve_with_scope(engine.id, &name)?
                            .map(|r| format!("{}\t({})", r.value, r.scope))
                    }
                    _ => {
                        let (scope, owner) = self.target(&target)?;
                        self.db.get_setting(scope, &owner, &name)?
                    }
                };
                match value {
                    Some(value) => println!("{}", value),
                    None => {
                        eprintln!("'{}' is not set", name);
                        return Ok(ResultCode::RequiredSettingMissing);
                    }
                }
            }
            SettingCommand::Unset { name, target } => {
                let (scope, owner) = self.target(&target)?;
                if !self.db.remove_setting(scope, &owner, &name)? {
                    warn!("'{}' was not set", name);
                }
            }
            SettingCommand::List { prefix, target } => {
                let (scope, owner) = self.target(&target)?;
                for (name, value) in self.db.list_settings(scope, &owner, &prefix)? {
                    println!("{}={}", name, value);
                }
            }
        }
        Ok(ResultCode::Success)
    }

    fn target(&self, target: &TargetArgs) -> Result<(Scope, String), LaunchError> {
        if let Some(name) = &target.engine {
            let engine = self
                .db
                .engine_by_name(name)?
                .ok_or_else(|| LaunchError::EngineNotFound(name.clone()))?;
            return Ok((Scope::Engine, engine.id.to_string()));
        }
        if let Some(name) = &target.template {
            let template = self
                .db
                .template_by_name(name)?
                .ok_or_else(|| LaunchError::TemplateNotFound(name.clone()))?;
            return Ok((Scope::Template, template.id.to_string()));
        }
        Ok((Scope::Global, GLOBAL_OWNER.to_string()))
    }

    fn list_presets(&self) -> Result<ResultCode, LaunchError> {
        for preset in self.db.list_presets()? {
            let engine = self
                .db
                .engine_by_id(preset.engine_id)?
                .map(|e| e.name)
                .unwrap_or_else(|| "<removed>".to_string());
            let mut packages = Vec::new();
            for id in preset.base_id.iter().chain(preset.additional_ids.iter()) {
                packages.push(
                    self.db
                        .package_by_id(*id)?
                        .map(|p| p.name)
                        .unwrap_or_else(|| "<removed>".to_string()),
                );
            }
            println!(
                "{}\t{}\t{}\t{}",
                preset.name,
                engine,
                packages.join(" "),
                preset.launch_count
            );
        }
        Ok(ResultCode::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn launch_keeps_raw_tokens() {
        let cli = Cli::try_parse_from([
            "wadrunner", "launch", "-e", "gzdoom", "-i", "doom2", "-a", "+map", "MAP01",
        ])
        .unwrap();
        match cli.command {
            Command::Launch { tokens } => {
                let request = parse_launch_args(tokens).unwrap();
                assert_eq!(request.engine, "gzdoom");
                assert_eq!(request.base.as_deref(), Some("doom2"));
                assert_eq!(request.passthrough, vec!["+map", "MAP01"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn engine_add_from_template_inherits() {
        let app = App::new(Database::open_in_memory().unwrap());
        app.run(Command::Template(TemplateCommand::Add { name: "zdoom".into() }))
            .await
            .unwrap();
        app.run(Command::Setting(SettingCommand::Set {
            name: settings::SETUP_EXECUTABLE.into(),
            value: "setup.exe".into(),
            target: TargetArgs {
                engine: None,
                template: Some("zdoom".into()),
            },
        }))
        .await
        .unwrap();
        let code = app
            .run(Command::Engine(EngineCommand::Add {
                name: "gzdoom".into(),
                exe: Some("/x/gzdoom".into()),
                template: Some("zdoom".into()),
                clone: None,
            }))
            .await
            .unwrap();
        assert_eq!(code, ResultCode::Success);

        let engine = app.db.engine_by_name("gzdoom").unwrap().unwrap();
        let resolver = app.launcher.resolver();
        assert_eq!(
            resolver.resolve(engine.id, settings::SETUP_EXECUTABLE).unwrap().as_deref(),
            Some("setup.exe")
        );
        assert_eq!(
            resolver.resolve(engine.id, settings::EXECUTABLE).unwrap().as_deref(),
            Some("/x/gzdoom")
        );
    }

    #[tokio::test]
    async fn missing_template_is_reported_the_same_everywhere() {
        let app = App::new(Database::open_in_memory().unwrap());
        let commands = vec![
            Command::Engine(EngineCommand::Add {
                name: "gzdoom".into(),
                exe: None,
                template: Some("nope".into()),
                clone: None,
            }),
            Command::Template(TemplateCommand::Remove { name: "nope".into() }),
            Command::Setting(SettingCommand::Get {
                name: settings::EXECUTABLE.into(),
                target: TargetArgs {
                    engine: None,
                    template: Some("nope".into()),
                },
                effective: false,
            }),
        ];

        for command in commands {
            let err = app.run(command).await.unwrap_err();
            assert!(matches!(err, LaunchError::TemplateNotFound(ref n) if n == "nope"));
            assert_eq!(err.result_code(), ResultCode::Usage);
        }
        assert!(app.db.engine_by_name("gzdoom").unwrap().is_none());
    }

    #[tokio::test]
    async fn engine_created_from_template_keeps_its_copy() {
        let app = App::new(Database::open_in_memory().unwrap());
        let set_template_exe = |value: &str| {
            Command::Setting(SettingCommand::Set {
                name: settings::EXECUTABLE.into(),
                value: value.into(),
                target: TargetArgs {
                    engine: None,
                    template: Some("zdoom".into()),
                },
            })
        };
        app.run(Command::Template(TemplateCommand::Add { name: "zdoom".into() }))
            .await
            .unwrap();
        app.run(set_template_exe("/old/exe")).await.unwrap();
        app.run(Command::Engine(EngineCommand::Add {
            name: "gzdoom".into(),
            exe: None,
            template: Some("zdoom".into()),
            clone: None,
        }))
        .await
        .unwrap();
        app.run(set_template_exe("/new/exe")).await.unwrap();

        let engine = app.db.engine_by_name("gzdoom").unwrap().unwrap();
        assert_eq!(
            app.launcher
                .resolver()
                .resolve(engine.id, settings::EXECUTABLE)
                .unwrap()
                .as_deref(),
            Some("/old/exe")
        );
    }

    #[tokio::test]
    async fn unknown_engine_maps_to_its_code() {
        let app = App::new(Database::open_in_memory().unwrap());
        let err = app
            .run(Command::Engine(EngineCommand::Remove { name: "nope".into() }))
            .await
            .unwrap_err();
        assert_eq!(err.result_code(), ResultCode::EngineNotFound);
    }
}
