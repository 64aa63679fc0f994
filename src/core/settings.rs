//! Layered settings - Engine overrides, template defaults and global values

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::engine::EngineId;
use super::store::SettingsStore;

/// Path to the engine's main executable
pub const EXECUTABLE: &str = "executable";
/// File name of the engine's configuration tool, relative to the executable's directory
pub const SETUP_EXECUTABLE: &str = "setup";
/// Working directory override for launches and setup runs
pub const WORKING_DIR: &str = "working-dir";
/// `;`-separated files removed from the working directory after a launch
pub const CLEANUP: &str = "cleanup";

/// Setting names that affect orchestration. Anything else is stored as-is.
pub const RECOGNIZED: &[&str] = &[EXECUTABLE, SETUP_EXECUTABLE, WORKING_DIR, CLEANUP];

/// Tier at which a setting is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Template,
    Engine,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Template => "template",
            Self::Engine => "engine",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner key used for global-scope rows
pub const GLOBAL_OWNER: &str = "";

/// A resolved value together with the tier it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub scope: Scope,
}

/// Computes effective engine settings by walking engine, template, then global scope.
///
/// The template tier is the copy of the template's settings taken when the engine was
/// created; later template edits never reach existing engines. Every call reads
/// through to the store, so writes made at any tier are observed immediately.
#[derive(Clone)]
pub struct SettingsResolver {
    settings: Arc<dyn SettingsStore>,
}

impl SettingsResolver {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Effective value of `name` for `engine`, or `None` when no tier defines it
    pub fn resolve(&self, engine: EngineId, name: &str) -> Result<Option<String>> {
        Ok(self.resolve_with_scope(engine, name)?.map(|r| r.value))
    }

    /// Like [`resolve`](Self::resolve) but also reports which tier supplied the value
    pub fn resolve_with_scope(&self, engine: EngineId, name: &str) -> Result<Option<Resolved>> {
        let owner = engine.to_string();
        if let Some(value) = self.settings.get_setting(Scope::Engine, &owner, name)? {
            trace!("Setting '{}' for engine {} found at engine scope", name, engine);
            return Ok(Some(Resolved {
                value,
                scope: Scope::Engine,
            }));
        }

        if let Some(value) = self.settings.inherited_setting(engine, name)? {
            trace!("Setting '{}' for engine {} inherited from template", name, engine);
            return Ok(Some(Resolved {
                value,
                scope: Scope::Template,
            }));
        }

        Ok(self
            .settings
            .get_setting(Scope::Global, GLOBAL_OWNER, name)?
            .map(|value| Resolved {
                value,
                scope: Scope::Global,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{Engine, Template};
    use crate::persistence::Database;

    fn setup() -> (Arc<Database>, SettingsResolver) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let resolver = SettingsResolver::new(db.clone());
        (db, resolver)
    }

    #[test]
    fn engine_value_wins() {
        let (db, resolver) = setup();
        let engine = Engine::new("gzdoom");
        db.add_engine(&engine).unwrap();
        db.set_setting(Scope::Global, GLOBAL_OWNER, EXECUTABLE, "/global/exe")
            .unwrap();
        db.set_setting(Scope::Engine, &engine.id.to_string(), EXECUTABLE, "/engine/exe")
            .unwrap();

        let resolved = resolver.resolve_with_scope(engine.id, EXECUTABLE).unwrap().unwrap();
        assert_eq!(resolved.value, "/engine/exe");
        assert_eq!(resolved.scope, Scope::Engine);
    }

    #[test]
    fn template_is_inherited_then_shadowed() {
        let (db, resolver) = setup();
        let template = Template::new("zdoom-family");
        db.add_template(&template).unwrap();
        db.set_setting(Scope::Template, &template.id.to_string(), SETUP_EXECUTABLE, "setup.exe")
            .unwrap();
        let engine = Engine::new("gzdoom").with_template(template.id);
        db.add_engine(&engine).unwrap();

        assert_eq!(
            resolver.resolve(engine.id, SETUP_EXECUTABLE).unwrap().as_deref(),
            Some("setup.exe")
        );

        db.set_setting(Scope::Engine, &engine.id.to_string(), SETUP_EXECUTABLE, "config.exe")
            .unwrap();
        assert_eq!(
            resolver.resolve(engine.id, SETUP_EXECUTABLE).unwrap().as_deref(),
            Some("config.exe")
        );
        // The template itself is untouched
        assert_eq!(
            db.get_setting(Scope::Template, &template.id.to_string(), SETUP_EXECUTABLE)
                .unwrap()
                .as_deref(),
            Some("setup.exe")
        );
    }

    #[test]
    fn global_is_last_resort() {
        let (db, resolver) = setup();
        let engine = Engine::new("chocolate-doom");
        db.add_engine(&engine).unwrap();

        assert_eq!(resolver.resolve(engine.id, WORKING_DIR).unwrap(), None);

        db.set_setting(Scope::Global, GLOBAL_OWNER, WORKING_DIR, "/games")
            .unwrap();
        let resolved = resolver.resolve_with_scope(engine.id, WORKING_DIR).unwrap().unwrap();
        assert_eq!(resolved.scope, Scope::Global);
        assert_eq!(resolved.value, "/games");
    }

    #[test]
    fn unset_override_falls_back_to_template_copy() {
        let (db, resolver) = setup();
        let template = Template::new("t");
        db.add_template(&template).unwrap();
        db.set_setting(Scope::Template, &template.id.to_string(), EXECUTABLE, "/t/exe")
            .unwrap();
        let engine = Engine::new("e").with_template(template.id);
        db.add_engine(&engine).unwrap();
        let owner = engine.id.to_string();

        db.set_setting(Scope::Engine, &owner, EXECUTABLE, "/e/exe").unwrap();
        db.remove_setting(Scope::Engine, &owner, EXECUTABLE).unwrap();

        let resolved = resolver.resolve_with_scope(engine.id, EXECUTABLE).unwrap().unwrap();
        assert_eq!(resolved.value, "/t/exe");
        assert_eq!(resolved.scope, Scope::Template);
    }

    #[test]
    fn template_edits_do_not_reach_existing_engines() {
        let (db, resolver) = setup();
        let template = Template::new("t");
        db.add_template(&template).unwrap();
        let template_owner = template.id.to_string();
        db.set_setting(Scope::Template, &template_owner, EXECUTABLE, "/old/exe")
            .unwrap();
        let engine = Engine::new("e").with_template(template.id);
        db.add_engine(&engine).unwrap();

        db.set_setting(Scope::Template, &template_owner, EXECUTABLE, "/new/exe")
            .unwrap();
        db.set_setting(Scope::Template, &template_owner, WORKING_DIR, "/games")
            .unwrap();
        assert_eq!(
            resolver.resolve(engine.id, EXECUTABLE).unwrap().as_deref(),
            Some("/old/exe")
        );
        assert_eq!(resolver.resolve(engine.id, WORKING_DIR).unwrap(), None);

        // Engines created afterwards pick up the new values
        let later = Engine::new("later").with_template(template.id);
        db.add_engine(&later).unwrap();
        assert_eq!(
            resolver.resolve(later.id, EXECUTABLE).unwrap().as_deref(),
            Some("/new/exe")
        );
    }

    #[test]
    fn removing_the_template_keeps_engine_values() {
        let (db, resolver) = setup();
        let template = Template::new("t");
        db.add_template(&template).unwrap();
        db.set_setting(Scope::Template, &template.id.to_string(), EXECUTABLE, "/t/exe")
            .unwrap();
        let engine = Engine::new("e").with_template(template.id);
        db.add_engine(&engine).unwrap();

        assert!(db.remove_template("t").unwrap());
        assert_eq!(
            resolver.resolve(engine.id, EXECUTABLE).unwrap().as_deref(),
            Some("/t/exe")
        );
    }
}
