//! SQLite database implementation for persistent storage

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::settings::Scope;
use crate::core::store::{CatalogStore, InsertOutcome, PresetStore, SettingsStore};
use crate::core::{
    Engine, EngineId, Fingerprint, Package, PackageId, PackageKind, Preset, PresetId, Template,
    TemplateId,
};

const SCHEMA: &str = r#"
    -- Layered settings; global rows use an empty owner
    CREATE TABLE IF NOT EXISTS settings (
        scope TEXT NOT NULL,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (scope, owner, name)
    );

    CREATE TABLE IF NOT EXISTS templates (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS engines (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        template_id TEXT REFERENCES templates(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS packages (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        path TEXT NOT NULL,
        source_url TEXT,
        UNIQUE (kind, name)
    );

    -- Template settings copied into an engine when it is created from a template
    CREATE TABLE IF NOT EXISTS inherited_settings (
        engine_id TEXT NOT NULL REFERENCES engines(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (engine_id, name)
    );

    -- Additional package ids are a JSON array in load order
    CREATE TABLE IF NOT EXISTS presets (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        engine_id TEXT NOT NULL,
        base_id TEXT,
        additional TEXT NOT NULL,
        fingerprint TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        last_used_at TEXT,
        launch_count INTEGER NOT NULL DEFAULT 0
    );
"#;

const PRESET_COLUMNS: &str =
    "id, name, engine_id, base_id, additional, fingerprint, created_at, last_used_at, launch_count";

/// Database wrapper for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database at `path`
    pub fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .context(format!("Failed to open database at {:?}", path))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        info!("Database opened at {:?}", path);
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Fresh database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Default database file path under the user's data directory
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join(crate::APP_NAME);
        Ok(data_dir.join("wadrunner.db"))
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        debug!("Database schema initialized");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    // === Templates ===

    pub fn add_template(&self, template: &Template) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO templates (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![
                template.id.to_string(),
                template.name,
                template.created_at.to_rfc3339()
            ],
        )
        .map_err(|e| name_conflict(e, "template", &template.name))?;
        debug!("Template {} saved", template.id);
        Ok(())
    }

    pub fn template_by_name(&self, name: &str) -> Result<Option<Template>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, created_at FROM templates WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, created_at)| -> Result<Template> {
            Ok(Template {
                id: TemplateId(parse_uuid(&id)?),
                name,
                created_at: parse_time(&created_at)?,
            })
        })
        .transpose()
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM templates ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, name, created_at) = row?;
            result.push(Template {
                id: TemplateId(parse_uuid(&id)?),
                name,
                created_at: parse_time(&created_at)?,
            });
        }
        Ok(result)
    }

    /// Remove a template and its settings. Engines created from it keep the values
    /// copied at creation but lose the link.
    pub fn remove_template(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let Some(id) = tx
            .query_row(
                "SELECT id FROM templates WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE engines SET template_id = NULL WHERE template_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM settings WHERE scope = ?1 AND owner = ?2",
            params![Scope::Template.as_str(), id],
        )?;
        tx.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        tx.commit()?;

        debug!("Template {} deleted", id);
        Ok(true)
    }

    // === Engines ===

    /// Insert an engine. When it names a template, the template's current settings
    /// are copied into the engine in the same transaction.
    pub fn add_engine(&self, engine: &Engine) -> Result<()> {
        let id = engine.id.to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO engines (id, name, template_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                engine.name,
                engine.template_id.map(|t| t.to_string()),
                engine.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| name_conflict(e, "engine", &engine.name))?;

        if let Some(template_id) = engine.template_id {
            let copied = tx.execute(
                r#"
                INSERT INTO inherited_settings (engine_id, name, value)
                SELECT ?1, name, value FROM settings WHERE scope = ?2 AND owner = ?3
                "#,
                params![id, Scope::Template.as_str(), template_id.to_string()],
            )?;
            debug!("Engine {} inherited {} settings from template {}", id, copied, template_id);
        }
        tx.commit()?;

        debug!("Engine {} saved", engine.id);
        Ok(())
    }

    /// Copy every engine-scoped and inherited setting of `from` onto `to`.
    /// The inherited values of `to` are replaced by those of `from`.
    pub fn copy_engine_settings(&self, from: EngineId, to: EngineId) -> Result<usize> {
        let (from, to) = (from.to_string(), to.to_string());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let own = tx.execute(
            r#"
            INSERT OR REPLACE INTO settings (scope, owner, name, value)
            SELECT scope, ?2, name, value FROM settings WHERE scope = ?3 AND owner = ?1
            "#,
            params![from, to, Scope::Engine.as_str()],
        )?;
        tx.execute(
            "DELETE FROM inherited_settings WHERE engine_id = ?1",
            params![to],
        )?;
        let inherited = tx.execute(
            r#"
            INSERT INTO inherited_settings (engine_id, name, value)
            SELECT ?2, name, value FROM inherited_settings WHERE engine_id = ?1
            "#,
            params![from, to],
        )?;
        tx.commit()?;

        debug!("Copied {} settings from engine {} to {}", own + inherited, from, to);
        Ok(own + inherited)
    }

    pub fn rename_engine(&self, old: &str, new: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count = conn
            .execute(
                "UPDATE engines SET name = ?2 WHERE name = ?1",
                params![old, new],
            )
            .map_err(|e| name_conflict(e, "engine", new))?;
        Ok(count > 0)
    }

    /// Remove an engine and its settings. Presets referring to it are kept.
    pub fn remove_engine(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let Some(id) = tx
            .query_row(
                "SELECT id FROM engines WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM settings WHERE scope = ?1 AND owner = ?2",
            params![Scope::Engine.as_str(), id],
        )?;
        tx.execute(
            "DELETE FROM inherited_settings WHERE engine_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM engines WHERE id = ?1", params![id])?;
        tx.commit()?;

        debug!("Engine {} deleted", id);
        Ok(true)
    }

    pub fn list_engines(&self) -> Result<Vec<Engine>> {
        self.query_engines("SELECT id, name, template_id, created_at FROM engines ORDER BY name", params![])
    }

    fn query_engines<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Engine>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, name, template_id, created_at) = row?;
            result.push(Engine {
                id: EngineId(parse_uuid(&id)?),
                name,
                template_id: template_id
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(TemplateId),
                created_at: parse_time(&created_at)?,
            });
        }
        Ok(result)
    }

    // === Packages ===

    pub fn add_package(&self, package: &Package) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO packages (id, name, kind, path, source_url) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                package.id.to_string(),
                package.name,
                package.kind.as_str(),
                package.path.to_string_lossy().to_string(),
                package.source_url,
            ],
        )
        .map_err(|e| name_conflict(e, package.kind.as_str(), &package.name))?;
        debug!("Package {} saved", package.id);
        Ok(())
    }

    pub fn remove_package(&self, kind: PackageKind, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM packages WHERE kind = ?1 AND name = ?2",
            params![kind.as_str(), name],
        )?;
        Ok(count > 0)
    }

    pub fn list_packages(&self) -> Result<Vec<Package>> {
        self.query_packages(
            "SELECT id, name, kind, path, source_url FROM packages ORDER BY kind, name",
            params![],
        )
    }

    fn query_packages<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Package>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, name, kind, path, source_url) = row?;
            let kind = PackageKind::parse(&kind)
                .with_context(|| format!("Unknown package kind '{}'", kind))?;
            result.push(Package {
                id: PackageId(parse_uuid(&id)?),
                name,
                kind,
                path: PathBuf::from(path),
                source_url,
            });
        }
        Ok(result)
    }

    // === Presets ===

    pub fn list_presets(&self) -> Result<Vec<Preset>> {
        self.query_presets(
            &format!("SELECT {} FROM presets ORDER BY name", PRESET_COLUMNS),
            params![],
        )
    }

    fn query_presets<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Preset>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, u32>(8)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (
                id,
                name,
                engine_id,
                base_id,
                additional_json,
                fingerprint,
                created_at,
                last_used_at,
                launch_count,
            ) = row?;

            let additional_ids: Vec<PackageId> = serde_json::from_str(&additional_json)
                .context("Failed to deserialize preset packages")?;

            result.push(Preset {
                id: PresetId(parse_uuid(&id)?),
                name,
                engine_id: EngineId(parse_uuid(&engine_id)?),
                base_id: base_id
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(PackageId),
                additional_ids,
                fingerprint: Fingerprint::from_hex(fingerprint),
                created_at: parse_time(&created_at)?,
                last_used_at: last_used_at.as_deref().map(parse_time).transpose()?,
                launch_count,
            });
        }
        Ok(result)
    }
}

impl SettingsStore for Database {
    fn get_setting(&self, scope: Scope, owner: &str, name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE scope = ?1 AND owner = ?2 AND name = ?3",
                params![scope.as_str(), owner, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, scope: Scope, owner: &str, name: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (scope, owner, name, value) VALUES (?1, ?2, ?3, ?4)",
            params![scope.as_str(), owner, name, value],
        )?;
        debug!("Setting {}/{}/{} saved", scope, owner, name);
        Ok(())
    }

    fn remove_setting(&self, scope: Scope, owner: &str, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM settings WHERE scope = ?1 AND owner = ?2 AND name = ?3",
            params![scope.as_str(), owner, name],
        )?;
        Ok(count > 0)
    }

    fn list_settings(
        &self,
        scope: Scope,
        owner: &str,
        prefix: &str,
    ) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        // substr comparison sidesteps LIKE wildcards in the prefix
        let mut stmt = conn.prepare(
            r#"
            SELECT name, value FROM settings
            WHERE scope = ?1 AND owner = ?2 AND substr(name, 1, length(?3)) = ?3
            ORDER BY name
            "#,
        )?;
        let rows = stmt.query_map(params![scope.as_str(), owner, prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn inherited_setting(&self, engine: EngineId, name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM inherited_settings WHERE engine_id = ?1 AND name = ?2",
                params![engine.to_string(), name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl CatalogStore for Database {
    fn engine_by_name(&self, name: &str) -> Result<Option<Engine>> {
        Ok(self
            .query_engines(
                "SELECT id, name, template_id, created_at FROM engines WHERE name = ?1",
                params![name],
            )?
            .pop())
    }

    fn engine_by_id(&self, id: EngineId) -> Result<Option<Engine>> {
        Ok(self
            .query_engines(
                "SELECT id, name, template_id, created_at FROM engines WHERE id = ?1",
                params![id.to_string()],
            )?
            .pop())
    }

    fn package_by_name(&self, kind: PackageKind, name: &str) -> Result<Option<Package>> {
        Ok(self
            .query_packages(
                "SELECT id, name, kind, path, source_url FROM packages WHERE kind = ?1 AND name = ?2",
                params![kind.as_str(), name],
            )?
            .pop())
    }

    fn package_by_id(&self, id: PackageId) -> Result<Option<Package>> {
        Ok(self
            .query_packages(
                "SELECT id, name, kind, path, source_url FROM packages WHERE id = ?1",
                params![id.to_string()],
            )?
            .pop())
    }
}

impl PresetStore for Database {
    fn presets_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<Preset>> {
        self.query_presets(
            &format!("SELECT {} FROM presets WHERE fingerprint = ?1", PRESET_COLUMNS),
            params![fingerprint.as_str()],
        )
    }

    fn preset_by_name(&self, name: &str) -> Result<Option<Preset>> {
        Ok(self
            .query_presets(
                &format!("SELECT {} FROM presets WHERE name = ?1", PRESET_COLUMNS),
                params![name],
            )?
            .pop())
    }

    fn insert_preset(&self, preset: &Preset) -> Result<InsertOutcome> {
        let conn = self.conn()?;
        let additional = serde_json::to_string(&preset.additional_ids)?;

        // Both uniqueness checks happen inside this single statement
        let inserted = conn.execute(
            &format!(
                "INSERT INTO presets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                PRESET_COLUMNS
            ),
            params![
                preset.id.to_string(),
                preset.name,
                preset.engine_id.to_string(),
                preset.base_id.map(|b| b.to_string()),
                additional,
                preset.fingerprint.as_str(),
                preset.created_at.to_rfc3339(),
                preset.last_used_at.map(|t| t.to_rfc3339()),
                preset.launch_count,
            ],
        );

        match inserted {
            Ok(_) => {
                debug!("Preset {} saved", preset.id);
                Ok(InsertOutcome::Inserted)
            }
            Err(e) if is_constraint_violation(&e) => {
                // An existing combination takes priority over a clashing name
                let fingerprint_exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM presets WHERE fingerprint = ?1)",
                    params![preset.fingerprint.as_str()],
                    |row| row.get(0),
                )?;
                if fingerprint_exists {
                    Ok(InsertOutcome::FingerprintExists)
                } else {
                    Ok(InsertOutcome::NameTaken)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn mark_preset_used(&self, id: PresetId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE presets SET last_used_at = ?1, launch_count = launch_count + 1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

fn name_conflict(e: rusqlite::Error, what: &str, name: &str) -> anyhow::Error {
    if is_constraint_violation(&e) {
        anyhow::anyhow!("{} '{}' already exists", what, name)
    } else {
        e.into()
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid id '{}' in database", value))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp '{}' in database", value))?
        .with_timezone(&Utc))
}
