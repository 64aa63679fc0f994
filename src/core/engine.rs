//! Engines and engine templates - Named installations and their setting bundles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(pub Uuid);

impl EngineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an engine template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub Uuid);

impl TemplateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An independently configured installation of a game-running executable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    /// Unique identifier, stable across renames
    pub id: EngineId,
    /// Display name, unique among engines
    pub name: String,
    /// Template this engine was created from, if any
    pub template_id: Option<TemplateId>,
    /// When the engine was added
    pub created_at: DateTime<Utc>,
}

impl Engine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EngineId::new(),
            name: name.into(),
            template_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }
}

/// A named bundle of default settings that can seed new engines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TemplateId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
