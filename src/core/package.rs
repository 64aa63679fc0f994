//! Data packages - Content files handed to an engine at launch

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a data package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(pub Uuid);

impl PackageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PackageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a package is the single base of a launch or one of the additional layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageKind {
    Base,
    Additional,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Additional => "additional",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "base" => Some(Self::Base),
            "additional" => Some(Self::Additional),
            _ => None,
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named reference to a content file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    /// Name, unique within its kind
    pub name: String,
    pub kind: PackageKind,
    /// File handed to the engine
    pub path: PathBuf,
    /// Where the file was originally obtained, kept for provenance
    pub source_url: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>, kind: PackageKind, path: impl Into<PathBuf>) -> Self {
        Self {
            id: PackageId::new(),
            name: name.into(),
            kind,
            path: path.into(),
            source_url: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}
