//! Runtime configuration - Where the database lives and how logging is filtered

use std::path::PathBuf;

use anyhow::Result;

use crate::persistence::Database;

/// Environment variable overriding the database location
pub const DATABASE_ENV: &str = "WADRUNNER_DB";

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "wadrunner=info";

/// Log filter used with `--verbose`
pub const VERBOSE_LOG_FILTER: &str = "wadrunner=debug";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub verbose: bool,
}

impl Config {
    /// Database path from the command line, else `WADRUNNER_DB`, else the data directory
    pub fn resolve(database: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let from_env = std::env::var_os(DATABASE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let database_path = match database.or(from_env) {
            Some(path) => path,
            None => Database::default_path()?,
        };
        Ok(Self {
            database_path,
            verbose,
        })
    }

    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let config = Config::resolve(Some(PathBuf::from("/tmp/custom.db")), false).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn verbose_raises_filter() {
        let config = Config::resolve(Some(PathBuf::from("x.db")), true).unwrap();
        assert_eq!(config.log_filter(), VERBOSE_LOG_FILTER);
    }
}
