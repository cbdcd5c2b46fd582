//! Persistent token storage.
//!
//! Tokens live in the `[TOKENS]` section of the settings file, under the
//! `Access` and `Refresh` keys. The rest of the file is left untouched when
//! tokens are rewritten.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use toml::{Table, Value};
use tracing::debug;

use crate::error::Result;
use crate::token::TokenPair;

/// Settings section holding the tokens.
pub const TOKENS_SECTION: &str = "TOKENS";

const ACCESS_KEY: &str = "Access";
const REFRESH_KEY: &str = "Refresh";

/// Durable home for the current token pair.
pub trait TokenStore: Send {
    /// Reads the most recently stored pair, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self) -> Result<Option<TokenPair>>;

    /// Replaces the stored pair. Either both tokens are written or neither.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&mut self, tokens: &TokenPair) -> Result<()>;
}

/// Token store backed by the TOML settings file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store for the settings file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<Table> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.parse::<Table>()?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenPair>> {
        let table = self.read_table()?;
        let Some(section) = table.get(TOKENS_SECTION).and_then(Value::as_table) else {
            debug!("No {TOKENS_SECTION} section in {}", self.path.display());
            return Ok(None);
        };

        let read = |key: &str| {
            section
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        Ok(match (read(ACCESS_KEY), read(REFRESH_KEY)) {
            (Some(access), Some(refresh)) => Some(TokenPair::new(access, refresh)),
            _ => None,
        })
    }

    fn save(&mut self, tokens: &TokenPair) -> Result<()> {
        let mut table = self.read_table()?;

        let mut section = table
            .remove(TOKENS_SECTION)
            .and_then(|v| match v {
                Value::Table(t) => Some(t),
                _ => None,
            })
            .unwrap_or_default();
        section.insert(
            ACCESS_KEY.to_string(),
            Value::String(tokens.access_token.clone()),
        );
        section.insert(
            REFRESH_KEY.to_string(),
            Value::String(tokens.refresh_token.clone()),
        );
        table.insert(TOKENS_SECTION.to_string(), Value::Table(section));

        let contents = toml::to_string(&table)?;
        write_atomically(&self.path, contents.as_bytes())?;
        debug!("Stored tokens in {}", self.path.display());
        Ok(())
    }
}

/// Writes `contents` to a temporary file beside `path` and renames it over
/// `path`, so readers never observe a half-written file.
fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory token store, for tools that must not touch the settings file.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Option<TokenPair>,
}

impl MemoryTokenStore {
    /// Creates a store already holding `tokens`.
    #[must_use]
    pub const fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: Some(tokens),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenPair>> {
        Ok(self.tokens.clone())
    }

    fn save(&mut self, tokens: &TokenPair) -> Result<()> {
        self.tokens = Some(tokens.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"
[DEFAULT]
folder_location = "/tmp/logs"
days_over = 60

[TOKENS]
Access = "old-access"
Refresh = "old-refresh"
"#;

    fn settings_file(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_existing_tokens() {
        let (_dir, path) = settings_file(SETTINGS);
        let store = FileTokenStore::new(&path);
        let tokens = store.load().unwrap().unwrap();
        assert_eq!(tokens, TokenPair::new("old-access", "old-refresh"));
    }

    #[test]
    fn test_load_without_section() {
        let (_dir, path) = settings_file("[DEFAULT]\ndays_over = 60\n");
        let store = FileTokenStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.toml"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_empty_tokens_read_as_none() {
        let (_dir, path) = settings_file("[TOKENS]\nAccess = \"\"\nRefresh = \"\"\n");
        let store = FileTokenStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_preserves_other_sections() {
        let (_dir, path) = settings_file(SETTINGS);
        let mut store = FileTokenStore::new(&path);
        store.save(&TokenPair::new("new-access", "new-refresh")).unwrap();

        let table: Table = fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(
            table["DEFAULT"]["folder_location"].as_str(),
            Some("/tmp/logs")
        );
        assert_eq!(table["DEFAULT"]["days_over"].as_integer(), Some(60));
        assert_eq!(
            store.load().unwrap(),
            Some(TokenPair::new("new-access", "new-refresh"))
        );
    }

    #[test]
    fn test_save_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut store = FileTokenStore::new(&path);
        store.save(&TokenPair::new("a", "r")).unwrap();
        assert_eq!(store.load().unwrap(), Some(TokenPair::new("a", "r")));
    }

    #[test]
    fn test_save_twice_is_idempotent() {
        let (_dir, path) = settings_file(SETTINGS);
        let mut store = FileTokenStore::new(&path);
        let tokens = TokenPair::new("same-access", "same-refresh");

        store.save(&tokens).unwrap();
        let once = fs::read_to_string(&path).unwrap();
        store.save(&tokens).unwrap();
        let twice = fs::read_to_string(&path).unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.load().unwrap(), Some(tokens));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let (dir, path) = settings_file(SETTINGS);
        let mut store = FileTokenStore::new(&path);
        store.save(&TokenPair::new("a", "r")).unwrap();
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryTokenStore::default();
        assert!(store.load().unwrap().is_none());
        store.save(&TokenPair::new("a", "r")).unwrap();
        assert_eq!(store.load().unwrap(), Some(TokenPair::new("a", "r")));
    }
}
