//! Client-side persistence of room tokens.
//!
//! A token is durable and keyed by room slug, so a restart can rejoin
//! without asking for the password again. The nickname hint is used for
//! exactly one `join` and never written anywhere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::ClientError;

/// Where the client keeps its tokens.
pub trait TokenStore: Send + Sync + 'static {
    fn token(&self, slug: &str) -> Option<String>;

    /// # Errors
    /// Returns [`ClientError::TokenStore`] if a durable write fails.
    fn set_token(&self, slug: &str, token: &str) -> Result<(), ClientError>;

    /// # Errors
    /// Returns [`ClientError::TokenStore`] if a durable write fails.
    fn remove_token(&self, slug: &str) -> Result<(), ClientError>;

    fn set_nickname_hint(&self, slug: &str, nickname: &str);

    /// Returns the hint and forgets it.
    fn take_nickname_hint(&self, slug: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// MemoryTokenStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, String>>,
    hints: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self, slug: &str) -> Option<String> {
        lock(&self.tokens).get(slug).cloned()
    }

    fn set_token(&self, slug: &str, token: &str) -> Result<(), ClientError> {
        lock(&self.tokens).insert(slug.to_owned(), token.to_owned());
        Ok(())
    }

    fn remove_token(&self, slug: &str) -> Result<(), ClientError> {
        lock(&self.tokens).remove(slug);
        Ok(())
    }

    fn set_nickname_hint(&self, slug: &str, nickname: &str) {
        lock(&self.hints).insert(slug.to_owned(), nickname.to_owned());
    }

    fn take_nickname_hint(&self, slug: &str) -> Option<String> {
        lock(&self.hints).remove(slug)
    }
}

// ---------------------------------------------------------------------------
// FileTokenStore
// ---------------------------------------------------------------------------

/// Tokens in a JSON object on disk (`{"slug": "token", ...}`).
///
/// The file is read once at [`open`](Self::open) and rewritten on every
/// change through a temporary file and a rename. A change that cannot be
/// written is not applied in memory either.
///
/// Writes block on disk I/O. [`RoomClient`](crate::RoomClient) calls them
/// from the blocking pool, except in [`leave`](crate::RoomClient::leave),
/// which is synchronous.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    tokens: Mutex<HashMap<String, String>>,
    hints: Mutex<HashMap<String, String>>,
}

impl FileTokenStore {
    /// Loads `path`. A missing file is an empty store.
    ///
    /// # Errors
    /// Returns [`ClientError::TokenStore`] if the file exists but cannot be
    /// read or is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let path = path.into();
        let tokens = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(std::io::Error::from)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "opened token store");
        Ok(Self {
            path,
            tokens: Mutex::new(tokens),
            hints: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tokens: &HashMap<String, String>) -> Result<(), ClientError> {
        let text = serde_json::to_string_pretty(tokens).map_err(std::io::Error::from)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self, slug: &str) -> Option<String> {
        lock(&self.tokens).get(slug).cloned()
    }

    fn set_token(&self, slug: &str, token: &str) -> Result<(), ClientError> {
        let mut tokens = lock(&self.tokens);
        let mut next = tokens.clone();
        next.insert(slug.to_owned(), token.to_owned());
        self.persist(&next)?;
        *tokens = next;
        Ok(())
    }

    fn remove_token(&self, slug: &str) -> Result<(), ClientError> {
        let mut tokens = lock(&self.tokens);
        if !tokens.contains_key(slug) {
            return Ok(());
        }
        let mut next = tokens.clone();
        next.remove(slug);
        self.persist(&next)?;
        *tokens = next;
        Ok(())
    }

    fn set_nickname_hint(&self, slug: &str, nickname: &str) {
        lock(&self.hints).insert(slug.to_owned(), nickname.to_owned());
    }

    fn take_nickname_hint(&self, slug: &str) -> Option<String> {
        lock(&self.hints).remove(slug)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bingo-client-{}-{name}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tokens.json");
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.token("room"), None);

        store.set_token("room", "abc").unwrap();
        assert_eq!(store.token("room").as_deref(), Some("abc"));
        assert_eq!(store.token("other"), None);

        store.remove_token("room").unwrap();
        assert_eq!(store.token("room"), None);
    }

    #[test]
    fn test_take_nickname_hint_is_single_use() {
        let store = MemoryTokenStore::new();
        store.set_nickname_hint("room", "alice");
        assert_eq!(store.take_nickname_hint("room").as_deref(), Some("alice"));
        assert_eq!(store.take_nickname_hint("room"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_path("reopen");
        {
            let store = FileTokenStore::open(&path).unwrap();
            store.set_token("room", "abc").unwrap();
            store.set_nickname_hint("room", "alice");
        }

        let store = FileTokenStore::open(&path).unwrap();
        assert_eq!(store.token("room").as_deref(), Some("abc"));
        assert_eq!(store.take_nickname_hint("room"), None, "hints are not persisted");
    }

    #[test]
    fn test_file_store_remove_is_durable() {
        let path = temp_path("remove");
        let store = FileTokenStore::open(&path).unwrap();
        store.set_token("a", "1").unwrap();
        store.set_token("b", "2").unwrap();
        store.remove_token("a").unwrap();
        drop(store);

        let store = FileTokenStore::open(&path).unwrap();
        assert_eq!(store.token("a"), None);
        assert_eq!(store.token("b").as_deref(), Some("2"));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let path = temp_path("missing");
        let store = FileTokenStore::open(&path).unwrap();
        assert_eq!(store.token("room"), None);
        assert!(!path.exists(), "nothing written until a token is set");
    }

    #[test]
    fn test_file_store_corrupt_file_errors() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json").unwrap();
        let result = FileTokenStore::open(&path);
        assert!(matches!(result, Err(ClientError::TokenStore(_))));
    }

    #[test]
    fn test_file_store_failed_write_leaves_memory_unchanged() {
        let path = temp_path("failed-write");
        let store = FileTokenStore::open(&path).unwrap();
        store.set_token("kept", "abc").unwrap();

        let dir = path.parent().unwrap().to_owned();
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(store.set_token("room", "xyz").is_err());
        assert_eq!(store.token("room"), None);
        assert!(store.remove_token("kept").is_err());
        assert_eq!(store.token("kept").as_deref(), Some("abc"));
    }
}
