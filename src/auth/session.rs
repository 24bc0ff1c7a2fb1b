use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// On-disk form of a cached session: the cookie set plus when it was issued.
/// The timestamp is informational only; the device decides when a session
/// actually expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionData {
    cookies: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

/// Persistent store for the device session cookies.
///
/// Holds the in-memory cookie set and mirrors it to a single file. Load
/// failures of any kind (absent, unreadable, corrupt) degrade to an empty
/// set rather than erroring, which makes the client fall back to a fresh
/// login.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    cookies: BTreeMap<String, String>,
}

impl SessionStore {
    /// Open the store at `path`, loading any previously cached session.
    pub fn open(path: PathBuf) -> Self {
        let cookies = load_cookies(&path);
        Self { path, cookies }
    }

    /// Whether a session credential is currently held.
    pub fn has_credential(&self) -> bool {
        !self.cookies.is_empty()
    }

    /// The current cookie set.
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Render the cookie set as a `Cookie` request header value, or `None`
    /// when no session is held.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Some(pairs.join("; "))
    }

    /// Replace the session wholesale with a freshly issued cookie set and
    /// persist it. An empty set is a no-op: a working cached session is
    /// never overwritten by nothing.
    pub fn establish(&mut self, cookies: BTreeMap<String, String>) -> io::Result<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        self.cookies = cookies;
        let data = SessionData {
            cookies: self.cookies.clone(),
            created_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&data).map_err(io::Error::other)?;
        std::fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), "session persisted");
        Ok(())
    }

    /// Drop the session: delete the cache file (absence is fine) and empty
    /// the in-memory cookie set.
    pub fn clear(&mut self) -> io::Result<()> {
        self.cookies.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Read the cached cookie set, treating every failure as "no session".
fn load_cookies(path: &Path) -> BTreeMap<String, String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "no cached session");
            return BTreeMap::new();
        }
    };
    match serde_json::from_str::<SessionData>(&contents) {
        Ok(data) => {
            let age = Utc::now() - data.created_at;
            debug!(
                path = %path.display(),
                age_minutes = age.num_minutes(),
                "loaded cached session"
            );
            data.cookies
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring corrupt session cache");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn missing_file_yields_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("absent"));
        assert!(!store.has_credential());
        assert_eq!(store.cookie_header(), None);
    }

    #[test]
    fn corrupt_file_yields_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        std::fs::write(&path, "definitely not json{{{").unwrap();

        let store = SessionStore::open(path);
        assert!(!store.has_credential());
    }

    #[test]
    fn establish_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");

        let mut store = SessionStore::open(path.clone());
        store
            .establish(jar(&[("sid", "abc123"), ("token", "xyz")]))
            .unwrap();

        let reopened = SessionStore::open(path);
        assert!(reopened.has_credential());
        assert_eq!(reopened.cookies().len(), 2);
        assert_eq!(reopened.cookies()["sid"], "abc123");
        assert_eq!(reopened.cookies()["token"], "xyz");
        assert_eq!(
            reopened.cookie_header().as_deref(),
            Some("sid=abc123; token=xyz")
        );
    }

    #[test]
    fn establish_empty_set_leaves_file_and_memory_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");

        let mut store = SessionStore::open(path.clone());
        store.establish(jar(&[("sid", "abc123")])).unwrap();
        store.establish(BTreeMap::new()).unwrap();

        assert_eq!(store.cookie_header().as_deref(), Some("sid=abc123"));
        let reopened = SessionStore::open(path);
        assert_eq!(reopened.cookie_header().as_deref(), Some("sid=abc123"));
    }

    #[test]
    fn clear_removes_file_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");

        let mut store = SessionStore::open(path.clone());
        store.establish(jar(&[("sid", "abc123")])).unwrap();
        assert!(path.exists());

        store.clear().unwrap();
        assert!(!store.has_credential());
        assert!(!path.exists());
    }

    #[test]
    fn clear_when_absent_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::open(dir.path().join("never-written"));
        store.clear().unwrap();
        store.clear().unwrap();
    }
}
