use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::FormData;
use crate::workflows::registration::domain::UserId;

/// Key of a locally cached form snapshot: an anonymous draft or a known user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DraftKey {
    Anonymous(String),
    User(UserId),
}

impl DraftKey {
    /// Hex of the raw id, so distinct keys never share a file.
    fn file_stem(&self) -> String {
        let (prefix, raw) = match self {
            DraftKey::Anonymous(id) => ("draft", id.as_str()),
            DraftKey::User(user) => ("user", user.0.as_str()),
        };
        let mut stem = format!("form_{prefix}_");
        for byte in raw.bytes() {
            let _ = write!(stem, "{byte:02x}");
        }
        stem
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("draft storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("draft snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("draft storage unavailable: {0}")]
    Unavailable(String),
}

/// Local durable cache of whole-form snapshots. No eviction.
pub trait DraftStore: Send + Sync {
    fn load(&self, key: &DraftKey) -> Result<Option<FormData>, DraftError>;
    fn save(&self, key: &DraftKey, form: &FormData) -> Result<(), DraftError>;
    fn remove(&self, key: &DraftKey) -> Result<(), DraftError>;

    /// Moves an anonymous draft under the user's key once they are known.
    fn promote(&self, from: &DraftKey, to: &DraftKey) -> Result<Option<FormData>, DraftError> {
        let Some(form) = self.load(from)? else {
            return Ok(None);
        };
        self.save(to, &form)?;
        self.remove(from)?;
        Ok(Some(form))
    }
}

/// Keeps one JSON file per draft key inside a directory.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    root: PathBuf,
}

impl FileDraftStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DraftError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &DraftKey) -> PathBuf {
        self.root.join(format!("{}.json", key.file_stem()))
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<FormData>, DraftError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &DraftKey, form: &FormData) -> Result<(), DraftError> {
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec(form)?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &DraftKey) -> Result<(), DraftError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<DraftKey, FormData>>,
}

impl DraftStore for MemoryDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<FormData>, DraftError> {
        let guard = self
            .drafts
            .lock()
            .map_err(|_| DraftError::Unavailable("draft mutex poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn save(&self, key: &DraftKey, form: &FormData) -> Result<(), DraftError> {
        let mut guard = self
            .drafts
            .lock()
            .map_err(|_| DraftError::Unavailable("draft mutex poisoned".to_string()))?;
        guard.insert(key.clone(), form.clone());
        Ok(())
    }

    fn remove(&self, key: &DraftKey) -> Result<(), DraftError> {
        let mut guard = self
            .drafts
            .lock()
            .map_err(|_| DraftError::Unavailable("draft mutex poisoned".to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::registration::form::FieldPath;
    use serde_json::json;

    fn sample_form() -> FormData {
        FormData::default().set(&FieldPath::from_dotted("personalInfo.firstName"), json!("Asha"))
    }

    #[test]
    fn file_store_round_trips_and_promotes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileDraftStore::new(dir.path()).expect("store");
        let draft = DraftKey::Anonymous("tab/1".to_string());
        let user = DraftKey::User(UserId("user-1".to_string()));

        assert!(store.load(&draft).expect("load").is_none());
        store.save(&draft, &sample_form()).expect("save");
        assert_eq!(store.load(&draft).expect("load"), Some(sample_form()));

        let promoted = store.promote(&draft, &user).expect("promote");
        assert_eq!(promoted, Some(sample_form()));
        assert!(store.load(&draft).expect("load").is_none());
        assert_eq!(store.load(&user).expect("load"), Some(sample_form()));
    }

    #[test]
    fn similar_user_ids_keep_separate_drafts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileDraftStore::new(dir.path()).expect("store");
        let alice = DraftKey::User(UserId("a.b@x.com".to_string()));
        let other = DraftKey::User(UserId("a_b@x_com".to_string()));

        store.save(&alice, &sample_form()).expect("save");
        assert!(store.load(&other).expect("load").is_none());
        assert_ne!(store.path_for(&alice), store.path_for(&other));
        assert_ne!(
            DraftKey::Anonymous("user-1".to_string()).file_stem(),
            DraftKey::User(UserId("user-1".to_string())).file_stem()
        );
    }

    #[test]
    fn file_store_reports_corrupt_snapshots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileDraftStore::new(dir.path()).expect("store");
        let key = DraftKey::Anonymous("broken".to_string());
        fs::write(store.path_for(&key), b"{not json").expect("write");
        assert!(matches!(store.load(&key), Err(DraftError::Corrupt(_))));
    }

    #[test]
    fn memory_store_promotion_without_draft_is_noop() {
        let store = MemoryDraftStore::default();
        let promoted = store
            .promote(
                &DraftKey::Anonymous("missing".to_string()),
                &DraftKey::User(UserId("user-2".to_string())),
            )
            .expect("promote");
        assert!(promoted.is_none());
    }
}
