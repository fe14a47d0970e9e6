//! JSON file per owner backing the local enhancement cache.

use async_trait::async_trait;
use log::{debug, warn};
use parley_core::{Enhancement, EnhancementCache, OwnerId, StoreResult};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stores each owner's enhancements in `<dir>/enhancements_<owner>.json`.
#[derive(Debug, Clone)]
pub struct FileEnhancementCache {
    dir: PathBuf,
}

impl FileEnhancementCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for `owner`. ASCII letters, digits and `-` are kept; every
    /// other byte is written as `_` plus two hex digits, so distinct owners
    /// never share a file.
    pub fn owner_path(&self, owner: &OwnerId) -> PathBuf {
        self.dir
            .join(format!("enhancements_{}.json", file_stem(owner)))
    }

    fn temp_path(&self, owner: &OwnerId) -> PathBuf {
        self.dir
            .join(format!(".enhancements_{}.json.tmp", file_stem(owner)))
    }
}

fn file_stem(owner: &OwnerId) -> String {
    let mut stem = String::with_capacity(owner.as_str().len());
    for byte in owner.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "_{byte:02x}");
        }
    }
    stem
}

#[async_trait]
impl EnhancementCache for FileEnhancementCache {
    async fn load(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>> {
        let path = self.owner_path(owner);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<Enhancement> = serde_json::from_str(&contents)?;
        let total = records.len();
        let owned: Vec<Enhancement> = records
            .into_iter()
            .filter(|record| record.owner_id == *owner)
            .collect();
        if owned.len() != total {
            warn!(
                "ignoring foreign records in enhancement cache (owner={}, ignored={}, path={})",
                owner,
                total - owned.len(),
                path.display()
            );
        }
        Ok(owned)
    }

    /// Write to a temp file and rename it over the cache file.
    async fn save(&self, owner: &OwnerId, records: &[Enhancement]) -> StoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.owner_path(owner);
        let temp_path = self.temp_path(owner);
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            let body = serde_json::to_vec_pretty(records)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        debug!(
            "saved enhancement cache (owner={}, records={}, path={})",
            owner,
            records.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FileEnhancementCache;
    use chrono::Utc;
    use parley_core::{
        Enhancement, EnhancementCache, EnhancementStore, LocalEnhancementStore, NewEnhancement,
        OwnerId, StoreError,
    };
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn record(id: &str, owner: &OwnerId) -> Enhancement {
        Enhancement {
            id: id.to_string(),
            owner_id: owner.clone(),
            original_prompt: "make website".to_string(),
            enhanced_prompt: "Build a responsive website.".to_string(),
            provider: "enhance-prompt".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let temp = tempdir().expect("tempdir");
        let cache = FileEnhancementCache::new(temp.path().join("nested"));
        let records = cache.load(&OwnerId::new("u1")).await.expect("load");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn save_replaces_the_owner_file() {
        let temp = tempdir().expect("tempdir");
        let cache = FileEnhancementCache::new(temp.path());
        let owner = OwnerId::new("u1");

        cache
            .save(&owner, &[record("a", &owner), record("b", &owner)])
            .await
            .expect("save");
        cache.save(&owner, &[record("b", &owner)]).await.expect("save");

        let loaded = cache.load(&owner).await.expect("load");
        let ids: Vec<&str> = loaded.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        assert!(temp.path().join("enhancements_u1.json").exists());
        assert!(!temp.path().join(".enhancements_u1.json.tmp").exists());
    }

    #[tokio::test]
    async fn owner_ids_are_escaped_into_file_names() {
        let temp = tempdir().expect("tempdir");
        let cache = FileEnhancementCache::new(temp.path());
        let path = cache.owner_path(&OwnerId::new("../evil/user"));
        assert_eq!(
            path,
            temp.path().join("enhancements__2e_2e_2fevil_2fuser.json")
        );
        assert_ne!(
            cache.owner_path(&OwnerId::new("alice.smith")),
            cache.owner_path(&OwnerId::new("alice_smith"))
        );
    }

    #[tokio::test]
    async fn owners_differing_only_in_punctuation_stay_apart() {
        let temp = tempdir().expect("tempdir");
        let store = LocalEnhancementStore::new(FileEnhancementCache::new(temp.path()));
        let dotted = OwnerId::new("alice.smith");
        let underscored = OwnerId::new("alice_smith");
        store
            .create_enhancement(
                &dotted,
                NewEnhancement {
                    original_prompt: "secret".to_string(),
                    enhanced_prompt: "Secret plan.".to_string(),
                    provider: "enhance-prompt".to_string(),
                },
            )
            .await
            .expect("create");

        let listed = store.list_enhancements(&underscored).await.expect("list");
        assert!(listed.is_empty());
        assert_eq!(store.list_enhancements(&dotted).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn records_of_other_owners_are_not_loaded() {
        let temp = tempdir().expect("tempdir");
        let cache = FileEnhancementCache::new(temp.path());
        let owner = OwnerId::new("u1");
        let intruder = OwnerId::new("u2");
        let body = serde_json::to_string(&[record("a", &owner), record("b", &intruder)])
            .expect("encode");
        fs::write(cache.owner_path(&owner), body).expect("write");

        let loaded = cache.load(&owner).await.expect("load");
        let ids: Vec<&str> = loaded.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn corrupted_file_is_a_store_error() {
        let temp = tempdir().expect("tempdir");
        let cache = FileEnhancementCache::new(temp.path());
        let owner = OwnerId::new("u1");
        fs::write(cache.owner_path(&owner), "{not json").expect("write");

        let err = cache.load(&owner).await.expect_err("corrupt");
        assert!(matches!(err, StoreError::Serde(_)));
    }

    #[tokio::test]
    async fn local_store_survives_reopening() {
        let temp = tempdir().expect("tempdir");
        let owner = OwnerId::new("u1");
        let created = {
            let store = LocalEnhancementStore::new(FileEnhancementCache::new(temp.path()));
            store
                .create_enhancement(
                    &owner,
                    NewEnhancement {
                        original_prompt: "make website".to_string(),
                        enhanced_prompt: "Build a responsive website.".to_string(),
                        provider: "enhance-prompt".to_string(),
                    },
                )
                .await
                .expect("create")
        };

        let reopened = LocalEnhancementStore::new(FileEnhancementCache::new(temp.path()));
        let listed = reopened.list_enhancements(&owner).await.expect("list");
        assert_eq!(listed, vec![created]);
    }
}
