//! Per-item slot directories.
//!
//! Layout under the slots root:
//! ```text
//! <root>/
//! └── 0007_enospc-no-space-left-on-device/
//!     ├── item.json       full Item record
//!     ├── article.md      once drafted
//!     └── manifest.json   sha256 of the files above
//! ```
//!
//! Files are written to a temp name and renamed into place so a crash never
//! leaves a half-written `item.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use errorpress_shared::{CURRENT_SCHEMA_VERSION, Item, ItemState, PressError, Result, slot_name};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const ITEM_FILE: &str = "item.json";
const ARTICLE_FILE: &str = "article.md";
const MANIFEST_FILE: &str = "manifest.json";

/// Checksum entry for one slot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotFile {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotManifest {
    pub schema_version: u32,
    pub sequence_id: u64,
    pub slug: String,
    pub state: ItemState,
    pub files: Vec<SlotFile>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SlotStore {
    root: PathBuf,
}

impl SlotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, slot_dir: &str) -> PathBuf {
        self.root.join(slot_dir)
    }

    pub fn exists(&self, sequence_id: u64, slug: &str) -> bool {
        self.path(&slot_name(sequence_id, slug)).exists()
    }

    /// Slot directories for `sequence_id` under any slug.
    pub fn slots_for(&self, sequence_id: u64) -> Result<Vec<String>> {
        let prefix = slot_name(sequence_id, "");
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PressError::io(&self.root, e)),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PressError::io(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && entry.path().is_dir() {
                found.push(name);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Create an empty slot. An existing directory means the sequence id was
    /// handed out before.
    pub fn create(&self, sequence_id: u64, slug: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root).map_err(|e| PressError::io(&self.root, e))?;

        let dir = self.path(&slot_name(sequence_id, slug));
        match std::fs::create_dir(&dir) {
            Ok(()) => {
                debug!(path = %dir.display(), "slot created");
                Ok(dir)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PressError::DuplicateSequenceAssignment {
                    sequence_id,
                    detail: format!("slot {} already exists", dir.display()),
                })
            }
            Err(e) => Err(PressError::io(&dir, e)),
        }
    }

    /// Remove a slot created by a transaction that did not commit.
    pub fn discard(&self, sequence_id: u64, slug: &str) {
        let dir = self.path(&slot_name(sequence_id, slug));
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %e, "failed to remove uncommitted slot");
        }
    }

    /// Write the item's files and refresh the manifest.
    pub fn save(&self, item: &Item) -> Result<SlotManifest> {
        let dir = self.path(&item.slot_name());
        if !dir.is_dir() {
            return Err(PressError::validation(format!(
                "slot {} does not exist",
                dir.display()
            )));
        }

        let item_json = serde_json::to_string_pretty(item)
            .map_err(|e| PressError::validation(format!("JSON serialization failed: {e}")))?;
        let mut files = vec![write_atomic(&dir, ITEM_FILE, &item_json)?];

        if item.article.is_some() {
            files.push(write_atomic(&dir, ARTICLE_FILE, &render_article(item)?)?);
        }

        let manifest = SlotManifest {
            schema_version: CURRENT_SCHEMA_VERSION,
            sequence_id: item.sequence_id,
            slug: item.slug.clone(),
            state: item.state,
            files,
            updated_at: Utc::now(),
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| PressError::validation(format!("JSON serialization failed: {e}")))?;
        write_atomic(&dir, MANIFEST_FILE, &manifest_json)?;

        debug!(sequence_id = item.sequence_id, state = %item.state, "slot saved");
        Ok(manifest)
    }

    /// Read an item back from its slot.
    pub fn load(&self, slot_dir: &str) -> Result<Item> {
        let path = self.path(slot_dir).join(ITEM_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| PressError::io(&path, e))?;
        let item: Item = serde_json::from_str(&content).map_err(|e| {
            PressError::validation(format!("invalid {}: {e}", path.display()))
        })?;

        if item.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(PressError::validation(format!(
                "unsupported schema_version: {} (expected {})",
                item.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }
        if item.slot_name() != slot_dir {
            return Err(PressError::validation(format!(
                "{} belongs to slot {}",
                path.display(),
                item.slot_name()
            )));
        }
        Ok(item)
    }

    /// Compare slot files against the manifest. Returns the names of files
    /// that are missing or whose checksum differs.
    pub fn verify(&self, slot_dir: &str) -> Result<Vec<String>> {
        let dir = self.path(slot_dir);
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| PressError::io(&path, e))?;
        let manifest: SlotManifest = serde_json::from_str(&content).map_err(|e| {
            PressError::validation(format!("invalid {}: {e}", path.display()))
        })?;

        let mut mismatched = Vec::new();
        for file in &manifest.files {
            match std::fs::read(dir.join(&file.filename)) {
                Ok(bytes) if sha256_hex(&bytes) == file.sha256 => {}
                _ => mismatched.push(file.filename.clone()),
            }
        }
        Ok(mismatched)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_atomic(dir: &Path, filename: &str, content: &str) -> Result<SlotFile> {
    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, content).map_err(|e| PressError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| PressError::io(&target, e))?;

    Ok(SlotFile {
        filename: filename.to_string(),
        sha256: sha256_hex(content.as_bytes()),
        size_bytes: content.len(),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Article body preceded by front matter. Values are JSON strings, which
/// YAML readers accept as-is.
fn render_article(item: &Item) -> Result<String> {
    let Some(article) = item.article.as_ref() else {
        return Ok(String::new());
    };
    let quote = |s: &str| {
        serde_json::to_string(s)
            .map_err(|e| PressError::validation(format!("JSON serialization failed: {e}")))
    };
    let tags = serde_json::to_string(&article.metadata.tags)
        .map_err(|e| PressError::validation(format!("JSON serialization failed: {e}")))?;

    let mut out = String::from("---\n");
    out.push_str(&format!("title: {}\n", quote(&article.title)?));
    out.push_str(&format!("slug: {}\n", quote(&article.metadata.slug)?));
    out.push_str(&format!("excerpt: {}\n", quote(&article.metadata.excerpt)?));
    out.push_str(&format!("tags: {tags}\n"));
    out.push_str(&format!("language: {}\n", quote(&article.metadata.language)?));
    out.push_str(&format!("error: {}\n", quote(&item.candidate.raw_text)?));
    out.push_str(&format!("sequence_id: {}\n", item.sequence_id));
    out.push_str("---\n\n");
    out.push_str(article.body.trim_end());
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use errorpress_shared::{Article, ArticleMetadata, Candidate, Signals, Source};

    fn temp_store() -> SlotStore {
        SlotStore::new(std::env::temp_dir().join(format!("ep_slots_{}", uuid::Uuid::now_v7())))
    }

    fn item(sequence_id: u64) -> Item {
        Item::new(
            sequence_id,
            "enospc".into(),
            Candidate {
                raw_text: "ENOSPC: no space left on device".into(),
                source: Source::Reddit,
                source_signals: Signals::from([("vote_count".into(), 12.0)]),
                confidence_score: 0.7,
                fingerprint: "enospc no space left on device".into(),
                source_url: Some("https://www.reddit.com/r/node/comments/x".into()),
                title: None,
            },
        )
    }

    #[test]
    fn save_and_load_roundtrip() {
        let store = temp_store();
        let mut item = item(7);
        store.create(7, "enospc").expect("create");
        item.article = Some(Article {
            title: "Fix \"ENOSPC\"".into(),
            body: "## Cause\n\nDisk is full.".into(),
            metadata: ArticleMetadata {
                slug: "fix-enospc".into(),
                tags: vec!["node".into()],
                ..ArticleMetadata::default()
            },
        });

        let manifest = store.save(&item).expect("save");
        assert_eq!(manifest.files.len(), 2);

        let slot = store.path("0007_enospc");
        assert!(slot.join("item.json").exists());
        assert!(slot.join("manifest.json").exists());
        let md = std::fs::read_to_string(slot.join("article.md")).expect("read md");
        assert!(md.starts_with("---\ntitle: \"Fix \\\"ENOSPC\\\"\"\n"));
        assert!(md.ends_with("Disk is full.\n"));

        let loaded = store.load("0007_enospc").expect("load");
        assert_eq!(loaded, item);
        assert!(store.verify("0007_enospc").expect("verify").is_empty());

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn existing_slot_is_duplicate_assignment() {
        let store = temp_store();
        store.create(3, "enospc").expect("first");
        let err = store.create(3, "enospc").unwrap_err();
        assert!(matches!(
            err,
            PressError::DuplicateSequenceAssignment { sequence_id: 3, .. }
        ));
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn verify_reports_tampered_files() {
        let store = temp_store();
        let item = item(1);
        store.create(1, "enospc").expect("create");
        store.save(&item).expect("save");

        std::fs::write(store.path("0001_enospc").join("item.json"), "{}").expect("tamper");
        assert_eq!(
            store.verify("0001_enospc").expect("verify"),
            vec!["item.json".to_string()]
        );
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn save_requires_slot() {
        let store = temp_store();
        assert!(store.save(&item(2)).is_err());
    }

    #[test]
    fn finds_slots_by_sequence_prefix() {
        let store = temp_store();
        assert!(store.slots_for(1).expect("empty root").is_empty());

        store.create(1, "enospc").expect("create");
        store.create(10, "other").expect("create");
        store.create(10001, "wide").expect("create");

        assert_eq!(store.slots_for(1).expect("scan"), vec!["0001_enospc".to_string()]);
        assert_eq!(store.slots_for(10).expect("scan"), vec!["0010_other".to_string()]);
        assert!(store.slots_for(2).expect("scan").is_empty());
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn discard_removes_slot() {
        let store = temp_store();
        store.create(5, "enospc").expect("create");
        store.discard(5, "enospc");
        assert!(!store.exists(5, "enospc"));
        let _ = std::fs::remove_dir_all(store.root());
    }
}
