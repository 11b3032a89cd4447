//! Durable per-language translation store
//!
//! Keys are the exact original comment text and values the translated text,
//! both stored as raw UTF-8 bytes. sled provides atomic single-key reads and
//! writes, so the store can be shared across tasks without extra locking.

use std::path::Path;

use tracing::debug;

use crate::corpus::TranslationEntry;
use crate::error::{DocError, DocResult};

#[derive(Clone)]
pub struct TranslationStore {
    db: sled::Db,
}

impl TranslationStore {
    /// Open (or create) the store rooted at `path`
    pub fn open(path: &Path) -> DocResult<Self> {
        let db = sled::open(path).map_err(|e| {
            DocError::Store(format!("Failed to open store '{}': {}", path.display(), e))
        })?;
        debug!("opened translation store {}", path.display());
        Ok(TranslationStore { db })
    }

    pub fn get(&self, original: &str) -> DocResult<Option<String>> {
        match self.db.get(original.as_bytes())? {
            Some(value) => String::from_utf8(value.to_vec())
                .map(Some)
                .map_err(|e| DocError::Store(format!("Stored value is not UTF-8: {}", e))),
            None => Ok(None),
        }
    }

    /// Store a translation, overwriting any previous one.
    ///
    /// Returns `false` without touching the store when `original` and
    /// `translated` are equal.
    pub fn put(&self, original: &str, translated: &str) -> DocResult<bool> {
        if original == translated {
            return Ok(false);
        }
        self.db.insert(original.as_bytes(), translated.as_bytes())?;
        Ok(true)
    }

    /// Store a batch of entries and flush them to disk.
    /// Returns how many entries were written.
    pub fn put_entries(&self, entries: &[TranslationEntry]) -> DocResult<usize> {
        let mut written = 0;
        for entry in entries {
            if self.put(&entry.original, &entry.translated)? {
                written += 1;
            }
        }
        self.flush()?;
        Ok(written)
    }

    pub fn flush(&self) -> DocResult<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}
