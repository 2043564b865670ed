use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wordbook {
    pub id: u64,
    pub name: String,
    /// BCP-47 language tag of the vocabulary ("fr", "de", …).
    pub language: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub is_active: bool,
    pub total_words: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WordbookPatch {
    pub name: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
}

impl Store {
    pub fn create_wordbook(
        &self,
        name: &str,
        language: &str,
        description: Option<String>,
        author: Option<String>,
        version: Option<String>,
    ) -> Result<Wordbook, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("wordbook name must not be empty".into()));
        }
        if self.find_wordbook_by_name(name)?.is_some() {
            return Err(StoreError::Conflict {
                entity: "wordbook".into(),
                key: name.to_string(),
            });
        }

        let id = self.allocate_id("wordbooks")?;
        let now = Utc::now();
        let book = Wordbook {
            id,
            name: name.to_string(),
            language: language.trim().to_string(),
            description,
            author,
            version,
            is_active: false,
            total_words: 0,
            created_at: now,
            updated_at: now,
        };
        self.wordbooks
            .insert(keys::id_key(id).as_bytes(), Self::serialize(&book)?)?;
        Ok(book)
    }

    pub fn get_wordbook(&self, wordbook_id: u64) -> Result<Option<Wordbook>, StoreError> {
        match self.wordbooks.get(keys::id_key(wordbook_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn find_wordbook_by_name(&self, name: &str) -> Result<Option<Wordbook>, StoreError> {
        for item in self.wordbooks.iter() {
            let (_, raw) = item?;
            let book: Wordbook = Self::deserialize(&raw)?;
            if book.name == name {
                return Ok(Some(book));
            }
        }
        Ok(None)
    }

    pub fn list_wordbooks(&self) -> Result<Vec<Wordbook>, StoreError> {
        let mut books = Vec::new();
        for item in self.wordbooks.iter() {
            let (_, raw) = item?;
            books.push(Self::deserialize::<Wordbook>(&raw)?);
        }
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(books)
    }

    pub fn active_wordbook(&self) -> Result<Option<Wordbook>, StoreError> {
        for item in self.wordbooks.iter() {
            let (_, raw) = item?;
            let book: Wordbook = Self::deserialize(&raw)?;
            if book.is_active {
                return Ok(Some(book));
            }
        }
        Ok(None)
    }

    /// Atomically swap the active wordbook: after this returns exactly one
    /// book has `is_active = true`.
    pub fn activate_wordbook(&self, wordbook_id: u64) -> Result<Wordbook, StoreError> {
        let _guard = self.activation_guard();

        let mut target = self.get_wordbook(wordbook_id)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "wordbook".into(),
                key: wordbook_id.to_string(),
            }
        })?;

        for item in self.wordbooks.iter() {
            let (key, raw) = item?;
            let mut book: Wordbook = Self::deserialize(&raw)?;
            if book.is_active && book.id != wordbook_id {
                book.is_active = false;
                book.updated_at = Utc::now();
                self.wordbooks.insert(key, Self::serialize(&book)?)?;
            }
        }

        target.is_active = true;
        target.updated_at = Utc::now();
        self.wordbooks
            .insert(keys::id_key(wordbook_id).as_bytes(), Self::serialize(&target)?)?;
        Ok(target)
    }

    pub fn update_wordbook(
        &self,
        wordbook_id: u64,
        patch: &WordbookPatch,
    ) -> Result<Wordbook, StoreError> {
        let mut book = self.get_wordbook(wordbook_id)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "wordbook".into(),
                key: wordbook_id.to_string(),
            }
        })?;

        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(StoreError::Validation("wordbook name must not be empty".into()));
            }
            if let Some(other) = self.find_wordbook_by_name(name)? {
                if other.id != wordbook_id {
                    return Err(StoreError::Conflict {
                        entity: "wordbook".into(),
                        key: name.to_string(),
                    });
                }
            }
            book.name = name.to_string();
        }
        if let Some(language) = &patch.language {
            book.language = language.trim().to_string();
        }
        if patch.description.is_some() {
            book.description = patch.description.clone();
        }
        if patch.author.is_some() {
            book.author = patch.author.clone();
        }
        if patch.version.is_some() {
            book.version = patch.version.clone();
        }
        book.updated_at = Utc::now();
        self.wordbooks
            .insert(keys::id_key(wordbook_id).as_bytes(), Self::serialize(&book)?)?;
        Ok(book)
    }

    /// Delete an inactive wordbook and cascade to its words, cards, SRS
    /// states, reviews and index entries.
    pub fn delete_wordbook(&self, wordbook_id: u64) -> Result<(), StoreError> {
        let book = self.get_wordbook(wordbook_id)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "wordbook".into(),
                key: wordbook_id.to_string(),
            }
        })?;
        if book.is_active {
            return Err(StoreError::Precondition(
                "cannot delete the active wordbook".into(),
            ));
        }

        let lock = self.book_write_lock(wordbook_id);
        let _guard = lock.lock().expect("wordbook write lock poisoned");

        for word_id in self.word_ids_in_book(wordbook_id)? {
            self.delete_word(word_id)?;
        }
        self.wordbooks.remove(keys::id_key(wordbook_id).as_bytes())?;
        Ok(())
    }

    pub(crate) fn recount_wordbook_words(&self, wordbook_id: u64) -> Result<(), StoreError> {
        let prefix = keys::word_book_prefix(wordbook_id);
        let mut count = 0u64;
        for item in self.words_by_book.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        if let Some(raw) = self.wordbooks.get(keys::id_key(wordbook_id).as_bytes())? {
            let mut book: Wordbook = Self::deserialize(&raw)?;
            book.total_words = count;
            self.wordbooks
                .insert(keys::id_key(wordbook_id).as_bytes(), Self::serialize(&book)?)?;
        }
        Ok(())
    }
}
