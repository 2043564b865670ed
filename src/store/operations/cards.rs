use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::operations::words::parse_id;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardTemplate {
    Basic,
    Reverse,
    Cloze,
    Choice,
}

impl CardTemplate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Reverse => "reverse",
            Self::Cloze => "cloze",
            Self::Choice => "choice",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: u64,
    pub word_id: u64,
    pub template: CardTemplate,
    pub hint: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Idempotent on `(word, template)`: a second call returns the existing card.
    pub fn create_card_if_missing(
        &self,
        word_id: u64,
        template: CardTemplate,
        hint: Option<String>,
    ) -> Result<Card, StoreError> {
        if self.get_word(word_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "word".into(),
                key: word_id.to_string(),
            });
        }

        let unique_key = keys::card_unique_key(word_id, template.as_str());
        if let Some(raw) = self.cards_by_word.get(unique_key.as_bytes())? {
            let existing_id = parse_id(&raw)?;
            if let Some(card) = self.get_card(existing_id)? {
                return Ok(card);
            }
        }

        let id = self.allocate_id("cards")?;
        let card = Card {
            id,
            word_id,
            template,
            hint,
            tags: Vec::new(),
            created_at: Utc::now(),
        };
        self.cards
            .insert(keys::id_key(id).as_bytes(), Self::serialize(&card)?)?;
        self.cards_by_word
            .insert(unique_key.as_bytes(), keys::id_key(id).as_bytes())?;
        Ok(card)
    }

    pub fn get_card(&self, card_id: u64) -> Result<Option<Card>, StoreError> {
        match self.cards.get(keys::id_key(card_id).as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn cards_for_word(&self, word_id: u64) -> Result<Vec<Card>, StoreError> {
        let prefix = keys::card_word_prefix(word_id);
        let mut cards = Vec::new();
        for item in self.cards_by_word.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            let card_id = parse_id(&raw)?;
            if let Some(card) = self.get_card(card_id)? {
                cards.push(card);
            }
        }
        Ok(cards)
    }

    /// 卡片生命周期与单词绑定：删除单词时级联删除卡片及其学习状态。
    pub(crate) fn delete_cards_for_word(&self, word_id: u64) -> Result<(), StoreError> {
        for card in self.cards_for_word(word_id)? {
            self.delete_srs_state(card.id)?;
            self.delete_reviews_for_card(card.id)?;
            self.cards.remove(keys::id_key(card.id).as_bytes())?;
            let unique_key = keys::card_unique_key(word_id, card.template.as_str());
            self.cards_by_word.remove(unique_key.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::store::operations::words::{NewWord, UpsertOutcome};

    use super::*;

    fn store_with_word(dir: &tempfile::TempDir) -> (Store, u64) {
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let book = store.create_wordbook("A", "fr", None, None, None).unwrap();
        let UpsertOutcome::Inserted(word_id) = store
            .upsert_word(
                book.id,
                &NewWord {
                    lemma: "chemise".into(),
                    ..Default::default()
                },
            )
            .unwrap()
        else {
            panic!("expected insert");
        };
        (store, word_id)
    }

    #[test]
    fn create_card_is_idempotent_per_template() {
        let dir = tempdir().unwrap();
        let (store, word_id) = store_with_word(&dir);

        let first = store
            .create_card_if_missing(word_id, CardTemplate::Basic, None)
            .unwrap();
        let second = store
            .create_card_if_missing(word_id, CardTemplate::Basic, None)
            .unwrap();
        assert_eq!(first.id, second.id);

        let reverse = store
            .create_card_if_missing(word_id, CardTemplate::Reverse, None)
            .unwrap();
        assert_ne!(first.id, reverse.id);
        assert_eq!(store.cards_for_word(word_id).unwrap().len(), 2);
    }

    #[test]
    fn card_for_unknown_word_is_not_found() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let err = store
            .create_card_if_missing(42, CardTemplate::Basic, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn deleting_word_removes_cards() {
        let dir = tempdir().unwrap();
        let (store, word_id) = store_with_word(&dir);

        let card = store
            .create_card_if_missing(word_id, CardTemplate::Basic, None)
            .unwrap();
        store.delete_word(word_id).unwrap();
        assert!(store.get_card(card.id).unwrap().is_none());
        assert!(store.cards_for_word(word_id).unwrap().is_empty());
    }
}
