use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GameError, TemplateId, MAX_ITEM_LEN};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ItemOrigin {
    Author,
    Suggested { by: String },
}

/// Moderation state of an item. Author items are eligible regardless.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    #[default]
    Unset,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardItem {
    pub text: String,
    pub origin: ItemOrigin,
    #[serde(default)]
    pub approval: Approval,
    pub created_at: DateTime<Utc>,
}

impl BoardItem {
    pub fn authored(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: ItemOrigin::Author,
            approval: Approval::Unset,
            created_at: Utc::now(),
        }
    }

    pub fn suggested(text: impl Into<String>, by: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: ItemOrigin::Suggested { by: by.into() },
            approval: Approval::Unset,
            created_at: Utc::now(),
        }
    }

    pub fn is_authored(&self) -> bool {
        matches!(self.origin, ItemOrigin::Author)
    }

    /// Whether this item may land on a board. Suggestions need an explicit
    /// approval and are skipped entirely when `use_suggested` is off.
    pub fn is_eligible(&self, use_suggested: bool) -> bool {
        match self.origin {
            ItemOrigin::Author => true,
            ItemOrigin::Suggested { .. } => {
                use_suggested && self.approval == Approval::Approved
            }
        }
    }
}

/// Candidate items for a template, with a text index for duplicate checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<BoardItem>", into = "Vec<BoardItem>")]
pub struct ItemPool {
    items: Vec<BoardItem>,
    texts: HashSet<String>,
}

impl From<Vec<BoardItem>> for ItemPool {
    fn from(items: Vec<BoardItem>) -> Self {
        let texts = items.iter().map(|i| i.text.clone()).collect();
        Self { items, texts }
    }
}

impl From<ItemPool> for Vec<BoardItem> {
    fn from(pool: ItemPool) -> Self {
        pool.items
    }
}

impl ItemPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[BoardItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.texts.contains(text)
    }

    /// Adds an item, rejecting exact duplicates.
    pub fn insert(&mut self, item: BoardItem) -> Result<(), GameError> {
        if item.text.trim().is_empty() {
            return Err(GameError::Validation("item text required".into()));
        }
        if item.text.chars().count() > MAX_ITEM_LEN {
            return Err(GameError::Validation(format!(
                "item longer than {MAX_ITEM_LEN} characters"
            )));
        }
        if !self.texts.insert(item.text.clone()) {
            return Err(GameError::DuplicateItem);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn set_approval(&mut self, text: &str, approval: Approval) -> Result<(), GameError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.text == text)
            .ok_or_else(|| GameError::Validation(format!("no item '{text}'")))?;
        item.approval = approval;
        Ok(())
    }

    pub fn with_approval(&self, approval: Approval) -> impl Iterator<Item = &BoardItem> {
        self.items.iter().filter(move |i| i.approval == approval)
    }

    /// Suggested items still waiting on a moderator.
    pub fn pending(&self) -> impl Iterator<Item = &BoardItem> {
        self.with_approval(Approval::Unset).filter(|i| !i.is_authored())
    }

    pub fn eligible(&self, use_suggested: bool) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.is_eligible(use_suggested))
            .map(|i| i.text.as_str())
            .collect()
    }

    pub fn eligible_count(&self, use_suggested: bool) -> usize {
        self.items
            .iter()
            .filter(|i| i.is_eligible(use_suggested))
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardTemplate {
    pub id: TemplateId,
    pub name: String,
    pub creator: String,
    pub items: ItemPool,
    pub created_at: DateTime<Utc>,
}

impl BoardTemplate {
    /// Builds a template from author texts. Blank lines are skipped and
    /// repeated texts collapse to one item.
    pub fn new(
        id: impl Into<TemplateId>,
        name: impl Into<String>,
        creator: impl Into<String>,
        texts: impl IntoIterator<Item = String>,
    ) -> Result<Self, GameError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GameError::Validation("board name required".into()));
        }
        let mut items = ItemPool::new();
        for text in texts {
            let text = text.trim();
            if text.is_empty() || items.contains(text) {
                continue;
            }
            items.insert(BoardItem::authored(text))?;
        }
        Ok(Self {
            id: id.into(),
            name: name.trim().to_string(),
            creator: creator.into(),
            items,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ItemPool {
        let mut pool = ItemPool::new();
        pool.insert(BoardItem::authored("coffee spill")).unwrap();
        pool.insert(BoardItem::suggested("dog barks", "ann")).unwrap();
        pool.insert(BoardItem::suggested("wifi drops", "bo")).unwrap();
        pool
    }

    #[test]
    fn eligibility_follows_origin_and_approval() {
        let mut pool = pool();
        assert_eq!(pool.eligible(true), vec!["coffee spill"]);

        pool.set_approval("dog barks", Approval::Approved).unwrap();
        pool.set_approval("wifi drops", Approval::Rejected).unwrap();
        assert_eq!(pool.eligible(true), vec!["coffee spill", "dog barks"]);
        assert_eq!(pool.eligible(false), vec!["coffee spill"]);
        assert_eq!(pool.eligible_count(true), 2);
    }

    #[test]
    fn duplicates_rejected_through_index() {
        let mut pool = pool();
        let err = pool.insert(BoardItem::suggested("dog barks", "cy")).unwrap_err();
        assert_eq!(err, GameError::DuplicateItem);
        // exact match only
        assert!(pool.insert(BoardItem::suggested("Dog barks", "cy")).is_ok());
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn pending_lists_unmoderated_suggestions() {
        let mut pool = pool();
        pool.set_approval("dog barks", Approval::Approved).unwrap();
        let pending: Vec<_> = pool.pending().map(|i| i.text.as_str()).collect();
        assert_eq!(pending, vec!["wifi drops"]);
    }

    #[test]
    fn index_rebuilt_from_item_list() {
        let items: Vec<BoardItem> = pool().into();
        let mut restored = ItemPool::from(items);
        assert!(restored.contains("wifi drops"));
        assert_eq!(
            restored.insert(BoardItem::authored("coffee spill")),
            Err(GameError::DuplicateItem)
        );
    }

    #[test]
    fn template_skips_blank_and_repeated_texts() {
        let texts = ["a", " ", "b", "a", "c "].map(String::from);
        let template = BoardTemplate::new("t1", "Standup", "host", texts).unwrap();
        let texts: Vec<_> = template.items.items().iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert!(template.items.items().iter().all(BoardItem::is_authored));
    }
}
