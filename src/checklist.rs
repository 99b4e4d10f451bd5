//! Checklist templates and per-record checklist responses.
//!
//! A [`ChecklistTemplate`] is read-only to the core; it is the denominator for
//! auto-completion. [`ChecklistResponses`] holds at most one
//! [`ChecklistResponse`] per item and updates in place on resubmission.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::{Actor, ItemId, TemplateId};

/// A single task line of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: ItemId,
    pub position: u32,
    pub description: String,
    pub required: bool,
}

impl ChecklistItem {
    pub fn new(id: impl Into<ItemId>, description: impl Into<String>, required: bool) -> Self {
        Self {
            id: id.into(),
            position: 0,
            description: description.into(),
            required,
        }
    }
}

/// An ordered set of checklist items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistTemplate {
    pub id: TemplateId,
    pub name: String,
    items: Vec<ChecklistItem>,
}

impl ChecklistTemplate {
    /// Items are kept in the order given; positions are renumbered from 1.
    pub fn new(
        id: impl Into<TemplateId>,
        name: impl Into<String>,
        items: Vec<ChecklistItem>,
    ) -> Self {
        let items = items
            .into_iter()
            .zip(1..)
            .map(|(item, position)| ChecklistItem { position, ..item })
            .collect();
        Self {
            id: id.into(),
            name: name.into(),
            items,
        }
    }

    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    pub fn item(&self, id: &ItemId) -> Option<&ChecklistItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.item(id).is_some()
    }

    pub fn total_items(&self) -> usize {
        self.items.len()
    }
}

/// A submitted answer for one checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistAnswer {
    pub item_id: ItemId,
    pub completed: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ChecklistAnswer {
    pub fn new(item_id: impl Into<ItemId>, completed: bool) -> Self {
        Self {
            item_id: item_id.into(),
            completed,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// The stored completion state of one item on one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistResponse {
    pub item_id: ItemId,
    pub completed: bool,
    pub comment: Option<String>,
    pub answered_by: String,
    pub answered_at: DateTime<Utc>,
}

/// Whether an upsert created a new response or rewrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// All responses of one record, keyed by item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistResponses {
    entries: BTreeMap<ItemId, ChecklistResponse>,
}

impl ChecklistResponses {
    /// Insert or overwrite the response for `answer.item_id`.
    pub fn upsert(&mut self, answer: &ChecklistAnswer, actor: &Actor, at: DateTime<Utc>) -> Upsert {
        let response = ChecklistResponse {
            item_id: answer.item_id.clone(),
            completed: answer.completed,
            comment: answer.comment.clone(),
            answered_by: actor.id.clone(),
            answered_at: at,
        };
        match self.entries.insert(answer.item_id.clone(), response) {
            Some(_) => Upsert::Updated,
            None => Upsert::Inserted,
        }
    }

    pub fn get(&self, item: &ItemId) -> Option<&ChecklistResponse> {
        self.entries.get(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChecklistResponse> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any response, template item or not, is marked completed.
    pub fn any_completed(&self) -> bool {
        self.entries.values().any(|r| r.completed)
    }

    /// Completed responses counted over the template's items only.
    pub fn completed_count(&self, template: &ChecklistTemplate) -> usize {
        template
            .items()
            .iter()
            .filter(|item| self.entries.get(&item.id).is_some_and(|r| r.completed))
            .count()
    }

    /// Completed responses regardless of template membership.
    pub fn completed_total(&self) -> usize {
        self.entries.values().filter(|r| r.completed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> ChecklistTemplate {
        ChecklistTemplate::new(
            "compressor",
            "Compressor monthly",
            vec![
                ChecklistItem::new("belts", "Inspect belts", true),
                ChecklistItem::new("filters", "Replace filters", true),
                ChecklistItem::new("paint", "Touch up paint", false),
            ],
        )
    }

    fn actor() -> Actor {
        Actor::new("u-7", "Ana")
    }

    #[test]
    fn template_numbers_positions_in_order() {
        let t = template();
        let positions: Vec<u32> = t.items().iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!(t.contains(&ItemId::from("paint")));
        assert!(!t.contains(&ItemId::from("tyres")));
    }

    #[test]
    fn resubmission_updates_in_place() {
        let mut responses = ChecklistResponses::default();
        let first = responses.upsert(&ChecklistAnswer::new("belts", false), &actor(), Utc::now());
        assert_eq!(first, Upsert::Inserted);

        let again = responses.upsert(
            &ChecklistAnswer::new("belts", true).with_comment("tensioned"),
            &actor(),
            Utc::now(),
        );
        assert_eq!(again, Upsert::Updated);
        assert_eq!(responses.len(), 1);

        let stored = responses.get(&ItemId::from("belts")).unwrap();
        assert!(stored.completed);
        assert_eq!(stored.comment.as_deref(), Some("tensioned"));
    }

    #[test]
    fn completed_count_only_counts_template_items() {
        let t = template();
        let mut responses = ChecklistResponses::default();
        let now = Utc::now();
        responses.upsert(&ChecklistAnswer::new("belts", true), &actor(), now);
        responses.upsert(&ChecklistAnswer::new("filters", false), &actor(), now);
        responses.upsert(&ChecklistAnswer::new("retired-item", true), &actor(), now);

        assert_eq!(responses.completed_count(&t), 1);
        assert_eq!(responses.completed_total(), 2);
        assert!(responses.any_completed());
    }

    #[test]
    fn unchecking_an_item_lowers_the_count() {
        let t = template();
        let mut responses = ChecklistResponses::default();
        responses.upsert(&ChecklistAnswer::new("belts", true), &actor(), Utc::now());
        responses.upsert(&ChecklistAnswer::new("belts", false), &actor(), Utc::now());

        assert_eq!(responses.completed_count(&t), 0);
        assert!(!responses.any_completed());
    }
}
