//! In-memory todo table backing the reference domain.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Where an attachment can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub labels: Option<Vec<String>>,
    pub completed: bool,
    /// Always serialized; `null` until completed.
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attachment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<Location>,
}

impl Todo {
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .as_ref()
            .is_some_and(|labels| labels.iter().any(|l| l == label))
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: HashMap<String, Todo>,
    /// Insertion order, used for listing and pagination.
    order: Vec<String>,
}

/// Todos keyed by id, listed in insertion order.
#[derive(Debug, Default)]
pub struct TodoStore {
    table: RwLock<Table>,
}

impl TodoStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, todo: Todo) {
        let mut table = self.table.write();
        if !table.rows.contains_key(&todo.id) {
            table.order.push(todo.id.clone());
        }
        table.rows.insert(todo.id.clone(), todo);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Todo> {
        self.table.read().rows.get(id).cloned()
    }

    /// Applies `change` to the todo with `id` and returns the updated copy.
    pub fn update<F>(&self, id: &str, change: F) -> Option<Todo>
    where
        F: FnOnce(&mut Todo),
    {
        let mut table = self.table.write();
        let todo = table.rows.get_mut(id)?;
        change(todo);
        Some(todo.clone())
    }

    pub fn remove(&self, id: &str) -> Option<Todo> {
        let mut table = self.table.write();
        let removed = table.rows.remove(id)?;
        table.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Snapshot of every todo in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Todo> {
        let table = self.table.read();
        table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn todo(id: &str, title: &str) -> Todo {
        Todo {
            id: id.into(),
            title: title.into(),
            description: None,
            due_date: None,
            labels: None,
            completed: false,
            completed_at: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
            attachment_id: None,
            location: None,
        }
    }

    #[test]
    fn list_preserves_insertion_order() {
        let store = TodoStore::new();
        store.insert(todo("b", "second"));
        store.insert(todo("a", "first"));
        store.insert(todo("c", "third"));
        let ids: Vec<_> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        store.remove("a");
        let ids: Vec<_> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn update_returns_new_copy() {
        let store = TodoStore::new();
        store.insert(todo("a", "old"));
        let updated = store.update("a", |t| t.title = "new".into()).unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(store.get("a").unwrap().title, "new");
        assert!(store.update("missing", |_| {}).is_none());
    }

    #[test]
    fn serializes_null_completed_at_and_omits_absent_optionals() {
        let wire = serde_json::to_value(todo("a", "Buy milk")).unwrap();
        assert_eq!(wire["completedAt"], json!(null));
        assert_eq!(wire["completed"], json!(false));
        assert!(wire.get("description").is_none());
        assert!(wire.get("labels").is_none());
    }

    #[test]
    fn has_label_checks_membership() {
        let mut t = todo("a", "x");
        assert!(!t.has_label("home"));
        t.labels = Some(vec!["home".into()]);
        assert!(t.has_label("home"));
    }
}
