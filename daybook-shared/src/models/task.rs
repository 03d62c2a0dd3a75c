//! Per-year task lists
//!
//! Tasks have no server-side schema: each year file holds whatever JSON
//! object the client last saved.

use serde_json::{Map, Value};

use crate::store::{FileStore, StoreError, StoreResult, YearFile};

/// The task mapping for one user and one year
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskList(pub Map<String, Value>);

impl TaskList {
    /// Accepts any JSON object; anything else is invalid
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidData(format!(
                "Tasks must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Loads the tasks for `year`, `{}` when none were saved
    pub async fn load(store: &FileStore, user_id: &str, year: i32) -> StoreResult<Self> {
        let path = store.year_path(user_id, year, YearFile::Tasks)?;
        let value: Value = store.read_json_or(&path, Value::Object(Map::new())).await?;
        Self::from_value(value)
    }

    /// Overwrites the tasks for `year`
    pub async fn save(&self, store: &FileStore, user_id: &str, year: i32) -> StoreResult<()> {
        let path = store.year_path(user_id, year, YearFile::Tasks)?;
        store.write_json(&path, &self.0).await
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(TaskList::from_value(json!({"2025-01-01": ["call mum"]})).is_ok());

        let err = TaskList::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
        assert!(TaskList::from_value(json!(null)).is_err());
    }

    #[tokio::test]
    async fn test_load_missing_is_empty_and_save_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("data"), dir.path().join("uploads"))
            .await
            .unwrap();

        let empty = TaskList::load(&store, "user_1", 2025).await.unwrap();
        assert_eq!(empty, TaskList::default());

        let tasks = TaskList::from_value(json!({"week-1": [{"text": "buy milk", "done": false}]}))
            .unwrap();
        tasks.save(&store, "user_1", 2025).await.unwrap();

        let loaded = TaskList::load(&store, "user_1", 2025).await.unwrap();
        assert_eq!(loaded, tasks);
        assert_eq!(TaskList::load(&store, "user_1", 2026).await.unwrap(), TaskList::default());
    }
}
