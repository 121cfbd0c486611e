use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wardrobe_types::Entity;

use crate::error::SourceResult;

/// Field-equality filter passed through to [`EntitySource::fetch_all`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub equals: BTreeMap<String, Value>,
}

impl Filter {
    /// Match entities whose `field` serializes to `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Evaluate the filter against the serialized form of `entity`.
    pub fn matches<E: Serialize>(&self, entity: &E) -> bool {
        if self.equals.is_empty() {
            return true;
        }
        let Ok(Value::Object(fields)) = serde_json::to_value(entity) else {
            return false;
        };
        self.equals
            .iter()
            .all(|(field, expected)| fields.get(field) == Some(expected))
    }
}

/// Network collaborator for one entity type.
///
/// Implementations live behind whatever wire protocol the data source
/// speaks. Every method reports failures through the closed
/// [`SourceError`](crate::error::SourceError) taxonomy.
#[async_trait]
pub trait EntitySource<E: Entity>: Send + Sync {
    async fn fetch_all(&self, filter: Option<&Filter>) -> SourceResult<Vec<E>>;

    async fn fetch_by_ids(&self, ids: &[String]) -> SourceResult<Vec<E>>;

    /// Persist a draft and return the stored entity with its real id.
    async fn create(&self, draft: E::Draft) -> SourceResult<E>;

    async fn delete(&self, id: &str) -> SourceResult<()>;

    /// Total row count, for sources that report one.
    async fn count(&self) -> SourceResult<Option<u64>> {
        Ok(None)
    }
}
