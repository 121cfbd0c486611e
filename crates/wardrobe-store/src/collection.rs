use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;
use wardrobe_types::{normalize_key, Entity, LooseKeyed};

/// Ordered entity list with an id index derived from it.
///
/// Both sides hold the same `Arc`, so for every listed entity
/// `index[e.id]` is `e` by identity, and every indexed id is listed.
/// All mutators keep the two in step.
#[derive(Clone, Debug)]
pub struct EntityCollection<E> {
    entities: Vec<Arc<E>>,
    index: HashMap<String, Arc<E>>,
}

impl<E> Default for EntityCollection<E> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<E: Entity> EntityCollection<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a fetched list. Later duplicates of an id are dropped.
    pub fn from_entities(entities: Vec<Arc<E>>) -> Self {
        let mut collection = Self::new();
        collection.replace(entities);
        collection
    }

    /// Replace the list and rebuild the index.
    pub fn replace(&mut self, entities: Vec<Arc<E>>) {
        let mut index = HashMap::with_capacity(entities.len());
        let mut list = Vec::with_capacity(entities.len());
        for entity in entities {
            if index.contains_key(entity.id()) {
                warn!(collection = E::COLLECTION, id = entity.id(), "duplicate id in fetched list dropped");
                continue;
            }
            index.insert(entity.id().to_string(), Arc::clone(&entity));
            list.push(entity);
        }
        self.entities = list;
        self.index = index;
    }

    /// Append, or replace in place if the id is already present.
    /// Returns `true` if the entity was new.
    pub fn upsert(&mut self, entity: Arc<E>) -> bool {
        match self.position(entity.id()) {
            Some(pos) => {
                self.index.insert(entity.id().to_string(), Arc::clone(&entity));
                self.entities[pos] = entity;
                false
            }
            None => {
                self.index.insert(entity.id().to_string(), Arc::clone(&entity));
                self.entities.push(entity);
                true
            }
        }
    }

    /// Insert at `position` (clamped to the list length), or replace in
    /// place if the id is already present.
    pub fn insert_at(&mut self, position: usize, entity: Arc<E>) {
        if self.contains(entity.id()) {
            self.upsert(entity);
            return;
        }
        let position = position.min(self.entities.len());
        self.index.insert(entity.id().to_string(), Arc::clone(&entity));
        self.entities.insert(position, entity);
    }

    /// Apply `patch` to a copy of the entity. No-op if `id` is absent.
    ///
    /// A patch that changes the id is rejected, since it would break the
    /// index.
    pub fn update(&mut self, id: &str, patch: impl FnOnce(&mut E)) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let mut patched = E::clone(&self.entities[pos]);
        patch(&mut patched);
        if patched.id() != id {
            warn!(collection = E::COLLECTION, id, new_id = patched.id(), "patch changing entity id rejected");
            return false;
        }
        let patched = Arc::new(patched);
        self.index.insert(id.to_string(), Arc::clone(&patched));
        self.entities[pos] = patched;
        true
    }

    /// Remove by id, returning the former position and the entity.
    pub fn remove(&mut self, id: &str) -> Option<(usize, Arc<E>)> {
        if !self.index.contains_key(id) {
            return None;
        }
        let pos = self.position(id)?;
        self.index.remove(id);
        Some((pos, self.entities.remove(pos)))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<E>> {
        self.index.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Entities for `ids` in the requested order; unknown ids are skipped.
    pub fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Arc<E>> {
        ids.iter()
            .filter_map(|id| self.index.get(id.as_ref()).cloned())
            .collect()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == id)
    }

    pub fn entities(&self) -> &[Arc<E>] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<E>> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check the list/index invariant.
    pub fn is_consistent(&self) -> bool {
        self.entities.len() == self.index.len()
            && self.entities.iter().all(|e| {
                self.index
                    .get(e.id())
                    .is_some_and(|indexed| Arc::ptr_eq(indexed, e))
            })
    }
}

impl<E: LooseKeyed> EntityCollection<E> {
    /// Resolve a loose reference: internal id first, then the external
    /// identifier (case-insensitive), then the display name
    /// (case-insensitive).
    pub fn resolve(&self, key: &str) -> Option<&Arc<E>> {
        if let Some(entity) = self.index.get(key) {
            return Some(entity);
        }
        let wanted = normalize_key(key);
        if wanted.is_empty() {
            return None;
        }
        self.entities
            .iter()
            .find(|e| e.external_key().is_some_and(|k| normalize_key(k) == wanted))
            .or_else(|| {
                self.entities
                    .iter()
                    .find(|e| e.display_name().is_some_and(|n| normalize_key(n) == wanted))
            })
    }
}
