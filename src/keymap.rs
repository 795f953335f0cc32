//! External key ↔ internal id translation.
//!
//! Internal ids are dense and assigned in insertion order, so the forward
//! direction (internal → external) is a plain `Vec` offset. External keys
//! may repeat; the reverse direction keeps every internal id ever assigned
//! to a key, in assignment order, and is maintained incrementally.

use std::collections::HashMap;

use crate::error::{NotFoundError, Result};
use crate::types::{ExternalKey, InternalId};

/// Append-only mapping between external keys and internal ids.
#[derive(Clone, Debug, Default)]
pub struct KeyMap {
    /// Internal id → external key. Index is the internal id.
    internal_to_external: Vec<ExternalKey>,

    /// External key → every internal id assigned to it.
    external_to_internal: HashMap<ExternalKey, Vec<InternalId>>,
}

impl KeyMap {
    /// Creates an empty key map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a key map from the dense key array (index = internal id).
    pub fn from_keys(keys: Vec<ExternalKey>) -> Self {
        let mut external_to_internal: HashMap<ExternalKey, Vec<InternalId>> = HashMap::new();
        for (internal_id, &key) in keys.iter().enumerate() {
            external_to_internal.entry(key).or_default().push(internal_id);
        }
        Self {
            internal_to_external: keys,
            external_to_internal,
        }
    }

    /// Records a new entry for `key` and returns its internal id.
    ///
    /// The id is always the current size of the map.
    pub fn assign(&mut self, key: ExternalKey) -> InternalId {
        let internal_id = self.internal_to_external.len();
        self.internal_to_external.push(key);
        self.external_to_internal
            .entry(key)
            .or_default()
            .push(internal_id);
        internal_id
    }

    /// Translates an internal id back to its external key.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::InternalId` if `id` was never assigned.
    #[inline]
    pub fn internal_to_external(&self, id: InternalId) -> Result<ExternalKey> {
        self.internal_to_external
            .get(id)
            .copied()
            .ok_or_else(|| NotFoundError::internal_id(id).into())
    }

    /// Returns every internal id assigned to `key`, in assignment order.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::ExternalKey` if `key` was never assigned.
    pub fn internal_ids_for(&self, key: ExternalKey) -> Result<&[InternalId]> {
        self.external_to_internal
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| NotFoundError::external_key(key).into())
    }

    /// Returns the first internal id assigned to `key`.
    ///
    /// This is the id `query_by_id` reconstructs when a key was inserted
    /// more than once.
    pub fn first_internal_id(&self, key: ExternalKey) -> Result<InternalId> {
        let ids = self.internal_ids_for(key)?;
        ids.first()
            .copied()
            .ok_or_else(|| NotFoundError::external_key(key).into())
    }

    /// Returns true if `key` has at least one internal id.
    pub fn contains(&self, key: ExternalKey) -> bool {
        self.external_to_internal.contains_key(&key)
    }

    /// Number of entries (equals the next internal id).
    #[inline]
    pub fn len(&self) -> usize {
        self.internal_to_external.len()
    }

    /// Returns true if nothing has been assigned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.internal_to_external.is_empty()
    }

    /// Dense key array, index = internal id.
    #[inline]
    pub fn keys(&self) -> &[ExternalKey] {
        &self.internal_to_external
    }

    /// Drops every entry with an internal id `>= len`.
    ///
    /// Only used to undo a batch whose insertion into the index core
    /// failed, so that `add` stays all-or-nothing.
    pub(crate) fn truncate(&mut self, len: usize) {
        while self.internal_to_external.len() > len {
            let Some(key) = self.internal_to_external.pop() else {
                break;
            };
            if let Some(ids) = self.external_to_internal.get_mut(&key) {
                ids.pop();
                if ids.is_empty() {
                    self.external_to_internal.remove(&key);
                }
            }
        }
    }
}
