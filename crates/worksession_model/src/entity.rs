//! Entity representation.

use crate::error::{ModelError, ModelResult};
use crate::id::{EntityId, EntityKey};
use crate::row::Row;
use crate::value::Value;
use std::collections::BTreeMap;

/// Field name to value mapping.
pub type FieldMap = BTreeMap<String, Value>;

/// An entity as held by the change tracker.
///
/// An entity carries two kinds of fields:
/// - **persistable fields**, which are written to the store on commit
/// - **derived fields**, computed values materialized for display only
///
/// While the merged-data flag is set (the hook window of a save cycle),
/// derived fields are invisible to [`Entity::get`] and
/// [`Entity::visible_fields`]. Derived fields are never part of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    key: EntityKey,
    fields: FieldMap,
    derived: FieldMap,
    merged_data_excluded: bool,
}

impl Entity {
    /// Creates an empty entity.
    pub fn new(type_name: impl Into<String>, id: EntityId) -> Self {
        Self::from_key(EntityKey::new(type_name, id))
    }

    /// Creates an empty entity for an existing key.
    #[must_use]
    pub fn from_key(key: EntityKey) -> Self {
        Self {
            key,
            fields: FieldMap::new(),
            derived: FieldMap::new(),
            merged_data_excluded: false,
        }
    }

    /// Creates an entity with the given persistable fields.
    #[must_use]
    pub fn with_fields(key: EntityKey, fields: FieldMap) -> Self {
        Self {
            fields,
            ..Self::from_key(key)
        }
    }

    /// Builds an entity from a raw row.
    ///
    /// The identity is read from `id_column`, which must hold a UUID either
    /// as text or as 16 raw bytes. Every other column becomes a persistable
    /// field.
    pub fn from_row(type_name: &str, row: &Row, id_column: &str) -> ModelResult<Self> {
        let id = match row.get(id_column) {
            None => return Err(ModelError::missing_column(id_column)),
            Some(Value::Text(text)) => {
                text.parse::<EntityId>()
                    .map_err(|_| ModelError::InvalidIdentity {
                        column: id_column.to_string(),
                        value: text.clone(),
                    })?
            }
            Some(Value::Bytes(bytes)) => {
                let raw: [u8; 16] =
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| ModelError::InvalidIdentity {
                            column: id_column.to_string(),
                            value: format!("<{} bytes>", bytes.len()),
                        })?;
                EntityId::from_bytes(raw)
            }
            Some(other) => {
                return Err(ModelError::type_mismatch(id_column, "text", other.kind()));
            }
        };

        let fields = row
            .columns()
            .iter()
            .filter(|(name, _)| name != id_column)
            .cloned()
            .collect();
        Ok(Self::with_fields(EntityKey::new(type_name, id), fields))
    }

    /// Returns the identity key.
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.key.id()
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.key.type_name()
    }

    /// Reads a field.
    ///
    /// Persistable fields take precedence. Derived fields are only visible
    /// outside the merged-data window.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).or_else(|| {
            if self.merged_data_excluded {
                None
            } else {
                self.derived.get(name)
            }
        })
    }

    /// Sets a persistable field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style variant of [`Entity::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Removes a persistable field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Sets a derived (display-only) field.
    pub fn set_derived(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.derived.insert(name.into(), value.into());
    }

    /// Returns the persistable fields.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Replaces the persistable fields.
    pub fn replace_fields(&mut self, fields: FieldMap) {
        self.fields = fields;
    }

    /// Returns every field a reader may currently see.
    #[must_use]
    pub fn visible_fields(&self) -> FieldMap {
        let mut visible = self.fields.clone();
        if !self.merged_data_excluded {
            for (name, value) in &self.derived {
                visible
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        visible
    }

    /// Returns true while derived fields are excluded from reads.
    #[must_use]
    pub const fn is_merged_data_excluded(&self) -> bool {
        self.merged_data_excluded
    }

    /// Sets or clears the merged-data flag.
    pub fn set_merged_data_excluded(&mut self, excluded: bool) {
        self.merged_data_excluded = excluded;
    }
}
