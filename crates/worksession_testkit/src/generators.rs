//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random entities and save scenarios.

use proptest::prelude::*;
use worksession_model::{Entity, EntityId, EntityKey, FieldMap, Value};

/// Strategy for generating entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntityId::from_bytes)
}

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating scalar field values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating persistable field maps.
pub fn field_map_strategy() -> impl Strategy<Value = FieldMap> {
    prop::collection::btree_map(field_name_strategy(), scalar_value_strategy(), 1..6)
}

/// Strategy for generating entities of the given type.
pub fn entity_strategy(type_name: &'static str) -> impl Strategy<Value = Entity> {
    (entity_id_strategy(), field_map_strategy())
        .prop_map(move |(id, fields)| Entity::with_fields(EntityKey::new(type_name, id), fields))
}

/// A randomized save cycle.
///
/// `seeded` entities are persisted and attached; `edited` indexes into them
/// and the caller modifies those before saving. An observer re-touches the
/// `hook_touches` entities (already announced or not) on every
/// notification and adds `hook_adds` new entities on the first one.
#[derive(Debug, Clone)]
pub struct SaveScenario {
    /// Number of seeded entities.
    pub seeded: usize,
    /// Seeded entities the caller edits before saving.
    pub edited: Vec<usize>,
    /// Seeded entities the observer modifies.
    pub hook_touches: Vec<usize>,
    /// Number of entities the observer adds.
    pub hook_adds: usize,
}

/// Strategy for generating save scenarios.
pub fn save_scenario_strategy() -> impl Strategy<Value = SaveScenario> {
    (1usize..8).prop_flat_map(|seeded| {
        (
            Just(seeded),
            prop::collection::vec(0..seeded, 0..seeded + 1),
            prop::collection::vec(0..seeded, 0..seeded + 1),
            0usize..4,
        )
            .prop_map(|(seeded, edited, hook_touches, hook_adds)| SaveScenario {
                seeded,
                edited,
                hook_touches,
                hook_adds,
            })
    })
}
