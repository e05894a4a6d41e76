use std::collections::HashMap;

use redlilium_ecs::dom::Dom;
use redlilium_ecs::serialize::{
    DeserializeError, NoEntityMapping, SerializeError, deserialize_entity, serialize_entity,
};
use redlilium_ecs::{
    Component, ComponentRegistry, EntityAllocator, EntityFactory, EntityId, EntityObject,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Test components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Component)]
struct Follow {
    target: EntityId,
    distance: f32,
}

#[derive(Debug, Clone, PartialEq, Component)]
struct Squad {
    members: Vec<EntityId>,
    leader: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Team {
    Red,
    Blue,
}

#[derive(Debug, Clone, PartialEq, Component)]
struct Membership(Team, u32);

#[derive(Debug, Clone, PartialEq, Component)]
struct Marker;

#[derive(Debug, Clone, PartialEq, Component)]
#[skip_serialization]
struct GpuHandle {
    raw: u64,
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register::<Follow>();
    registry.register::<Squad>();
    registry.register::<Membership>();
    registry.register::<Marker>();
    registry
}

// ---------------------------------------------------------------------------
// Derived component serialization
// ---------------------------------------------------------------------------

#[test]
fn derived_entity_fields_become_references() {
    let mut factory = EntityAllocator::new();
    let a = factory.create_entity_id();
    let b = factory.create_entity_id();
    let stranger = factory.create_entity_id();

    let entity = EntityObject::new(a, "A")
        .with(Follow {
            target: b,
            distance: 2.5,
        })
        .with(Squad {
            members: vec![a, stranger],
            leader: Some(b),
        });

    let mapper: HashMap<EntityId, String> = [
        (a, "Entity_[1]".to_string()),
        (b, "Entity_[2]".to_string()),
    ]
    .into();
    let dom = serialize_entity(&entity, "Entity_[1]", &mapper).unwrap();

    let expected: Dom = serde_json::from_str(
        r#"{
            "Id": "Entity_[1]",
            "Name": "A",
            "Components": {
                "Follow": { "target": "Entity_[2]", "distance": 2.5 },
                "Squad": { "members": ["Entity_[1]", ""], "leader": "Entity_[2]" }
            }
        }"#,
    )
    .unwrap();
    assert_eq!(dom, expected);
}

#[test]
fn entity_round_trips_with_fresh_ids() {
    let mut factory = EntityAllocator::new();
    let a = factory.create_entity_id();
    let b = factory.create_entity_id();
    let entity = EntityObject::new(a, "A")
        .with(Follow {
            target: b,
            distance: 1.0,
        })
        .with(Membership(Team::Blue, 7))
        .with(Marker);

    let mapper: HashMap<EntityId, String> =
        [(a, "Entity_[1]".into()), (b, "Entity_[2]".into())].into();
    let dom = serialize_entity(&entity, "Entity_[1]", &mapper).unwrap();

    // Deserialize into a different id space.
    let new_a = factory.create_entity_id();
    let new_b = factory.create_entity_id();
    let resolver: HashMap<String, EntityId> =
        [("Entity_[1]".into(), new_a), ("Entity_[2]".into(), new_b)].into();
    let restored = deserialize_entity(&dom, new_a, &registry(), &resolver).unwrap();

    assert_eq!(restored.id(), new_a);
    assert_eq!(restored.name(), "A");
    assert_eq!(
        restored.get::<Follow>(),
        Some(&Follow {
            target: new_b,
            distance: 1.0
        })
    );
    assert_eq!(restored.get::<Membership>(), Some(&Membership(Team::Blue, 7)));
    assert_eq!(restored.get::<Marker>(), Some(&Marker));
    assert_eq!(restored.referenced_entities(), vec![new_b]);
}

#[test]
fn unresolved_reference_is_invalid() {
    let mut factory = EntityAllocator::new();
    let a = factory.create_entity_id();
    let dom: Dom = serde_json::from_str(
        r#"{"Id":"Entity_[1]","Name":"A","Components":{"Follow":{"target":"../Entity_[9]","distance":0.0}}}"#,
    )
    .unwrap();
    let restored = deserialize_entity(&dom, a, &registry(), &NoEntityMapping).unwrap();
    assert_eq!(restored.get::<Follow>().unwrap().target, EntityId::INVALID);
}

#[test]
fn unknown_component_is_reported() {
    let dom: Dom =
        serde_json::from_str(r#"{"Id":"E","Name":"A","Components":{"Mystery":{}}}"#).unwrap();
    let err = deserialize_entity(&dom, EntityId::INVALID, &registry(), &NoEntityMapping)
        .unwrap_err();
    assert_eq!(
        err,
        DeserializeError::UnknownComponent {
            type_name: "Mystery".into()
        }
    );
}

#[test]
fn skipped_component_cannot_be_serialized() {
    let entity = EntityObject::new(EntityId::INVALID, "gpu").with(GpuHandle { raw: 1 });
    let err = serialize_entity(&entity, "Entity_[1]", &NoEntityMapping).unwrap_err();
    assert_eq!(
        err,
        SerializeError::NotSerializable {
            component: "GpuHandle"
        }
    );
}

#[test]
fn registry_lists_names() {
    let registry = registry();
    assert_eq!(
        registry.names(),
        vec!["Follow", "Marker", "Membership", "Squad"]
    );
    assert!(registry.contains("Squad"));
    assert!(!registry.contains("GpuHandle"));
}
