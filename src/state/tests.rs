use super::*;
use crate::event::{BusEvent, EventKind, TypedEvent};
use crate::topic::Topic;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn typed(topic: &str, payload: serde_json::Value) -> TypedEvent {
    BusEvent::new(Topic::parse(topic).unwrap(), serde_json::to_vec(&payload).unwrap())
        .decode()
        .unwrap()
}

fn placed(id: &str, x: i32, y: i32) -> TypedEvent {
    typed(
        &format!("simulation.42.agent.{id}.placed"),
        json!({"id": id, "name": id.to_uppercase(), "location": [x, y]}),
    )
}

fn moved(id: &str, x: i32, y: i32, energy: f64) -> TypedEvent {
    typed(
        &format!("simulation.42.agent.{id}.moved"),
        json!({"id": id, "new_location": [x, y], "new_energy_level": energy}),
    )
}

fn agents() -> Reconciler {
    Reconciler::builder("agents")
        .on(EventKind::Placed, Policy::create(vec![MergeStrategy::replace_all()]))
        .on(
            EventKind::Moved,
            Policy::update(vec![MergeStrategy::replace(["x_coord", "y_coord", "energy_level"])]),
        )
        .on(EventKind::Dead, Policy::update(vec![MergeStrategy::set_flag("dead", true)]))
        .on(
            EventKind::Communication,
            Policy::create(vec![MergeStrategy::append_bounded("messages", 3, "id")]),
        )
        .build()
}

#[test]
fn test_create_then_update() {
    let view = agents();

    assert_eq!(view.apply(&placed("a1", 1, 1)), Outcome::Created);
    assert_eq!(view.apply(&moved("a1", 2, 1, 50.0)), Outcome::Updated);

    let snap = view.get("a1").unwrap();
    assert_eq!(snap.id(), "a1");
    assert_eq!(snap.position(), Some(crate::model::GridPosition::new(2, 1)));
    assert_eq!(snap.field_f64("energy_level"), Some(50.0));
    // Fields not named by the moved policy survive
    assert_eq!(snap.field_str("name"), Some("A1"));
}

#[test]
fn test_update_for_unknown_entity_is_noop() {
    let view = agents();

    assert_eq!(view.apply(&moved("ghost", 1, 1, 1.0)), Outcome::UnknownEntity);
    assert!(view.get("ghost").is_none());
    assert!(view.is_empty());
}

#[test]
fn test_duplicate_moves_do_not_bump_revision() {
    let view = agents();
    view.apply(&placed("a1", 0, 0));
    view.apply(&moved("a1", 3, 5, 10.0));
    let revision = view.get("a1").unwrap().revision;

    for _ in 0..5 {
        assert_eq!(view.apply(&moved("a1", 3, 5, 10.0)), Outcome::Duplicate);
    }
    assert_eq!(view.get("a1").unwrap().revision, revision);
}

#[test]
fn test_last_moved_in_delivery_order_wins() {
    let view = agents();
    view.apply(&placed("a1", 0, 0));
    let sequence = [(1, 0), (1, 0), (2, 0), (2, 0), (2, 1), (2, 1), (2, 1)];
    for (x, y) in sequence {
        view.apply(&moved("a1", x, y, 9.0));
    }
    assert_eq!(
        view.get("a1").unwrap().position(),
        Some(crate::model::GridPosition::new(2, 1))
    );
}

#[test]
fn test_dead_flips_flag_without_deleting() {
    let view = agents();
    view.apply(&placed("a1", 0, 0));
    let dead = typed("simulation.42.agent.a1.dead", json!({"id": "a1", "death_tick": 9}));

    assert_eq!(view.apply(&dead), Outcome::Updated);
    assert_eq!(view.apply(&dead), Outcome::Duplicate);
    assert_eq!(view.len(), 1);
    assert!(view.get("a1").unwrap().flag("dead"));
}

#[test]
fn test_append_bounded_dedups_and_caps() {
    let view = agents();
    let message = |id: &str| {
        typed(
            "simulation.42.agent.a1.communication",
            json!({"id": id, "content": format!("hello {id}"), "agent_id": "a2"}),
        )
    };

    assert_eq!(view.apply(&message("m1")), Outcome::Created);
    assert_eq!(view.apply(&message("m1")), Outcome::Duplicate);
    view.apply(&message("m2"));
    view.apply(&message("m3"));
    view.apply(&message("m4"));

    let snap = view.get("a1").unwrap();
    let keys: Vec<&str> = snap.log("messages").unwrap().keys().collect();
    assert_eq!(keys, vec!["m4", "m3", "m2"]);
}

#[test]
fn test_unhandled_kind_is_ignored() {
    let view = agents();
    let tick = typed("simulation.42.tick", json!({"tick": 3}));
    assert_eq!(view.apply(&tick), Outcome::Ignored);
}

#[test]
fn test_seed_then_events() {
    let view = agents();
    let mut fields = serde_json::Map::new();
    fields.insert("x_coord".into(), json!(7));
    fields.insert("y_coord".into(), json!(7));
    fields.insert("name".into(), json!("Seeded"));

    assert_eq!(view.seed("a9", fields.clone()), Outcome::Created);
    assert_eq!(view.seed("a9", fields), Outcome::Duplicate);
    assert_eq!(view.apply(&moved("a9", 8, 7, 1.0)), Outcome::Updated);
    assert_eq!(view.get("a9").unwrap().field_str("name"), Some("Seeded"));
}

#[test]
fn test_changes_are_broadcast() {
    let view = agents();
    let mut rx = view.subscribe();

    view.apply(&placed("a1", 0, 0));
    view.apply(&moved("a1", 0, 0, 0.0));
    view.apply(&moved("a1", 0, 0, 0.0));

    let first = rx.try_recv().unwrap();
    assert_eq!(first.entity_id, "a1");
    assert_eq!(first.outcome, Outcome::Created);
    assert_eq!(rx.try_recv().unwrap().outcome, Outcome::Updated);
    // Duplicate produced no notification
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_independent_instances_share_nothing() {
    let roster = agents();
    let other = agents();

    roster.apply(&placed("a1", 0, 0));
    assert!(other.get("a1").is_none());

    other.apply(&placed("a1", 4, 4));
    assert_eq!(
        roster.get("a1").unwrap().position(),
        Some(crate::model::GridPosition::new(0, 0))
    );
}

#[test]
fn test_custom_extractor() {
    let view = Reconciler::builder("clock")
        .id_extractor(|e: &TypedEvent| e.topic.simulation_id().map(str::to_string))
        .on(EventKind::Tick, Policy::create(vec![MergeStrategy::replace(["tick"])]))
        .build();

    view.apply(&typed("simulation.42.tick", json!({"tick": 11})));
    assert_eq!(view.get("42").unwrap().field_u64("tick"), Some(11));
}

#[test]
fn test_concurrent_apply() {
    let view = Arc::new(agents());
    let mut handles = vec![];

    for i in 0..10 {
        let view = Arc::clone(&view);
        handles.push(thread::spawn(move || {
            view.apply(&placed(&format!("a{i}"), i, i));
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(view.len(), 10);
}

#[test]
fn test_seeded_flags_and_logs_are_broadcast() {
    let view = agents();
    view.seed("a1", serde_json::Map::new());
    let mut rx = view.subscribe();

    assert_eq!(view.seed_flag("a1", "dead", true), Outcome::Updated);
    assert_eq!(view.seed_flag("a1", "dead", true), Outcome::Duplicate);
    assert_eq!(view.seed_flag("ghost", "dead", true), Outcome::UnknownEntity);
    let flip = rx.try_recv().unwrap();
    assert_eq!(flip.entity_id, "a1");
    assert_eq!(flip.outcome, Outcome::Updated);
    assert!(rx.try_recv().is_err());

    let history = vec![("m2".to_string(), json!({"id": "m2"})), ("m1".to_string(), json!({"id": "m1"}))];
    assert_eq!(view.seed_log("a1", "messages", 3, history.clone()), Outcome::Updated);
    assert_eq!(view.seed_log("a1", "messages", 3, history), Outcome::Duplicate);
    assert_eq!(view.seed_log("a2", "messages", 3, vec![]), Outcome::Created);

    assert_eq!(rx.try_recv().unwrap().outcome, Outcome::Updated);
    let created = rx.try_recv().unwrap();
    assert_eq!((created.entity_id.as_str(), created.outcome), ("a2", Outcome::Created));
    assert!(rx.try_recv().is_err());
}
