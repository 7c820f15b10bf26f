//! Reconciliation against a scripted live world.
//!
//! Each test builds an `ActorFactory` over `MockWorld`/`MockNode`, mutates
//! the live world directly, and checks the mirror table after
//! `reconcile()`.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use simbridge_core::{ActorId, ActorKind, Node, SensorType, Transform, Translator, Vector3, World};
use simbridge_engine::{ActorFactory, BridgeConfig, Shutdown};
use simbridge_test_utils::{MockNode, MockWorld, RecordingTranslator};

// ── Helpers ─────────────────────────────────────────────────────

struct Rig {
    world: Arc<MockWorld>,
    translator: Arc<RecordingTranslator>,
    factory: ActorFactory,
}

fn rig(config: BridgeConfig) -> Rig {
    let world = Arc::new(MockWorld::new());
    let translator = Arc::new(RecordingTranslator::new());
    let factory = ActorFactory::new(
        &config,
        Arc::clone(&world) as Arc<dyn World>,
        Arc::new(MockNode::new()) as Arc<dyn Node>,
        Arc::clone(&translator) as Arc<dyn Translator>,
        None,
        Shutdown::new(),
    );
    Rig {
        world,
        translator,
        factory,
    }
}

fn mirrored(f: &ActorFactory) -> BTreeSet<ActorId> {
    f.mirrored_ids().into_iter().collect()
}

fn live(w: &MockWorld) -> BTreeSet<ActorId> {
    w.list_live_object_ids().into_iter().collect()
}

// ── Tests ───────────────────────────────────────────────────────

#[test]
fn appeared_objects_are_mirrored_with_resolved_kinds() {
    let r = rig(BridgeConfig::default());
    let car = r.world.add_object("vehicle.audi.tt", &[("role_name", "npc")], None);
    let hero = r
        .world
        .add_object("vehicle.tesla.model3", &[("role_name", "hero")], None);
    let cam = r.world.add_object("sensor.camera.rgb", &[], Some(hero));
    r.factory.reconcile();

    assert_eq!(mirrored(&r.factory), live(&r.world));
    let kind = |id| r.factory.with_object(id, |o| o.kind()).unwrap();
    assert!(matches!(kind(car), ActorKind::Vehicle(_)));
    assert!(matches!(kind(hero), ActorKind::EgoVehicle(_)));
    assert_eq!(kind(cam), ActorKind::Sensor(SensorType::RgbCamera));
    assert_eq!(r.factory.ego_ids(), BTreeSet::from([hero]));
}

#[test]
fn disappeared_objects_are_removed_without_releasing_live_handles() {
    let r = rig(BridgeConfig::default());
    let a = r.world.add_object("static.prop.box", &[], None);
    let b = r.world.add_object("static.prop.box", &[], None);
    r.factory.reconcile();

    r.world.remove_object(a);
    r.factory.reconcile();
    assert_eq!(mirrored(&r.factory), BTreeSet::from([b]));
    assert!(r.world.destroyed().is_empty());
}

#[test]
fn live_child_survives_its_parent_disappearing() {
    let r = rig(BridgeConfig::default());
    let car = r.world.add_object("vehicle.audi.tt", &[("role_name", "car")], None);
    let cam = r.world.add_object("sensor.camera.rgb", &[], Some(car));
    r.factory.reconcile();

    // Only the parent leaves the world.
    r.world.destroy(car).unwrap();
    r.factory.reconcile();
    assert_eq!(mirrored(&r.factory), BTreeSet::from([cam]));
    let info = r.factory.with_object(cam, |o| o.info().clone()).unwrap();
    assert_eq!(info.parent, None);
    assert_eq!(info.prefix, cam.to_string());
    assert!(r.world.is_listening(cam));

    r.factory.reconcile();
    assert_eq!(mirrored(&r.factory), live(&r.world));
}

#[test]
fn sensors_can_be_opted_out() {
    let r = rig(BridgeConfig {
        register_all_sensors: false,
        ..BridgeConfig::default()
    });
    let car = r.world.add_object("vehicle.audi.tt", &[], None);
    r.world.add_object("sensor.lidar.ray_cast", &[], Some(car));
    r.factory.reconcile();
    assert_eq!(mirrored(&r.factory), BTreeSet::from([car]));
}

#[test]
fn children_carry_parent_prefix_and_relative_pose() {
    let r = rig(BridgeConfig::default());
    let hero = r
        .world
        .add_object("vehicle.tesla.model3", &[("role_name", "hero")], None);
    let cam = r
        .world
        .add_object("sensor.camera.rgb", &[("role_name", "front")], Some(hero));
    r.world.place(
        hero,
        Transform {
            location: Vector3::new(10.0, 0.0, 0.0),
            ..Transform::default()
        },
    );
    r.world.place(
        cam,
        Transform {
            location: Vector3::new(12.0, 0.0, 1.5),
            ..Transform::default()
        },
    );
    r.factory.reconcile();

    let info = r.factory.with_object(cam, |o| o.info().clone()).unwrap();
    assert_eq!(info.parent, Some(hero));
    assert_eq!(info.prefix, "hero/front");
    assert_eq!(info.topic_prefix(), "/carla/hero/front");
    let pose = info.relative_pose.unwrap();
    assert!((pose.location.x - 2.0).abs() < 1e-9);
    assert!((pose.location.z - 1.5).abs() < 1e-9);
}

#[test]
fn update_failure_does_not_stop_the_pass() {
    let r = rig(BridgeConfig::default());
    let a = r.world.add_object("static.prop.box", &[], None);
    let b = r.world.add_object("static.prop.box", &[], None);
    let c = r.world.add_object("static.prop.box", &[], None);
    r.factory.reconcile();
    r.translator.fail_updates_for(b);

    r.factory.update_actor_states(simbridge_core::FrameId(7), 0.35);
    assert_eq!(
        r.translator.updated_at(simbridge_core::FrameId(7)),
        vec![a, b, c]
    );
}

#[test]
fn participant_age_grows_until_live_object_vanishes() {
    let r = rig(BridgeConfig::default());
    let walker = r.world.add_object("walker.pedestrian.0001", &[], None);
    r.factory.reconcile();
    for frame in 1..=3 {
        r.factory
            .update_actor_states(simbridge_core::FrameId(frame), frame as f64 * 0.05);
    }
    assert_eq!(
        r.factory.with_object(walker, |o| o.classification_age()),
        Some(Some(3))
    );

    // Gone from the world but not yet reconciled: the update fails and
    // the age stays put.
    r.world.remove_object(walker);
    r.factory.update_actor_states(simbridge_core::FrameId(4), 0.2);
    assert_eq!(
        r.factory.with_object(walker, |o| o.classification_age()),
        Some(Some(3))
    );
    r.factory.reconcile();
    assert!(r.factory.mirrored_ids().is_empty());
}

// ── Properties ──────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Op {
    Add(&'static str),
    AddChild(usize, &'static str),
    Remove(usize),
    DestroyOnly(usize),
    Reconcile,
}

fn op() -> impl Strategy<Value = Op> {
    let types = prop::sample::select(vec![
        "vehicle.audi.tt",
        "walker.pedestrian.0001",
        "static.prop.box",
        "sensor.other.collision",
        "traffic.traffic_light",
    ]);
    prop_oneof![
        types.clone().prop_map(Op::Add),
        (any::<usize>(), types).prop_map(|(i, t)| Op::AddChild(i, t)),
        any::<usize>().prop_map(Op::Remove),
        any::<usize>().prop_map(Op::DestroyOnly),
        Just(Op::Reconcile),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn table_matches_live_world_after_reconcile(ops in prop::collection::vec(op(), 1..40)) {
        let r = rig(BridgeConfig::default());
        for op in ops {
            let ids = r.world.list_live_object_ids();
            match op {
                Op::Add(t) => {
                    r.world.add_object(t, &[], None);
                }
                Op::AddChild(i, t) if !ids.is_empty() => {
                    r.world.add_object(t, &[], Some(ids[i % ids.len()]));
                }
                Op::Remove(i) if !ids.is_empty() => r.world.remove_object(ids[i % ids.len()]),
                Op::DestroyOnly(i) if !ids.is_empty() => {
                    let _ = r.world.destroy(ids[i % ids.len()]);
                }
                Op::Reconcile => r.factory.reconcile(),
                _ => {}
            }
        }
        r.factory.reconcile();
        prop_assert_eq!(mirrored(&r.factory), live(&r.world));

        // Every mirrored parent link points at a mirrored object.
        for id in r.factory.mirrored_ids() {
            let parent = r.factory.with_object(id, |o| o.parent()).unwrap();
            if let Some(p) = parent {
                prop_assert!(r.factory.with_object(p, |_| ()).is_some());
            }
        }
    }
}
