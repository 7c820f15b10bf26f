//! Spawn and destroy requests: validation, id allocation, queued
//! application, and destroy closures.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use simbridge_core::{
    ActorId, ActorKind, BridgeError, Node, PseudoType, SpawnRequest, Transform, Translator,
    Vector3, World,
};
use simbridge_engine::{ActorFactory, BridgeConfig, Shutdown};
use simbridge_test_utils::{MockNode, MockWorld, RecordingTranslator};

// ── Helpers ─────────────────────────────────────────────────────

fn factory(world: &Arc<MockWorld>, node: &Arc<MockNode>) -> Arc<ActorFactory> {
    factory_with(&BridgeConfig::default(), world, node)
}

fn factory_with(
    config: &BridgeConfig,
    world: &Arc<MockWorld>,
    node: &Arc<MockNode>,
) -> Arc<ActorFactory> {
    Arc::new(ActorFactory::new(
        config,
        Arc::clone(world) as Arc<dyn World>,
        Arc::clone(node) as Arc<dyn Node>,
        Arc::new(RecordingTranslator::new()) as Arc<dyn Translator>,
        None,
        Shutdown::new(),
    ))
}

fn setup() -> (Arc<MockWorld>, Arc<MockNode>, Arc<ActorFactory>) {
    let world = Arc::new(MockWorld::new());
    let node = Arc::new(MockNode::new());
    let f = factory(&world, &node);
    (world, node, f)
}

// ── Background loop ─────────────────────────────────────────────

#[test]
fn background_loop_mirrors_new_objects_until_shutdown() {
    let world = Arc::new(MockWorld::new());
    let shutdown = Shutdown::new();
    let config = BridgeConfig {
        update_interval_ms: 5,
        ..BridgeConfig::default()
    };
    let f = Arc::new(ActorFactory::new(
        &config,
        Arc::clone(&world) as Arc<dyn World>,
        Arc::new(MockNode::new()) as Arc<dyn Node>,
        Arc::new(RecordingTranslator::new()) as Arc<dyn Translator>,
        None,
        shutdown.clone(),
    ));
    f.start().unwrap();
    assert!(matches!(f.start(), Err(BridgeError::AlreadyStarted)));

    let car = world.add_object("vehicle.audi.tt", &[], None);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !f.mirrored_ids().contains(&car) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(f.mirrored_ids(), vec![car]);

    shutdown.trigger();
    assert!(f.join());
}

// ── Spawning ────────────────────────────────────────────────────

#[test]
fn real_spawn_appears_after_next_reconcile() {
    let (world, _, f) = setup();
    let id = f
        .request_spawn(SpawnRequest::new("vehicle.tesla.model3", "hero"))
        .unwrap();
    assert!(world.get_live_object(id).is_some());
    assert!(f.mirrored_ids().is_empty());
    assert_eq!(f.pending_tasks(), 1);

    f.reconcile();
    assert_eq!(f.mirrored_ids(), vec![id]);
    let info = f.with_object(id, |o| o.info().clone()).unwrap();
    assert_eq!(info.name, "hero");
    assert!(matches!(info.kind, ActorKind::EgoVehicle(_)));
}

#[test]
fn spawn_applies_role_name_attributes_and_transform() {
    let (world, _, f) = setup();
    let at = Transform {
        location: Vector3::new(3.0, 4.0, 0.5),
        ..Transform::default()
    };
    let id = f
        .request_spawn(
            SpawnRequest::new("vehicle.audi.tt", "npc")
                .with_attribute("color", "255,0,0")
                .at(at),
        )
        .unwrap();
    let live = world.get_live_object(id).unwrap();
    assert_eq!(live.role_name(), Some("npc"));
    assert_eq!(live.attribute("color"), Some("255,0,0"));
    assert_eq!(live.transform, at);
}

#[test]
fn wildcard_spawn_picks_a_matching_blueprint() {
    let (world, _, f) = setup();
    let id = f
        .request_spawn(SpawnRequest::new("vehicle.*", "npc"))
        .unwrap();
    assert!(world.get_live_object(id).unwrap().type_id.starts_with("vehicle."));

    let err = f
        .request_spawn(SpawnRequest::new("boat.*", "npc"))
        .unwrap_err();
    assert!(matches!(err, BridgeError::NoMatchingBlueprint(_)));
}

#[test]
fn unknown_blueprints_are_rejected() {
    let (world, _, f) = setup();
    let err = f
        .request_spawn(SpawnRequest::new("vehicle.does.not.exist", "x"))
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownBlueprint(_)));
    let err = f
        .request_spawn(SpawnRequest::new("sensor.pseudo.nonsense", "x"))
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownBlueprint(_)));
    assert_eq!(world.live_count(), 0);
    assert_eq!(f.pending_tasks(), 0);
}

#[test]
fn missing_parent_is_rejected_synchronously() {
    let (world, _, f) = setup();
    let ghost = ActorId::new(404);
    let err = f
        .request_spawn(SpawnRequest::new("sensor.camera.rgb", "cam").attached_to(ghost))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ParentNotFound(id) if id == ghost));
    let err = f
        .request_spawn(SpawnRequest::new("sensor.pseudo.tf", "tf").attached_to(ghost))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ParentNotFound(_)));
    assert_eq!(world.live_count(), 0);
    assert_eq!(f.pending_tasks(), 0);
}

#[test]
fn pseudo_ids_start_at_the_configured_base() {
    let (_, _, f) = setup();
    let a = f
        .request_spawn(SpawnRequest::new("sensor.pseudo.tf", "tf"))
        .unwrap();
    let b = f
        .request_spawn(SpawnRequest::new("sensor.pseudo.objects", "objects"))
        .unwrap();
    assert_eq!((a.get(), b.get()), (10_000, 10_001));
    f.reconcile();
    assert_eq!(f.mirrored_ids(), vec![a, b]);
    assert_eq!(
        f.with_object(a, |o| o.kind()),
        Some(ActorKind::Pseudo(PseudoType::Tf))
    );
    assert_eq!(f.with_object(b, |o| o.live()), Some(None));
}

#[test]
fn pseudo_may_attach_to_a_parent_still_in_the_queue() {
    let (_, _, f) = setup();
    let parent = f
        .request_spawn(SpawnRequest::new("vehicle.audi.tt", "car"))
        .unwrap();
    let odom = f
        .request_spawn(SpawnRequest::new("sensor.pseudo.odom", "odometry").attached_to(parent))
        .unwrap();
    f.reconcile();
    let info = f.with_object(odom, |o| o.info().clone()).unwrap();
    assert_eq!(info.parent, Some(parent));
    assert_eq!(info.prefix, "car/odometry");
}

#[test]
fn concurrent_spawns_get_unique_ids() {
    let (_, _, f) = setup();
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let f = Arc::clone(&f);
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        let req = if i % 2 == 0 {
                            SpawnRequest::new("sensor.pseudo.markers", format!("m{t}_{i}"))
                        } else {
                            SpawnRequest::new("vehicle.audi.tt", format!("v{t}_{i}"))
                        };
                        f.request_spawn(req).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let ids: Vec<ActorId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let unique: BTreeSet<_> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 200);

    f.reconcile();
    assert_eq!(f.mirrored_ids().len(), 200);
    assert_eq!(f.pending_tasks(), 0);
}

// ── Destroying ──────────────────────────────────────────────────

#[test]
fn destroy_closure_covers_grandchildren_and_releases_children_first() {
    let (world, _, f) = setup();
    let car = world.add_object("vehicle.audi.tt", &[], None);
    let cam = world.add_object("sensor.camera.rgb", &[], Some(car));
    let lidar = world.add_object("sensor.lidar.ray_cast", &[], Some(cam));
    let other = world.add_object("static.prop.box", &[], None);
    f.reconcile();
    let tf = f
        .request_spawn(SpawnRequest::new("sensor.pseudo.tf", "tf").attached_to(lidar))
        .unwrap();
    f.reconcile();

    let closure = f.request_destroy(car);
    assert_eq!(closure, BTreeSet::from([car, cam, lidar, tf]));
    assert_eq!(f.mirrored_ids().len(), 5);

    f.reconcile();
    assert_eq!(f.mirrored_ids(), vec![other]);
    assert_eq!(world.destroyed(), vec![lidar, cam, car]);
    assert!(!world.is_listening(cam));
    assert!(!world.is_listening(lidar));
}

#[test]
fn destroying_an_unknown_id_is_harmless() {
    let (world, _, f) = setup();
    let ghost = ActorId::new(77);
    assert_eq!(f.request_destroy(ghost), BTreeSet::from([ghost]));
    f.reconcile();
    assert!(world.destroyed().is_empty());
}

#[test]
fn destroying_twice_is_idempotent() {
    let (world, _, f) = setup();
    let car = world.add_object("vehicle.audi.tt", &[], None);
    f.reconcile();
    f.request_destroy(car);
    f.request_destroy(car);
    f.reconcile();
    assert_eq!(world.destroyed(), vec![car]);
}

#[test]
fn spawn_then_destroy_before_reconcile_leaves_nothing() {
    let (world, _, f) = setup();
    let id = f
        .request_spawn(SpawnRequest::new("vehicle.audi.tt", "car"))
        .unwrap();
    f.request_destroy(id);
    f.reconcile();
    assert!(f.mirrored_ids().is_empty());
    assert_eq!(world.live_count(), 0);
}

#[test]
fn destroying_an_opted_out_sensor_releases_it() {
    let world = Arc::new(MockWorld::new());
    let node = Arc::new(MockNode::new());
    let config = BridgeConfig {
        register_all_sensors: false,
        ..BridgeConfig::default()
    };
    let f = factory_with(&config, &world, &node);
    let lidar = f
        .request_spawn(SpawnRequest::new("sensor.lidar.ray_cast", "lidar"))
        .unwrap();
    f.reconcile();
    assert!(f.mirrored_ids().is_empty());

    assert_eq!(f.request_destroy(lidar), BTreeSet::from([lidar]));
    f.reconcile();
    assert_eq!(world.destroyed(), vec![lidar]);
    assert_eq!(world.live_count(), 0);
}

// ── Callbacks ───────────────────────────────────────────────────

#[test]
fn actor_control_moves_its_parent() {
    let (world, node, f) = setup();
    let car = world.add_object("vehicle.audi.tt", &[("role_name", "car")], None);
    f.reconcile();
    f.request_spawn(SpawnRequest::new("actor.pseudo.control", "control").attached_to(car))
        .unwrap();
    f.reconcile();

    let topic = "/carla/car/control/set_transform";
    assert!(node.has_reader(topic));
    let target = Transform {
        location: Vector3::new(1.0, 2.0, 3.0),
        ..Transform::default()
    };
    assert_eq!(node.publish(topic, simbridge_core::Message::Pose(target)), 1);
    assert_eq!(world.teleports(), vec![(car, target)]);
}

#[test]
fn clear_detaches_callbacks_but_keeps_live_objects() {
    let (world, node, f) = setup();
    let hero = world.add_object("vehicle.tesla.model3", &[("role_name", "hero")], None);
    let cam = world.add_object("sensor.camera.rgb", &[], Some(hero));
    f.reconcile();
    assert!(node.has_reader("/carla/hero/vehicle_control_cmd"));
    assert!(world.is_listening(cam));

    f.clear();
    assert!(f.mirrored_ids().is_empty());
    assert!(!node.has_reader("/carla/hero/vehicle_control_cmd"));
    assert!(!world.is_listening(cam));
    assert_eq!(world.live_count(), 2);
    assert!(world.destroyed().is_empty());
}
