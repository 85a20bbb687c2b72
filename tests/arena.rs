//! End-to-end scenarios against a real arena: pool discipline, self-fire
//! immunity, destruction choreography, wall bounces and culling.

use approx::assert_relative_eq;
use std::cell::RefCell;
use std::f32::consts::PI;
use std::rc::Rc;
use tankscape::arena::Arena;
use tankscape::config::{ArenaConfig, BoxShapes, ControlKind, TankSpawn};
use tankscape::na;
use tankscape::physics::EntityKind;
use tankscape::sink::{AudioSink, NullSink, SoundCue};
use tankscape::tank::{TankInput, TANK_HEALTH};

fn spawn(position: [f32; 2], yaw: f32) -> TankSpawn {
    TankSpawn {
        position,
        yaw,
        control: ControlKind::Player,
    }
}

/// Two player tanks facing each other across the arena center, small pool.
fn duel_config() -> ArenaConfig {
    ArenaConfig {
        seed: 1,
        bullet_pool: 4,
        tanks: vec![spawn([0.0, -6.0], 0.0), spawn([0.0, 6.0], PI)],
        ..ArenaConfig::default()
    }
}

fn lone_config() -> ArenaConfig {
    ArenaConfig {
        seed: 1,
        bullet_pool: 4,
        tanks: vec![spawn([0.0, -6.0], 0.0)],
        ..ArenaConfig::default()
    }
}

fn build(config: &ArenaConfig) -> Arena {
    let shapes = BoxShapes::new(config);
    let sink = Rc::new(NullSink);
    Arena::new(config, &shapes, sink.clone(), sink).unwrap()
}

fn settle(arena: &mut Arena, ticks: u32) {
    for _ in 0..ticks {
        arena.step();
    }
}

/// Plant a live bullet owned by `owner_hull` at `position` with `velocity`,
/// reusing the first free pool slot. Stands in for a shot that is about to
/// land, without simulating the whole flight.
fn plant_bullet(
    arena: &mut Arena,
    slot: usize,
    owner: usize,
    position: na::Point3<f32>,
    velocity: na::Vector3<f32>,
) {
    let owner_hull = arena.tanks[owner].hull;
    let body = arena.bullets.slots()[slot].body;

    arena.bullets.slots_mut()[slot].arm(owner_hull, position);
    arena.physics.set_transform(
        body,
        na::Isometry3::from_parts(position.coords.into(), na::UnitQuaternion::identity()),
    );
    arena.physics.set_in_world(body, true);
    arena.physics.set_gravity_scale(body, 0.0);
    arena.physics.set_internal_damping(body, 0.0, 0.0);
    arena.physics.set_velocity(body, velocity);
}

#[test]
fn tanks_drop_in_and_settle_on_the_ground() {
    let mut arena = build(&duel_config());
    assert!(arena.tanks.iter().all(|t| t.dropping));

    settle(&mut arena, 150);

    for tank in &arena.tanks {
        assert!(tank.alive);
        assert!(!tank.dropping, "ground contact must clear the dropping flag");
        let y = arena.physics.transform(tank.hull).translation.y;
        assert!(y > 0.0 && y < 1.0, "hull should rest on the floor, y = {y}");
    }
}

#[test]
fn ground_contact_is_one_event_processed_once() {
    let mut arena = build(&lone_config());
    settle(&mut arena, 150);

    for _ in 0..50 {
        arena.step();
        let ground_events: Vec<_> = arena
            .collisions
            .events()
            .iter()
            .filter(|e| {
                let kinds = (e.a.kind, e.b.kind);
                kinds == (EntityKind::Tank, EntityKind::Ground)
                    || kinds == (EntityKind::Ground, EntityKind::Tank)
            })
            .collect();
        assert_eq!(ground_events.len(), 1, "resting contact must stay one event");
        assert!(ground_events[0].processed, "first touch is dispatched exactly once");
    }
}

#[test]
fn sustained_fire_never_exceeds_the_pool() {
    let config = duel_config();
    let mut arena = build(&config);
    settle(&mut arena, 150);

    for _ in 0..400 {
        arena.set_player_input(0, TankInput::FIRE);
        arena.step();
        assert!(arena.bullets.live_count() <= config.bullet_pool);
    }
}

#[test]
fn fire_rate_is_limited_by_the_cooldown() {
    let mut arena = build(&duel_config());
    settle(&mut arena, 150);

    arena.set_player_input(0, TankInput::FIRE);
    arena.step();
    assert_eq!(arena.bullets.live_count(), 1);
    let shooter = &arena.tanks[0];
    assert!(shooter.fire_cooldown > 0.0);
    assert_eq!(arena.bullets.slots()[0].owner, Some(shooter.hull));

    // Trigger held: the cooldown blocks a second shot.
    arena.set_player_input(0, TankInput::FIRE);
    arena.step();
    assert_eq!(arena.bullets.live_count(), 1);
}

#[test]
fn exhausted_pool_drops_the_fire_intent() {
    let mut arena = build(&duel_config());
    settle(&mut arena, 150);

    // Fill every slot with a slow cruiser far from the action.
    for slot in 0..4 {
        plant_bullet(
            &mut arena,
            slot,
            1,
            na::Point3::new(-15.0 + slot as f32 * 2.0, 1.5, -15.0),
            na::Vector3::new(0.0, 0.0, 1.0),
        );
    }

    arena.set_player_input(0, TankInput::FIRE);
    arena.step();

    assert_eq!(arena.bullets.live_count(), 4, "no fifth bullet may appear");
    // The intent was dropped without consuming the cooldown, so the next
    // free slot can be claimed immediately.
    assert_eq!(arena.tanks[0].fire_cooldown, 0.0);
}

#[test]
fn own_bullet_never_damages_the_firer() {
    let mut arena = build(&duel_config());
    settle(&mut arena, 150);

    let hull_pos = arena.physics.transform(arena.tanks[0].hull);
    let inside = hull_pos * na::Point3::new(0.0, 0.0, 0.5);
    plant_bullet(&mut arena, 0, 0, inside, na::Vector3::new(0.0, 0.0, 2.0));

    // Overlap for several frames; the owner check must hold every one.
    for _ in 0..5 {
        arena.step();
    }

    assert_eq!(arena.tanks[0].health, TANK_HEALTH);
    assert!(arena.tanks[0].alive);
}

#[test]
fn two_hits_destroy_a_tank_and_activate_the_wreck() {
    let mut arena = build(&duel_config());
    settle(&mut arena, 150);

    let victim_hull = arena.tanks[0].hull;
    let hit_point = arena.physics.transform(victim_hull) * na::Point3::new(0.0, 0.2, 0.0);

    plant_bullet(&mut arena, 0, 1, hit_point, na::Vector3::new(0.0, 0.0, 2.0));
    arena.step();

    assert_eq!(arena.tanks[0].health, TANK_HEALTH - 1);
    assert!(arena.tanks[0].alive);
    assert!(
        !arena.bullets.slots()[0].alive,
        "a vehicle hit spends the bullet outright"
    );

    // Let the ended contact sweep out of the event list.
    arena.step();

    let hull_before = arena.physics.transform(victim_hull);
    plant_bullet(&mut arena, 1, 1, hit_point, na::Vector3::new(0.0, 0.0, 2.0));
    arena.step();

    let victim = &arena.tanks[0];
    assert!(!victim.alive);
    assert_eq!(victim.health, 0);
    assert!(!arena.physics.in_world(victim.hull));
    assert!(!arena.physics.in_world(victim.turret));

    let forward = hull_before.rotation * na::Vector3::z();
    for (i, &piece) in victim.pieces.iter().enumerate() {
        assert!(arena.physics.in_world(piece), "piece {i} must be simulating");
        let piece_pos = arena.physics.transform(piece).translation.vector;
        let mut expected = hull_before.translation.vector;
        if i == 3 {
            expected -= forward * 0.8;
        }
        // The hull may shift a little while the lethal contact resolves, so
        // the placement check allows a small slop.
        assert_relative_eq!(piece_pos.x, expected.x, epsilon = 0.15);
        assert_relative_eq!(piece_pos.z, expected.z, epsilon = 0.15);
        assert!((piece_pos.y - expected.y).abs() < 0.3);
    }

    // Health never goes below the lethal threshold's floor.
    assert!(victim.health >= 0);
}

#[test]
fn wall_bounce_queues_the_reflected_velocity() {
    let config = lone_config();
    let mut arena = build(&config);
    settle(&mut arena, 150);

    let start = na::Point3::new(config.bound - 1.0, 1.5, 0.0);
    plant_bullet(&mut arena, 0, 0, start, na::Vector3::new(10.0, 0.0, 0.0));

    let mut redirect = None;
    for _ in 0..40 {
        arena.step();
        if let Some(r) = arena.bullets.slots()[0].redirect {
            redirect = Some(r);
            break;
        }
        if !arena.bullets.slots()[0].alive {
            break;
        }
    }

    let redirect = redirect.expect("bullet should have bounced off the +x wall");
    // Head-on against the wall's inward normal (-1, 0, 0): full reversal,
    // speed preserved up to the slight forward thrust gathered in flight.
    assert_relative_eq!(redirect, na::Vector3::new(-10.0, 0.0, 0.0), epsilon = 0.1);
    assert_eq!(arena.bullets.slots()[0].health, 1);
}

#[test]
fn out_of_range_bullet_is_culled() {
    let config = ArenaConfig {
        bullet_range: 10.0,
        ..lone_config()
    };
    let mut arena = build(&config);
    settle(&mut arena, 150);

    // Planted at its fired-from point, then teleported past the range.
    plant_bullet(
        &mut arena,
        0,
        0,
        na::Point3::new(0.0, 1.5, 0.0),
        na::Vector3::new(0.0, 0.0, 8.0),
    );
    let body = arena.bullets.slots()[0].body;
    arena
        .physics
        .set_position(body, na::Vector3::new(0.0, 1.5, 12.0));

    arena.step();

    assert!(!arena.bullets.slots()[0].alive);
    assert!(!arena.physics.in_world(body));
}

#[test]
fn respawn_restores_a_destroyed_tank() {
    let mut arena = build(&duel_config());
    settle(&mut arena, 150);

    let hit_point = arena.physics.transform(arena.tanks[0].hull) * na::Point3::new(0.0, 0.2, 0.0);
    plant_bullet(&mut arena, 0, 1, hit_point, na::Vector3::new(0.0, 0.0, 2.0));
    arena.step();
    arena.step();
    plant_bullet(&mut arena, 1, 1, hit_point, na::Vector3::new(0.0, 0.0, 2.0));
    arena.step();
    assert!(!arena.tanks[0].alive);

    arena.respawn(0, [8.0, 8.0], 0.0);

    let tank = &arena.tanks[0];
    assert!(tank.alive);
    assert!(tank.dropping);
    assert_eq!(tank.health, TANK_HEALTH);
    assert!(arena.physics.in_world(tank.hull));
    assert!(tank.pieces.iter().all(|&p| !arena.physics.in_world(p)));

    settle(&mut arena, 150);
    assert!(!arena.tanks[0].dropping);
}

struct CueRecorder(RefCell<Vec<SoundCue>>);
impl AudioSink for CueRecorder {
    fn play(&self, cue: SoundCue) {
        self.0.borrow_mut().push(cue);
    }
}

#[test]
fn firing_triggers_the_shot_cue() {
    let config = duel_config();
    let shapes = BoxShapes::new(&config);
    let audio = Rc::new(CueRecorder(RefCell::new(Vec::new())));
    let mut arena = Arena::new(&config, &shapes, Rc::new(NullSink), audio.clone()).unwrap();

    settle(&mut arena, 150);
    audio.0.borrow_mut().clear();

    arena.set_player_input(0, TankInput::FIRE);
    arena.step();

    assert!(audio.0.borrow().contains(&SoundCue::Shot));
}
