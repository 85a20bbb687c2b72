//! The scene container: builds the world out of the config and runs the
//! five-phase simulation tick.
//!
//! Tick order matters: all intent is turned into forces before the step, the
//! step runs with that consistent snapshot, detection reads the fresh
//! manifolds, resolution mutates gameplay state, and only then is
//! presentation updated.

use crate::bullet::Bullet;
use crate::bullet_manager::BulletManager;
use crate::collision_manager::{CollisionManager, Wall};
use crate::config::{ArenaConfig, ControlKind, Mesh, ShapeSource};
use crate::physics::{BodyDef, EntityKind, PhysicsWorld, ShapeHandle};
use crate::sink::{AudioSink, PresentationSink};
use crate::tank::{Tank, TankInput, TankKind, HULL_HALF_EXTENTS, TANK_HEALTH, TURRET_HALF_EXTENTS};
use crate::tank_manager::TankManager;
use crate::SimRng;
use rand::SeedableRng;
use rapier3d::na;
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;
use std::time::Duration;

/// Strongest impulse the turret hinge motor may apply.
const TURRET_MOTOR_FORCE: f32 = 50.0;
/// Hull center of mass sits below the geometric center so tanks resist
/// tipping over.
const HULL_COM_DROP: f32 = 0.2;

struct TankShapes {
    hull: ShapeHandle,
    turret: ShapeHandle,
    piece: ShapeHandle,
}

pub struct Arena {
    pub tick: u64,
    rng: SimRng,
    config: ArenaConfig,

    pub physics: PhysicsWorld,
    pub tanks: Vec<Tank>,
    pub walls: Vec<Wall>,

    pub tank_manager: TankManager,
    pub bullets: BulletManager,
    pub collisions: CollisionManager,

    presentation: Rc<dyn PresentationSink>,
}
impl Arena {
    pub const TICK_DURATION: Duration = Duration::from_millis(20);
    pub const TICK_DT: f32 = 0.02;

    pub fn new(
        config: &ArenaConfig,
        shapes: &dyn ShapeSource,
        presentation: Rc<dyn PresentationSink>,
        audio: Rc<dyn AudioSink>,
    ) -> anyhow::Result<Self> {
        let mut physics = PhysicsWorld::new(config.gravity, config.substeps);
        let mut collisions = CollisionManager::new(audio.clone(), presentation.clone());

        let tank_shapes = TankShapes {
            hull: physics.add_shape(&shapes.vertices(Mesh::Hull))?,
            turret: physics.add_shape(&shapes.vertices(Mesh::Turret))?,
            piece: physics.add_shape(&shapes.vertices(Mesh::Piece))?,
        };
        let bullet_shape = physics.add_shape(&shapes.vertices(Mesh::Bullet))?;
        let ground_shape = physics.add_shape(&shapes.vertices(Mesh::Ground))?;
        let wall_shape = physics.add_shape(&shapes.vertices(Mesh::Wall))?;

        // Ground slab, top surface at y = 0.
        let ground_group = collisions.new_group();
        physics.add_body(BodyDef::new(
            na::Isometry3::translation(0.0, -0.5, 0.0),
            ground_shape,
            0.0,
            ground_group,
            EntityKind::Ground,
            0,
        ));

        let walls = build_walls(&mut physics, &mut collisions, wall_shape, config);

        let mut instance_count = 0u32;
        let mut tanks = Vec::with_capacity(config.tanks.len());
        for (index, spawn) in config.tanks.iter().enumerate() {
            let kind = match spawn.control {
                ControlKind::Player => TankKind::Player,
                ControlKind::Ai => TankKind::ai(),
            };
            tanks.push(build_tank(
                &mut physics,
                &mut collisions,
                &*presentation,
                &tank_shapes,
                config,
                ground_group,
                index as u32,
                spawn.position,
                spawn.yaw,
                kind,
                &mut instance_count,
            ));
        }

        // The bullet pool: all slots exist up front, parked out of the world.
        let mut slots = Vec::with_capacity(config.bullet_pool);
        for index in 0..config.bullet_pool {
            let group = collisions.new_group();
            let body = physics.add_body(
                BodyDef::new(
                    na::Isometry3::translation(0.0, -20.0, 0.0),
                    bullet_shape,
                    config.bullet_mass,
                    group,
                    EntityKind::Bullet,
                    index as u32,
                )
                .with_ccd(),
            );
            physics.set_in_world(body, false);

            let instance = instance_count;
            instance_count += 1;
            presentation.set_visible(instance, false);
            slots.push(Bullet::new(body, instance));
        }

        let bullets = BulletManager::new(
            slots,
            config.bound * 2.0,
            config.bullet_range,
            presentation.clone(),
            audio,
        );

        log::info!(
            "arena built: {} tanks, {} bullet slots, {} mesh instances",
            tanks.len(),
            config.bullet_pool,
            instance_count
        );

        Ok(Self {
            tick: 0,
            rng: SimRng::seed_from_u64(config.seed),
            config: config.clone(),
            physics,
            tanks,
            walls,
            tank_manager: TankManager::new(presentation.clone()),
            bullets,
            collisions,
            presentation,
        })
    }

    /// One full simulation tick.
    pub fn step(&mut self) {
        self.bullets.pre_step(&mut self.physics, &mut self.tanks);
        self.tank_manager
            .pre_step(Self::TICK_DT, &mut self.physics, &mut self.tanks, &mut self.rng);

        self.physics.step(Self::TICK_DT);

        let physics = &self.physics;
        self.collisions.detect(
            physics
                .active_contacts()
                .filter_map(|(a, b)| physics.contact_entities(a, b)),
        );
        self.collisions.resolve(
            &mut self.physics,
            &mut self.tanks,
            self.bullets.slots_mut(),
            &self.walls,
        );

        self.tank_manager.post_step(&self.physics, &self.tanks);
        self.bullets.post_step(&self.physics);

        self.tick += 1;
    }

    pub fn set_player_input(&mut self, index: usize, input: TankInput) {
        self.tanks[index].input = input;
    }

    pub fn alive_tanks(&self) -> usize {
        self.tanks.iter().filter(|tank| tank.alive).count()
    }

    /// Bring a destroyed tank back: wreck pieces leave the world, hull and
    /// turret return at the given spot and drop in like a fresh spawn.
    pub fn respawn(&mut self, index: usize, position: [f32; 2], yaw: f32) {
        let tank = &mut self.tanks[index];

        for (&piece, &instance) in tank.pieces.iter().zip(tank.piece_instances.iter()) {
            self.physics.set_in_world(piece, false);
            self.presentation.set_visible(instance, false);
        }

        let rotation = na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), yaw);
        let hull_pos = na::Isometry3::from_parts(
            na::Translation3::new(position[0], self.config.drop_height, position[1]),
            rotation,
        );
        let turret_pos =
            hull_pos * na::Isometry3::translation(0.0, HULL_HALF_EXTENTS[1] + TURRET_HALF_EXTENTS[1], 0.0);

        self.physics.set_transform(tank.hull, hull_pos);
        self.physics.reset_velocity_and_force(tank.hull);
        self.physics.set_in_world(tank.hull, true);
        self.physics.set_transform(tank.turret, turret_pos);
        self.physics.reset_velocity_and_force(tank.turret);
        self.physics.set_in_world(tank.turret, true);
        self.presentation.set_visible(tank.hull_instance, true);
        self.presentation.set_visible(tank.turret_instance, true);

        tank.alive = true;
        tank.health = TANK_HEALTH;
        tank.dropping = true;
        tank.input = TankInput::empty();
        tank.prev_input = TankInput::empty();
        tank.linear_damping = 1.0;
        tank.rotational_damping = 1.0;
        tank.turret_damping = 1.0;
        tank.fire_cooldown = 0.0;
    }
}

fn build_walls(
    physics: &mut PhysicsWorld,
    collisions: &mut CollisionManager,
    shape: ShapeHandle,
    config: &ArenaConfig,
) -> Vec<Wall> {
    let offset = config.bound + 0.5;
    let wall_y = config.wall_height * 0.5;
    let turned = na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), FRAC_PI_2);

    let placements = [
        (
            na::Isometry3::translation(offset, wall_y, 0.0),
            na::Vector3::new(-1.0, 0.0, 0.0),
        ),
        (
            na::Isometry3::translation(-offset, wall_y, 0.0),
            na::Vector3::new(1.0, 0.0, 0.0),
        ),
        (
            na::Isometry3::from_parts(na::Translation3::new(0.0, wall_y, offset), turned),
            na::Vector3::new(0.0, 0.0, -1.0),
        ),
        (
            na::Isometry3::from_parts(na::Translation3::new(0.0, wall_y, -offset), turned),
            na::Vector3::new(0.0, 0.0, 1.0),
        ),
    ];

    placements
        .into_iter()
        .enumerate()
        .map(|(index, (position, normal))| {
            let group = collisions.new_group();
            let body = physics.add_body(BodyDef::new(
                position,
                shape,
                0.0,
                group,
                EntityKind::Wall,
                index as u32,
            ));
            Wall { body, normal }
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build_tank(
    physics: &mut PhysicsWorld,
    collisions: &mut CollisionManager,
    presentation: &dyn PresentationSink,
    shapes: &TankShapes,
    config: &ArenaConfig,
    ground_group: u32,
    index: u32,
    position: [f32; 2],
    yaw: f32,
    kind: TankKind,
    instance_count: &mut u32,
) -> Tank {
    let [_, hull_hh, _] = HULL_HALF_EXTENTS;
    let [_, turret_hh, _] = TURRET_HALF_EXTENTS;

    // Hull, turret and wreck pieces share one fresh group so a tank never
    // collides with itself.
    let group = collisions.new_group();

    let rotation = na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), yaw);
    let hull_pos = na::Isometry3::from_parts(
        na::Translation3::new(position[0], config.drop_height, position[1]),
        rotation,
    );

    let hull = physics.add_body(
        BodyDef::new(
            hull_pos,
            shapes.hull,
            config.hull_mass,
            group,
            EntityKind::Tank,
            index,
        )
        .with_com_offset(na::Vector3::new(0.0, -HULL_COM_DROP, 0.0)),
    );

    let turret_pos = hull_pos * na::Isometry3::translation(0.0, hull_hh + turret_hh, 0.0);
    let turret = physics.add_body(BodyDef::new(
        turret_pos,
        shapes.turret,
        config.turret_mass,
        group,
        EntityKind::Tank,
        index,
    ));

    let hinge = physics.add_hinge(
        hull,
        turret,
        na::Point3::new(0.0, hull_hh, 0.0),
        na::Point3::new(0.0, -turret_hh, 0.0),
        na::Vector3::y_axis(),
        na::Vector3::y_axis(),
        TURRET_MOTOR_FORCE,
    );

    let hull_instance = *instance_count;
    let turret_instance = *instance_count + 1;
    *instance_count += 2;

    // Wreck pieces wait outside the world until the tank dies. They only
    // ever land on the ground, not on live tanks or walls.
    let mut pieces = [hull; 4];
    let mut piece_instances = [0u32; 4];
    for slot in 0..4 {
        let body = physics.add_body(
            BodyDef::new(
                hull_pos,
                shapes.piece,
                config.piece_mass,
                group,
                EntityKind::Debris,
                index,
            )
            .with_events(false)
            .with_mask(ground_group),
        );
        physics.set_in_world(body, false);
        pieces[slot] = body;

        piece_instances[slot] = *instance_count;
        *instance_count += 1;
        presentation.set_visible(piece_instances[slot], false);
    }

    Tank::new(
        kind,
        hull,
        turret,
        hinge,
        pieces,
        hull_instance,
        turret_instance,
        piece_instances,
    )
}
