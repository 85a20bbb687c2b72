//! Cross-frame collision bookkeeping and resolution.
//!
//! Contact manifolds are re-reported by the backend on every step. To act on
//! first touch only, live events are kept across ticks: detection marks the
//! pairs still in contact, resolution dispatches each pair once and sweeps
//! the pairs that stopped touching.

use crate::bullet::Bullet;
use crate::physics::{BodyHandle, ContactEntity, EntityKind, PhysicsWorld};
use crate::sink::{AudioSink, PresentationSink, SoundCue};
use crate::tank::Tank;
use rapier3d::na;
use std::rc::Rc;

pub const FULL_DAMAGE: i32 = 2;
pub const PARTIAL_DAMAGE: i32 = 1;

/// Backward shift of the fourth wreck piece so the wreck does not balance
/// squarely on the hull's footprint.
const PIECE_BACK_OFFSET: f32 = 0.8;

/// An arena wall, with its inward-facing normal for bullet reflection.
pub struct Wall {
    pub body: BodyHandle,
    pub normal: na::Vector3<f32>,
}

/// A live contact between two gameplay entities.
///
/// `processed`: resolution logic has run for this pair since it appeared.
/// `resolved`: not observed in contact this tick; sweep candidate.
pub struct CollisionEvent {
    pub a: ContactEntity,
    pub b: ContactEntity,
    pub processed: bool,
    pub resolved: bool,
}
impl CollisionEvent {
    /// Pair identity is (kind, instance) on both sides, order-insensitive.
    /// Hull and turret of the same tank fold into one event.
    pub fn pair_matches(&self, a: &ContactEntity, b: &ContactEntity) -> bool {
        let own = (pair_key(&self.a), pair_key(&self.b));
        (own.0 == pair_key(a) && own.1 == pair_key(b))
            || (own.0 == pair_key(b) && own.1 == pair_key(a))
    }
}

fn pair_key(entity: &ContactEntity) -> (EntityKind, u32) {
    (entity.kind, entity.index)
}

pub struct CollisionManager {
    events: Vec<CollisionEvent>,
    next_group: u32,
    audio: Rc<dyn AudioSink>,
    presentation: Rc<dyn PresentationSink>,
}
impl CollisionManager {
    pub fn new(audio: Rc<dyn AudioSink>, presentation: Rc<dyn PresentationSink>) -> Self {
        Self {
            events: Vec::new(),
            next_group: 0,
            audio,
            presentation,
        }
    }

    /// Issue a fresh broadphase filter group. World building calls this once
    /// per tank (hull, turret and pieces share it) and per scenery body.
    pub fn new_group(&mut self) -> u32 {
        let group = self.next_group;
        self.next_group += 1;
        group
    }

    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    /// Fold this tick's manifold pairs into the live-event list: new pairs
    /// become events, known pairs are marked still-touching.
    pub fn detect(&mut self, contacts: impl Iterator<Item = (ContactEntity, ContactEntity)>) {
        for (a, b) in contacts {
            if let Some(event) = self.events.iter_mut().find(|e| e.pair_matches(&a, &b)) {
                event.resolved = false;
            } else {
                self.events.push(CollisionEvent {
                    a,
                    b,
                    processed: false,
                    resolved: false,
                });
            }
        }
    }

    /// Dispatch unprocessed events, sweep ended contacts, re-arm the rest.
    ///
    /// Every surviving event leaves with `resolved == true`; the next
    /// detection pass must actively clear it to keep the event alive. That
    /// is what makes first-touch dispatch idempotent over a long contact.
    pub fn resolve(
        &mut self,
        physics: &mut PhysicsWorld,
        tanks: &mut [Tank],
        bullets: &mut [Bullet],
        walls: &[Wall],
    ) {
        for i in 0..self.events.len() {
            if self.events[i].processed {
                continue;
            }
            let (a, b) = (self.events[i].a, self.events[i].b);
            self.dispatch(a, b, physics, tanks, bullets, walls);
            self.events[i].processed = true;
        }

        self.events.retain(|event| !(event.processed && event.resolved));
        for event in &mut self.events {
            event.resolved = true;
        }
    }

    fn dispatch(
        &self,
        a: ContactEntity,
        b: ContactEntity,
        physics: &mut PhysicsWorld,
        tanks: &mut [Tank],
        bullets: &mut [Bullet],
        walls: &[Wall],
    ) {
        use EntityKind::*;
        match (a.kind, b.kind) {
            (Tank, Ground) => tanks[a.index as usize].dropping = false,
            (Ground, Tank) => tanks[b.index as usize].dropping = false,
            (Tank, Tank) => self.audio.play(SoundCue::TankImpact),
            (Tank, Wall) | (Wall, Tank) => self.audio.play(SoundCue::WallImpact),
            (Bullet, Wall) => self.bullet_wall(&mut bullets[a.index as usize], &walls[b.index as usize]),
            (Wall, Bullet) => self.bullet_wall(&mut bullets[b.index as usize], &walls[a.index as usize]),
            (Bullet, Tank) => self.bullet_tank(a.index, b.index, physics, tanks, bullets),
            (Tank, Bullet) => self.bullet_tank(b.index, a.index, physics, tanks, bullets),
            (Bullet, _) | (_, Bullet) => {
                // Bullet against bullet or any other obstacle: spent outright.
                for side in [a, b] {
                    if side.kind == Bullet {
                        let bullet = &mut bullets[side.index as usize];
                        if bullet.alive {
                            bullet.health -= FULL_DAMAGE;
                        }
                    }
                }
            }
            _ => {}
        }

        for side in [a, b] {
            if side.kind == Bullet {
                let bullet = &mut bullets[side.index as usize];
                if bullet.alive && bullet.health <= 0 {
                    bullet.deactivate(physics, &*self.presentation);
                    self.audio.play(SoundCue::BulletDestroyed);
                }
            }
        }
    }

    fn bullet_wall(&self, bullet: &mut Bullet, wall: &Wall) {
        if !bullet.alive {
            return;
        }
        bullet.health -= PARTIAL_DAMAGE;
        // Queue the specular reflection of the approach velocity; the bullet
        // applies it on its next movement update. Speed is preserved because
        // the reflection uses the velocity from before the solver's own
        // impact response.
        bullet.redirect = Some(reflect(bullet.last_velocity, wall.normal));
    }

    fn bullet_tank(
        &self,
        bullet_index: u32,
        tank_index: u32,
        physics: &mut PhysicsWorld,
        tanks: &mut [Tank],
        bullets: &mut [Bullet],
    ) {
        let tank = &mut tanks[tank_index as usize];
        let bullet = &mut bullets[bullet_index as usize];
        if !tank.alive || !bullet.alive {
            return;
        }
        if bullet.owner == Some(tank.hull) {
            return;
        }

        bullet.health -= FULL_DAMAGE;
        tank.health -= PARTIAL_DAMAGE;
        if tank.health <= 0 {
            self.destroy_tank(physics, tank);
        }
    }

    /// Swap the live tank out for its wreck: hull and turret leave the
    /// world, the four pieces take over at the hull's final transform.
    /// Runs at most once per tank, guarded by the alive flag.
    fn destroy_tank(&self, physics: &mut PhysicsWorld, tank: &mut Tank) {
        let hull_transform = physics.transform(tank.hull);
        let forward = hull_transform.rotation * na::Vector3::z();

        physics.set_in_world(tank.hull, false);
        physics.set_in_world(tank.turret, false);
        physics.reset_velocity_and_force(tank.hull);
        physics.reset_velocity_and_force(tank.turret);
        self.presentation.set_visible(tank.hull_instance, false);
        self.presentation.set_visible(tank.turret_instance, false);

        for (i, (&piece, &instance)) in tank
            .pieces
            .iter()
            .zip(tank.piece_instances.iter())
            .enumerate()
        {
            let mut transform = hull_transform;
            if i == 3 {
                // The last piece slides back so the wreck topples instead of
                // balancing on the hull's old footprint.
                transform.translation.vector -= forward * PIECE_BACK_OFFSET;
            }
            physics.set_transform(piece, transform);
            physics.reset_velocity_and_force(piece);
            physics.set_in_world(piece, true);
            self.presentation.set_visible(instance, true);
        }

        tank.alive = false;
    }
}

fn reflect(velocity: na::Vector3<f32>, normal: na::Vector3<f32>) -> na::Vector3<f32> {
    velocity - normal * (2.0 * velocity.dot(&normal))
}

// ####################################################################################
// ################################### TEST ###########################################
// ####################################################################################
