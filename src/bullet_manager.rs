//! Owns the projectile pool: consumes fire intents, keeps live bullets
//! flying, culls spent ones, and mirrors transforms to presentation.

use crate::bullet::Bullet;
use crate::physics::PhysicsWorld;
use crate::sink::{AudioSink, PresentationSink, SoundCue};
use crate::tank::{Tank, TankInput, FIRE_DELAY, TURRET_HALF_EXTENTS};
use rapier3d::na;
use std::rc::Rc;

const MUZZLE_IMPULSE: f32 = 3.0;
const RECOIL_IMPULSE: f32 = 1.5;
/// Continuous force keeping a bullet at roughly constant speed.
const BULLET_THRUST: f32 = 0.05;
/// Distance from the turret's front face to the muzzle, far enough that a
/// fresh bullet never starts inside the firer's own hull or turret.
const MUZZLE_CLEARANCE: f32 = 0.6;
/// The barrel sits slightly above the turret's midline.
const MUZZLE_LIFT: f32 = 0.1;
/// A bullet slower than this has been stopped by something and is spent.
const STALL_SPEED: f32 = 0.5;

pub struct BulletManager {
    bullets: Vec<Bullet>,
    /// Distance from the world origin past which a bullet has left the arena.
    cull_radius: f32,
    /// Maximum distance a bullet may travel from where it was fired.
    range: f32,
    presentation: Rc<dyn PresentationSink>,
    audio: Rc<dyn AudioSink>,
}
impl BulletManager {
    pub fn new(
        bullets: Vec<Bullet>,
        cull_radius: f32,
        range: f32,
        presentation: Rc<dyn PresentationSink>,
        audio: Rc<dyn AudioSink>,
    ) -> Self {
        Self {
            bullets,
            cull_radius,
            range,
            presentation,
            audio,
        }
    }

    pub fn slots(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn slots_mut(&mut self) -> &mut [Bullet] {
        &mut self.bullets
    }

    pub fn live_count(&self) -> usize {
        self.bullets.iter().filter(|b| b.alive).count()
    }

    pub fn pre_step(&mut self, physics: &mut PhysicsWorld, tanks: &mut [Tank]) {
        for tank in tanks.iter_mut() {
            if !tank.alive || !tank.input.contains(TankInput::FIRE) || tank.fire_cooldown > 0.0 {
                continue;
            }
            // Pool dry: the intent is simply dropped, the cooldown stays
            // expired and next tick retries.
            let Some(bullet) = self.bullets.iter_mut().find(|b| !b.alive) else {
                continue;
            };

            let turret = physics.transform(tank.turret);
            let dir = turret.rotation * na::Vector3::z();
            let muzzle =
                turret * na::Point3::new(0.0, MUZZLE_LIFT, TURRET_HALF_EXTENTS[2] + MUZZLE_CLEARANCE);

            bullet.arm(tank.hull, muzzle);
            physics.set_transform(
                bullet.body,
                na::Isometry3::from_parts(muzzle.coords.into(), turret.rotation),
            );
            physics.set_in_world(bullet.body, true);
            physics.reset_velocity_and_force(bullet.body);
            physics.set_internal_damping(bullet.body, 0.0, 0.0);
            physics.set_friction(bullet.body, 0.0);
            physics.set_gravity_scale(bullet.body, 0.0);
            physics.add_impulse(bullet.body, dir * MUZZLE_IMPULSE, na::Point3::origin());
            physics.add_impulse(tank.hull, -dir * RECOIL_IMPULSE, na::Point3::origin());

            bullet.last_velocity = physics.velocity(bullet.body);
            self.presentation.set_visible(bullet.instance, true);
            self.audio.play(SoundCue::Shot);
            tank.fire_cooldown = FIRE_DELAY;
        }

        for bullet in self.bullets.iter_mut().filter(|b| b.alive) {
            // The solver must not decay bullet motion on its own.
            physics.set_internal_damping(bullet.body, 0.0, 0.0);
            physics.set_friction(bullet.body, 0.0);

            let position = physics.transform(bullet.body).translation.vector;
            let velocity = physics.velocity(bullet.body);
            let traveled = (position - bullet.fired_from.coords).norm();
            if position.norm() > self.cull_radius
                || traveled > self.range
                || velocity.norm() < STALL_SPEED
            {
                bullet.deactivate(physics, &*self.presentation);
                continue;
            }

            if let Some(redirect) = bullet.redirect.take() {
                // Wall bounce queued last resolution: replace the solver's
                // post-impact motion with the reflected velocity.
                physics.reset_velocity_and_force(bullet.body);
                physics.set_velocity(bullet.body, redirect);
                bullet.last_velocity = redirect;
            } else if let Some(dir) = velocity.try_normalize(1.0e-6) {
                physics.clear_forces(bullet.body);
                physics.add_force(bullet.body, dir * BULLET_THRUST, na::Point3::origin());
                bullet.last_velocity = velocity;
            }
        }
    }

    pub fn post_step(&self, physics: &PhysicsWorld) {
        for bullet in self.bullets.iter().filter(|b| b.alive) {
            self.presentation
                .set_transform(bullet.instance, &physics.transform(bullet.body));
        }
    }
}
