use crate::physics::{BodyHandle, PhysicsWorld};
use crate::sink::PresentationSink;
use rapier3d::na;

pub const BULLET_HEALTH: i32 = 2;

/// One pooled projectile slot. Slots are created once at build time and
/// reused; `alive == false` marks a slot free.
pub struct Bullet {
    pub alive: bool,
    pub health: i32,
    /// Hull of the tank that fired this bullet. A bullet never damages its
    /// own firer no matter how many frames they overlap.
    pub owner: Option<BodyHandle>,
    pub fired_from: na::Point3<f32>,
    /// Deferred velocity set by a wall bounce, consumed on the next movement
    /// update rather than at collision time.
    pub redirect: Option<na::Vector3<f32>>,
    /// Velocity carried into the current step, captured at the last movement
    /// update. Wall bounces reflect this approach velocity, not whatever the
    /// solver left behind after the impact.
    pub last_velocity: na::Vector3<f32>,

    pub body: BodyHandle,
    pub instance: u32,
}
impl Bullet {
    pub fn new(body: BodyHandle, instance: u32) -> Self {
        Self {
            alive: false,
            health: 0,
            owner: None,
            fired_from: na::Point3::origin(),
            redirect: None,
            last_velocity: na::Vector3::zeros(),
            body,
            instance,
        }
    }

    /// Claim this slot for a fresh shot.
    pub fn arm(&mut self, owner: BodyHandle, fired_from: na::Point3<f32>) {
        self.alive = true;
        self.health = BULLET_HEALTH;
        self.owner = Some(owner);
        self.fired_from = fired_from;
        self.redirect = None;
        self.last_velocity = na::Vector3::zeros();
    }

    /// Return the slot to the pool: out of the world, motionless, hidden.
    pub fn deactivate(&mut self, physics: &mut PhysicsWorld, presentation: &dyn PresentationSink) {
        self.alive = false;
        self.redirect = None;
        physics.reset_velocity_and_force(self.body);
        physics.set_in_world(self.body, false);
        presentation.set_visible(self.instance, false);
    }
}
