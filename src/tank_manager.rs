//! Turns per-tank movement intent into forces on the hull and hinge motor
//! targets for the turret, and mirrors transforms out to presentation after
//! the step.

use crate::physics::PhysicsWorld;
use crate::sink::PresentationSink;
use crate::tank::{Tank, TankInput, HULL_HALF_EXTENTS};
use rand::Rng;
use rapier3d::na;
use std::f32::consts::PI;
use std::rc::Rc;

/// Drive force per corner, scaled by dt.
const DRIVE_FORCE: f32 = 800.0;
/// Turn force per corner on the turning side, scaled by dt.
const TURN_FORCE: f32 = 500.0;
/// Turn force per corner on the opposite side. The imbalance makes the turn
/// pivot-like instead of a pure spin in place.
const TURN_FORCE_OFF: f32 = 250.0;
/// Turret swing rate, radians per second.
const TURRET_TURN_RATE: f32 = PI;
/// How fast the idle damping scalars fall from 1 to 0, per second.
const DAMPING_DECAY: f32 = 2.0;

pub struct TankManager {
    presentation: Rc<dyn PresentationSink>,
}
impl TankManager {
    pub fn new(presentation: Rc<dyn PresentationSink>) -> Self {
        Self { presentation }
    }

    pub fn pre_step(
        &self,
        dt: f32,
        physics: &mut PhysicsWorld,
        tanks: &mut [Tank],
        rng: &mut impl Rng,
    ) {
        for tank in tanks.iter_mut() {
            // Cooldown runs down whether or not the trigger is held.
            tank.fire_cooldown = (tank.fire_cooldown - dt).max(0.0);

            if !tank.alive {
                tank.prev_input = tank.input;
                continue;
            }

            tank.update_ai(dt, rng);

            let rot = physics.transform(tank.hull).rotation;
            let forward = rot * na::Vector3::z();
            let right = rot * na::Vector3::x();
            let up = rot * na::Vector3::y();

            physics.clear_forces(tank.hull);

            let [hw, hh, hl] = HULL_HALF_EXTENTS;

            // Locomotion: four equal forces on the face the tank is driving
            // away from, along the hull's forward axis.
            let fwd = tank.input.contains(TankInput::FORWARD);
            let back = tank.input.contains(TankInput::BACKWARD);
            if fwd != back {
                let (dir, face_z) = if fwd { (forward, hl) } else { (-forward, -hl) };
                for corner in face_corners(hw, hh, face_z) {
                    physics.add_force(tank.hull, dir * DRIVE_FORCE * dt, corner);
                }
                tank.linear_damping = 1.0;
            } else if !tank.dropping {
                tank.linear_damping = (tank.linear_damping - DAMPING_DECAY * dt).max(0.0);
                physics.add_linear_damping(tank.hull, tank.linear_damping);
            }

            // Pivot turn: lateral forces at the ground corners, stronger on
            // the turning side.
            let left = tank.input.contains(TankInput::ROTATE_LEFT);
            let turning_right = tank.input.contains(TankInput::ROTATE_RIGHT);
            if left != turning_right {
                let spin = if turning_right { 1.0 } else { -1.0 };
                for corner in ground_corners(hw, hh, hl) {
                    let axial = right * (spin * corner.z.signum());
                    let mag = if (corner.x > 0.0) == turning_right {
                        TURN_FORCE
                    } else {
                        TURN_FORCE_OFF
                    };
                    physics.add_force(tank.hull, axial * mag * dt, corner);
                }
                tank.rotational_damping = 1.0;
            } else if !tank.dropping {
                tank.rotational_damping = (tank.rotational_damping - DAMPING_DECAY * dt).max(0.0);
                physics.add_rotational_damping(tank.hull, tank.rotational_damping);
            }

            // Turret: drive the hinge motor to an offset target while
            // steered, otherwise let it coast down on the decaying damping.
            let swing_left = tank.input.contains(TankInput::TURRET_LEFT);
            let swing_right = tank.input.contains(TankInput::TURRET_RIGHT);
            if swing_left != swing_right {
                let swing = if swing_right { 1.0 } else { -1.0 };
                let target = physics.hinge_rotation(tank.hinge) + swing * TURRET_TURN_RATE * dt;
                tank.turret_damping = 1.0;
                physics.rotate_hinge(tank.hinge, target);
            } else {
                tank.turret_damping = (tank.turret_damping - DAMPING_DECAY * dt).max(0.0);
                physics.stop_hinge(tank.hinge, dt, tank.turret_damping);
            }

            // A hull that ends up with its up axis below the horizon gets
            // set back onto its yaw-only basis.
            if up.y < 0.0 {
                let yaw = forward.x.atan2(forward.z);
                physics.set_basis(
                    tank.hull,
                    na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), yaw),
                );
            }

            tank.prev_input = tank.input;
        }
    }

    pub fn post_step(&self, physics: &PhysicsWorld, tanks: &[Tank]) {
        for tank in tanks {
            if tank.alive {
                self.presentation
                    .set_transform(tank.hull_instance, &physics.transform(tank.hull));
                self.presentation
                    .set_transform(tank.turret_instance, &physics.transform(tank.turret));
            } else {
                // The wreck: four independently simulated pieces.
                for (piece, instance) in tank.pieces.iter().zip(tank.piece_instances) {
                    self.presentation
                        .set_transform(instance, &physics.transform(*piece));
                }
            }
        }
    }
}

fn face_corners(hw: f32, hh: f32, face_z: f32) -> [na::Point3<f32>; 4] {
    [
        na::Point3::new(-hw, -hh, face_z),
        na::Point3::new(hw, -hh, face_z),
        na::Point3::new(-hw, hh, face_z),
        na::Point3::new(hw, hh, face_z),
    ]
}

fn ground_corners(hw: f32, hh: f32, hl: f32) -> [na::Point3<f32>; 4] {
    [
        na::Point3::new(-hw, -hh, hl),
        na::Point3::new(hw, -hh, hl),
        na::Point3::new(-hw, -hh, -hl),
        na::Point3::new(hw, -hh, -hl),
    ]
}
