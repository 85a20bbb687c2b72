use crate::physics::{BodyHandle, HingeHandle};
use bitflags::bitflags;
use rand::Rng;

pub const TANK_HEALTH: i32 = 2;

/// Delay between shots, seconds.
pub const FIRE_DELAY: f32 = 0.5;

/// How often an AI tank re-rolls its intent, seconds.
pub const AI_DECISION_INTERVAL: f32 = 0.5;

pub const HULL_HALF_EXTENTS: [f32; 3] = [0.9, 0.35, 1.2];
pub const TURRET_HALF_EXTENTS: [f32; 3] = [0.45, 0.25, 0.7];
pub const PIECE_HALF_EXTENTS: [f32; 3] = [0.45, 0.18, 0.6];
pub const BULLET_HALF_EXTENT: f32 = 0.12;

bitflags! {
    /// Movement intent for one tick. Local convention: +z is forward,
    /// left turns are counter-clockwise seen from above.
    pub struct TankInput: u8 {
        const FORWARD = 1 << 0;
        const BACKWARD = 1 << 1;
        const ROTATE_LEFT = 1 << 2;
        const ROTATE_RIGHT = 1 << 3;
        const TURRET_LEFT = 1 << 4;
        const TURRET_RIGHT = 1 << 5;
        const FIRE = 1 << 6;
    }
}

/// Who steers this tank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TankKind {
    Player,
    Ai {
        /// Countdown to the next intent re-roll.
        next_decision: f32,
    },
}
impl TankKind {
    pub fn ai() -> Self {
        Self::Ai { next_decision: 0.0 }
    }
}

pub struct Tank {
    pub kind: TankKind,

    pub alive: bool,
    pub health: i32,
    /// Set while falling in after spawn. Suppresses idle damping until the
    /// first ground contact so the drop does not feel sluggish.
    pub dropping: bool,

    pub input: TankInput,
    pub prev_input: TankInput,

    pub linear_damping: f32,
    pub rotational_damping: f32,
    pub turret_damping: f32,
    pub fire_cooldown: f32,

    pub hull: BodyHandle,
    pub turret: BodyHandle,
    pub hinge: HingeHandle,
    pub pieces: [BodyHandle; 4],

    pub hull_instance: u32,
    pub turret_instance: u32,
    pub piece_instances: [u32; 4],
}
impl Tank {
    pub fn new(
        kind: TankKind,
        hull: BodyHandle,
        turret: BodyHandle,
        hinge: HingeHandle,
        pieces: [BodyHandle; 4],
        hull_instance: u32,
        turret_instance: u32,
        piece_instances: [u32; 4],
    ) -> Self {
        Self {
            kind,
            alive: true,
            health: TANK_HEALTH,
            dropping: true,
            input: TankInput::empty(),
            prev_input: TankInput::empty(),
            linear_damping: 1.0,
            rotational_damping: 1.0,
            turret_damping: 1.0,
            fire_cooldown: 0.0,
            hull,
            turret,
            hinge,
            pieces,
            hull_instance,
            turret_instance,
            piece_instances,
        }
    }

    /// Re-roll intent when the decision countdown expires. Reads last tick's
    /// intent so the tank mostly keeps its momentum. No-op for players.
    pub fn update_ai(&mut self, dt: f32, rng: &mut impl Rng) {
        let TankKind::Ai { next_decision } = &mut self.kind else {
            return;
        };
        *next_decision -= dt;
        if *next_decision > 0.0 {
            return;
        }
        *next_decision = AI_DECISION_INTERVAL;
        self.input = roll_intent(self.prev_input, rng);
    }
}

fn roll_intent(prev: TankInput, rng: &mut impl Rng) -> TankInput {
    let mut input = TankInput::empty();

    if rng.gen_bool(0.25) {
        input |= TankInput::FIRE;
    }

    // Drive: mostly keep going the way we were already going.
    let drive_bits = TankInput::FORWARD | TankInput::BACKWARD;
    let drive = prev & drive_bits;
    input |= if drive.is_empty() {
        TankInput::FORWARD
    } else if rng.gen_bool(0.8) {
        drive
    } else {
        drive ^ drive_bits
    };

    let turn_bits = TankInput::ROTATE_LEFT | TankInput::ROTATE_RIGHT;
    let turn = prev & turn_bits;
    if turn.is_empty() {
        if rng.gen_bool(0.4) {
            input |= if rng.gen_bool(0.5) {
                TankInput::ROTATE_LEFT
            } else {
                TankInput::ROTATE_RIGHT
            };
        }
    } else {
        input |= if rng.gen_bool(0.7) { turn } else { turn ^ turn_bits };
    }

    let swing_bits = TankInput::TURRET_LEFT | TankInput::TURRET_RIGHT;
    let swing = prev & swing_bits;
    input |= if swing.is_empty() {
        if rng.gen_bool(0.5) {
            TankInput::TURRET_LEFT
        } else {
            TankInput::TURRET_RIGHT
        }
    } else if rng.gen_bool(0.6) {
        swing
    } else {
        swing ^ swing_bits
    };

    input
}

// ####################################################################################
// ################################### TEST ###########################################
// ####################################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn rolled_intent_is_well_formed() {
        let mut rng = crate::SimRng::seed_from_u64(7);
        let mut prev = TankInput::empty();
        for _ in 0..1000 {
            let input = roll_intent(prev, &mut rng);

            // Exactly one drive direction, never both.
            assert_ne!(
                input & (TankInput::FORWARD | TankInput::BACKWARD),
                TankInput::FORWARD | TankInput::BACKWARD
            );
            assert!(!(input & (TankInput::FORWARD | TankInput::BACKWARD)).is_empty());

            // Turn and turret swings are one-sided too.
            assert_ne!(
                input & (TankInput::ROTATE_LEFT | TankInput::ROTATE_RIGHT),
                TankInput::ROTATE_LEFT | TankInput::ROTATE_RIGHT
            );
            assert_ne!(
                input & (TankInput::TURRET_LEFT | TankInput::TURRET_RIGHT),
                TankInput::TURRET_LEFT | TankInput::TURRET_RIGHT
            );

            prev = input;
        }
    }

    #[test]
    fn ai_decision_respects_interval() {
        let mut rng = crate::SimRng::seed_from_u64(1);
        let mut tank = Tank::new(
            TankKind::ai(),
            crate::physics::BodyHandle(0),
            crate::physics::BodyHandle(1),
            HingeHandle(0),
            [
                crate::physics::BodyHandle(2),
                crate::physics::BodyHandle(3),
                crate::physics::BodyHandle(4),
                crate::physics::BodyHandle(5),
            ],
            0,
            1,
            [2, 3, 4, 5],
        );

        // First update fires immediately (countdown starts expired).
        tank.update_ai(0.01, &mut rng);
        let first = tank.input;
        assert!(!first.is_empty());

        // Within the interval the intent must not change.
        tank.prev_input = tank.input;
        tank.update_ai(AI_DECISION_INTERVAL * 0.5, &mut rng);
        assert_eq!(tank.input, first);
    }
}
