//! World-build-time configuration. Supplied once at scene construction and
//! immutable afterwards.

use crate::tank::{BULLET_HALF_EXTENT, HULL_HALF_EXTENTS, PIECE_HALF_EXTENTS, TURRET_HALF_EXTENTS};
use rapier3d::na;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    Player,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankSpawn {
    /// (x, z) on the arena floor.
    pub position: [f32; 2],
    pub yaw: f32,
    pub control: ControlKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub seed: u64,
    /// Half extent of the square arena floor.
    pub bound: f32,
    pub wall_height: f32,
    /// Backend sub-steps per simulation tick.
    pub substeps: u32,
    pub bullet_pool: usize,
    /// Maximum distance a bullet may travel from its muzzle.
    pub bullet_range: f32,
    pub gravity: f32,
    /// Tanks spawn this far up and drop onto the floor.
    pub drop_height: f32,
    pub hull_mass: f32,
    pub turret_mass: f32,
    pub piece_mass: f32,
    pub bullet_mass: f32,
    pub tanks: Vec<TankSpawn>,
}
impl Default for ArenaConfig {
    fn default() -> Self {
        let spawn = 12.0f32;
        let tanks = [
            [-spawn, -spawn],
            [spawn, -spawn],
            [spawn, spawn],
            [-spawn, spawn],
        ]
        .into_iter()
        .map(|position| TankSpawn {
            position,
            // Face the arena center.
            yaw: (-position[0]).atan2(-position[1]),
            control: ControlKind::Ai,
        })
        .collect();

        Self {
            seed: 0,
            bound: 24.0,
            wall_height: 3.0,
            substeps: 1,
            bullet_pool: 50,
            bullet_range: 60.0,
            gravity: -9.81,
            drop_height: 2.0,
            hull_mass: 5.0,
            turret_mass: 1.0,
            piece_mass: 1.0,
            bullet_mass: 0.1,
            tanks,
        }
    }
}
impl ArenaConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}

/// Meshes the simulation needs collision shapes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mesh {
    Hull,
    Turret,
    Piece,
    Bullet,
    Ground,
    Wall,
}

pub type MeshVertices = SmallVec<[na::Point3<f32>; 8]>;

/// Provides a convex point cloud per mesh. The game feeds loaded mesh
/// vertices through this; tests and the headless binary use [`BoxShapes`].
pub trait ShapeSource {
    fn vertices(&self, mesh: Mesh) -> MeshVertices;
}

/// Box hulls matching the arena dimensions.
pub struct BoxShapes {
    ground_half: [f32; 3],
    wall_half: [f32; 3],
}
impl BoxShapes {
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            ground_half: [config.bound + 2.0, 0.5, config.bound + 2.0],
            wall_half: [0.5, config.wall_height * 0.5, config.bound + 1.0],
        }
    }
}
impl ShapeSource for BoxShapes {
    fn vertices(&self, mesh: Mesh) -> MeshVertices {
        let b = BULLET_HALF_EXTENT;
        match mesh {
            Mesh::Hull => box_points(HULL_HALF_EXTENTS),
            Mesh::Turret => box_points(TURRET_HALF_EXTENTS),
            Mesh::Piece => box_points(PIECE_HALF_EXTENTS),
            Mesh::Bullet => box_points([b, b, b]),
            Mesh::Ground => box_points(self.ground_half),
            Mesh::Wall => box_points(self.wall_half),
        }
    }
}

fn box_points(half: [f32; 3]) -> MeshVertices {
    let [hx, hy, hz] = half;
    let mut points = MeshVertices::new();
    for x in [-hx, hx] {
        for y in [-hy, hy] {
            for z in [-hz, hz] {
                points.push(na::Point3::new(x, y, z));
            }
        }
    }
    points
}

// ####################################################################################
// ################################### TEST ###########################################
// ####################################################################################
