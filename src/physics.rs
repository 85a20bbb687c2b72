//! The only module that talks to the rigid-body backend.
//!
//! Everything outside holds plain index handles into tables owned here.
//! Table entries are never removed: bodies are pulled in and out of the
//! stepped world with [`PhysicsWorld::set_in_world`], so a handle issued at
//! build time stays valid for the whole session.

use ahash::AHashMap;
use rapier3d::prelude::*;

pub const DEFAULT_BODY_FRICTION: f32 = 0.3;
pub const DEFAULT_BODY_RESTITUTION: f32 = 0.2;

/// Motor gains used when driving a hinge toward a target angle.
const HINGE_MOTOR_STIFFNESS: f32 = 60.0;
const HINGE_MOTOR_DAMPING: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HingeHandle(pub u32);

/// What a body is, gameplay-wise. Stored in the side table so a contact can
/// be walked back to the entity it belongs to without touching backend
/// user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tank,
    Bullet,
    Ground,
    Wall,
    Debris,
}

/// One side of a contact, resolved to its gameplay entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEntity {
    pub kind: EntityKind,
    pub index: u32,
    pub body: BodyHandle,
}

/// Everything needed to create a body. Mass `0.0` makes a static body.
pub struct BodyDef {
    pub position: Isometry<Real>,
    pub shape: ShapeHandle,
    pub mass: f32,
    pub group: u32,
    /// When set, this body only collides with bodies of exactly that group.
    pub mask: Option<u32>,
    pub kind: EntityKind,
    pub index: u32,
    pub process_events: bool,
    pub com_offset: Vector<Real>,
    pub ccd: bool,
}
impl BodyDef {
    pub fn new(
        position: Isometry<Real>,
        shape: ShapeHandle,
        mass: f32,
        group: u32,
        kind: EntityKind,
        index: u32,
    ) -> Self {
        Self {
            position,
            shape,
            mass,
            group,
            mask: None,
            kind,
            index,
            process_events: true,
            com_offset: Vector::zeros(),
            ccd: false,
        }
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_events(mut self, process_events: bool) -> Self {
        self.process_events = process_events;
        self
    }

    pub fn with_com_offset(mut self, com_offset: Vector<Real>) -> Self {
        self.com_offset = com_offset;
        self
    }

    pub fn with_ccd(mut self) -> Self {
        self.ccd = true;
        self
    }
}

struct BodyRecord {
    rb: RigidBodyHandle,
    collider: ColliderHandle,
    kind: EntityKind,
    index: u32,
    group: u32,
    mask: Option<u32>,
    process_events: bool,
    in_world: bool,
}

pub struct PhysicsWorld {
    gravity: Vector<Real>,
    substeps: u32,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    shapes: Vec<SharedShape>,
    records: Vec<BodyRecord>,
    hinges: Vec<ImpulseJointHandle>,
    collider_lookup: AHashMap<ColliderHandle, BodyHandle>,
}
impl PhysicsWorld {
    pub fn new(gravity: f32, substeps: u32) -> Self {
        Self {
            gravity: vector![0.0, gravity, 0.0],
            substeps: substeps.max(1),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: Default::default(),
            islands: Default::default(),
            broad_phase: Default::default(),
            narrow_phase: Default::default(),
            bodies: Default::default(),
            colliders: Default::default(),
            impulse_joints: Default::default(),
            multibody_joints: Default::default(),
            ccd_solver: Default::default(),
            query_pipeline: Default::default(),
            shapes: Default::default(),
            records: Default::default(),
            hinges: Default::default(),
            collider_lookup: Default::default(),
        }
    }

    /// Build a convex hull shape from a point cloud.
    ///
    /// Degenerate input (coplanar or too few points) is a content error and
    /// aborts scene construction.
    pub fn add_shape(&mut self, points: &[Point<Real>]) -> anyhow::Result<ShapeHandle> {
        let shape = SharedShape::convex_hull(points)
            .ok_or_else(|| anyhow::anyhow!("degenerate convex hull from {} points", points.len()))?;
        self.shapes.push(shape);
        Ok(ShapeHandle(self.shapes.len() as u32 - 1))
    }

    /// Create a body and add it to the stepped world immediately.
    ///
    /// # Panics
    /// The shape handle is invalid.
    pub fn add_body(&mut self, def: BodyDef) -> BodyHandle {
        let shape = self.shapes[def.shape.0 as usize].clone();

        let mut builder = if def.mass == 0.0 {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        }
        .position(def.position)
        .ccd_enabled(def.ccd);

        if def.mass != 0.0 {
            // Inertia comes from the shape, scaled to the requested mass,
            // with the center of mass optionally shifted.
            let unit = shape.mass_properties(1.0);
            let mut mprops = shape.mass_properties(def.mass / unit.mass());
            mprops.local_com += def.com_offset;
            builder = builder.additional_mass_properties(mprops);
        }

        let rb = self.bodies.insert(builder.build());

        let coll = ColliderBuilder::new(shape)
            .density(0.0)
            .friction(DEFAULT_BODY_FRICTION)
            .restitution(DEFAULT_BODY_RESTITUTION)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .user_data(pack_filter(def.group, def.mask))
            .build();
        let collider = self.colliders.insert_with_parent(coll, rb, &mut self.bodies);

        let handle = BodyHandle(self.records.len() as u32);
        self.collider_lookup.insert(collider, handle);
        self.records.push(BodyRecord {
            rb,
            collider,
            kind: def.kind,
            index: def.index,
            group: def.group,
            mask: def.mask,
            process_events: def.process_events,
            in_world: true,
        });
        handle
    }

    /// Add or remove a body from the stepped world without destroying it.
    pub fn set_in_world(&mut self, handle: BodyHandle, enabled: bool) {
        let rec = &mut self.records[handle.0 as usize];
        rec.in_world = enabled;
        self.bodies[rec.rb].set_enabled(enabled);
    }

    pub fn in_world(&self, handle: BodyHandle) -> bool {
        self.records[handle.0 as usize].in_world
    }

    /// Rewrite the broadphase filter group live.
    pub fn set_group(&mut self, handle: BodyHandle, group: u32) {
        let rec = &mut self.records[handle.0 as usize];
        rec.group = group;
        self.colliders[rec.collider].user_data = pack_filter(group, rec.mask);
    }

    pub fn group(&self, handle: BodyHandle) -> u32 {
        self.records[handle.0 as usize].group
    }

    pub fn add_force(&mut self, handle: BodyHandle, force: Vector<Real>, local_pivot: Point<Real>) {
        let rb = self.body_mut(handle);
        let point = *rb.position() * local_pivot;
        rb.add_force_at_point(force, point, true);
    }

    pub fn add_impulse(
        &mut self,
        handle: BodyHandle,
        impulse: Vector<Real>,
        local_pivot: Point<Real>,
    ) {
        let rb = self.body_mut(handle);
        let point = *rb.position() * local_pivot;
        rb.apply_impulse_at_point(impulse, point, true);
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, linvel: Vector<Real>) {
        self.body_mut(handle).set_linvel(linvel, true);
    }

    pub fn velocity(&self, handle: BodyHandle) -> Vector<Real> {
        *self.body(handle).linvel()
    }

    pub fn reset_velocity_and_force(&mut self, handle: BodyHandle) {
        let rb = self.body_mut(handle);
        rb.set_linvel(Vector::zeros(), true);
        rb.set_angvel(Vector::zeros(), true);
        rb.reset_forces(true);
        rb.reset_torques(true);
    }

    /// Clear accumulated external forces/torques. The backend keeps applied
    /// forces until told otherwise, so per-tick force writers call this
    /// before re-applying.
    pub fn clear_forces(&mut self, handle: BodyHandle) {
        let rb = self.body_mut(handle);
        rb.reset_forces(true);
        rb.reset_torques(true);
    }

    /// Multiply the current linear velocity by `scalar`. A decay, not a force.
    pub fn add_linear_damping(&mut self, handle: BodyHandle, scalar: f32) {
        let rb = self.body_mut(handle);
        let linvel = *rb.linvel();
        rb.set_linvel(linvel * scalar, true);
    }

    /// Multiply the current angular velocity by `scalar`. A decay, not a force.
    pub fn add_rotational_damping(&mut self, handle: BodyHandle, scalar: f32) {
        let rb = self.body_mut(handle);
        let angvel = *rb.angvel();
        rb.set_angvel(angvel * scalar, true);
    }

    pub fn set_friction(&mut self, handle: BodyHandle, friction: f32) {
        let collider = self.records[handle.0 as usize].collider;
        self.colliders[collider].set_friction(friction);
    }

    /// Per-body gravity override as a multiplier on world gravity.
    pub fn set_gravity_scale(&mut self, handle: BodyHandle, scale: f32) {
        self.body_mut(handle).set_gravity_scale(scale, true);
    }

    /// The backend's own built-in velocity decay, distinct from the damping
    /// scalars above.
    pub fn set_internal_damping(&mut self, handle: BodyHandle, linear: f32, angular: f32) {
        let rb = self.body_mut(handle);
        rb.set_linear_damping(linear);
        rb.set_angular_damping(angular);
    }

    /// Teleport a body to a new transform.
    pub fn set_transform(&mut self, handle: BodyHandle, transform: Isometry<Real>) {
        self.body_mut(handle).set_position(transform, true);
    }

    /// Teleport only the translation, keeping the basis.
    pub fn set_position(&mut self, handle: BodyHandle, translation: Vector<Real>) {
        self.body_mut(handle).set_translation(translation, true);
    }

    /// Replace only the basis, keeping the translation.
    pub fn set_basis(&mut self, handle: BodyHandle, rotation: Rotation<Real>) {
        let rb = self.body_mut(handle);
        let translation = rb.position().translation;
        rb.set_position(Isometry::from_parts(translation, rotation), true);
    }

    /// The transform presentation should draw at.
    pub fn transform(&self, handle: BodyHandle) -> Isometry<Real> {
        *self.body(handle).position()
    }

    /// Connect two bodies with a motorized hinge.
    ///
    /// # Panics
    /// Either body handle is invalid.
    pub fn add_hinge(
        &mut self,
        a: BodyHandle,
        b: BodyHandle,
        pivot_a: Point<Real>,
        pivot_b: Point<Real>,
        axis_a: UnitVector<Real>,
        axis_b: UnitVector<Real>,
        max_motor_force: f32,
    ) -> HingeHandle {
        let mut joint: GenericJoint = RevoluteJointBuilder::new(axis_a)
            .local_anchor1(pivot_a)
            .local_anchor2(pivot_b)
            .motor_max_force(max_motor_force)
            .build()
            .into();
        joint.set_local_axis2(axis_b);

        let rb_a = self.records[a.0 as usize].rb;
        let rb_b = self.records[b.0 as usize].rb;
        let jh = self.impulse_joints.insert(rb_a, rb_b, joint, true);
        self.hinges.push(jh);
        HingeHandle(self.hinges.len() as u32 - 1)
    }

    /// Drive the hinge motor toward `target` radians.
    pub fn rotate_hinge(&mut self, handle: HingeHandle, target: f32) {
        let jh = self.hinges[handle.0 as usize];
        let joint = self.impulse_joints.get_mut(jh).expect("invalid hinge");
        joint
            .data
            .as_revolute_mut()
            .expect("hinge is not a revolute joint")
            .set_motor_position(target, HINGE_MOTOR_STIFFNESS, HINGE_MOTOR_DAMPING);
    }

    /// Drive the motor toward where the hinge would coast to over `dt` at the
    /// given damping, so an undriven hinge winds down instead of freezing.
    pub fn stop_hinge(&mut self, handle: HingeHandle, dt: f32, damping: f32) {
        let target = self.hinge_rotation(handle) + self.hinge_velocity(handle) * dt * damping;
        self.rotate_hinge(handle, target);
    }

    /// Signed hinge angle in radians: the twist of the relative rotation of
    /// the two attached bodies about the hinge axis.
    pub fn hinge_rotation(&self, handle: HingeHandle) -> f32 {
        let jh = self.hinges[handle.0 as usize];
        let joint = self.impulse_joints.get(jh).expect("invalid hinge");
        let rot_a = self.bodies[joint.body1].position().rotation;
        let rot_b = self.bodies[joint.body2].position().rotation;
        let axis = joint.data.local_axis1().into_inner();

        let rel = rot_a.inverse() * rot_b;
        let q = rel.quaternion();
        2.0 * q.vector().dot(&axis).atan2(q.w)
    }

    /// Relative angular velocity of the attached bodies about the hinge axis.
    pub fn hinge_velocity(&self, handle: HingeHandle) -> f32 {
        let jh = self.hinges[handle.0 as usize];
        let joint = self.impulse_joints.get(jh).expect("invalid hinge");
        let body_a = &self.bodies[joint.body1];
        let body_b = &self.bodies[joint.body2];
        let world_axis = body_a.position().rotation * joint.data.local_axis1().into_inner();
        (body_b.angvel() - body_a.angvel()).dot(&world_axis)
    }

    /// Advance the world by `dt`, split into the configured sub-steps.
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt / self.substeps as f32;
        self.integration_parameters.min_ccd_dt = self.integration_parameters.dt / 100.0;

        for _ in 0..self.substeps {
            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &Hooks,
                &(),
            );
        }
    }

    /// Body pairs with an active contact manifold after the last step.
    pub fn active_contacts(&self) -> impl Iterator<Item = (BodyHandle, BodyHandle)> + '_ {
        self.narrow_phase
            .contact_pairs()
            .filter(|pair| pair.has_any_active_contact)
            .filter_map(|pair| {
                let a = *self.collider_lookup.get(&pair.collider1)?;
                let b = *self.collider_lookup.get(&pair.collider2)?;
                Some((a, b))
            })
    }

    /// Walk a contact pair back to its gameplay entities. `None` when either
    /// side has event processing disabled.
    pub fn contact_entities(
        &self,
        a: BodyHandle,
        b: BodyHandle,
    ) -> Option<(ContactEntity, ContactEntity)> {
        let rec_a = &self.records[a.0 as usize];
        let rec_b = &self.records[b.0 as usize];
        if !rec_a.process_events || !rec_b.process_events {
            return None;
        }
        Some((
            ContactEntity {
                kind: rec_a.kind,
                index: rec_a.index,
                body: a,
            },
            ContactEntity {
                kind: rec_b.kind,
                index: rec_b.index,
                body: b,
            },
        ))
    }

    fn body(&self, handle: BodyHandle) -> &RigidBody {
        &self.bodies[self.records[handle.0 as usize].rb]
    }

    fn body_mut(&mut self, handle: BodyHandle) -> &mut RigidBody {
        &mut self.bodies[self.records[handle.0 as usize].rb]
    }
}

// Collider user data, from low to high bits in chunks of 32:
// - filter group
// - filter mask (MASK_NONE when unset)
// Only what the pair filter hook needs at broadphase time. Entity identity
// lives in the side table, not here.
const MASK_NONE: u32 = u32::MAX;

fn pack_filter(group: u32, mask: Option<u32>) -> u128 {
    group as u128 | (mask.unwrap_or(MASK_NONE) as u128) << 32
}

fn filter_group(data: u128) -> u32 {
    data as u32
}

fn filter_mask(data: u128) -> u32 {
    (data >> 32) as u32
}

/// Same group never collides. If either side carries a mask, the pair only
/// collides when one side's mask equals the other side's group. Otherwise
/// the pair collides.
fn filter_allows(a: u128, b: u128) -> bool {
    let (group_a, group_b) = (filter_group(a), filter_group(b));
    if group_a == group_b {
        return false;
    }
    let (mask_a, mask_b) = (filter_mask(a), filter_mask(b));
    if mask_a != MASK_NONE || mask_b != MASK_NONE {
        return mask_a == group_b || mask_b == group_a;
    }
    true
}

struct Hooks;
impl PhysicsHooks for Hooks {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let a = context.colliders[context.collider1].user_data;
        let b = context.colliders[context.collider2].user_data;
        filter_allows(a, b).then_some(SolverFlags::COMPUTE_IMPULSES)
    }

    fn filter_intersection_pair(&self, context: &PairFilterContext) -> bool {
        filter_allows(
            context.colliders[context.collider1].user_data,
            context.colliders[context.collider2].user_data,
        )
    }

    fn modify_solver_contacts(&self, _context: &mut ContactModificationContext) {}
}

// ####################################################################################
// ################################### TEST ###########################################
// ####################################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube_points(half: f32) -> Vec<Point<Real>> {
        let mut points = Vec::new();
        for x in [-half, half] {
            for y in [-half, half] {
                for z in [-half, half] {
                    points.push(point![x, y, z]);
                }
            }
        }
        points
    }

    fn cube_body(world: &mut PhysicsWorld, position: Isometry<Real>, group: u32) -> BodyHandle {
        let shape = world.add_shape(&cube_points(0.5)).unwrap();
        world.add_body(BodyDef::new(
            position,
            shape,
            1.0,
            group,
            EntityKind::Debris,
            0,
        ))
    }

    #[test]
    fn filter_policy() {
        let a = pack_filter(1, None);
        let b = pack_filter(2, None);
        let same = pack_filter(1, None);
        assert!(filter_allows(a, b));
        assert!(!filter_allows(a, same));

        // A mask restricts the pair to exactly that group, on either side.
        let masked = pack_filter(3, Some(2));
        assert!(filter_allows(masked, b));
        assert!(!filter_allows(masked, a));
        assert!(filter_allows(b, masked));
        assert!(!filter_allows(a, masked));
    }

    #[test]
    fn degenerate_shape_is_a_build_error() {
        let mut world = PhysicsWorld::new(-9.81, 1);
        assert!(world.add_shape(&[point![0.0, 0.0, 0.0]]).is_err());
    }

    #[test]
    fn transform_round_trip() {
        let mut world = PhysicsWorld::new(-9.81, 1);
        let body = cube_body(&mut world, Isometry::identity(), 1);

        let target = Isometry::new(vector![3.0, 2.0, -1.0], vector![0.0, 0.7, 0.0]);
        world.set_transform(body, target);

        let read = world.transform(body);
        assert_relative_eq!(read.translation.vector, target.translation.vector);
        assert_relative_eq!(read.rotation, target.rotation, epsilon = 1.0e-6);
    }

    #[test]
    fn same_group_never_touches() {
        let mut world = PhysicsWorld::new(0.0, 1);
        cube_body(&mut world, Isometry::translation(0.0, 0.0, 0.0), 7);
        cube_body(&mut world, Isometry::translation(0.2, 0.0, 0.0), 7);
        world.step(1.0 / 60.0);
        assert_eq!(world.active_contacts().count(), 0);
    }

    #[test]
    fn distinct_groups_touch() {
        let mut world = PhysicsWorld::new(0.0, 1);
        let a = cube_body(&mut world, Isometry::translation(0.0, 0.0, 0.0), 1);
        let b = cube_body(&mut world, Isometry::translation(0.2, 0.0, 0.0), 2);
        world.step(1.0 / 60.0);

        let contacts: Vec<_> = world.active_contacts().collect();
        assert_eq!(contacts.len(), 1);
        let (x, y) = contacts[0];
        assert!((x == a && y == b) || (x == b && y == a));
    }

    #[test]
    fn group_rewrite_changes_filtering_live() {
        let mut world = PhysicsWorld::new(0.0, 1);
        let a = cube_body(&mut world, Isometry::translation(0.0, 0.0, 0.0), 1);
        let b = cube_body(&mut world, Isometry::translation(0.2, 0.0, 0.0), 2);

        // The depenetration push moves the pair apart, so park them back
        // in overlap before every probe step.
        let rearm = |world: &mut PhysicsWorld| {
            world.set_transform(a, Isometry::translation(0.0, 0.0, 0.0));
            world.reset_velocity_and_force(a);
            world.set_transform(b, Isometry::translation(0.2, 0.0, 0.0));
            world.reset_velocity_and_force(b);
        };

        world.step(1.0 / 60.0);
        assert_eq!(world.active_contacts().count(), 1);

        world.set_group(b, 1);
        assert_eq!(world.group(b), 1);
        rearm(&mut world);
        world.step(1.0 / 60.0);
        assert_eq!(world.active_contacts().count(), 0);

        world.set_group(a, 3);
        rearm(&mut world);
        world.step(1.0 / 60.0);
        assert_eq!(world.active_contacts().count(), 1);
    }

    #[test]
    fn disabled_body_stops_touching() {
        let mut world = PhysicsWorld::new(0.0, 1);
        let a = cube_body(&mut world, Isometry::translation(0.0, 0.0, 0.0), 1);
        cube_body(&mut world, Isometry::translation(0.2, 0.0, 0.0), 2);

        world.step(1.0 / 60.0);
        assert_eq!(world.active_contacts().count(), 1);

        world.set_in_world(a, false);
        world.step(1.0 / 60.0);
        assert_eq!(world.active_contacts().count(), 0);
        assert!(!world.in_world(a));
    }

    #[test]
    fn velocity_damping_is_multiplicative() {
        let mut world = PhysicsWorld::new(0.0, 1);
        let body = cube_body(&mut world, Isometry::identity(), 1);
        world.set_velocity(body, vector![2.0, 0.0, 0.0]);
        world.add_linear_damping(body, 0.5);
        assert_relative_eq!(world.velocity(body), vector![1.0, 0.0, 0.0]);
        world.add_linear_damping(body, 0.0);
        assert_relative_eq!(world.velocity(body), vector![0.0, 0.0, 0.0]);
    }
}
