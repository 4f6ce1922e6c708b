//! Capsule ground classification and sweep-and-slide collision resolution.
//!
//! The agent is a vertical capsule moved through an injected
//! [`GeometryQuery`] service. Every query shrinks the shape by the skin
//! width so resting contacts keep a small separation and repeated sweeps
//! stay out of penetration.
#![forbid(unsafe_code)]

use geometry_query::{GeometryQuery, QueryError};
use movement_core::logging;
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::{ColliderHandle, Real};

/// Squared-length threshold below which a displacement is treated as zero
/// motion: no queries, no contacts.
pub const MOTION_EPSILON: Real = 1.0e-5;
/// Leftover sweep distance below this is dropped instead of slid.
const SLIDE_MIN_DISTANCE: Real = 1.0e-3;
/// Surfaces tilted past this count as slopes at all.
const SLOPE_MIN_ANGLE: Real = 0.1 * (std::f32::consts::PI / 180.0);
/// Contacts at or past this angle from up are ceiling-like.
const CEILING_ANGLE: Real = 135.0 * (std::f32::consts::PI / 180.0);

#[derive(Clone, Copy, Debug)]
pub struct CollisionProfile {
    /// Capsule radius in meters.
    pub capsule_radius: Real,
    /// Capsule cylinder height in meters (distance between sphere centers).
    pub capsule_height: Real,
    /// Capsule center offset relative to the agent position.
    pub center_offset: Vector<Real>,
    /// Inward shape shrink applied to every query.
    pub skin_width: Real,
    /// Maximum walkable slope angle in radians.
    pub max_ground_angle: Real,
    /// Downward probe distance for the per-tick ground check.
    pub ground_check_distance: Real,
    /// Sweep-and-slide iteration cap.
    pub max_move_iterations: u32,
    /// Overlap resolution iteration cap.
    pub max_overlap_iterations: u32,
}

impl Default for CollisionProfile {
    fn default() -> Self {
        Self {
            capsule_radius: 0.4,
            capsule_height: 1.4,
            center_offset: Vector::zeros(),
            skin_width: 0.02,
            max_ground_angle: 45.0_f32.to_radians(),
            ground_check_distance: 0.2,
            max_move_iterations: 3,
            max_overlap_iterations: 3,
        }
    }
}

impl CollisionProfile {
    /// A malformed profile degrades every query to "airborne, no movement"
    /// instead of erroring.
    pub fn is_valid(&self) -> bool {
        self.capsule_radius.is_finite()
            && self.capsule_height.is_finite()
            && self.skin_width.is_finite()
            && self.max_ground_angle.is_finite()
            && self.ground_check_distance.is_finite()
            && self.center_offset.iter().all(|value| value.is_finite())
            && self.skin_width > 0.0
            && self.capsule_radius > self.skin_width
            && self.capsule_height > 0.0
            && self.max_ground_angle > 0.0
            && self.max_ground_angle < std::f32::consts::FRAC_PI_2
            && self.ground_check_distance >= 0.0
            && self.max_move_iterations >= 1
            && self.max_overlap_iterations >= 1
    }

    /// World-space sphere centers of the capsule ends at `position`.
    fn capsule_segment(&self, position: Point<Real>) -> (Point<Real>, Point<Real>) {
        let center = position + self.center_offset;
        let half = Vector::y() * (self.capsule_height * 0.5);
        (center - half, center + half)
    }
}

/// Contact classification by angle between the surface normal and world-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactKind {
    Ground,
    Wall,
    Ceiling,
}

impl ContactKind {
    pub fn classify(angle: Real, max_ground_angle: Real) -> Self {
        if angle <= max_ground_angle {
            ContactKind::Ground
        } else if angle < CEILING_ANGLE {
            ContactKind::Wall
        } else {
            ContactKind::Ceiling
        }
    }
}

/// One collision encountered during a move. Contacts produced by overlap
/// resolution are synthetic and carry no contact point.
#[derive(Clone, Copy, Debug)]
pub struct Contact {
    pub point: Option<Point<Real>>,
    pub normal: Vector<Real>,
    /// Angle between `normal` and world-up, radians.
    pub angle: Real,
    pub kind: ContactKind,
    pub collider: ColliderHandle,
}

/// Result of the per-tick downward probe.
#[derive(Clone, Copy, Debug)]
pub struct GroundState {
    pub grounded: bool,
    pub on_slope: bool,
    pub steep_slope: bool,
    pub normal: Vector<Real>,
    pub point: Point<Real>,
    /// Angle between the surface normal and up, radians.
    pub angle: Real,
    /// Measured gap between the resting capsule and the surface.
    pub distance: Real,
}

impl Default for GroundState {
    fn default() -> Self {
        Self {
            grounded: false,
            on_slope: false,
            steep_slope: false,
            normal: Vector::zeros(),
            point: Point::origin(),
            angle: 0.0,
            distance: 0.0,
        }
    }
}

/// Outcome of one displacement request.
#[derive(Clone, Debug)]
pub struct MoveResult {
    pub start: Point<Real>,
    pub end: Point<Real>,
    pub attempted: Vector<Real>,
    pub actual: Vector<Real>,
    pub collided: bool,
    /// Contacts in resolution order; sweep contacts first, then synthetic
    /// overlap contacts.
    pub contacts: Vec<Contact>,
    /// Motion left over when the iteration cap ran out before convergence.
    pub residual: Vector<Real>,
}

impl MoveResult {
    fn zero(start: Point<Real>, attempted: Vector<Real>) -> Self {
        Self {
            start,
            end: start,
            attempted,
            actual: Vector::zeros(),
            collided: false,
            contacts: Vec::new(),
            residual: Vector::zeros(),
        }
    }
}

/// Angle between a (unit) surface normal and world-up, radians.
pub fn angle_from_up(normal: Vector<Real>) -> Real {
    angle_between_up(normal, Vector::y())
}

fn angle_between_up(normal: Vector<Real>, up: Vector<Real>) -> Real {
    normal.dot(&up).clamp(-1.0, 1.0).acos()
}

/// Ground classifier and sweep-and-slide resolver for one capsule agent.
/// Positions flow in and out; the agent's transform is owned by the caller.
pub struct CharacterSweep {
    profile: CollisionProfile,
}

impl CharacterSweep {
    pub fn new(profile: CollisionProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> CollisionProfile {
        self.profile
    }

    pub fn set_profile(&mut self, profile: CollisionProfile) {
        self.profile = profile;
    }

    /// Samples the surface beneath the agent: a sphere of radius
    /// `capsule_radius - skin_width` cast down from the bottom sphere center
    /// for `distance + skin_width`.
    pub fn check_ground(
        &self,
        world: &dyn GeometryQuery,
        position: Point<Real>,
        distance: Real,
    ) -> Result<GroundState, QueryError> {
        self.check_ground_in_direction(world, position, -Vector::y(), distance)
    }

    /// Directional ground check; thresholds are measured against the
    /// opposite of `direction` instead of world-up.
    pub fn check_ground_in_direction(
        &self,
        world: &dyn GeometryQuery,
        position: Point<Real>,
        direction: Vector<Real>,
        distance: Real,
    ) -> Result<GroundState, QueryError> {
        if !self.profile.is_valid() {
            logging::warn("ground check skipped: capsule profile invalid, treating as airborne");
            return Ok(GroundState::default());
        }
        let skin = self.profile.skin_width;
        let probe_radius = self.profile.capsule_radius - skin;
        let (bottom, _) = self.profile.capsule_segment(position);
        let hit = world.sphere_sweep(bottom, probe_radius, direction, distance + skin)?;
        let Some(hit) = hit else {
            return Ok(GroundState::default());
        };
        let reference_up = -direction.normalize();
        let angle = angle_between_up(hit.normal, reference_up);
        let measured = hit.distance - skin;
        let on_slope = angle > SLOPE_MIN_ANGLE;
        let steep_slope = angle > self.profile.max_ground_angle;
        Ok(GroundState {
            grounded: measured <= distance && !steep_slope,
            on_slope,
            steep_slope,
            normal: hit.normal,
            point: hit.point,
            angle,
            distance: measured,
        })
    }

    /// Advances the agent by `displacement`, stopping at first contact and
    /// sliding the remainder along contact planes, then pushes the capsule
    /// out of any residual penetration.
    pub fn move_by(
        &self,
        world: &dyn GeometryQuery,
        position: Point<Real>,
        displacement: Vector<Real>,
    ) -> Result<MoveResult, QueryError> {
        if !self.profile.is_valid() {
            logging::warn("move skipped: capsule profile invalid");
            return Ok(MoveResult::zero(position, displacement));
        }
        if displacement.norm_squared() < MOTION_EPSILON {
            return Ok(MoveResult::zero(position, displacement));
        }

        let skin = self.profile.skin_width;
        let radius = self.profile.capsule_radius - skin;
        let mut pos = position;
        let mut remaining = displacement;
        let mut contacts = Vec::new();

        let mut iterations = 0;
        while iterations < self.profile.max_move_iterations
            && remaining.norm_squared() >= MOTION_EPSILON
        {
            let distance = remaining.norm();
            let direction = remaining / distance;
            let (bottom, top) = self.profile.capsule_segment(pos);
            match world.capsule_sweep(bottom, top, radius, direction, distance + skin)? {
                None => {
                    pos += remaining;
                    remaining = Vector::zeros();
                }
                Some(hit) => {
                    let advance = (hit.distance - skin).max(0.0);
                    pos += direction * advance;
                    let angle = angle_from_up(hit.normal);
                    contacts.push(Contact {
                        point: Some(hit.point),
                        normal: hit.normal,
                        angle,
                        kind: ContactKind::classify(angle, self.profile.max_ground_angle),
                        collider: hit.collider,
                    });
                    let leftover = distance - advance;
                    remaining = if leftover > SLIDE_MIN_DISTANCE {
                        let leftover_motion = direction * leftover;
                        leftover_motion - hit.normal * leftover_motion.dot(&hit.normal)
                    } else {
                        Vector::zeros()
                    };
                }
            }
            iterations += 1;
        }

        let residual = if remaining.norm_squared() < MOTION_EPSILON {
            Vector::zeros()
        } else {
            remaining
        };
        let end = self.resolve_overlaps(world, pos, &mut contacts)?;

        Ok(MoveResult {
            start: position,
            end,
            attempted: displacement,
            actual: end - position,
            collided: !contacts.is_empty(),
            contacts,
            residual,
        })
    }

    /// Teleports the agent down onto ground within `max_distance`, unless
    /// the surface is steep. Returns the snapped position.
    pub fn snap_to_ground(
        &self,
        world: &dyn GeometryQuery,
        position: Point<Real>,
        max_distance: Real,
    ) -> Result<Option<Point<Real>>, QueryError> {
        let state = self.check_ground(world, position, max_distance)?;
        if state.grounded {
            Ok(Some(position - Vector::y() * state.distance.max(0.0)))
        } else {
            Ok(None)
        }
    }

    /// Iteratively pushes the capsule out of every overlapping collider,
    /// deepest penetration first. Each push is recorded as a synthetic
    /// contact with no contact point.
    fn resolve_overlaps(
        &self,
        world: &dyn GeometryQuery,
        position: Point<Real>,
        contacts: &mut Vec<Contact>,
    ) -> Result<Point<Real>, QueryError> {
        let skin = self.profile.skin_width;
        let radius = self.profile.capsule_radius - skin;
        let mut pos = position;
        for _ in 0..self.profile.max_overlap_iterations {
            let (bottom, top) = self.profile.capsule_segment(pos);
            let overlapping = world.capsule_overlap(bottom, top, radius)?;
            let mut pushes = Vec::new();
            for handle in overlapping {
                if let Some(push) = world.penetration(bottom, top, radius, handle)? {
                    pushes.push((push, handle));
                }
            }
            if pushes.is_empty() {
                break;
            }
            // Deepest first keeps multi-overlap resolution order stable.
            pushes.sort_by(|a, b| {
                b.0.depth
                    .partial_cmp(&a.0.depth)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for (push, handle) in pushes {
                pos += push.direction * (push.depth + skin);
                let angle = angle_from_up(push.direction);
                contacts.push(Contact {
                    point: None,
                    normal: push.direction,
                    angle,
                    kind: ContactKind::classify(angle, self.profile.max_ground_angle),
                    collider: handle,
                });
            }
        }
        Ok(pos)
    }
}
