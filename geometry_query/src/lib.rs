//! Geometry query service: the collision-world seam the movement core talks
//! through, plus a rapier-backed implementation for hosts and tests.
//!
//! Callers pass radii and distances that are already skin-width-adjusted;
//! the service performs no inflation of its own.
#![forbid(unsafe_code)]

use std::fmt;

use rapier3d::math::{Isometry, Point, Vector};
use rapier3d::parry::query as parry_query;
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::{
    Ball, Capsule, Collider, ColliderHandle, ColliderSet, IslandManager, QueryFilter,
    QueryPipeline, Real, RigidBodySet,
};

const DIRECTION_EPSILON: Real = 1.0e-6;

/// First contact reported by a sweep. Point and normal live on the struck
/// collider, in world space.
#[derive(Clone, Copy, Debug)]
pub struct SweepHit {
    pub collider: ColliderHandle,
    /// Travel distance along the (unit) sweep direction at first contact.
    pub distance: Real,
    pub point: Point<Real>,
    pub normal: Vector<Real>,
}

/// Separation vector for one penetrating collider pair: translating the
/// querying shape by `direction * depth` resolves the overlap.
#[derive(Clone, Copy, Debug)]
pub struct PenetrationPush {
    pub direction: Vector<Real>,
    pub depth: Real,
}

#[derive(Debug)]
pub enum QueryError {
    InvalidPose(String),
    Unsupported(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidPose(msg) => write!(f, "geometry query invalid pose: {}", msg),
            QueryError::Unsupported(msg) => write!(f, "geometry query unsupported: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {}

/// Synchronous collision-world queries consumed by the movement core. The
/// hosting environment supplies the implementation; [`RapierQueryWorld`] is
/// the in-tree one.
pub trait GeometryQuery {
    fn sphere_sweep(
        &self,
        origin: Point<Real>,
        radius: Real,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Result<Option<SweepHit>, QueryError>;

    fn capsule_sweep(
        &self,
        bottom: Point<Real>,
        top: Point<Real>,
        radius: Real,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Result<Option<SweepHit>, QueryError>;

    fn capsule_overlap(
        &self,
        bottom: Point<Real>,
        top: Point<Real>,
        radius: Real,
    ) -> Result<Vec<ColliderHandle>, QueryError>;

    fn penetration(
        &self,
        bottom: Point<Real>,
        top: Point<Real>,
        radius: Real,
        handle: ColliderHandle,
    ) -> Result<Option<PenetrationPush>, QueryError>;
}

/// Rapier-backed collision world reduced to the query concern: a collider
/// set plus a query pipeline, no dynamics stepping.
pub struct RapierQueryWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    islands: IslandManager,
    query_pipeline: QueryPipeline,
}

impl Default for RapierQueryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierQueryWorld {
    pub fn new() -> Self {
        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            islands: IslandManager::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    pub fn insert_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        let handle = self.colliders.insert(collider);
        self.query_pipeline.update(&self.colliders);
        handle
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.colliders
            .remove(handle, &mut self.islands, &mut self.bodies, false);
        self.query_pipeline.update(&self.colliders);
    }

    /// Rebuilds the query acceleration structure after external collider
    /// mutation.
    pub fn refresh(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    fn unit_direction(direction: Vector<Real>) -> Result<Vector<Real>, QueryError> {
        if !direction.iter().all(|value| value.is_finite()) {
            return Err(QueryError::InvalidPose(
                "sweep direction must be finite".to_string(),
            ));
        }
        let len = direction.norm();
        if len <= DIRECTION_EPSILON {
            return Err(QueryError::InvalidPose(
                "sweep direction must be nonzero".to_string(),
            ));
        }
        Ok(direction / len)
    }

    fn check_finite_point(point: Point<Real>, what: &str) -> Result<(), QueryError> {
        if point.coords.iter().all(|value| value.is_finite()) {
            Ok(())
        } else {
            Err(QueryError::InvalidPose(format!("{} must be finite", what)))
        }
    }

    fn check_scalar(value: Real, what: &str) -> Result<(), QueryError> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(QueryError::InvalidPose(format!(
                "{} must be finite and >= 0",
                what
            )))
        }
    }

    fn cast(
        &self,
        pose: &Isometry<Real>,
        shape: &dyn rapier3d::parry::shape::Shape,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Option<SweepHit> {
        let options = ShapeCastOptions {
            max_time_of_impact: max_distance,
            target_distance: 0.0,
            stop_at_penetration: true,
            compute_impact_geometry_on_penetration: true,
        };
        self.query_pipeline
            .cast_shape(
                &self.bodies,
                &self.colliders,
                pose,
                &direction,
                shape,
                options,
                QueryFilter::default(),
            )
            .map(|(collider, hit)| SweepHit {
                collider,
                distance: hit.time_of_impact,
                point: hit.witness1,
                normal: hit.normal1.into_inner(),
            })
    }
}

impl GeometryQuery for RapierQueryWorld {
    fn sphere_sweep(
        &self,
        origin: Point<Real>,
        radius: Real,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Result<Option<SweepHit>, QueryError> {
        Self::check_finite_point(origin, "sphere origin")?;
        Self::check_scalar(radius, "sphere radius")?;
        Self::check_scalar(max_distance, "sweep distance")?;
        let direction = Self::unit_direction(direction)?;
        let shape = Ball::new(radius);
        let pose = Isometry::translation(origin.x, origin.y, origin.z);
        Ok(self.cast(&pose, &shape, direction, max_distance))
    }

    fn capsule_sweep(
        &self,
        bottom: Point<Real>,
        top: Point<Real>,
        radius: Real,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Result<Option<SweepHit>, QueryError> {
        Self::check_finite_point(bottom, "capsule bottom")?;
        Self::check_finite_point(top, "capsule top")?;
        Self::check_scalar(radius, "capsule radius")?;
        Self::check_scalar(max_distance, "sweep distance")?;
        let direction = Self::unit_direction(direction)?;
        let shape = Capsule::new(bottom, top, radius);
        Ok(self.cast(&Isometry::identity(), &shape, direction, max_distance))
    }

    fn capsule_overlap(
        &self,
        bottom: Point<Real>,
        top: Point<Real>,
        radius: Real,
    ) -> Result<Vec<ColliderHandle>, QueryError> {
        Self::check_finite_point(bottom, "capsule bottom")?;
        Self::check_finite_point(top, "capsule top")?;
        Self::check_scalar(radius, "capsule radius")?;
        let shape = Capsule::new(bottom, top, radius);
        let mut overlapping = Vec::new();
        self.query_pipeline.intersections_with_shape(
            &self.bodies,
            &self.colliders,
            &Isometry::identity(),
            &shape,
            QueryFilter::default(),
            |handle| {
                overlapping.push(handle);
                true
            },
        );
        Ok(overlapping)
    }

    fn penetration(
        &self,
        bottom: Point<Real>,
        top: Point<Real>,
        radius: Real,
        handle: ColliderHandle,
    ) -> Result<Option<PenetrationPush>, QueryError> {
        Self::check_finite_point(bottom, "capsule bottom")?;
        Self::check_finite_point(top, "capsule top")?;
        Self::check_scalar(radius, "capsule radius")?;
        let Some(collider) = self.colliders.get(handle) else {
            return Ok(None);
        };
        let capsule = Capsule::new(bottom, top, radius);
        let contact = parry_query::contact(
            &Isometry::identity(),
            &capsule,
            collider.position(),
            collider.shape(),
            0.0,
        )
        .map_err(|err| QueryError::Unsupported(err.to_string()))?;
        Ok(contact.and_then(|contact| {
            if contact.dist < 0.0 {
                // normal2 is the outward normal on the struck collider, so it
                // points from the obstacle back toward the capsule.
                Some(PenetrationPush {
                    direction: contact.normal2.into_inner(),
                    depth: -contact.dist,
                })
            } else {
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::*;

    fn world_with_floor() -> RapierQueryWorld {
        let mut world = RapierQueryWorld::new();
        let floor = ColliderBuilder::cuboid(10.0, 0.1, 10.0)
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        world.insert_static_collider(floor);
        world
    }

    #[test]
    fn sphere_sweep_reports_floor_distance_and_normal() {
        let world = world_with_floor();
        let hit = world
            .sphere_sweep(point![0.0, 1.0, 0.0], 0.25, vector![0.0, -1.0, 0.0], 5.0)
            .expect("query")
            .expect("hit");
        assert!((hit.distance - 0.75).abs() < 1.0e-3);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn capsule_sweep_stops_at_wall() {
        let mut world = RapierQueryWorld::new();
        let wall = ColliderBuilder::cuboid(0.1, 5.0, 5.0)
            .translation(vector![2.1, 0.0, 0.0])
            .build();
        world.insert_static_collider(wall);
        let hit = world
            .capsule_sweep(
                point![0.0, -0.7, 0.0],
                point![0.0, 0.7, 0.0],
                0.4,
                vector![1.0, 0.0, 0.0],
                10.0,
            )
            .expect("query")
            .expect("hit");
        assert!((hit.distance - 1.6).abs() < 1.0e-3);
        assert!(hit.normal.x < -0.99);
    }

    #[test]
    fn sweep_misses_when_nothing_ahead() {
        let world = world_with_floor();
        let hit = world
            .sphere_sweep(point![0.0, 1.0, 0.0], 0.25, vector![0.0, 1.0, 0.0], 5.0)
            .expect("query");
        assert!(hit.is_none());
    }

    #[test]
    fn overlap_and_penetration_push_out_of_floor() {
        let world = world_with_floor();
        let bottom = point![0.0, 0.3, 0.0];
        let top = point![0.0, 1.7, 0.0];
        let overlapping = world.capsule_overlap(bottom, top, 0.4).expect("query");
        assert_eq!(overlapping.len(), 1);
        let push = world
            .penetration(bottom, top, 0.4, overlapping[0])
            .expect("query")
            .expect("penetrating");
        assert!(push.direction.y > 0.99);
        assert!((push.depth - 0.1).abs() < 1.0e-3);
    }

    #[test]
    fn zero_direction_is_an_invalid_pose() {
        let world = world_with_floor();
        let result = world.sphere_sweep(point![0.0, 1.0, 0.0], 0.25, Vector::zeros(), 5.0);
        assert!(matches!(result, Err(QueryError::InvalidPose(_))));
    }

    #[test]
    fn non_finite_origin_is_an_invalid_pose() {
        let world = world_with_floor();
        let result = world.sphere_sweep(
            point![Real::NAN, 1.0, 0.0],
            0.25,
            vector![0.0, -1.0, 0.0],
            5.0,
        );
        assert!(matches!(result, Err(QueryError::InvalidPose(_))));
    }
}
