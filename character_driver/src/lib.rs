//! Per-tick motion orchestration: ground check, velocity integration,
//! sweep-and-slide resolution, and post-collision velocity correction,
//! committed atomically per tick.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fmt;

use character_motor::{MotorConfig, VelocityIntegrator};
use character_sweep::{CharacterSweep, CollisionProfile, GroundState, MoveResult};
use geometry_query::{GeometryQuery, QueryError};
use movement_core::{logging, MovementTunables};
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

/// Host-supplied input for one tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputSnapshot {
    /// Desired move direction on the XZ plane. Magnitudes above one are
    /// normalized down; analog sticks below one pass through.
    pub move_direction: [Real; 2],
    pub jump_pressed: bool,
}

/// A tick that fails leaves the driver's position and velocity exactly as
/// they were; the host can retry or drop the tick.
#[derive(Debug)]
pub enum TickError {
    Query(QueryError),
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::Query(err) => write!(f, "geometry query failed: {}", err),
        }
    }
}

impl Error for TickError {}

impl From<QueryError> for TickError {
    fn from(err: QueryError) -> Self {
        TickError::Query(err)
    }
}

/// Snapshot of the driver's committed state.
#[derive(Clone, Copy, Debug)]
pub struct MotionState {
    pub position: Point<Real>,
    pub velocity: Vector<Real>,
    pub ground: GroundState,
    pub input: InputSnapshot,
}

/// Everything one successful tick produced.
#[derive(Clone, Debug)]
pub struct MotionFrame {
    /// Ground classification sampled at the pre-move position.
    pub ground: GroundState,
    /// Post-correction velocity committed for the next tick.
    pub velocity: Vector<Real>,
    pub move_result: MoveResult,
}

/// Owns one agent's transform and velocity and advances them tick by tick
/// through an injected [`GeometryQuery`] world.
pub struct MotionDriver {
    sweep: CharacterSweep,
    motor: VelocityIntegrator,
    position: Point<Real>,
    velocity: Vector<Real>,
    ground: GroundState,
    last_input: InputSnapshot,
}

impl MotionDriver {
    pub fn new(profile: CollisionProfile, config: MotorConfig, spawn: Point<Real>) -> Self {
        Self {
            sweep: CharacterSweep::new(profile),
            motor: VelocityIntegrator::new(config),
            position: spawn,
            velocity: Vector::zeros(),
            ground: GroundState::default(),
            last_input: InputSnapshot::default(),
        }
    }

    /// Builds a driver from validated tunables. Validation errors reject the
    /// whole table; warnings are logged and construction proceeds.
    pub fn from_tunables(tunables: &MovementTunables, spawn: Point<Real>) -> Result<Self, String> {
        let validation = tunables.validate();
        if !validation.is_ok() {
            return Err(validation.errors.join("; "));
        }
        for warning in &validation.warnings {
            logging::warn(&format!("movement tunables: {}", warning));
        }
        let profile = CollisionProfile {
            capsule_radius: tunables.capsule_radius,
            capsule_height: tunables.capsule_height,
            center_offset: Vector::new(
                tunables.center_offset[0],
                tunables.center_offset[1],
                tunables.center_offset[2],
            ),
            skin_width: tunables.skin_width,
            max_ground_angle: tunables.max_ground_angle_deg.to_radians(),
            ground_check_distance: tunables.ground_check_distance,
            max_move_iterations: tunables.max_move_iterations,
            max_overlap_iterations: tunables.max_overlap_iterations,
        };
        let config = MotorConfig {
            moving_speed: tunables.moving_speed,
            air_moving_speed: tunables.air_moving_speed,
            min_start_speed: tunables.min_start_speed,
            acceleration: tunables.acceleration,
            deceleration: tunables.deceleration,
            air_acceleration: tunables.air_acceleration,
            air_deceleration: tunables.air_deceleration,
            air_drag_deceleration: tunables.air_drag_deceleration,
            gravity: tunables.gravity,
            jump_speed: tunables.jump_speed,
            ground_stick_speed: tunables.ground_stick_speed,
        };
        Ok(Self::new(profile, config, spawn))
    }

    pub fn position(&self) -> Point<Real> {
        self.position
    }

    pub fn velocity(&self) -> Vector<Real> {
        self.velocity
    }

    pub fn set_position(&mut self, position: Point<Real>) {
        self.position = position;
    }

    pub fn set_velocity(&mut self, velocity: Vector<Real>) {
        self.velocity = velocity;
    }

    pub fn state(&self) -> MotionState {
        MotionState {
            position: self.position,
            velocity: self.velocity,
            ground: self.ground,
            input: self.last_input,
        }
    }

    /// One full movement tick: classify ground at the current position,
    /// integrate velocity from input, sweep the resulting displacement, then
    /// strip velocity the contacts disallow. State is committed only if
    /// every query succeeded.
    pub fn step(
        &mut self,
        world: &dyn GeometryQuery,
        input: InputSnapshot,
        dt: Real,
    ) -> Result<MotionFrame, TickError> {
        match self.run_tick(world, input, dt) {
            Ok(frame) => {
                self.position = frame.move_result.end;
                self.velocity = frame.velocity;
                self.ground = frame.ground;
                self.last_input = input;
                Ok(frame)
            }
            Err(err) => {
                logging::warn(&format!("movement tick aborted, state unchanged: {}", err));
                Err(err)
            }
        }
    }

    fn run_tick(
        &self,
        world: &dyn GeometryQuery,
        input: InputSnapshot,
        dt: Real,
    ) -> Result<MotionFrame, TickError> {
        let probe = self.sweep.profile().ground_check_distance;
        let ground = self.sweep.check_ground(world, self.position, probe)?;
        let direction = clamp_direction(input.move_direction);
        let velocity = self
            .motor
            .integrate(self.velocity, direction, &ground, input.jump_pressed, dt);
        let move_result = self
            .sweep
            .move_by(world, self.position, velocity * dt.max(0.0))?;
        let velocity = self.motor.correct_for_contacts(velocity, &move_result.contacts);
        Ok(MotionFrame {
            ground,
            velocity,
            move_result,
        })
    }

    /// Displaces the agent outside the tick loop (teleport ramps, platform
    /// carries). Velocity is left alone.
    pub fn move_by(
        &mut self,
        world: &dyn GeometryQuery,
        displacement: Vector<Real>,
    ) -> Result<MoveResult, TickError> {
        let result = self.sweep.move_by(world, self.position, displacement)?;
        self.position = result.end;
        Ok(result)
    }

    /// Reclassifies the ground under the current position. `distance`
    /// defaults to the profile's probe distance.
    pub fn check_ground(
        &mut self,
        world: &dyn GeometryQuery,
        distance: Option<Real>,
    ) -> Result<GroundState, TickError> {
        let distance = distance.unwrap_or(self.sweep.profile().ground_check_distance);
        let ground = self.sweep.check_ground(world, self.position, distance)?;
        self.ground = ground;
        Ok(ground)
    }

    /// Drops the agent onto walkable ground within `max_distance`. Returns
    /// whether a snap happened.
    pub fn snap_to_ground(
        &mut self,
        world: &dyn GeometryQuery,
        max_distance: Real,
    ) -> Result<bool, TickError> {
        match self.sweep.snap_to_ground(world, self.position, max_distance)? {
            Some(position) => {
                self.position = position;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Caps the input direction at unit length and rejects non-finite values.
fn clamp_direction(direction: [Real; 2]) -> [Real; 2] {
    if !direction[0].is_finite() || !direction[1].is_finite() {
        logging::warn("non-finite move direction ignored");
        return [0.0, 0.0];
    }
    let len = (direction[0] * direction[0] + direction[1] * direction[1]).sqrt();
    if len > 1.0 {
        [direction[0] / len, direction[1] / len]
    } else {
        direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry_query::{PenetrationPush, RapierQueryWorld, SweepHit};
    use rapier3d::prelude::*;

    const DT: Real = 1.0 / 60.0;

    fn world_with_floor() -> RapierQueryWorld {
        let mut world = RapierQueryWorld::new();
        let floor = ColliderBuilder::cuboid(20.0, 0.1, 20.0)
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        world.insert_static_collider(floor);
        world
    }

    fn driver_on_floor() -> MotionDriver {
        MotionDriver::new(
            CollisionProfile::default(),
            MotorConfig::default(),
            point![0.0, 1.1, 0.0],
        )
    }

    fn walk(direction: [Real; 2]) -> InputSnapshot {
        InputSnapshot {
            move_direction: direction,
            jump_pressed: false,
        }
    }

    /// Every query fails, as if the collision world went away mid-frame.
    struct FailingQuery;

    impl GeometryQuery for FailingQuery {
        fn sphere_sweep(
            &self,
            _origin: Point<Real>,
            _radius: Real,
            _direction: Vector<Real>,
            _max_distance: Real,
        ) -> Result<Option<SweepHit>, QueryError> {
            Err(QueryError::Unsupported("query world offline".to_string()))
        }

        fn capsule_sweep(
            &self,
            _bottom: Point<Real>,
            _top: Point<Real>,
            _radius: Real,
            _direction: Vector<Real>,
            _max_distance: Real,
        ) -> Result<Option<SweepHit>, QueryError> {
            Err(QueryError::Unsupported("query world offline".to_string()))
        }

        fn capsule_overlap(
            &self,
            _bottom: Point<Real>,
            _top: Point<Real>,
            _radius: Real,
        ) -> Result<Vec<ColliderHandle>, QueryError> {
            Err(QueryError::Unsupported("query world offline".to_string()))
        }

        fn penetration(
            &self,
            _bottom: Point<Real>,
            _top: Point<Real>,
            _radius: Real,
            _handle: ColliderHandle,
        ) -> Result<Option<PenetrationPush>, QueryError> {
            Err(QueryError::Unsupported("query world offline".to_string()))
        }
    }

    #[test]
    fn failed_tick_leaves_state_untouched() {
        let world = world_with_floor();
        let mut driver = driver_on_floor();
        driver
            .step(&world, walk([1.0, 0.0]), DT)
            .expect("warmup tick");
        let position = driver.position();
        let velocity = driver.velocity();

        let result = driver.step(&FailingQuery, walk([1.0, 0.0]), DT);
        assert!(matches!(result, Err(TickError::Query(_))));
        assert_eq!(driver.position(), position);
        assert_eq!(driver.velocity(), velocity);
    }

    #[test]
    fn walks_along_flat_ground() {
        let world = world_with_floor();
        let mut driver = driver_on_floor();
        for _ in 0..30 {
            let frame = driver.step(&world, walk([1.0, 0.0]), DT).expect("tick");
            assert!(frame.ground.grounded);
            assert!(driver.position().y > 1.05 && driver.position().y < 1.13);
        }
        assert!(driver.position().x > 1.0);
        assert_eq!(driver.position().z, 0.0);
    }

    #[test]
    fn slides_to_rest_against_wall() {
        let mut world = world_with_floor();
        let wall = ColliderBuilder::cuboid(0.1, 5.0, 5.0)
            .translation(vector![2.1, 0.0, 0.0])
            .build();
        world.insert_static_collider(wall);

        let mut driver = driver_on_floor();
        for _ in 0..120 {
            driver.step(&world, walk([1.0, 0.0]), DT).expect("tick");
        }
        // Wall face at x = 2.0; capsule center rests one radius away.
        assert!(driver.position().x < 1.61);
        assert!((driver.position().x - 1.6).abs() < 0.03);
        // The into-wall component was stripped once contact was made.
        assert!(driver.velocity().x.abs() < 1.0e-3);
    }

    #[test]
    fn jump_rises_then_lands_back_on_floor() {
        let world = world_with_floor();
        let mut driver = driver_on_floor();
        driver.check_ground(&world, None).expect("probe");

        let jump = InputSnapshot {
            move_direction: [0.0, 0.0],
            jump_pressed: true,
        };
        driver.step(&world, jump, DT).expect("takeoff");
        assert!(driver.velocity().y > 4.0);

        let mut left_ground = false;
        let mut peak = driver.position().y;
        for _ in 0..180 {
            let frame = driver.step(&world, walk([0.0, 0.0]), DT).expect("tick");
            peak = peak.max(driver.position().y);
            if !frame.ground.grounded {
                left_ground = true;
            }
        }
        assert!(left_ground);
        assert!(peak > 1.8);
        let state = driver.state();
        assert!(state.ground.grounded);
        assert!(state.position.y > 1.05 && state.position.y < 1.15);
    }

    #[test]
    fn snap_drops_onto_nearby_floor() {
        let world = world_with_floor();
        let mut driver = MotionDriver::new(
            CollisionProfile::default(),
            MotorConfig::default(),
            point![0.0, 1.25, 0.0],
        );
        let snapped = driver.snap_to_ground(&world, 0.2).expect("snap");
        assert!(snapped);
        assert!((driver.position().y - 1.1).abs() < 1.0e-3);

        // Out of range: no snap, position untouched.
        let mut high = MotionDriver::new(
            CollisionProfile::default(),
            MotorConfig::default(),
            point![0.0, 4.0, 0.0],
        );
        let snapped = high.snap_to_ground(&world, 0.2).expect("snap");
        assert!(!snapped);
        assert_eq!(high.position().y, 4.0);
    }

    #[test]
    fn diagonal_input_is_normalized() {
        let world = world_with_floor();
        let mut driver = driver_on_floor();
        driver.step(&world, walk([1.0, 1.0]), DT).expect("tick");
        let velocity = driver.velocity();
        let horizontal = (velocity.x * velocity.x + velocity.z * velocity.z).sqrt();
        // Snapped to min start speed along the normalized diagonal.
        assert!((horizontal - 3.0).abs() < 1.0e-3);
        assert!((velocity.x - velocity.z).abs() < 1.0e-4);
    }

    #[test]
    fn from_tunables_rejects_bad_capsule() {
        let mut tunables = MovementTunables::default();
        tunables.capsule_radius = 0.01;
        tunables.skin_width = 0.02;
        let result = MotionDriver::from_tunables(&tunables, point![0.0, 1.1, 0.0]);
        let message = result.err().expect("rejected");
        assert!(message.contains("capsule_radius"));
    }

    #[test]
    fn from_tunables_builds_working_driver() {
        let world = world_with_floor();
        let mut driver = MotionDriver::from_tunables(
            &MovementTunables::default(),
            point![0.0, 1.1, 0.0],
        )
        .expect("valid tunables");
        let frame = driver.step(&world, walk([1.0, 0.0]), DT).expect("tick");
        assert!(frame.ground.grounded);
        assert!(driver.position().x > 0.0);
    }

    #[test]
    fn state_reports_last_committed_tick() {
        let world = world_with_floor();
        let mut driver = driver_on_floor();
        let input = walk([0.0, 1.0]);
        driver.step(&world, input, DT).expect("tick");
        let state = driver.state();
        assert_eq!(state.position, driver.position());
        assert_eq!(state.velocity, driver.velocity());
        assert_eq!(state.input.move_direction, input.move_direction);
        assert!(state.ground.grounded);
    }
}
