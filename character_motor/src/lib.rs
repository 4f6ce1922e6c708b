//! Velocity integration: asymmetric acceleration curves, gravity, and
//! post-collision velocity correction.
#![forbid(unsafe_code)]

use character_sweep::{Contact, ContactKind, GroundState};
use rapier3d::math::Vector;
use rapier3d::prelude::Real;

/// Input below this magnitude counts as "no input" for rate selection.
const INPUT_EPSILON: Real = 1.0e-4;
/// Margin above the air speed cap before the momentum branch engages.
/// Keeps the rate choice continuous when a launch barely clears the cap.
const AIR_CAP_MARGIN: Real = 0.05;

#[derive(Clone, Copy, Debug)]
pub struct MotorConfig {
    /// Target horizontal speed while grounded (also used on steep slopes).
    pub moving_speed: Real,
    /// Target horizontal speed while airborne; doubles as the momentum cap.
    pub air_moving_speed: Real,
    /// Horizontal speed snapped to when starting from near rest.
    pub min_start_speed: Real,
    /// Grounded acceleration rate.
    pub acceleration: Real,
    /// Grounded deceleration rate.
    pub deceleration: Real,
    /// Airborne acceleration rate.
    pub air_acceleration: Real,
    /// Airborne deceleration rate.
    pub air_deceleration: Real,
    /// Slow decay applied to launch momentum above the air speed cap while
    /// input agrees with the motion.
    pub air_drag_deceleration: Real,
    /// Gravity magnitude in m/s^2.
    pub gravity: Real,
    /// Vertical takeoff speed for jumps.
    pub jump_speed: Real,
    /// Small negative vertical speed held while grounded so the next tick's
    /// ground probe still connects.
    pub ground_stick_speed: Real,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            moving_speed: 12.0,
            air_moving_speed: 4.0,
            min_start_speed: 3.0,
            acceleration: 10.0,
            deceleration: 20.0,
            air_acceleration: 6.0,
            air_deceleration: 8.0,
            air_drag_deceleration: 1.5,
            gravity: 9.81,
            jump_speed: 4.5,
            ground_stick_speed: -2.0,
        }
    }
}

/// Computes next-tick velocity from input and ground state, then corrects it
/// against the contacts the resolver reported. Stateless besides its config;
/// the velocity vector itself lives with the caller.
pub struct VelocityIntegrator {
    config: MotorConfig,
}

impl VelocityIntegrator {
    pub fn new(config: MotorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> MotorConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut MotorConfig {
        &mut self.config
    }

    /// One tick of velocity integration. `input` is the normalized 2D move
    /// direction mapped onto the XZ plane.
    pub fn integrate(
        &self,
        velocity: Vector<Real>,
        input: [Real; 2],
        ground: &GroundState,
        jump: bool,
        dt: Real,
    ) -> Vector<Real> {
        let dt = dt.max(0.0);
        let mut velocity = velocity;

        if ground.grounded && velocity.y <= 0.0 {
            if jump && !ground.steep_slope {
                velocity.y = self.config.jump_speed;
            } else {
                // Held slightly negative instead of zero so the next tick's
                // ground probe still connects.
                velocity.y = self.config.ground_stick_speed;
            }
        } else {
            // Airborne, or still ascending from a takeoff while the ground
            // probe can see the launch surface.
            velocity.y -= self.config.gravity * dt;
        }

        let input_len = (input[0] * input[0] + input[1] * input[1]).sqrt();
        let has_input = input_len > INPUT_EPSILON;
        let speed = if ground.grounded || ground.steep_slope {
            self.config.moving_speed
        } else {
            self.config.air_moving_speed
        };
        let target_x = input[0] * speed;
        let target_z = input[1] * speed;

        if ground.grounded && has_input {
            let horizontal = (velocity.x * velocity.x + velocity.z * velocity.z).sqrt();
            if horizontal < self.config.min_start_speed {
                // Snap straight to the minimum speed; the ramp resumes next
                // tick, so starts from rest skip the slow crawl.
                velocity.x = input[0] * self.config.min_start_speed;
                velocity.z = input[1] * self.config.min_start_speed;
                return velocity;
            }
        }

        let airborne = !ground.grounded;
        velocity.x = self.approach_axis(velocity.x, target_x, airborne, dt);
        velocity.z = self.approach_axis(velocity.z, target_z, airborne, dt);
        velocity
    }

    /// Removes velocity the resolver's contacts disallow: into-wall
    /// components while moving into the surface, upward motion under
    /// ceiling contacts.
    pub fn correct_for_contacts(
        &self,
        velocity: Vector<Real>,
        contacts: &[Contact],
    ) -> Vector<Real> {
        let mut velocity = velocity;
        for contact in contacts {
            match contact.kind {
                ContactKind::Wall => {
                    let into = velocity.dot(&contact.normal);
                    if into < 0.0 {
                        velocity -= contact.normal * into;
                    }
                }
                ContactKind::Ceiling => {
                    if velocity.y > 0.0 {
                        velocity.y = 0.0;
                    }
                }
                ContactKind::Ground => {}
            }
        }
        velocity
    }

    fn approach_axis(&self, current: Real, target: Real, airborne: bool, dt: Real) -> Real {
        let rate = self.movement_rate(current, target, airborne);
        move_toward(current, target, rate * dt)
    }

    /// Picks the per-axis rate. Launch momentum above the air speed cap
    /// decays at the drag rate while the input agrees (or is absent);
    /// braking against it uses the normal air deceleration.
    fn movement_rate(&self, current: Real, target: Real, airborne: bool) -> Real {
        if airborne {
            if current.abs() > self.config.air_moving_speed + AIR_CAP_MARGIN {
                let agreeing = target.abs() <= INPUT_EPSILON || current * target > 0.0;
                if agreeing {
                    self.config.air_drag_deceleration
                } else {
                    self.config.air_deceleration
                }
            } else if is_accelerating(current, target) {
                self.config.air_acceleration
            } else {
                self.config.air_deceleration
            }
        } else if is_accelerating(current, target) {
            self.config.acceleration
        } else {
            self.config.deceleration
        }
    }
}

fn is_accelerating(current: Real, target: Real) -> bool {
    target.abs() > INPUT_EPSILON && current * target >= 0.0 && current.abs() <= target.abs()
}

fn move_toward(current: Real, target: Real, max_delta: Real) -> Real {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + max_delta * delta.signum()
    }
}
