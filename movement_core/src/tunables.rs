//! Flat numeric tunables for the movement core, with TOML round-trip and
//! validation.

use serde::{Deserialize, Serialize};

/// Every knob the movement core exposes, in one flat table. Hosts load this
/// from TOML (or build it in code), validate it, then hand the pieces to the
/// collision and motor crates at construction time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementTunables {
    /// Capsule radius in meters.
    pub capsule_radius: f32,
    /// Capsule cylinder height in meters (distance between sphere centers).
    pub capsule_height: f32,
    /// Capsule center offset relative to the agent transform.
    pub center_offset: [f32; 3],
    /// Inward shape shrink applied to every geometry query.
    pub skin_width: f32,
    /// Maximum walkable slope angle in degrees.
    pub max_ground_angle_deg: f32,
    /// Downward probe distance used by the per-tick ground check.
    pub ground_check_distance: f32,
    /// Sweep-and-slide iteration cap.
    pub max_move_iterations: u32,
    /// Overlap resolution iteration cap.
    pub max_overlap_iterations: u32,
    /// Target horizontal speed while grounded.
    pub moving_speed: f32,
    /// Target horizontal speed while airborne.
    pub air_moving_speed: f32,
    /// Horizontal speed snapped to when starting from near rest.
    pub min_start_speed: f32,
    /// Grounded acceleration rate.
    pub acceleration: f32,
    /// Grounded deceleration rate.
    pub deceleration: f32,
    /// Airborne acceleration rate.
    pub air_acceleration: f32,
    /// Airborne deceleration rate.
    pub air_deceleration: f32,
    /// Slow decay rate applied to launch momentum above the air speed cap.
    pub air_drag_deceleration: f32,
    /// Gravity magnitude in m/s^2.
    pub gravity: f32,
    /// Vertical takeoff speed for jumps.
    pub jump_speed: f32,
    /// Small negative vertical speed held while grounded so the next tick's
    /// ground probe still connects.
    pub ground_stick_speed: f32,
}

impl Default for MovementTunables {
    fn default() -> Self {
        Self {
            capsule_radius: 0.4,
            capsule_height: 1.4,
            center_offset: [0.0, 0.0, 0.0],
            skin_width: 0.02,
            max_ground_angle_deg: 45.0,
            ground_check_distance: 0.2,
            max_move_iterations: 3,
            max_overlap_iterations: 3,
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

#[derive(Clone, Debug, Default)]
pub struct TunablesValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TunablesValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl MovementTunables {
    pub fn parse_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string(self).map_err(|err| err.to_string())
    }

    pub fn validate(&self) -> TunablesValidation {
        let mut validation = TunablesValidation::default();

        let scalars = [
            ("capsule_radius", self.capsule_radius),
            ("capsule_height", self.capsule_height),
            ("skin_width", self.skin_width),
            ("max_ground_angle_deg", self.max_ground_angle_deg),
            ("ground_check_distance", self.ground_check_distance),
            ("moving_speed", self.moving_speed),
            ("air_moving_speed", self.air_moving_speed),
            ("min_start_speed", self.min_start_speed),
            ("acceleration", self.acceleration),
            ("deceleration", self.deceleration),
            ("air_acceleration", self.air_acceleration),
            ("air_deceleration", self.air_deceleration),
            ("air_drag_deceleration", self.air_drag_deceleration),
            ("gravity", self.gravity),
            ("jump_speed", self.jump_speed),
            ("ground_stick_speed", self.ground_stick_speed),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                validation.errors.push(format!("{} must be finite", name));
            }
        }
        if !self.center_offset.iter().all(|value| value.is_finite()) {
            validation
                .errors
                .push("center_offset must be finite".to_string());
        }

        if self.skin_width <= 0.0 {
            validation.errors.push("skin_width must be > 0".to_string());
        }
        if self.capsule_radius <= self.skin_width {
            validation
                .errors
                .push("capsule_radius must exceed skin_width".to_string());
        }
        if self.capsule_height <= 0.0 {
            validation
                .errors
                .push("capsule_height must be > 0".to_string());
        }
        if !(self.max_ground_angle_deg > 0.0 && self.max_ground_angle_deg < 90.0) {
            validation
                .errors
                .push("max_ground_angle_deg must be in (0, 90)".to_string());
        }
        if self.ground_check_distance < 0.0 {
            validation
                .errors
                .push("ground_check_distance must be >= 0".to_string());
        }
        if self.max_move_iterations == 0 {
            validation
                .errors
                .push("max_move_iterations must be >= 1".to_string());
        }
        if self.max_overlap_iterations == 0 {
            validation
                .errors
                .push("max_overlap_iterations must be >= 1".to_string());
        }

        let rates = [
            ("moving_speed", self.moving_speed),
            ("air_moving_speed", self.air_moving_speed),
            ("min_start_speed", self.min_start_speed),
            ("acceleration", self.acceleration),
            ("deceleration", self.deceleration),
            ("air_acceleration", self.air_acceleration),
            ("air_deceleration", self.air_deceleration),
            ("air_drag_deceleration", self.air_drag_deceleration),
            ("gravity", self.gravity),
            ("jump_speed", self.jump_speed),
        ];
        for (name, value) in rates {
            if value < 0.0 {
                validation.errors.push(format!("{} must be >= 0", name));
            }
        }

        if self.min_start_speed > self.moving_speed {
            validation
                .warnings
                .push("min_start_speed exceeds moving_speed".to_string());
        }
        if self.air_moving_speed > self.moving_speed {
            validation
                .warnings
                .push("air_moving_speed exceeds moving_speed".to_string());
        }
        if self.ground_stick_speed >= 0.0 {
            validation.warnings.push(
                "ground_stick_speed should be a small negative value".to_string(),
            );
        }

        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let tunables = MovementTunables::default();
        let validation = tunables.validate();
        assert!(validation.is_ok(), "errors: {:?}", validation.errors);
        assert!(validation.warnings.is_empty());
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let mut tunables = MovementTunables::default();
        tunables.moving_speed = 7.5;
        tunables.max_move_iterations = 5;
        let text = tunables.to_toml().expect("serialize");
        let parsed = MovementTunables::parse_toml(&text).expect("parse");
        assert_eq!(parsed, tunables);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed = MovementTunables::parse_toml("moving_speed = 6.0\n").expect("parse");
        assert_eq!(parsed.moving_speed, 6.0);
        assert_eq!(parsed.capsule_radius, MovementTunables::default().capsule_radius);
    }

    #[test]
    fn validation_catches_bad_capsule() {
        let mut tunables = MovementTunables::default();
        tunables.capsule_radius = 0.01;
        tunables.skin_width = 0.02;
        let validation = tunables.validate();
        assert!(!validation.is_ok());
    }

    #[test]
    fn validation_warns_on_positive_stick_speed() {
        let mut tunables = MovementTunables::default();
        tunables.ground_stick_speed = 0.5;
        let validation = tunables.validate();
        assert!(validation.is_ok());
        assert_eq!(validation.warnings.len(), 1);
    }
}
