//! Engine configuration, validation, and error types.

use std::error::Error;
use std::fmt;
use stellwerk_core::{TrainType, TrainTypeId};

/// Complete configuration for constructing a
/// [`SimulationEngine`](crate::SimulationEngine).
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Target tick rate in Hz. Default: 10.
    pub tick_rate_hz: f64,
    /// Simulated seconds per wall second. Default: 1.0.
    pub speed_multiplier: f64,
    /// Dwell duration at a stop, in simulated seconds. Default: 5.0.
    pub dwell_seconds: f64,
    /// Consecutive admission denials before a train replans around the
    /// contested section. Default: 20 ticks.
    pub block_grace_ticks: u32,
    /// Route cost added to a move that reverses the train. Default: 50.
    pub reverse_penalty: u32,
    /// Sections of plan walked when checking that an entered block can
    /// be left again. Default: 8.
    pub exit_lookahead: usize,
    /// Maximum commands buffered between ticks. Default: 256.
    pub max_command_queue: usize,
    /// The train type table; spawn requests resolve against it.
    pub train_types: Vec<TrainType>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 10.0,
            speed_multiplier: 1.0,
            dwell_seconds: 5.0,
            block_grace_ticks: 20,
            reverse_penalty: 50,
            exit_lookahead: 8,
            max_command_queue: 256,
            train_types: Vec::new(),
        }
    }
}

impl SimConfig {
    /// The default configuration plus the demo type table: a slow
    /// low-priority regional and a faster high-priority express.
    pub fn demo() -> Self {
        Self {
            train_types: vec![
                TrainType {
                    id: TrainTypeId(1),
                    name: "Regional".into(),
                    priority_index: 1,
                    cruising_speed: 30.0,
                },
                TrainType {
                    id: TrainTypeId(2),
                    name: "Express".into(),
                    priority_index: 2,
                    cruising_speed: 60.0,
                },
            ],
            ..Self::default()
        }
    }

    /// Simulated seconds covered by one tick.
    pub fn sim_dt(&self) -> f64 {
        self.speed_multiplier / self.tick_rate_hz
    }

    /// Look up a train type by id.
    pub fn train_type(&self, id: TrainTypeId) -> Option<&TrainType> {
        self.train_types.iter().find(|t| t.id == id)
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Tick rate must be finite and positive, and its reciprocal
        //    must also be finite (rejects subnormals where 1.0/hz = inf,
        //    which would panic in Duration::from_secs_f64).
        if !self.tick_rate_hz.is_finite()
            || self.tick_rate_hz <= 0.0
            || !(1.0 / self.tick_rate_hz).is_finite()
        {
            return Err(ConfigError::InvalidTickRate {
                value: self.tick_rate_hz,
            });
        }
        // 2. Speed multiplier finite and positive.
        if !self.speed_multiplier.is_finite() || self.speed_multiplier <= 0.0 {
            return Err(ConfigError::InvalidSpeedMultiplier {
                value: self.speed_multiplier,
            });
        }
        // 3. Dwell non-negative and finite.
        if !self.dwell_seconds.is_finite() || self.dwell_seconds < 0.0 {
            return Err(ConfigError::InvalidDwell {
                value: self.dwell_seconds,
            });
        }
        // 4. Grace window and lookahead at least 1.
        if self.block_grace_ticks == 0 {
            return Err(ConfigError::ZeroGrace);
        }
        if self.exit_lookahead == 0 {
            return Err(ConfigError::ZeroLookahead);
        }
        // 5. Command queue at least 1.
        if self.max_command_queue == 0 {
            return Err(ConfigError::QueueZero);
        }
        // 6. Train types: unique ids, sane speeds.
        for (i, t) in self.train_types.iter().enumerate() {
            if self.train_types[..i].iter().any(|u| u.id == t.id) {
                return Err(ConfigError::DuplicateTrainType { id: t.id });
            }
            if !t.cruising_speed.is_finite() || t.cruising_speed <= 0.0 {
                return Err(ConfigError::InvalidCruisingSpeed { id: t.id });
            }
        }
        Ok(())
    }
}

/// Errors detected during [`SimConfig::validate`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// tick_rate_hz is NaN, infinite, zero, or negative.
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// speed_multiplier is NaN, infinite, zero, or negative.
    InvalidSpeedMultiplier {
        /// The invalid value.
        value: f64,
    },
    /// dwell_seconds is NaN, infinite, or negative.
    InvalidDwell {
        /// The invalid value.
        value: f64,
    },
    /// block_grace_ticks is zero.
    ZeroGrace,
    /// exit_lookahead is zero.
    ZeroLookahead,
    /// max_command_queue is zero.
    QueueZero,
    /// Two train types share an id.
    DuplicateTrainType {
        /// The repeated id.
        id: TrainTypeId,
    },
    /// A train type's cruising speed is NaN, infinite, zero, or negative.
    InvalidCruisingSpeed {
        /// The offending type.
        id: TrainTypeId,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTickRate { value } => {
                write!(f, "tick_rate_hz must be finite and positive, got {value}")
            }
            Self::InvalidSpeedMultiplier { value } => {
                write!(f, "speed_multiplier must be finite and positive, got {value}")
            }
            Self::InvalidDwell { value } => {
                write!(f, "dwell_seconds must be finite and non-negative, got {value}")
            }
            Self::ZeroGrace => write!(f, "block_grace_ticks must be at least 1"),
            Self::ZeroLookahead => write!(f, "exit_lookahead must be at least 1"),
            Self::QueueZero => write!(f, "max_command_queue must be at least 1"),
            Self::DuplicateTrainType { id } => write!(f, "duplicate train type {id}"),
            Self::InvalidCruisingSpeed { id } => {
                write!(f, "train type {id} has an invalid cruising speed")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(SimConfig::demo().validate().is_ok());
    }

    #[test]
    fn sim_dt_scales_with_multiplier() {
        let mut cfg = SimConfig::default();
        assert!((cfg.sim_dt() - 0.1).abs() < 1e-12);
        cfg.speed_multiplier = 5.0;
        assert!((cfg.sim_dt() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn validate_subnormal_tick_rate_rejected() {
        let cfg = SimConfig {
            tick_rate_hz: f64::from_bits(1),
            ..SimConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTickRate { .. })
        ));
    }

    #[test]
    fn validate_duplicate_train_type_rejected() {
        let mut cfg = SimConfig::demo();
        let dup = cfg.train_types[0].clone();
        cfg.train_types.push(dup);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateTrainType { .. })
        ));
    }

    #[test]
    fn validate_zero_grace_rejected() {
        let cfg = SimConfig {
            block_grace_ticks: 0,
            ..SimConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroGrace));
    }
}
