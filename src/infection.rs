//! Infection selectors decide the course of every new infection.
//!
//! ```json
//! {
//!     "transmission": { "type": "exponential", "max_probability": 0.9, "onset": 2.0, "decay_rate": 0.3 },
//!     "incubation_period": 5.1,
//!     "mean_stage_duration": 3.0,
//!     "outcomes": [
//!         { "max_age": 19, "weights": { "asymptomatic": 0.5, "mild": 0.45, "moderate": 0.04, "severe": 0.01, "critical": 0.0, "dead": 0.0 } },
//!         { "max_age": 120, "weights": { "asymptomatic": 0.3, "mild": 0.4, "moderate": 0.15, "severe": 0.1, "critical": 0.03, "dead": 0.02 } }
//!     ]
//! }
//! ```
use std::path::Path;

use rand_distr::Exp;
use serde::Deserialize;

use crate::config::load_json;
use crate::define_rng;
use crate::health::{HealthRecord, Infection, SymptomStage, Trajectory, Transmission};
use crate::random::RandomSource;
use crate::world::Agent;
use crate::SimulatorError;

define_rng!(SelectorRng);

/// Gives newly infected people their health record.
pub trait InfectionSelector {
    /// Infects `agent` at `time`: attaches a health record and removes their susceptibility.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError` if no valid infection can be built for the agent.
    fn infect_agent_at_time(
        &self,
        agent: &mut Agent,
        time: f64,
        random: &mut RandomSource,
    ) -> Result<(), SimulatorError>;

    /// The settings of the selector as `(name, value)` pairs.
    fn parameters(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

fn describe_transmission(transmission: &Transmission) -> String {
    serde_json::to_string(transmission).unwrap_or_else(|_| format!("{transmission:?}"))
}

fn infect(agent: &mut Agent, infection: Infection, time: f64) {
    agent.health = Some(HealthRecord::new(infection, time));
    agent.susceptibility = 0.0;
}

/// Every infection follows the same trajectory and transmission profile.
#[derive(Clone, Debug)]
pub struct ConstantSelector {
    pub infection: Infection,
}

impl InfectionSelector for ConstantSelector {
    fn infect_agent_at_time(
        &self,
        agent: &mut Agent,
        time: f64,
        _random: &mut RandomSource,
    ) -> Result<(), SimulatorError> {
        infect(agent, self.infection.clone(), time);
        Ok(())
    }

    fn parameters(&self) -> Vec<(String, String)> {
        let stages = self
            .infection
            .trajectory
            .stages()
            .iter()
            .map(|(offset, stage)| format!("{stage:?}@{offset}"))
            .collect::<Vec<_>>()
            .join(" ");
        vec![
            ("transmission".to_string(), describe_transmission(&self.infection.transmission)),
            ("trajectory".to_string(), stages),
        ]
    }
}

/// Relative frequency of the worst outcome of an infection.
#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
pub struct OutcomeWeights {
    pub asymptomatic: f64,
    pub mild: f64,
    pub moderate: f64,
    pub severe: f64,
    pub critical: f64,
    pub dead: f64,
}

impl OutcomeWeights {
    const OUTCOMES: [SymptomStage; 6] = [
        SymptomStage::Asymptomatic,
        SymptomStage::Mild,
        SymptomStage::Moderate,
        SymptomStage::Severe,
        SymptomStage::Critical,
        SymptomStage::Dead,
    ];

    fn as_array(&self) -> [f64; 6] {
        [
            self.asymptomatic,
            self.mild,
            self.moderate,
            self.severe,
            self.critical,
            self.dead,
        ]
    }
}

#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
pub struct AgeBand {
    /// Oldest age in the band.
    pub max_age: u8,
    pub weights: OutcomeWeights,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SelectorConfig {
    pub transmission: Transmission,
    /// Mean days from infection to the first stage after exposure.
    pub incubation_period: f64,
    /// Mean days spent in each later stage.
    pub mean_stage_duration: f64,
    /// Bands in increasing age. People older than the last band use the last band.
    pub outcomes: Vec<AgeBand>,
}

/// Draws an outcome from the person's age band and builds a trajectory that climbs through every
/// symptomatic stage up to it, each lasting an exponentially distributed time.
#[derive(Clone, Debug)]
pub struct TrajectorySelector {
    transmission: Transmission,
    incubation_period: f64,
    mean_stage_duration: f64,
    incubation: Exp<f64>,
    stage_duration: Exp<f64>,
    outcomes: Vec<AgeBand>,
}

impl TrajectorySelector {
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if a mean duration is not positive, there are no age
    /// bands, bands are not in increasing age, or a band's weights are negative or all zero.
    pub fn new(config: SelectorConfig) -> Result<TrajectorySelector, SimulatorError> {
        let rate = |mean: f64, name: &str| {
            if mean > 0.0 {
                Exp::new(1.0 / mean).map_err(|e| SimulatorError::Config(format!("{name}: {e}")))
            } else {
                Err(SimulatorError::Config(format!("{name} must be positive")))
            }
        };
        let incubation = rate(config.incubation_period, "incubation_period")?;
        let stage_duration = rate(config.mean_stage_duration, "mean_stage_duration")?;

        if config.outcomes.is_empty() {
            return Err("at least one age band of outcomes is needed".into());
        }
        if config
            .outcomes
            .windows(2)
            .any(|pair| pair[1].max_age <= pair[0].max_age)
        {
            return Err("outcome age bands must be in increasing age".into());
        }
        for band in &config.outcomes {
            let weights = band.weights.as_array();
            if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
                return Err(SimulatorError::Config(format!(
                    "outcome weights up to age {} must be non-negative and not all zero",
                    band.max_age
                )));
            }
        }
        Ok(TrajectorySelector {
            transmission: config.transmission,
            incubation_period: config.incubation_period,
            mean_stage_duration: config.mean_stage_duration,
            incubation,
            stage_duration,
            outcomes: config.outcomes,
        })
    }

    /// # Errors
    ///
    /// Returns a `SimulatorError` if the file cannot be read or parsed, or the configuration is
    /// rejected by [`TrajectorySelector::new`].
    pub fn from_file(path: &Path) -> Result<TrajectorySelector, SimulatorError> {
        TrajectorySelector::new(load_json(path)?)
    }

    fn band(&self, age: u8) -> Option<&AgeBand> {
        self.outcomes
            .iter()
            .find(|band| age <= band.max_age)
            .or_else(|| self.outcomes.last())
    }

    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if the selector holds no age band.
    pub fn sample_trajectory(
        &self,
        age: u8,
        random: &mut RandomSource,
    ) -> Result<Trajectory, SimulatorError> {
        let band = self.band(age).ok_or("no outcome age band")?;
        let weights = band.weights.as_array();
        let outcome = OutcomeWeights::OUTCOMES[random.sample_weighted(SelectorRng, weights.as_slice())];

        let mut time = random.sample_distr(SelectorRng, self.incubation);
        let mut stages = vec![(0.0, SymptomStage::Exposed)];
        if outcome == SymptomStage::Asymptomatic {
            stages.push((time, SymptomStage::Asymptomatic));
        } else {
            let peak = outcome.min(SymptomStage::Critical);
            for stage in [
                SymptomStage::Mild,
                SymptomStage::Moderate,
                SymptomStage::Severe,
                SymptomStage::Critical,
            ] {
                if stage > peak {
                    break;
                }
                if stage != SymptomStage::Mild {
                    time += random.sample_distr(SelectorRng, self.stage_duration);
                }
                stages.push((time, stage));
            }
        }
        time += random.sample_distr(SelectorRng, self.stage_duration);
        let end = if outcome == SymptomStage::Dead {
            SymptomStage::Dead
        } else {
            SymptomStage::Recovered
        };
        stages.push((time, end));
        Trajectory::new(stages)
    }
}

impl InfectionSelector for TrajectorySelector {
    fn infect_agent_at_time(
        &self,
        agent: &mut Agent,
        time: f64,
        random: &mut RandomSource,
    ) -> Result<(), SimulatorError> {
        let trajectory = self.sample_trajectory(agent.age, random)?;
        infect(
            agent,
            Infection {
                trajectory,
                transmission: self.transmission,
            },
            time,
        );
        Ok(())
    }

    fn parameters(&self) -> Vec<(String, String)> {
        let mut parameters = vec![
            ("transmission".to_string(), describe_transmission(&self.transmission)),
            ("incubation_period".to_string(), self.incubation_period.to_string()),
            ("mean_stage_duration".to_string(), self.mean_stage_duration.to_string()),
        ];
        for band in &self.outcomes {
            let w = band.weights;
            parameters.push((
                format!("outcomes.max_age_{}", band.max_age),
                format!(
                    "asymptomatic={} mild={} moderate={} severe={} critical={} dead={}",
                    w.asymptomatic, w.mild, w.moderate, w.severe, w.critical, w.dead
                ),
            ));
        }
        parameters
    }
}
