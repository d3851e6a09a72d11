//! The health state machine: symptom trajectories, transmission profiles and the two terminal
//! transitions, recovery and death.
use log::trace;
use serde::{Deserialize, Serialize};

use crate::world::{AgentId, World};
use crate::SimulatorError;

/// Declaration order is the progression order. `Recovered` and `Dead` are terminal.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomStage {
    Exposed,
    Asymptomatic,
    Mild,
    Moderate,
    Severe,
    Critical,
    Recovered,
    Dead,
}

impl SymptomStage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SymptomStage::Recovered | SymptomStage::Dead)
    }

    #[must_use]
    pub fn is_symptomatic(self) -> bool {
        (SymptomStage::Mild..=SymptomStage::Critical).contains(&self)
    }
}

/// The stages a person goes through, each with the number of days after infection at which it
/// starts.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    stages: Vec<(f64, SymptomStage)>,
}

impl Trajectory {
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` unless the trajectory starts with `Exposed` at day
    /// zero, ends with its only terminal stage, and never goes back in time or stage.
    pub fn new(stages: Vec<(f64, SymptomStage)>) -> Result<Trajectory, SimulatorError> {
        match stages.first() {
            Some((offset, SymptomStage::Exposed)) if *offset == 0.0 => {}
            _ => return Err("a trajectory starts with exposed at day 0".into()),
        }
        match stages.last() {
            Some((_, stage)) if stage.is_terminal() => {}
            _ => return Err("a trajectory ends in recovered or dead".into()),
        }
        for pair in stages.windows(2) {
            let ((t0, s0), (t1, s1)) = (pair[0], pair[1]);
            if t1 < t0 || s1 < s0 || s0.is_terminal() {
                return Err(SimulatorError::Config(format!(
                    "trajectory goes from {s0:?} at day {t0} to {s1:?} at day {t1}"
                )));
            }
        }
        Ok(Trajectory { stages })
    }

    #[must_use]
    pub fn stages(&self) -> &[(f64, SymptomStage)] {
        &self.stages
    }

    /// The stage reached `elapsed` days after infection.
    #[must_use]
    pub fn stage_at(&self, elapsed: f64) -> SymptomStage {
        self.stages
            .iter()
            .take_while(|(offset, _)| *offset <= elapsed)
            .last()
            .map_or(SymptomStage::Exposed, |(_, stage)| *stage)
    }

    #[must_use]
    pub fn final_stage(&self) -> SymptomStage {
        self.stages
            .last()
            .map_or(SymptomStage::Recovered, |(_, stage)| *stage)
    }
}

/// How infectious a person is over the course of their infection.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transmission {
    Constant {
        probability: f64,
    },
    /// Zero until `onset` days after infection, `max_probability` at onset, then decaying
    /// exponentially.
    Exponential {
        max_probability: f64,
        onset: f64,
        decay_rate: f64,
    },
}

impl Transmission {
    #[must_use]
    pub fn probability_at(&self, elapsed: f64) -> f64 {
        match *self {
            Transmission::Constant { probability } => probability,
            Transmission::Exponential {
                max_probability,
                onset,
                decay_rate,
            } => {
                if elapsed < onset {
                    0.0
                } else {
                    max_probability * (-decay_rate * (elapsed - onset)).exp()
                }
            }
        }
    }
}

/// The course an infection will take, fixed when the person is infected.
#[derive(Clone, Debug, PartialEq)]
pub struct Infection {
    pub trajectory: Trajectory,
    pub transmission: Transmission,
}

#[derive(Clone, Debug)]
pub struct HealthRecord {
    pub infection: Infection,
    pub stage: SymptomStage,
    pub time_of_infection: f64,
    pub time_of_symptoms_onset: Option<f64>,
    /// Share of the infections caused by this person.
    pub number_of_infected: f64,
    /// Set at recovery or death.
    pub infection_length: Option<f64>,
    transmission_probability: f64,
}

impl HealthRecord {
    #[must_use]
    pub fn new(infection: Infection, time_of_infection: f64) -> HealthRecord {
        let transmission_probability = infection.transmission.probability_at(0.0);
        HealthRecord {
            infection,
            stage: SymptomStage::Exposed,
            time_of_infection,
            time_of_symptoms_onset: None,
            number_of_infected: 0.0,
            infection_length: None,
            transmission_probability,
        }
    }

    #[must_use]
    pub fn transmission_probability(&self) -> f64 {
        self.transmission_probability
    }

    #[must_use]
    pub fn is_infectious(&self) -> bool {
        !self.stage.is_terminal() && self.transmission_probability > 0.0
    }

    /// Moves the record to the stage reached at `time` and returns the stage it was in. Stages
    /// never go backwards. Transmission is evaluated at the middle of the step of length
    /// `duration` that ends at `time`.
    pub fn update_health_status(&mut self, time: f64, duration: f64) -> SymptomStage {
        let previous = self.stage;
        if previous.is_terminal() {
            return previous;
        }
        let elapsed = time - self.time_of_infection;
        self.stage = self.infection.trajectory.stage_at(elapsed).max(previous);
        if self.stage.is_symptomatic() && self.time_of_symptoms_onset.is_none() {
            self.time_of_symptoms_onset = Some(time);
        }
        self.transmission_probability = if self.stage.is_terminal() {
            0.0
        } else {
            let midpoint = (elapsed - duration / 2.0).max(0.0);
            self.infection.transmission.probability_at(midpoint)
        };
        if self.stage.is_terminal() {
            self.infection_length = Some(elapsed);
        }
        previous
    }

    pub fn set_recovered(&mut self, time: f64) {
        self.finish(SymptomStage::Recovered, time);
    }

    pub fn set_dead(&mut self, time: f64) {
        self.finish(SymptomStage::Dead, time);
    }

    fn finish(&mut self, stage: SymptomStage, time: f64) {
        self.stage = stage;
        self.transmission_probability = 0.0;
        if self.infection_length.is_none() {
            self.infection_length = Some(time - self.time_of_infection);
        }
    }
}

/// Ends an infection with lifelong immunity: releases any hospital bed, drops the health record
/// and sets susceptibility to zero.
pub fn recover(world: &mut World, agent_id: AgentId, time: f64) {
    world.discharge_patient(agent_id);
    if let Some(agent) = world.people.get_mut(agent_id) {
        let length = agent
            .health
            .take()
            .and_then(|mut record| {
                record.set_recovered(time);
                record.infection_length
            });
        agent.susceptibility = 0.0;
        trace!("person {agent_id} recovered at {time} after {length:?} days");
    }
}

/// Moves a person who died to the nearest cemetery. They leave every group for good.
///
/// # Errors
///
/// Returns a `SimulatorError::Config` if the person does not exist or there is no cemetery.
pub fn bury_the_dead(world: &mut World, agent_id: AgentId, time: f64) -> Result<(), SimulatorError> {
    world.discharge_patient(agent_id);
    let agent = world
        .people
        .get_mut(agent_id)
        .ok_or_else(|| SimulatorError::Config(format!("cannot bury unknown person {agent_id}")))?;
    if let Some(record) = agent.health.as_mut() {
        record.set_dead(time);
    }
    agent.dead = true;
    agent.slots.clear();
    let coordinates = agent.coordinates;
    world
        .cemeteries
        .get_nearest(coordinates)
        .ok_or("there is no cemetery to bury the dead")?
        .add(agent_id);
    trace!("person {agent_id} buried at {time}");
    Ok(())
}
