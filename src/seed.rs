//! Introduction of the pathogen into the population.
use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use rand::seq::index::sample;
use serde::Deserialize;

use crate::define_rng;
use crate::infection::InfectionSelector;
use crate::random::RandomSource;
use crate::schedule::Step;
use crate::world::{AgentId, Population};
use crate::SimulatorError;

define_rng!(SeedRng);

pub trait InfectionSeed {
    fn min_date(&self) -> NaiveDateTime;

    fn max_date(&self) -> NaiveDateTime;

    /// Whether `date` falls in the seeding window, both ends included.
    fn is_active(&self, date: NaiveDateTime) -> bool {
        self.min_date() <= date && date <= self.max_date()
    }

    /// Infects people at the start of `step` and returns who was infected.
    ///
    /// # Errors
    ///
    /// Returns whatever error the selector raises.
    fn unleash_virus(
        &mut self,
        population: &mut Population,
        selector: &dyn InfectionSelector,
        step: &Step,
        random: &mut RandomSource,
    ) -> Result<Vec<AgentId>, SimulatorError>;

    /// The settings of the seed as `(name, value)` pairs.
    fn parameters(&self) -> Vec<(String, String)> {
        vec![
            ("min_date".to_string(), self.min_date().to_string()),
            ("max_date".to_string(), self.max_date().to_string()),
        ]
    }
}

/// Infects a fixed number of people per day, chosen uniformly among the living susceptible, on
/// the first step of each day inside the window.
#[derive(Clone, Debug, Deserialize)]
pub struct UniformSeed {
    pub min_date: NaiveDateTime,
    pub max_date: NaiveDateTime,
    pub cases_per_day: usize,
    #[serde(skip)]
    last_seeded_day: Option<NaiveDate>,
}

impl UniformSeed {
    #[must_use]
    pub fn new(min_date: NaiveDateTime, max_date: NaiveDateTime, cases_per_day: usize) -> UniformSeed {
        UniformSeed {
            min_date,
            max_date,
            cases_per_day,
            last_seeded_day: None,
        }
    }
}

impl InfectionSeed for UniformSeed {
    fn min_date(&self) -> NaiveDateTime {
        self.min_date
    }

    fn max_date(&self) -> NaiveDateTime {
        self.max_date
    }

    fn unleash_virus(
        &mut self,
        population: &mut Population,
        selector: &dyn InfectionSelector,
        step: &Step,
        random: &mut RandomSource,
    ) -> Result<Vec<AgentId>, SimulatorError> {
        let day = step.date.date();
        if self.last_seeded_day == Some(day) {
            return Ok(Vec::new());
        }
        self.last_seeded_day = Some(day);

        let candidates: Vec<AgentId> = population
            .iter()
            .filter(|agent| agent.is_susceptible())
            .map(|agent| agent.id)
            .collect();
        let n_cases = self.cases_per_day.min(candidates.len());
        let chosen: Vec<AgentId> = random
            .sample(SeedRng, |rng| sample(rng, candidates.len(), n_cases))
            .into_iter()
            .map(|index| candidates[index])
            .collect();
        for agent_id in &chosen {
            if let Some(agent) = population.get_mut(*agent_id) {
                selector.infect_agent_at_time(agent, step.now, random)?;
            }
        }
        info!("{day}: seeded {} infections", chosen.len());
        Ok(chosen)
    }

    fn parameters(&self) -> Vec<(String, String)> {
        vec![
            ("min_date".to_string(), self.min_date.to_string()),
            ("max_date".to_string(), self.max_date.to_string()),
            ("cases_per_day".to_string(), self.cases_per_day.to_string()),
        ]
    }
}
