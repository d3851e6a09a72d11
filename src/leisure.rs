//! Leisure providers send people out to pubs, cinemas and groceries.
use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::activity::Activity;
use crate::config::load_json;
use crate::define_rng;
use crate::random::RandomSource;
use crate::schedule::{DayTypeMap, Step};
use crate::world::{AgentId, GroupKind, SubgroupRef, World};
use crate::SimulatorError;

define_rng!(LeisureRng);

pub trait LeisureProvider {
    /// Picks the leisure subgroup `agent_id` attends during `step`, if they go out at all.
    fn get_subgroup_for_agent(
        &mut self,
        world: &World,
        agent_id: AgentId,
        step: &Step,
        random: &mut RandomSource,
    ) -> Option<SubgroupRef>;
}

fn default_n_closest() -> usize {
    5
}

#[derive(Clone, Debug, Deserialize)]
pub struct LeisureConfig {
    /// Expected visits per day to each kind of venue.
    pub rates: BTreeMap<GroupKind, DayTypeMap<f64>>,
    /// How many of the nearest venues of a kind a person chooses from.
    #[serde(default = "default_n_closest")]
    pub n_closest: usize,
}

/// Visits arrive as a Poisson process per venue kind. A person who goes out picks a kind in
/// proportion to its rate and then one of the nearest venues of that kind uniformly.
#[derive(Clone, Debug)]
pub struct VenueLeisure {
    kinds: Vec<GroupKind>,
    weekday_rates: Vec<f64>,
    weekend_rates: Vec<f64>,
    n_closest: usize,
}

impl VenueLeisure {
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if a kind is not a leisure venue, a rate is negative
    /// or `n_closest` is zero.
    pub fn new(config: LeisureConfig) -> Result<VenueLeisure, SimulatorError> {
        if config.n_closest == 0 {
            return Err("n_closest must be at least one".into());
        }
        let mut leisure = VenueLeisure {
            kinds: Vec::new(),
            weekday_rates: Vec::new(),
            weekend_rates: Vec::new(),
            n_closest: config.n_closest,
        };
        for (kind, rates) in config.rates {
            if kind.activity() != Activity::Leisure {
                return Err(SimulatorError::Config(format!("{kind} is not a leisure venue")));
            }
            if rates.weekday < 0.0 || rates.weekend < 0.0 {
                return Err(SimulatorError::Config(format!("{kind} has a negative visit rate")));
            }
            leisure.kinds.push(kind);
            leisure.weekday_rates.push(rates.weekday);
            leisure.weekend_rates.push(rates.weekend);
        }
        Ok(leisure)
    }

    /// # Errors
    ///
    /// Returns a `SimulatorError` if the file cannot be read or parsed, or the configuration is
    /// rejected by [`VenueLeisure::new`].
    pub fn from_file(path: &Path) -> Result<VenueLeisure, SimulatorError> {
        VenueLeisure::new(load_json(path)?)
    }
}

impl LeisureProvider for VenueLeisure {
    fn get_subgroup_for_agent(
        &mut self,
        world: &World,
        agent_id: AgentId,
        step: &Step,
        random: &mut RandomSource,
    ) -> Option<SubgroupRef> {
        let agent = world.people.get(agent_id)?;
        let rates = if step.is_weekend {
            &self.weekend_rates
        } else {
            &self.weekday_rates
        };
        let total: f64 = rates.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let p_out = 1.0 - (-total * step.duration).exp();
        if !random.sample_bool(LeisureRng, p_out) {
            return None;
        }
        let kind = self.kinds[random.sample_weighted(LeisureRng, rates.as_slice())];
        let venues = world.registry(kind)?.closest(agent.coordinates, self.n_closest);
        if venues.is_empty() {
            return None;
        }
        let venue = venues[random.sample_range(LeisureRng, 0..venues.len())];
        Some(SubgroupRef::new(kind, venue, 0))
    }
}
