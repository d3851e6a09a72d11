use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::activity::Activity;
use crate::health::HealthRecord;
use crate::world::SubgroupRef;
use crate::SimulatorError;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One group-membership slot per [`Activity`], each either empty or a reference to the
/// subgroup the agent attends for that activity.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ActivitySlots([Option<SubgroupRef>; Activity::COUNT]);

impl ActivitySlots {
    #[must_use]
    pub fn get(&self, activity: Activity) -> Option<SubgroupRef> {
        self.0[activity.index()]
    }

    pub fn set(&mut self, activity: Activity, subgroup: Option<SubgroupRef>) {
        self.0[activity.index()] = subgroup;
    }

    pub fn clear(&mut self) {
        self.0 = [None; Activity::COUNT];
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Activity, SubgroupRef)> + '_ {
        Activity::ALL
            .iter()
            .filter_map(|activity| self.get(*activity).map(|subgroup| (*activity, subgroup)))
    }
}

#[derive(Clone, Debug)]
pub struct Agent {
    pub id: AgentId,
    pub age: u8,
    pub susceptibility: f64,
    /// Present while infected or recovering; kept with a `Dead` stage after burial.
    pub health: Option<HealthRecord>,
    pub busy: bool,
    pub dead: bool,
    pub coordinates: (f64, f64),
    pub slots: ActivitySlots,
}

impl Agent {
    #[must_use]
    pub fn new(id: AgentId, age: u8, coordinates: (f64, f64)) -> Agent {
        Agent {
            id,
            age,
            susceptibility: 1.0,
            health: None,
            busy: false,
            dead: false,
            coordinates,
            slots: ActivitySlots::default(),
        }
    }

    #[must_use]
    pub fn with_slot(mut self, activity: Activity, subgroup: SubgroupRef) -> Agent {
        self.slots.set(activity, Some(subgroup));
        self
    }

    #[must_use]
    pub fn residence(&self) -> Option<SubgroupRef> {
        self.slots.get(Activity::Residence)
    }

    /// Carries an infection that is still running its course.
    #[must_use]
    pub fn is_infected(&self) -> bool {
        !self.dead && self.health.is_some()
    }

    #[must_use]
    pub fn is_susceptible(&self) -> bool {
        !self.dead && self.health.is_none() && self.susceptibility > 0.0
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.dead && !self.busy
    }
}

/// Agents sorted by identifier. Identifiers are contiguous, so an agent is found at
/// `id - first_id`.
#[derive(Clone, Debug, Default)]
pub struct Population {
    agents: Vec<Agent>,
    first_id: usize,
}

impl Population {
    /// Sorts `agents` by identifier.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if identifiers are duplicated or not contiguous.
    pub fn new(mut agents: Vec<Agent>) -> Result<Population, SimulatorError> {
        agents.sort_by_key(|agent| agent.id);
        let first_id = agents.first().map_or(0, |agent| agent.id.0);
        for (offset, agent) in agents.iter().enumerate() {
            if agent.id.0 != first_id + offset {
                return Err(SimulatorError::Config(format!(
                    "person ids must be unique and contiguous, found {} at offset {offset} from {first_id}",
                    agent.id
                )));
            }
        }
        Ok(Population { agents, first_id })
    }

    fn offset(&self, id: AgentId) -> Option<usize> {
        id.0.checked_sub(self.first_id)
            .filter(|offset| *offset < self.agents.len())
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.offset(id).map(|offset| &self.agents[offset])
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.offset(id).map(|offset| &mut self.agents[offset])
    }

    #[must_use]
    pub fn first_id(&self) -> usize {
        self.first_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Agent> {
        self.agents.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Agent> {
        self.agents.iter_mut()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|agent| agent.id).collect()
    }

    /// Living agents that currently carry a health record.
    #[must_use]
    pub fn infected_ids(&self) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|agent| agent.is_infected())
            .map(|agent| agent.id)
            .collect()
    }

    #[must_use]
    pub fn n_dead(&self) -> usize {
        self.agents.iter().filter(|agent| agent.dead).count()
    }
}
