//! The transmission engine.
//!
//! Inside a group, a susceptible person in subgroup `i` is exposed to the infectious people of
//! every subgroup `j` through the contact matrix of the group kind:
//!
//! ```text
//! effective_ij = contacts_ij * (1 + (alpha_physical - 1) * physical_ij)
//! exponent     = beta * duration * sum_j effective_ij * T_j / n_j
//! p            = 1 - exp(-exponent * susceptibility)
//! ```
//!
//! where `T_j` is the summed transmission probability of the infectious people in subgroup `j`
//! and `n_j` is the number of people in `j` the susceptible person can meet (themself excluded).
use std::collections::BTreeMap;
use std::path::Path;

use log::trace;
use serde::Deserialize;

use crate::config::load_json;
use crate::define_rng;
use crate::random::RandomSource;
use crate::world::{AgentId, Group, GroupKind, Population};
use crate::{HashMap, SimulatorError};

define_rng!(TransmissionRng);

fn default_alpha_physical() -> f64 {
    1.0
}

/// Contact intensities between the subgroups of a group kind. `physical` is the fraction of
/// contacts that are physical.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ContactMatrix {
    pub contacts: Vec<Vec<f64>>,
    pub physical: Vec<Vec<f64>>,
}

impl ContactMatrix {
    fn validate(&self, kind: GroupKind) -> Result<(), SimulatorError> {
        let n = self.contacts.len();
        let square = |matrix: &Vec<Vec<f64>>| matrix.len() == n && matrix.iter().all(|row| row.len() == n);
        if !square(&self.contacts) || !square(&self.physical) {
            return Err(SimulatorError::Config(format!(
                "contact matrices of {kind} must be square and of equal size"
            )));
        }
        let valid = self.contacts.iter().flatten().all(|c| *c >= 0.0)
            && self
                .physical
                .iter()
                .flatten()
                .all(|p| (0.0..=1.0).contains(p));
        if !valid {
            return Err(SimulatorError::Config(format!(
                "contact matrices of {kind} hold negative contacts or physical fractions outside [0, 1]"
            )));
        }
        Ok(())
    }

    /// Entries outside the matrix behave as one contact, none of it physical.
    fn entry(&self, i: usize, j: usize) -> (f64, f64) {
        let contacts = self
            .contacts
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(1.0);
        let physical = self
            .physical
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(0.0);
        (contacts, physical)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct InteractionConfig {
    pub beta: BTreeMap<GroupKind, f64>,
    #[serde(default = "default_alpha_physical")]
    pub alpha_physical: f64,
    #[serde(default)]
    pub contact_matrices: BTreeMap<GroupKind, ContactMatrix>,
}

/// Transmission intensities. The baseline is what was configured; the live values are what
/// policies leave after adjusting them for the current step.
#[derive(Clone, Debug)]
pub struct Interaction {
    baseline_beta: HashMap<GroupKind, f64>,
    beta: HashMap<GroupKind, f64>,
    baseline_alpha_physical: f64,
    alpha_physical: f64,
    contact_matrices: HashMap<GroupKind, ContactMatrix>,
}

impl Interaction {
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if a `beta` or `alpha_physical` is negative or a
    /// contact matrix is malformed.
    pub fn new(config: InteractionConfig) -> Result<Interaction, SimulatorError> {
        if let Some((kind, beta)) = config.beta.iter().find(|(_, beta)| **beta < 0.0) {
            return Err(SimulatorError::Config(format!(
                "beta of {kind} is negative ({beta})"
            )));
        }
        if config.alpha_physical < 0.0 {
            return Err("alpha_physical must not be negative".into());
        }
        for (kind, matrix) in &config.contact_matrices {
            matrix.validate(*kind)?;
        }
        let beta: HashMap<GroupKind, f64> = config.beta.into_iter().collect();
        Ok(Interaction {
            baseline_beta: beta.clone(),
            beta,
            baseline_alpha_physical: config.alpha_physical,
            alpha_physical: config.alpha_physical,
            contact_matrices: config.contact_matrices.into_iter().collect(),
        })
    }

    /// # Errors
    ///
    /// Returns a `SimulatorError` if the file cannot be read or parsed, or
    /// [`Interaction::new`] rejects it.
    pub fn from_file(path: &Path) -> Result<Interaction, SimulatorError> {
        Interaction::new(load_json(path)?)
    }

    /// Live `beta` of a group kind. Unconfigured kinds do not transmit.
    #[must_use]
    pub fn beta(&self, kind: GroupKind) -> f64 {
        self.beta.get(&kind).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn alpha_physical(&self) -> f64 {
        self.alpha_physical
    }

    /// Live `alpha_physical` and `beta` per configured kind, kinds in declaration order.
    #[must_use]
    pub fn parameters(&self) -> Vec<(String, String)> {
        let mut kinds: Vec<GroupKind> = self.beta.keys().copied().collect();
        kinds.sort();
        let mut parameters = vec![("alpha_physical".to_string(), self.alpha_physical.to_string())];
        parameters.extend(
            kinds
                .into_iter()
                .map(|kind| (format!("beta.{kind}"), self.beta(kind).to_string())),
        );
        parameters
    }

    #[must_use]
    pub fn contact_matrix(&self, kind: GroupKind) -> Option<&ContactMatrix> {
        self.contact_matrices.get(&kind)
    }

    pub fn reset_to_baseline(&mut self) {
        self.beta.clone_from(&self.baseline_beta);
        self.alpha_physical = self.baseline_alpha_physical;
    }

    pub fn scale_beta(&mut self, kind: GroupKind, factor: f64) {
        if let Some(beta) = self.beta.get_mut(&kind) {
            *beta *= factor;
        }
    }

    pub fn scale_alpha_physical(&mut self, factor: f64) {
        self.alpha_physical *= factor;
    }

    /// Infection probability of every susceptible person in `group` over `duration` days.
    #[must_use]
    pub fn infection_probabilities(
        &self,
        group: &InteractiveGroup,
        duration: f64,
    ) -> Vec<(AgentId, f64)> {
        if !group.must_timestep() {
            return Vec::new();
        }
        let beta = self.beta(group.kind);
        let matrix = self.contact_matrix(group.kind);
        let mut probabilities = Vec::new();
        for (i, susceptible) in group.susceptible.iter().enumerate() {
            if susceptible.is_empty() {
                continue;
            }
            let mut exposure = 0.0;
            for (j, infectors) in group.infectors.iter().enumerate() {
                if infectors.is_empty() {
                    continue;
                }
                let (contacts, physical) = matrix.map_or((1.0, 0.0), |m| m.entry(i, j));
                let effective = contacts * (1.0 + (self.alpha_physical - 1.0) * physical);
                let others = if i == j {
                    group.subgroup_sizes[j].saturating_sub(1)
                } else {
                    group.subgroup_sizes[j]
                };
                let transmission: f64 = infectors.iter().map(|(_, t)| t).sum();
                exposure += effective * transmission / others.max(1) as f64;
            }
            let exponent = beta * duration * exposure;
            for (agent_id, susceptibility) in susceptible {
                let p = 1.0 - (-exponent * susceptibility).exp();
                probabilities.push((*agent_id, p));
            }
        }
        probabilities
    }

    /// Draws the people infected in `group` during a step of `duration` days.
    pub fn time_step_for_group(
        &self,
        duration: f64,
        group: &InteractiveGroup,
        random: &mut RandomSource,
    ) -> Vec<AgentId> {
        let infected: Vec<AgentId> = self
            .infection_probabilities(group, duration)
            .into_iter()
            .filter(|(_, p)| random.sample_bool(TransmissionRng, *p))
            .map(|(agent_id, _)| agent_id)
            .collect();
        if !infected.is_empty() {
            trace!("{} {} infected {infected:?}", group.kind, group.group);
        }
        infected
    }
}

/// A per-step view of one group, split into who can catch and who can pass on the infection.
#[derive(Clone, Debug)]
pub struct InteractiveGroup {
    pub kind: GroupKind,
    /// Position of the group in its registry.
    pub group: usize,
    subgroup_sizes: Vec<usize>,
    /// `(person, susceptibility)` per subgroup.
    susceptible: Vec<Vec<(AgentId, f64)>>,
    /// `(person, transmission probability)` per subgroup.
    infectors: Vec<Vec<(AgentId, f64)>>,
    size: usize,
}

impl InteractiveGroup {
    #[must_use]
    pub fn new(group_index: usize, group: &Group, population: &Population) -> InteractiveGroup {
        let n_subgroups = group.subgroups().len();
        let mut susceptible = vec![Vec::new(); n_subgroups];
        let mut infectors = vec![Vec::new(); n_subgroups];
        let mut subgroup_sizes = Vec::with_capacity(n_subgroups);
        for (index, subgroup) in group.subgroups().iter().enumerate() {
            subgroup_sizes.push(subgroup.len());
            for agent in subgroup.people().iter().filter_map(|id| population.get(*id)) {
                if agent.is_susceptible() {
                    susceptible[index].push((agent.id, agent.susceptibility));
                } else if let Some(record) = agent.health.as_ref().filter(|_| !agent.dead) {
                    if record.is_infectious() {
                        infectors[index].push((agent.id, record.transmission_probability()));
                    }
                }
            }
        }
        InteractiveGroup {
            kind: group.kind,
            group: group_index,
            size: subgroup_sizes.iter().sum(),
            subgroup_sizes,
            susceptible,
            infectors,
        }
    }

    /// Everyone present, whatever their health.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transmission only happens where someone can infect and someone can be infected.
    #[must_use]
    pub fn must_timestep(&self) -> bool {
        self.susceptible.iter().any(|s| !s.is_empty()) && self.infectors.iter().any(|s| !s.is_empty())
    }

    pub fn susceptible_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.susceptible.iter().flatten().map(|(id, _)| *id)
    }

    pub fn infector_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.infectors.iter().flatten().map(|(id, _)| *id)
    }

    /// Splits the credit for `n_infected` new infections among the infectors in proportion to
    /// their transmission probability.
    #[must_use]
    pub fn attribute_infections(&self, n_infected: usize) -> Vec<(AgentId, f64)> {
        let total: f64 = self.infectors.iter().flatten().map(|(_, t)| t).sum();
        if n_infected == 0 || total <= 0.0 {
            return Vec::new();
        }
        self.infectors
            .iter()
            .flatten()
            .map(|(agent_id, t)| (*agent_id, n_infected as f64 * t / total))
            .collect()
    }
}
