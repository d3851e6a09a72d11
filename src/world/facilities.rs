use std::collections::BTreeSet;

use crate::world::{squared_distance, AgentId};

/// Subgroup of a hospital group where ward patients spend the step.
pub const WARD_SUBGROUP: usize = 1;
/// Subgroup of a hospital group where intensive care patients spend the step.
pub const ICU_SUBGROUP: usize = 2;
pub const HOSPITAL_SUBGROUPS: usize = 3;

/// The persistent side of a hospital group: capacity and who is admitted. Admissions survive
/// the per-step clearing of group membership.
#[derive(Clone, Debug)]
pub struct Hospital {
    /// Index of the hospital group in the hospital registry.
    pub group: usize,
    pub coordinates: (f64, f64),
    pub n_beds: usize,
    pub n_icu_beds: usize,
    ward: BTreeSet<AgentId>,
    icu: BTreeSet<AgentId>,
}

impl Hospital {
    #[must_use]
    pub fn new(group: usize, coordinates: (f64, f64), n_beds: usize, n_icu_beds: usize) -> Hospital {
        Hospital {
            group,
            coordinates,
            n_beds,
            n_icu_beds,
            ward: BTreeSet::new(),
            icu: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn has_free_bed(&self, intensive_care: bool) -> bool {
        if intensive_care {
            self.icu.len() < self.n_icu_beds
        } else {
            self.ward.len() < self.n_beds
        }
    }

    /// Admits `agent_id`, moving them between ward and ICU if already admitted.
    pub fn admit(&mut self, agent_id: AgentId, intensive_care: bool) {
        if intensive_care {
            self.ward.remove(&agent_id);
            self.icu.insert(agent_id);
        } else {
            self.icu.remove(&agent_id);
            self.ward.insert(agent_id);
        }
    }

    /// Returns true if `agent_id` was admitted here.
    pub fn release(&mut self, agent_id: AgentId) -> bool {
        let in_ward = self.ward.remove(&agent_id);
        let in_icu = self.icu.remove(&agent_id);
        in_ward || in_icu
    }

    #[must_use]
    pub fn is_admitted(&self, agent_id: AgentId) -> bool {
        self.ward.contains(&agent_id) || self.icu.contains(&agent_id)
    }

    #[must_use]
    pub fn ward_patients(&self) -> usize {
        self.ward.len()
    }

    #[must_use]
    pub fn icu_patients(&self) -> usize {
        self.icu.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cemetery {
    pub coordinates: (f64, f64),
    people: Vec<AgentId>,
}

impl Cemetery {
    #[must_use]
    pub fn new(coordinates: (f64, f64)) -> Cemetery {
        Cemetery {
            coordinates,
            people: Vec::new(),
        }
    }

    pub fn add(&mut self, agent_id: AgentId) {
        self.people.push(agent_id);
    }

    #[must_use]
    pub fn people(&self) -> &[AgentId] {
        &self.people
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cemeteries {
    members: Vec<Cemetery>,
}

impl Cemeteries {
    #[must_use]
    pub fn new(members: Vec<Cemetery>) -> Cemeteries {
        Cemeteries { members }
    }

    #[must_use]
    pub fn members(&self) -> &[Cemetery] {
        &self.members
    }

    /// The cemetery closest to `coordinates`; the first one wins a tie.
    pub fn get_nearest(&mut self, coordinates: (f64, f64)) -> Option<&mut Cemetery> {
        let mut nearest: Option<(usize, f64)> = None;
        for (index, cemetery) in self.members.iter().enumerate() {
            let distance = squared_distance(cemetery.coordinates, coordinates);
            match nearest {
                Some((_, best)) if best <= distance => {}
                _ => nearest = Some((index, distance)),
            }
        }
        nearest.map(|(index, _)| &mut self.members[index])
    }

    /// Number of people buried across all cemeteries.
    #[must_use]
    pub fn n_buried(&self) -> usize {
        self.members.iter().map(|cemetery| cemetery.people.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
