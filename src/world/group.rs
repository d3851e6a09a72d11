use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::activity::Activity;
use crate::world::AgentId;
use crate::SimulatorError;

/// The kind of location a [`Group`] is. Each kind belongs to exactly one [`Activity`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GroupKind {
    Hospital,
    CommuteUnit,
    School,
    Company,
    University,
    Pub,
    Cinema,
    Grocery,
    Household,
    CareHome,
}

impl GroupKind {
    pub const ALL: [GroupKind; 10] = [
        GroupKind::Hospital,
        GroupKind::CommuteUnit,
        GroupKind::School,
        GroupKind::Company,
        GroupKind::University,
        GroupKind::Pub,
        GroupKind::Cinema,
        GroupKind::Grocery,
        GroupKind::Household,
        GroupKind::CareHome,
    ];

    #[must_use]
    pub fn activity(self) -> Activity {
        match self {
            GroupKind::Hospital => Activity::MedicalFacility,
            GroupKind::CommuteUnit => Activity::Commute,
            GroupKind::School | GroupKind::Company | GroupKind::University => {
                Activity::PrimaryActivity
            }
            GroupKind::Pub | GroupKind::Cinema | GroupKind::Grocery => Activity::Leisure,
            GroupKind::Household | GroupKind::CareHome => Activity::Residence,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            GroupKind::Hospital => "hospital",
            GroupKind::CommuteUnit => "commute_unit",
            GroupKind::School => "school",
            GroupKind::Company => "company",
            GroupKind::University => "university",
            GroupKind::Pub => "pub",
            GroupKind::Cinema => "cinema",
            GroupKind::Grocery => "grocery",
            GroupKind::Household => "household",
            GroupKind::CareHome => "care_home",
        }
    }
}

impl Display for GroupKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupKind {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SimulatorError::Config(format!("unknown group kind `{s}`")))
    }
}

impl TryFrom<String> for GroupKind {
    type Error = SimulatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupKind> for String {
    fn from(kind: GroupKind) -> Self {
        kind.name().to_string()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct GroupId(pub usize);

/// Identifies one subgroup: the group kind, the group's position in its registry and the
/// subgroup's position in the group. Agents hold these instead of references.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SubgroupRef {
    pub kind: GroupKind,
    pub group: usize,
    pub subgroup: usize,
}

impl SubgroupRef {
    #[must_use]
    pub fn new(kind: GroupKind, group: usize, subgroup: usize) -> SubgroupRef {
        SubgroupRef {
            kind,
            group,
            subgroup,
        }
    }
}

/// The people present in one part of a group during the current step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subgroup {
    people: Vec<AgentId>,
}

impl Subgroup {
    pub fn append(&mut self, agent_id: AgentId) {
        self.people.push(agent_id);
    }

    pub fn clear(&mut self) {
        self.people.clear();
    }

    #[must_use]
    pub fn people(&self) -> &[AgentId] {
        &self.people
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.people.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Group {
    pub id: GroupId,
    pub kind: GroupKind,
    pub coordinates: (f64, f64),
    subgroups: Vec<Subgroup>,
    /// Set when a resident first shows symptoms.
    pub quarantine_starting_time: Option<f64>,
}

impl Group {
    #[must_use]
    pub fn new(id: GroupId, kind: GroupKind, n_subgroups: usize, coordinates: (f64, f64)) -> Group {
        Group {
            id,
            kind,
            coordinates,
            subgroups: vec![Subgroup::default(); n_subgroups.max(1)],
            quarantine_starting_time: None,
        }
    }

    #[must_use]
    pub fn subgroups(&self) -> &[Subgroup] {
        &self.subgroups
    }

    #[must_use]
    pub fn subgroup(&self, index: usize) -> Option<&Subgroup> {
        self.subgroups.get(index)
    }

    pub fn subgroup_mut(&mut self, index: usize) -> Option<&mut Subgroup> {
        self.subgroups.get_mut(index)
    }

    /// Everyone present, across subgroups.
    #[must_use]
    pub fn size(&self) -> usize {
        self.subgroups.iter().map(Subgroup::len).sum()
    }

    pub fn people(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.subgroups
            .iter()
            .flat_map(|subgroup| subgroup.people().iter().copied())
    }

    pub fn clear(&mut self) {
        for subgroup in &mut self.subgroups {
            subgroup.clear();
        }
    }
}

/// Every group of one kind, in a stable order.
#[derive(Clone, Debug)]
pub struct GroupRegistry {
    kind: GroupKind,
    members: Vec<Group>,
}

impl GroupRegistry {
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if a group is of a different kind.
    pub fn new(kind: GroupKind, members: Vec<Group>) -> Result<GroupRegistry, SimulatorError> {
        if let Some(group) = members.iter().find(|group| group.kind != kind) {
            return Err(SimulatorError::Config(format!(
                "group {:?} of kind {} registered as {kind}",
                group.id, group.kind
            )));
        }
        Ok(GroupRegistry { kind, members })
    }

    #[must_use]
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    #[must_use]
    pub fn members(&self) -> &[Group] {
        &self.members
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Group> {
        self.members.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Group> {
        self.members.get_mut(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        for group in &mut self.members {
            group.clear();
        }
    }

    /// Indexes of the `n` groups closest to `coordinates`, nearest first. Ties keep registry
    /// order.
    #[must_use]
    pub fn closest(&self, coordinates: (f64, f64), n: usize) -> Vec<usize> {
        let mut indexes: Vec<usize> = (0..self.members.len()).collect();
        indexes.sort_by(|a, b| {
            let da = squared_distance(self.members[*a].coordinates, coordinates);
            let db = squared_distance(self.members[*b].coordinates, coordinates);
            da.total_cmp(&db)
        });
        indexes.truncate(n);
        indexes
    }
}

#[must_use]
pub fn squared_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}
