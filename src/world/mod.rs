//! The population and the places it moves between.
//!
//! A `World` is built once by an external provider and handed to the simulator. The engine only
//! mutates membership (who is in which subgroup this step), health records, hospital admissions
//! and burials; the structure itself never changes during a run.
mod agent;
mod facilities;
mod group;

use std::collections::BTreeMap;

use log::warn;

pub use agent::{ActivitySlots, Agent, AgentId, Population};
pub use facilities::{
    Cemeteries, Cemetery, Hospital, HOSPITAL_SUBGROUPS, ICU_SUBGROUP, WARD_SUBGROUP,
};
pub use group::{squared_distance, Group, GroupId, GroupKind, GroupRegistry, Subgroup, SubgroupRef};

use crate::activity::Activity;
use crate::SimulatorError;

#[derive(Clone, Debug)]
pub struct World {
    pub people: Population,
    registries: BTreeMap<GroupKind, GroupRegistry>,
    pub hospitals: Vec<Hospital>,
    pub cemeteries: Cemeteries,
}

impl World {
    /// Assembles a world and checks that every reference an agent holds resolves.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if two registries share a kind, an agent slot points
    /// to a missing subgroup or to a group of another activity, a living agent has no residence,
    /// a hospital does not match a hospital group, or there is no cemetery.
    pub fn new(
        people: Population,
        registries: Vec<GroupRegistry>,
        hospitals: Vec<Hospital>,
        cemeteries: Cemeteries,
    ) -> Result<World, SimulatorError> {
        let mut by_kind = BTreeMap::new();
        for registry in registries {
            let kind = registry.kind();
            if by_kind.insert(kind, registry).is_some() {
                return Err(SimulatorError::Config(format!(
                    "more than one registry for {kind}"
                )));
            }
        }
        let world = World {
            people,
            registries: by_kind,
            hospitals,
            cemeteries,
        };
        world.validate()?;
        Ok(world)
    }

    fn validate(&self) -> Result<(), SimulatorError> {
        for agent in self.people.iter() {
            for (activity, subgroup) in agent.slots.iter() {
                if subgroup.kind.activity() != activity {
                    return Err(SimulatorError::Config(format!(
                        "person {} attends a {} for {activity}",
                        agent.id, subgroup.kind
                    )));
                }
                let exists = self
                    .group(subgroup)
                    .and_then(|group| group.subgroup(subgroup.subgroup))
                    .is_some();
                if !exists {
                    return Err(SimulatorError::Config(format!(
                        "person {} refers to missing subgroup {subgroup:?}",
                        agent.id
                    )));
                }
            }
            if !agent.dead && agent.residence().is_none() {
                return Err(SimulatorError::Config(format!(
                    "person {} has no residence",
                    agent.id
                )));
            }
        }

        for hospital in &self.hospitals {
            let group = self
                .registry(GroupKind::Hospital)
                .and_then(|registry| registry.get(hospital.group));
            match group {
                Some(group) if group.subgroups().len() >= HOSPITAL_SUBGROUPS => {}
                _ => {
                    return Err(SimulatorError::Config(format!(
                        "hospital {} needs a hospital group with {HOSPITAL_SUBGROUPS} subgroups",
                        hospital.group
                    )));
                }
            }
        }

        if self.cemeteries.is_empty() {
            return Err("a world needs at least one cemetery".into());
        }
        Ok(())
    }

    #[must_use]
    pub fn registry(&self, kind: GroupKind) -> Option<&GroupRegistry> {
        self.registries.get(&kind)
    }

    pub fn registry_mut(&mut self, kind: GroupKind) -> Option<&mut GroupRegistry> {
        self.registries.get_mut(&kind)
    }

    /// Registries in `GroupKind` order.
    pub fn registries(&self) -> impl Iterator<Item = &GroupRegistry> {
        self.registries.values()
    }

    pub fn registries_mut(&mut self) -> impl Iterator<Item = &mut GroupRegistry> {
        self.registries.values_mut()
    }

    #[must_use]
    pub fn group(&self, subgroup: SubgroupRef) -> Option<&Group> {
        self.registry(subgroup.kind)
            .and_then(|registry| registry.get(subgroup.group))
    }

    pub fn group_mut(&mut self, subgroup: SubgroupRef) -> Option<&mut Group> {
        self.registry_mut(subgroup.kind)
            .and_then(|registry| registry.get_mut(subgroup.group))
    }

    pub fn subgroup_mut(&mut self, subgroup: SubgroupRef) -> Option<&mut Subgroup> {
        self.group_mut(subgroup)
            .and_then(|group| group.subgroup_mut(subgroup.subgroup))
    }

    /// Index into `hospitals` of the hospital `agent_id` is admitted to.
    #[must_use]
    pub fn admission(&self, agent_id: AgentId) -> Option<usize> {
        self.hospitals
            .iter()
            .position(|hospital| hospital.is_admitted(agent_id))
    }

    fn nearest_hospital(&self, coordinates: (f64, f64), intensive_care: bool) -> Option<usize> {
        let nearest = |with_bed: bool| {
            self.hospitals
                .iter()
                .enumerate()
                .filter(|(_, hospital)| !with_bed || hospital.has_free_bed(intensive_care))
                .min_by(|(_, a), (_, b)| {
                    squared_distance(a.coordinates, coordinates)
                        .total_cmp(&squared_distance(b.coordinates, coordinates))
                })
                .map(|(index, _)| index)
        };
        nearest(true).or_else(|| {
            warn!("no free hospital bed (intensive care: {intensive_care}), using nearest hospital");
            nearest(false)
        })
    }

    /// Admits `agent_id` to the hospital they are already in, or else to the nearest one with a
    /// free bed, and points their medical facility slot at the ward or ICU. Returns false when
    /// the world has no hospital.
    pub fn admit_patient(&mut self, agent_id: AgentId, intensive_care: bool) -> bool {
        let Some(coordinates) = self.people.get(agent_id).map(|agent| agent.coordinates) else {
            return false;
        };
        let target = self
            .admission(agent_id)
            .or_else(|| self.nearest_hospital(coordinates, intensive_care));
        let Some(target) = target else {
            warn!("person {agent_id} needs care but there are no hospitals");
            return false;
        };
        let hospital = &mut self.hospitals[target];
        hospital.admit(agent_id, intensive_care);
        let subgroup = if intensive_care {
            ICU_SUBGROUP
        } else {
            WARD_SUBGROUP
        };
        let slot = SubgroupRef::new(GroupKind::Hospital, hospital.group, subgroup);
        if let Some(agent) = self.people.get_mut(agent_id) {
            agent.slots.set(Activity::MedicalFacility, Some(slot));
        }
        true
    }

    /// Releases `agent_id` from any hospital and empties their medical facility slot.
    pub fn discharge_patient(&mut self, agent_id: AgentId) {
        for hospital in &mut self.hospitals {
            hospital.release(agent_id);
        }
        if let Some(agent) = self.people.get_mut(agent_id) {
            agent.slots.set(Activity::MedicalFacility, None);
        }
    }

    /// Empties every group. Groups themselves persist.
    pub fn clear_groups(&mut self) {
        for registry in self.registries.values_mut() {
            registry.clear();
        }
    }
}
