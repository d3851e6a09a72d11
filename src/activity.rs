//! Group assignment: puts every available person into exactly one subgroup per step.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::leisure::LeisureProvider;
use crate::random::RandomSource;
use crate::schedule::Step;
use crate::world::{AgentId, GroupKind, SubgroupRef, World};
use crate::SimulatorError;

/// What a person can be doing during a step. Declaration order is the activity hierarchy:
/// a person attends the first active activity for which they have somewhere to go.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Activity {
    MedicalFacility,
    Commute,
    PrimaryActivity,
    Leisure,
    Residence,
}

impl Activity {
    pub const COUNT: usize = 5;
    pub const ALL: [Activity; Activity::COUNT] = [
        Activity::MedicalFacility,
        Activity::Commute,
        Activity::PrimaryActivity,
        Activity::Leisure,
        Activity::Residence,
    ];

    /// Position in the hierarchy, also the index of the activity's slot.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Activity::MedicalFacility => "medical_facility",
            Activity::Commute => "commute",
            Activity::PrimaryActivity => "primary_activity",
            Activity::Leisure => "leisure",
            Activity::Residence => "residence",
        }
    }

    /// The group kinds a person can attend for this activity.
    #[must_use]
    pub fn group_kinds(self) -> &'static [GroupKind] {
        match self {
            Activity::MedicalFacility => &[GroupKind::Hospital],
            Activity::Commute => &[GroupKind::CommuteUnit],
            Activity::PrimaryActivity => {
                &[GroupKind::School, GroupKind::Company, GroupKind::University]
            }
            Activity::Leisure => &[GroupKind::Pub, GroupKind::Cinema, GroupKind::Grocery],
            Activity::Residence => &[GroupKind::Household, GroupKind::CareHome],
        }
    }
}

impl Display for Activity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activity {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Activity::ALL
            .into_iter()
            .find(|activity| activity.name() == s)
            .ok_or_else(|| {
                SimulatorError::Config(format!("activity `{s}` is not in the activity hierarchy"))
            })
    }
}

impl TryFrom<String> for Activity {
    type Error = SimulatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Activity> for String {
    fn from(activity: Activity) -> Self {
        activity.name().to_string()
    }
}

/// Moves people into the subgroups of the activities active in a step, and back out again.
#[derive(Debug, Default)]
pub struct ActivityManager;

impl ActivityManager {
    #[must_use]
    pub fn new() -> ActivityManager {
        ActivityManager
    }

    /// The activities a step makes active, in hierarchy order. Medical facilities are always
    /// active when anything is, so admitted patients stay in hospital. Residence is too, as the
    /// fallback for everyone the other activities leave without a place.
    #[must_use]
    pub fn active_activities(activities: &[Activity]) -> Vec<Activity> {
        let mut active = activities.to_vec();
        if !active.is_empty() {
            active.push(Activity::MedicalFacility);
            active.push(Activity::Residence);
        }
        active.sort();
        active.dedup();
        active
    }

    /// Places every living, non-busy person into one subgroup and marks them busy. Returns the
    /// active activities, whose group kinds are the ones transmission must visit this step.
    pub fn do_timestep(
        &self,
        world: &mut World,
        step: &Step,
        mut leisure: Option<&mut dyn LeisureProvider>,
        random: &mut RandomSource,
    ) -> Vec<Activity> {
        let active = Self::active_activities(&step.activities);
        if active.is_empty() {
            return active;
        }

        let mut n_assigned = 0;
        for agent_id in world.people.ids() {
            let mut target = None;
            for activity in &active {
                let Some(agent) = world.people.get(agent_id) else {
                    break;
                };
                if !agent.is_available() {
                    break;
                }
                let subgroup = match (activity, leisure.as_deref_mut()) {
                    (Activity::Leisure, Some(provider)) => {
                        let venue = provider.get_subgroup_for_agent(world, agent_id, step, random);
                        if let Some(agent) = world.people.get_mut(agent_id) {
                            agent.slots.set(Activity::Leisure, venue);
                        }
                        venue
                    }
                    _ => agent.slots.get(*activity),
                };
                if subgroup.is_some() {
                    target = subgroup;
                    break;
                }
            }

            let Some(agent) = world.people.get(agent_id) else {
                continue;
            };
            if !agent.is_available() {
                continue;
            }
            let Some(target) = target.or_else(|| agent.residence()) else {
                warn!("person {agent_id} has nowhere to go");
                continue;
            };
            if Self::place(world, agent_id, target) {
                n_assigned += 1;
            }
        }
        debug!(
            "assigned {n_assigned} people for {}",
            active
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        active
    }

    fn place(world: &mut World, agent_id: AgentId, target: SubgroupRef) -> bool {
        let Some(subgroup) = world.subgroup_mut(target) else {
            warn!("person {agent_id} refers to missing subgroup {target:?}");
            return false;
        };
        subgroup.append(agent_id);
        trace!("person {agent_id} goes to {} {}", target.kind, target.group);
        if let Some(agent) = world.people.get_mut(agent_id) {
            agent.busy = true;
        }
        true
    }

    /// Empties every subgroup, frees every person and forgets this step's leisure venues.
    pub fn clear_world(&self, world: &mut World) {
        world.clear_groups();
        for agent in world.people.iter_mut() {
            agent.busy = false;
            agent.slots.set(Activity::Leisure, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Step;
    use crate::world::test_support::households_world;
    use crate::world::{Agent, Cemeteries, Cemetery, Group, GroupId, GroupRegistry, Population};
    use chrono::NaiveDate;

    fn step(activities: &[Activity]) -> Step {
        Step {
            date: NaiveDate::from_ymd_opt(2020, 3, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            now: 0.0,
            duration: 0.5,
            activities: activities.to_vec(),
            is_weekend: false,
            shift: 0,
        }
    }

    fn school_world() -> World {
        let households = vec![Group::new(GroupId(0), GroupKind::Household, 1, (0.0, 0.0))];
        let schools = vec![Group::new(GroupId(0), GroupKind::School, 2, (1.0, 0.0))];
        let home = SubgroupRef::new(GroupKind::Household, 0, 0);
        let agents = vec![
            Agent::new(AgentId(0), 40, (0.0, 0.0)).with_slot(Activity::Residence, home),
            Agent::new(AgentId(1), 8, (0.0, 0.0))
                .with_slot(Activity::Residence, home)
                .with_slot(
                    Activity::PrimaryActivity,
                    SubgroupRef::new(GroupKind::School, 0, 1),
                ),
        ];
        World::new(
            Population::new(agents).unwrap(),
            vec![
                GroupRegistry::new(GroupKind::Household, households).unwrap(),
                GroupRegistry::new(GroupKind::School, schools).unwrap(),
            ],
            vec![],
            Cemeteries::new(vec![Cemetery::new((0.0, 0.0))]),
        )
        .unwrap()
    }

    fn members(world: &World, subgroup: SubgroupRef) -> Vec<AgentId> {
        world
            .group(subgroup)
            .unwrap()
            .subgroup(subgroup.subgroup)
            .unwrap()
            .people()
            .to_vec()
    }

    #[test]
    fn activities_parse_in_hierarchy_order() {
        assert_eq!(
            "primary_activity".parse::<Activity>().unwrap(),
            Activity::PrimaryActivity
        );
        assert!("sleeping".parse::<Activity>().is_err());
        assert!(Activity::MedicalFacility < Activity::Residence);
        for (index, activity) in Activity::ALL.iter().enumerate() {
            assert_eq!(activity.index(), index);
        }
    }

    #[test]
    fn medical_facility_is_always_active() {
        assert_eq!(
            ActivityManager::active_activities(&[Activity::Residence, Activity::Leisure]),
            vec![
                Activity::MedicalFacility,
                Activity::Leisure,
                Activity::Residence
            ]
        );
        assert!(ActivityManager::active_activities(&[]).is_empty());
    }

    #[test]
    fn residence_is_active_as_fallback() {
        assert_eq!(
            ActivityManager::active_activities(&[Activity::PrimaryActivity]),
            vec![
                Activity::MedicalFacility,
                Activity::PrimaryActivity,
                Activity::Residence
            ]
        );
    }

    #[test]
    fn hierarchy_picks_first_available_slot() {
        let mut world = school_world();
        let mut random = RandomSource::new(0);
        let manager = ActivityManager::new();
        manager.do_timestep(
            &mut world,
            &step(&[Activity::PrimaryActivity, Activity::Residence]),
            None,
            &mut random,
        );
        let home = SubgroupRef::new(GroupKind::Household, 0, 0);
        let class = SubgroupRef::new(GroupKind::School, 0, 1);
        assert_eq!(members(&world, home), vec![AgentId(0)]);
        assert_eq!(members(&world, class), vec![AgentId(1)]);
        assert!(world.people.iter().all(|agent| agent.busy));
    }

    #[test]
    fn people_fall_back_to_residence() {
        let mut world = school_world();
        let mut random = RandomSource::new(0);
        ActivityManager::new().do_timestep(
            &mut world,
            &step(&[Activity::Commute]),
            None,
            &mut random,
        );
        let home = SubgroupRef::new(GroupKind::Household, 0, 0);
        assert_eq!(members(&world, home), vec![AgentId(0), AgentId(1)]);
    }

    #[test]
    fn dead_people_are_not_placed() {
        let mut world = households_world(1, 3);
        world.people.get_mut(AgentId(1)).unwrap().dead = true;
        let mut random = RandomSource::new(0);
        ActivityManager::new().do_timestep(
            &mut world,
            &step(&[Activity::Residence]),
            None,
            &mut random,
        );
        let home = SubgroupRef::new(GroupKind::Household, 0, 0);
        assert_eq!(members(&world, home), vec![AgentId(0), AgentId(2)]);
    }

    #[test]
    fn clear_then_assign_is_idempotent() {
        let mut world = school_world();
        let mut random = RandomSource::new(0);
        let manager = ActivityManager::new();
        let step = step(&[Activity::PrimaryActivity, Activity::Residence]);

        manager.do_timestep(&mut world, &step, None, &mut random);
        let first: Vec<_> = world
            .registries()
            .flat_map(|registry| registry.members().iter().map(|group| group.people().collect::<Vec<_>>()))
            .collect();

        manager.clear_world(&mut world);
        assert!(world.people.iter().all(|agent| !agent.busy));
        assert!(world
            .registries()
            .all(|registry| registry.members().iter().all(|group| group.size() == 0)));

        manager.do_timestep(&mut world, &step, None, &mut random);
        let second: Vec<_> = world
            .registries()
            .flat_map(|registry| registry.members().iter().map(|group| group.people().collect::<Vec<_>>()))
            .collect();
        assert_eq!(first, second);
    }
}
