#![allow(dead_code)]
use std::collections::BTreeMap;

use groupsim::health::{HealthRecord, Infection, SymptomStage, Trajectory, Transmission};
use groupsim::interaction::{Interaction, InteractionConfig};
use groupsim::schedule::{Schedule, TimeConfig};
use groupsim::world::{
    Agent, AgentId, Cemeteries, Cemetery, Group, GroupId, GroupKind, GroupRegistry, Hospital,
    Population, SubgroupRef, World, HOSPITAL_SUBGROUPS,
};
use groupsim::Activity;

/// Households of `household_size` people in a row, one hospital with `n_beds` ward beds and
/// `n_icu_beds` intensive care beds, one cemetery.
pub fn world(n_households: usize, household_size: usize, n_beds: usize, n_icu_beds: usize) -> World {
    let households = (0..n_households)
        .map(|i| Group::new(GroupId(i), GroupKind::Household, 1, (i as f64, 0.0)))
        .collect();
    let agents = (0..n_households * household_size)
        .map(|id| {
            let household = id / household_size;
            Agent::new(AgentId(id), 50, (household as f64, 0.0)).with_slot(
                Activity::Residence,
                SubgroupRef::new(GroupKind::Household, household, 0),
            )
        })
        .collect();
    let hospitals = vec![Group::new(
        GroupId(0),
        GroupKind::Hospital,
        HOSPITAL_SUBGROUPS,
        (0.0, 0.0),
    )];
    World::new(
        Population::new(agents).unwrap(),
        vec![
            GroupRegistry::new(GroupKind::Household, households).unwrap(),
            GroupRegistry::new(GroupKind::Hospital, hospitals).unwrap(),
        ],
        vec![Hospital::new(0, (0.0, 0.0), n_beds, n_icu_beds)],
        Cemeteries::new(vec![Cemetery::new((0.0, 0.0))]),
    )
    .unwrap()
}

pub fn interaction(beta: f64) -> Interaction {
    Interaction::new(InteractionConfig {
        beta: BTreeMap::from([(GroupKind::Household, beta), (GroupKind::Hospital, 0.0)]),
        alpha_physical: 1.0,
        contact_matrices: BTreeMap::new(),
    })
    .unwrap()
}

/// Two twelve hour steps every day, both at home.
pub fn schedule(total_days: u32) -> Schedule {
    let config: TimeConfig = serde_json::from_value(serde_json::json!({
        "initial_date": "2020-03-02",
        "total_days": total_days,
        "step_duration": {
            "weekday": { "0": 12, "1": 12 },
            "weekend": { "0": 12, "1": 12 }
        },
        "step_activities": {
            "weekday": { "0": ["residence"], "1": ["residence"] },
            "weekend": { "0": ["residence"], "1": ["residence"] }
        }
    }))
    .unwrap();
    Schedule::new(&config).unwrap()
}

pub fn infection(stages: Vec<(f64, SymptomStage)>, probability: f64) -> Infection {
    Infection {
        trajectory: Trajectory::new(stages).unwrap(),
        transmission: Transmission::Constant { probability },
    }
}

pub fn infect(world: &mut World, agent_id: AgentId, infection: Infection) {
    let agent = world.people.get_mut(agent_id).unwrap();
    agent.health = Some(HealthRecord::new(infection, 0.0));
    agent.susceptibility = 0.0;
}
