mod common;

use std::cell::RefCell;
use std::rc::Rc;

use assert_approx_eq::assert_approx_eq;
use chrono::{NaiveDate, NaiveDateTime};
use groupsim::health::SymptomStage;
use groupsim::infection::ConstantSelector;
use groupsim::policy::{InteractionPolicy, MedicalCarePolicy, Policy, PolicyKind};
use groupsim::report::{
    CsvRecordSink, InfectedSnapshot, RecordSink, ReportOptions, RunParameters,
};
use groupsim::schedule::TimeConfig;
use groupsim::seed::UniformSeed;
use groupsim::world::{
    Agent, Cemeteries, Cemetery, Group, GroupId, GroupRegistry, Hospital, Population,
    HOSPITAL_SUBGROUPS, ICU_SUBGROUP,
};
use groupsim::{
    Activity, ActivityManager, AgentId, GroupKind, Policies, RandomSource, Schedule, Simulator,
    SimulatorError, SimulatorState, Step, SubgroupRef, World,
};
use std::collections::BTreeMap;
use tempfile::tempdir;

use common::{infect, infection, interaction, schedule, world};

fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, month, day).unwrap()
}

fn long_infection() -> groupsim::health::Infection {
    infection(
        vec![(0.0, SymptomStage::Exposed), (30.0, SymptomStage::Recovered)],
        1.0,
    )
}

fn hospitalisation() -> Policy {
    Policy {
        name: "hospitalisation".to_string(),
        start_date: day(1, 1),
        end_date: day(12, 31),
        kind: PolicyKind::MedicalCare(MedicalCarePolicy::Hospitalisation),
    }
}

fn selector() -> Box<ConstantSelector> {
    Box::new(ConstantSelector {
        infection: long_infection(),
    })
}

#[derive(Default)]
struct Records {
    n_infected: Vec<usize>,
    locations: Vec<(GroupKind, usize, usize)>,
    occupancy: Vec<(usize, usize)>,
    parameters: Option<RunParameters>,
}

/// Keeps what it receives where the test can read it after the run.
struct RecordingSink(Rc<RefCell<Records>>);

impl RecordSink for RecordingSink {
    fn log_population(&mut self, _world: &World) -> Result<(), SimulatorError> {
        Ok(())
    }

    fn log_hospital_characteristics(&mut self, _hospitals: &[Hospital]) -> Result<(), SimulatorError> {
        Ok(())
    }

    fn log_parameters(&mut self, parameters: &RunParameters) -> Result<(), SimulatorError> {
        self.0.borrow_mut().parameters = Some(parameters.clone());
        Ok(())
    }

    fn log_infected(
        &mut self,
        _date: NaiveDateTime,
        snapshot: &InfectedSnapshot,
    ) -> Result<(), SimulatorError> {
        self.0.borrow_mut().n_infected.push(snapshot.len());
        Ok(())
    }

    fn accumulate_infection_location(&mut self, kind: GroupKind, group: usize, n_infected: usize) {
        self.0.borrow_mut().locations.push((kind, group, n_infected));
    }

    fn log_infection_location(&mut self, _date: NaiveDateTime) -> Result<(), SimulatorError> {
        Ok(())
    }

    fn log_hospital_capacity(
        &mut self,
        _date: NaiveDateTime,
        hospitals: &[Hospital],
    ) -> Result<(), SimulatorError> {
        let hospital = &hospitals[0];
        self.0
            .borrow_mut()
            .occupancy
            .push((hospital.ward_patients(), hospital.icu_patients()));
        Ok(())
    }
}

#[test]
fn infection_stays_in_the_household() {
    let mut world = world(3, 4, 5, 1);
    infect(&mut world, AgentId(0), long_infection());
    let records = Rc::new(RefCell::new(Records::default()));
    let mut simulator = Simulator::new(world, interaction(1e6), schedule(1), Policies::default(), 3)
        .with_selector(selector())
        .with_sink(Box::new(RecordingSink(records.clone())));
    simulator.run().unwrap();

    assert_eq!(simulator.state(), SimulatorState::Finished);
    let infected = simulator.world().people.infected_ids();
    assert_eq!(infected, vec![AgentId(0), AgentId(1), AgentId(2), AgentId(3)]);

    // All three infections happened in the first step and were credited to the only infector.
    let records = records.borrow();
    assert_eq!(records.locations, vec![(GroupKind::Household, 0, 3)]);
    assert_eq!(records.n_infected, vec![4, 4]);
    let parameters = records.parameters.as_ref().unwrap();
    assert_eq!(parameters.get("run", "random_seed"), Some("3"));
    assert_eq!(parameters.get("interaction", "beta.household"), Some("1000000"));
    let infector = simulator.world().people.get(AgentId(0)).unwrap();
    assert_approx_eq!(infector.health.as_ref().unwrap().number_of_infected, 3.0);
}

#[test]
fn immune_people_are_never_infected() {
    let mut world = world(1, 4, 5, 1);
    infect(&mut world, AgentId(0), long_infection());
    for id in 1..4 {
        world.people.get_mut(AgentId(id)).unwrap().susceptibility = 0.0;
    }
    let mut simulator = Simulator::new(world, interaction(1e6), schedule(3), Policies::default(), 3)
        .with_selector(selector());
    simulator.run().unwrap();
    assert_eq!(simulator.world().people.infected_ids(), vec![AgentId(0)]);
}

/// Two twelve hour steps every day. The first runs `first`, the second is spent at home.
fn two_shift_schedule(first: &[&str], total_days: u32) -> Schedule {
    let config: TimeConfig = serde_json::from_value(serde_json::json!({
        "initial_date": "2020-03-02",
        "total_days": total_days,
        "step_duration": {
            "weekday": { "0": 12, "1": 12 },
            "weekend": { "0": 12, "1": 12 }
        },
        "step_activities": {
            "weekday": { "0": first, "1": ["residence"] },
            "weekend": { "0": first, "1": ["residence"] }
        }
    }))
    .unwrap();
    Schedule::new(&config).unwrap()
}

/// Two people in their own households who work at the same company, and one hospital.
fn coworkers_world() -> World {
    let households = (0..2)
        .map(|i| Group::new(GroupId(i), GroupKind::Household, 1, (i as f64, 0.0)))
        .collect();
    let company = Group::new(GroupId(0), GroupKind::Company, 1, (0.5, 0.0));
    let hospital = Group::new(GroupId(0), GroupKind::Hospital, HOSPITAL_SUBGROUPS, (0.0, 0.0));
    let agents = (0..2)
        .map(|id| {
            Agent::new(AgentId(id), 40, (id as f64, 0.0))
                .with_slot(
                    Activity::Residence,
                    SubgroupRef::new(GroupKind::Household, id, 0),
                )
                .with_slot(
                    Activity::PrimaryActivity,
                    SubgroupRef::new(GroupKind::Company, 0, 0),
                )
        })
        .collect();
    World::new(
        Population::new(agents).unwrap(),
        vec![
            GroupRegistry::new(GroupKind::Household, households).unwrap(),
            GroupRegistry::new(GroupKind::Company, vec![company]).unwrap(),
            GroupRegistry::new(GroupKind::Hospital, vec![hospital]).unwrap(),
        ],
        vec![Hospital::new(0, (0.0, 0.0), 5, 1)],
        Cemeteries::new(vec![Cemetery::new((0.0, 0.0))]),
    )
    .unwrap()
}

#[test]
fn critical_patients_move_to_intensive_care() {
    let mut world = coworkers_world();
    infect(
        &mut world,
        AgentId(0),
        infection(
            vec![
                (0.0, SymptomStage::Exposed),
                (0.5, SymptomStage::Severe),
                (1.0, SymptomStage::Critical),
                (10.0, SymptomStage::Recovered),
            ],
            0.1,
        ),
    );
    world.people.get_mut(AgentId(1)).unwrap().susceptibility = 0.0;
    let records = Rc::new(RefCell::new(Records::default()));
    let policies = Policies::new(vec![hospitalisation()]).unwrap();
    let schedule = two_shift_schedule(&["primary_activity", "residence"], 2);
    let mut simulator = Simulator::new(world, interaction(1.0), schedule, policies, 3)
        .with_sink(Box::new(RecordingSink(records.clone())));
    simulator.run().unwrap();

    assert_eq!(records.borrow().occupancy, vec![(1, 0), (0, 1), (0, 1), (0, 1)]);
    let patient = simulator.world().people.get(AgentId(0)).unwrap();
    assert_eq!(
        patient.slots.get(Activity::MedicalFacility),
        Some(SubgroupRef::new(GroupKind::Hospital, 0, ICU_SUBGROUP))
    );
    assert_eq!(simulator.world().admission(AgentId(0)), Some(0));

    // On the next working step the patient stays in intensive care and skips work.
    let next = Step {
        date: day(3, 4).and_hms_opt(0, 0, 0).unwrap(),
        now: 2.0,
        duration: 0.5,
        activities: vec![Activity::PrimaryActivity, Activity::Residence],
        is_weekend: false,
        shift: 0,
    };
    ActivityManager::new().do_timestep(
        simulator.world_mut(),
        &next,
        None,
        &mut RandomSource::new(0),
    );
    let world = simulator.world();
    let icu = SubgroupRef::new(GroupKind::Hospital, 0, ICU_SUBGROUP);
    assert_eq!(
        world.group(icu).unwrap().subgroup(ICU_SUBGROUP).unwrap().people(),
        &[AgentId(0)]
    );
    let company = SubgroupRef::new(GroupKind::Company, 0, 0);
    assert_eq!(
        world.group(company).unwrap().people().collect::<Vec<_>>(),
        vec![AgentId(1)]
    );
}

#[test]
fn steps_without_residence_send_the_rest_home() {
    let mut world = world(2, 2, 5, 1);
    infect(&mut world, AgentId(0), long_infection());
    let records = Rc::new(RefCell::new(Records::default()));
    let schedule = two_shift_schedule(&["primary_activity"], 2);
    let mut simulator = Simulator::new(world, interaction(1e6), schedule, Policies::default(), 3)
        .with_selector(selector())
        .with_sink(Box::new(RecordingSink(records.clone())));
    simulator.run().unwrap();

    assert_eq!(simulator.state(), SimulatorState::Finished);
    // Nobody works, so the first step is spent at home and infects the household.
    assert_eq!(records.borrow().n_infected, vec![2, 2, 2, 2]);
    assert_eq!(
        simulator.world().people.infected_ids(),
        vec![AgentId(0), AgentId(1)]
    );
}

#[test]
fn the_dead_are_buried_and_leave_hospital() {
    let mut world = world(2, 2, 5, 1);
    infect(
        &mut world,
        AgentId(0),
        infection(
            vec![
                (0.0, SymptomStage::Exposed),
                (1.0, SymptomStage::Severe),
                (2.0, SymptomStage::Dead),
            ],
            0.1,
        ),
    );
    let records = Rc::new(RefCell::new(Records::default()));
    let policies = Policies::new(vec![hospitalisation()]).unwrap();
    let mut simulator = Simulator::new(world, interaction(0.0), schedule(3), policies, 3)
        .with_sink(Box::new(RecordingSink(records.clone())));
    simulator.run().unwrap();

    let world = simulator.world();
    assert_eq!(world.cemeteries.members()[0].people(), &[AgentId(0)]);
    assert_eq!(world.people.n_dead(), 1);
    assert!(world.people.infected_ids().is_empty());
    let dead = world.people.get(AgentId(0)).unwrap();
    assert!(dead.slots.is_empty());
    let record = dead.health.as_ref().unwrap();
    assert_eq!(record.stage, SymptomStage::Dead);
    assert_eq!(record.infection_length, Some(2.0));
    assert_eq!(world.admission(AgentId(0)), None);
    assert_eq!(
        records.borrow().occupancy,
        vec![(0, 0), (1, 0), (1, 0), (0, 0), (0, 0), (0, 0)]
    );
}

#[test]
fn recovered_people_are_immune() {
    let mut world = world(1, 2, 5, 1);
    infect(
        &mut world,
        AgentId(0),
        infection(
            vec![(0.0, SymptomStage::Exposed), (1.0, SymptomStage::Recovered)],
            1.0,
        ),
    );
    world.people.get_mut(AgentId(1)).unwrap().susceptibility = 0.0;
    let mut simulator = Simulator::new(world, interaction(1e6), schedule(2), Policies::default(), 3)
        .with_selector(selector());
    simulator.run().unwrap();
    let recovered = simulator.world().people.get(AgentId(0)).unwrap();
    assert!(recovered.health.is_none());
    assert!(!recovered.is_susceptible());
    assert!(simulator.world().people.infected_ids().is_empty());
}

#[test]
fn unaccounted_people_abort_the_run() {
    let mut world = world(2, 2, 5, 1);
    world.people.get_mut(AgentId(1)).unwrap().dead = true;
    let mut simulator = Simulator::new(world, interaction(1.0), schedule(1), Policies::default(), 3);
    let result = simulator.run();
    assert!(matches!(
        result,
        Err(SimulatorError::Consistency {
            active: 3,
            expected: 4
        })
    ));
    assert_eq!(simulator.state(), SimulatorState::Stepping);
}

#[test]
fn social_distancing_only_applies_inside_its_window() {
    let mut world = world(2, 4, 5, 1);
    infect(&mut world, AgentId(0), long_infection());
    let policies = Policies::new(vec![Policy {
        name: "stay apart".to_string(),
        start_date: day(3, 2),
        end_date: day(3, 3),
        kind: PolicyKind::Interaction(InteractionPolicy::SocialDistancing {
            beta_factors: BTreeMap::from([(GroupKind::Household, 0.0)]),
        }),
    }])
    .unwrap();
    let records = Rc::new(RefCell::new(Records::default()));
    let mut simulator = Simulator::new(world, interaction(1e6), schedule(2), policies, 3)
        .with_selector(selector())
        .with_sink(Box::new(RecordingSink(records.clone())));
    simulator.run().unwrap();

    assert_eq!(records.borrow().n_infected, vec![1, 1, 4, 4]);
    assert_eq!(
        simulator.world().people.infected_ids(),
        vec![AgentId(0), AgentId(1), AgentId(2), AgentId(3)]
    );
}

fn seeded_run(random_seed: u64) -> Vec<(AgentId, SymptomStage)> {
    let seed = UniformSeed::new(
        day(3, 2).and_hms_opt(0, 0, 0).unwrap(),
        day(3, 3).and_hms_opt(0, 0, 0).unwrap(),
        2,
    );
    let mut simulator = Simulator::new(
        world(5, 4, 5, 1),
        interaction(2.0),
        schedule(5),
        Policies::default(),
        random_seed,
    )
    .with_selector(selector())
    .with_seed(Box::new(seed));
    simulator.run().unwrap();
    simulator
        .world()
        .people
        .iter()
        .filter_map(|agent| agent.health.as_ref().map(|record| (agent.id, record.stage)))
        .collect()
}

#[test]
fn runs_with_the_same_seed_agree() {
    let first = seeded_run(17);
    assert!(first.len() >= 4);
    assert_eq!(first, seeded_run(17));
}

#[test]
fn csv_records_are_written() {
    let temp_dir = tempdir().unwrap();
    let mut options = ReportOptions::default();
    options.directory(temp_dir.path().to_path_buf());
    let mut world = world(2, 2, 5, 1);
    infect(&mut world, AgentId(0), long_infection());
    let mut simulator = Simulator::new(world, interaction(0.0), schedule(1), Policies::default(), 3)
        .with_sink(Box::new(CsvRecordSink::new(&options).unwrap()));
    simulator.run().unwrap();

    let mut population = csv::Reader::from_path(temp_dir.path().join("population.csv")).unwrap();
    assert_eq!(population.records().count(), 4);
    let mut infected = csv::Reader::from_path(temp_dir.path().join("infected.csv")).unwrap();
    assert_eq!(infected.records().count(), 2);
    let mut occupancy =
        csv::Reader::from_path(temp_dir.path().join("hospital_occupancy.csv")).unwrap();
    assert_eq!(occupancy.records().count(), 2);
    let mut parameters = csv::Reader::from_path(temp_dir.path().join("parameters.csv")).unwrap();
    let rows: Vec<Vec<String>> = parameters
        .records()
        .map(|row| row.unwrap().iter().map(str::to_string).collect())
        .collect();
    assert!(rows.contains(&vec![
        "interaction".to_string(),
        "beta.household".to_string(),
        "0".to_string()
    ]));
    assert!(rows.contains(&vec![
        "run".to_string(),
        "random_seed".to_string(),
        "3".to_string()
    ]));
}
