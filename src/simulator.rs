//! The orchestrator. A [`Simulator`] owns everything a run touches and drives it through the
//! schedule, one step at a time.
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};

use crate::activity::ActivityManager;
use crate::config::RunConfig;
use crate::health::{bury_the_dead, recover, SymptomStage};
use crate::infection::InfectionSelector;
use crate::interaction::{Interaction, InteractiveGroup};
use crate::leisure::LeisureProvider;
use crate::policy::{MedicalCareRequest, Policies};
use crate::random::RandomSource;
use crate::report::{InfectedSnapshot, RecordSink, RunParameters};
use crate::schedule::{Schedule, Step};
use crate::seed::InfectionSeed;
use crate::world::{AgentId, GroupKind, World};
use crate::SimulatorError;

/// `Idle` until the first step, `Stepping` while steps run, `Finished` once the schedule is
/// exhausted or the final date is passed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimulatorState {
    Idle,
    Stepping,
    Finished,
}

/// What happened during one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepSummary {
    /// People counted in the groups of the step.
    pub n_active: usize,
    pub n_new_infections: usize,
    /// Living people carrying an infection after the health update.
    pub n_infected: usize,
    pub n_dead: usize,
}

pub struct Simulator {
    world: World,
    interaction: Interaction,
    schedule: Schedule,
    policies: Policies,
    activity_manager: ActivityManager,
    random: RandomSource,
    final_date: NaiveDateTime,
    selector: Option<Box<dyn InfectionSelector>>,
    seed: Option<Box<dyn InfectionSeed>>,
    leisure: Option<Box<dyn LeisureProvider>>,
    sink: Option<Box<dyn RecordSink>>,
    state: SimulatorState,
}

impl Simulator {
    #[must_use]
    pub fn new(
        world: World,
        interaction: Interaction,
        schedule: Schedule,
        policies: Policies,
        random_seed: u64,
    ) -> Simulator {
        let final_date = schedule.final_date();
        Simulator {
            world,
            interaction,
            schedule,
            policies,
            activity_manager: ActivityManager::new(),
            random: RandomSource::new(random_seed),
            final_date,
            selector: None,
            seed: None,
            leisure: None,
            sink: None,
            state: SimulatorState::Idle,
        }
    }

    /// Builds the schedule, seed and final date from a run configuration.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if the schedule is invalid.
    pub fn from_config(
        world: World,
        interaction: Interaction,
        policies: Policies,
        config: &RunConfig,
    ) -> Result<Simulator, SimulatorError> {
        let schedule = Schedule::new(&config.time)?;
        let mut simulator = Simulator::new(world, interaction, schedule, policies, config.random_seed);
        if let Some(final_date) = config.final_date {
            simulator.final_date = final_date;
        }
        Ok(simulator)
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Box<dyn InfectionSelector>) -> Simulator {
        self.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Box<dyn InfectionSeed>) -> Simulator {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_leisure(mut self, leisure: Box<dyn LeisureProvider>) -> Simulator {
        self.leisure = Some(leisure);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn RecordSink>) -> Simulator {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_final_date(mut self, final_date: NaiveDateTime) -> Simulator {
        self.final_date = final_date;
        self
    }

    #[must_use]
    pub fn state(&self) -> SimulatorState {
        self.state
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn random_mut(&mut self) -> &mut RandomSource {
        &mut self.random
    }

    #[must_use]
    pub fn final_date(&self) -> NaiveDateTime {
        self.final_date
    }

    /// The settings the run is made with: seed and dates, the live interaction parameters, the
    /// policies, then whatever the selector and the seed report about themselves.
    #[must_use]
    pub fn parameters(&self) -> RunParameters {
        let mut parameters = RunParameters::default();
        parameters.add("run", "random_seed", self.random.base_seed());
        parameters.add("run", "initial_date", self.schedule.initial_date());
        parameters.add("run", "final_date", self.final_date);
        parameters.extend("interaction", self.interaction.parameters());
        for policy in self.policies.policies() {
            parameters.add(
                "policies",
                &policy.name,
                format!("{} to {}", policy.start_date, policy.end_date),
            );
        }
        if let Some(selector) = self.selector.as_deref() {
            parameters.extend("selector", selector.parameters());
        }
        if let Some(seed) = self.seed.as_deref() {
            parameters.extend("seed", seed.parameters());
        }
        parameters
    }

    /// Empties every group and frees every person.
    pub fn clear_world(&mut self) {
        self.activity_manager.clear_world(&mut self.world);
    }

    /// Runs one step: policies, group assignment, transmission, infection, health update,
    /// population accounting, emission and clearing.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError::Consistency` if the people found in groups plus the buried do
    /// not add up to the population, or any error raised while infecting, burying or emitting.
    pub fn do_timestep(&mut self, step: &Step) -> Result<StepSummary, SimulatorError> {
        self.state = SimulatorState::Stepping;
        self.policies
            .active_interaction_policies(step.date)
            .apply(step.date, &mut self.interaction);

        if step.activities.is_empty() {
            info!("{}: no active activities", step.date);
            return Ok(StepSummary::default());
        }

        let leisure = self
            .leisure
            .as_mut()
            .map(|provider| provider.as_mut() as &mut dyn LeisureProvider);
        let active = self
            .activity_manager
            .do_timestep(&mut self.world, step, leisure, &mut self.random);
        let kinds: Vec<GroupKind> = active
            .iter()
            .flat_map(|activity| activity.group_kinds().iter().copied())
            .collect();

        let mut n_active = 0;
        let mut new_infections: Vec<AgentId> = Vec::new();
        let mut credits: Vec<(AgentId, f64)> = Vec::new();
        for kind in kinds {
            let Some(registry) = self.world.registry(kind) else {
                continue;
            };
            for (index, group) in registry.members().iter().enumerate() {
                if group.size() == 0 {
                    continue;
                }
                let view = InteractiveGroup::new(index, group, &self.world.people);
                n_active += view.size();
                if !view.must_timestep() {
                    continue;
                }
                let infected =
                    self.interaction
                        .time_step_for_group(step.duration, &view, &mut self.random);
                if infected.is_empty() {
                    continue;
                }
                debug!(
                    "{}: {} new infections in {kind} {index}",
                    step.date,
                    infected.len()
                );
                credits.extend(view.attribute_infections(infected.len()));
                if let Some(sink) = self.sink.as_mut() {
                    sink.accumulate_infection_location(kind, index, infected.len());
                }
                new_infections.extend(infected);
            }
        }

        let expected = self.world.people.len();
        let n_buried = self.world.cemeteries.n_buried();
        if n_active + n_buried != expected {
            let error = SimulatorError::Consistency {
                active: n_active + n_buried,
                expected,
            };
            error!("{}: {error}", step.date);
            return Err(error);
        }

        for (agent_id, credit) in credits {
            if let Some(record) = self
                .world
                .people
                .get_mut(agent_id)
                .and_then(|agent| agent.health.as_mut())
            {
                record.number_of_infected += credit;
            }
        }

        let time = step.end_time();
        match self.selector.as_deref() {
            Some(selector) => {
                for agent_id in &new_infections {
                    if let Some(agent) = self.world.people.get_mut(*agent_id) {
                        selector.infect_agent_at_time(agent, time, &mut self.random)?;
                    }
                }
            }
            None if !new_infections.is_empty() => {
                warn!(
                    "{}: no infection selector, {} infections are not applied",
                    step.date,
                    new_infections.len()
                );
            }
            None => {}
        }

        self.update_health_status(step)?;

        if let Some(sink) = self.sink.as_mut() {
            sink.log_infected(step.date, &InfectedSnapshot::from_population(&self.world.people))?;
            sink.log_infection_location(step.date)?;
            sink.log_hospital_capacity(step.date, &self.world.hospitals)?;
        }

        self.clear_world();

        let summary = StepSummary {
            n_active,
            n_new_infections: new_infections.len(),
            n_infected: self.world.people.infected_ids().len(),
            n_dead: self.world.cemeteries.n_buried(),
        };
        info!(
            "{}: {} new infections, {} infected, {} dead",
            step.date, summary.n_new_infections, summary.n_infected, summary.n_dead
        );
        Ok(summary)
    }

    /// Advances every infected person's health to the end of `step`, then applies what follows
    /// from the change: a quarantine clock for the household of anyone turning mild, medical
    /// care, recovery or burial.
    ///
    /// # Errors
    ///
    /// Returns an error if a person who died cannot be buried.
    pub fn update_health_status(&mut self, step: &Step) -> Result<(), SimulatorError> {
        let time = step.end_time();
        let medical_care = self.policies.active_medical_care_policies(step.date);
        for agent_id in self.world.people.infected_ids() {
            let Some(agent) = self.world.people.get_mut(agent_id) else {
                continue;
            };
            let residence = agent.residence();
            let Some(record) = agent.health.as_mut() else {
                continue;
            };
            let previous = record.update_health_status(time, step.duration);
            let stage = record.stage;

            if previous == SymptomStage::Exposed && stage == SymptomStage::Mild {
                if let Some(home) = residence.and_then(|residence| self.world.group_mut(residence)) {
                    home.quarantine_starting_time = Some(time);
                }
            }

            match stage {
                SymptomStage::Recovered => recover(&mut self.world, agent_id, time),
                SymptomStage::Dead => bury_the_dead(&mut self.world, agent_id, time)?,
                _ => match medical_care.apply(stage, previous) {
                    Some(MedicalCareRequest::Ward) => {
                        self.world.admit_patient(agent_id, false);
                    }
                    Some(MedicalCareRequest::IntensiveCare) => {
                        self.world.admit_patient(agent_id, true);
                    }
                    None => {}
                },
            }
        }
        Ok(())
    }

    fn seed_infections(&mut self, step: &Step) -> Result<(), SimulatorError> {
        let (Some(seed), Some(selector)) = (self.seed.as_mut(), self.selector.as_deref()) else {
            return Ok(());
        };
        if seed.is_active(step.date) {
            seed.unleash_virus(&mut self.world.people, selector, step, &mut self.random)?;
        }
        Ok(())
    }

    /// Emits the population, hospitals and run parameters, then runs every step up to the final
    /// date. Any error stops the run at the step where it happened.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a step or by the record sink.
    pub fn run(&mut self) -> Result<(), SimulatorError> {
        info!(
            "starting the simulation from {} to {} for {} people",
            self.schedule.initial_date(),
            self.final_date,
            self.world.people.len()
        );
        self.clear_world();
        let parameters = self.parameters();
        if let Some(sink) = self.sink.as_mut() {
            sink.log_population(&self.world)?;
            sink.log_hospital_characteristics(&self.world.hospitals)?;
            sink.log_parameters(&parameters)?;
        }
        while let Some(step) = self.schedule.next() {
            if step.date > self.final_date {
                break;
            }
            self.seed_infections(&step)?;
            self.do_timestep(&step)?;
        }
        self.state = SimulatorState::Finished;
        info!("simulation finished");
        Ok(())
    }
}
