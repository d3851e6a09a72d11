//! A discrete-time engine for group-based agent epidemic models
//!
//! Groupsim advances a pre-built population through the steps of a daily schedule. At every
//! step each living person is placed in exactly one group (a household, a school, a pub, a
//! hospital ward, ...) according to the activities that are active in that part of the day,
//! transmission is computed inside every group that holds both infectious and susceptible
//! people, and the health of every infected person is advanced along the trajectory chosen
//! for them at infection time.
//!
//! The central object is the [`Simulator`](simulator::Simulator). It owns the
//! [`World`](world::World), the interaction parameters, the [`Schedule`](schedule::Schedule),
//! the [`Policies`](policy::Policies) and a single [`RandomSource`](random::RandomSource) for
//! the run. Everything else plugs in as a collaborator:
//! * an [`InfectionSelector`](infection::InfectionSelector) that assigns a symptom trajectory
//!   to every newly infected person,
//! * an [`InfectionSeed`](seed::InfectionSeed) that introduces the pathogen,
//! * a [`LeisureProvider`](leisure::LeisureProvider) that sends people to leisure venues,
//! * a [`RecordSink`](report::RecordSink) that receives the per-step records.
//!
//! A step runs policy resolution, group assignment, transmission, infection, health update,
//! the population accounting check, emission and clearing, strictly in that order.
pub mod activity;
pub mod config;
pub mod error;
pub mod health;
pub mod infection;
pub mod interaction;
pub mod leisure;
pub mod log;
pub mod policy;
pub mod random;
pub mod report;
pub mod runner;
pub mod schedule;
pub mod seed;
pub mod simulator;
pub mod world;

pub use activity::{Activity, ActivityManager};
pub use config::RunConfig;
pub use error::SimulatorError;
pub use health::{HealthRecord, SymptomStage};
pub use interaction::{Interaction, InteractiveGroup};
pub use policy::Policies;
pub use random::{RandomSource, RngId};
pub use schedule::{Schedule, Step};
pub use simulator::{Simulator, SimulatorState};
pub use world::{Agent, AgentId, Group, GroupKind, Population, SubgroupRef, World};

// Deterministic hashing for every map that is iterated.
pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

// Re-exported for the `define_rng!` macro.
pub use rand;
