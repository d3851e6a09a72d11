use std::path::PathBuf;
use std::str::FromStr;

use crate::config::RunConfig;
use crate::infection::InfectionSelector;
use crate::interaction::Interaction;
use crate::leisure::LeisureProvider;
use crate::log::{set_log_level, LevelFilter};
use crate::policy::Policies;
use crate::report::{CsvRecordSink, ReportOptions};
use crate::seed::InfectionSeed;
use crate::simulator::Simulator;
use crate::world::World;
use crate::SimulatorError;
use clap::{Args, Command, FromArgMatches as _};

/// Default cli arguments for the groupsim runner
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Random seed, overrides the one in the run configuration
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Path of the run configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Optional path for record output
    #[arg(short, long, default_value = "")]
    pub output_dir: String,

    /// Prefix for the record file names
    #[arg(short = 'p', long, default_value = "")]
    pub file_prefix: String,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(short, long)]
    pub log_level: Option<String>,
}

/// Everything a model provides to the runner.
pub struct SimulationSetup {
    pub world: World,
    pub interaction: Interaction,
    pub policies: Policies,
    pub selector: Option<Box<dyn InfectionSelector>>,
    pub seed: Option<Box<dyn InfectionSeed>>,
    pub leisure: Option<Box<dyn LeisureProvider>>,
}

impl SimulationSetup {
    #[must_use]
    pub fn new(world: World, interaction: Interaction, policies: Policies) -> SimulationSetup {
        SimulationSetup {
            world,
            interaction,
            policies,
            selector: None,
            seed: None,
            leisure: None,
        }
    }
}

fn create_groupsim_cli() -> Command {
    let cli = Command::new("groupsim");
    BaseArgs::augment_args(cli)
}

/// Runs a simulation with default cli arguments
///
/// This function parses command line arguments, loads the run configuration and calls
/// `setup_fn` to build the world and its collaborators.
///
/// # Parameters
/// - `setup_fn`: A function that takes the parsed `BaseArgs` and the loaded `RunConfig`
///
/// # Errors
/// Returns an error if argument parsing, the setup function or the run fails
#[allow(clippy::missing_errors_doc)]
pub fn run_with_args<F>(setup_fn: F) -> Result<Simulator, Box<dyn std::error::Error>>
where
    F: Fn(&BaseArgs, &RunConfig) -> Result<SimulationSetup, SimulatorError>,
{
    let cli = create_groupsim_cli();
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    run_with_args_internal(base_args_matches, setup_fn)
}

fn run_with_args_internal<F>(
    args: BaseArgs,
    setup_fn: F,
) -> Result<Simulator, Box<dyn std::error::Error>>
where
    F: Fn(&BaseArgs, &RunConfig) -> Result<SimulationSetup, SimulatorError>,
{
    if let Some(level) = &args.log_level {
        set_log_level(LevelFilter::from_str(level)?);
    }

    let mut config = RunConfig::from_file(&args.config)?;
    if let Some(random_seed) = args.random_seed {
        config.random_seed = random_seed;
    }

    let setup = setup_fn(&args, &config)?;
    let mut simulator =
        Simulator::from_config(setup.world, setup.interaction, setup.policies, &config)?;
    if let Some(selector) = setup.selector {
        simulator = simulator.with_selector(selector);
    }
    if let Some(seed) = setup.seed {
        simulator = simulator.with_seed(seed);
    }
    if let Some(leisure) = setup.leisure {
        simulator = simulator.with_leisure(leisure);
    }

    // Optionally write records to the output dir
    if !args.output_dir.is_empty() {
        let mut options = ReportOptions::default();
        options
            .directory(PathBuf::from(&args.output_dir))
            .file_prefix(args.file_prefix.clone())
            .overwrite(true);
        simulator = simulator.with_sink(Box::new(CsvRecordSink::new(&options)?));
    }

    simulator.run()?;
    Ok(simulator)
}
