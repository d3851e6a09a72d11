//! Emission of the simulation's records.
//!
//! The engine hands every record to a [`RecordSink`]. [`CsvRecordSink`] writes each kind of
//! record to its own CSV file through a [`Report`] type, one writer per report type.
use std::any::TypeId;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use csv::Writer;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::health::SymptomStage;
use crate::world::{AgentId, GroupKind, Hospital, Population, World};
use crate::{HashMap, SimulatorError};

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), csv::Error>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! create_report_trait {
    ($name:ident) => {
        impl Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(&self, writer: &mut csv::Writer<std::fs::File>) -> Result<(), csv::Error> {
                writer.serialize(self)
            }
        }
    };
}

/// Where report files go and what they are called: `{directory}/{file_prefix}{short_name}.csv`.
#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub file_prefix: String,
    pub directory: PathBuf,
    pub overwrite: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            file_prefix: String::new(),
            directory: PathBuf::from("."),
            overwrite: false,
        }
    }
}

impl ReportOptions {
    /// Sets the file prefix option (e.g., "run_1_")
    pub fn file_prefix(&mut self, file_prefix: String) -> &mut ReportOptions {
        self.file_prefix = file_prefix;
        self
    }

    /// Sets the directory where reports will be output
    pub fn directory(&mut self, directory: PathBuf) -> &mut ReportOptions {
        self.directory = directory;
        self
    }

    /// Sets whether to overwrite existing reports of the same name if they exist
    pub fn overwrite(&mut self, overwrite: bool) -> &mut ReportOptions {
        self.overwrite = overwrite;
        self
    }

    fn path(&self, short_name: &str) -> PathBuf {
        self.directory
            .join(format!("{}{short_name}", self.file_prefix))
            .with_extension("csv")
    }
}

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist. Returns the file if successful.
fn generate_validate_filepath(path: &Path, overwrite: bool) -> Result<File, SimulatorError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if path.exists() && !overwrite {
                return Err(SimulatorError::ReportError(format!(
                    "{} already exists and overwrite is off",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            Ok(File::create(path)?)
        }
        _ => Err(SimulatorError::ReportError(
            "Report output files must be CSVs at this time".to_string(),
        )),
    }
}

/// One living infected person at a step.
#[derive(Clone, Debug, PartialEq)]
pub struct InfectedEntry {
    pub id: AgentId,
    pub stage: SymptomStage,
    pub number_of_infected: f64,
}

/// The infected part of the population at the end of a step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InfectedSnapshot {
    pub entries: Vec<InfectedEntry>,
}

impl InfectedSnapshot {
    #[must_use]
    pub fn from_population(population: &Population) -> InfectedSnapshot {
        let entries = population
            .iter()
            .filter(|agent| !agent.dead)
            .filter_map(|agent| {
                agent.health.as_ref().map(|record| InfectedEntry {
                    id: agent.id,
                    stage: record.stage,
                    number_of_infected: record.number_of_infected,
                })
            })
            .collect();
        InfectedSnapshot { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One setting of a run, e.g. `("interaction", "beta.household", "0.4")`.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterEntry {
    pub section: String,
    pub name: String,
    pub value: String,
}

/// The settings a run starts with: transmission parameters, policies, seed and selector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunParameters {
    pub entries: Vec<ParameterEntry>,
}

impl RunParameters {
    pub fn add(&mut self, section: &str, name: &str, value: impl ToString) {
        self.entries.push(ParameterEntry {
            section: section.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Adds every `(name, value)` pair under `section`.
    pub fn extend(&mut self, section: &str, pairs: Vec<(String, String)>) {
        for (name, value) in pairs {
            self.add(section, &name, value);
        }
    }

    /// The value of `name` in `section`, if it was recorded.
    #[must_use]
    pub fn get(&self, section: &str, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.section == section && entry.name == name)
            .map(|entry| entry.value.as_str())
    }
}

/// Receives the records of a run.
pub trait RecordSink {
    /// # Errors
    ///
    /// Returns a `SimulatorError` if the record cannot be written.
    fn log_population(&mut self, world: &World) -> Result<(), SimulatorError>;

    /// # Errors
    ///
    /// Returns a `SimulatorError` if the record cannot be written.
    fn log_hospital_characteristics(&mut self, hospitals: &[Hospital]) -> Result<(), SimulatorError>;

    /// Records the settings the run starts with.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError` if the record cannot be written.
    fn log_parameters(&mut self, parameters: &RunParameters) -> Result<(), SimulatorError>;

    /// # Errors
    ///
    /// Returns a `SimulatorError` if the record cannot be written.
    fn log_infected(
        &mut self,
        date: NaiveDateTime,
        snapshot: &InfectedSnapshot,
    ) -> Result<(), SimulatorError>;

    /// Counts `n_infected` new infections in a group for the current step.
    fn accumulate_infection_location(&mut self, kind: GroupKind, group: usize, n_infected: usize);

    /// Writes and resets the counts accumulated during the step.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError` if the record cannot be written.
    fn log_infection_location(&mut self, date: NaiveDateTime) -> Result<(), SimulatorError>;

    /// # Errors
    ///
    /// Returns a `SimulatorError` if the record cannot be written.
    fn log_hospital_capacity(
        &mut self,
        date: NaiveDateTime,
        hospitals: &[Hospital],
    ) -> Result<(), SimulatorError>;
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PopulationReport {
    pub id: usize,
    pub age: u8,
    pub residence_kind: Option<GroupKind>,
    pub residence: Option<usize>,
    pub x: f64,
    pub y: f64,
}
create_report_trait!(PopulationReport);

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct HospitalReport {
    pub hospital: usize,
    pub x: f64,
    pub y: f64,
    pub n_beds: usize,
    pub n_icu_beds: usize,
}
create_report_trait!(HospitalReport);

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ParametersReport {
    pub section: String,
    pub name: String,
    pub value: String,
}
create_report_trait!(ParametersReport);

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct InfectedReport {
    pub date: NaiveDateTime,
    pub id: usize,
    pub stage: SymptomStage,
    pub number_of_infected: f64,
}
create_report_trait!(InfectedReport);

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct InfectionLocationReport {
    pub date: NaiveDateTime,
    pub kind: GroupKind,
    pub group: usize,
    pub n_infected: usize,
}
create_report_trait!(InfectionLocationReport);

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct HospitalOccupancyReport {
    pub date: NaiveDateTime,
    pub hospital: usize,
    pub ward_patients: usize,
    pub icu_patients: usize,
}
create_report_trait!(HospitalOccupancyReport);

/// Writes every record kind to its own CSV file:
/// `population.csv`, `hospitals.csv`, `parameters.csv`, `infected.csv`,
/// `infection_locations.csv` and `hospital_occupancy.csv`.
pub struct CsvRecordSink {
    file_writers: HashMap<TypeId, Writer<File>>,
    locations: BTreeMap<(GroupKind, usize), usize>,
}

impl CsvRecordSink {
    /// Creates all report files.
    ///
    /// # Errors
    ///
    /// Returns a `SimulatorError` if a file exists and `options.overwrite` is off, or a file
    /// cannot be created.
    pub fn new(options: &ReportOptions) -> Result<CsvRecordSink, SimulatorError> {
        let mut sink = CsvRecordSink {
            file_writers: HashMap::default(),
            locations: BTreeMap::new(),
        };
        sink.add_report::<PopulationReport>(options, "population")?;
        sink.add_report::<HospitalReport>(options, "hospitals")?;
        sink.add_report::<ParametersReport>(options, "parameters")?;
        sink.add_report::<InfectedReport>(options, "infected")?;
        sink.add_report::<InfectionLocationReport>(options, "infection_locations")?;
        sink.add_report::<HospitalOccupancyReport>(options, "hospital_occupancy")?;
        Ok(sink)
    }

    fn add_report<T: Report>(
        &mut self,
        options: &ReportOptions,
        short_name: &str,
    ) -> Result<(), SimulatorError> {
        let path = options.path(short_name);
        let file = generate_validate_filepath(&path, options.overwrite)?;
        trace!("writing {short_name} records to {}", path.display());
        self.file_writers
            .insert(TypeId::of::<T>(), Writer::from_writer(file));
        Ok(())
    }

    fn send_report<T: Report>(&mut self, report: &T) -> Result<(), SimulatorError> {
        let writer = self
            .file_writers
            .get_mut(&report.type_id())
            .ok_or_else(|| SimulatorError::ReportError("No writer found for the report type".to_string()))?;
        report.serialize(writer)?;
        Ok(())
    }

    fn flush<T: Report>(&mut self) -> Result<(), SimulatorError> {
        if let Some(writer) = self.file_writers.get_mut(&TypeId::of::<T>()) {
            writer.flush()?;
        }
        Ok(())
    }
}

impl RecordSink for CsvRecordSink {
    fn log_population(&mut self, world: &World) -> Result<(), SimulatorError> {
        for agent in world.people.iter() {
            let residence = agent.residence();
            self.send_report(&PopulationReport {
                id: agent.id.0,
                age: agent.age,
                residence_kind: residence.map(|r| r.kind),
                residence: residence.map(|r| r.group),
                x: agent.coordinates.0,
                y: agent.coordinates.1,
            })?;
        }
        self.flush::<PopulationReport>()
    }

    fn log_hospital_characteristics(&mut self, hospitals: &[Hospital]) -> Result<(), SimulatorError> {
        for hospital in hospitals {
            self.send_report(&HospitalReport {
                hospital: hospital.group,
                x: hospital.coordinates.0,
                y: hospital.coordinates.1,
                n_beds: hospital.n_beds,
                n_icu_beds: hospital.n_icu_beds,
            })?;
        }
        self.flush::<HospitalReport>()
    }

    fn log_parameters(&mut self, parameters: &RunParameters) -> Result<(), SimulatorError> {
        for entry in &parameters.entries {
            self.send_report(&ParametersReport {
                section: entry.section.clone(),
                name: entry.name.clone(),
                value: entry.value.clone(),
            })?;
        }
        self.flush::<ParametersReport>()
    }

    fn log_infected(
        &mut self,
        date: NaiveDateTime,
        snapshot: &InfectedSnapshot,
    ) -> Result<(), SimulatorError> {
        for entry in &snapshot.entries {
            self.send_report(&InfectedReport {
                date,
                id: entry.id.0,
                stage: entry.stage,
                number_of_infected: entry.number_of_infected,
            })?;
        }
        self.flush::<InfectedReport>()
    }

    fn accumulate_infection_location(&mut self, kind: GroupKind, group: usize, n_infected: usize) {
        *self.locations.entry((kind, group)).or_default() += n_infected;
    }

    fn log_infection_location(&mut self, date: NaiveDateTime) -> Result<(), SimulatorError> {
        let locations = std::mem::take(&mut self.locations);
        for ((kind, group), n_infected) in locations {
            self.send_report(&InfectionLocationReport {
                date,
                kind,
                group,
                n_infected,
            })?;
        }
        self.flush::<InfectionLocationReport>()
    }

    fn log_hospital_capacity(
        &mut self,
        date: NaiveDateTime,
        hospitals: &[Hospital],
    ) -> Result<(), SimulatorError> {
        for hospital in hospitals {
            self.send_report(&HospitalOccupancyReport {
                date,
                hospital: hospital.group,
                ward_patients: hospital.ward_patients(),
                icu_patients: hospital.icu_patients(),
            })?;
        }
        self.flush::<HospitalOccupancyReport>()
    }
}
