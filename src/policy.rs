//! Time-windowed interventions.
//!
//! A policy is active on `start_date <= date < end_date`. Interaction policies adjust the
//! transmission parameters of the steps they cover; medical care policies decide what happens to
//! people whose symptoms change. Overlapping policies all apply, in the order they were given.
//!
//! ```json
//! {
//!     "policies": [
//!         {
//!             "name": "close schools",
//!             "start_date": "2020-03-20",
//!             "end_date": "2020-06-01",
//!             "kind": { "interaction": { "type": "social_distancing", "beta_factors": { "school": 0.0 } } }
//!         },
//!         {
//!             "name": "hospitals",
//!             "start_date": "2020-01-01",
//!             "end_date": "2021-01-01",
//!             "kind": { "medical_care": { "type": "hospitalisation" } }
//!         }
//!     ]
//! }
//! ```
use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde::Deserialize;

use crate::config::load_json;
use crate::health::SymptomStage;
use crate::interaction::Interaction;
use crate::world::GroupKind;
use crate::SimulatorError;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionPolicy {
    /// Multiplies the `beta` of the listed group kinds.
    SocialDistancing {
        beta_factors: BTreeMap<GroupKind, f64>,
    },
    /// Multiplies the intensity of physical contacts.
    PhysicalDistancing { alpha_physical_factor: f64 },
    /// A fraction `compliance` of people wear a mask with probability `mask_probability`; a
    /// worn mask multiplies `beta` of the listed kinds by the kind's factor.
    MaskWearing {
        compliance: f64,
        mask_probability: f64,
        beta_factors: BTreeMap<GroupKind, f64>,
    },
}

impl InteractionPolicy {
    pub fn adjust_interaction(&self, interaction: &mut Interaction) {
        match self {
            InteractionPolicy::SocialDistancing { beta_factors } => {
                for (kind, factor) in beta_factors {
                    interaction.scale_beta(*kind, *factor);
                }
            }
            InteractionPolicy::PhysicalDistancing {
                alpha_physical_factor,
            } => interaction.scale_alpha_physical(*alpha_physical_factor),
            InteractionPolicy::MaskWearing {
                compliance,
                mask_probability,
                beta_factors,
            } => {
                for (kind, factor) in beta_factors {
                    let reduction = compliance * mask_probability * (1.0 - factor);
                    interaction.scale_beta(*kind, 1.0 - reduction);
                }
            }
        }
    }

    fn validate(&self) -> Result<(), SimulatorError> {
        let factors_valid = |factors: &BTreeMap<GroupKind, f64>| factors.values().all(|f| *f >= 0.0);
        let valid = match self {
            InteractionPolicy::SocialDistancing { beta_factors } => factors_valid(beta_factors),
            InteractionPolicy::PhysicalDistancing {
                alpha_physical_factor,
            } => *alpha_physical_factor >= 0.0,
            InteractionPolicy::MaskWearing {
                compliance,
                mask_probability,
                beta_factors,
            } => {
                (0.0..=1.0).contains(compliance)
                    && (0.0..=1.0).contains(mask_probability)
                    && beta_factors.values().all(|f| (0.0..=1.0).contains(f))
            }
        };
        if valid {
            Ok(())
        } else {
            Err(SimulatorError::Config(format!("invalid factors in {self:?}")))
        }
    }
}

/// Care a person asks for after a change in symptoms.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MedicalCareRequest {
    Ward,
    IntensiveCare,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MedicalCarePolicy {
    /// Severe cases go to a hospital ward and critical cases to intensive care.
    Hospitalisation,
}

impl MedicalCarePolicy {
    /// Requests care for people who need it. Admission is idempotent, so this asks again on
    /// every update while the person stays severe or critical.
    #[must_use]
    pub fn react_to_stage_change(
        &self,
        stage: SymptomStage,
        _previous: SymptomStage,
    ) -> Option<MedicalCareRequest> {
        match self {
            MedicalCarePolicy::Hospitalisation => match stage {
                SymptomStage::Severe => Some(MedicalCareRequest::Ward),
                SymptomStage::Critical => Some(MedicalCareRequest::IntensiveCare),
                _ => None,
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Interaction(InteractionPolicy),
    MedicalCare(MedicalCarePolicy),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Policy {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub kind: PolicyKind,
}

impl Policy {
    #[must_use]
    pub fn is_active(&self, date: NaiveDateTime) -> bool {
        let day = date.date();
        self.start_date <= day && day < self.end_date
    }
}

/// The interaction policies active at one date.
#[derive(Debug)]
pub struct InteractionPolicies<'a> {
    policies: Vec<(&'a str, &'a InteractionPolicy)>,
}

impl InteractionPolicies<'_> {
    /// Resets `interaction` to its baseline, then lets every active policy adjust it. Applying
    /// twice for the same date gives the same parameters.
    pub fn apply(&self, date: NaiveDateTime, interaction: &mut Interaction) {
        interaction.reset_to_baseline();
        for (name, policy) in &self.policies {
            debug!("{date}: applying interaction policy {name}");
            policy.adjust_interaction(interaction);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// The medical care policies active at one date.
#[derive(Debug)]
pub struct MedicalCarePolicies<'a> {
    policies: Vec<&'a MedicalCarePolicy>,
}

impl MedicalCarePolicies<'_> {
    /// The first care requested by any active policy.
    #[must_use]
    pub fn apply(&self, stage: SymptomStage, previous: SymptomStage) -> Option<MedicalCareRequest> {
        self.policies
            .iter()
            .find_map(|policy| policy.react_to_stage_change(stage, previous))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Policies {
    policies: Vec<Policy>,
}

impl Policies {
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if a policy ends before it starts or carries factors
    /// out of range.
    pub fn new(policies: Vec<Policy>) -> Result<Policies, SimulatorError> {
        for policy in &policies {
            if policy.end_date < policy.start_date {
                return Err(SimulatorError::Config(format!(
                    "policy {} ends before it starts",
                    policy.name
                )));
            }
            if let PolicyKind::Interaction(interaction) = &policy.kind {
                interaction.validate()?;
            }
        }
        Ok(Policies { policies })
    }

    /// # Errors
    ///
    /// Returns a `SimulatorError` if the file cannot be read or parsed, or a policy is invalid.
    pub fn from_file(path: &Path) -> Result<Policies, SimulatorError> {
        let policies: Policies = load_json(path)?;
        Policies::new(policies.policies)
    }

    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    #[must_use]
    pub fn active_interaction_policies(&self, date: NaiveDateTime) -> InteractionPolicies<'_> {
        let policies = self
            .policies
            .iter()
            .filter(|policy| policy.is_active(date))
            .filter_map(|policy| match &policy.kind {
                PolicyKind::Interaction(interaction) => Some((policy.name.as_str(), interaction)),
                PolicyKind::MedicalCare(_) => None,
            })
            .collect();
        InteractionPolicies { policies }
    }

    #[must_use]
    pub fn active_medical_care_policies(&self, date: NaiveDateTime) -> MedicalCarePolicies<'_> {
        let policies = self
            .policies
            .iter()
            .filter(|policy| policy.is_active(date))
            .filter_map(|policy| match &policy.kind {
                PolicyKind::MedicalCare(medical) => Some(medical),
                PolicyKind::Interaction(_) => None,
            })
            .collect();
        MedicalCarePolicies { policies }
    }
}
