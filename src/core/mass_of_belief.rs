use crate::core::measurements::ConfusionMatrixMeasurements;
use crate::types::{ClassLabel, ConfusionMatrix, FusionError, FusionResult, LabelMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Measurement turned into each class's mass of belief
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitionMethod {
    /// Per-class precision (user's accuracy)
    Precision,
    /// Per-class recall (producer's accuracy)
    Recall,
    /// Overall accuracy, shared by every class
    Accuracy,
    /// Kappa index, shared by every class
    Kappa,
}

impl Default for DefinitionMethod {
    fn default() -> Self {
        DefinitionMethod::Precision
    }
}

impl std::fmt::Display for DefinitionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionMethod::Precision => write!(f, "precision"),
            DefinitionMethod::Recall => write!(f, "recall"),
            DefinitionMethod::Accuracy => write!(f, "accuracy"),
            DefinitionMethod::Kappa => write!(f, "kappa"),
        }
    }
}

impl FromStr for DefinitionMethod {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "precision" => Ok(DefinitionMethod::Precision),
            "recall" => Ok(DefinitionMethod::Recall),
            "accuracy" => Ok(DefinitionMethod::Accuracy),
            "kappa" => Ok(DefinitionMethod::Kappa),
            other => Err(FusionError::InvalidConfiguration(format!(
                "Unknown mass of belief definition method: {}",
                other
            ))),
        }
    }
}

/// Masses of belief of one classifier.
///
/// `masses[L]` is the belief the classifier deserves when it votes `L`;
/// `universe` is the mass left on the whole frame of discernment.
#[derive(Debug, Clone, PartialEq)]
pub struct MassOfBeliefTable<L: ClassLabel> {
    pub masses: HashMap<L, f64>,
    pub universe: f64,
}

impl<L: ClassLabel> MassOfBeliefTable<L> {
    pub fn mass_of(&self, label: &L) -> Option<f64> {
        self.masses.get(label).copied()
    }
}

/// Converts a confusion matrix into a Dempster-Shafer mass of belief table
pub struct ConfusionMatrixToMassOfBelief<L: ClassLabel> {
    confusion_matrix: ConfusionMatrix,
    label_map: Option<LabelMap<L>>,
    definition_method: DefinitionMethod,
    table: Option<MassOfBeliefTable<L>>,
}

impl<L: ClassLabel> ConfusionMatrixToMassOfBelief<L> {
    pub fn new(confusion_matrix: ConfusionMatrix) -> Self {
        Self {
            confusion_matrix,
            label_map: None,
            definition_method: DefinitionMethod::default(),
            table: None,
        }
    }

    pub fn with_label_map(mut self, label_map: LabelMap<L>) -> Self {
        self.label_map = Some(label_map);
        self.table = None;
        self
    }

    pub fn with_definition_method(mut self, method: DefinitionMethod) -> Self {
        self.definition_method = method;
        self.table = None;
        self
    }

    pub fn definition_method(&self) -> DefinitionMethod {
        self.definition_method
    }

    /// Compute the mass table from the current confusion matrix
    pub fn update(&mut self) -> FusionResult<()> {
        let label_map = self.label_map.as_ref().ok_or_else(|| {
            FusionError::InvalidConfiguration(
                "A label map is required to convert a confusion matrix into masses of belief"
                    .to_string(),
            )
        })?;

        let measurements =
            ConfusionMatrixMeasurements::compute_with_labels(&self.confusion_matrix, label_map)?;

        let per_class: Vec<f64> = match self.definition_method {
            DefinitionMethod::Precision => measurements.precisions().to_vec(),
            DefinitionMethod::Recall => measurements.recalls().to_vec(),
            DefinitionMethod::Accuracy => {
                vec![measurements.overall_accuracy(); label_map.len()]
            }
            DefinitionMethod::Kappa => vec![measurements.kappa_index(); label_map.len()],
        };

        let masses: HashMap<L, f64> = label_map
            .labels()
            .iter()
            .zip(per_class)
            .map(|(label, value)| (label.clone(), clamp_mass(label, value)))
            .collect();

        let universe = match self.definition_method {
            DefinitionMethod::Precision | DefinitionMethod::Recall => {
                1.0 - masses.values().sum::<f64>() / masses.len() as f64
            }
            DefinitionMethod::Accuracy => {
                1.0 - clamp_unit(measurements.overall_accuracy())
            }
            DefinitionMethod::Kappa => 1.0 - clamp_unit(measurements.kappa_index()),
        };

        log::debug!(
            "Mass of belief ({}): {:?}, universe = {:.4}",
            self.definition_method,
            masses,
            universe
        );

        self.table = Some(MassOfBeliefTable { masses, universe });
        Ok(())
    }

    /// Label -> mass mapping, available after `update`
    pub fn map_mass_of_belief(&self) -> Option<&HashMap<L, f64>> {
        self.table.as_ref().map(|t| &t.masses)
    }

    /// Mass of the universe, available after `update`
    pub fn universe_mass(&self) -> Option<f64> {
        self.table.as_ref().map(|t| t.universe)
    }

    /// Compute (if needed) and hand over the mass table
    pub fn into_table(mut self) -> FusionResult<MassOfBeliefTable<L>> {
        if self.table.is_none() {
            self.update()?;
        }
        self.table.ok_or_else(|| {
            FusionError::InvalidConfiguration("Mass of belief table was not computed".to_string())
        })
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn clamp_mass<L: ClassLabel>(label: &L, value: f64) -> f64 {
    if value.is_nan() {
        log::warn!("Undefined measurement for class {:?}, using a null mass", label);
    }
    clamp_unit(value)
}
