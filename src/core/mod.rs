//! Core classification fusion modules

pub mod measurements;
pub mod mass_of_belief;
pub mod confusion_matrix_calculator;
pub mod ds_fusion;
pub mod majority_voting;
mod region;

// Re-export main types
pub use measurements::{ConfusionMatrixMeasurements, BinaryMeasurements};
pub use mass_of_belief::{ConfusionMatrixToMassOfBelief, DefinitionMethod, MassOfBeliefTable};
pub use confusion_matrix_calculator::ConfusionMatrixCalculator;
pub use ds_fusion::{DsFusionFilter, FusionModel, FusionParams, JointMass, Combination};
pub use majority_voting::{MajorityVotingFilter, VotingParams};
