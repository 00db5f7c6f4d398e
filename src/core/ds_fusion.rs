use crate::core::mass_of_belief::{
    ConfusionMatrixToMassOfBelief, DefinitionMethod, MassOfBeliefTable,
};
use crate::core::region::process_row_blocks;
use crate::types::{
    ClassLabel, ConfusionMatrix, FusionError, FusionResult, LabelImage, LabelImageView, LabelMap,
};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Normalization constants at or below this value count as total conflict
const MIN_NORMALIZATION: f64 = 1e-12;

/// Dempster-Shafer fusion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionParams<L> {
    /// Measurement used as mass of belief
    pub definition_method: DefinitionMethod,
    /// Label written where the mask excludes the pixel or no classifier gives evidence
    pub no_data_label: L,
    /// Label written where no single class wins
    pub undecided_label: L,
    /// Require a validity mask
    pub use_mask: bool,
    /// Rows per worker block (automatic when unset)
    pub chunk_rows: Option<usize>,
}

impl<L: Default> Default for FusionParams<L> {
    fn default() -> Self {
        Self {
            definition_method: DefinitionMethod::Precision,
            no_data_label: L::default(),
            undecided_label: L::default(),
            use_mask: false,
            chunk_rows: None,
        }
    }
}

/// Joint mass distribution over singleton labels and the universe.
///
/// Every classifier vote is a simple mass function with two focal elements:
/// the voted label and the universe. Folding votes in with [`JointMass::combine`]
/// applies Dempster's rule of combination.
#[derive(Debug, Clone, PartialEq)]
pub struct JointMass<L> {
    focal: Vec<(L, f64)>,
    universe: f64,
}

impl<L: ClassLabel> Default for JointMass<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ClassLabel> JointMass<L> {
    /// Empty distribution (no evidence yet)
    pub fn new() -> Self {
        Self {
            focal: Vec::new(),
            universe: 0.0,
        }
    }

    /// Restart from a single vote
    pub fn reset(&mut self, label: &L, mass: f64, universe: f64) {
        self.focal.clear();
        self.focal.push((label.clone(), mass));
        self.universe = universe;
    }

    /// Clear all evidence, keeping the allocation
    pub fn clear(&mut self) {
        self.focal.clear();
        self.universe = 0.0;
    }

    /// Fold in one vote `{label: mass, universe: universe}`.
    ///
    /// Returns `false` when the two distributions are in total conflict; the
    /// distribution is then left unnormalized and must not be used.
    pub fn combine(&mut self, label: &L, mass: f64, universe: f64) -> bool {
        let mut conflict = 0.0;
        let mut matched = false;

        for (focal_label, focal_mass) in self.focal.iter_mut() {
            let m = *focal_mass;
            if focal_label == label {
                *focal_mass = m * mass + m * universe + self.universe * mass;
                matched = true;
            } else {
                conflict += m * mass;
                *focal_mass = m * universe;
            }
        }

        if !matched {
            self.focal.push((label.clone(), self.universe * mass));
        }
        self.universe *= universe;

        let k = 1.0 - conflict;
        if !(k > MIN_NORMALIZATION) {
            return false;
        }

        for (_, focal_mass) in self.focal.iter_mut() {
            *focal_mass /= k;
        }
        self.universe /= k;
        true
    }

    /// Joint mass of a singleton label (zero if it never received a vote)
    pub fn mass_of(&self, label: &L) -> f64 {
        self.focal
            .iter()
            .find(|(l, _)| l == label)
            .map_or(0.0, |(_, m)| *m)
    }

    pub fn universe(&self) -> f64 {
        self.universe
    }

    /// Singleton masses in the order labels were first voted
    pub fn focal_elements(&self) -> &[(L, f64)] {
        &self.focal
    }

    pub fn is_empty(&self) -> bool {
        self.focal.is_empty()
    }

    /// Label with the strictly largest positive mass, if any
    pub fn decide(&self) -> Option<&L> {
        let mut best: Option<&(L, f64)> = None;
        let mut tied = false;

        for entry in &self.focal {
            match best {
                Some((_, best_mass)) if entry.1 < *best_mass => {}
                Some((_, best_mass)) if entry.1 == *best_mass => tied = true,
                _ => {
                    best = Some(entry);
                    tied = false;
                }
            }
        }

        match best {
            Some((label, mass)) if !tied && *mass > 0.0 => Some(label),
            _ => None,
        }
    }
}

/// Outcome of combining the votes of one pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    /// No classifier voted for a known class
    NoEvidence,
    /// Dempster's normalization constant vanished
    TotalConflict,
    /// Votes were combined into a normalized distribution
    Combined,
}

/// Frozen state shared by all workers: one mass table per classifier and
/// the universe of known classes.
#[derive(Debug, Clone)]
pub struct FusionModel<L: ClassLabel> {
    params: FusionParams<L>,
    tables: Vec<MassOfBeliefTable<L>>,
    universe: BTreeSet<L>,
}

impl<L: ClassLabel> FusionModel<L> {
    pub fn params(&self) -> &FusionParams<L> {
        &self.params
    }

    pub fn tables(&self) -> &[MassOfBeliefTable<L>] {
        &self.tables
    }

    /// Union of the classes known by every classifier
    pub fn universe(&self) -> &BTreeSet<L> {
        &self.universe
    }

    pub fn number_of_classifiers(&self) -> usize {
        self.tables.len()
    }

    /// Combine the votes of one pixel (one label per classifier) into `joint`
    pub fn combine_votes(&self, votes: &[L], joint: &mut JointMass<L>) -> Combination {
        debug_assert_eq!(votes.len(), self.tables.len());
        joint.clear();

        for (vote, table) in votes.iter().zip(&self.tables) {
            if *vote == self.params.no_data_label || !self.universe.contains(vote) {
                continue;
            }
            let mass = match table.mass_of(vote) {
                Some(mass) => mass,
                None => continue,
            };

            if joint.is_empty() {
                joint.reset(vote, mass, table.universe);
            } else if !joint.combine(vote, mass, table.universe) {
                return Combination::TotalConflict;
            }
        }

        if joint.is_empty() {
            Combination::NoEvidence
        } else {
            Combination::Combined
        }
    }

    /// Joint mass distribution of one pixel, `None` without evidence or under total conflict
    pub fn joint_mass(&self, votes: &[L]) -> Option<JointMass<L>> {
        let mut joint = JointMass::new();
        match self.combine_votes(votes, &mut joint) {
            Combination::Combined => Some(joint),
            Combination::NoEvidence | Combination::TotalConflict => None,
        }
    }

    /// Fused label of one pixel, reusing `joint` as scratch space
    pub fn fuse_votes(&self, votes: &[L], joint: &mut JointMass<L>) -> L {
        match self.combine_votes(votes, joint) {
            Combination::NoEvidence => self.params.no_data_label.clone(),
            Combination::TotalConflict => self.params.undecided_label.clone(),
            Combination::Combined => joint
                .decide()
                .unwrap_or(&self.params.undecided_label)
                .clone(),
        }
    }

    pub fn fuse(&self, votes: &[L]) -> L {
        self.fuse_votes(votes, &mut JointMass::new())
    }
}

/// Dempster-Shafer fusion of classification maps.
///
/// Each classifier is described by its confusion matrix and the label map
/// giving the meaning of the matrix rows/columns. The masses of belief are
/// derived once before any pixel is processed.
pub struct DsFusionFilter<L: ClassLabel> {
    params: FusionParams<L>,
    confusion_matrices: Vec<ConfusionMatrix>,
    label_maps: Vec<LabelMap<L>>,
}

impl<L: ClassLabel> DsFusionFilter<L> {
    pub fn new(params: FusionParams<L>) -> Self {
        Self {
            params,
            confusion_matrices: Vec::new(),
            label_maps: Vec::new(),
        }
    }

    pub fn with_confusion_matrices(mut self, matrices: Vec<ConfusionMatrix>) -> Self {
        self.confusion_matrices = matrices;
        self
    }

    pub fn with_label_maps(mut self, label_maps: Vec<LabelMap<L>>) -> Self {
        self.label_maps = label_maps;
        self
    }

    /// Register one more classifier
    pub fn add_classifier(&mut self, matrix: ConfusionMatrix, label_map: LabelMap<L>) {
        self.confusion_matrices.push(matrix);
        self.label_maps.push(label_map);
    }

    pub fn params(&self) -> &FusionParams<L> {
        &self.params
    }

    /// Build the per-classifier mass tables and the universe of classes
    pub fn build_model(&self) -> FusionResult<FusionModel<L>> {
        if self.confusion_matrices.len() != self.label_maps.len() {
            return Err(FusionError::ConfigurationMismatch(format!(
                "{} confusion matrices for {} label maps",
                self.confusion_matrices.len(),
                self.label_maps.len()
            )));
        }
        if self.confusion_matrices.is_empty() {
            return Err(FusionError::InvalidConfiguration(
                "At least one classifier is required".to_string(),
            ));
        }

        let mut tables = Vec::with_capacity(self.confusion_matrices.len());
        let mut universe = BTreeSet::new();

        for (index, (matrix, label_map)) in self
            .confusion_matrices
            .iter()
            .zip(&self.label_maps)
            .enumerate()
        {
            let (rows, cols) = matrix.dim();
            if rows != cols {
                return Err(FusionError::InvalidConfiguration(format!(
                    "Classifier {}: confusion matrix must be square, got {}x{}",
                    index, rows, cols
                )));
            }
            if rows != label_map.len() {
                return Err(FusionError::ConfigurationMismatch(format!(
                    "Classifier {}: confusion matrix is {}x{} but label map holds {} classes",
                    index,
                    rows,
                    cols,
                    label_map.len()
                )));
            }

            let table = ConfusionMatrixToMassOfBelief::new(matrix.clone())
                .with_label_map(label_map.clone())
                .with_definition_method(self.params.definition_method)
                .into_table()?;

            log::debug!(
                "Classifier {}: {} classes, universe mass {:.4}",
                index,
                table.masses.len(),
                table.universe
            );

            universe.extend(label_map.labels().iter().cloned());
            tables.push(table);
        }

        log::debug!("Universe of {} classes: {:?}", universe.len(), universe);

        Ok(FusionModel {
            params: self.params.clone(),
            tables,
            universe,
        })
    }

    /// Fuse the classification maps into a new label image
    pub fn apply(
        &self,
        inputs: &[LabelImageView<'_, L>],
        mask: Option<ArrayView2<'_, u8>>,
    ) -> FusionResult<LabelImage<L>> {
        let shape = inputs.first().map(|image| image.dim()).unwrap_or((0, 0));
        let mut output = Array2::from_elem(shape, self.params.no_data_label.clone());
        self.apply_into(inputs, mask, &mut output)?;
        Ok(output)
    }

    /// Fuse the classification maps into `output`.
    ///
    /// The whole configuration is validated before the first output pixel is
    /// written.
    pub fn apply_into(
        &self,
        inputs: &[LabelImageView<'_, L>],
        mask: Option<ArrayView2<'_, u8>>,
        output: &mut LabelImage<L>,
    ) -> FusionResult<()> {
        if inputs.len() != self.confusion_matrices.len()
            || inputs.len() != self.label_maps.len()
        {
            return Err(FusionError::ConfigurationMismatch(format!(
                "{} classification maps, {} confusion matrices and {} label maps",
                inputs.len(),
                self.confusion_matrices.len(),
                self.label_maps.len()
            )));
        }

        check_geometry(inputs, mask.as_ref(), output.dim(), self.params.use_mask)?;

        let model = self.build_model()?;

        log::info!(
            "Dempster-Shafer fusion of {} classification maps ({}x{}, {} masses)",
            inputs.len(),
            output.nrows(),
            output.ncols(),
            self.params.definition_method
        );

        let mask = if self.params.use_mask { mask } else { None };
        process_row_blocks(
            inputs,
            mask.as_ref(),
            output,
            self.params.chunk_rows,
            &self.params.no_data_label,
            JointMass::new,
            |joint, votes| model.fuse_votes(votes, joint),
        );

        log::info!("Dempster-Shafer fusion completed");
        Ok(())
    }
}

/// Check that every input, the mask and the output share one geometry
pub(crate) fn check_geometry<L>(
    inputs: &[LabelImageView<'_, L>],
    mask: Option<&ArrayView2<'_, u8>>,
    output_shape: (usize, usize),
    use_mask: bool,
) -> FusionResult<()> {
    if inputs.is_empty() {
        return Err(FusionError::InvalidConfiguration(
            "At least one classification map is required".to_string(),
        ));
    }

    for (index, image) in inputs.iter().enumerate() {
        if image.dim() != output_shape {
            return Err(FusionError::ConfigurationMismatch(format!(
                "Classification map {} is {:?} but output is {:?}",
                index,
                image.dim(),
                output_shape
            )));
        }
    }

    if use_mask {
        let mask = mask.ok_or_else(|| {
            FusionError::MissingInput("Mask is enabled but no mask image was supplied".to_string())
        })?;
        if mask.dim() != output_shape {
            return Err(FusionError::ConfigurationMismatch(format!(
                "Mask is {:?} but output is {:?}",
                mask.dim(),
                output_shape
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_class_filter(method: DefinitionMethod) -> DsFusionFilter<i32> {
        let params = FusionParams {
            definition_method: method,
            no_data_label: 0,
            undecided_label: 255,
            ..Default::default()
        };
        let labels = LabelMap::from_labels(vec![1, 2]).unwrap();
        DsFusionFilter::new(params)
            .with_confusion_matrices(vec![array![[8, 2], [1, 9]], array![[7, 3], [2, 8]]])
            .with_label_maps(vec![labels.clone(), labels])
    }

    #[test]
    fn test_combine_agreeing_votes() {
        let mut joint = JointMass::new();
        joint.reset(&1, 0.6, 0.4);
        assert!(joint.combine(&1, 0.5, 0.5));

        // no conflict: 0.3 + 0.3 + 0.2
        assert_relative_eq!(joint.mass_of(&1), 0.8, epsilon = 1e-12);
        assert_relative_eq!(joint.universe(), 0.2, epsilon = 1e-12);
        assert_eq!(joint.decide(), Some(&1));
    }

    #[test]
    fn test_combine_conflicting_votes() {
        let mut joint = JointMass::new();
        joint.reset(&"a", 0.6, 0.4);
        assert!(joint.combine(&"b", 0.5, 0.5));

        let k = 1.0 - 0.6 * 0.5;
        assert_relative_eq!(joint.mass_of(&"a"), 0.6 * 0.5 / k, epsilon = 1e-12);
        assert_relative_eq!(joint.mass_of(&"b"), 0.4 * 0.5 / k, epsilon = 1e-12);
        assert_relative_eq!(joint.universe(), 0.4 * 0.5 / k, epsilon = 1e-12);
        assert_eq!(joint.decide(), Some(&"a"));
    }

    #[test]
    fn test_total_conflict_is_reported() {
        let mut joint = JointMass::new();
        joint.reset(&1, 1.0, 0.0);
        assert!(!joint.combine(&2, 1.0, 0.0));
    }

    #[test]
    fn test_tie_is_undecided() {
        let mut joint = JointMass::new();
        joint.reset(&1, 0.5, 0.5);
        assert!(joint.combine(&2, 0.5, 0.5));
        assert_eq!(joint.decide(), None);
    }

    #[test]
    fn test_model_universe_and_tables() {
        let filter = two_class_filter(DefinitionMethod::Accuracy);
        let model = filter.build_model().unwrap();

        assert_eq!(model.number_of_classifiers(), 2);
        assert_eq!(model.universe().iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_relative_eq!(model.tables()[0].masses[&1], 0.85);
        assert_relative_eq!(model.tables()[1].universe, 1.0 - 0.75);
    }

    #[test]
    fn test_nodata_and_unknown_votes_give_no_evidence() {
        let model = two_class_filter(DefinitionMethod::Precision)
            .build_model()
            .unwrap();

        assert_eq!(model.fuse(&[0, 0]), 0);
        assert_eq!(model.fuse(&[7, 42]), 0);
        // only classifier B speaks
        assert_eq!(model.fuse(&[0, 2]), 2);
    }

    #[test]
    fn test_mismatched_matrix_and_label_map_counts() {
        let labels = LabelMap::from_labels(vec![1, 2]).unwrap();
        let filter = DsFusionFilter::new(FusionParams::<i32>::default())
            .with_confusion_matrices(vec![array![[1, 0], [0, 1]]])
            .with_label_maps(vec![labels.clone(), labels]);

        assert!(matches!(
            filter.build_model(),
            Err(FusionError::ConfigurationMismatch(_))
        ));
    }

    #[test]
    fn test_non_square_matrix_is_invalid() {
        let labels = LabelMap::from_labels(vec![1, 2]).unwrap();
        let filter = DsFusionFilter::new(FusionParams::<i32>::default())
            .with_confusion_matrices(vec![ConfusionMatrix::zeros((2, 3))])
            .with_label_maps(vec![labels.clone()]);
        assert!(matches!(
            filter.build_model(),
            Err(FusionError::InvalidConfiguration(_))
        ));

        // square but sized for another label map
        let filter = DsFusionFilter::new(FusionParams::<i32>::default())
            .with_confusion_matrices(vec![ConfusionMatrix::zeros((3, 3))])
            .with_label_maps(vec![labels]);
        assert!(matches!(
            filter.build_model(),
            Err(FusionError::ConfigurationMismatch(_))
        ));
    }

    #[test]
    fn test_missing_mask() {
        let mut filter = two_class_filter(DefinitionMethod::Precision);
        filter.params.use_mask = true;
        let a = array![[1, 2]];

        assert!(matches!(
            filter.apply(&[a.view(), a.view()], None),
            Err(FusionError::MissingInput(_))
        ));
    }

    #[test]
    fn test_mask_writes_nodata() {
        let mut filter = two_class_filter(DefinitionMethod::Precision);
        filter.params.use_mask = true;
        let a = array![[1, 2], [2, 1]];
        let mask = array![[1u8, 1], [0, 1]];

        let fused = filter.apply(&[a.view(), a.view()], Some(mask.view())).unwrap();
        assert_eq!(fused, array![[1, 2], [0, 1]]);
    }

    #[test]
    fn test_params_default() {
        let params = FusionParams::<u8>::default();
        assert_eq!(params.definition_method, DefinitionMethod::Precision);
        assert_eq!(params.no_data_label, 0);
        assert!(!params.use_mask);
    }
}
