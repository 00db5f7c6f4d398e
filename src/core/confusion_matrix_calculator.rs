use crate::core::measurements::ConfusionMatrixMeasurements;
use crate::types::{ClassLabel, ConfusionMatrix, FusionError, FusionResult, LabelMap};
use ndarray::ArrayView2;
use std::collections::{BTreeMap, BTreeSet};

/// Confusion matrix computed from a reference map and a produced classification
#[derive(Debug, Clone)]
pub struct ConfusionMatrixCalculator<L: ClassLabel> {
    confusion_matrix: ConfusionMatrix,
    label_map: LabelMap<L>,
    number_of_samples: u64,
}

impl<L: ClassLabel> ConfusionMatrixCalculator<L> {
    /// Count (reference, produced) label pairs.
    ///
    /// Pairs where either side equals `no_data` are discarded. Rows and
    /// columns cover the union of reference and produced labels in ascending
    /// order, so the matrix is always square.
    pub fn compute(
        reference: ArrayView2<'_, L>,
        produced: ArrayView2<'_, L>,
        no_data: Option<&L>,
    ) -> FusionResult<Self> {
        if reference.dim() != produced.dim() {
            return Err(FusionError::ConfigurationMismatch(format!(
                "Reference map is {:?} but produced map is {:?}",
                reference.dim(),
                produced.dim()
            )));
        }

        let mut pairs: BTreeMap<(L, L), u64> = BTreeMap::new();
        let mut classes = BTreeSet::new();
        let mut number_of_samples = 0u64;

        for (ref_label, prod_label) in reference.iter().zip(produced.iter()) {
            if let Some(no_data) = no_data {
                if ref_label == no_data || prod_label == no_data {
                    continue;
                }
            }
            *pairs
                .entry((ref_label.clone(), prod_label.clone()))
                .or_insert(0) += 1;
            classes.insert(ref_label.clone());
            classes.insert(prod_label.clone());
            number_of_samples += 1;
        }

        if number_of_samples == 0 {
            return Err(FusionError::InvalidConfiguration(
                "No valid reference/produced pixel pair to build a confusion matrix".to_string(),
            ));
        }

        let label_map = LabelMap::from_labels(classes)?;
        let n = label_map.len();
        let mut confusion_matrix = ConfusionMatrix::zeros((n, n));

        for ((ref_label, prod_label), count) in pairs {
            let i = label_map.index_of(&ref_label);
            let j = label_map.index_of(&prod_label);
            if let (Some(i), Some(j)) = (i, j) {
                confusion_matrix[[i, j]] = count;
            }
        }

        log::info!(
            "Confusion matrix of {} classes from {} samples",
            n,
            number_of_samples
        );

        let calculator = Self {
            confusion_matrix,
            label_map,
            number_of_samples,
        };
        calculator.log_measurements()?;
        Ok(calculator)
    }

    /// Accuracy measurements of the computed matrix
    pub fn measurements(&self) -> FusionResult<ConfusionMatrixMeasurements> {
        ConfusionMatrixMeasurements::compute_with_labels(&self.confusion_matrix, &self.label_map)
    }

    fn log_measurements(&self) -> FusionResult<()> {
        let measurements = self.measurements()?;

        for (i, label) in self.label_map.labels().iter().enumerate() {
            log::info!(
                "Class {:?}: precision = {:.4}, recall = {:.4}, F-score = {:.4}",
                label,
                measurements.precisions()[i],
                measurements.recalls()[i],
                measurements.f_scores()[i]
            );
        }
        log::info!("Kappa index: {:.4}", measurements.kappa_index());
        log::info!("Overall accuracy: {:.4}", measurements.overall_accuracy());
        Ok(())
    }

    pub fn confusion_matrix(&self) -> &ConfusionMatrix {
        &self.confusion_matrix
    }

    pub fn label_map(&self) -> &LabelMap<L> {
        &self.label_map
    }

    pub fn number_of_samples(&self) -> u64 {
        self.number_of_samples
    }

    pub fn into_parts(self) -> (ConfusionMatrix, LabelMap<L>) {
        (self.confusion_matrix, self.label_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_counts_and_label_union() {
        let reference = array![[1, 1, 2], [2, 0, 3]];
        let produced = array![[1, 2, 2], [5, 1, 3]];

        let calc =
            ConfusionMatrixCalculator::compute(reference.view(), produced.view(), Some(&0)).unwrap();

        assert_eq!(calc.number_of_samples(), 5);
        assert_eq!(calc.label_map().labels(), &[1, 2, 3, 5]);

        let m = calc.confusion_matrix();
        assert_eq!(m.dim(), (4, 4));
        assert_eq!(m[[0, 0]], 1);
        assert_eq!(m[[0, 1]], 1);
        assert_eq!(m[[1, 1]], 1);
        assert_eq!(m[[1, 3]], 1);
        assert_eq!(m[[2, 2]], 1);
        assert_eq!(m.sum(), 5);
    }

    #[test]
    fn test_measurements_of_computed_matrix() {
        let reference = array![[1, 1, 2, 2]];
        let produced = array![[1, 2, 2, 2]];

        let calc = ConfusionMatrixCalculator::compute(reference.view(), produced.view(), None).unwrap();
        let m = calc.measurements().unwrap();

        assert_eq!(m.number_of_classes(), 2);
        assert_eq!(m.overall_accuracy(), 0.75);
        assert_eq!(m.precisions()[0], 1.0);
        assert_eq!(m.recalls()[0], 0.5);
        assert_eq!(m.precisions()[1], 2.0 / 3.0);
        assert_eq!(m.recalls()[1], 1.0);
    }

    #[test]
    fn test_errors() {
        let a = array![[1, 2]];
        let b = array![[1], [2]];
        assert!(matches!(
            ConfusionMatrixCalculator::compute(a.view(), b.view(), None),
            Err(FusionError::ConfigurationMismatch(_))
        ));

        let nodata = array![[0, 0]];
        assert!(matches!(
            ConfusionMatrixCalculator::compute(nodata.view(), a.view(), Some(&0)),
            Err(FusionError::InvalidConfiguration(_))
        ));
    }
}
