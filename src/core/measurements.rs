use crate::types::{ClassLabel, ConfusionMatrix, FusionError, FusionResult, LabelMap};
use ndarray::{Array1, Axis};

/// Per-class and global accuracy measurements of a confusion matrix.
///
/// The matrix is indexed `[reference][produced]`. Ratios whose denominator is
/// zero are reported as NaN rather than rejected.
#[derive(Debug, Clone)]
pub struct ConfusionMatrixMeasurements {
    number_of_classes: usize,
    number_of_samples: u64,
    true_positives: Array1<f64>,
    false_negatives: Array1<f64>,
    false_positives: Array1<f64>,
    true_negatives: Array1<f64>,
    precisions: Array1<f64>,
    recalls: Array1<f64>,
    f_scores: Array1<f64>,
    overall_accuracy: f64,
    kappa_index: f64,
}

impl ConfusionMatrixMeasurements {
    /// Compute the measurements of a square confusion matrix, indices being used as labels
    pub fn compute(matrix: &ConfusionMatrix) -> FusionResult<Self> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(FusionError::InvalidConfiguration(format!(
                "Confusion matrix must be square, got {}x{}",
                rows, cols
            )));
        }
        if rows == 0 {
            return Err(FusionError::InvalidConfiguration(
                "Confusion matrix is empty".to_string(),
            ));
        }

        let counts = matrix.mapv(|c| c as f64);
        let row_sums = counts.sum_axis(Axis(1));
        let col_sums = counts.sum_axis(Axis(0));
        let diagonal = counts.diag().to_owned();
        let total = counts.sum();

        let true_positives = diagonal.clone();
        let false_negatives = &row_sums - &diagonal;
        let false_positives = &col_sums - &diagonal;
        let true_negatives =
            diagonal.mapv(|_| total) - &true_positives - &false_negatives - &false_positives;

        let precisions = &true_positives / &(&true_positives + &false_positives);
        let recalls = &true_positives / &(&true_positives + &false_negatives);
        let f_scores = ndarray::Zip::from(&precisions)
            .and(&recalls)
            .map_collect(|&p, &r| 2.0 * p * r / (p + r));

        let trace = diagonal.sum();
        let overall_accuracy = trace / total;

        // Cohen's kappa over raw counts
        let chance = row_sums.dot(&col_sums);
        let denominator = total * total - chance;
        let kappa_index = if denominator == 0.0 && total > 0.0 {
            // every sample in one class on both sides: agreement is perfect
            1.0
        } else {
            (total * trace - chance) / denominator
        };

        log::debug!(
            "Confusion matrix {}x{}: {} samples, OA = {:.4}, kappa = {:.4}",
            rows,
            cols,
            total,
            overall_accuracy,
            kappa_index
        );

        Ok(Self {
            number_of_classes: rows,
            number_of_samples: matrix.sum(),
            true_positives,
            false_negatives,
            false_positives,
            true_negatives,
            precisions,
            recalls,
            f_scores,
            overall_accuracy,
            kappa_index,
        })
    }

    /// Compute the measurements after checking the matrix against its label map
    pub fn compute_with_labels<L: ClassLabel>(
        matrix: &ConfusionMatrix,
        label_map: &LabelMap<L>,
    ) -> FusionResult<Self> {
        let (rows, cols) = matrix.dim();
        if rows != label_map.len() || cols != label_map.len() {
            return Err(FusionError::InvalidConfiguration(format!(
                "Confusion matrix is {}x{} but label map holds {} classes",
                rows,
                cols,
                label_map.len()
            )));
        }
        Self::compute(matrix)
    }

    pub fn number_of_classes(&self) -> usize {
        self.number_of_classes
    }

    pub fn number_of_samples(&self) -> u64 {
        self.number_of_samples
    }

    pub fn true_positive_values(&self) -> &Array1<f64> {
        &self.true_positives
    }

    pub fn false_negative_values(&self) -> &Array1<f64> {
        &self.false_negatives
    }

    pub fn false_positive_values(&self) -> &Array1<f64> {
        &self.false_positives
    }

    pub fn true_negative_values(&self) -> &Array1<f64> {
        &self.true_negatives
    }

    pub fn precisions(&self) -> &Array1<f64> {
        &self.precisions
    }

    pub fn recalls(&self) -> &Array1<f64> {
        &self.recalls
    }

    pub fn f_scores(&self) -> &Array1<f64> {
        &self.f_scores
    }

    pub fn overall_accuracy(&self) -> f64 {
        self.overall_accuracy
    }

    pub fn kappa_index(&self) -> f64 {
        self.kappa_index
    }

    /// Binary measurements, class index 0 being the positive class.
    ///
    /// Only defined for two-class matrices.
    pub fn binary(&self) -> Option<BinaryMeasurements> {
        if self.number_of_classes != 2 {
            return None;
        }

        let tp = self.true_positives[0];
        let fn_ = self.false_negatives[0];
        let fp = self.false_positives[0];
        let tn = self.true_negatives[0];

        let precision = tp / (tp + fp);
        let recall = tp / (tp + fn_);
        Some(BinaryMeasurements {
            true_positive: tp,
            false_negative: fn_,
            false_positive: fp,
            true_negative: tn,
            precision,
            recall,
            f_score: 2.0 * precision * recall / (precision + recall),
        })
    }
}

/// Measurements of a two-class matrix seen as a detection problem
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryMeasurements {
    pub true_positive: f64,
    pub false_negative: f64,
    pub false_positive: f64,
    pub true_negative: f64,
    pub precision: f64,
    pub recall: f64,
    pub f_score: f64,
}
