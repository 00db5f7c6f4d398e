use ndarray::{Array2, ArrayView2};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Class label carried by a classification map.
///
/// Any totally ordered, hashable value works: integer class codes coming from
/// rasters, or strings when labels are symbolic.
pub trait ClassLabel: Clone + Eq + Hash + Ord + Debug + Send + Sync {}

impl<T> ClassLabel for T where T: Clone + Eq + Hash + Ord + Debug + Send + Sync {}

/// Confusion matrix of sample counts, indexed `[reference][produced]`
pub type ConfusionMatrix = Array2<u64>;

/// 2D classification map (rows x cols)
pub type LabelImage<L> = Array2<L>;

/// Borrowed classification map
pub type LabelImageView<'a, L> = ArrayView2<'a, L>;

/// Validity mask: non-zero pixels are processed, zero pixels are masked out
pub type MaskImage = Array2<u8>;

/// Bijection between class labels and confusion matrix row/column indices.
///
/// Both directions are kept in sync: replacing one side regenerates the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap<L: ClassLabel> {
    label_to_index: HashMap<L, usize>,
    index_to_label: Vec<L>,
}

impl<L: ClassLabel> LabelMap<L> {
    /// Build a map where the i-th label gets index i
    pub fn from_labels<I: IntoIterator<Item = L>>(labels: I) -> FusionResult<Self> {
        let index_to_label: Vec<L> = labels.into_iter().collect();
        let mut label_to_index = HashMap::with_capacity(index_to_label.len());

        for (index, label) in index_to_label.iter().enumerate() {
            if label_to_index.insert(label.clone(), index).is_some() {
                return Err(FusionError::InvalidConfiguration(format!(
                    "Label {:?} appears more than once in label map",
                    label
                )));
            }
        }

        Ok(Self {
            label_to_index,
            index_to_label,
        })
    }

    /// Build a map from the label -> index direction
    pub fn from_label_to_index(map: HashMap<L, usize>) -> FusionResult<Self> {
        let mut slots: Vec<Option<L>> = vec![None; map.len()];

        for (label, &index) in &map {
            let slot = slots.get_mut(index).ok_or_else(|| {
                FusionError::InvalidConfiguration(format!(
                    "Index {} of label {:?} is out of range 0..{}",
                    index,
                    label,
                    map.len()
                ))
            })?;

            if let Some(other) = slot {
                return Err(FusionError::InvalidConfiguration(format!(
                    "Labels {:?} and {:?} share index {}",
                    other, label, index
                )));
            }
            *slot = Some(label.clone());
        }

        let index_to_label = slots.into_iter().flatten().collect();
        Ok(Self {
            label_to_index: map,
            index_to_label,
        })
    }

    /// Build a map from the index -> label direction
    pub fn from_index_to_label(map: HashMap<usize, L>) -> FusionResult<Self> {
        let mut pairs: Vec<(usize, L)> = map.into_iter().collect();
        pairs.sort_by_key(|(index, _)| *index);

        for (expected, (index, label)) in pairs.iter().enumerate() {
            if *index != expected {
                return Err(FusionError::InvalidConfiguration(format!(
                    "Index {} of label {:?} leaves a gap in the label map",
                    index, label
                )));
            }
        }

        Self::from_labels(pairs.into_iter().map(|(_, label)| label))
    }

    /// Replace the label -> index direction; the inverse is regenerated
    pub fn set_label_to_index(&mut self, map: HashMap<L, usize>) -> FusionResult<()> {
        *self = Self::from_label_to_index(map)?;
        Ok(())
    }

    /// Replace the index -> label direction; the inverse is regenerated
    pub fn set_index_to_label(&mut self, map: HashMap<usize, L>) -> FusionResult<()> {
        *self = Self::from_index_to_label(map)?;
        Ok(())
    }

    pub fn index_of(&self, label: &L) -> Option<usize> {
        self.label_to_index.get(label).copied()
    }

    pub fn label_at(&self, index: usize) -> Option<&L> {
        self.index_to_label.get(index)
    }

    /// Labels in index order
    pub fn labels(&self) -> &[L] {
        &self.index_to_label
    }

    pub fn len(&self) -> usize {
        self.index_to_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_label.is_empty()
    }
}

impl LabelMap<usize> {
    /// Map where every index is its own label
    pub fn identity(size: usize) -> Self {
        Self {
            label_to_index: (0..size).map(|i| (i, i)).collect(),
            index_to_label: (0..size).collect(),
        }
    }
}

/// Error types for classification fusion
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;
