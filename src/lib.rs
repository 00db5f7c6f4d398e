//! dsfusion: Dempster-Shafer fusion of classification maps
//!
//! Several classifiers label the same scene; their confusion matrices tell how
//! much each one can be trusted for each class. This library turns those
//! matrices into masses of belief and combines the per-pixel votes with
//! Dempster's rule to produce a single classification map.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    ClassLabel, ConfusionMatrix, FusionError, FusionResult, LabelImage, LabelImageView, LabelMap,
    MaskImage,
};

pub use crate::core::{
    ConfusionMatrixCalculator, ConfusionMatrixMeasurements, ConfusionMatrixToMassOfBelief,
    DefinitionMethod, DsFusionFilter, FusionModel, FusionParams, JointMass, MajorityVotingFilter,
    MassOfBeliefTable, VotingParams,
};
pub use io::ConfusionMatrixFile;

#[cfg(feature = "python")]
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
fn to_py_err(err: FusionError) -> PyErr {
    match err {
        FusionError::ConfigurationMismatch(_)
        | FusionError::InvalidConfiguration(_)
        | FusionError::MissingInput(_) => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", err))
        }
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", err)),
    }
}

/// Python module definition
#[cfg(feature = "python")]
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(ds_fusion, m)?)?;
    m.add_function(wrap_pyfunction!(majority_voting, m)?)?;
    m.add_class::<PyMeasurements>()?;
    Ok(())
}

/// Dempster-Shafer fusion of int32 classification maps
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (maps, confusion_matrices, labels, method = "precision", no_data_label = 0, undecided_label = 0, mask = None))]
#[allow(clippy::too_many_arguments)]
fn ds_fusion<'py>(
    py: Python<'py>,
    maps: Vec<PyReadonlyArray2<'py, i32>>,
    confusion_matrices: Vec<PyReadonlyArray2<'py, u64>>,
    labels: Vec<Vec<i32>>,
    method: &str,
    no_data_label: i32,
    undecided_label: i32,
    mask: Option<PyReadonlyArray2<'py, u8>>,
) -> PyResult<&'py PyArray2<i32>> {
    let params = FusionParams {
        definition_method: method.parse().map_err(to_py_err)?,
        no_data_label,
        undecided_label,
        use_mask: mask.is_some(),
        chunk_rows: None,
    };

    let label_maps = labels
        .into_iter()
        .map(LabelMap::from_labels)
        .collect::<FusionResult<Vec<_>>>()
        .map_err(to_py_err)?;
    let matrices = confusion_matrices
        .iter()
        .map(|m| m.as_array().to_owned())
        .collect();

    let filter = DsFusionFilter::new(params)
        .with_confusion_matrices(matrices)
        .with_label_maps(label_maps);

    let views: Vec<_> = maps.iter().map(|m| m.as_array()).collect();
    let fused = filter
        .apply(&views, mask.as_ref().map(|m| m.as_array()))
        .map_err(to_py_err)?;

    Ok(fused.into_pyarray(py))
}

/// Majority voting of int32 classification maps
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (maps, no_data_label = 0, undecided_label = 0, mask = None))]
fn majority_voting<'py>(
    py: Python<'py>,
    maps: Vec<PyReadonlyArray2<'py, i32>>,
    no_data_label: i32,
    undecided_label: i32,
    mask: Option<PyReadonlyArray2<'py, u8>>,
) -> PyResult<&'py PyArray2<i32>> {
    let filter = MajorityVotingFilter::new(VotingParams {
        no_data_label,
        undecided_label,
        use_mask: mask.is_some(),
        chunk_rows: None,
    });

    let views: Vec<_> = maps.iter().map(|m| m.as_array()).collect();
    let fused = filter
        .apply(&views, mask.as_ref().map(|m| m.as_array()))
        .map_err(to_py_err)?;

    Ok(fused.into_pyarray(py))
}

/// Python wrapper for ConfusionMatrixMeasurements
#[cfg(feature = "python")]
#[pyclass(name = "ConfusionMatrixMeasurements")]
struct PyMeasurements {
    inner: ConfusionMatrixMeasurements,
}

#[cfg(feature = "python")]
#[pymethods]
impl PyMeasurements {
    #[new]
    fn new(matrix: PyReadonlyArray2<u64>) -> PyResult<Self> {
        let inner = ConfusionMatrixMeasurements::compute(&matrix.as_array().to_owned())
            .map_err(to_py_err)?;
        Ok(PyMeasurements { inner })
    }

    #[getter]
    fn overall_accuracy(&self) -> f64 {
        self.inner.overall_accuracy()
    }

    #[getter]
    fn kappa_index(&self) -> f64 {
        self.inner.kappa_index()
    }

    #[getter]
    fn precisions(&self) -> Vec<f64> {
        self.inner.precisions().to_vec()
    }

    #[getter]
    fn recalls(&self) -> Vec<f64> {
        self.inner.recalls().to_vec()
    }

    #[getter]
    fn f_scores(&self) -> Vec<f64> {
        self.inner.f_scores().to_vec()
    }

    fn __str__(&self) -> String {
        format!(
            "ConfusionMatrixMeasurements(classes={}, samples={}, oa={:.4}, kappa={:.4})",
            self.inner.number_of_classes(),
            self.inner.number_of_samples(),
            self.inner.overall_accuracy(),
            self.inner.kappa_index()
        )
    }
}
