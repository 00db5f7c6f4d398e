//! I/O modules for confusion matrices and classification maps

pub mod confusion_matrix_csv;
#[cfg(feature = "gdal")]
pub mod raster;

pub use confusion_matrix_csv::ConfusionMatrixFile;
#[cfg(feature = "gdal")]
pub use raster::LabelRaster;
