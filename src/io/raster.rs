use crate::types::{FusionError, FusionResult, LabelImage, MaskImage};
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use num_traits::Zero;
use std::path::Path;

/// GDAL-backed reader/writer for classification maps and masks
pub struct LabelRaster;

impl LabelRaster {
    /// Read the first band of a raster as labels
    pub fn read_labels<T, P>(path: P) -> FusionResult<LabelImage<T>>
    where
        T: GdalType + Copy,
        P: AsRef<Path>,
    {
        log::info!("Reading classification map: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        log::debug!("Raster size: {}x{}", width, height);

        let rasterband = dataset.rasterband(1)?;
        let band_data = rasterband.read_as::<T>((0, 0), (width, height), (width, height), None)?;

        Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| FusionError::InvalidFormat(format!("Failed to reshape raster data: {}", e)))
    }

    /// Read the first band of a raster as a validity mask (non-zero = valid)
    pub fn read_mask<P: AsRef<Path>>(path: P) -> FusionResult<MaskImage> {
        let values = Self::read_labels::<f64, _>(path)?;
        Ok(values.mapv(|v| if v.is_zero() || v.is_nan() { 0u8 } else { 1u8 }))
    }

    /// Write labels as a single-band GeoTIFF, copying the georeferencing of
    /// `reference` when given
    pub fn write_labels<T, P, R>(
        image: &LabelImage<T>,
        output_path: P,
        reference: Option<R>,
        no_data: Option<T>,
    ) -> FusionResult<()>
    where
        T: GdalType + Copy + Into<f64>,
        P: AsRef<Path>,
        R: AsRef<Path>,
    {
        log::info!("Writing fused classification map: {}", output_path.as_ref().display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = image.dim();

        let mut dataset = driver.create_with_band_type::<T, _>(
            output_path.as_ref(),
            width as isize,
            height as isize,
            1,
        )?;

        if let Some(reference) = reference {
            let source = Dataset::open(reference.as_ref())?;
            if source.raster_size() != (width, height) {
                return Err(FusionError::ConfigurationMismatch(format!(
                    "Reference raster is {:?} but fused map is {}x{}",
                    source.raster_size(),
                    width,
                    height
                )));
            }
            dataset.set_geo_transform(&source.geo_transform()?)?;
            dataset.set_projection(&source.projection())?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<T> = image.iter().copied().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;

        if let Some(no_data) = no_data {
            rasterband.set_no_data_value(Some(no_data.into()))?;
        }

        Ok(())
    }
}
