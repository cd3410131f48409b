use std::path::{Path, PathBuf};

use log::{debug, warn};
use ndarray::{Array, ArrayD, Dimension, IxDyn};

use super::error::{Error, FormatError, Result};
use super::model::OrderedMap;

/// Integer attribute on each layer dataset holding the pre-flattening shape.
pub const RAW_SHAPE: &str = "raw_shape";

// ---------------------------------------------------------------------------
// LayerActivation / Activation
// ---------------------------------------------------------------------------

/// Activation values of one layer plus the shape they had before flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerActivation {
    pub data: ArrayD<f64>,
    pub raw_shape: Vec<usize>,
}

impl LayerActivation {
    pub fn new<D: Dimension>(data: Array<f64, D>, raw_shape: Vec<usize>) -> Self {
        Self {
            data: data.into_dyn(),
            raw_shape,
        }
    }

    /// Wrap an array whose current shape is its raw shape.
    pub fn from_array<D: Dimension>(data: Array<f64, D>) -> Self {
        let raw_shape = data.shape().to_vec();
        Self::new(data, raw_shape)
    }

    /// Element count described by `raw_shape`.
    pub fn raw_len(&self) -> usize {
        self.raw_shape.iter().product()
    }

    fn check(&self, layer: &str) -> std::result::Result<(), FormatError> {
        if self.raw_len() != self.data.len() {
            return Err(FormatError::ShapeMismatch {
                layer: layer.to_string(),
                raw_shape: self.raw_shape.clone(),
                expected: self.raw_len(),
                found: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Layer name -> activation, in insertion order.
pub type Activation = OrderedMap<LayerActivation>;

// ---------------------------------------------------------------------------
// ActivationFile – the `.act.h5` codec
// ---------------------------------------------------------------------------

/// Reader/writer for HDF5 activation containers.
///
/// Each layer is one top-level dataset named after the layer, carrying an
/// integer attribute `raw_shape`. This is the layout h5py produces with
/// `f.create_dataset(layer, data=a); f[layer].attrs['raw_shape'] = shape`.
///
/// HDF5 lists links by name, so layers read back in lexicographic order
/// regardless of the order they were written in.
#[derive(Debug, Clone)]
pub struct ActivationFile {
    path: PathBuf,
}

impl ActivationFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Activation> {
        let h5_err = |e| Error::hdf5(&self.path, e);
        let fmt_err = |e| Error::format(&self.path, e);

        if !self.path.exists() {
            return Err(Error::io(
                &self.path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        let file = hdf5::File::open(&self.path).map_err(h5_err)?;

        let mut act = Activation::new();
        for layer in file.member_names().map_err(h5_err)? {
            let ds = match file.dataset(&layer) {
                Ok(ds) => ds,
                Err(_) if file.group(&layer).is_ok() => {
                    warn!(
                        "{}: skipping group '{layer}', layers are datasets",
                        self.path.display()
                    );
                    continue;
                }
                Err(e) => return Err(h5_err(e)),
            };

            if !ds.attr_names().map_err(h5_err)?.iter().any(|a| a == RAW_SHAPE) {
                return Err(fmt_err(FormatError::MissingRawShape(layer)));
            }
            let raw_shape = ds
                .attr(RAW_SHAPE)
                .and_then(|a| a.read_raw::<i64>())
                .map_err(h5_err)?
                .into_iter()
                .map(|d| {
                    usize::try_from(d).map_err(|_| FormatError::NegativeDim {
                        layer: layer.clone(),
                        value: d,
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(fmt_err)?;

            if ds.dtype().map_err(h5_err)?.is::<f32>() {
                warn!(
                    "{}: layer '{layer}' stored as float32, widening to float64",
                    self.path.display()
                );
            }
            let shape = ds.shape();
            let values = ds.read_raw::<f64>().map_err(h5_err)?;
            let found = values.len();
            let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| {
                fmt_err(FormatError::ShapeMismatch {
                    layer: layer.clone(),
                    raw_shape: shape.clone(),
                    expected: shape.iter().product(),
                    found,
                })
            })?;

            let entry = LayerActivation { data, raw_shape };
            entry.check(&layer).map_err(fmt_err)?;
            act.insert(layer, entry);
        }

        debug!("read {} layers from {}", act.len(), self.path.display());
        Ok(act)
    }

    /// Create or truncate the container and write every layer as `float64`.
    pub fn write(&self, act: &Activation) -> Result<()> {
        let h5_err = |e| Error::hdf5(&self.path, e);
        let fmt_err = |e| Error::format(&self.path, e);

        for (layer, entry) in act.iter() {
            if layer.is_empty() || layer.contains('/') || layer == "." {
                return Err(fmt_err(FormatError::LayerName(layer.to_string())));
            }
            entry.check(layer).map_err(fmt_err)?;
        }

        let file = hdf5::File::create(&self.path).map_err(h5_err)?;
        for (layer, entry) in act.iter() {
            // Logical (row-major) order, whatever the array's memory layout.
            let flat: Vec<f64> = entry.data.iter().copied().collect();
            let ds = file
                .new_dataset::<f64>()
                .shape(entry.data.shape().to_vec())
                .create(layer)
                .map_err(h5_err)?;
            ds.write_raw(flat.as_slice()).map_err(h5_err)?;

            let raw_shape: Vec<i64> = entry.raw_shape.iter().map(|&d| d as i64).collect();
            ds.new_attr::<i64>()
                .shape(raw_shape.len())
                .create(RAW_SHAPE)
                .and_then(|a| a.write_raw(raw_shape.as_slice()))
                .map_err(h5_err)?;
        }
        file.flush().map_err(h5_err)?;

        debug!("wrote {} layers to {}", act.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn from_array_takes_current_shape() {
        let entry = LayerActivation::from_array(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(entry.raw_shape, vec![2, 3]);
        assert!(entry.check("conv4").is_ok());
    }

    #[test]
    fn flattened_data_keeps_raw_shape() {
        let entry = LayerActivation::new(array![1.0, 2.0, 3.0, 4.0], vec![1, 2, 2]);
        assert_eq!(entry.raw_len(), 4);
        assert!(entry.check("conv5").is_ok());
    }

    #[test]
    fn mismatched_raw_shape_is_rejected() {
        let entry = LayerActivation::new(array![1.0, 2.0, 3.0], vec![2, 2]);
        assert_eq!(
            entry.check("fc3"),
            Err(FormatError::ShapeMismatch {
                layer: "fc3".into(),
                raw_shape: vec![2, 2],
                expected: 4,
                found: 3,
            })
        );
    }
}
