use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::{Error, FormatError, Result};
use super::model::OrderedMap;

/// Separator between indices inside the `index` cell.
const INDEX_SEP: &str = ";";

// ---------------------------------------------------------------------------
// DimKey – which axis of an activation a mask restricts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimKey {
    Chn,
    Row,
    Col,
}

impl DimKey {
    pub const ALL: [DimKey; 3] = [DimKey::Chn, DimKey::Row, DimKey::Col];

    pub fn as_str(self) -> &'static str {
        match self {
            DimKey::Chn => "chn",
            DimKey::Row => "row",
            DimKey::Col => "col",
        }
    }
}

impl fmt::Display for DimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DimKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DimKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

// ---------------------------------------------------------------------------
// LayerMask / Mask
// ---------------------------------------------------------------------------

/// Selected 1-based indices per dimension for one layer.
///
/// A dimension with no entry is unrestricted: every index along it is kept.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerMask {
    dims: Vec<(DimKey, Vec<usize>)>,
}

impl LayerMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the indices for `key`, returning the previous list if there was one.
    pub fn insert(&mut self, key: DimKey, indices: Vec<usize>) -> Option<Vec<usize>> {
        match self.dims.iter().position(|(k, _)| *k == key) {
            Some(i) => Some(std::mem::replace(&mut self.dims[i].1, indices)),
            None => {
                self.dims.push((key, indices));
                None
            }
        }
    }

    pub fn with(mut self, key: DimKey, indices: Vec<usize>) -> Self {
        self.insert(key, indices);
        self
    }

    /// Indices for `key`, or `None` when the dimension is unrestricted.
    pub fn get(&self, key: DimKey) -> Option<&[usize]> {
        self.dims
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = DimKey> + '_ {
        self.dims.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DimKey, &[usize])> {
        self.dims.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }
}

/// Layer name -> selected indices, in insertion order.
pub type Mask = OrderedMap<LayerMask>;

// ---------------------------------------------------------------------------
// MaskFile – the `.dmask.csv` codec
// ---------------------------------------------------------------------------

/// One line of a `.dmask.csv` table.
#[derive(Debug, Serialize, Deserialize)]
struct MaskRow {
    layer: String,
    dim: String,
    index: String,
}

/// Reader/writer for `.dmask.csv` files.
///
/// ```text
/// layer,dim,index
/// conv5,chn,1;2;3
/// conv5,row,4;5
/// fc3,chn,1;2;3
/// ```
#[derive(Debug, Clone)]
pub struct MaskFile {
    path: PathBuf,
}

impl MaskFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Mask> {
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(BufReader::new(file));

        let mut mask = Mask::new();
        for row in reader.deserialize::<MaskRow>() {
            let row = row.map_err(|e| Error::csv(&self.path, e))?;
            let (dim, indices) = parse_row(&row).map_err(|e| Error::format(&self.path, e))?;
            let layer = mask.get_or_insert_default(&row.layer);
            if layer.insert(dim, indices).is_some() {
                return Err(Error::format(
                    &self.path,
                    FormatError::DuplicateDimension {
                        layer: row.layer,
                        dim,
                    },
                ));
            }
        }

        debug!("read mask of {} layers from {}", mask.len(), self.path.display());
        Ok(mask)
    }

    pub fn write(&self, mask: &Mask) -> Result<()> {
        for (layer, dims) in mask.iter() {
            check_layer(layer, dims).map_err(|e| Error::format(&self.path, e))?;
        }

        let file = File::create(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        for (layer, dims) in mask.iter() {
            for (dim, indices) in dims.iter() {
                let row = MaskRow {
                    layer: layer.to_string(),
                    dim: dim.to_string(),
                    index: join_indices(indices),
                };
                writer
                    .serialize(&row)
                    .map_err(|e| Error::csv(&self.path, e))?;
            }
        }
        writer.flush().map_err(|e| Error::io(&self.path, e))?;

        debug!("wrote mask of {} layers to {}", mask.len(), self.path.display());
        Ok(())
    }
}

fn parse_row(row: &MaskRow) -> std::result::Result<(DimKey, Vec<usize>), FormatError> {
    // Layer names are kept verbatim; keys and index tokens are trimmed.
    let dim = row
        .dim
        .trim()
        .parse::<DimKey>()
        .map_err(|key| FormatError::UnknownDimension {
            layer: row.layer.clone(),
            key,
        })?;
    if row.layer.is_empty() {
        return Err(FormatError::LayerName(row.layer.clone()));
    }
    if row.index.trim().is_empty() {
        return Err(FormatError::EmptyIndexList {
            layer: row.layer.clone(),
            dim,
        });
    }

    let indices = row
        .index
        .split(INDEX_SEP)
        .map(|tok| {
            let tok = tok.trim();
            match tok.parse::<usize>() {
                Ok(0) => Err(FormatError::ZeroIndex {
                    layer: row.layer.clone(),
                    dim,
                }),
                Ok(i) => Ok(i),
                Err(_) => Err(FormatError::BadIndex {
                    layer: row.layer.clone(),
                    value: tok.to_string(),
                }),
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((dim, indices))
}

fn check_layer(layer: &str, dims: &LayerMask) -> std::result::Result<(), FormatError> {
    if layer.is_empty() {
        return Err(FormatError::LayerName(layer.to_string()));
    }
    if dims.is_empty() {
        return Err(FormatError::EmptyLayer(layer.to_string()));
    }
    for (dim, indices) in dims.iter() {
        if indices.is_empty() {
            return Err(FormatError::EmptyIndexList {
                layer: layer.to_string(),
                dim,
            });
        }
        if indices.contains(&0) {
            return Err(FormatError::ZeroIndex {
                layer: layer.to_string(),
                dim,
            });
        }
    }
    Ok(())
}

fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(INDEX_SEP)
}
