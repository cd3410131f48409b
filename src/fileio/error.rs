use std::path::{Path, PathBuf};

use thiserror::Error;

use super::mask::DimKey;

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// FormatError – the file opened fine but its content is malformed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("missing required header field '{0}'")]
    MissingField(&'static str),

    #[error("unknown stimulus type '{0}', expected 'image' or 'video'")]
    UnknownStimulusType(String),

    #[error("invalid header key '{0}'")]
    HeaderKey(String),

    #[error("header value for '{0}' must fit on one line")]
    HeaderValue(String),

    #[error("no column-name row follows the header")]
    MissingTable,

    #[error("row {row} has {found} cells but the header names {expected} columns")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column '{name}' has {found} values but the table has {expected} rows")]
    ColumnLength {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column name '{0}' may not contain '='")]
    ColumnName(String),

    #[error("invalid layer name '{0}'")]
    LayerName(String),

    #[error("layer '{0}' has no raw_shape")]
    MissingRawShape(String),

    #[error("layer '{layer}': raw_shape holds negative dimension {value}")]
    NegativeDim { layer: String, value: i64 },

    #[error("layer '{layer}': raw_shape {raw_shape:?} describes {expected} elements but data holds {found}")]
    ShapeMismatch {
        layer: String,
        raw_shape: Vec<usize>,
        expected: usize,
        found: usize,
    },

    #[error("layer '{layer}': unknown dimension key '{key}', expected chn, row or col")]
    UnknownDimension { layer: String, key: String },

    #[error("layer '{layer}': '{value}' is not a valid index")]
    BadIndex { layer: String, value: String },

    #[error("layer '{layer}': indices are 1-based, found 0 in '{dim}'")]
    ZeroIndex { layer: String, dim: DimKey },

    #[error("layer '{layer}': '{dim}' is listed more than once")]
    DuplicateDimension { layer: String, dim: DimKey },

    #[error("layer '{layer}': empty index list for '{dim}'")]
    EmptyIndexList { layer: String, dim: DimKey },

    #[error("layer '{0}' selects no dimension")]
    EmptyLayer(String),
}

// ---------------------------------------------------------------------------
// Error – everything a read or write can fail with, tagged by path
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", .path.display())]
    Format { path: PathBuf, source: FormatError },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },

    /// Raised by the HDF5 library: unreadable or damaged containers, failed
    /// dataset creation, missing files on open.
    #[error("{}: hdf5: {source}", .path.display())]
    Hdf5 { path: PathBuf, source: hdf5::Error },
}

impl Error {
    pub(crate) fn format(path: &Path, source: FormatError) -> Self {
        Error::Format {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Error::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn hdf5(path: &Path, source: hdf5::Error) -> Self {
        Error::Hdf5 {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The content problem behind this error, if it is a format error.
    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            Error::Format { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the error came from opening or decoding the file itself
    /// rather than from its content. A container the HDF5 library cannot
    /// parse counts as I/O.
    pub fn is_io(&self) -> bool {
        match self {
            Error::Io { .. } | Error::Hdf5 { .. } => true,
            Error::Csv { source, .. } => source.is_io_error(),
            _ => false,
        }
    }
}
