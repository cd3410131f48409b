//! Readers and writers for the dnnbrain file formats.
//!
//! * [`StimulusFile`]: `.stim.csv`, a `key=value` header followed by a
//!   table with one row per stimulus.
//! * [`ActivationFile`]: `.act.h5`, per-layer activation arrays with
//!   their raw (pre-flattening) shapes.
//! * [`MaskFile`]: `.dmask.csv`, per-layer channel/row/column selections.
//!
//! Every codec is constructed from a path and opens the file only for the
//! duration of a `read` or `write` call.

pub mod fileio;

pub use fileio::activation::{Activation, ActivationFile, LayerActivation};
pub use fileio::error::{Error, FormatError, Result};
pub use fileio::mask::{DimKey, LayerMask, Mask, MaskFile};
pub use fileio::model::OrderedMap;
pub use fileio::stimulus::{
    Column, Stimulus, StimulusFile, StimulusTable, StimulusType, STIM_ID,
};
