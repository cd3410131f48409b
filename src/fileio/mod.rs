//! File codecs for stimulus sets, layer activations and layer masks.
//!
//! Architecture:
//! ```text
//!  .stim.csv        .act.h5           .dmask.csv
//!      │                │                  │
//!      ▼                ▼                  ▼
//!  ┌──────────┐   ┌────────────┐   ┌──────────┐
//!  │ stimulus │   │ activation │   │   mask   │   read / write
//!  └──────────┘   └────────────┘   └──────────┘
//!      │                │                  │
//!      ▼                ▼                  ▼
//!   Stimulus        Activation           Mask       plain owned records
//! ```
//!
//! The codecs share nothing but `error` (one error type tagged with the
//! offending path) and `model` (the insertion-ordered map the records use).

pub mod activation;
pub mod error;
pub mod mask;
pub mod model;
pub mod stimulus;
