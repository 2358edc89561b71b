//! # Tessera
//!
//! Umbrella crate re-exporting the argument validators ([`core`]) and the
//! NER fine-tuning driver ([`ner`]).

pub use tessera_core as core;
pub use tessera_ner as ner;

pub use tessera_core::{ArgValue, ErrorKind, Operation, ValidationError};
