//! # Tessera Core
//!
//! Argument validation for the constructors of a tensor-transform pipeline:
//! vision ops, text ops, and the ways a vocabulary can be built.
//!
//! Validation is an explicit precondition step. A constructor binds its raw
//! arguments, asks the matching [`Operation`] to check them, and proceeds with
//! the returned (possibly normalized) arguments.
//!
//! ## Quick Start
//!
//! ```rust
//! use tessera_core::{ArgValue, ErrorKind, Operation};
//!
//! let args = Operation::Ngram.check(vec![ArgValue::from(3)], vec![]).unwrap();
//! assert_eq!(args.get("n"), &ArgValue::list([3]));
//!
//! let err = Operation::FromList
//!     .check(vec![ArgValue::from(vec!["a", "b", "a"])], vec![])
//!     .unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Value);
//! assert_eq!(err.to_string(), "word_list contains duplicate word: a.");
//! ```
pub mod error;
pub mod helpers;
pub mod ops;
pub mod signature;
pub mod text;
pub mod value;
pub mod vision;

// Re-export primary API
pub use error::{ErrorKind, Result, ValidationError};
pub use ops::Operation;
pub use signature::{BoundArgs, Param, Signature};
pub use value::{ArgType, ArgValue, Border, DataType, Inter, OpBackend};
