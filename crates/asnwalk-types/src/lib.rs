#![forbid(unsafe_code)]
#![doc = "Common types and error codes for asnwalk: tag classes, grammar node kinds, BER errors."]

pub mod error;
pub mod node;

pub use error::*;
pub use node::*;
