//! Usage dataset schema
//!
//! This module defines the single column order shared by the training pipeline
//! and the inference adapter, and the usage record both of them consume.

mod features;
mod record;

pub use features::*;
pub use record::*;
