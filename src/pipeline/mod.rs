//! Eyes-stage building blocks: rasterise → preprocess → infer → sanitise.
//!
//! The orchestration that wires these together lives in [`crate::extract`].

pub mod capture;
pub mod engine;
pub mod preprocess;
pub mod rasterize;
pub mod sanitize;
