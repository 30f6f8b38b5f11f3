//! Experiment runner for the causal simulation lab.
//!
//! Thin orchestration over `yinguo-algo`: a named configuration
//! registry, checkpoint storage keyed by content-hashed run ids, and
//! the two experiment pipelines (BMC ensembling and IPWO overlap
//! reweighting) exposed both as a library and as the `run-bmc` /
//! `run-overlap` binaries.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
