//! mva-estimators: estimator-style adapters for an external
//! multivariate-analysis engine.
//!
//! The engine (a boosted-decision-tree / neural-net toolkit) is never linked
//! into this process. Each `fit` or `predict` stages its dataset to a
//! columnar file inside a private working directory, launches one engine
//! subprocess, and reads the trained formula or the prediction column back.
//! The formula travels as a self-contained XML blob, so a fitted estimator
//! keeps working long after its training subprocess is gone.
//!
//! The design keeps the adapter synchronous and isolation-safe: one
//! subprocess per operation, one private workspace per operation, no shared
//! state between operations beyond the filesystem namespace.
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod process;
pub mod request;
pub mod staging;
pub mod workspace;
