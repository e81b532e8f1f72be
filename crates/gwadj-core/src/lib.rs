//! Forward-state capture and finite-difference validation for MODFLOW 6
//! adjoint sensitivities.
//!
//! Parsing: index, manifest, spec_file, measure
//! Running: solver, driver, storage, store, capture
//! Checking: harness, adjoint

pub mod adjoint;
pub mod capture;
pub mod driver;
pub mod harness;
pub mod index;
pub mod manifest;
pub mod measure;
pub mod solver;
pub mod spec_file;
pub mod storage;
pub mod store;
