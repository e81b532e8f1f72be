//! Synthetic groundwater-flow model for exercising the adjoint tooling
//! without an external MODFLOW 6 library.

pub mod flow;
pub mod linear;
pub mod model;

pub use flow::{SyntheticFactory, SyntheticSolver};
pub use model::{ModelDef, PackageDef};
