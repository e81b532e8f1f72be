// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — External Flow Solver Interface
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! The narrow step/query/mutate API the driver needs from a flow solver.
//!
//! The solver owns every simulation array. Callers get owned copies through
//! [`FlowSolver::get_value`] and change solver state only through targeted
//! [`FlowSolver::write`] calls; no aliasing view is ever handed out.

use std::fmt;
use std::path::Path;

use gwadj_types::error::{AdjError, AdjResult};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};
use tracing::debug;

/// Address of a named solver variable: `COMPONENT[/SUBCOMPONENT]/NAME`, upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarAddress(String);

impl VarAddress {
    pub fn new(name: &str, component: &str, subcomponent: Option<&str>) -> Self {
        let addr = match subcomponent {
            Some(sub) => format!("{}/{}/{}", component, sub, name),
            None => format!("{}/{}", component, name),
        };
        VarAddress(addr.to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VarAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owned copy of a solver variable.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverValue {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
}

impl SolverValue {
    pub fn len(&self) -> usize {
        match self {
            SolverValue::Float(a) => a.len(),
            SolverValue::Int(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened float copy; integers are widened.
    pub fn to_f64_1d(&self) -> Array1<f64> {
        match self {
            SolverValue::Float(a) => a.iter().copied().collect(),
            SolverValue::Int(a) => a.iter().map(|&v| v as f64).collect(),
        }
    }

    pub fn into_f64_1d(self, addr: &VarAddress) -> AdjResult<Array1<f64>> {
        match self {
            SolverValue::Float(a) => a.into_dimensionality::<Ix1>().map_err(|e| {
                AdjError::Solver(format!("{addr} is not one-dimensional: {e}"))
            }),
            SolverValue::Int(_) => Err(AdjError::Solver(format!(
                "{addr} holds integers, expected floats"
            ))),
        }
    }

    pub fn into_f64_2d(self, addr: &VarAddress) -> AdjResult<Array2<f64>> {
        match self {
            SolverValue::Float(a) => a.into_dimensionality::<Ix2>().map_err(|e| {
                AdjError::Solver(format!("{addr} is not two-dimensional: {e}"))
            }),
            SolverValue::Int(_) => Err(AdjError::Solver(format!(
                "{addr} holds integers, expected floats"
            ))),
        }
    }

    pub fn into_i64_1d(self, addr: &VarAddress) -> AdjResult<Array1<i64>> {
        match self {
            SolverValue::Int(a) => a.into_dimensionality::<Ix1>().map_err(|e| {
                AdjError::Solver(format!("{addr} is not one-dimensional: {e}"))
            }),
            SolverValue::Float(_) => Err(AdjError::Solver(format!(
                "{addr} holds floats, expected integers"
            ))),
        }
    }

    /// First element as a float scalar.
    pub fn scalar_f64(&self, addr: &VarAddress) -> AdjResult<f64> {
        let first = match self {
            SolverValue::Float(a) => a.iter().next().copied(),
            SolverValue::Int(a) => a.iter().next().map(|&v| v as f64),
        };
        first.ok_or_else(|| AdjError::Solver(format!("{addr} is empty")))
    }

    /// First element as an integer scalar.
    pub fn scalar_i64(&self, addr: &VarAddress) -> AdjResult<i64> {
        match self {
            SolverValue::Int(a) => a.iter().next().copied(),
            SolverValue::Float(a) => a.iter().next().map(|&v| v as i64),
        }
        .ok_or_else(|| AdjError::Solver(format!("{addr} is empty")))
    }
}

/// Step-wise control of an external nonlinear flow solver.
pub trait FlowSolver {
    fn initialize(&mut self) -> AdjResult<()>;
    fn finalize(&mut self) -> AdjResult<()>;

    fn current_time(&self) -> AdjResult<f64>;
    fn end_time(&self) -> AdjResult<f64>;
    fn time_step_length(&self) -> AdjResult<f64>;

    fn prepare_time_step(&mut self, dt: f64) -> AdjResult<()>;
    fn prepare_solve(&mut self, component: usize) -> AdjResult<()>;
    /// One nonlinear iteration; `true` once converged.
    fn solve(&mut self, component: usize) -> AdjResult<bool>;
    fn finalize_solve(&mut self, component: usize) -> AdjResult<()>;
    fn finalize_time_step(&mut self) -> AdjResult<()>;

    /// Resolves a variable name; fails if the solver has no such variable.
    fn address(
        &self,
        name: &str,
        component: &str,
        subcomponent: Option<&str>,
    ) -> AdjResult<VarAddress>;

    /// `true` if the variable exists.
    fn has_variable(&self, name: &str, component: &str, subcomponent: Option<&str>) -> bool {
        self.address(name, component, subcomponent).is_ok()
    }

    fn get_value(&self, addr: &VarAddress) -> AdjResult<SolverValue>;

    /// Overwrites one element (row-major flat index) in the solver's own state.
    fn write(&mut self, addr: &VarAddress, index: usize, value: f64) -> AdjResult<()>;
}

/// Opens fresh, uninitialised solvers rooted at a simulation directory.
pub trait SessionFactory {
    type Solver: FlowSolver;

    fn create(&self, sim_ws: &Path) -> AdjResult<Self::Solver>;

    /// Creates and initialises a solver.
    fn open(&self, sim_ws: &Path) -> AdjResult<Session<Self::Solver>> {
        Session::open(self.create(sim_ws)?)
    }
}

impl<F: SessionFactory + ?Sized> SessionFactory for &F {
    type Solver = F::Solver;

    fn create(&self, sim_ws: &Path) -> AdjResult<Self::Solver> {
        (**self).create(sim_ws)
    }
}

/// An initialised solver with an explicit close.
///
/// Dropping an open session finalises it on a best-effort basis.
pub struct Session<S: FlowSolver> {
    solver: S,
    open: bool,
}

impl<S: FlowSolver> Session<S> {
    pub fn open(mut solver: S) -> AdjResult<Self> {
        solver.initialize()?;
        Ok(Session { solver, open: true })
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn close(mut self) -> AdjResult<()> {
        self.open = false;
        self.solver.finalize()
    }
}

impl<S: FlowSolver> Drop for Session<S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.solver.finalize() {
                debug!("ignoring finalize failure on session drop: {e}");
            }
        }
    }
}

/// Reads a float array by name.
pub fn get_f64<S: FlowSolver + ?Sized>(
    solver: &S,
    name: &str,
    component: &str,
    subcomponent: Option<&str>,
) -> AdjResult<Array1<f64>> {
    let addr = solver.address(name, component, subcomponent)?;
    Ok(solver.get_value(&addr)?.to_f64_1d())
}

/// Reads an integer array by name.
pub fn get_i64<S: FlowSolver + ?Sized>(
    solver: &S,
    name: &str,
    component: &str,
    subcomponent: Option<&str>,
) -> AdjResult<Array1<i64>> {
    let addr = solver.address(name, component, subcomponent)?;
    Ok(match solver.get_value(&addr)? {
        SolverValue::Int(a) => a.iter().copied().collect(),
        SolverValue::Float(a) => a.iter().map(|&v| v as i64).collect(),
    })
}

/// Reads the first element of an integer variable.
pub fn get_scalar_i64<S: FlowSolver + ?Sized>(
    solver: &S,
    name: &str,
    component: &str,
    subcomponent: Option<&str>,
) -> AdjResult<i64> {
    let addr = solver.address(name, component, subcomponent)?;
    solver.get_value(&addr)?.scalar_i64(&addr)
}
