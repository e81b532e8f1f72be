// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Storage Derivatives
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Cell-wise storage terms harvested with every time step.
//!
//! Both auxiliaries are consumed by the adjoint solve: `dresdss_h` is the
//! partial of the flow residual with respect to specific storage (already
//! multiplied through by head), `drhsdh` the storage part of dRHS/dh.

use gwadj_types::error::{AdjError, AdjResult};
use ndarray::{Array1, Zip};

/// Static cell geometry from the discretization package.
#[derive(Debug, Clone)]
pub struct CellGeometry {
    pub top: Array1<f64>,
    pub bot: Array1<f64>,
    pub area: Array1<f64>,
}

impl CellGeometry {
    pub fn new(top: Array1<f64>, bot: Array1<f64>, area: Array1<f64>) -> AdjResult<Self> {
        if top.len() != bot.len() || top.len() != area.len() {
            return Err(AdjError::Solver(format!(
                "cell geometry lengths disagree: top={}, bot={}, area={}",
                top.len(),
                bot.len(),
                area.len()
            )));
        }
        Ok(CellGeometry { top, bot, area })
    }

    pub fn len(&self) -> usize {
        self.top.len()
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty()
    }
}

/// Head and saturation at the end of the current and the previous step.
#[derive(Debug, Clone, Copy)]
pub struct StepState<'a> {
    pub head: &'a Array1<f64>,
    pub head_old: &'a Array1<f64>,
    pub sat: &'a Array1<f64>,
    pub sat_old: &'a Array1<f64>,
}

fn check_len(what: &str, got: usize, expected: usize) -> AdjResult<()> {
    if got != expected {
        return Err(AdjError::Solver(format!(
            "{what} has {got} entries, expected {expected}"
        )));
    }
    Ok(())
}

/// d(residual)/d(Ss) times head.
///
/// Saturation is taken as 1 in non-convertible cells (`iconvert == 0`).
/// Cells dry in either step (`head <= bot`) contribute zero.
pub fn dresdss_h(
    geom: &CellGeometry,
    iconvert: &Array1<i64>,
    state: StepState<'_>,
    dt: f64,
) -> AdjResult<Array1<f64>> {
    let n = geom.len();
    check_len("ICONVERT", iconvert.len(), n)?;
    check_len("head", state.head.len(), n)?;
    check_len("head_old", state.head_old.len(), n)?;
    check_len("SAT", state.sat.len(), n)?;
    check_len("sat_old", state.sat_old.len(), n)?;
    if dt <= 0.0 {
        return Err(AdjError::Solver(format!("non-positive step length {dt}")));
    }

    let mut result = Array1::zeros(n);
    for c in 0..n {
        let (top, bot, area) = (geom.top[c], geom.bot[c], geom.area[c]);
        let (h, h_old) = (state.head[c], state.head_old[c]);
        if h <= bot || h_old <= bot {
            continue;
        }
        let (s, s_old) = if iconvert[c] == 0 {
            (1.0, 1.0)
        } else {
            (state.sat[c], state.sat_old[c])
        };
        let height = top - bot;
        let sc1 = area * height;
        result[c] = sc1 / dt * (s_old * h_old - s * h)
            + sc1 / dt * bot * (s - s_old)
            + sc1 / (2.0 * dt) * height * (s * s - s_old * s_old);
    }
    Ok(result)
}

/// Storage contribution to dRHS/dh: `-Ss * area * (top - bot) / dt`.
pub fn drhsdh(geom: &CellGeometry, ss: &Array1<f64>, dt: f64) -> AdjResult<Array1<f64>> {
    check_len("SS", ss.len(), geom.len())?;
    if dt <= 0.0 {
        return Err(AdjError::Solver(format!("non-positive step length {dt}")));
    }
    Ok(Zip::from(ss)
        .and(&geom.area)
        .and(&geom.top)
        .and(&geom.bot)
        .map_collect(|&ss, &area, &top, &bot| -ss * area * (top - bot) / dt))
}
