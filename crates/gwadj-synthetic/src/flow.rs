// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Synthetic Flow Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Block-centred, confined finite-volume flow on a structured grid.
//!
//! Assembles `A h = b` in the MODFLOW 6 sign convention (off-diagonal
//! conductances positive, boundary `hcof` on the diagonal, boundary `rhs`
//! added to `b`) and exposes its state through named variables:
//!
//! | Address                        | Kind  | Writable |
//! |--------------------------------|-------|----------|
//! | `TDIS/KPER`, `TDIS/KSTP`       | int   | no       |
//! | `SLN_1/MXITER`, `SLN_1/AMAT`   | mixed | no       |
//! | `<M>/X`, `XOLD`, `ISS`, `INEWTON` | mixed | no    |
//! | `<M>/DIS/*`, `<M>/CON/*`       | mixed | no       |
//! | `<M>/NPF/K11`, `K33`           | float | yes      |
//! | `<M>/NPF/KCHANGEPER`, `KCHANGESTP`, `NODEKCHANGE` | int | yes |
//! | `<M>/STO/SS`, `ICONVERT`       | mixed | no       |
//! | `<M>/<TAG>/BOUND`              | float | yes      |

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

use gwadj_core::manifest::PackageRegistry;
use gwadj_core::solver::{FlowSolver, SessionFactory, SolverValue, VarAddress};
use gwadj_types::constants::{bound_field_names, TDIS_COMPONENT};
use gwadj_types::error::{AdjError, AdjResult};
use ndarray::{Array1, Array2, ArrayView1};
use tracing::debug;

use crate::linear::solve_dense;
use crate::model::ModelDef;

const SOLUTION: &str = "SLN_1";

fn float(values: Vec<f64>) -> SolverValue {
    SolverValue::Float(Array1::from(values).into_dyn())
}

fn int(values: Vec<i64>) -> SolverValue {
    SolverValue::Int(Array1::from(values).into_dyn())
}

#[derive(Debug, Clone)]
struct Connection {
    n: usize,
    m: usize,
    /// 0 vertical, 1 horizontal.
    ihc: i64,
    cl1: f64,
    cl2: f64,
    hwva: f64,
}

/// Static discretization in reduced numbering.
#[derive(Debug, Clone)]
struct Grid {
    nodes: usize,
    nodeuser: Vec<usize>,
    nodereduced: Vec<Option<usize>>,
    top: Vec<f64>,
    bot: Vec<f64>,
    area: Vec<f64>,
    /// One-based CSR row pointers, diagonal first in each row.
    ia: Vec<i64>,
    ja: Vec<i64>,
    /// One-based symmetric connection index per `ja` entry, 0 on the diagonal.
    jas: Vec<i64>,
    conns: Vec<Connection>,
}

impl Grid {
    fn build(def: &ModelDef) -> Self {
        let (nlay, nrow, ncol) = (def.nlay, def.nrow, def.ncol);
        let nodes_user = def.nodes_user();
        let mut nodeuser = Vec::new();
        let mut nodereduced = vec![None; nodes_user];
        for (u, slot) in nodereduced.iter_mut().enumerate() {
            if def.is_active(u) {
                *slot = Some(nodeuser.len());
                nodeuser.push(u);
            }
        }
        let nodes = nodeuser.len();

        let layer_top = |k: usize| if k == 0 { def.top } else { def.botm[k - 1] };
        let mut top = Vec::with_capacity(nodes);
        let mut bot = Vec::with_capacity(nodes);
        for &u in &nodeuser {
            let k = u / (nrow * ncol);
            top.push(layer_top(k));
            bot.push(def.botm[k]);
        }
        let area = vec![def.delr * def.delc; nodes];

        let mut conns = Vec::new();
        let mut index: HashMap<(usize, usize), usize> = HashMap::new();
        let mut ia = vec![1i64];
        let mut ja = Vec::new();
        let mut jas = Vec::new();
        for (n, &u) in nodeuser.iter().enumerate() {
            let k = u / (nrow * ncol);
            let i = (u / ncol) % nrow;
            let j = u % ncol;
            // Neighbours in increasing user (and therefore reduced) order.
            let mut neighbours: Vec<(usize, i64)> = Vec::with_capacity(6);
            if k > 0 {
                neighbours.push((u - nrow * ncol, 0));
            }
            if i > 0 {
                neighbours.push((u - ncol, 1));
            }
            if j > 0 {
                neighbours.push((u - 1, 2));
            }
            if j + 1 < ncol {
                neighbours.push((u + 1, 2));
            }
            if i + 1 < nrow {
                neighbours.push((u + ncol, 1));
            }
            if k + 1 < nlay {
                neighbours.push((u + nrow * ncol, 0));
            }

            ja.push(n as i64 + 1);
            jas.push(0);
            for (v, dir) in neighbours {
                let Some(m) = nodereduced[v] else {
                    continue;
                };
                let pair = (n.min(m), n.max(m));
                let isym = match index.get(&pair) {
                    Some(&isym) => isym,
                    None => {
                        let conn = match dir {
                            0 => Connection {
                                n: pair.0,
                                m: pair.1,
                                ihc: 0,
                                cl1: 0.5 * (top[pair.0] - bot[pair.0]),
                                cl2: 0.5 * (top[pair.1] - bot[pair.1]),
                                hwva: def.delr * def.delc,
                            },
                            1 => Connection {
                                n: pair.0,
                                m: pair.1,
                                ihc: 1,
                                cl1: 0.5 * def.delc,
                                cl2: 0.5 * def.delc,
                                hwva: def.delr,
                            },
                            _ => Connection {
                                n: pair.0,
                                m: pair.1,
                                ihc: 1,
                                cl1: 0.5 * def.delr,
                                cl2: 0.5 * def.delr,
                                hwva: def.delc,
                            },
                        };
                        conns.push(conn);
                        index.insert(pair, conns.len() - 1);
                        conns.len() - 1
                    }
                };
                ja.push(m as i64 + 1);
                jas.push(isym as i64 + 1);
            }
            ia.push(ja.len() as i64 + 1);
        }

        Grid {
            nodes,
            nodeuser,
            nodereduced,
            top,
            bot,
            area,
            ia,
            ja,
            jas,
            conns,
        }
    }

    fn thickness(&self, n: usize) -> f64 {
        self.top[n] - self.bot[n]
    }

    /// Saturated conductance of one connection.
    fn conductance(&self, c: &Connection, k11: &Array1<f64>, k33: &Array1<f64>) -> f64 {
        if c.ihc == 0 {
            let (a, b) = (k33[c.n], k33[c.m]);
            if a <= 0.0 || b <= 0.0 {
                return 0.0;
            }
            c.hwva / (c.cl1 / a + c.cl2 / b)
        } else {
            let t1 = k11[c.n] * self.thickness(c.n);
            let t2 = k11[c.m] * self.thickness(c.m);
            if t1 <= 0.0 || t2 <= 0.0 {
                return 0.0;
            }
            c.hwva * t1 * t2 / (t1 * c.cl2 + t2 * c.cl1)
        }
    }
}

/// Boundary `(hcof, rhs)` of one entry at head `h`.
fn boundary_terms(ptype: &str, row: ArrayView1<f64>, h: f64, area: f64) -> (f64, f64) {
    match ptype {
        "wel6" => (0.0, -row[0]),
        "rch6" => (0.0, -row[0] * area),
        "ghb6" => (-row[1], -row[1] * row[0]),
        "drn6" => {
            if h > row[0] {
                (-row[1], -row[1] * row[0])
            } else {
                (0.0, 0.0)
            }
        }
        "riv6" => {
            if h > row[2] {
                (-row[1], -row[1] * row[0])
            } else {
                (0.0, -row[1] * (row[0] - row[2]))
            }
        }
        _ => (0.0, 0.0),
    }
}

#[derive(Debug, Clone)]
struct Boundary {
    ptype: String,
    tag: String,
    nodes: Vec<usize>,
    base: Array2<f64>,
    bound: Array2<f64>,
    hcof: Array1<f64>,
    rhs: Array1<f64>,
    simvals: Array1<f64>,
}

#[derive(Debug, Clone)]
struct State {
    /// One-based current stress period and step; zero before the first step.
    kper: usize,
    kstp: usize,
    totim: f64,
    delt: f64,
    x: Array1<f64>,
    xold: Array1<f64>,
    k11: Array1<f64>,
    k33: Array1<f64>,
    condsat: Array1<f64>,
    kchangeper: i64,
    kchangestp: i64,
    nodekchange: Array1<i64>,
    amat: Array1<f64>,
    boundaries: Vec<Boundary>,
}

/// In-process flow solver over a [`ModelDef`].
pub struct SyntheticSolver {
    def: ModelDef,
    grid: Grid,
    registry: PackageRegistry,
    ss: Option<Array1<f64>>,
    state: Option<State>,
}

impl SyntheticSolver {
    pub fn new(def: ModelDef) -> AdjResult<Self> {
        def.validate()?;
        let grid = Grid::build(&def);
        let mut registry = PackageRegistry::default();
        for pkg in &def.packages {
            registry.push(&pkg.ptype, pkg.name.as_deref());
        }
        let ss = match &def.ss {
            Some(p) => {
                let user = p.expand(def.nodes_user(), "ss")?;
                Some(grid.nodeuser.iter().map(|&u| user[u]).collect())
            }
            None => None,
        };
        Ok(SyntheticSolver {
            def,
            grid,
            registry,
            ss,
            state: None,
        })
    }

    pub fn model(&self) -> &ModelDef {
        &self.def
    }

    fn reduced(&self, values: Vec<f64>) -> Array1<f64> {
        self.grid.nodeuser.iter().map(|&u| values[u]).collect()
    }

    fn state(&self) -> AdjResult<&State> {
        self.state
            .as_ref()
            .ok_or_else(|| AdjError::Solver("solver is not initialised".to_string()))
    }

    fn state_mut(&mut self) -> AdjResult<&mut State> {
        self.state
            .as_mut()
            .ok_or_else(|| AdjError::Solver("solver is not initialised".to_string()))
    }

    fn steady(&self, kper: usize) -> bool {
        self.ss.is_none()
            || kper
                .checked_sub(1)
                .and_then(|p| self.def.periods.get(p))
                .is_some_and(|p| p.steady)
    }

    fn next_step(&self, st: &State) -> Option<(usize, usize)> {
        if st.kper == 0 {
            return Some((1, 1));
        }
        let period = &self.def.periods[st.kper - 1];
        if st.kstp < period.nstp {
            Some((st.kper, st.kstp + 1))
        } else if st.kper < self.def.periods.len() {
            Some((st.kper + 1, 1))
        } else {
            None
        }
    }

    fn period_start(&self, kper: usize) -> f64 {
        self.def.periods[..kper - 1].iter().fold(0.0, |acc, p| acc + p.perlen)
    }

    fn all_condsat(&self, k11: &Array1<f64>, k33: &Array1<f64>) -> Array1<f64> {
        self.grid
            .conns
            .iter()
            .map(|c| self.grid.conductance(c, k11, k33))
            .collect()
    }

    fn boundary_index(&self, st: &State, tag: &str) -> Option<usize> {
        st.boundaries.iter().position(|b| b.tag.eq_ignore_ascii_case(tag))
    }

    fn lookup(&self, addr: &str) -> AdjResult<SolverValue> {
        let st = self.state()?;
        let g = &self.grid;
        let model = self.def.name.to_ascii_uppercase();
        let unknown = || AdjError::Solver(format!("unknown variable {addr}"));
        let parts: Vec<&str> = addr.split('/').collect();

        let value = match parts.as_slice() {
            [TDIS_COMPONENT, "KPER"] => int(vec![st.kper as i64]),
            [TDIS_COMPONENT, "KSTP"] => int(vec![st.kstp as i64]),
            [TDIS_COMPONENT, "DELT"] => float(vec![st.delt]),
            [TDIS_COMPONENT, "TOTIM"] => float(vec![st.totim]),
            [SOLUTION, "MXITER"] => int(vec![self.def.mxiter as i64]),
            [SOLUTION, "AMAT"] => float(st.amat.to_vec()),
            [m, name] if *m == model => match *name {
                "X" => float(st.x.to_vec()),
                "XOLD" => float(st.xold.to_vec()),
                "ISS" => int(vec![self.steady(st.kper) as i64]),
                "INEWTON" => int(vec![0]),
                _ => return Err(unknown()),
            },
            [m, "DIS", name] if *m == model => match *name {
                "NLAY" => int(vec![self.def.nlay as i64]),
                "NROW" => int(vec![self.def.nrow as i64]),
                "NCOL" => int(vec![self.def.ncol as i64]),
                "NODES" => int(vec![g.nodes as i64]),
                "NDIM" => int(vec![3]),
                "TOP" => float(g.top.clone()),
                "BOT" => float(g.bot.clone()),
                "AREA" => float(g.area.clone()),
                "NODEUSER" => {
                    if g.nodes == self.def.nodes_user() {
                        int(vec![0])
                    } else {
                        int(g.nodeuser.iter().map(|&u| u as i64 + 1).collect())
                    }
                }
                "NODEREDUCED" => int(
                    g.nodereduced
                        .iter()
                        .map(|r| r.map_or(0, |n| n as i64 + 1))
                        .collect(),
                ),
                "IDOMAIN" => int(
                    (0..self.def.nodes_user())
                        .map(|u| self.def.is_active(u) as i64)
                        .collect(),
                ),
                _ => return Err(unknown()),
            },
            [m, "CON", name] if *m == model => match *name {
                "NODES" => int(vec![g.nodes as i64]),
                "IA" => int(g.ia.clone()),
                "JA" => int(g.ja.clone()),
                "JAS" => int(g.jas.clone()),
                "IHC" => int(g.conns.iter().map(|c| c.ihc).collect()),
                "CL1" => float(g.conns.iter().map(|c| c.cl1).collect()),
                "CL2" => float(g.conns.iter().map(|c| c.cl2).collect()),
                "HWVA" => float(g.conns.iter().map(|c| c.hwva).collect()),
                _ => return Err(unknown()),
            },
            [m, "NPF", name] if *m == model => match *name {
                "K11" => float(st.k11.to_vec()),
                "K33" => float(st.k33.to_vec()),
                "CONDSAT" => float(st.condsat.to_vec()),
                "SAT" => float(vec![1.0; g.nodes]),
                "ICELLTYPE" => int(vec![0; g.nodes]),
                "KCHANGEPER" => int(vec![st.kchangeper]),
                "KCHANGESTP" => int(vec![st.kchangestp]),
                "NODEKCHANGE" => int(st.nodekchange.to_vec()),
                _ => return Err(unknown()),
            },
            [m, "STO", name] if *m == model => match (&self.ss, *name) {
                (Some(ss), "SS") => float(ss.to_vec()),
                (Some(_), "ICONVERT") => int(vec![self.def.iconvert; g.nodes]),
                _ => return Err(unknown()),
            },
            [m, tag, name] if *m == model => {
                let b = self
                    .boundary_index(st, tag)
                    .map(|i| &st.boundaries[i])
                    .ok_or_else(unknown)?;
                match *name {
                    "NBOUND" => int(vec![b.nodes.len() as i64]),
                    "NODELIST" => int(b.nodes.iter().map(|&n| n as i64 + 1).collect()),
                    "BOUND" => SolverValue::Float(b.bound.clone().into_dyn()),
                    "HCOF" => float(b.hcof.to_vec()),
                    "RHS" => float(b.rhs.to_vec()),
                    "SIMVALS" => float(b.simvals.to_vec()),
                    _ => return Err(unknown()),
                }
            }
            _ => return Err(unknown()),
        };
        Ok(value)
    }

    fn assemble(&self, st: &State) -> (Array2<f64>, Array1<f64>, Vec<(Array1<f64>, Array1<f64>)>) {
        let n = self.grid.nodes;
        let mut a = Array2::<f64>::zeros((n, n));
        let mut b = Array1::<f64>::zeros(n);
        for (c, &cond) in self.grid.conns.iter().zip(st.condsat.iter()) {
            a[[c.n, c.m]] += cond;
            a[[c.m, c.n]] += cond;
            a[[c.n, c.n]] -= cond;
            a[[c.m, c.m]] -= cond;
        }
        if let (Some(ss), false) = (&self.ss, self.steady(st.kper)) {
            for i in 0..n {
                let sc = ss[i] * self.grid.area[i] * self.grid.thickness(i) / st.delt;
                a[[i, i]] -= sc;
                b[i] -= sc * st.xold[i];
            }
        }
        let mut terms = Vec::with_capacity(st.boundaries.len());
        for bnd in &st.boundaries {
            let mut hcof = Array1::<f64>::zeros(bnd.nodes.len());
            let mut rhs = Array1::<f64>::zeros(bnd.nodes.len());
            for (i, &node) in bnd.nodes.iter().enumerate() {
                let (h, r) = boundary_terms(&bnd.ptype, bnd.bound.row(i), st.x[node], self.grid.area[node]);
                hcof[i] = h;
                rhs[i] = r;
                a[[node, node]] += h;
                b[node] += r;
            }
            terms.push((hcof, rhs));
        }
        (a, b, terms)
    }

    fn compressed(&self, a: &Array2<f64>) -> Array1<f64> {
        let g = &self.grid;
        let mut amat = Array1::<f64>::zeros(g.ja.len());
        for row in 0..g.nodes {
            let (start, end) = (g.ia[row] as usize - 1, g.ia[row + 1] as usize - 1);
            for pos in start..end {
                amat[pos] = a[[row, g.ja[pos] as usize - 1]];
            }
        }
        amat
    }
}

impl FlowSolver for SyntheticSolver {
    fn initialize(&mut self) -> AdjResult<()> {
        let n = self.def.nodes_user();
        let k11 = self.reduced(self.def.k11.expand(n, "k11")?);
        let k33 = match &self.def.k33 {
            Some(p) => self.reduced(p.expand(n, "k33")?),
            None => k11.clone(),
        };
        let condsat = self.all_condsat(&k11, &k33);

        let mut boundaries = Vec::with_capacity(self.def.packages.len());
        for pkg in &self.def.packages {
            let ptype = pkg.ptype.to_ascii_lowercase();
            let tags = self.registry.names(&ptype);
            let ordinal = boundaries
                .iter()
                .filter(|b: &&Boundary| b.ptype == ptype)
                .count();
            let tag = tags.get(ordinal).cloned().ok_or_else(|| {
                AdjError::Config(format!("no registered name for {ptype} #{}", ordinal + 1))
            })?;
            let ncol = bound_field_names(&ptype).len();
            let mut base = Array2::<f64>::zeros((pkg.entries.len(), ncol));
            let mut nodes = Vec::with_capacity(pkg.entries.len());
            for (i, entry) in pkg.entries.iter().enumerate() {
                let user = self.def.user_node(entry.cell)?;
                let node = self.grid.nodereduced[user].ok_or_else(|| {
                    AdjError::Config(format!("{tag} entry at {:?} is inactive", entry.cell))
                })?;
                nodes.push(node);
                for (c, &v) in entry.values.iter().enumerate() {
                    base[[i, c]] = v;
                }
            }
            let nb = nodes.len();
            boundaries.push(Boundary {
                ptype,
                tag,
                nodes,
                bound: base.clone(),
                base,
                hcof: Array1::zeros(nb),
                rhs: Array1::zeros(nb),
                simvals: Array1::zeros(nb),
            });
        }

        let x = Array1::from_elem(self.grid.nodes, self.def.strt);
        let nja = self.grid.ja.len();
        self.state = Some(State {
            kper: 0,
            kstp: 0,
            totim: 0.0,
            delt: 0.0,
            xold: x.clone(),
            x,
            k11,
            k33,
            condsat,
            kchangeper: 0,
            kchangestp: 0,
            nodekchange: Array1::zeros(self.grid.nodes),
            amat: Array1::zeros(nja),
            boundaries,
        });
        debug!(
            "synthetic model '{}' initialised: {} active nodes, {} connections",
            self.def.name,
            self.grid.nodes,
            self.grid.conns.len()
        );
        Ok(())
    }

    fn finalize(&mut self) -> AdjResult<()> {
        self.state = None;
        Ok(())
    }

    fn current_time(&self) -> AdjResult<f64> {
        Ok(self.state()?.totim)
    }

    fn end_time(&self) -> AdjResult<f64> {
        self.state()?;
        Ok(self.period_start(self.def.periods.len() + 1))
    }

    fn time_step_length(&self) -> AdjResult<f64> {
        let st = self.state()?;
        if st.kper == 0 {
            let p = &self.def.periods[0];
            return Ok(p.perlen / p.nstp as f64);
        }
        Ok(st.delt)
    }

    fn prepare_time_step(&mut self, _dt: f64) -> AdjResult<()> {
        let st = self.state()?;
        let (kper, kstp) = self
            .next_step(st)
            .ok_or_else(|| AdjError::Solver("simulation already reached its end time".to_string()))?;
        let period = &self.def.periods[kper - 1];
        let delt = period.perlen / period.nstp as f64;
        let start = self.period_start(kper);
        let totim = if kstp == period.nstp {
            start + period.perlen
        } else {
            start + kstp as f64 * delt
        };

        let st = self.state_mut()?;
        st.kper = kper;
        st.kstp = kstp;
        st.delt = delt;
        st.totim = totim;
        st.xold = st.x.clone();
        if kstp == 1 {
            for b in &mut st.boundaries {
                b.bound = b.base.clone();
            }
        }
        Ok(())
    }

    fn prepare_solve(&mut self, component: usize) -> AdjResult<()> {
        if component != 1 {
            return Err(AdjError::Solver(format!("no solution component {component}")));
        }
        let st = self.state()?;
        if st.kchangeper == st.kper as i64 && st.kchangestp == st.kstp as i64 {
            let fresh = self.all_condsat(&st.k11, &st.k33);
            let flagged = st.nodekchange.clone();
            let conns = self.grid.conns.clone();
            let st = self.state_mut()?;
            for (i, c) in conns.iter().enumerate() {
                if flagged[c.n] != 0 || flagged[c.m] != 0 {
                    st.condsat[i] = fresh[i];
                }
            }
        }
        Ok(())
    }

    fn solve(&mut self, component: usize) -> AdjResult<bool> {
        if component != 1 {
            return Err(AdjError::Solver(format!("no solution component {component}")));
        }
        let st = self.state()?;
        let (a, b, terms) = self.assemble(st);
        let amat = self.compressed(&a);
        let x = solve_dense(a, b)?;
        let hclose = self.def.hclose;

        let st = self.state_mut()?;
        let change = x
            .iter()
            .zip(st.x.iter())
            .fold(0.0f64, |acc, (new, old)| acc.max((new - old).abs()));
        st.x = x;
        st.amat = amat;
        for (bnd, (hcof, rhs)) in st.boundaries.iter_mut().zip(terms) {
            bnd.simvals = bnd
                .nodes
                .iter()
                .enumerate()
                .map(|(i, &node)| hcof[i] * st.x[node] - rhs[i])
                .collect();
            bnd.hcof = hcof;
            bnd.rhs = rhs;
        }
        Ok(change < hclose)
    }

    fn finalize_solve(&mut self, component: usize) -> AdjResult<()> {
        if component != 1 {
            return Err(AdjError::Solver(format!("no solution component {component}")));
        }
        Ok(())
    }

    fn finalize_time_step(&mut self) -> AdjResult<()> {
        self.state()?;
        Ok(())
    }

    fn address(
        &self,
        name: &str,
        component: &str,
        subcomponent: Option<&str>,
    ) -> AdjResult<VarAddress> {
        let addr = VarAddress::new(name, component, subcomponent);
        self.lookup(addr.as_str())?;
        Ok(addr)
    }

    fn get_value(&self, addr: &VarAddress) -> AdjResult<SolverValue> {
        self.lookup(addr.as_str())
    }

    fn write(&mut self, addr: &VarAddress, index: usize, value: f64) -> AdjResult<()> {
        let model = self.def.name.to_ascii_uppercase();
        let parts: Vec<&str> = addr.as_str().split('/').collect();
        let bound_slot = match parts.as_slice() {
            [m, tag, "BOUND"] if *m == model => Some(
                self.boundary_index(self.state()?, tag)
                    .ok_or_else(|| AdjError::Solver(format!("unknown variable {addr}")))?,
            ),
            _ => None,
        };
        let out_of_range =
            |len: usize| AdjError::Solver(format!("index {index} outside {addr} (length {len})"));
        let st = self.state_mut()?;

        match parts.as_slice() {
            [m, "NPF", name] if *m == model => match *name {
                "K11" | "K33" => {
                    let target = if *name == "K11" { &mut st.k11 } else { &mut st.k33 };
                    let len = target.len();
                    *target.get_mut(index).ok_or_else(|| out_of_range(len))? = value;
                }
                "KCHANGEPER" if index == 0 => st.kchangeper = value as i64,
                "KCHANGESTP" if index == 0 => st.kchangestp = value as i64,
                "NODEKCHANGE" => {
                    let len = st.nodekchange.len();
                    *st.nodekchange.get_mut(index).ok_or_else(|| out_of_range(len))? = value as i64;
                }
                _ => return Err(AdjError::Solver(format!("{addr} is not writable"))),
            },
            _ => match bound_slot {
                Some(slot) => {
                    let b = &mut st.boundaries[slot];
                    let ncol = b.bound.ncols().max(1);
                    let len = b.bound.len();
                    *b.bound
                        .get_mut((index / ncol, index % ncol))
                        .ok_or_else(|| out_of_range(len))? = value;
                }
                None => return Err(AdjError::Solver(format!("{addr} is not writable"))),
            },
        }
        Ok(())
    }
}

/// Opens [`SyntheticSolver`]s from a directory holding `model.json`.
#[derive(Debug, Default)]
pub struct SyntheticFactory {
    opened: Cell<usize>,
}

impl SyntheticFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solvers created so far.
    pub fn sessions_created(&self) -> usize {
        self.opened.get()
    }
}

impl SessionFactory for SyntheticFactory {
    type Solver = SyntheticSolver;

    fn create(&self, sim_ws: &Path) -> AdjResult<SyntheticSolver> {
        let solver = SyntheticSolver::new(ModelDef::load(sim_ws)?)?;
        self.opened.set(self.opened.get() + 1);
        Ok(solver)
    }
}
