// ─────────────────────────────────────────────────────────────────────
// MF6 Adjoint — Performance-Measure Specification Parser
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reader for the block-structured adjoint input file.
//!
//! ```text
//! begin options
//!   hdf5_name forward.npz
//! end options
//!
//! begin performance_measure pm1
//!   # kper kstp k i j  kind  form    weight obsval
//!   1      1    1 5 5  head  direct  1.0    -999
//! end performance_measure
//! ```
//!
//! Unstructured grids replace `k i j` by `layer cell`. A boundary package
//! instance name in the kind column selects that package's flux. All indices
//! in the file are one-based.

use std::path::Path;

use gwadj_types::error::{AdjError, AdjResult};
use gwadj_types::state::{GridTopology, Lrc, StepKey};

use crate::index::{resolve_node, CellCoordinate, NodeReduction};
use crate::manifest::PackageRegistry;
use crate::measure::{uniformity_error, MeasureForm, MeasureRecord, PerformanceMeasure, QuantityKind};

/// Options block contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecOptions {
    /// Snapshot store path for the forward run.
    pub hdf5_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdjSpec {
    pub options: SpecOptions,
    pub measures: Vec<PerformanceMeasure>,
}

/// Grid and package information the parser resolves records against.
#[derive(Debug, Clone, Copy)]
pub struct SpecContext<'a> {
    pub topology: GridTopology,
    pub reduction: &'a NodeReduction,
    pub packages: &'a PackageRegistry,
}

enum Block {
    Top,
    Options,
    Measure {
        name: String,
        begin_line: usize,
        records: Vec<MeasureRecord>,
    },
}

fn parse_index(token: &str, what: &str, line_no: usize, line: &str) -> AdjResult<usize> {
    match token.parse::<usize>() {
        Ok(v) if v >= 1 => Ok(v - 1),
        _ => Err(AdjError::syntax(
            line_no,
            format!("error casting {what} '{token}' to a one-based integer"),
            line,
        )),
    }
}

fn parse_real(token: &str, what: &str, line_no: usize, line: &str) -> AdjResult<f64> {
    token.parse::<f64>().map_err(|_| {
        AdjError::syntax(
            line_no,
            format!("error casting {what} '{token}' to a number"),
            line,
        )
    })
}

fn parse_record(
    tokens: &[&str],
    ctx: &SpecContext<'_>,
    line_no: usize,
    line: &str,
) -> AdjResult<MeasureRecord> {
    let expected = ctx.topology.record_field_count();
    if tokens.len() != expected {
        return Err(AdjError::syntax(
            line_no,
            format!(
                "performance measure entry has the wrong number of items, found {}, should have {}",
                tokens.len(),
                expected
            ),
            line,
        ));
    }

    let kper = parse_index(tokens[0], "stress period", line_no, line)?;
    let kstp = parse_index(tokens[1], "time step", line_no, line)?;
    let coordinate = if ctx.topology.is_structured() {
        CellCoordinate::Lrc(Lrc {
            k: parse_index(tokens[2], "layer", line_no, line)?,
            i: parse_index(tokens[3], "row", line_no, line)?,
            j: parse_index(tokens[4], "column", line_no, line)?,
        })
    } else {
        CellCoordinate::LayerCell {
            layer: parse_index(tokens[2], "layer", line_no, line)?,
            cell: parse_index(tokens[3], "cell", line_no, line)?,
        }
    };

    let user = resolve_node(&ctx.topology, &coordinate)
        .map_err(|e| AdjError::syntax(line_no, e.to_string(), line))?;
    let node = ctx
        .reduction
        .to_reduced(user)
        .map_err(|e| AdjError::syntax(line_no, format!("unresolvable cell: {e}"), line))?;

    let n = tokens.len();
    let kind_token = tokens[n - 4].to_ascii_lowercase();
    let kind = if kind_token == "head" {
        QuantityKind::Head
    } else if ctx.packages.type_of(&kind_token).is_some() {
        QuantityKind::Flux {
            package: kind_token,
        }
    } else {
        return Err(AdjError::syntax(
            line_no,
            format!("'{kind_token}' is neither 'head' nor a boundary package name"),
            line,
        ));
    };
    let form = MeasureForm::parse(tokens[n - 3]).ok_or_else(|| {
        AdjError::syntax(
            line_no,
            format!("form '{}' must be 'direct' or 'residual'", tokens[n - 3]),
            line,
        )
    })?;
    let weight = parse_real(tokens[n - 2], "weight", line_no, line)?;
    let obsval = parse_real(tokens[n - 1], "observed value", line_no, line)?;

    Ok(MeasureRecord {
        step: StepKey::new(kper, kstp),
        node,
        kind,
        form,
        weight,
        obsval,
        coordinate: Some(coordinate),
    })
}

/// Parses the whole specification in one forward scan.
pub fn parse_adj_spec(text: &str, ctx: &SpecContext<'_>) -> AdjResult<AdjSpec> {
    let mut options = SpecOptions::default();
    let mut options_seen = false;
    let mut measures: Vec<PerformanceMeasure> = Vec::new();
    let mut block = Block::Top;
    let mut last_line = 0;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        last_line = line_no;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        let tokens: Vec<&str> = line.split_whitespace().collect();

        block = match block {
            Block::Top => {
                if lower.starts_with("begin options") {
                    if options_seen {
                        return Err(AdjError::syntax(
                            line_no,
                            "options block defined more than once",
                            line,
                        ));
                    }
                    options_seen = true;
                    Block::Options
                } else if lower.starts_with("begin performance_measure") {
                    if tokens.len() != 3 {
                        return Err(AdjError::syntax(
                            line_no,
                            format!(
                                "'begin' line has wrong number of items, should be 3, not {}",
                                tokens.len()
                            ),
                            line,
                        ));
                    }
                    Block::Measure {
                        name: tokens[2].to_ascii_lowercase(),
                        begin_line: line_no,
                        records: Vec::new(),
                    }
                } else {
                    return Err(AdjError::syntax(line_no, "unrecognized adj file input", line));
                }
            }
            Block::Options => {
                if lower.starts_with("begin") {
                    return Err(AdjError::syntax(
                        line_no,
                        "a new begin block found while parsing options",
                        line,
                    ));
                } else if lower.starts_with("end options") {
                    Block::Top
                } else if tokens[0].eq_ignore_ascii_case("hdf5_name") {
                    if tokens.len() != 2 {
                        return Err(AdjError::syntax(
                            line_no,
                            "hdf5_name expects exactly one file name",
                            line,
                        ));
                    }
                    options.hdf5_name = Some(tokens[1].to_string());
                    Block::Options
                } else {
                    return Err(AdjError::syntax(line_no, "unrecognized option", line));
                }
            }
            Block::Measure {
                name,
                begin_line,
                mut records,
            } => {
                if lower.starts_with("begin") {
                    return Err(AdjError::syntax(
                        line_no,
                        format!(
                            "a new begin block found while parsing performance_measure '{name}'"
                        ),
                        line,
                    ));
                } else if lower.starts_with("end performance_measure") {
                    if records.is_empty() {
                        return Err(AdjError::syntax(
                            begin_line,
                            format!("no entries found for performance measure '{name}'"),
                            line,
                        ));
                    }
                    if let Some(msg) = uniformity_error(&records) {
                        return Err(AdjError::syntax(
                            line_no,
                            format!("performance measure '{name}': {msg}"),
                            line,
                        ));
                    }
                    if measures.iter().any(|pm| pm.name() == name) {
                        return Err(AdjError::syntax(
                            begin_line,
                            format!("performance measure '{name}' multiply defined"),
                            line,
                        ));
                    }
                    measures.push(PerformanceMeasure::new(&name, records)?);
                    Block::Top
                } else if lower.starts_with("open") {
                    return Err(AdjError::NotImplemented(format!(
                        "external file inclusion on line {line_no}: '{line}'"
                    )));
                } else {
                    records.push(parse_record(&tokens, ctx, line_no, line)?);
                    Block::Measure {
                        name,
                        begin_line,
                        records,
                    }
                }
            }
        };
    }

    match block {
        Block::Top => {}
        Block::Options => {
            return Err(AdjError::syntax(last_line, "EOF while reading options", ""));
        }
        Block::Measure { name, .. } => {
            return Err(AdjError::syntax(
                last_line,
                format!("EOF while reading performance_measure block '{name}'"),
                "",
            ));
        }
    }
    if measures.is_empty() {
        return Err(AdjError::syntax(
            last_line,
            "no performance measures found in adj file",
            "",
        ));
    }
    Ok(AdjSpec { options, measures })
}

pub fn read_adj_spec(path: &Path, ctx: &SpecContext<'_>) -> AdjResult<AdjSpec> {
    if !path.exists() {
        return Err(AdjError::Config(format!(
            "adj file '{}' not found",
            path.display()
        )));
    }
    parse_adj_spec(&std::fs::read_to_string(path)?, ctx)
}
