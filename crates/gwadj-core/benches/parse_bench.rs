use criterion::{criterion_group, criterion_main, Criterion};
use gwadj_core::index::{resolve_node, CellCoordinate, NodeReduction};
use gwadj_core::manifest::PackageRegistry;
use gwadj_core::spec_file::{parse_adj_spec, SpecContext};
use gwadj_types::state::{GridTopology, Lrc};
use std::fmt::Write as _;
use std::hint::black_box;

fn spec_text(nmeasures: usize, nrecords: usize) -> String {
    let mut text = String::from("begin options\n  hdf5_name bench.npz\nend options\n\n");
    for m in 0..nmeasures {
        let _ = writeln!(text, "begin performance_measure pm{m}");
        for r in 0..nrecords {
            let i = r % 50 + 1;
            let j = (r / 50) % 50 + 1;
            let _ = writeln!(text, "  1 1 1 {i} {j} head direct 1.0 -999");
        }
        let _ = writeln!(text, "end performance_measure\n");
    }
    text
}

fn bench_parse_spec(c: &mut Criterion) {
    let topology = GridTopology::Structured {
        nlay: 1,
        nrow: 50,
        ncol: 50,
    };
    let reduction = NodeReduction::identity(topology.nodes_user());
    let packages = PackageRegistry::default();
    let ctx = SpecContext {
        topology,
        reduction: &reduction,
        packages: &packages,
    };
    let text = spec_text(10, 250);

    c.bench_function("parse_adj_spec_10x250", |b| {
        b.iter(|| parse_adj_spec(black_box(&text), &ctx))
    });
}

fn bench_resolve_and_reduce(c: &mut Criterion) {
    let topology = GridTopology::Structured {
        nlay: 5,
        nrow: 100,
        ncol: 100,
    };
    let nodes_user = topology.nodes_user();
    // every tenth cell inactive
    let nodeuser: Vec<i64> = (1..=nodes_user as i64).filter(|n| n % 10 != 0).collect();
    let reduction = NodeReduction::from_nodeuser(nodes_user, nodeuser.len(), &nodeuser).unwrap();

    c.bench_function("resolve_and_reduce_50k", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for k in 0..5 {
                for i in 0..100 {
                    for j in 0..100 {
                        let coord = CellCoordinate::Lrc(Lrc { k, i, j });
                        let user = resolve_node(&topology, &coord).unwrap();
                        if reduction.to_reduced(user).is_ok() {
                            hits += 1;
                        }
                    }
                }
            }
            black_box(hits)
        })
    });
}

criterion_group!(benches, bench_parse_spec, bench_resolve_and_reduce);
criterion_main!(benches);
