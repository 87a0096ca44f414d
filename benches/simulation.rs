//! Benchmarks for the coalescence solve, exact evaluation, and simulator.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use graph_sigma::{
    compute::{ExactEvaluator, Game, GraphGenerator, Simulator, social::SocialAnalysis},
    schema::{GraphSpec, SimulationConfig, UpdateRule},
};

fn bench_coalescence(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalescence_times");

    for nodes in [10, 20, 40] {
        let spec = GraphSpec::RandomRegular { nodes, degree: 4 };
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &nodes, |b, _| {
            b.iter(|| {
                // Fresh graph each iteration so the cache is cold
                let graph = spec.generate(1).expect("valid graph");
                black_box(graph.coalescence_times().expect("irreducible").max_abs());
            });
        });
    }

    group.finish();
}

fn bench_exact_evaluator(c: &mut Criterion) {
    let graph = GraphSpec::Lattice { side: 4 }
        .generate(0)
        .expect("valid graph");
    let evaluator = ExactEvaluator::new(&graph).expect("irreducible");
    let game = Game::new(3.0, 0.0, 5.0, 1.0, 0.01).expect("valid game");

    c.bench_function("exact_evaluate_cached", |b| {
        b.iter(|| black_box(evaluator.evaluate(black_box(&game)).expect("solvable")));
    });
}

fn bench_simulator(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixation_trials");
    group.sample_size(10);

    let game = Game::new(3.0, 0.0, 5.0, 1.0, 0.01).expect("valid game");
    for rule in [UpdateRule::DeathBirth, UpdateRule::PairwiseComparison, UpdateRule::BirthDeath] {
        let graph = GraphSpec::Cycle { nodes: 20 }.generate(0).expect("valid graph");
        let config = SimulationConfig {
            trials: 1_000,
            seed: Some(7),
            rule,
            ..SimulationConfig::default()
        };
        let simulator = Simulator::new(&graph, game, config).expect("valid simulation");

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", rule)),
            &rule,
            |b, _| {
                b.iter(|| black_box(simulator.run().expect("absorbs")));
            },
        );
    }

    group.finish();
}

fn bench_social_matrices(c: &mut Criterion) {
    let mut group = c.benchmark_group("social_structure_matrices");
    group.sample_size(10);

    for nodes in [10, 20] {
        let graph = GraphSpec::Cycle { nodes }.generate(0).expect("valid graph");
        let analysis = SocialAnalysis::new(&graph);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &nodes, |b, _| {
            b.iter(|| black_box(analysis.structure_matrices(0.01).expect("solvable")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_coalescence,
    bench_exact_evaluator,
    bench_simulator,
    bench_social_matrices
);
criterion_main!(benches);
