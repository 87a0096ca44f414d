//! Graph Sigma CLI - Run an experiment from JSON configuration.

use std::path::PathBuf;
use std::time::Instant;

use graph_sigma::{
    compute::{
        ExactEvaluator, Game, GraphGenerator, Simulator,
        social::{Production, SocialAnalysis, simulate_sweep},
    },
    schema::{ExperimentConfig, SocialConfig, SocialGood, SolverMethod},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <experiment.json>", args[0]);
        eprintln!();
        eprintln!("Evaluate a game on a graph exactly and by simulation.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  experiment.json  Path to experiment configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let config = ExperimentConfig::from_path(&config_path).unwrap_or_else(|e| {
        eprintln!("Error loading config {}: {}", config_path.display(), e);
        std::process::exit(1);
    });

    if let Err(e) = run(&config) {
        eprintln!("Experiment failed ({}): {}", config.graph.label(), e);
        std::process::exit(1);
    }
}

fn run(config: &ExperimentConfig) -> graph_sigma::Result<()> {
    let graph = config.graph.generate(config.graph_seed)?;
    let game = Game::from_spec(&config.game, config.selection_intensity)?;
    let (r, s, t, p) = game.entries();

    println!("Graph Sigma Experiment");
    println!("======================");
    println!("Graph: {} ({} nodes)", config.graph.label(), graph.len());
    if config.graph.is_random() {
        println!("Graph seed: {}", config.graph_seed);
    }
    println!("Game: R={} S={} T={} P={}", r, s, t, p);
    println!("δ: {}", game.delta());
    println!();

    // Exact evaluation
    let evaluator = ExactEvaluator::new(&graph)?;
    let verdict = evaluator.evaluate(&game)?;
    let coefficients = evaluator.coefficients();

    println!("Structure coefficients:");
    println!(
        "  τ1={:.6} τ2={:.6} τ3={:.6}",
        coefficients.tau1, coefficients.tau2, coefficients.tau3
    );
    match coefficients.sigma {
        Some(sigma) => println!("  σ = {:.6}", sigma),
        None => println!("  σ undefined (τ1 + τ2 = τ3)"),
    }
    if let Some(ratio) = coefficients.critical_ratio {
        println!("  (b/c)* = {:.6}", ratio);
    }
    println!(
        "  dρ_A/dδ: {:.6e} → mutant {} over 1/N",
        verdict.fixation_gradient,
        if verdict.favored { "favored" } else { "not favored" }
    );
    println!(
        "  σ-rule differential: {:.6e} → ρ_A {} ρ_B",
        verdict.differential,
        if verdict.beats_resident { ">" } else { "≤" }
    );
    println!();

    if let Some(simulation) = &config.simulation {
        let simulator = Simulator::new(&graph, game, simulation.clone())?;

        println!(
            "Running {} trials per strategy ({:?})...",
            simulation.trials, simulation.rule
        );
        let start = Instant::now();
        let comparison = simulator.compare()?;
        let elapsed = start.elapsed();

        let mutant = &comparison.mutant;
        println!(
            "  ρ_A = {:.5} ± {:.5} (neutral {:.5}, z = {:.2})",
            mutant.probability(),
            mutant.standard_error(),
            mutant.neutral_baseline(),
            mutant.z_score()
        );
        println!(
            "  ρ_B = {:.5} ± {:.5}",
            comparison.resident.probability(),
            comparison.resident.standard_error()
        );

        let significance = simulation.significance;
        report_agreement(
            "ρ_A vs 1/N",
            verdict.favored,
            mutant.exceeds_neutral(),
            mutant.z_score() < -significance,
            significance,
        );
        report_agreement(
            "ρ_A vs ρ_B",
            verdict.beats_resident,
            comparison.mutant_favored(),
            -comparison.difference() / comparison.standard_error().max(f64::MIN_POSITIVE)
                > significance,
            significance,
        );
        println!("  Time: {:.2}s", elapsed.as_secs_f32());
        println!();
    }

    if let Some(social) = &config.social {
        run_social(&graph, social, config.selection_intensity)?;
    }

    Ok(())
}

fn report_agreement(
    question: &str,
    exact: bool,
    above: bool,
    below: bool,
    significance: f64,
) {
    if (exact && above) || (!exact && below) {
        println!("  {}: exact and simulated verdicts agree", question);
    } else if !above && !below {
        println!(
            "  {}: simulation inconclusive at {} standard errors",
            question, significance
        );
    } else {
        log::warn!("{}: exact and simulated verdicts disagree", question);
        println!("  {}: exact and simulated verdicts DISAGREE", question);
    }
}

fn run_social(
    graph: &graph_sigma::Graph,
    social: &SocialConfig,
    delta: f64,
) -> graph_sigma::Result<()> {
    let analysis = SocialAnalysis::new(graph).with_solver(social.solver.clone());
    let effects = analysis.sweep(&social.mutation_rates, social.benefit, social.cost)?;

    println!("Social goods (b={}, c={}):", social.benefit, social.cost);
    println!("  {:>10}  {:>14}  {:>14}", "u", "ff", "pp");
    for effect in &effects {
        println!(
            "  {:>10.4e}  {:>14.6e}  {:>14.6e}",
            effect.mutation_rate, effect.ff, effect.pp
        );
    }

    if let Some(updates) = social.updates {
        let seed = social.seed.unwrap_or_else(rand::random);
        log::info!("Simulating social goods with seed {}", seed);
        for good in SocialGood::ALL {
            let production = Production::new(good, social.benefit, social.cost)?;
            let means = simulate_sweep(
                graph,
                production,
                &social.mutation_rates,
                delta,
                updates,
                seed,
            )?;
            println!("  Simulated {:?} mean frequencies:", good);
            for (u, mean) in social.mutation_rates.iter().zip(&means) {
                println!("    u={:<10.4e} ⟨x⟩={:.5} (≈ ½ + δ·effect)", u, mean);
            }
        }
    }
    println!();
    Ok(())
}

fn print_example_config() {
    let config = ExperimentConfig {
        social: Some(SocialConfig {
            benefit: 4.0,
            cost: 1.0,
            mutation_rates: vec![0.001, 0.01, 0.1],
            solver: SolverMethod::Direct,
            updates: None,
            seed: None,
        }),
        ..ExperimentConfig::default()
    };

    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Example configuration (experiment.json):");
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("Error serializing example: {}", e);
            std::process::exit(1);
        }
    }
}
