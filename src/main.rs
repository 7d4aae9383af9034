//! Elitemap CLI - run a headless quality-diversity session on a demo domain.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use elitemap::{
    BinMetric, DescriptorSpec, DomainError, EmitterKind, EngineConfig, ObjectiveSpec, Population,
    Session, StructureDomain,
};

/// Demo domain: block towers encoded as digit strings. Each digit is the
/// height of one stacked segment; a tower is feasible when no segment is
/// missing.
struct TowerYard {
    descriptors: Vec<DescriptorSpec>,
    objectives: Vec<ObjectiveSpec>,
}

const MAX_SEGMENTS: usize = 16;

impl TowerYard {
    fn new() -> Self {
        let unit = (0.0, 1.0);
        Self {
            descriptors: vec![
                DescriptorSpec {
                    name: "footprint".into(),
                    bounds: unit,
                },
                DescriptorSpec {
                    name: "mass".into(),
                    bounds: unit,
                },
                DescriptorSpec {
                    name: "peak".into(),
                    bounds: unit,
                },
            ],
            objectives: vec![
                ObjectiveSpec {
                    name: "height".into(),
                    bounds: unit,
                    weight: 1.0,
                },
                ObjectiveSpec {
                    name: "evenness".into(),
                    bounds: unit,
                    weight: 0.5,
                },
            ],
        }
    }
}

impl StructureDomain for TowerYard {
    type Phenotype = Vec<u32>;

    fn descriptors(&self) -> &[DescriptorSpec] {
        &self.descriptors
    }

    fn objectives(&self) -> &[ObjectiveSpec] {
        &self.objectives
    }

    fn generate(&self, rng: &mut StdRng) -> String {
        let len = rng.gen_range(1..=MAX_SEGMENTS);
        (0..len)
            .map(|_| char::from_digit(rng.gen_range(0..10), 10).unwrap())
            .collect()
    }

    fn mutate(&self, genotype: &str, rng: &mut StdRng) -> String {
        let mut heights: Vec<i32> = genotype
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as i32).unwrap_or(0))
            .collect();
        match rng.gen_range(0..4u8) {
            0 if heights.len() < MAX_SEGMENTS => heights.push(rng.gen_range(0..10)),
            1 if heights.len() > 1 => {
                let idx = rng.gen_range(0..heights.len());
                heights.remove(idx);
            }
            _ => {
                // Gaussian jitter on one segment height.
                let idx = rng.gen_range(0..heights.len());
                let noise: f64 = StandardNormal.sample(rng);
                heights[idx] = (heights[idx] + (noise * 2.0).round() as i32).clamp(0, 9);
            }
        }
        heights
            .into_iter()
            .map(|h| char::from_digit(h as u32, 10).unwrap())
            .collect()
    }

    fn crossover(&self, a: &str, b: &str, rng: &mut StdRng) -> String {
        let cut_a = rng.gen_range(0..=a.len());
        let cut_b = rng.gen_range(0..=b.len());
        let mut child: String = a[..cut_a].to_string();
        child.push_str(&b[cut_b..]);
        if child.is_empty() {
            child.push('1');
        }
        child.truncate(MAX_SEGMENTS);
        child
    }

    fn realize(&self, genotype: &str, _seed: u64) -> Result<Vec<u32>, DomainError> {
        if genotype.is_empty() {
            return Err(DomainError::InvalidGenotype("empty genotype".into()));
        }
        genotype
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .ok_or_else(|| DomainError::InvalidGenotype(format!("bad symbol {c:?}")))
            })
            .collect()
    }

    fn is_feasible(&self, phenotype: &Vec<u32>) -> bool {
        phenotype.iter().all(|&h| h > 0)
    }

    fn score_fitness(&self, phenotype: &Vec<u32>) -> Result<Vec<f64>, DomainError> {
        let n = phenotype.len() as f64;
        let mean = phenotype.iter().sum::<u32>() as f64 / n / 9.0;
        let max = *phenotype.iter().max().unwrap_or(&0) as f64;
        let min = *phenotype.iter().min().unwrap_or(&0) as f64;
        Ok(vec![mean, 1.0 - (max - min) / 9.0])
    }

    fn score_behavior(&self, phenotype: &Vec<u32>, descriptor: usize) -> f64 {
        let n = phenotype.len() as f64;
        match descriptor {
            0 => n / MAX_SEGMENTS as f64,
            1 => phenotype.iter().sum::<u32>() as f64 / (9.0 * n),
            _ => *phenotype.iter().max().unwrap_or(&0) as f64 / 9.0,
        }
    }

    fn export(&self, phenotype: &Vec<u32>) -> Vec<u8> {
        phenotype.iter().map(|&h| h as u8).collect()
    }
}

fn emitter_by_name(name: &str) -> Option<EmitterKind> {
    EmitterKind::ALL
        .into_iter()
        .find(|k| k.name().eq_ignore_ascii_case(name))
}

fn print_example_config() {
    let config = EngineConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing example config: {e}"),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_config();
        return;
    }

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [generations] [emitter]", args[0]);
        eprintln!();
        eprintln!("Run a headless quality-diversity session on the demo domain.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to engine configuration file");
        eprintln!("  generations  Number of generations to run (default: 20)");
        eprintln!("  emitter      Emitter name (default: Contextual Bandit)");
        eprintln!();
        eprintln!("An example configuration is printed with --example.");
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let generations: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let emitter = args
        .get(3)
        .and_then(|name| emitter_by_name(name))
        .unwrap_or(EmitterKind::ContextualBandit);

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {e}");
        std::process::exit(1);
    });
    let config: EngineConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {e}");
        std::process::exit(1);
    });

    let iterations = config.emitter.iterations;
    let session = Session::new(Arc::new(TowerYard::new()), config).unwrap_or_else(|e| {
        eprintln!("Error creating session: {e}");
        std::process::exit(1);
    });

    println!("Elitemap Session");
    println!("================");
    let (nx, ny) = session.grid_shape();
    println!("Grid: {nx}x{ny}");
    println!("Emitter: {}", emitter.name());
    println!("Generations: {generations}");
    println!();

    if let Err(e) = session.request_reset() {
        eprintln!("Error seeding the archive: {e}");
        std::process::exit(1);
    }
    if let Err(e) = session.set_emitter(emitter) {
        eprintln!("Error installing emitter: {e}");
        std::process::exit(1);
    }

    let start = std::time::Instant::now();
    for _ in 0..generations {
        // Emulate an operator always steering toward the best feasible bin.
        let fitness = session.metric_values(BinMetric::Fitness, false, Population::Feasible);
        let selection = session
            .valid_bins()
            .into_iter()
            .max_by(|&(ai, aj), &(bi, bj)| {
                let a = fitness[ai * ny + aj];
                let b = fitness[bi * ny + bj];
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            });

        let selected: Vec<(usize, usize)> = selection.into_iter().collect();
        match session.request_step(&selected, iterations) {
            Ok(report) => {
                println!(
                    "generation {:>3}: {:>3} new solutions ({:.2}s, emitters {:.2}s)",
                    report.generation,
                    report.new_solutions,
                    report.elapsed_seconds,
                    report.emitter_seconds
                );
            }
            Err(e) => {
                eprintln!("step failed: {e}");
                break;
            }
        }
    }
    let elapsed = start.elapsed().as_secs_f64();

    let coverage = session
        .metric_values(BinMetric::Coverage, false, Population::Feasible)
        .into_iter()
        .filter(|&c| c > 0.0)
        .count();
    let best = session
        .metric_values(BinMetric::Fitness, false, Population::Feasible)
        .into_iter()
        .fold(0.0f64, f64::max);

    println!();
    println!("Final state:");
    println!("  Generations: {}", session.generation());
    println!("  Covered bins (feasible): {coverage}/{}", nx * ny);
    println!("  Best fitness: {best:.4}");
    println!(
        "  Mean genotype length: {:.1}",
        session.population_complexity(Population::Feasible)
    );
    println!("  Elapsed: {elapsed:.2}s");
}
