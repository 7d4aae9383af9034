//! Benchmarks for archive insertion and emitter stepping.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::Rng;
use rand::rngs::StdRng;

use elitemap::{
    DescriptorSpec, DomainError, EmitterKind, EngineConfig, MapElites, ObjectiveSpec, Session,
    StructureDomain,
};

/// Minimal digit-tower domain for benchmarking.
struct BenchDomain {
    descriptors: Vec<DescriptorSpec>,
    objectives: Vec<ObjectiveSpec>,
}

impl BenchDomain {
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
            ],
            objectives: vec![ObjectiveSpec {
                name: "height".into(),
                bounds: unit,
                weight: 1.0,
            }],
        }
    }
}

const MAX_SEGMENTS: usize = 16;

impl StructureDomain for BenchDomain {
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
        let mut chars: Vec<char> = genotype.chars().collect();
        let idx = rng.gen_range(0..chars.len());
        chars[idx] = char::from_digit(rng.gen_range(0..10), 10).unwrap();
        chars.into_iter().collect()
    }

    fn crossover(&self, a: &str, b: &str, rng: &mut StdRng) -> String {
        let cut = rng.gen_range(0..=a.len());
        let mut child: String = a[..cut].to_string();
        child.push_str(&b[b.len().min(cut)..]);
        if child.is_empty() {
            child.push('1');
        }
        child.truncate(MAX_SEGMENTS);
        child
    }

    fn realize(&self, genotype: &str, _seed: u64) -> Result<Vec<u32>, DomainError> {
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
        Ok(vec![phenotype.iter().sum::<u32>() as f64 / n / 9.0])
    }

    fn score_behavior(&self, phenotype: &Vec<u32>, descriptor: usize) -> f64 {
        let n = phenotype.len() as f64;
        match descriptor {
            0 => n / MAX_SEGMENTS as f64,
            _ => phenotype.iter().sum::<u32>() as f64 / (9.0 * n),
        }
    }

    fn export(&self, phenotype: &Vec<u32>) -> Vec<u8> {
        phenotype.iter().map(|&h| h as u8).collect()
    }
}

fn bench_archive_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_insert");

    for resolution in [8usize, 16, 32] {
        let mut config = EngineConfig::default();
        config.grid.resolution = (resolution, resolution);
        config.rng_seed = Some(1);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{resolution}x{resolution}")),
            &resolution,
            |b, _| {
                let mut archive = MapElites::new(Arc::new(BenchDomain::new()), config.clone())
                    .expect("valid config");
                use rand::SeedableRng;
                let mut rng = StdRng::seed_from_u64(7);
                let domain = BenchDomain::new();
                b.iter(|| {
                    let genotypes: Vec<(String, u64)> =
                        (0..32).map(|_| (domain.generate(&mut rng), rng.r#gen())).collect();
                    black_box(archive.evaluate_and_insert(&genotypes));
                });
            },
        );
    }
    group.finish();
}

fn bench_emitter_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("emitter_step");

    for kind in [
        EmitterKind::Random,
        EmitterKind::Greedy,
        EmitterKind::ContextualBandit,
        EmitterKind::RbfKernel,
    ] {
        let mut config = EngineConfig::default();
        config.grid.resolution = (8, 8);
        config.rng_seed = Some(1);

        group.bench_with_input(BenchmarkId::from_parameter(kind.name()), &kind, |b, _| {
            let session =
                Session::new(Arc::new(BenchDomain::new()), config.clone()).expect("valid config");
            session.request_reset().expect("reset");
            session.set_emitter(kind).expect("emitter");
            b.iter(|| {
                black_box(session.request_step(&[], 1).expect("step"));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_archive_insert, bench_emitter_step);
criterion_main!(benches);
