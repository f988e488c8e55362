//! Genetic search over loading orders.
//!
//! A chromosome is either a plain permutation of package indices or a grouping
//! that keeps every item group together and only varies the order inside each
//! group. Fitness is computed by replaying the order on a fresh container
//! through the placement engine in [`crate::optimizer`].
//!
//! Genes are always indices into the package slice handed to the driver.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::grid::GridError;
use crate::model::{Container, ContainerSpec, Package, PlacedBox};
use crate::optimizer::{PackingConfig, load_at_best_position};
use crate::types::Dimensional;

/// Errors raised by the genetic driver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneticError {
    #[error("Invalid genetic configuration: {0}")]
    InvalidConfig(String),
    #[error("Fitness values are all zero or invalid, roulette selection is undefined")]
    DegenerateFitness,
    #[error("Genetic search cancelled before generation {generation}")]
    Cancelled { generation: usize },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Chromosome representation used by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChromosomeKind {
    /// Free permutation of all packages.
    Permutation,
    /// Groups stay intact; only the order inside a group varies.
    #[default]
    Grouping,
}

impl FromStr for ChromosomeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "permutation" => Ok(ChromosomeKind::Permutation),
            "grouping" => Ok(ChromosomeKind::Grouping),
            other => Err(format!("unknown chromosome kind '{}'", other)),
        }
    }
}

impl fmt::Display for ChromosomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChromosomeKind::Permutation => write!(f, "permutation"),
            ChromosomeKind::Grouping => write!(f, "grouping"),
        }
    }
}

/// One candidate loading order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "genes", rename_all = "lowercase")]
pub enum Chromosome {
    Permutation(Vec<usize>),
    /// Group id to the ordered package indices of that group.
    Grouping(BTreeMap<usize, Vec<usize>>),
}

impl Chromosome {
    pub fn kind(&self) -> ChromosomeKind {
        match self {
            Chromosome::Permutation(_) => ChromosomeKind::Permutation,
            Chromosome::Grouping(_) => ChromosomeKind::Grouping,
        }
    }

    /// Flattens the chromosome into the order packages are loaded in.
    ///
    /// Groups are loaded one after another in ascending group id.
    pub fn load_order(&self) -> Vec<usize> {
        match self {
            Chromosome::Permutation(order) => order.clone(),
            Chromosome::Grouping(groups) => groups.values().flatten().copied().collect(),
        }
    }

    /// Number of genes.
    pub fn len(&self) -> usize {
        match self {
            Chromosome::Permutation(order) => order.len(),
            Chromosome::Grouping(groups) => groups.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Configuration of the genetic driver.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Probability of a swap mutation for permutation chromosomes
    pub mutation_rate: f64,
    /// Per-group reshuffle probability for grouping chromosomes
    pub group_shuffle_rate: f64,
    pub kind: ChromosomeKind,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
    /// Evaluate fitness of a generation on the rayon pool
    pub parallel: bool,
}

impl GeneticConfig {
    pub const DEFAULT_POPULATION_SIZE: usize = 50;
    pub const DEFAULT_GENERATIONS: usize = 100;
    pub const DEFAULT_MUTATION_RATE: f64 = 0.2;
    pub const DEFAULT_GROUP_SHUFFLE_RATE: f64 = 0.1;
    pub const DEFAULT_PARALLEL: bool = true;
    pub const MAX_POPULATION_SIZE: usize = 1_000;
    pub const MAX_GENERATIONS: usize = 10_000;

    pub fn builder() -> GeneticConfigBuilder {
        GeneticConfigBuilder::default()
    }

    /// Checks population size, generation count and rates.
    pub fn validate(&self) -> Result<(), GeneticError> {
        if self.population_size == 0 {
            return Err(GeneticError::InvalidConfig(
                "population size must be at least 1".to_string(),
            ));
        }
        if self.population_size > Self::MAX_POPULATION_SIZE {
            return Err(GeneticError::InvalidConfig(format!(
                "population size must not exceed {}, got: {}",
                Self::MAX_POPULATION_SIZE,
                self.population_size
            )));
        }
        if self.generations > Self::MAX_GENERATIONS {
            return Err(GeneticError::InvalidConfig(format!(
                "generations must not exceed {}, got: {}",
                Self::MAX_GENERATIONS,
                self.generations
            )));
        }
        for (name, rate) in [
            ("mutation rate", self.mutation_rate),
            ("group shuffle rate", self.group_shuffle_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(GeneticError::InvalidConfig(format!(
                    "{} must lie in [0, 1], got: {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: Self::DEFAULT_POPULATION_SIZE,
            generations: Self::DEFAULT_GENERATIONS,
            mutation_rate: Self::DEFAULT_MUTATION_RATE,
            group_shuffle_rate: Self::DEFAULT_GROUP_SHUFFLE_RATE,
            kind: ChromosomeKind::default(),
            seed: None,
            parallel: Self::DEFAULT_PARALLEL,
        }
    }
}

/// Builder for `GeneticConfig`.
#[derive(Clone, Debug, Default)]
pub struct GeneticConfigBuilder {
    config: GeneticConfig,
}

impl GeneticConfigBuilder {
    pub fn population_size(mut self, size: usize) -> Self {
        self.config.population_size = size;
        self
    }

    pub fn generations(mut self, generations: usize) -> Self {
        self.config.generations = generations;
        self
    }

    pub fn mutation_rate(mut self, rate: f64) -> Self {
        self.config.mutation_rate = rate;
        self
    }

    pub fn group_shuffle_rate(mut self, rate: f64) -> Self {
        self.config.group_shuffle_rate = rate;
        self
    }

    pub fn kind(mut self, kind: ChromosomeKind) -> Self {
        self.config.kind = kind;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    pub fn build(self) -> GeneticConfig {
        self.config
    }
}

/// Progress events emitted while the search runs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum GeneticEvent {
    /// Fitness of one generation has been computed.
    GenerationEvaluated {
        generation: usize,
        best_fitness: f64,
        mean_fitness: f64,
    },
    /// The winner has been replayed into the final plan.
    Finished {
        fitness: f64,
        placed: usize,
        unplaced: usize,
    },
}

/// Why a package did not end up in the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnplacedReason {
    DimensionsExceedContainer,
    NoSupportedPosition,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::DimensionsExceedContainer => "dimensions_exceed_container",
            UnplacedReason::NoSupportedPosition => "no_supported_position",
        }
    }
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnplacedReason::DimensionsExceedContainer => {
                write!(f, "Package exceeds the container in at least one dimension")
            }
            UnplacedReason::NoSupportedPosition => write!(
                f,
                "No flat, in-bounds position left for the package in this load order"
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UnplacedBox {
    pub package: Package,
    pub reason: UnplacedReason,
}

/// Result of replaying one load order on a fresh container.
#[derive(Clone, Debug)]
pub struct Replay {
    pub container: Container,
    /// Package indices in placement order, aligned with `container.placed`.
    pub loaded: Vec<usize>,
    pub unplaced: Vec<(usize, UnplacedReason)>,
    /// Depth extent minus the score of the last placed box, `0.0` if nothing was placed.
    pub fitness: f64,
}

/// Replays a load order through search and loader on a fresh container.
///
/// Packages without a feasible position are skipped; they neither stop the
/// replay nor update the score used for fitness.
pub fn replay(
    spec: &ContainerSpec,
    packages: &[Package],
    order: &[usize],
    config: &PackingConfig,
) -> Result<Replay, GeneticError> {
    let mut container = Container::empty(spec)?;
    let mut loaded = Vec::with_capacity(order.len());
    let mut unplaced = Vec::new();
    let mut last_score = None;

    for &index in order {
        let package = &packages[index];
        if !container.can_fit(package, config.general_epsilon) {
            debug!(item_id = package.item_id, "package exceeds container");
            unplaced.push((index, UnplacedReason::DimensionsExceedContainer));
            continue;
        }

        match load_at_best_position(&mut container, package.dimensions(), config)? {
            Some(best) => {
                last_score = Some(best.score);
                loaded.push(index);
            }
            None => {
                debug!(item_id = package.item_id, "no supported position, skipping");
                unplaced.push((index, UnplacedReason::NoSupportedPosition));
            }
        }
    }

    let depth = container.grid.depth_extent();
    let fitness = last_score.map_or(0.0, |score| (depth - score).max(0.0));

    Ok(Replay {
        container,
        loaded,
        unplaced,
        fitness,
    })
}

/// Fitness of a single chromosome.
pub fn fitness(
    spec: &ContainerSpec,
    packages: &[Package],
    chromosome: &Chromosome,
    config: &PackingConfig,
) -> Result<f64, GeneticError> {
    replay(spec, packages, &chromosome.load_order(), config).map(|r| r.fitness)
}

/// Fitness of every chromosome; each replay owns its own container.
pub fn evaluate_population(
    spec: &ContainerSpec,
    packages: &[Package],
    population: &[Chromosome],
    config: &PackingConfig,
    parallel: bool,
) -> Result<Vec<f64>, GeneticError> {
    if parallel {
        population
            .par_iter()
            .map(|chromosome| fitness(spec, packages, chromosome, config))
            .collect()
    } else {
        population
            .iter()
            .map(|chromosome| fitness(spec, packages, chromosome, config))
            .collect()
    }
}

/// Package indices per group id, in input order.
pub fn group_members(packages: &[Package]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, package) in packages.iter().enumerate() {
        groups.entry(package.group_id).or_default().push(index);
    }
    groups
}

/// Builds the initial population.
pub fn initialize_population<R: Rng + ?Sized>(
    packages: &[Package],
    config: &GeneticConfig,
    rng: &mut R,
) -> Vec<Chromosome> {
    match config.kind {
        ChromosomeKind::Permutation => (0..config.population_size)
            .map(|_| {
                let mut order: Vec<usize> = (0..packages.len()).collect();
                order.shuffle(rng);
                Chromosome::Permutation(order)
            })
            .collect(),
        ChromosomeKind::Grouping => {
            let groups = group_members(packages);
            (0..config.population_size)
                .map(|_| {
                    let mut individual = groups.clone();
                    for members in individual.values_mut() {
                        members.shuffle(rng);
                    }
                    Chromosome::Grouping(individual)
                })
                .collect()
        }
    }
}

/// Fitness-proportionate selection with replacement.
///
/// # Errors
/// `GeneticError::DegenerateFitness` if the weights are empty, all zero,
/// negative or not finite
pub fn roulette_select<R: Rng + ?Sized>(
    fitness: &[f64],
    count: usize,
    rng: &mut R,
) -> Result<Vec<usize>, GeneticError> {
    let wheel = WeightedIndex::new(fitness).map_err(|_| GeneticError::DegenerateFitness)?;
    Ok((0..count).map(|_| wheel.sample(rng)).collect())
}

fn uniform_select<R: Rng + ?Sized>(len: usize, count: usize, rng: &mut R) -> Vec<usize> {
    (0..count).map(|_| rng.gen_range(0..len)).collect()
}

/// Keeps `first[..point]` and appends the remaining genes in `second`'s order.
pub fn order_crossover(first: &[usize], second: &[usize], point: usize) -> Vec<usize> {
    let prefix = &first[..point.min(first.len())];
    let mut child = prefix.to_vec();
    child.extend(second.iter().filter(|gene| !prefix.contains(gene)));
    child
}

/// Recombines two parents into two children.
///
/// Permutations use single-point order crossover; groupings take each whole
/// group from one parent or the other.
pub fn crossover<R: Rng + ?Sized>(
    first: &Chromosome,
    second: &Chromosome,
    rng: &mut R,
) -> (Chromosome, Chromosome) {
    match (first, second) {
        (Chromosome::Permutation(a), Chromosome::Permutation(b)) if !a.is_empty() => {
            let point = rng.gen_range(0..a.len());
            (
                Chromosome::Permutation(order_crossover(a, b, point)),
                Chromosome::Permutation(order_crossover(b, a, point)),
            )
        }
        (Chromosome::Grouping(a), Chromosome::Grouping(b)) => {
            let mut left = BTreeMap::new();
            let mut right = BTreeMap::new();
            for (group_id, members) in a {
                let other = b.get(group_id).unwrap_or(members);
                if rng.gen_bool(0.5) {
                    left.insert(*group_id, members.clone());
                    right.insert(*group_id, other.clone());
                } else {
                    left.insert(*group_id, other.clone());
                    right.insert(*group_id, members.clone());
                }
            }
            (Chromosome::Grouping(left), Chromosome::Grouping(right))
        }
        _ => (first.clone(), second.clone()),
    }
}

/// Mutates a chromosome in place.
///
/// Permutations swap two distinct positions with probability `mutation_rate`.
/// Groupings reshuffle each group with probability `group_shuffle_rate`;
/// `mutation_rate` has no effect on them.
pub fn mutate<R: Rng + ?Sized>(chromosome: &mut Chromosome, config: &GeneticConfig, rng: &mut R) {
    match chromosome {
        Chromosome::Permutation(order) => {
            let n = order.len();
            if n < 2 || rng.r#gen::<f64>() >= config.mutation_rate {
                return;
            }
            let i = rng.gen_range(0..n);
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            order.swap(i, j);
        }
        Chromosome::Grouping(groups) => {
            for members in groups.values_mut() {
                if rng.r#gen::<f64>() < config.group_shuffle_rate {
                    members.shuffle(rng);
                }
            }
        }
    }
}

fn best_index(fitness: &[f64]) -> usize {
    fitness
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (index, &value)| {
            if value > best_value {
                (index, value)
            } else {
                (best, best_value)
            }
        })
        .0
}

/// Runs the generational loop and returns the fittest chromosome of the final population.
///
/// Runs exactly `generations` rounds of evaluate, select, crossover and
/// mutate. A generation with degenerate fitness falls back to uniform parent
/// selection.
pub fn run_genetic_algorithm<R: Rng + ?Sized>(
    spec: &ContainerSpec,
    packages: &[Package],
    packing: &PackingConfig,
    genetic: &GeneticConfig,
    rng: &mut R,
    on_event: impl FnMut(&GeneticEvent),
) -> Result<(Chromosome, f64), GeneticError> {
    run_genetic_algorithm_until(spec, packages, packing, genetic, rng, || false, on_event)
}

/// Like [`run_genetic_algorithm`], but checks `should_stop` before every
/// generation and returns [`GeneticError::Cancelled`] once it reports `true`.
pub fn run_genetic_algorithm_until<R: Rng + ?Sized>(
    spec: &ContainerSpec,
    packages: &[Package],
    packing: &PackingConfig,
    genetic: &GeneticConfig,
    rng: &mut R,
    should_stop: impl Fn() -> bool,
    mut on_event: impl FnMut(&GeneticEvent),
) -> Result<(Chromosome, f64), GeneticError> {
    genetic.validate()?;
    let size = genetic.population_size;
    let mut population = initialize_population(packages, genetic, rng);

    for generation in 0..genetic.generations {
        if should_stop() {
            info!(generation, "🛑 Genetic search cancelled");
            return Err(GeneticError::Cancelled { generation });
        }
        let scores = evaluate_population(spec, packages, &population, packing, genetic.parallel)?;
        let best_fitness = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_fitness = scores.iter().sum::<f64>() / scores.len() as f64;
        debug!(generation, best_fitness, mean_fitness, "generation evaluated");
        on_event(&GeneticEvent::GenerationEvaluated {
            generation,
            best_fitness,
            mean_fitness,
        });

        let parents = match roulette_select(&scores, size, rng) {
            Ok(parents) => parents,
            Err(GeneticError::DegenerateFitness) => {
                warn!(generation, "⚠️ Degenerate fitness, selecting parents uniformly");
                uniform_select(size, size, rng)
            }
            Err(err) => return Err(err),
        };

        let mut next = Vec::with_capacity(size + 1);
        for i in (0..size).step_by(2) {
            let first = &population[parents[i]];
            let second = &population[parents[(i + 1) % size]];
            let (mut left, mut right) = crossover(first, second, rng);
            mutate(&mut left, genetic, rng);
            mutate(&mut right, genetic, rng);
            next.push(left);
            next.push(right);
        }
        next.truncate(size);
        population = next;
    }

    let scores = evaluate_population(spec, packages, &population, packing, genetic.parallel)?;
    let winner = best_index(&scores);
    Ok((population.swap_remove(winner), scores[winner]))
}

/// Final loading plan for one container.
#[derive(Clone, Debug)]
pub struct LoadPlan {
    pub spec: ContainerSpec,
    pub chromosome: Option<Chromosome>,
    pub fitness: f64,
    /// Item ids in the order they were offered to the container.
    pub load_order: Vec<usize>,
    pub container: Container,
    /// Loaded packages, aligned with `container.placed`.
    pub loaded: Vec<Package>,
    pub unplaced: Vec<UnplacedBox>,
}

impl LoadPlan {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Pairs every loaded package with its placement.
    pub fn placements(&self) -> impl Iterator<Item = (&Package, &PlacedBox)> {
        self.loaded.iter().zip(self.container.placed.iter())
    }
}

/// Searches a load order for `packages` and replays the winner into a plan.
///
/// The winner is replayed on a container of its own, never one used during
/// the search.
pub fn optimize(
    spec: &ContainerSpec,
    packages: &[Package],
    packing: &PackingConfig,
    genetic: &GeneticConfig,
    on_event: impl FnMut(&GeneticEvent),
) -> Result<LoadPlan, GeneticError> {
    optimize_until(spec, packages, packing, genetic, || false, on_event)
}

/// Cancellable variant of [`optimize`]; see [`run_genetic_algorithm_until`].
pub fn optimize_until(
    spec: &ContainerSpec,
    packages: &[Package],
    packing: &PackingConfig,
    genetic: &GeneticConfig,
    should_stop: impl Fn() -> bool,
    mut on_event: impl FnMut(&GeneticEvent),
) -> Result<LoadPlan, GeneticError> {
    genetic.validate()?;

    if packages.is_empty() {
        on_event(&GeneticEvent::Finished {
            fitness: 0.0,
            placed: 0,
            unplaced: 0,
        });
        return Ok(LoadPlan {
            spec: *spec,
            chromosome: None,
            fitness: 0.0,
            load_order: Vec::new(),
            container: Container::empty(spec)?,
            loaded: Vec::new(),
            unplaced: Vec::new(),
        });
    }

    let mut rng = match genetic.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        packages = packages.len(),
        population = genetic.population_size,
        generations = genetic.generations,
        kind = %genetic.kind,
        "🧬 Starting genetic search"
    );
    let (chromosome, best_fitness) = run_genetic_algorithm_until(
        spec,
        packages,
        packing,
        genetic,
        &mut rng,
        should_stop,
        &mut on_event,
    )?;

    let order = chromosome.load_order();
    let result = replay(spec, packages, &order, packing)?;

    let unplaced: Vec<UnplacedBox> = result
        .unplaced
        .iter()
        .map(|&(index, reason)| UnplacedBox {
            package: packages[index].clone(),
            reason,
        })
        .collect();
    for entry in &unplaced {
        warn!(
            item_id = entry.package.item_id,
            reason = entry.reason.code(),
            "⚠️ Package could not be loaded"
        );
    }

    info!(
        fitness = best_fitness,
        placed = result.loaded.len(),
        unplaced = unplaced.len(),
        "✅ Genetic search finished"
    );
    on_event(&GeneticEvent::Finished {
        fitness: result.fitness,
        placed: result.loaded.len(),
        unplaced: unplaced.len(),
    });

    Ok(LoadPlan {
        spec: *spec,
        fitness: result.fitness,
        load_order: order.iter().map(|&i| packages[i].item_id).collect(),
        loaded: result.loaded.iter().map(|&i| packages[i].clone()).collect(),
        container: result.container,
        chromosome: Some(chromosome),
        unplaced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::intersects;
    use crate::model::{ItemRecord, expand_items};

    fn spec() -> ContainerSpec {
        ContainerSpec::new(120.0, 40.0, 50.0).unwrap()
    }

    fn distinct_packages() -> Vec<Package> {
        expand_items(&[
            ItemRecord::new(13.0, 19.0, 10.0, 1),
            ItemRecord::new(20.0, 21.0, 12.0, 1),
            ItemRecord::new(15.0, 40.0, 8.0, 1),
            ItemRecord::new(30.0, 10.0, 20.0, 1),
            ItemRecord::new(25.0, 15.0, 25.0, 1),
        ])
        .unwrap()
    }

    fn grouped_packages() -> Vec<Package> {
        expand_items(&[
            ItemRecord::new(13.0, 19.0, 10.0, 2),
            ItemRecord::new(20.0, 21.0, 12.0, 2),
            ItemRecord::new(25.0, 15.0, 25.0, 1),
        ])
        .unwrap()
    }

    fn is_permutation(order: &[usize], n: usize) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    fn small_config(kind: ChromosomeKind, parallel: bool) -> GeneticConfig {
        GeneticConfig::builder()
            .population_size(10)
            .generations(5)
            .kind(kind)
            .seed(Some(7))
            .parallel(parallel)
            .build()
    }

    #[test]
    fn permutation_search_returns_valid_permutation() {
        let packages = distinct_packages();
        let config = small_config(ChromosomeKind::Permutation, false);
        let mut rng = StdRng::seed_from_u64(7);

        let (winner, fitness) = run_genetic_algorithm(
            &spec(),
            &packages,
            &PackingConfig::default(),
            &config,
            &mut rng,
            |_| {},
        )
        .unwrap();

        assert_eq!(winner.kind(), ChromosomeKind::Permutation);
        assert!(is_permutation(&winner.load_order(), packages.len()));
        assert!(fitness > 0.0);
    }

    #[test]
    fn grouping_search_preserves_group_membership() {
        let packages = grouped_packages();
        let config = small_config(ChromosomeKind::Grouping, true);
        let mut rng = StdRng::seed_from_u64(11);

        let (winner, _) = run_genetic_algorithm(
            &spec(),
            &packages,
            &PackingConfig::default(),
            &config,
            &mut rng,
            |_| {},
        )
        .unwrap();

        let Chromosome::Grouping(groups) = &winner else {
            panic!("expected grouping chromosome");
        };
        let expected = group_members(&packages);
        assert_eq!(groups.len(), expected.len());
        for (group_id, members) in groups {
            let mut sorted = members.clone();
            sorted.sort_unstable();
            assert_eq!(&sorted, &expected[group_id]);
        }
        assert!(is_permutation(&winner.load_order(), packages.len()));
    }

    #[test]
    fn roulette_with_equal_weights_is_uniform() {
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 8000;
        let picks = roulette_select(&[2.0; 4], draws, &mut rng).unwrap();

        let mut counts = [0usize; 4];
        for pick in picks {
            counts[pick] += 1;
        }
        for count in counts {
            let proportion = count as f64 / draws as f64;
            assert!((proportion - 0.25).abs() < 0.03, "proportion {}", proportion);
        }
    }

    #[test]
    fn roulette_prefers_fitter_candidates() {
        let mut rng = StdRng::seed_from_u64(3);
        let picks = roulette_select(&[1.0, 0.0, 3.0], 4000, &mut rng).unwrap();
        assert!(!picks.contains(&1));
        let share = picks.iter().filter(|&&p| p == 2).count() as f64 / 4000.0;
        assert!((share - 0.75).abs() < 0.05);
    }

    #[test]
    fn roulette_rejects_degenerate_fitness() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            roulette_select(&[0.0, 0.0, 0.0], 3, &mut rng),
            Err(GeneticError::DegenerateFitness)
        );
        assert_eq!(
            roulette_select(&[], 3, &mut rng),
            Err(GeneticError::DegenerateFitness)
        );
        assert_eq!(
            roulette_select(&[1.0, f64::NAN], 3, &mut rng),
            Err(GeneticError::DegenerateFitness)
        );
    }

    #[test]
    fn degenerate_generations_fall_back_to_uniform_selection() {
        // Nothing fits, every fitness is zero.
        let packages = expand_items(&[ItemRecord::new(500.0, 10.0, 10.0, 4)]).unwrap();
        let config = small_config(ChromosomeKind::Permutation, false);
        let mut rng = StdRng::seed_from_u64(5);
        let mut generations = 0;

        let (winner, fitness) = run_genetic_algorithm(
            &spec(),
            &packages,
            &PackingConfig::default(),
            &config,
            &mut rng,
            |event| {
                if let GeneticEvent::GenerationEvaluated { best_fitness, .. } = event {
                    assert_eq!(*best_fitness, 0.0);
                    generations += 1;
                }
            },
        )
        .unwrap();

        assert_eq!(generations, 5);
        assert_eq!(fitness, 0.0);
        assert!(is_permutation(&winner.load_order(), 4));
    }

    #[test]
    fn order_crossover_keeps_prefix_and_relative_order() {
        let first = [0, 1, 2, 3, 4];
        let second = [4, 3, 2, 1, 0];
        assert_eq!(order_crossover(&first, &second, 2), vec![0, 1, 4, 3, 2]);
        assert_eq!(order_crossover(&first, &second, 0), second.to_vec());
        assert_eq!(order_crossover(&second, &first, 3), vec![4, 3, 2, 0, 1]);
    }

    #[test]
    fn permutation_crossover_yields_permutations() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let mut a: Vec<usize> = (0..8).collect();
            let mut b = a.clone();
            a.shuffle(&mut rng);
            b.shuffle(&mut rng);
            let (left, right) = crossover(
                &Chromosome::Permutation(a),
                &Chromosome::Permutation(b),
                &mut rng,
            );
            assert!(is_permutation(&left.load_order(), 8));
            assert!(is_permutation(&right.load_order(), 8));
        }
    }

    #[test]
    fn grouping_crossover_swaps_whole_groups() {
        let a = BTreeMap::from([(0, vec![0, 1, 2]), (1, vec![3, 4])]);
        let b = BTreeMap::from([(0, vec![2, 1, 0]), (1, vec![4, 3])]);
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..20 {
            let (left, right) = crossover(
                &Chromosome::Grouping(a.clone()),
                &Chromosome::Grouping(b.clone()),
                &mut rng,
            );
            let (Chromosome::Grouping(left), Chromosome::Grouping(right)) = (left, right) else {
                panic!("expected grouping children");
            };
            for group_id in [0, 1] {
                let from_a = left[&group_id] == a[&group_id] && right[&group_id] == b[&group_id];
                let from_b = left[&group_id] == b[&group_id] && right[&group_id] == a[&group_id];
                assert!(from_a || from_b);
            }
        }
    }

    #[test]
    fn swap_mutation_respects_rate() {
        let mut rng = StdRng::seed_from_u64(13);
        let original: Vec<usize> = (0..6).collect();

        let never = GeneticConfig::builder().mutation_rate(0.0).build();
        let mut chromosome = Chromosome::Permutation(original.clone());
        mutate(&mut chromosome, &never, &mut rng);
        assert_eq!(chromosome.load_order(), original);

        let always = GeneticConfig::builder().mutation_rate(1.0).build();
        let mut chromosome = Chromosome::Permutation(original.clone());
        mutate(&mut chromosome, &always, &mut rng);
        let mutated = chromosome.load_order();
        let changed = mutated
            .iter()
            .zip(&original)
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(changed, 2);
        assert!(is_permutation(&mutated, 6));
    }

    #[test]
    fn group_mutation_ignores_mutation_rate() {
        let mut rng = StdRng::seed_from_u64(17);
        let groups = BTreeMap::from([(0, vec![0, 1, 2, 3, 4, 5, 6, 7])]);
        let config = GeneticConfig::builder()
            .mutation_rate(1.0)
            .group_shuffle_rate(0.0)
            .build();

        let mut chromosome = Chromosome::Grouping(groups.clone());
        mutate(&mut chromosome, &config, &mut rng);
        assert_eq!(chromosome, Chromosome::Grouping(groups));
    }

    #[test]
    fn replay_fitness_uses_last_placed_score() {
        let spec = ContainerSpec::new(80.0, 40.0, 30.0).unwrap();
        let packages = expand_items(&[ItemRecord::new(13.0, 19.0, 10.0, 1)]).unwrap();

        let result = replay(&spec, &packages, &[0], &PackingConfig::default()).unwrap();
        assert_eq!(result.loaded, vec![0]);
        assert!((result.fitness - (80.0 - 13.0)).abs() < 1e-3);
    }

    #[test]
    fn replay_skips_infeasible_packages() {
        let spec = ContainerSpec::new(80.0, 40.0, 30.0).unwrap();
        let packages = expand_items(&[
            ItemRecord::new(13.0, 50.0, 10.0, 1),
            ItemRecord::new(80.0, 40.0, 30.0, 2),
        ])
        .unwrap();

        let result = replay(&spec, &packages, &[0, 1, 2], &PackingConfig::default()).unwrap();
        assert_eq!(result.loaded, vec![1]);
        assert_eq!(
            result.unplaced,
            vec![
                (0, UnplacedReason::DimensionsExceedContainer),
                (2, UnplacedReason::NoSupportedPosition),
            ]
        );
        assert!(result.fitness.abs() < 1e-3);

        let nothing = replay(&spec, &packages, &[0], &PackingConfig::default()).unwrap();
        assert_eq!(nothing.fitness, 0.0);
        assert!(nothing.container.placed.is_empty());
    }

    #[test]
    fn optimize_produces_consistent_plan_and_events() {
        let packages = distinct_packages();
        let config = small_config(ChromosomeKind::Permutation, true);
        let mut events = Vec::new();

        let plan = optimize(
            &spec(),
            &packages,
            &PackingConfig::default(),
            &config,
            |event| events.push(event.clone()),
        )
        .unwrap();

        assert!(plan.is_complete());
        assert_eq!(plan.loaded.len(), packages.len());
        assert_eq!(plan.placements().count(), packages.len());
        assert!(is_permutation(&plan.load_order, packages.len()));
        for (i, a) in plan.container.placed.iter().enumerate() {
            for b in &plan.container.placed[i + 1..] {
                assert!(!intersects(a, b));
            }
        }

        let generations = events
            .iter()
            .filter(|e| matches!(e, GeneticEvent::GenerationEvaluated { .. }))
            .count();
        assert_eq!(generations, 5);
        assert_eq!(
            events.last(),
            Some(&GeneticEvent::Finished {
                fitness: plan.fitness,
                placed: packages.len(),
                unplaced: 0,
            })
        );
    }

    #[test]
    fn optimize_is_reproducible_with_seed() {
        let packages = grouped_packages();
        let config = small_config(ChromosomeKind::Grouping, true);
        let packing = PackingConfig::default();

        let first = optimize(&spec(), &packages, &packing, &config, |_| {}).unwrap();
        let second = optimize(&spec(), &packages, &packing, &config, |_| {}).unwrap();
        assert_eq!(first.chromosome, second.chromosome);
        assert_eq!(first.fitness, second.fitness);
    }

    #[test]
    fn optimize_handles_empty_input() {
        let plan = optimize(
            &spec(),
            &[],
            &PackingConfig::default(),
            &GeneticConfig::default(),
            |_| {},
        )
        .unwrap();
        assert!(plan.chromosome.is_none());
        assert!(plan.container.placed.is_empty());
        assert_eq!(plan.fitness, 0.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let zero = GeneticConfig::builder().population_size(0).build();
        assert!(matches!(zero.validate(), Err(GeneticError::InvalidConfig(_))));
        let rate = GeneticConfig::builder().mutation_rate(1.5).build();
        assert!(matches!(rate.validate(), Err(GeneticError::InvalidConfig(_))));
        assert!(GeneticConfig::default().validate().is_ok());
    }

    #[test]
    fn oversized_population_and_generations_are_rejected() {
        let population = GeneticConfig::builder()
            .population_size(1usize << 44)
            .build();
        assert!(matches!(
            population.validate(),
            Err(GeneticError::InvalidConfig(_))
        ));

        let generations = GeneticConfig::builder()
            .generations(GeneticConfig::MAX_GENERATIONS + 1)
            .build();
        assert!(matches!(
            generations.validate(),
            Err(GeneticError::InvalidConfig(_))
        ));

        let at_limit = GeneticConfig::builder()
            .population_size(GeneticConfig::MAX_POPULATION_SIZE)
            .generations(GeneticConfig::MAX_GENERATIONS)
            .build();
        assert!(at_limit.validate().is_ok());

        let err = optimize(
            &spec(),
            &distinct_packages(),
            &PackingConfig::default(),
            &population,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, GeneticError::InvalidConfig(_)));
    }

    #[test]
    fn search_stops_once_cancelled() {
        use std::cell::Cell;

        let packages = grouped_packages();
        let config = GeneticConfig::builder()
            .population_size(6)
            .generations(50)
            .seed(Some(3))
            .build();
        let evaluated = Cell::new(0usize);
        let mut events = 0usize;

        let err = optimize_until(
            &spec(),
            &packages,
            &PackingConfig::default(),
            &config,
            || evaluated.get() >= 2,
            |event| {
                events += 1;
                if matches!(event, GeneticEvent::GenerationEvaluated { .. }) {
                    evaluated.set(evaluated.get() + 1);
                }
            },
        )
        .unwrap_err();

        assert_eq!(err, GeneticError::Cancelled { generation: 2 });
        assert_eq!(events, 2);
    }

    #[test]
    fn search_runs_to_completion_when_not_cancelled() {
        let packages = grouped_packages();
        let config = small_config(ChromosomeKind::Grouping, false);
        let plan = optimize_until(
            &spec(),
            &packages,
            &PackingConfig::default(),
            &config,
            || false,
            |_| {},
        )
        .unwrap();
        assert!(plan.chromosome.is_some());
    }

    #[test]
    fn chromosome_kind_parses() {
        assert_eq!(
            "Permutation".parse::<ChromosomeKind>(),
            Ok(ChromosomeKind::Permutation)
        );
        assert_eq!(" grouping ".parse::<ChromosomeKind>(), Ok(ChromosomeKind::Grouping));
        assert!("random".parse::<ChromosomeKind>().is_err());
    }
}
