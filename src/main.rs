use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context};
use neighbor_search::config::{read_config, read_config_from, Config};
use neighbor_search::{find_neighbors, generate_positions, NeighborGrid, Particles};
use tracing::{debug, info, Level};

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Above this many entries only `SHORT_LISTING` are logged.
const MAX_LISTING: usize = 100;
const SHORT_LISTING: usize = 10;

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let config = match std::env::args_os().nth(1) {
        Some(path) => read_config_from(Path::new(&path)),
        None => read_config(),
    }
    .context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .init();

    let Config {
        grid: grid_config,
        seed,
        record_neighbor_lists,
        iterations,
        ..
    } = config;
    info!(?grid_config, seed, record_neighbor_lists, iterations, "starting");

    let mut grid = NeighborGrid::new(&grid_config)?;
    let positions = generate_positions(&grid_config, seed);
    let mut particles = Particles::new(positions, record_neighbor_lists)?;

    find_neighbors(&mut grid, &mut particles)?;
    log_grid(&grid);
    log_neighbors(&particles);

    if record_neighbor_lists {
        particles.count_neighbors_brute_force(grid.cell_length());
        let missed = particles.check()?;
        if !missed.is_empty() {
            bail!("grid search missed {} neighbors", missed.len());
        }
    }

    if iterations > 0 {
        benchmark(&mut grid, &mut particles, iterations)?;
    }
    Ok(())
}

fn listing_len(len: usize) -> usize {
    if len > MAX_LISTING {
        SHORT_LISTING
    } else {
        len
    }
}

fn log_grid(grid: &NeighborGrid) {
    let pairs = grid.index_cell_pairs();
    for pair in &pairs[..listing_len(pairs.len())] {
        debug!(cell = pair.cell, index = pair.index, "sorted pair");
    }
    for (cell, range) in grid.cell_ranges().take(listing_len(grid.cell_count())) {
        match range {
            Some(range) => debug!(cell, start = range.start, end = range.end, "cell"),
            None => debug!(cell, "cell empty"),
        }
    }
}

fn log_neighbors(particles: &Particles) {
    let lists = particles.neighbor_lists();
    for (particle, &count) in particles
        .neighbor_count()
        .iter()
        .enumerate()
        .take(listing_len(particles.len()))
    {
        if particles.records_neighbor_lists() {
            info!(particle, count, neighbors = ?lists[particle], "neighbors");
        } else {
            info!(particle, count, "neighbors");
        }
    }
}

/// Time `iterations` grid searches against as many brute force searches.
fn benchmark(
    grid: &mut NeighborGrid,
    particles: &mut Particles,
    iterations: usize,
) -> anyhow::Result<()> {
    info!(iterations, "running grid and brute force search");

    let start = Instant::now();
    for _ in 0..iterations {
        find_neighbors(grid, particles)?;
    }
    let grid_time = start.elapsed();

    let start = Instant::now();
    for _ in 0..iterations {
        particles.count_neighbors_brute_force(grid.cell_length());
    }
    let brute_force_time = start.elapsed();

    let speedup = brute_force_time.as_secs_f64() / grid_time.as_secs_f64();
    let density = particles.len() as f64 / grid.non_buffer_cell_estimate().max(1) as f64;
    info!(?grid_time, ?brute_force_time, "search times");
    info!("grid search is {speedup:.1}x faster than brute force");
    info!("{density:.2} particles per non buffer cell, speedup shrinks with density");
    Ok(())
}
