//! Path search and automatic tracing on a synthetic 3D neuron.
//!
//! Run: cargo run --bin trace-demo [seed]

use std::error::Error;
use std::time::Instant;

use tracing_subscriber::EnvFilter;
use voxtrace_core::ImageStats;
use voxtrace_demos::{SOMA, TRUNK_TIP, synthetic_neuron};
use voxtrace_search::{
    AStarSearch, BackendChoice, BidirectionalSearch, Euclidean, FillConfig, FloodFill,
    GwdtTracer, Reciprocal, SearchConfig, SearchOutcome, TracerConfig, Tubeness, TubenessCost,
};

fn report(name: &str, outcome: &SearchOutcome) {
    let stats = &outcome.stats;
    match &outcome.path {
        Some(path) => println!(
            "{name:<14} {:>9.2} {} {:>5} pts  {:>8} explored  {:?} ({})",
            path.length(),
            path.calibration().unit,
            path.len(),
            stats.points_explored(),
            stats.elapsed,
            stats.backend.map_or_else(|| "-".to_string(), |b| b.to_string()),
        ),
        None => println!("{name:<14} {}", outcome.status),
    }
}

fn run_with(
    volume: &voxtrace_core::Volume,
    stats: &ImageStats,
    backend: BackendChoice,
) -> Result<(), Box<dyn Error>> {
    let config = SearchConfig::default().with_backend(backend);
    let cost = Reciprocal::new(stats.min, stats.max);
    println!("-- backend: {backend}");

    let mut astar = AStarSearch::new(volume, SOMA, TRUNK_TIP, cost, Euclidean, config.clone())?;
    report("A*", &astar.run()?);
    astar.dispose()?;

    let mut nba = BidirectionalSearch::new(volume, SOMA, TRUNK_TIP, cost, Euclidean, config.clone())?;
    let outcome = nba.run()?;
    report("bidirectional", &outcome);
    if let Some(meeting) = nba.meeting_point() {
        println!("{:<14} met at {meeting}", "");
    }
    nba.dispose()?;

    let mut fill = FloodFill::new(
        volume,
        vec![SOMA],
        cost,
        FillConfig::default()
            .with_threshold(2.0)
            .with_search(config.clone()),
    )?;
    let started = Instant::now();
    let first = fill.run()?;
    let extended = fill.extend(4.0)?;
    println!(
        "{:<14} {} voxels within 2.0, {} within 4.0, max distance {:.3}  {:?}",
        "fill",
        first.stats.closed,
        extended.stats.closed,
        extended.max_distance,
        started.elapsed(),
    );
    fill.dispose()?;

    let tracer = GwdtTracer::new(volume, SOMA, TracerConfig::default().with_search(config))?;
    let trace = tracer.run()?;
    let tree = &trace.tree;
    println!(
        "{:<14} {} nodes, {} branch points, {} leaves, {:.2} {} total, threshold {:.1}  {:?}",
        "trace",
        tree.len(),
        tree.branch_points().len(),
        tree.leaves().len(),
        tree.total_length(),
        tree.calibration().unit,
        trace.threshold,
        trace.stats.elapsed,
    );
    println!(
        "{:<14} {} segments kept, {} rejected, {} of {} foreground voxels reached",
        "",
        trace.stats.segments_kept,
        trace.stats.segments_rejected,
        trace.stats.reached,
        trace.stats.foreground,
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    // `log` records from the library are bridged into the subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let seed = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 7,
    };

    let volume = synthetic_neuron(seed)?;
    let stats = ImageStats::compute(&volume);
    println!(
        "volume {}x{}x{} (seed {seed}): min {:.1} max {:.1} mean {:.1} sd {:.1}",
        volume.width(),
        volume.height(),
        volume.depth(),
        stats.min,
        stats.max,
        stats.mean,
        stats.std_dev,
    );

    let tubes = Tubeness::new([1.0])?.apply(&volume)?;
    let mut on_tubes = AStarSearch::new(
        &tubes,
        SOMA,
        TRUNK_TIP,
        TubenessCost::default(),
        Euclidean,
        SearchConfig::default(),
    )?;
    report("A* tubeness", &on_tubes.run()?);
    on_tubes.dispose()?;

    run_with(&volume, &stats, BackendChoice::Auto)?;
    run_with(&volume, &stats, BackendChoice::Disk)?;
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
