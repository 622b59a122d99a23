use anyhow::{bail, Context, Result};
use clap::Parser;
use snakefall::levels::{self, LEVEL_EXTENSION};
use snakefall::solver::{self, SolveOptions, SolveOutcome};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

#[derive(Parser, Debug)]
#[command(name = "profile_solver")]
#[command(about = "Benchmark the breadth-first solver across level fixtures")]
struct Args {
    /// Root directory containing difficulty subfolders (easy/medium/hard)
    #[arg(long, default_value = "levels")]
    levels_root: PathBuf,

    /// Number of repeated runs for each level
    #[arg(long, default_value = "3")]
    iterations: usize,

    /// Maximum search depth passed to the solver
    #[arg(short = 'd', long = "max-depth", default_value = "500")]
    max_depth: usize,

    /// Per-solve time limit in milliseconds
    #[arg(long = "time-limit-ms", default_value = "10000")]
    time_limit_ms: u64,

    /// Comma-delimited difficulty list, e.g. easy,medium
    #[arg(long, value_delimiter = ',', default_value = "easy,medium,hard")]
    difficulties: Vec<String>,
}

#[derive(Debug, Clone)]
struct LevelTarget {
    difficulty: String,
    path: PathBuf,
}

#[derive(Debug, Default, Clone, Copy)]
struct LevelStats {
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
    runs: usize,
    states: usize,
    moves: Option<usize>,
    unsolved: usize,
}

impl LevelStats {
    fn record(&mut self, elapsed: Duration, states: usize, moves: Option<usize>) {
        self.total += elapsed;
        self.runs += 1;
        self.states = self.states.max(states);
        self.min = Some(self.min.map_or(elapsed, |current| current.min(elapsed)));
        self.max = Some(self.max.map_or(elapsed, |current| current.max(elapsed)));
        match moves {
            Some(moves) => self.moves = Some(moves),
            None => self.unsolved += 1,
        }
    }

    fn avg_ms(self) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        duration_ms(self.total) / self.runs as f64
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.iterations == 0 {
        bail!("--iterations must be greater than zero");
    }

    let normalized_difficulties = normalize_difficulties(&args.difficulties);
    if normalized_difficulties.is_empty() {
        bail!("No valid difficulties provided");
    }

    let targets = discover_levels(&args.levels_root, &normalized_difficulties)?;
    if targets.is_empty() {
        bail!(
            "No .{LEVEL_EXTENSION} level files found under {}",
            args.levels_root.display()
        );
    }

    let budget = SolveOptions {
        time_limit: Duration::from_millis(args.time_limit_ms),
        max_depth: args.max_depth,
        ..SolveOptions::default()
    };
    let total_solves = targets.len() * args.iterations;
    let mut level_stats: BTreeMap<PathBuf, LevelStats> = BTreeMap::new();
    let mut difficulty_totals: BTreeMap<String, Duration> = BTreeMap::new();
    let total_start = Instant::now();

    for _ in 0..args.iterations {
        for target in &targets {
            let level = levels::load_level(&target.path)?;
            let options = SolveOptions {
                engine: levels::options_for_level(&target.path)?,
                ..budget.clone()
            };

            let level_start = Instant::now();
            let report = solver::solve(&level, &options).with_context(|| {
                format!(
                    "Solver failed on {} (difficulty {})",
                    target.path.display(),
                    target.difficulty
                )
            })?;
            let elapsed = level_start.elapsed();

            let moves = (report.outcome == SolveOutcome::SolutionFound)
                .then_some(report.solution_length);
            level_stats
                .entry(target.path.clone())
                .or_default()
                .record(elapsed, report.states_seen, moves);
            *difficulty_totals
                .entry(target.difficulty.clone())
                .or_default() += elapsed;
        }
    }

    let wall_time = total_start.elapsed();
    println!("Solver benchmark");
    println!("levels root: {}", args.levels_root.display());
    println!("difficulties: {}", normalized_difficulties.join(","));
    println!("iterations per level: {}", args.iterations);
    println!("max depth: {}", args.max_depth);
    println!("time limit: {} ms", args.time_limit_ms);
    println!("levels benchmarked: {}", targets.len());
    println!("total solves: {}", total_solves);
    println!("wall time: {:.3} s", duration_s(wall_time));
    println!(
        "mean solve time: {:.3} ms",
        duration_ms(wall_time) / total_solves as f64
    );

    println!("\nPer-difficulty cumulative time:");
    for difficulty in &normalized_difficulties {
        let total = difficulty_totals
            .get(difficulty)
            .copied()
            .unwrap_or(Duration::ZERO);
        println!("  - {}: {:.3} s", difficulty, duration_s(total));
    }

    let unsolved: Vec<&PathBuf> = level_stats
        .iter()
        .filter(|(_, stats)| stats.unsolved > 0)
        .map(|(path, _)| path)
        .collect();
    if !unsolved.is_empty() {
        println!("\nUnsolved within budget:");
        for path in unsolved {
            println!("  - {}", path.display());
        }
    }

    let mut hotspots: Vec<(&PathBuf, &LevelStats)> = level_stats.iter().collect();
    hotspots.sort_by(|a, b| {
        b.1.total
            .cmp(&a.1.total)
            .then_with(|| a.0.as_os_str().cmp(b.0.as_os_str()))
    });

    println!("\nHotspot summary (top 3 by cumulative time):");
    for (index, (path, stats)) in hotspots.into_iter().take(3).enumerate() {
        let moves = stats
            .moves
            .map_or_else(|| "-".to_string(), |moves| moves.to_string());
        println!(
            "  {}. {} | total {:.3} s | avg {:.3} ms | min {:.3} ms | max {:.3} ms | states {} | moves {}",
            index + 1,
            path.display(),
            duration_s(stats.total),
            stats.avg_ms(),
            duration_ms(stats.min.unwrap_or_default()),
            duration_ms(stats.max.unwrap_or_default()),
            stats.states,
            moves
        );
    }

    Ok(())
}

fn discover_levels(levels_root: &Path, difficulties: &[String]) -> Result<Vec<LevelTarget>> {
    let mut targets = Vec::new();

    for difficulty in difficulties {
        let difficulty_dir = levels_root.join(difficulty);
        if !difficulty_dir.exists() {
            bail!(
                "Difficulty directory not found: {}",
                difficulty_dir.display()
            );
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&difficulty_dir)
            .with_context(|| format!("Failed to read {}", difficulty_dir.display()))?
        {
            let path = entry
                .with_context(|| format!("Failed to read entry in {}", difficulty_dir.display()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(LEVEL_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();

        targets.extend(files.into_iter().map(|path| LevelTarget {
            difficulty: difficulty.clone(),
            path,
        }));
    }

    Ok(targets)
}

fn normalize_difficulties(raw_difficulties: &[String]) -> Vec<String> {
    let mut normalized = Vec::new();

    for difficulty in raw_difficulties {
        let trimmed = difficulty.trim().to_lowercase();
        if trimmed.is_empty() {
            continue;
        }
        if !normalized.iter().any(|existing| existing == &trimmed) {
            normalized.push(trimmed);
        }
    }

    normalized
}

fn duration_s(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
