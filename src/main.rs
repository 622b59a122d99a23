use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use snakefall::{
    levels,
    models::EngineOptions,
    playback, playback_generator,
    solver::{self, SolveOptions, SolveOutcome},
    validate_levels_toml, verify, verify_all,
};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Rule switches layered on top of the level's `levels.toml` options.
#[derive(ClapArgs, Debug, Default, Clone, Copy)]
struct RuleFlags {
    /// Bodies leaving an edge re-enter from the opposite edge
    #[arg(long)]
    fall_through: bool,

    /// Rotate gravity clockwise whenever a fruit is eaten
    #[arg(long)]
    gravity_on_fruit: bool,

    /// Let a pushing snake vacate its tail before the push resolves
    #[arg(long)]
    moving_without_space: bool,

    /// Let a head move into its own tail cell
    #[arg(long)]
    tail_biting: bool,
}

impl RuleFlags {
    fn apply(self, mut options: EngineOptions) -> EngineOptions {
        options.fall_through |= self.fall_through;
        options.change_gravity_on_fruit |= self.gravity_on_fruit;
        options.allow_moving_without_space |= self.moving_without_space;
        options.allow_tail_biting |= self.tail_biting;
        options
    }
}

/// Solver budget shared by `solve` and `generate-playbacks`.
#[derive(ClapArgs, Debug, Clone, Copy)]
struct Budget {
    /// Give up after this many milliseconds
    #[arg(long, default_value_t = 10_000)]
    time_limit_ms: u64,

    /// Do not expand states deeper than this many moves
    #[arg(long, default_value_t = solver::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

impl Budget {
    fn solve_options(self, engine: EngineOptions) -> SolveOptions {
        SolveOptions {
            engine,
            time_limit: Duration::from_millis(self.time_limit_ms),
            max_depth: self.max_depth,
            cancel: None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for the shortest solution of a level
    Solve {
        /// Path to the level text file
        level: PathBuf,

        /// Write the solution as a playback JSON file
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        rules: RuleFlags,

        #[command(flatten)]
        budget: Budget,
    },

    /// Verify that a level is solved by its playback file
    Verify {
        /// Path to the level text file
        level: PathBuf,

        /// Optional explicit playback file path
        #[arg(long)]
        playback: Option<PathBuf>,

        #[command(flatten)]
        rules: RuleFlags,
    },

    /// Print every intermediate state of a playback
    Replay {
        /// Path to the level text file
        level: PathBuf,

        /// Path to the playback JSON file
        playback: PathBuf,

        #[command(flatten)]
        rules: RuleFlags,
    },

    /// Verify all levels in all difficulty folders
    VerifyAll,

    /// Solve every listed level and write its playback
    GeneratePlaybacks {
        /// Optional difficulty filter (easy, medium, or hard)
        #[arg(long)]
        difficulty: Option<String>,

        #[command(flatten)]
        budget: Budget,
    },

    /// Validate levels.toml files for all difficulties
    ValidateLevelsToml,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Solve {
            level,
            output,
            rules,
            budget,
        } => run_solve(&level, output.as_deref(), rules, budget),
        Command::Verify {
            level,
            playback,
            rules,
        } => {
            let playback_path = verify::resolve_playback_path(&level, playback)
                .with_context(|| "Failed to resolve playback path")?;
            let options = rules.apply(levels::options_for_level(&level)?);
            let result = verify::verify_level(&level, &playback_path, &options);
            levels::update_solved_status(&level, result.is_ok())
                .with_context(|| "Failed to update levels.toml metadata")?;
            if result.is_ok() {
                println!("Level solved by {}", playback_path.display());
            }
            result
        },
        Command::Replay {
            level,
            playback,
            rules,
        } => {
            let options = rules.apply(levels::options_for_level(&level)?);
            let frames = verify::replay_frames(&level, &playback, &options)?;
            for (index, frame) in frames.iter().enumerate() {
                println!("-- state {index} --");
                println!("{frame}");
            }
            Ok(())
        },
        Command::VerifyAll => verify_all::run_verify_all(),
        Command::GeneratePlaybacks { difficulty, budget } => {
            let budget = budget.solve_options(EngineOptions::default());
            playback_generator::run_generate_playbacks(difficulty.as_deref(), &budget)
        },
        Command::ValidateLevelsToml => validate_levels_toml::run_validate_levels_toml(),
    }
}

fn run_solve(
    level_path: &Path,
    output: Option<&Path>,
    rules: RuleFlags,
    budget: Budget,
) -> Result<()> {
    let level = levels::load_level(level_path)?;
    let options = budget.solve_options(rules.apply(levels::options_for_level(level_path)?));
    let report = solver::solve(&level, &options)
        .with_context(|| format!("Solver failed on {}", level_path.display()))?;

    println!("Outcome: {}", report.outcome.label());
    println!("States seen: {}", report.states_seen);
    println!("Last depth: {}", report.last_depth);
    if report.outcome != SolveOutcome::SolutionFound {
        bail!("No solution found for {}", level_path.display());
    }

    println!("Solution length: {}", report.solution_length);
    for (index, step) in report.path.iter().enumerate() {
        println!("  {:>3}. {step}", index + 1);
    }
    if let Some(output) = output {
        playback::write_playback(output, &report.path)?;
        println!("Playback written to {}", output.display());
    }
    Ok(())
}
