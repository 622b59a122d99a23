use crate::engine::{self, EngineError, MoveResult, Outcome};
use crate::models::{Direction, EngineOptions, Move};
use crate::state::{GameState, GameStatus};
use anyhow::{bail, Result};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_DEPTH: usize = 500;

/// Cooperative stop signal, checked once per dequeued state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub engine: EngineOptions,
    pub time_limit: Duration,
    pub max_depth: usize,
    pub cancel: Option<CancelToken>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            engine: EngineOptions::default(),
            time_limit: DEFAULT_TIME_LIMIT,
            max_depth: DEFAULT_MAX_DEPTH,
            cancel: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolveOutcome {
    SolutionFound,
    NotPossible,
    TimeLimitReached,
    DepthLimitReached,
    Cancelled,
}

impl SolveOutcome {
    pub fn label(self) -> &'static str {
        match self {
            SolveOutcome::SolutionFound => "solution found",
            SolveOutcome::NotPossible => "not possible",
            SolveOutcome::TimeLimitReached => "time limit reached",
            SolveOutcome::DepthLimitReached => "depth limit reached",
            SolveOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolveReport {
    pub outcome: SolveOutcome,
    pub states_seen: usize,
    pub last_depth: usize,
    pub solution_length: usize,
    pub path: Vec<Move>,
}

/// One explored move: the move taken and the move that led to its origin.
#[derive(Clone, Copy, Debug)]
struct MoveRecord {
    parent: Option<usize>,
    step: Move,
}

struct Frontier {
    state: GameState,
    parent: Option<usize>,
    depth: usize,
}

/// Breadth-first search for the shortest winning move list.
pub fn solve(initial: &GameState, options: &SolveOptions) -> Result<SolveReport, EngineError> {
    let start = Instant::now();
    let mut history: Vec<MoveRecord> = Vec::new();
    let mut visited: HashMap<String, Option<usize>> = HashMap::new();
    let mut queue: VecDeque<Frontier> = VecDeque::new();
    let mut depth_cut = false;
    let mut last_depth = 0;

    visited.insert(initial.serialize(), None);
    if initial.status() == GameStatus::Won {
        return Ok(report(SolveOutcome::SolutionFound, &visited, 0, Vec::new()));
    }
    queue.push_back(Frontier {
        state: initial.clone(),
        parent: None,
        depth: 0,
    });

    while let Some(entry) = queue.pop_front() {
        if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Ok(report(SolveOutcome::Cancelled, &visited, last_depth, Vec::new()));
        }
        if start.elapsed() >= options.time_limit {
            log::info!("time limit hit after {} states", visited.len());
            return Ok(report(
                SolveOutcome::TimeLimitReached,
                &visited,
                last_depth,
                Vec::new(),
            ));
        }
        if entry.depth > last_depth {
            log::debug!(
                "depth {} reached, {} states seen, {} queued",
                entry.depth,
                visited.len(),
                queue.len()
            );
        }
        last_depth = entry.depth;
        if entry.depth >= options.max_depth {
            depth_cut = true;
            continue;
        }

        for (snake, body) in entry.state.snakes().iter().enumerate() {
            for direction in Direction::ALL {
                let MoveResult::Applied(transition) =
                    engine::apply_move(&entry.state, snake, direction, &options.engine)?
                else {
                    continue;
                };
                let key = transition.state.serialize();
                if visited.contains_key(&key) {
                    continue;
                }

                let index = history.len();
                history.push(MoveRecord {
                    parent: entry.parent,
                    step: Move {
                        snake: body.label,
                        direction,
                    },
                });
                visited.insert(key, Some(index));

                match transition.outcome {
                    Outcome::Won => {
                        let path = reconstruct(&history, index);
                        log::info!(
                            "solved in {} moves after {} states",
                            path.len(),
                            visited.len()
                        );
                        return Ok(report(
                            SolveOutcome::SolutionFound,
                            &visited,
                            entry.depth + 1,
                            path,
                        ));
                    },
                    Outcome::InProgress => queue.push_back(Frontier {
                        state: transition.state,
                        parent: Some(index),
                        depth: entry.depth + 1,
                    }),
                    Outcome::LostFell | Outcome::LostEndlessLoop => {},
                }
            }
        }
    }

    let outcome = if depth_cut {
        SolveOutcome::DepthLimitReached
    } else {
        SolveOutcome::NotPossible
    };
    log::info!("{} after {} states", outcome.label(), visited.len());
    Ok(report(outcome, &visited, last_depth, Vec::new()))
}

fn report(
    outcome: SolveOutcome,
    visited: &HashMap<String, Option<usize>>,
    last_depth: usize,
    path: Vec<Move>,
) -> SolveReport {
    SolveReport {
        outcome,
        states_seen: visited.len(),
        last_depth,
        solution_length: path.len(),
        path,
    }
}

fn reconstruct(history: &[MoveRecord], last: usize) -> Vec<Move> {
    let mut path = Vec::new();
    let mut cursor = Some(last);
    while let Some(index) = cursor {
        path.push(history[index].step);
        cursor = history[index].parent;
    }
    path.reverse();
    path
}

/// Solves `level` and returns the move list, or fails with the reason.
pub fn solve_level(level: &GameState, options: &SolveOptions) -> Result<Vec<Move>> {
    let report = solve(level, options)?;
    match report.outcome {
        SolveOutcome::SolutionFound => Ok(report.path),
        SolveOutcome::DepthLimitReached => {
            bail!("No solution found within depth {}", options.max_depth)
        },
        SolveOutcome::TimeLimitReached => bail!(
            "No solution found within {} ms",
            options.time_limit.as_millis()
        ),
        SolveOutcome::NotPossible => bail!("No solution found"),
        SolveOutcome::Cancelled => bail!("Search cancelled"),
    }
}
