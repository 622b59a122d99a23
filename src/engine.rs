use crate::fall::{self, BodyShift, FallReport, Scope, Teleport};
use crate::models::{BodyRef, Cell, Direction, EngineOptions, Move, Position, Terrain};
use crate::state::{GameState, GameStatus, IdRemap};
use std::collections::HashSet;
use std::fmt;

/// Resolution passes allowed within one move before the engine gives up.
pub const MAX_FALL_PASSES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvariantViolation(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvariantViolation(reason) => {
                write!(f, "Engine invariant violated: {reason}")
            },
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Won,
    LostEndlessLoop,
    LostFell,
    InProgress,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Won => "won",
            Outcome::LostEndlessLoop => "lost (endless loop)",
            Outcome::LostFell => "lost (fell)",
            Outcome::InProgress => "in progress",
        }
    }

    fn status(self) -> GameStatus {
        match self {
            Outcome::Won => GameStatus::Won,
            Outcome::LostEndlessLoop | Outcome::LostFell => GameStatus::Lost,
            Outcome::InProgress => GameStatus::NotOver,
        }
    }
}

/// Body positions changed by one resolution pass. Indices refer to the
/// arenas before `Transition::remap` is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepDiff {
    pub shifts: Vec<BodyShift>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub ate_fruit: bool,
    pub outcome: Outcome,
    pub steps: Vec<StepDiff>,
    pub state: GameState,
    pub remap: IdRemap,
    /// Cell that stopped a teleport during this move, if any.
    pub portal_blocked: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    Rejected,
    Applied(Box<Transition>),
}

impl MoveResult {
    pub fn transition(&self) -> Option<&Transition> {
        match self {
            MoveResult::Rejected => None,
            MoveResult::Applied(transition) => Some(transition),
        }
    }
}

/// What happened to snakes over the course of one move.
#[derive(Debug, Default)]
struct Tally {
    fell: bool,
    portal_blocked: Option<Position>,
}

impl Tally {
    fn absorb(&mut self, report: &FallReport) {
        for (snake, cause) in &report.deaths {
            log::trace!("snake {snake} died: {cause:?}");
            self.fell = true;
        }
        if let Some((_, at)) = report.teleport_blocked.first() {
            self.portal_blocked.get_or_insert(*at);
        }
    }

    /// Terminal outcome reached so far, highest priority first.
    fn terminal(&self, state: &GameState) -> Option<Outcome> {
        if !self.fell && state.live_snake_count() == 0 {
            Some(Outcome::Won)
        } else if self.fell {
            Some(Outcome::LostFell)
        } else {
            None
        }
    }
}

/// Moves the snake labelled `mv.snake`; unknown labels are rejected.
pub fn apply(
    state: &GameState,
    mv: Move,
    options: &EngineOptions,
) -> Result<MoveResult, EngineError> {
    match state.snake_index(mv.snake) {
        Some(snake) => apply_move(state, snake, mv.direction, options),
        None => Ok(MoveResult::Rejected),
    }
}

/// Computes the full consequence of moving snake `snake` one step. The
/// input state is never touched; a rejected move has no effect at all.
/// An index past the snake arena is a caller bug and fails loudly.
pub fn apply_move(
    state: &GameState,
    snake: usize,
    direction: Direction,
    options: &EngineOptions,
) -> Result<MoveResult, EngineError> {
    if snake >= state.snakes().len() {
        return Err(EngineError::InvariantViolation(format!(
            "snake index {snake} out of range for {} snakes",
            state.snakes().len()
        )));
    }
    if state.status() != GameStatus::NotOver || !state.is_alive(BodyRef::Snake(snake)) {
        return Ok(MoveResult::Rejected);
    }

    let wrap = options.fall_through;
    let body = BodyRef::Snake(snake);
    let mut next = state.clone();
    let before = next.body_parts(body);
    let Some(&head) = before.first() else {
        return Ok(MoveResult::Rejected);
    };
    let Some(candidate) = next.normalize(head.step(direction), wrap) else {
        return Ok(MoveResult::Rejected);
    };

    let mut tally = Tally::default();
    let mut first_step = StepDiff::default();
    let mut ate_fruit = false;

    match next.cell(candidate) {
        Cell::Obstacle | Cell::Spike => return Ok(MoveResult::Rejected),
        Cell::Fruit => {
            ate_fruit = true;
            next.set_terrain(candidate, Terrain::Empty);
            next.push_front_part(body, candidate);
        },
        Cell::Empty | Cell::Target | Cell::Portal => {
            next.pop_back_part(body);
            next.push_front_part(body, candidate);
        },
        Cell::Snake(id) if id == snake => {
            let bites_tail = options.allow_tail_biting
                && before.len() >= 2
                && before.last() == Some(&candidate);
            if !bites_tail {
                return Ok(MoveResult::Rejected);
            }
            next.pop_back_part(body);
            next.push_front_part(body, candidate);
        },
        Cell::Snake(_) | Cell::Block(_) => {
            let Some(obstacle) = next.occupant(candidate) else {
                return Ok(MoveResult::Rejected);
            };
            let tail_vacated = options.allow_moving_without_space;
            if tail_vacated {
                next.pop_back_part(body);
            }
            let push =
                fall::resolve_step(&mut next, direction, wrap, &[body], Scope::From(obstacle))?;
            if next.occupant(candidate).is_some() {
                return Ok(MoveResult::Rejected);
            }
            tally.absorb(&push);
            first_step.shifts.extend(push.shifts);
            if !tail_vacated {
                next.pop_back_part(body);
            }
            next.push_front_part(body, candidate);
        },
    }
    first_step.shifts.push(BodyShift {
        body,
        from: before,
        to: next.body_parts(body),
    });

    if next.terrain(candidate) == Terrain::Portal {
        let from = next.body_parts(body);
        match fall::teleport(&mut next, body, candidate, wrap) {
            Some(Teleport::Done) => first_step.shifts.push(BodyShift {
                body,
                from,
                to: next.body_parts(body),
            }),
            Some(Teleport::Blocked(at)) => {
                tally.portal_blocked.get_or_insert(at);
            },
            None => {},
        }
    }
    fall::consume_if_on_target(&mut next, snake);

    if ate_fruit && options.change_gravity_on_fruit {
        let gravity = next.gravity().rotate_clockwise();
        log::trace!("gravity turns to {gravity}");
        next.set_gravity(gravity);
    }

    let mut steps = vec![first_step];
    let outcome = match tally.terminal(&next) {
        Some(outcome) => outcome,
        None => settle(&mut next, wrap, &mut tally, &mut steps)?,
    };
    next.set_status(outcome.status());

    next.check_conservation().map_err(EngineError::InvariantViolation)?;
    let remap = next.compact();
    log::trace!("{} {direction}: {}", state.snakes()[snake].label, outcome.label());

    Ok(MoveResult::Applied(Box::new(Transition {
        ate_fruit,
        outcome,
        steps,
        state: next,
        remap,
        portal_blocked: tally.portal_blocked,
    })))
}

/// Runs gravity until nothing moves, the game ends, or a state repeats.
fn settle(
    state: &mut GameState,
    wrap: bool,
    tally: &mut Tally,
    steps: &mut Vec<StepDiff>,
) -> Result<Outcome, EngineError> {
    let mut seen = HashSet::new();
    seen.insert(state.serialize());

    for _ in 0..MAX_FALL_PASSES {
        let gravity = state.gravity();
        let report = fall::resolve_step(state, gravity, wrap, &[], Scope::All)?;
        if report.is_static() {
            return Ok(Outcome::InProgress);
        }
        tally.absorb(&report);
        steps.push(StepDiff {
            shifts: report.shifts,
        });

        if let Some(outcome) = tally.terminal(state) {
            return Ok(outcome);
        }
        if !seen.insert(state.serialize()) {
            return Ok(Outcome::LostEndlessLoop);
        }
    }

    Err(EngineError::InvariantViolation(format!(
        "no equilibrium after {MAX_FALL_PASSES} fall passes"
    )))
}

/// Replays labelled moves from `state`, skipping rejected ones. Stops at the
/// first move that ends the game.
pub fn replay(
    state: &GameState,
    moves: &[Move],
    options: &EngineOptions,
) -> Result<(GameState, Option<Outcome>), EngineError> {
    let mut current = state.clone();
    let mut last = None;
    for mv in moves {
        if current.status() != GameStatus::NotOver {
            break;
        }
        if let MoveResult::Applied(transition) = apply(&current, *mv, options)? {
            last = Some(transition.outcome);
            current = transition.state;
        }
    }
    Ok((current, last))
}
