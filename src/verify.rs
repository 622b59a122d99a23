use crate::engine::{self, MoveResult, Outcome};
use crate::levels::load_level;
use crate::models::EngineOptions;
use crate::playback::{check_steps, load_playback, PlaybackStep};
use crate::state::{GameState, GameStatus};
use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

/// Maps `levels/<difficulty>/<name>.txt` onto `playbacks/<difficulty>/<name>.json`.
pub fn resolve_playback_path(level_path: &Path, override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    let mut replaced = PathBuf::new();
    let mut replaced_any = false;
    for component in level_path.components() {
        match component {
            Component::Normal(name) if name == "levels" && !replaced_any => {
                replaced.push("playbacks");
                replaced_any = true;
            },
            _ => replaced.push(component.as_os_str()),
        }
    }

    if replaced_any {
        replaced.set_extension("json");
        return Ok(replaced);
    }

    bail!(
        "Unable to infer playback path from {}. Provide --playback.",
        level_path.display()
    )
}

pub fn verify_level(level_path: &Path, playback_path: &Path, options: &EngineOptions) -> Result<()> {
    let level = load_level(level_path)
        .with_context(|| format!("Failed to load level: {}", level_path.display()))?;
    let steps = load_steps(&level, playback_path)?;
    verify_steps(&level, &steps, options)
}

fn load_steps(level: &GameState, playback_path: &Path) -> Result<Vec<PlaybackStep>> {
    let steps = load_playback(playback_path)
        .with_context(|| format!("Failed to load playback: {}", playback_path.display()))?;
    check_steps(&steps, level)?;
    Ok(steps)
}

/// Replays `steps` and requires the final state to be won.
pub fn verify_steps(
    level: &GameState,
    steps: &[PlaybackStep],
    options: &EngineOptions,
) -> Result<()> {
    let (states, outcome) = play(level, steps, options)?;
    let status = states.last().map_or(GameStatus::NotOver, GameState::status);
    match (status, outcome) {
        (GameStatus::Won, _) => Ok(()),
        (_, Some(Outcome::LostEndlessLoop)) => bail!("Playback ended in an endless fall loop"),
        (GameStatus::Lost, _) => bail!("Playback resulted in a lost game"),
        (GameStatus::NotOver, _) => bail!("Playback did not complete the level"),
    }
}

/// Replays a playback and returns the canonical text of every state, the
/// initial one included. Rejected moves leave no frame.
pub fn replay_frames(
    level_path: &Path,
    playback_path: &Path,
    options: &EngineOptions,
) -> Result<Vec<String>> {
    let level = load_level(level_path)
        .with_context(|| format!("Failed to load level: {}", level_path.display()))?;
    let steps = load_steps(&level, playback_path)?;
    let (states, _) = play(&level, &steps, options)?;
    Ok(states.iter().map(GameState::serialize).collect())
}

/// Every state reached by `steps`, the initial one first, plus the outcome
/// of the last applied move. Each step is bound against the state it runs
/// on, so unlabelled steps follow whichever snake is first alive by then.
fn play(
    level: &GameState,
    steps: &[PlaybackStep],
    options: &EngineOptions,
) -> Result<(Vec<GameState>, Option<Outcome>)> {
    let mut current = level.clone();
    let mut states = vec![current.clone()];
    let mut last = None;
    for step in steps {
        if current.status() != GameStatus::NotOver {
            break;
        }
        let Some(mv) = step.bind(&current) else {
            break;
        };
        match engine::apply(&current, mv, options)? {
            MoveResult::Applied(transition) => {
                last = Some(transition.outcome);
                current = transition.state;
                states.push(current.clone());
            },
            MoveResult::Rejected => log::debug!("skipping rejected move {mv}"),
        }
    }
    Ok((states, last))
}
