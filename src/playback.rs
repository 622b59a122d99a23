use crate::models::{Direction, Move};
use crate::state::GameState;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_DELAY_MS: u64 = 200;

#[derive(Debug, Serialize, Deserialize)]
struct PlaybackFileStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snake: Option<String>,
    key: String,
    #[serde(default = "default_delay")]
    delay_ms: u64,
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_MS
}

/// One recorded step before its snake has been matched to a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackStep {
    pub snake: Option<char>,
    pub direction: Direction,
}

pub fn load_playback(path: &Path) -> Result<Vec<PlaybackStep>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read playback file: {}", path.display()))?;
    let raw_steps: Vec<PlaybackFileStep> =
        serde_json::from_str(&contents).with_context(|| "Failed to parse playback JSON")?;

    if raw_steps.is_empty() {
        bail!("Playback input file is empty");
    }

    let mut steps = Vec::with_capacity(raw_steps.len());
    for (index, step) in raw_steps.into_iter().enumerate() {
        let parsed = parse_step(&step).with_context(|| {
            format!(
                "Failed to parse playback step {} in {}",
                index + 1,
                path.display()
            )
        })?;
        steps.push(parsed);
    }

    Ok(steps)
}

fn parse_step(step: &PlaybackFileStep) -> Result<PlaybackStep> {
    let snake = match step.snake.as_deref() {
        None => None,
        Some(label) => Some(parse_snake_label(label)?),
    };
    Ok(PlaybackStep {
        snake,
        direction: parse_key(&step.key)?,
    })
}

fn parse_snake_label(label: &str) -> Result<char> {
    let mut chars = label.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii_uppercase() && ch != 'X' => Ok(ch),
        _ => bail!(
            "Invalid snake label '{label}'. Use a single uppercase letter other than X."
        ),
    }
}

fn parse_key(key: &str) -> Result<Direction> {
    if key.len() == 1 {
        let ch = key
            .chars()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Playback key cannot be empty"))?;
        if matches!(ch, 'R' | 'D' | 'L' | 'U') {
            return parse_string_char(ch);
        }
    }

    let normalized = key.trim().to_lowercase();
    match normalized.as_str() {
        "right" | "east" => Ok(Direction::Right),
        "down" | "south" => Ok(Direction::Down),
        "left" | "west" => Ok(Direction::Left),
        "up" | "north" => Ok(Direction::Up),
        _ => bail!("Invalid key '{key}'. Use Right/Left/Up/Down (or R/L/U/D)."),
    }
}

fn parse_string_char(ch: char) -> Result<Direction> {
    match ch {
        'R' => Ok(Direction::Right),
        'D' => Ok(Direction::Down),
        'L' => Ok(Direction::Left),
        'U' => Ok(Direction::Up),
        _ => bail!("Invalid input character '{ch}'. Use R, D, L, U for moves."),
    }
}

impl PlaybackStep {
    /// The move this step makes in `state`. An unlabelled step drives the
    /// first snake still alive at that point of the replay.
    pub fn bind(&self, state: &GameState) -> Option<Move> {
        let snake = match self.snake {
            Some(label) => label,
            None => state.snakes().iter().find(|snake| snake.alive)?.label,
        };
        Some(Move {
            snake,
            direction: self.direction,
        })
    }
}

/// Rejects playbacks that name snakes the level does not have.
pub fn check_steps(steps: &[PlaybackStep], level: &GameState) -> Result<()> {
    if level.live_snake_count() == 0 {
        bail!("Level has no snake to play back");
    }
    for (index, step) in steps.iter().enumerate() {
        if let Some(snake) = step.snake {
            if level.snake_index(snake).is_none() {
                bail!("Playback step {} moves unknown snake '{snake}'", index + 1);
            }
        }
    }
    Ok(())
}

pub fn write_playback(path: &Path, moves: &[Move]) -> Result<()> {
    let steps: Vec<PlaybackFileStep> = moves
        .iter()
        .map(|mv| PlaybackFileStep {
            snake: Some(mv.snake.to_string()),
            key: mv.direction.name().to_string(),
            delay_ms: DEFAULT_DELAY_MS,
        })
        .collect();
    let json =
        serde_json::to_string_pretty(&steps).context("Failed to serialize playback JSON")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, json + "\n")
        .with_context(|| format!("Failed to write playback file: {}", path.display()))?;
    Ok(())
}
