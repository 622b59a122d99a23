use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Fixed enumeration order used by the solver.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Quarter turn clockwise as seen on screen (y grows downward).
    pub fn rotate_clockwise(self) -> Self {
        match self {
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
            Direction::Up => Direction::Right,
            Direction::Right => Direction::Down,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::Left => "Left",
            Direction::Right => "Right",
        }
    }

    /// Word used for gravity in the level status line.
    pub fn gravity_word(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    pub fn from_gravity_word(word: &str) -> Option<Self> {
        match word {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }

    /// Body glyph for a part whose previous part lies in this direction.
    pub fn body_glyph(self) -> char {
        match self {
            Direction::Up => '^',
            Direction::Down => 'v',
            Direction::Left => '<',
            Direction::Right => '>',
        }
    }

    pub fn from_body_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '^' => Some(Direction::Up),
            'v' => Some(Direction::Down),
            '<' => Some(Direction::Left),
            '>' => Some(Direction::Right),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static layer of a cell. Bodies sit on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terrain {
    Empty,
    Obstacle,
    Spike,
    Fruit,
    Portal,
    Target,
}

/// Index into the snake or block arena of a `GameState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BodyRef {
    Snake(usize),
    Block(usize),
}

/// The single tag a cell reports: its occupant if any, otherwise its terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Empty,
    Obstacle,
    Spike,
    Fruit,
    Portal,
    Target,
    Snake(usize),
    Block(usize),
}

impl Cell {
    pub fn body(self) -> Option<BodyRef> {
        match self {
            Cell::Snake(id) => Some(BodyRef::Snake(id)),
            Cell::Block(id) => Some(BodyRef::Block(id)),
            _ => None,
        }
    }
}

impl From<Terrain> for Cell {
    fn from(terrain: Terrain) -> Self {
        match terrain {
            Terrain::Empty => Cell::Empty,
            Terrain::Obstacle => Cell::Obstacle,
            Terrain::Spike => Cell::Spike,
            Terrain::Fruit => Cell::Fruit,
            Terrain::Portal => Cell::Portal,
            Terrain::Target => Cell::Target,
        }
    }
}

impl From<BodyRef> for Cell {
    fn from(body: BodyRef) -> Self {
        match body {
            BodyRef::Snake(id) => Cell::Snake(id),
            BodyRef::Block(id) => Cell::Block(id),
        }
    }
}

/// A player move, addressed by the snake's stable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub snake: char,
    pub direction: Direction,
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.snake, self.direction)
    }
}

/// Rule switches shared by the engine and the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Bodies leaving one edge re-enter from the opposite edge.
    pub fall_through: bool,
    /// Gravity turns a quarter clockwise whenever a fruit is eaten.
    pub change_gravity_on_fruit: bool,
    /// A pushing snake's tail is vacated before the push resolves.
    pub allow_moving_without_space: bool,
    /// A head may move into its own tail cell.
    pub allow_tail_biting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_clockwise_cycles_through_all_directions() {
        let mut direction = Direction::Down;
        let mut seen = Vec::new();
        for _ in 0..4 {
            direction = direction.rotate_clockwise();
            seen.push(direction);
        }
        assert_eq!(
            seen,
            vec![Direction::Left, Direction::Up, Direction::Right, Direction::Down]
        );
    }

    #[test]
    fn test_body_glyphs_map_back_to_directions() {
        for direction in Direction::ALL {
            assert_eq!(
                Direction::from_body_glyph(direction.body_glyph()),
                Some(direction)
            );
        }
        assert_eq!(Direction::from_body_glyph('x'), None);
    }

    #[test]
    fn test_engine_options_deserialize_missing_fields_as_false() {
        let options: EngineOptions = toml::from_str("fall_through = true").unwrap();
        assert!(options.fall_through);
        assert!(!options.change_gravity_on_fruit);
        assert!(!options.allow_moving_without_space);
        assert!(!options.allow_tail_biting);
    }
}
