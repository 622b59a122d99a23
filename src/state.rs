use crate::models::{BodyRef, Cell, Direction, Position, Terrain};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MalformedCharacter { ch: char, x: usize, y: usize },
    MissingTarget,
    StructurallyInvalid(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedCharacter { ch, x, y } => {
                write!(f, "Malformed character '{ch}' at column {x}, row {y}")
            },
            ParseError::MissingTarget => f.write_str("Level has no target"),
            ParseError::StructurallyInvalid(reason) => {
                write!(f, "Structurally invalid level: {reason}")
            },
        }
    }
}

impl std::error::Error for ParseError {}

fn invalid(reason: impl Into<String>) -> ParseError {
    ParseError::StructurallyInvalid(reason.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    NotOver,
    Won,
    Lost,
}

impl GameStatus {
    pub fn label(self) -> &'static str {
        match self {
            GameStatus::NotOver => "not over",
            GameStatus::Won => "won",
            GameStatus::Lost => "lost",
        }
    }

    fn target_glyph(self) -> char {
        match self {
            GameStatus::NotOver => 'X',
            GameStatus::Won => '$',
            GameStatus::Lost => '?',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snake {
    pub label: char,
    /// Head first.
    pub parts: VecDeque<Position>,
    pub alive: bool,
}

impl Snake {
    pub fn head(&self) -> Option<Position> {
        self.parts.front().copied()
    }

    pub fn tail(&self) -> Option<Position> {
        self.parts.back().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Block {
    pub label: char,
    pub parts: VecDeque<Position>,
    pub alive: bool,
}

/// Old arena index to new arena index after dead bodies are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRemap {
    pub snakes: Vec<Option<usize>>,
    pub blocks: Vec<Option<usize>>,
}

impl IdRemap {
    pub fn identity(snakes: usize, blocks: usize) -> Self {
        Self {
            snakes: (0..snakes).map(Some).collect(),
            blocks: (0..blocks).map(Some).collect(),
        }
    }

    pub fn snake(&self, old: usize) -> Option<usize> {
        self.snakes.get(old).copied().flatten()
    }

    pub fn block(&self, old: usize) -> Option<usize> {
        self.blocks.get(old).copied().flatten()
    }

    pub fn is_identity(&self) -> bool {
        self.snakes.iter().enumerate().all(|(i, id)| *id == Some(i))
            && self.blocks.iter().enumerate().all(|(i, id)| *id == Some(i))
    }
}

/// Snapshot of the puzzle world. Terrain and bodies live in separate layers;
/// `cell` reports the occupant when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    width: i32,
    height: i32,
    terrain: Vec<Terrain>,
    occupants: Vec<Option<BodyRef>>,
    snakes: Vec<Snake>,
    blocks: Vec<Block>,
    target: Position,
    portals: Option<(Position, Position)>,
    fruit_remaining: usize,
    gravity: Direction,
    status: GameStatus,
}

impl GameState {
    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn target(&self) -> Position {
        self.target
    }

    pub fn portals(&self) -> Option<(Position, Position)> {
        self.portals
    }

    /// The partner of `portal` and the vector that leads to it.
    pub fn portal_exit(&self, portal: Position) -> Option<(Position, (i32, i32))> {
        let (first, second) = self.portals?;
        let exit = if portal == first {
            second
        } else if portal == second {
            first
        } else {
            return None;
        };
        Some((exit, (exit.x - portal.x, exit.y - portal.y)))
    }

    pub fn fruit_remaining(&self) -> usize {
        self.fruit_remaining
    }

    pub fn gravity(&self) -> Direction {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Direction) {
        self.gravity = gravity;
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn set_status(&mut self, status: GameStatus) {
        self.status = status;
    }

    pub fn snakes(&self) -> &[Snake] {
        &self.snakes
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn snake_index(&self, label: char) -> Option<usize> {
        self.snakes
            .iter()
            .position(|snake| snake.alive && snake.label == label)
    }

    pub fn live_snake_count(&self) -> usize {
        self.snakes.iter().filter(|snake| snake.alive).count()
    }

    pub fn live_bodies(&self) -> Vec<BodyRef> {
        let snakes = self
            .snakes
            .iter()
            .enumerate()
            .filter(|(_, snake)| snake.alive)
            .map(|(id, _)| BodyRef::Snake(id));
        let blocks = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.alive)
            .map(|(id, _)| BodyRef::Block(id));
        snakes.chain(blocks).collect()
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// Brings `pos` onto the board: modulo the board size when `wrap` is set,
    /// otherwise `None` for anything outside.
    pub fn normalize(&self, pos: Position, wrap: bool) -> Option<Position> {
        if self.in_bounds(pos) {
            Some(pos)
        } else if wrap {
            Some(Position::new(
                pos.x.rem_euclid(self.width),
                pos.y.rem_euclid(self.height),
            ))
        } else {
            None
        }
    }

    fn index(&self, pos: Position) -> usize {
        (pos.y * self.width + pos.x) as usize
    }

    /// Terrain at an on-board position; off-board reads as an obstacle.
    pub fn terrain(&self, pos: Position) -> Terrain {
        if self.in_bounds(pos) {
            self.terrain[self.index(pos)]
        } else {
            Terrain::Obstacle
        }
    }

    pub fn occupant(&self, pos: Position) -> Option<BodyRef> {
        if self.in_bounds(pos) {
            self.occupants[self.index(pos)]
        } else {
            None
        }
    }

    /// Cell tag with the clamping policy: off-board reads as an obstacle.
    pub fn cell(&self, pos: Position) -> Cell {
        match self.occupant(pos) {
            Some(body) => body.into(),
            None => self.terrain(pos).into(),
        }
    }

    /// Cell tag with the edge policy chosen by `wrap`. Returns the normalized
    /// position alongside, or `None` when the position leaves the board.
    pub fn lookup(&self, pos: Position, wrap: bool) -> Option<(Position, Cell)> {
        let pos = self.normalize(pos, wrap)?;
        Some((pos, self.cell(pos)))
    }

    pub fn set_terrain(&mut self, pos: Position, terrain: Terrain) {
        if !self.in_bounds(pos) {
            return;
        }
        let index = self.index(pos);
        let previous = self.terrain[index];
        if previous == Terrain::Fruit && terrain != Terrain::Fruit {
            self.fruit_remaining -= 1;
        } else if previous != Terrain::Fruit && terrain == Terrain::Fruit {
            self.fruit_remaining += 1;
        }
        self.terrain[index] = terrain;
    }

    fn set_occupant(&mut self, pos: Position, body: Option<BodyRef>) {
        if self.in_bounds(pos) {
            let index = self.index(pos);
            self.occupants[index] = body;
        }
    }

    fn parts_mut(&mut self, body: BodyRef) -> &mut VecDeque<Position> {
        match body {
            BodyRef::Snake(id) => &mut self.snakes[id].parts,
            BodyRef::Block(id) => &mut self.blocks[id].parts,
        }
    }

    pub fn body_parts(&self, body: BodyRef) -> Vec<Position> {
        match body {
            BodyRef::Snake(id) => self.snakes[id].parts.iter().copied().collect(),
            BodyRef::Block(id) => self.blocks[id].parts.iter().copied().collect(),
        }
    }

    pub fn is_alive(&self, body: BodyRef) -> bool {
        match body {
            BodyRef::Snake(id) => self.snakes.get(id).is_some_and(|snake| snake.alive),
            BodyRef::Block(id) => self.blocks.get(id).is_some_and(|block| block.alive),
        }
    }

    pub fn push_front_part(&mut self, body: BodyRef, pos: Position) {
        self.parts_mut(body).push_front(pos);
        self.set_occupant(pos, Some(body));
    }

    pub fn push_back_part(&mut self, body: BodyRef, pos: Position) {
        self.parts_mut(body).push_back(pos);
        self.set_occupant(pos, Some(body));
    }

    pub fn pop_front_part(&mut self, body: BodyRef) -> Option<Position> {
        let pos = self.parts_mut(body).pop_front()?;
        self.release(body, pos);
        Some(pos)
    }

    pub fn pop_back_part(&mut self, body: BodyRef) -> Option<Position> {
        let pos = self.parts_mut(body).pop_back()?;
        self.release(body, pos);
        Some(pos)
    }

    fn release(&mut self, body: BodyRef, pos: Position) {
        if self.occupant(pos) == Some(body) {
            self.set_occupant(pos, None);
        }
    }

    /// Lifts a body off the grid without touching its part list.
    pub fn lift_body(&mut self, body: BodyRef) {
        for pos in self.body_parts(body) {
            self.release(body, pos);
        }
    }

    /// Replaces a body's parts and stamps them onto the grid. Returns the
    /// first cell that another body already claimed, if any.
    pub fn place_body(&mut self, body: BodyRef, mut parts: Vec<Position>) -> Option<Position> {
        if let BodyRef::Block(_) = body {
            // Blocks have no head; keep row-major order so equal blocks compare equal.
            parts.sort_by_key(|pos| (pos.y, pos.x));
        }
        let mut clash = None;
        for &pos in &parts {
            match self.occupant(pos) {
                Some(other) if other != body && clash.is_none() => clash = Some(pos),
                _ => {},
            }
            self.set_occupant(pos, Some(body));
        }
        *self.parts_mut(body) = parts.into_iter().collect();
        clash
    }

    /// Removes a body from play; its arena slot stays until `compact`.
    pub fn remove_body(&mut self, body: BodyRef) {
        self.lift_body(body);
        match body {
            BodyRef::Snake(id) => self.snakes[id].alive = false,
            BodyRef::Block(id) => self.blocks[id].alive = false,
        }
    }

    /// Drops removed bodies from the arenas and renumbers the survivors.
    pub fn compact(&mut self) -> IdRemap {
        let mut remap = IdRemap::default();
        let mut next = 0;
        for snake in &self.snakes {
            if snake.alive {
                remap.snakes.push(Some(next));
                next += 1;
            } else {
                remap.snakes.push(None);
            }
        }
        next = 0;
        for block in &self.blocks {
            if block.alive {
                remap.blocks.push(Some(next));
                next += 1;
            } else {
                remap.blocks.push(None);
            }
        }
        if remap.is_identity() {
            return remap;
        }

        self.snakes.retain(|snake| snake.alive);
        self.blocks.retain(|block| block.alive);
        for occupant in self.occupants.iter_mut() {
            *occupant = match *occupant {
                Some(BodyRef::Snake(id)) => remap.snake(id).map(BodyRef::Snake),
                Some(BodyRef::Block(id)) => remap.block(id).map(BodyRef::Block),
                None => None,
            };
        }
        remap
    }

    /// Checks that every live body owns exactly its own cells and that the
    /// grid names no body that does not claim the cell.
    pub fn check_conservation(&self) -> Result<(), String> {
        let mut claimed: HashMap<Position, BodyRef> = HashMap::new();
        for body in self.live_bodies() {
            for pos in self.body_parts(body) {
                if !self.in_bounds(pos) {
                    return Err(format!("{body:?} has a part outside the board at {pos:?}"));
                }
                if let Some(other) = claimed.insert(pos, body) {
                    return Err(format!("{body:?} and {other:?} both claim {pos:?}"));
                }
                if self.occupant(pos) != Some(body) {
                    return Err(format!("grid does not show {body:?} at {pos:?}"));
                }
            }
        }
        let stamped = self.occupants.iter().filter(|cell| cell.is_some()).count();
        if stamped != claimed.len() {
            return Err(format!(
                "grid holds {stamped} body cells but bodies claim {}",
                claimed.len()
            ));
        }
        Ok(())
    }

    /// Direction from `from` to an adjacent `to`, allowing wrap-around.
    fn neighbor_direction(&self, from: Position, to: Position) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|direction| self.normalize(from.step(*direction), true) == Some(to))
    }

    fn glyph_at(&self, pos: Position) -> char {
        match self.occupant(pos) {
            Some(BodyRef::Snake(id)) => {
                let snake = &self.snakes[id];
                match snake.parts.iter().position(|part| *part == pos) {
                    Some(0) | None => snake.label,
                    Some(index) => self
                        .neighbor_direction(pos, snake.parts[index - 1])
                        .map_or(snake.label, Direction::body_glyph),
                }
            },
            Some(BodyRef::Block(id)) => self.blocks[id].label,
            None => match self.terrain(pos) {
                Terrain::Empty => '.',
                Terrain::Obstacle => '#',
                Terrain::Spike => '|',
                Terrain::Fruit => '@',
                Terrain::Portal => '*',
                Terrain::Target => self.status.target_glyph(),
            },
        }
    }

    /// Canonical text form: header, rows, and a status line carrying target,
    /// outcome, portals and non-default gravity.
    pub fn serialize(&self) -> String {
        let mut output = format!("{} {}\n", self.height, self.width);
        for y in 0..self.height {
            for x in 0..self.width {
                output.push(self.glyph_at(Position::new(x, y)));
            }
            output.push('\n');
        }
        output.push_str(&format!(
            "{} {} {}",
            self.target.x,
            self.target.y,
            self.status.label()
        ));
        if let Some((first, second)) = self.portals {
            output.push_str(&format!(
                " {} {} {} {}",
                first.x, first.y, second.x, second.y
            ));
        }
        if self.gravity != Direction::Down {
            output.push(' ');
            output.push_str(self.gravity.gravity_word());
        }
        output
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines: Vec<&str> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }
        while lines.first().is_some_and(|line| line.trim().is_empty()) {
            lines.remove(0);
        }

        let header = match lines.first() {
            Some(line) if starts_with_digit(line) => Some(parse_header(line)?),
            _ => None,
        };
        if header.is_some() {
            lines.remove(0);
        }
        let status_line = match lines.last() {
            Some(line) if starts_with_digit(line) => Some(StatusLine::parse(line)?),
            _ => None,
        };
        if status_line.is_some() {
            lines.pop();
        }

        if lines.is_empty() {
            return Err(invalid("level has no rows"));
        }
        let height = lines.len();
        let width = lines[0].chars().count();
        if width == 0 {
            return Err(invalid("level rows are empty"));
        }
        if let Some((expected_height, expected_width)) = header {
            if expected_height != height || expected_width != width {
                return Err(invalid(format!(
                    "header declares {expected_height}x{expected_width} but rows are {height}x{width}"
                )));
            }
        }

        let mut state = GameState {
            width: width as i32,
            height: height as i32,
            terrain: vec![Terrain::Empty; width * height],
            occupants: vec![None; width * height],
            snakes: Vec::new(),
            blocks: Vec::new(),
            target: Position::new(0, 0),
            portals: None,
            fruit_remaining: 0,
            gravity: Direction::Down,
            status: GameStatus::NotOver,
        };

        let mut heads: BTreeMap<char, Position> = BTreeMap::new();
        let mut block_cells: BTreeMap<char, Vec<Position>> = BTreeMap::new();
        let mut arrows: HashMap<Position, Direction> = HashMap::new();
        let mut target_marker: Option<(Position, GameStatus)> = None;
        let mut portal_markers = Vec::new();

        for (y, line) in lines.iter().enumerate() {
            if line.chars().count() != width {
                return Err(invalid(format!(
                    "row {y} has {} columns, expected {width}",
                    line.chars().count()
                )));
            }
            for (x, ch) in line.chars().enumerate() {
                let pos = Position::new(x as i32, y as i32);
                match ch {
                    '.' => {},
                    '#' => state.set_terrain(pos, Terrain::Obstacle),
                    '|' => state.set_terrain(pos, Terrain::Spike),
                    '@' => state.set_terrain(pos, Terrain::Fruit),
                    '*' => portal_markers.push(pos),
                    'X' | '$' | '?' => {
                        if target_marker.is_some() {
                            return Err(invalid("level has more than one target"));
                        }
                        let status = match ch {
                            '$' => GameStatus::Won,
                            '?' => GameStatus::Lost,
                            _ => GameStatus::NotOver,
                        };
                        target_marker = Some((pos, status));
                    },
                    '<' | '>' | '^' | 'v' => {
                        if let Some(direction) = Direction::from_body_glyph(ch) {
                            arrows.insert(pos, direction);
                        }
                    },
                    'A'..='Z' => {
                        if heads.insert(ch, pos).is_some() {
                            return Err(invalid(format!("snake '{ch}' has more than one head")));
                        }
                    },
                    'a'..='z' => block_cells.entry(ch).or_default().push(pos),
                    _ => return Err(ParseError::MalformedCharacter { ch, x, y }),
                }
            }
        }

        let (target, status) = match (&status_line, target_marker) {
            (Some(line), _) => (line.target, line.status),
            (None, Some(marker)) => marker,
            (None, None) => return Err(ParseError::MissingTarget),
        };
        if !state.in_bounds(target) {
            return Err(invalid(format!("target {target:?} lies outside the board")));
        }
        if let (Some(line), Some((marker, _))) = (&status_line, target_marker) {
            if marker != line.target {
                return Err(invalid("target marker disagrees with status line"));
            }
        }
        state.target = target;
        state.status = status;
        state.set_terrain(target, Terrain::Target);

        let portals = match status_line.as_ref().and_then(|line| line.portals) {
            Some(pair) => {
                if portal_markers
                    .iter()
                    .any(|marker| *marker != pair.0 && *marker != pair.1)
                {
                    return Err(invalid("portal marker not listed in status line"));
                }
                Some(pair)
            },
            None => match portal_markers.as_slice() {
                [] => None,
                [first, second] => Some((*first, *second)),
                markers => {
                    return Err(invalid(format!(
                        "portals come in pairs, found {}",
                        markers.len()
                    )))
                },
            },
        };
        if let Some((first, second)) = portals {
            if first == second || !state.in_bounds(first) || !state.in_bounds(second) {
                return Err(invalid("portal pair is not two distinct on-board cells"));
            }
            if first == target || second == target {
                return Err(invalid("portal overlaps the target"));
            }
            state.set_terrain(first, Terrain::Portal);
            state.set_terrain(second, Terrain::Portal);
        }
        state.portals = portals;
        if let Some(gravity) = status_line.as_ref().and_then(|line| line.gravity) {
            state.gravity = gravity;
        }

        // Each body glyph points at its predecessor; invert to walk from heads.
        let mut successor: HashMap<Position, Position> = HashMap::new();
        for (&pos, &direction) in &arrows {
            let previous = state
                .normalize(pos.step(direction), true)
                .ok_or_else(|| invalid("body segment points off the board"))?;
            if successor.insert(previous, pos).is_some() {
                return Err(invalid(format!(
                    "two body segments continue from {},{}",
                    previous.x, previous.y
                )));
            }
        }

        let mut claimed = 0;
        for (label, head) in heads {
            let id = state.snakes.len();
            state.snakes.push(Snake {
                label,
                parts: VecDeque::new(),
                alive: true,
            });
            let body = BodyRef::Snake(id);
            state.push_back_part(body, head);
            let mut current = head;
            while let Some(&next) = successor.get(&current) {
                if state.occupant(next).is_some() {
                    return Err(invalid(format!("snake '{label}' body loops onto itself")));
                }
                state.push_back_part(body, next);
                claimed += 1;
                current = next;
            }
        }
        if claimed != arrows.len() {
            return Err(invalid("body segment not connected to any snake head"));
        }

        for (label, cells) in block_cells {
            let id = state.blocks.len();
            state.blocks.push(Block {
                label,
                parts: VecDeque::new(),
                alive: true,
            });
            for pos in cells {
                state.push_back_part(BodyRef::Block(id), pos);
            }
        }

        Ok(state)
    }
}

fn starts_with_digit(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_digit())
}

fn parse_header(line: &str) -> Result<(usize, usize), ParseError> {
    let numbers: Vec<&str> = line.split_whitespace().collect();
    match numbers.as_slice() {
        [height, width] => {
            let height = height
                .parse()
                .map_err(|_| invalid(format!("bad header height '{height}'")))?;
            let width = width
                .parse()
                .map_err(|_| invalid(format!("bad header width '{width}'")))?;
            Ok((height, width))
        },
        _ => Err(invalid(format!("header must be '<height> <width>', got '{line}'"))),
    }
}

struct StatusLine {
    target: Position,
    status: GameStatus,
    portals: Option<(Position, Position)>,
    gravity: Option<Direction>,
}

impl StatusLine {
    fn parse(line: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let coordinate = |index: usize| -> Result<i32, ParseError> {
            tokens
                .get(index)
                .and_then(|token| token.parse().ok())
                .ok_or_else(|| invalid(format!("bad coordinate in status line '{line}'")))
        };
        let target = Position::new(coordinate(0)?, coordinate(1)?);

        let (status, mut rest) = match tokens.get(2..) {
            Some(["won", rest @ ..]) => (GameStatus::Won, rest),
            Some(["lost", rest @ ..]) => (GameStatus::Lost, rest),
            Some(["not", "over", rest @ ..]) => (GameStatus::NotOver, rest),
            _ => return Err(invalid(format!("bad game status in status line '{line}'"))),
        };

        let mut portals = None;
        if rest.first().is_some_and(|token| starts_with_digit(token)) {
            let offset = tokens.len() - rest.len();
            portals = Some((
                Position::new(coordinate(offset)?, coordinate(offset + 1)?),
                Position::new(coordinate(offset + 2)?, coordinate(offset + 3)?),
            ));
            rest = &rest[4.min(rest.len())..];
        }

        let gravity = match rest {
            [] => None,
            [word] => Some(
                Direction::from_gravity_word(word)
                    .ok_or_else(|| invalid(format!("unknown gravity '{word}'")))?,
            ),
            _ => return Err(invalid(format!("trailing tokens in status line '{line}'"))),
        };

        Ok(Self {
            target,
            status,
            portals,
            gravity,
        })
    }
}

impl FromStr for GameState {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        GameState::parse(text)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
