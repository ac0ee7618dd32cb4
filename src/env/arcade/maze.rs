//! Treasure maze: a sparse-reward exploration game
//!
//! The agent walks a 21x21 tile maze. A key opens the single door that
//! guards the treasure room; lava costs a life and sends the agent back to
//! the start. Only the key (+1), the door (+1) and the treasure (+10) pay
//! anything, so a random policy almost never scores.

use rand::{Rng, rngs::StdRng};

use super::{ArcadeGame, FRAME_SIZE, GameStep};

/// Maze size in tiles
pub const GRID: usize = 21;

const TILE_PX: usize = FRAME_SIZE / GRID;

const START_LIVES: u32 = 3;

const LAYOUT: [&str; GRID] = [
    "#####################",
    "#S..#.........#.....#",
    "#...#.######..#..K..#",
    "#...#......#..#.....#",
    "#.L.####...#..##.####",
    "#..........#........#",
    "######.#####.######.#",
    "#....#.#...#.#....#.#",
    "#.LL.#...#...#.L..#.#",
    "#....#####.###....#.#",
    "#..........#........#",
    "#.###########.#######",
    "#.#...........#.....#",
    "#.#.#########.#.....#",
    "#...#...L...#.D..T..#",
    "###.#.#####.#.#.....#",
    "#...#.#...#.#.#.....#",
    "#.###.#.#.#.#.#######",
    "#.....#.#...#.L.....#",
    "#######.###########.#",
    "#####################",
];

/// Static tile contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    /// Impassable
    Wall,
    /// Walkable
    Floor,
    /// Picked up on contact
    Key,
    /// Passable once a key is held
    Door,
    /// Goal, ends the game
    Treasure,
    /// Costs a life
    Lava,
}

impl Tile {
    fn shade(self) -> u8 {
        match self {
            Tile::Wall => 110,
            Tile::Floor => 0,
            Tile::Key => 200,
            Tile::Door => 160,
            Tile::Treasure => 255,
            Tile::Lava => 60,
        }
    }
}

const AGENT_SHADE: u8 = 230;

/// Agent moves: noop, up, right, down, left
const MOVES: [(i32, i32); 5] = [(0, 0), (-1, 0), (0, 1), (1, 0), (0, -1)];

/// The treasure maze game state
#[derive(Debug, Clone)]
pub struct TreasureMaze {
    tiles: Vec<Tile>,
    start: (usize, usize),
    pos: (usize, usize),
    has_key: bool,
    lives: u32,
}

impl TreasureMaze {
    /// Build the maze from its fixed layout
    pub fn new() -> Self {
        let mut tiles = Vec::with_capacity(GRID * GRID);
        let mut start = (1, 1);
        for (r, row) in LAYOUT.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                let tile = match ch {
                    '#' => Tile::Wall,
                    'K' => Tile::Key,
                    'D' => Tile::Door,
                    'T' => Tile::Treasure,
                    'L' => Tile::Lava,
                    'S' => {
                        start = (r, c);
                        Tile::Floor
                    }
                    _ => Tile::Floor,
                };
                tiles.push(tile);
            }
        }
        Self { tiles, start, pos: start, has_key: false, lives: START_LIVES }
    }

    /// Tile at `(row, col)`
    pub fn tile(&self, pos: (usize, usize)) -> Tile {
        self.tiles[pos.0 * GRID + pos.1]
    }

    /// Agent position as `(row, col)`
    pub fn position(&self) -> (usize, usize) {
        self.pos
    }

    /// Whether the key has been collected
    pub fn has_key(&self) -> bool {
        self.has_key
    }

    fn set_tile(&mut self, pos: (usize, usize), tile: Tile) {
        self.tiles[pos.0 * GRID + pos.1] = tile;
    }

    fn fill_tile(frame: &mut [u8], pos: (usize, usize), shade: u8) {
        for dy in 0..TILE_PX {
            let row = (pos.0 * TILE_PX + dy) * FRAME_SIZE;
            let col = pos.1 * TILE_PX;
            frame[row + col..row + col + TILE_PX].fill(shade);
        }
    }
}

impl Default for TreasureMaze {
    fn default() -> Self {
        Self::new()
    }
}

impl ArcadeGame for TreasureMaze {
    fn num_actions(&self) -> usize {
        MOVES.len()
    }

    fn reset(&mut self, rng: &mut StdRng) {
        *self = Self::new();
        // Random drift from the start so seeded games differ
        let mut pos = self.start;
        for _ in 0..rng.gen_range(0..4) {
            let (dr, dc) = MOVES[rng.gen_range(1..MOVES.len())];
            let next = ((pos.0 as i32 + dr) as usize, (pos.1 as i32 + dc) as usize);
            if self.tile(next) == Tile::Floor {
                pos = next;
            }
        }
        self.pos = pos;
    }

    fn act(&mut self, action: usize) -> GameStep {
        let (dr, dc) = MOVES[action.min(MOVES.len() - 1)];
        let next = ((self.pos.0 as i32 + dr) as usize, (self.pos.1 as i32 + dc) as usize);

        let mut reward = 0.0;
        match self.tile(next) {
            Tile::Wall => return GameStep::default(),
            Tile::Door if !self.has_key => return GameStep::default(),
            Tile::Door => {
                // The key is used up and the door stays open
                self.has_key = false;
                self.set_tile(next, Tile::Floor);
                self.pos = next;
                reward = 1.0;
            }
            Tile::Key => {
                self.has_key = true;
                self.set_tile(next, Tile::Floor);
                self.pos = next;
                reward = 1.0;
            }
            Tile::Treasure => {
                self.pos = next;
                return GameStep { reward: 10.0, game_over: true };
            }
            Tile::Lava => {
                self.lives = self.lives.saturating_sub(1);
                self.pos = self.start;
                return GameStep { reward: 0.0, game_over: self.lives == 0 };
            }
            Tile::Floor => self.pos = next,
        }

        GameStep { reward, game_over: false }
    }

    fn render(&self, frame: &mut [u8]) {
        for r in 0..GRID {
            for c in 0..GRID {
                Self::fill_tile(frame, (r, c), self.tile((r, c)).shade());
            }
        }
        // Status bar in the top wall: lives on the left, held key on the right
        for i in 0..self.lives as usize {
            Self::fill_tile(frame, (0, 1 + i), 255);
        }
        if self.has_key {
            Self::fill_tile(frame, (0, GRID - 2), Tile::Key.shade());
        }
        Self::fill_tile(frame, self.pos, AGENT_SHADE);
    }

    fn lives(&self) -> u32 {
        self.lives
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rand::SeedableRng;

    use super::*;
    use crate::env::arcade::FRAME_PIXELS;

    /// Shortest action sequence from `from` to `to`, avoiding lava and,
    /// when `door` is false, the door
    fn route(game: &TreasureMaze, from: (usize, usize), to: (usize, usize), door: bool) -> Vec<usize> {
        let mut prev = vec![None; GRID * GRID];
        let mut queue = VecDeque::from([from]);
        prev[from.0 * GRID + from.1] = Some((from, 0));
        while let Some(pos) = queue.pop_front() {
            if pos == to {
                break;
            }
            for (a, (dr, dc)) in MOVES.iter().enumerate().skip(1) {
                let next = ((pos.0 as i32 + dr) as usize, (pos.1 as i32 + dc) as usize);
                let blocked = match game.tile(next) {
                    Tile::Wall | Tile::Lava => true,
                    Tile::Door => !door,
                    _ => false,
                };
                if !blocked && prev[next.0 * GRID + next.1].is_none() {
                    prev[next.0 * GRID + next.1] = Some((pos, a));
                    queue.push_back(next);
                }
            }
        }

        let mut actions = Vec::new();
        let mut pos = to;
        while pos != from {
            let (p, a) = prev[pos.0 * GRID + pos.1].expect("target unreachable");
            actions.push(a);
            pos = p;
        }
        actions.reverse();
        actions
    }

    fn find(game: &TreasureMaze, tile: Tile) -> (usize, usize) {
        (0..GRID * GRID)
            .map(|i| (i / GRID, i % GRID))
            .find(|&p| game.tile(p) == tile)
            .unwrap()
    }

    #[test]
    fn test_layout_is_square() {
        assert!(LAYOUT.iter().all(|row| row.len() == GRID));
        assert_eq!(TILE_PX * GRID, FRAME_SIZE);
    }

    #[test]
    fn test_treasure_sealed_without_key() {
        let game = TreasureMaze::new();
        let mut prev = vec![false; GRID * GRID];
        let mut stack = vec![game.start];
        while let Some(pos) = stack.pop() {
            if std::mem::replace(&mut prev[pos.0 * GRID + pos.1], true) {
                continue;
            }
            assert_ne!(game.tile(pos), Tile::Treasure);
            for (dr, dc) in &MOVES[1..] {
                let next = ((pos.0 as i32 + dr) as usize, (pos.1 as i32 + dc) as usize);
                if matches!(game.tile(next), Tile::Floor | Tile::Key | Tile::Treasure) {
                    stack.push(next);
                }
            }
        }
    }

    #[test]
    fn test_solution_collects_all_rewards() {
        let mut game = TreasureMaze::new();
        let key = find(&game, Tile::Key);
        let treasure = find(&game, Tile::Treasure);

        let mut total = 0.0;
        for a in route(&game, game.start, key, false) {
            let step = game.act(a);
            assert!(!step.game_over);
            total += step.reward;
        }
        assert!(game.has_key());
        assert_eq!(total, 1.0);

        let mut last = GameStep::default();
        for a in route(&game, key, treasure, true) {
            last = game.act(a);
            total += last.reward;
        }
        assert!(last.game_over);
        assert_eq!(total, 12.0);
        assert_eq!(game.lives(), START_LIVES);
    }

    #[test]
    fn test_door_blocks_without_key() {
        let mut game = TreasureMaze::new();
        let door = find(&game, Tile::Door);
        // Approach the door from the left
        game.pos = (door.0, door.1 - 1);
        let step = game.act(2);
        assert_eq!(step, GameStep::default());
        assert_eq!(game.position(), (door.0, door.1 - 1));
    }

    #[test]
    fn test_lava_costs_lives() {
        let mut game = TreasureMaze::new();
        let lava = find(&game, Tile::Lava);
        for expected in (0..START_LIVES).rev() {
            game.pos = (lava.0 - 1, lava.1);
            let step = game.act(3);
            assert_eq!(game.lives(), expected);
            assert_eq!(game.position(), game.start);
            assert_eq!(step.game_over, expected == 0);
        }
    }

    #[test]
    fn test_walls_block() {
        let mut game = TreasureMaze::new();
        // Start is in the top-left corner
        assert_eq!(game.act(1), GameStep::default());
        assert_eq!(game.act(4), GameStep::default());
        assert_eq!(game.position(), game.start);
    }

    #[test]
    fn test_render_shows_agent_and_lives() {
        let mut game = TreasureMaze::new();
        let mut rng = StdRng::seed_from_u64(0);
        game.reset(&mut rng);

        let mut frame = vec![0u8; FRAME_PIXELS];
        game.render(&mut frame);

        let (r, c) = game.position();
        assert_eq!(frame[(r * TILE_PX) * FRAME_SIZE + c * TILE_PX], AGENT_SHADE);
        // Three life markers in the top wall
        assert_eq!(frame[TILE_PX], 255);
        assert_eq!(frame[3 * TILE_PX], 255);
        assert_eq!(frame[4 * TILE_PX], Tile::Wall.shade());
    }
}
