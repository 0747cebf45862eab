//! Exact search for 3×3 boards.
//!
//! Classic boards are searched with alpha-beta minimax. Rolling boards cycle,
//! so their reachable positions are solved once by retrograde analysis and
//! kept per rule set; positions that can repeat forever are draws.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::games::grid::{Cell, Coord, DIRECTIONS, GameSnapshot, PlacementRecord, Player};

const WIN_SCORE: i32 = 10;

/// Solved rolling tables, one per rule set, built from the empty board.
static ROLLING_TABLES: LazyLock<DashMap<RollingRules, Arc<RollingTable>>> = LazyLock::new(DashMap::new);

/// Mutable search position with make/unmake support for rolling eviction.
#[derive(Debug, Clone)]
struct SearchBoard {
    size: usize,
    win_condition: usize,
    rolling_cap: Option<usize>,
    cells: Vec<Option<Player>>,
    placements: Vec<PlacementRecord>,
}

/// Everything needed to take a move back.
struct Undo {
    index: usize,
    evicted: Option<(usize, PlacementRecord)>,
}

fn cells_of(snapshot: &GameSnapshot) -> Vec<Option<Player>> {
    snapshot
        .board
        .cells()
        .iter()
        .map(|c| match c {
            Cell::Empty => None,
            Cell::Occupied(p) => Some(*p),
        })
        .collect()
}

/// First player holding `win_condition` in a row, scanning row-major.
fn line_winner(cells: &[Option<Player>], size: usize, win_condition: usize) -> Option<Player> {
    let n = size as isize;
    let k = win_condition as isize;
    for row in 0..n {
        for col in 0..n {
            let Some(player) = cells[(row * n + col) as usize] else {
                continue;
            };
            'dir: for (dr, dc) in DIRECTIONS {
                for step in 1..k {
                    let (r, c) = (row + dr * step, col + dc * step);
                    if r < 0 || c < 0 || r >= n || c >= n {
                        continue 'dir;
                    }
                    if cells[(r * n + c) as usize] != Some(player) {
                        continue 'dir;
                    }
                }
                return Some(player);
            }
        }
    }
    None
}

impl SearchBoard {
    fn from_snapshot(snapshot: &GameSnapshot) -> Self {
        Self {
            size: snapshot.board.size(),
            win_condition: snapshot.config.win_condition,
            rolling_cap: snapshot
                .config
                .rolling_mode
                .then(|| snapshot.config.rolling_cap()),
            cells: cells_of(snapshot),
            placements: snapshot.placements.clone(),
        }
    }

    fn empty_indices(&self) -> Vec<usize> {
        (0..self.cells.len())
            .filter(|&i| self.cells[i].is_none())
            .collect()
    }

    fn play(&mut self, index: usize, player: Player) -> Undo {
        let mut evicted = None;
        if let Some(cap) = self.rolling_cap {
            let held = self.placements.iter().filter(|p| p.player == player).count();
            if held >= cap
                && let Some(pos) = self.placements.iter().position(|p| p.player == player)
            {
                let record = self.placements.remove(pos);
                self.cells[record.row * self.size + record.col] = None;
                evicted = Some((pos, record));
            }
        }
        self.cells[index] = Some(player);
        self.placements.push(PlacementRecord {
            player,
            row: index / self.size,
            col: index % self.size,
        });
        Undo { index, evicted }
    }

    fn unplay(&mut self, undo: Undo) {
        self.cells[undo.index] = None;
        self.placements.pop();
        if let Some((pos, record)) = undo.evicted {
            self.cells[record.row * self.size + record.col] = Some(record.player);
            self.placements.insert(pos, record);
        }
    }

    fn winner(&self) -> Option<Player> {
        line_winner(&self.cells, self.size, self.win_condition)
    }
}

/// Returns the best move for `me`, or `None` if there is none or the
/// snapshot does not describe a consistent position.
///
/// Classic boards score terminal states `10 - depth` for a win and
/// `depth - 10` for a loss, so faster wins and slower losses are preferred.
/// Rolling boards prefer the fastest forced win, then a draw, then the
/// slowest loss. Ties keep the first move in row-major order.
#[instrument(skip(snapshot), fields(moves = snapshot.moves.len()))]
pub fn best_move(snapshot: &GameSnapshot, me: Player) -> Option<Coord> {
    if !snapshot.is_consistent() {
        debug!("Inconsistent snapshot, no search");
        return None;
    }
    if snapshot.config.rolling_mode {
        return rolling_best_move(snapshot, me);
    }

    let mut board = SearchBoard::from_snapshot(snapshot);
    let mut best: Option<(usize, i32)> = None;
    let mut alpha = i32::MIN;
    let beta = i32::MAX;
    let mut nodes = 0u64;

    for index in board.empty_indices() {
        let undo = board.play(index, me);
        let score = minimax(&mut board, 1, alpha, beta, false, me, &mut nodes);
        board.unplay(undo);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((index, score));
        }
        alpha = alpha.max(score);
    }

    debug!(nodes, score = best.map(|(_, s)| s), "Exact search finished");
    best.map(|(index, _)| Coord::new(index / board.size, index % board.size))
}

fn minimax(
    board: &mut SearchBoard,
    depth: usize,
    mut alpha: i32,
    mut beta: i32,
    maximizing: bool,
    me: Player,
    nodes: &mut u64,
) -> i32 {
    *nodes += 1;
    if let Some(winner) = board.winner() {
        return if winner == me {
            WIN_SCORE - depth as i32
        } else {
            depth as i32 - WIN_SCORE
        };
    }
    let moves = board.empty_indices();
    if moves.is_empty() {
        return 0;
    }

    let mover = if maximizing { me } else { me.opponent() };
    if maximizing {
        let mut best = i32::MIN;
        for index in moves {
            let undo = board.play(index, mover);
            let score = minimax(board, depth + 1, alpha, beta, false, me, nodes);
            board.unplay(undo);
            best = best.max(score);
            alpha = alpha.max(best);
            if beta <= alpha {
                break;
            }
        }
        best
    } else {
        let mut best = i32::MAX;
        for index in moves {
            let undo = board.play(index, mover);
            let score = minimax(board, depth + 1, alpha, beta, true, me, nodes);
            board.unplay(undo);
            best = best.min(score);
            beta = beta.min(best);
            if beta <= alpha {
                break;
            }
        }
        best
    }
}

/// Rules that shape a rolling game tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RollingRules {
    size: usize,
    win_condition: usize,
    cap: usize,
}

/// A rolling position. Only each player's own placement order matters for
/// eviction, so the two sequences are kept apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RollingKey {
    to_move: Player,
    /// X's live cells, oldest first.
    x: Vec<usize>,
    /// O's live cells, oldest first.
    o: Vec<usize>,
}

/// Game-theoretic value for the side to move, with plies until the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Win(u32),
    Loss(u32),
    Draw,
}

type RollingTable = HashMap<RollingKey, Outcome>;

impl RollingKey {
    fn empty() -> Self {
        Self {
            to_move: Player::X,
            x: Vec::new(),
            o: Vec::new(),
        }
    }

    fn from_snapshot(snapshot: &GameSnapshot, to_move: Player) -> Self {
        let size = snapshot.board.size();
        let cells_for = |player: Player| {
            snapshot
                .placements
                .iter()
                .filter(|p| p.player == player)
                .map(|p| p.row * size + p.col)
                .collect()
        };
        Self {
            to_move,
            x: cells_for(Player::X),
            o: cells_for(Player::O),
        }
    }

    fn cells(&self, size: usize) -> Vec<Option<Player>> {
        let mut cells = vec![None; size * size];
        for &i in &self.x {
            cells[i] = Some(Player::X);
        }
        for &i in &self.o {
            cells[i] = Some(Player::O);
        }
        cells
    }

    /// Positions after each legal move, with the cell played.
    fn successors(&self, rules: RollingRules, cells: &[Option<Player>]) -> Vec<(usize, RollingKey)> {
        (0..cells.len())
            .filter(|&i| cells[i].is_none())
            .map(|index| {
                let mut next = self.clone();
                let own = match self.to_move {
                    Player::X => &mut next.x,
                    Player::O => &mut next.o,
                };
                if own.len() >= rules.cap {
                    own.remove(0);
                }
                own.push(index);
                next.to_move = self.to_move.opponent();
                (index, next)
            })
            .collect()
    }
}

fn rolling_best_move(snapshot: &GameSnapshot, me: Player) -> Option<Coord> {
    let rules = RollingRules {
        size: snapshot.board.size(),
        win_condition: snapshot.config.win_condition,
        cap: snapshot.config.rolling_cap(),
    };
    let root = RollingKey::from_snapshot(snapshot, me);
    let table = table_for(rules, &root);

    let mut best: Option<(usize, i64)> = None;
    for (index, child) in root.successors(rules, &root.cells(rules.size)) {
        // The child is valued for the opponent.
        let score = match table.get(&child).copied().unwrap_or(Outcome::Draw) {
            Outcome::Loss(plies) => 1_000_000 - i64::from(plies),
            Outcome::Draw => 0,
            Outcome::Win(plies) => i64::from(plies) - 1_000_000,
        };
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((index, score));
        }
    }
    debug!(score = best.map(|(_, s)| s), "Rolling search finished");
    best.map(|(index, _)| Coord::new(index / rules.size, index % rules.size))
}

fn table_for(rules: RollingRules, root: &RollingKey) -> Arc<RollingTable> {
    let table = Arc::clone(
        ROLLING_TABLES
            .entry(rules)
            .or_insert_with(|| Arc::new(solve_rolling(rules, &RollingKey::empty())))
            .value(),
    );
    if table.contains_key(root) {
        table
    } else {
        debug!("Position unreachable from the empty board, solving it alone");
        Arc::new(solve_rolling(rules, root))
    }
}

/// Solves every position reachable from `root`.
///
/// Positions are enumerated breadth-first, then values flow backwards from
/// won positions: a position with a losing successor is a win, one whose
/// successors are all wins is a loss. Whatever is left can be played
/// forever and is a draw.
#[instrument(skip(root))]
fn solve_rolling(rules: RollingRules, root: &RollingKey) -> RollingTable {
    let mut ids: HashMap<RollingKey, usize> = HashMap::new();
    let mut keys: Vec<RollingKey> = Vec::new();
    let mut parents: Vec<Vec<usize>> = Vec::new();
    let mut remaining: Vec<usize> = Vec::new();
    let mut outcome: Vec<Option<Outcome>> = Vec::new();
    let mut frontier = VecDeque::new();

    ids.insert(root.clone(), 0);
    keys.push(root.clone());
    parents.push(Vec::new());
    remaining.push(0);
    outcome.push(None);
    frontier.push_back(0);

    while let Some(id) = frontier.pop_front() {
        let key = keys[id].clone();
        let cells = key.cells(rules.size);
        if let Some(winner) = line_winner(&cells, rules.size, rules.win_condition) {
            outcome[id] = Some(if winner == key.to_move {
                Outcome::Win(0)
            } else {
                Outcome::Loss(0)
            });
            continue;
        }
        let successors = key.successors(rules, &cells);
        if successors.is_empty() {
            outcome[id] = Some(Outcome::Draw);
            continue;
        }
        remaining[id] = successors.len();
        for (_, child) in successors {
            let child_id = match ids.get(&child) {
                Some(&known) => known,
                None => {
                    let fresh = keys.len();
                    ids.insert(child.clone(), fresh);
                    keys.push(child);
                    parents.push(Vec::new());
                    remaining.push(0);
                    outcome.push(None);
                    frontier.push_back(fresh);
                    fresh
                }
            };
            parents[child_id].push(id);
        }
    }

    // Decided positions in order of plies to the end.
    let mut decided: VecDeque<usize> = (0..keys.len())
        .filter(|&id| matches!(outcome[id], Some(Outcome::Win(_) | Outcome::Loss(_))))
        .collect();
    while let Some(id) = decided.pop_front() {
        let value = outcome[id];
        for &parent in &parents[id] {
            if outcome[parent].is_some() {
                continue;
            }
            match value {
                Some(Outcome::Loss(plies)) => {
                    outcome[parent] = Some(Outcome::Win(plies + 1));
                    decided.push_back(parent);
                }
                Some(Outcome::Win(plies)) => {
                    remaining[parent] -= 1;
                    if remaining[parent] == 0 {
                        outcome[parent] = Some(Outcome::Loss(plies + 1));
                        decided.push_back(parent);
                    }
                }
                _ => {}
            }
        }
    }

    info!(positions = keys.len(), "Rolling positions solved");
    ids.into_iter()
        .map(|(key, id)| (key, outcome[id].unwrap_or(Outcome::Draw)))
        .collect()
}
