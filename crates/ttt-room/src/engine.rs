//! Pure, stateless tic-tac-toe rules (C1).
//!
//! Nothing here touches a room, a lock, or a clock — every function takes
//! its inputs and returns an answer. Higher layers (`state`) are
//! responsible for deciding when these are called and what to do with the
//! result.

use rand::Rng;
use ttt_protocol::{empty_board, Board, Cell, Symbol};

/// The 8 index triples that constitute a winning line: 3 rows, 3 columns,
/// 2 diagonals.
const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A fresh, all-empty board.
pub fn create_board() -> Board {
    empty_board()
}

/// Randomly assigns symbols to the first and second player to join, with
/// equal probability of either ordering. "X" always moves first regardless
/// of which player holds it.
pub fn assign_symbols(rng: &mut impl Rng) -> (Symbol, Symbol) {
    if rng.random() {
        (Symbol::X, Symbol::O)
    } else {
        (Symbol::O, Symbol::X)
    }
}

/// The result of attempting to play `symbol` at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    InvalidIndex,
    CellTaken,
    Win(Symbol),
    Draw,
    /// The game continues; the next symbol to move is carried so callers
    /// don't need to re-derive it.
    Continue(Symbol),
}

/// Applies `symbol`'s move at `index`, mutating `board` in place unless the
/// move is rejected (`InvalidIndex`/`CellTaken`, which leave it untouched).
pub fn try_apply_move(board: &mut Board, symbol: Symbol, index: usize) -> MoveOutcome {
    if index >= board.len() {
        return MoveOutcome::InvalidIndex;
    }
    if !board[index].is_empty() {
        return MoveOutcome::CellTaken;
    }

    board[index] = Cell::from_symbol(symbol);

    if let Some(winner) = check_winner(board) {
        return MoveOutcome::Win(winner);
    }
    if is_full(board) {
        return MoveOutcome::Draw;
    }
    MoveOutcome::Continue(symbol.opponent())
}

/// Returns the symbol completing any of the 8 winning lines, if one exists.
pub fn check_winner(board: &Board) -> Option<Symbol> {
    for [a, b, c] in WINNING_LINES {
        if board[a] == board[b] && board[b] == board[c] {
            if let Some(symbol) = board[a].symbol() {
                return Some(symbol);
            }
        }
    }
    None
}

/// `true` once every cell is occupied.
pub fn is_full(board: &Board) -> bool {
    board.iter().all(|cell| !cell.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttt_protocol::Symbol::{O, X};

    fn play(board: &mut Board, moves: &[(Symbol, usize)]) -> MoveOutcome {
        let mut outcome = MoveOutcome::Continue(X);
        for &(symbol, index) in moves {
            outcome = try_apply_move(board, symbol, index);
        }
        outcome
    }

    #[test]
    fn win_path_detects_top_row_for_x() {
        // X0, O3, X1, O4, X2 -> X completes the top row.
        let mut board = create_board();
        let outcome = play(
            &mut board,
            &[(X, 0), (O, 3), (X, 1), (O, 4), (X, 2)],
        );
        assert_eq!(outcome, MoveOutcome::Win(X));
        assert_eq!(check_winner(&board), Some(X));
    }

    #[test]
    fn draw_path_fills_board_with_no_winner() {
        // X0,O1,X2,O3,X5,O4,X6,O8,X7 -> full board, no winner.
        let mut board = create_board();
        let outcome = play(
            &mut board,
            &[
                (X, 0),
                (O, 1),
                (X, 2),
                (O, 3),
                (X, 5),
                (O, 4),
                (X, 6),
                (O, 8),
                (X, 7),
            ],
        );
        assert_eq!(outcome, MoveOutcome::Draw);
        assert!(is_full(&board));
        assert_eq!(check_winner(&board), None);
    }

    #[test]
    fn continue_toggles_to_the_other_symbol() {
        let mut board = create_board();
        let outcome = try_apply_move(&mut board, X, 0);
        assert_eq!(outcome, MoveOutcome::Continue(O));
    }

    #[test]
    fn invalid_index_is_rejected_without_mutating_board() {
        let mut board = create_board();
        let outcome = try_apply_move(&mut board, X, 9);
        assert_eq!(outcome, MoveOutcome::InvalidIndex);
        assert!(board.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn occupied_cell_is_rejected_without_mutating_board() {
        let mut board = create_board();
        try_apply_move(&mut board, X, 0);
        let outcome = try_apply_move(&mut board, O, 0);
        assert_eq!(outcome, MoveOutcome::CellTaken);
        assert_eq!(board[0].symbol(), Some(X));
    }

    #[test]
    fn assign_symbols_produces_both_orderings_over_many_draws() {
        let mut rng = rand::rng();
        let mut saw_x_first = false;
        let mut saw_o_first = false;
        for _ in 0..200 {
            match assign_symbols(&mut rng) {
                (X, O) => saw_x_first = true,
                (O, X) => saw_o_first = true,
                other => panic!("unexpected pairing: {other:?}"),
            }
        }
        assert!(saw_x_first && saw_o_first);
    }
}
