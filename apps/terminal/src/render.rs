//! ASCII rendering of the meta-board.
//!
//! Sub-board `b` occupies the 3x3 block at row `b / 3`, column `b % 3`;
//! cell `c` sits at row `c / 3`, column `c % 3` inside it.

use chrono::{DateTime, Utc};
use uttt_core::engine::remaining_time_ms;
use uttt_core::{ActiveBoard, BoardResult, Cell, GameState, GameWinner, Player, GRID_SIZE};

const BLOCK_SEPARATOR: &str = "  ------+-------+------";

/// Renders the 9x9 grid, with a separator between sub-boards.
pub fn render_board(state: &GameState) -> String {
    let mut output = String::new();

    for row in 0..GRID_SIZE {
        if row > 0 && row % 3 == 0 {
            output.push_str(BLOCK_SEPARATOR);
            output.push('\n');
        }
        output.push_str("  ");

        for col in 0..GRID_SIZE {
            if col > 0 && col % 3 == 0 {
                output.push_str("| ");
            }
            let board = (row / 3) * 3 + col / 3;
            let cell = (row % 3) * 3 + col % 3;
            output.push(symbol(state, board, cell));
            output.push(' ');
        }

        output.truncate(output.trim_end().len());
        output.push('\n');
    }

    output
}

fn symbol(state: &GameState, board: usize, cell: usize) -> char {
    match state.cell(board, cell) {
        Some(Cell::X) => 'X',
        Some(Cell::O) => 'O',
        // Empty cells of a decided board can never be played.
        _ if state.won_boards()[board].is_decided() => ' ',
        _ => '.',
    }
}

/// Formats a clock reading as `m:ss`.
pub fn format_clock(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// One-line summary of whose turn it is, or who won.
pub fn status_line(state: &GameState) -> String {
    if let Some(winner) = state.game_winner() {
        return match winner {
            GameWinner::Tie => "Game over: tie".to_string(),
            player => format!("Game over: {} wins", player),
        };
    }

    let target = match state.active_board() {
        ActiveBoard::Any => "any board".to_string(),
        ActiveBoard::Board(b) => format!("board {}", b),
    };
    format!("{} to move on {}", state.current_player(), target)
}

/// Sub-board results, e.g. `X . . | . O . | . . tie`.
pub fn results_line(state: &GameState) -> String {
    state
        .won_boards()
        .chunks(3)
        .map(|row| {
            row.iter()
                .map(|result| match result {
                    BoardResult::InProgress => ".",
                    BoardResult::WonByX => "X",
                    BoardResult::WonByO => "O",
                    BoardResult::Tie => "tie",
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Board, sub-board results, clocks and status.
pub fn render_state(state: &GameState, now: DateTime<Utc>) -> String {
    format!(
        "\n{}\n  boards: {}\n  clock:  X {}  O {}\n  {}\n",
        render_board(state),
        results_line(state),
        format_clock(remaining_time_ms(state, Player::X, now)),
        format_clock(remaining_time_ms(state, Player::O, now)),
        status_line(state),
    )
}
