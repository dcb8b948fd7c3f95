//! Parsing of typed terminal commands.

use anyhow::{anyhow, bail, Result};
use uttt_sync::UiCommand;

/// What the player typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Forward to the coordinator.
    Command(UiCommand),
    /// Print the command list.
    Help,
    /// Nothing typed.
    Empty,
}

pub const HELP: &str = "\
Commands:
  <board> <cell>   play a move, both 0-8 (e.g. `4 0`)
  reset            start a new game
  help             show this list
  quit             leave and exit";

/// Parses one line of input.
///
/// Accepts `b c`, `b,c` and `bc` for moves.
pub fn parse(line: &str) -> Result<Input> {
    let line = line.trim();

    match line.to_ascii_lowercase().as_str() {
        "" => return Ok(Input::Empty),
        "help" | "h" | "?" => return Ok(Input::Help),
        "reset" | "r" | "new" => return Ok(Input::Command(UiCommand::Reset)),
        "quit" | "q" | "exit" | "leave" => return Ok(Input::Command(UiCommand::Leave)),
        _ => {}
    }

    let digits: Vec<&str> = if line.len() == 2 && line.chars().all(|c| c.is_ascii_digit()) {
        vec![&line[..1], &line[1..]]
    } else {
        line.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .collect()
    };

    let [board, cell] = digits.as_slice() else {
        bail!("expected `<board> <cell>`, got `{}`", line);
    };
    let board = board
        .parse::<usize>()
        .map_err(|_| anyhow!("board must be a number, got `{}`", board))?;
    let cell = cell
        .parse::<usize>()
        .map_err(|_| anyhow!("cell must be a number, got `{}`", cell))?;

    Ok(Input::Command(UiCommand::Move { board, cell }))
}
