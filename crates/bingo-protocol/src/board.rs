//! Board, cell, goal, and color types.
//!
//! A board is a fixed 5×5 grid. Each cell holds one goal and the *set* of
//! colors that currently claim it. Colors are not player identities: two
//! players sharing a color share their marks.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Number of rows and columns on every board.
pub const BOARD_SIZE: usize = 5;

/// Number of goals needed to fill a board.
pub const BOARD_CELLS: usize = BOARD_SIZE * BOARD_SIZE;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// A player color, e.g. `"blue"` or `"#ff7f00"`.
///
/// Serialized as a plain string. `Ord` is derived so a cell's color set
/// has a stable wire order.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Color assigned to players who have never picked one.
    pub const DEFAULT: &'static str = "blue";

    pub fn new(color: impl Into<String>) -> Self {
        Self(color.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl From<&str> for Color {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Goal
// ---------------------------------------------------------------------------

/// A goal reference as supplied by the game catalog.
///
/// The core never interprets goals; it only stores them in cells and hides
/// them while a board is hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Goal {
    /// Creates a goal with only an id and display text.
    pub fn new(id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            description: None,
            difficulty: None,
            categories: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// One grid position: a goal plus the colors that have claimed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub goal: Goal,
    #[serde(default)]
    pub colors: BTreeSet<Color>,
}

impl Cell {
    /// Creates an unmarked cell.
    pub fn new(goal: Goal) -> Self {
        Self {
            goal,
            colors: BTreeSet::new(),
        }
    }

    /// Adds `color` to the cell. Returns `false` if it was already there.
    pub fn mark(&mut self, color: Color) -> bool {
        self.colors.insert(color)
    }

    /// Removes `color` from the cell. Returns `false` if it was absent.
    pub fn unmark(&mut self, color: &Color) -> bool {
        self.colors.remove(color)
    }

    /// Returns `true` if `color` currently claims this cell.
    pub fn is_marked_by(&self, color: &Color) -> bool {
        self.colors.contains(color)
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// The grid of cells for a room.
///
/// On the wire this is `{"board": Cell[][], "hidden": bool}`. A hidden
/// board sent to a client carries no rows at all (see
/// [`client_view`](Board::client_view)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub board: Vec<Vec<Cell>>,
    #[serde(default)]
    pub hidden: bool,
}

impl Board {
    /// Lays out exactly [`BOARD_CELLS`] goals row by row.
    pub fn from_goals(
        goals: Vec<Goal>,
        hidden: bool,
    ) -> Result<Self, ProtocolError> {
        if goals.len() != BOARD_CELLS {
            return Err(ProtocolError::BoardSize {
                expected: BOARD_CELLS,
                actual: goals.len(),
            });
        }
        let mut cells = goals.into_iter().map(Cell::new);
        let board = (0..BOARD_SIZE)
            .map(|_| cells.by_ref().take(BOARD_SIZE).collect())
            .collect();
        Ok(Self { board, hidden })
    }

    /// A hidden board with its content withheld.
    pub fn hidden_placeholder() -> Self {
        Self {
            board: Vec::new(),
            hidden: true,
        }
    }

    pub fn height(&self) -> usize {
        self.board.len()
    }

    pub fn width(&self) -> usize {
        self.board.first().map_or(0, Vec::len)
    }

    /// Returns `true` if `(row, col)` lies inside the grid.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.board.get(row).is_some_and(|r| col < r.len())
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.board.get(row)?.get(col)
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.board.get_mut(row)?.get_mut(col)
    }

    /// The board as it may be shown to a client.
    ///
    /// A hidden board never leaves the authority with its cells attached.
    pub fn client_view(&self) -> Self {
        if self.hidden {
            Self::hidden_placeholder()
        } else {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goals(n: usize) -> Vec<Goal> {
        (0..n)
            .map(|i| Goal::new(format!("g{i}"), format!("Goal {i}")))
            .collect()
    }

    #[test]
    fn test_from_goals_lays_out_five_by_five() {
        let board = Board::from_goals(goals(25), false).unwrap();
        assert_eq!(board.height(), 5);
        assert_eq!(board.width(), 5);
        assert_eq!(board.cell(1, 0).unwrap().goal.id, "g5");
        assert_eq!(board.cell(4, 4).unwrap().goal.id, "g24");
    }

    #[test]
    fn test_from_goals_wrong_count_is_rejected() {
        let err = Board::from_goals(goals(24), false).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::BoardSize { expected: 25, actual: 24 }
        ));
    }

    #[test]
    fn test_contains_checks_both_axes() {
        let board = Board::from_goals(goals(25), false).unwrap();
        assert!(board.contains(0, 0));
        assert!(board.contains(4, 4));
        assert!(!board.contains(5, 0));
        assert!(!board.contains(0, 5));
    }

    #[test]
    fn test_mark_and_unmark_fold_as_set_operations() {
        let mut cell = Cell::new(Goal::new("g", "Goal"));
        let blue = Color::from("blue");
        let red = Color::from("red");

        assert!(cell.mark(blue.clone()));
        assert!(!cell.mark(blue.clone()), "second mark is a no-op");
        assert!(cell.mark(red.clone()));
        assert!(!cell.unmark(&Color::from("green")), "absent unmark is a no-op");
        assert!(cell.unmark(&blue));

        let expected: BTreeSet<Color> = [red].into_iter().collect();
        assert_eq!(cell.colors, expected);
    }

    #[test]
    fn test_mark_sequence_matches_reference_fold() {
        // (is_mark, color) pairs, replayed against a plain set.
        let ops = [
            (true, "blue"),
            (true, "red"),
            (false, "blue"),
            (true, "red"),
            (false, "green"),
            (true, "blue"),
            (false, "red"),
        ];
        let mut cell = Cell::new(Goal::new("g", "Goal"));
        let mut reference = BTreeSet::new();
        for (is_mark, color) in ops {
            if is_mark {
                cell.mark(Color::from(color));
                reference.insert(Color::from(color));
            } else {
                cell.unmark(&Color::from(color));
                reference.remove(&Color::from(color));
            }
        }
        assert_eq!(cell.colors, reference);
    }

    #[test]
    fn test_client_view_withholds_hidden_content() {
        let board = Board::from_goals(goals(25), true).unwrap();
        let view = board.client_view();
        assert!(view.hidden);
        assert!(view.board.is_empty());
    }

    #[test]
    fn test_client_view_of_visible_board_is_identical() {
        let board = Board::from_goals(goals(25), false).unwrap();
        assert_eq!(board.client_view(), board);
    }

    #[test]
    fn test_cell_colors_serialize_sorted() {
        let mut cell = Cell::new(Goal::new("g", "Goal"));
        cell.mark(Color::from("red"));
        cell.mark(Color::from("blue"));
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["colors"], serde_json::json!(["blue", "red"]));
    }

    #[test]
    fn test_cell_duplicate_colors_collapse_on_decode() {
        let json = r#"{"goal":{"id":"g","goal":"Goal"},"colors":["red","red"]}"#;
        let cell: Cell = serde_json::from_str(json).unwrap();
        assert_eq!(cell.colors.len(), 1);
    }
}
