//! The live 2-D grid of tile slots.
//!
//! Stored column-major as a deque of column deques, so whole rows and
//! columns can be added or dropped at any of the four edges in time
//! proportional to the edge length.

use std::collections::VecDeque;

use super::state::TileWindow;
use crate::tile::{TileImage, TileKey};

/// One displayed tile position and the image currently shown there.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSlot {
    /// Tile shown in this slot.
    pub key: TileKey,
    /// Image shown, possibly a placeholder.
    pub image: TileImage,
}

/// Grid edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Left,
    Bottom,
    Right,
}

#[derive(Debug, Default)]
pub(crate) struct TileGrid {
    left: i32,
    top: i32,
    columns: VecDeque<VecDeque<TileSlot>>,
}

impl TileGrid {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.front().map_or(0, VecDeque::len)
    }

    pub fn len(&self) -> usize {
        self.column_count() * self.row_count()
    }

    /// Current tile window, or `None` when empty.
    pub fn window(&self) -> Option<TileWindow> {
        if self.is_empty() || self.row_count() == 0 {
            return None;
        }
        Some(TileWindow {
            left: self.left,
            top: self.top,
            right: self.left + self.column_count() as i32 - 1,
            bottom: self.top + self.row_count() as i32 - 1,
        })
    }

    /// Removes every slot and returns them.
    pub fn clear(&mut self) -> Vec<TileSlot> {
        self.columns.drain(..).flatten().collect()
    }

    /// Replaces the grid with `window`, filling each slot with `fill`.
    pub fn fill(&mut self, window: TileWindow, mut fill: impl FnMut(i32, i32) -> TileSlot) {
        self.left = window.left;
        self.top = window.top;
        self.columns = (window.left..=window.right)
            .map(|x| (window.top..=window.bottom).map(|y| fill(x, y)).collect())
            .collect();
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&TileSlot> {
        let col = usize::try_from(x - self.left).ok()?;
        let row = usize::try_from(y - self.top).ok()?;
        self.columns.get(col)?.get(row)
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut TileSlot> {
        let col = usize::try_from(x - self.left).ok()?;
        let row = usize::try_from(y - self.top).ok()?;
        self.columns.get_mut(col)?.get_mut(row)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileSlot> {
        self.columns.iter().flatten()
    }

    /// Adds one row or column beyond `edge`. `fill` receives the tile index
    /// of each new slot, in order along the edge.
    pub fn grow(&mut self, edge: Edge, mut fill: impl FnMut(i32, i32) -> TileSlot) {
        let Some(window) = self.window() else {
            return;
        };

        match edge {
            Edge::Top => {
                let y = window.top - 1;
                for (i, column) in self.columns.iter_mut().enumerate() {
                    column.push_front(fill(window.left + i as i32, y));
                }
                self.top = y;
            }
            Edge::Bottom => {
                let y = window.bottom + 1;
                for (i, column) in self.columns.iter_mut().enumerate() {
                    column.push_back(fill(window.left + i as i32, y));
                }
            }
            Edge::Left => {
                let x = window.left - 1;
                let column = (window.top..=window.bottom).map(|y| fill(x, y)).collect();
                self.columns.push_front(column);
                self.left = x;
            }
            Edge::Right => {
                let x = window.right + 1;
                let column = (window.top..=window.bottom).map(|y| fill(x, y)).collect();
                self.columns.push_back(column);
            }
        }
    }

    /// Drops the row or column at `edge` and returns its slots.
    ///
    /// The grid always keeps at least one row and one column; shrinking past
    /// that returns nothing.
    pub fn shrink(&mut self, edge: Edge) -> Vec<TileSlot> {
        match edge {
            Edge::Top | Edge::Bottom if self.row_count() <= 1 => Vec::new(),
            Edge::Left | Edge::Right if self.column_count() <= 1 => Vec::new(),
            Edge::Top => {
                self.top += 1;
                self.columns.iter_mut().filter_map(VecDeque::pop_front).collect()
            }
            Edge::Bottom => self.columns.iter_mut().filter_map(VecDeque::pop_back).collect(),
            Edge::Left => {
                self.left += 1;
                self.columns.pop_front().map(Vec::from).unwrap_or_default()
            }
            Edge::Right => self.columns.pop_back().map(Vec::from).unwrap_or_default(),
        }
    }
}
