//! Occupancy grid for a single planning request.
//!
//! The grid tracks which cells are taken, what lies in them (length and
//! category) and how much row length each `(floor, row)` has consumed.
//! It also answers the one question every placement pass and the layout
//! validator ask: "what does this cell rest on?"

use crate::types::{Category, GridBounds, GridPosition};

/// What occupies a cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellRecord {
    pub length: f64,
    pub category: Category,
    /// Index of the package (or fragment) that owns the cell.
    pub owner: usize,
}

/// How the support lookup walks the cells below a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupportMode {
    /// Nearest lower floor first; on each floor the same column, then any
    /// occupied column of the row.
    Strict,
    /// The same column on every lower floor first (nearest first); only if
    /// that column is empty all the way down, any occupied column of the row.
    Relaxed,
}

/// The cell a position was found to rest on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SupportHit {
    pub position: GridPosition,
    pub category: Category,
}

/// Dense `[floor][row][column]` occupancy plus per-row used length.
#[derive(Clone, Debug)]
pub struct OccupancyGrid {
    bounds: GridBounds,
    cells: Vec<Option<CellRecord>>,
    used_length: Vec<f64>,
}

impl OccupancyGrid {
    /// Creates an empty grid.
    pub fn new(bounds: GridBounds) -> Self {
        Self {
            bounds,
            cells: vec![None; bounds.cell_count()],
            used_length: vec![0.0; (bounds.floors * bounds.rows) as usize],
        }
    }

    pub fn bounds(&self) -> &GridBounds {
        &self.bounds
    }

    fn cell_index(&self, pos: GridPosition) -> Option<usize> {
        if !pos.is_within(&self.bounds) {
            return None;
        }
        let floor = (pos.floor - 1) as usize;
        let row = (pos.row - 1) as usize;
        let column = (pos.column - 1) as usize;
        let rows = self.bounds.rows as usize;
        let columns = self.bounds.columns as usize;
        Some((floor * rows + row) * columns + column)
    }

    fn row_index(&self, floor: u32, row: u32) -> Option<usize> {
        if !(1..=self.bounds.floors).contains(&floor) || !(1..=self.bounds.rows).contains(&row) {
            return None;
        }
        Some(((floor - 1) * self.bounds.rows + (row - 1)) as usize)
    }

    /// Returns the record at `pos`, if the cell is taken.
    pub fn cell(&self, pos: GridPosition) -> Option<&CellRecord> {
        self.cell_index(pos).and_then(|idx| self.cells[idx].as_ref())
    }

    /// Whether `pos` is taken. Positions outside the grid count as taken.
    pub fn is_occupied(&self, pos: GridPosition) -> bool {
        match self.cell_index(pos) {
            Some(idx) => self.cells[idx].is_some(),
            None => true,
        }
    }

    /// Occupies `pos` and books the record's length against its row.
    ///
    /// # Returns
    /// `false` (and no change) if the cell is outside the grid or taken.
    pub fn place(&mut self, pos: GridPosition, record: CellRecord) -> bool {
        let Some(idx) = self.cell_index(pos) else {
            return false;
        };
        if self.cells[idx].is_some() {
            return false;
        }
        self.cells[idx] = Some(record);
        if let Some(row_idx) = self.row_index(pos.floor, pos.row) {
            self.used_length[row_idx] += record.length;
        }
        true
    }

    /// Cumulative length booked on `(floor, row)`.
    pub fn row_used_length(&self, floor: u32, row: u32) -> f64 {
        self.row_index(floor, row)
            .map(|idx| self.used_length[idx])
            .unwrap_or(0.0)
    }

    /// Occupied cells of `(floor, row)` in ascending column order.
    pub fn row_cells(
        &self,
        floor: u32,
        row: u32,
    ) -> impl Iterator<Item = (GridPosition, &CellRecord)> + '_ {
        (1..=self.bounds.columns).filter_map(move |column| {
            let pos = GridPosition::new(floor, row, column);
            self.cell(pos).map(|record| (pos, record))
        })
    }

    pub fn row_is_empty(&self, floor: u32, row: u32) -> bool {
        self.row_cells(floor, row).next().is_none()
    }

    /// First free column of `(floor, row)`, scanning ascending.
    pub fn first_free_column(&self, floor: u32, row: u32) -> Option<GridPosition> {
        (1..=self.bounds.columns)
            .map(|column| GridPosition::new(floor, row, column))
            .find(|pos| !self.is_occupied(*pos))
    }

    /// Finds the cell `pos` rests on.
    ///
    /// Positions on floor 1 have no cell below and always return `None`.
    pub fn find_support(&self, pos: GridPosition, mode: SupportMode) -> Option<SupportHit> {
        if pos.floor <= 1 {
            return None;
        }
        let lower_floors = (1..pos.floor).rev();

        let same_column = |floor: u32| {
            let below = GridPosition::new(floor, pos.row, pos.column);
            self.cell(below).map(|record| SupportHit {
                position: below,
                category: record.category,
            })
        };
        let any_column = |floor: u32| {
            self.row_cells(floor, pos.row)
                .next()
                .map(|(below, record)| SupportHit {
                    position: below,
                    category: record.category,
                })
        };

        match mode {
            SupportMode::Strict => lower_floors
                .into_iter()
                .find_map(|floor| same_column(floor).or_else(|| any_column(floor))),
            SupportMode::Relaxed => lower_floors
                .clone()
                .find_map(same_column)
                .or_else(|| lower_floors.into_iter().find_map(any_column)),
        }
    }

    /// Whether something of `category` at `pos` rests on compatible support
    /// under either lookup mode.
    pub fn supports(&self, pos: GridPosition, category: Category) -> bool {
        if pos.is_ground() {
            return true;
        }
        [SupportMode::Strict, SupportMode::Relaxed]
            .into_iter()
            .filter_map(|mode| self.find_support(pos, mode))
            .any(|hit| category.can_rest_on(hit.category))
    }
}
