//! Invariant checks for finished layouts.
//!
//! Rebuilds an occupancy grid from placed fragments and reports every cell
//! conflict, overfull row, unsupported fragment and small-over-large stack.
//! Used to guard the row balancer and to vet plans from the remote optimizer.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::grid::{CellRecord, OccupancyGrid, SupportMode};
use crate::model::LayoutFragment;
use crate::types::{GridBounds, GridPosition, Measured};

/// A broken layout invariant.
#[derive(Clone, Debug, PartialEq, Error, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutViolation {
    #[error("fragment {fragment} lies outside the grid at {position}")]
    OutOfBounds {
        fragment: usize,
        position: GridPosition,
    },
    #[error("fragment {fragment} shares cell {position} with another fragment")]
    CellConflict {
        fragment: usize,
        position: GridPosition,
    },
    #[error("row {row} on floor {floor} uses {used:.3}m of {capacity:.3}m")]
    RowOverCapacity {
        floor: u32,
        row: u32,
        used: f64,
        capacity: f64,
    },
    #[error("fragment {fragment} at {position} has nothing below it")]
    MissingSupport {
        fragment: usize,
        position: GridPosition,
    },
    #[error("small fragment {fragment} at {position} rests on a large bundle")]
    IncompatibleSupport {
        fragment: usize,
        position: GridPosition,
    },
}

/// Checks `fragments` against the grid bounds, row capacity, support and
/// stacking compatibility.
///
/// # Returns
/// All violations found; an empty list means the layout is sound.
pub fn validate_layout(
    fragments: &[LayoutFragment],
    bounds: GridBounds,
    max_row_length: f64,
    epsilon: f64,
) -> Vec<LayoutViolation> {
    let mut violations = Vec::new();
    let mut grid = OccupancyGrid::new(bounds);
    let mut placed = Vec::new();

    for (fragment, entry) in fragments.iter().enumerate() {
        let Some(position) = entry.grid_position else {
            continue;
        };
        if !position.is_within(&bounds) {
            violations.push(LayoutViolation::OutOfBounds { fragment, position });
            continue;
        }
        let record = CellRecord {
            length: entry.length(),
            category: entry.category,
            owner: fragment,
        };
        if !grid.place(position, record) {
            violations.push(LayoutViolation::CellConflict { fragment, position });
            continue;
        }
        placed.push((fragment, position, entry.category));
    }

    for floor in 1..=bounds.floors {
        for row in 1..=bounds.rows {
            let used = grid.row_used_length(floor, row);
            if used > max_row_length + epsilon {
                violations.push(LayoutViolation::RowOverCapacity {
                    floor,
                    row,
                    used,
                    capacity: max_row_length,
                });
            }
        }
    }

    for (fragment, position, category) in placed {
        if position.is_ground() {
            continue;
        }
        if grid.find_support(position, SupportMode::Strict).is_none() {
            violations.push(LayoutViolation::MissingSupport { fragment, position });
        } else if !grid.supports(position, category) {
            violations.push(LayoutViolation::IncompatibleSupport { fragment, position });
        }
    }

    violations
}
