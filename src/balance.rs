//! Post-placement row balancing.
//!
//! Within each floor, rows are renumbered so that rows carrying long bundles
//! and the most row length end up in the lowest row slots. The balancer only
//! remaps positions; it never re-runs placement.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::LayoutFragment;
use crate::types::{GridBounds, Measured};
use crate::validator::validate_layout;

/// Aggregates of one occupied `(floor, row)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowStats {
    pub floor: u32,
    pub row: u32,
    /// Σ fragment length.
    pub total_length: f64,
    /// Σ fragment length × quantity.
    pub weighted_size: f64,
    pub has_large: bool,
}

/// Old-row → new-row mapping, per floor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowMapping {
    moves: BTreeMap<(u32, u32), u32>,
}

impl RowMapping {
    /// New row for `(floor, row)`; rows without an entry keep their index.
    pub fn new_row(&self, floor: u32, row: u32) -> u32 {
        self.moves.get(&(floor, row)).copied().unwrap_or(row)
    }

    /// Whether the mapping moves no row at all.
    pub fn is_identity(&self) -> bool {
        self.moves.iter().all(|(&(_, old), &new)| old == new)
    }

    /// Number of rows that change index.
    pub fn moved_rows(&self) -> usize {
        self.moves
            .iter()
            .filter(|&(&(_, old), &new)| old != new)
            .count()
    }
}

/// Outcome of a balancing run.
#[derive(Clone, Debug)]
pub struct BalanceOutcome {
    pub fragments: Vec<LayoutFragment>,
    pub mapping: RowMapping,
    /// `false` when the mapping was discarded to keep the layout sound.
    pub applied: bool,
}

/// Collects per-row statistics of the placed fragments.
pub fn row_stats(fragments: &[LayoutFragment]) -> Vec<RowStats> {
    let mut rows: BTreeMap<(u32, u32), RowStats> = BTreeMap::new();
    for fragment in fragments {
        let Some(pos) = fragment.grid_position else {
            continue;
        };
        let stats = rows.entry((pos.floor, pos.row)).or_insert(RowStats {
            floor: pos.floor,
            row: pos.row,
            total_length: 0.0,
            weighted_size: 0.0,
            has_large: false,
        });
        stats.total_length += fragment.length();
        stats.weighted_size += fragment.length() * fragment.quantity as f64;
        stats.has_large |= fragment.category.is_large();
    }
    rows.into_values().collect()
}

/// Computes the row remap for every floor.
///
/// Rows with a large bundle take the lowest slots, then the remaining rows
/// follow by descending total length (weighted size and the old index break
/// ties). Occupied rows are packed into slots `1..=k`.
pub fn row_mapping(fragments: &[LayoutFragment]) -> RowMapping {
    let mut per_floor: BTreeMap<u32, Vec<RowStats>> = BTreeMap::new();
    for stats in row_stats(fragments) {
        per_floor.entry(stats.floor).or_default().push(stats);
    }

    let mut moves = BTreeMap::new();
    for (floor, mut rows) in per_floor {
        rows.sort_by(|a, b| {
            b.has_large
                .cmp(&a.has_large)
                .then_with(|| b.total_length.total_cmp(&a.total_length))
                .then_with(|| b.weighted_size.total_cmp(&a.weighted_size))
                .then_with(|| a.row.cmp(&b.row))
        });
        for (slot, stats) in rows.iter().enumerate() {
            moves.insert((floor, stats.row), slot as u32 + 1);
        }
    }
    RowMapping { moves }
}

/// Applies `mapping` to every placed fragment; unplaced ones pass through.
pub fn apply_mapping(fragments: &[LayoutFragment], mapping: &RowMapping) -> Vec<LayoutFragment> {
    fragments
        .iter()
        .map(|fragment| LayoutFragment {
            grid_position: fragment
                .grid_position
                .map(|pos| pos.with_row(mapping.new_row(pos.floor, pos.row))),
            ..fragment.clone()
        })
        .collect()
}

/// Rebalances rows unless doing so would break a layout invariant.
pub fn balance_rows(
    fragments: Vec<LayoutFragment>,
    bounds: GridBounds,
    max_row_length: f64,
    epsilon: f64,
) -> BalanceOutcome {
    let mapping = row_mapping(&fragments);
    if mapping.is_identity() {
        return BalanceOutcome {
            fragments,
            mapping,
            applied: true,
        };
    }

    let remapped = apply_mapping(&fragments, &mapping);
    let violations = validate_layout(&remapped, bounds, max_row_length, epsilon);
    if violations.is_empty() {
        debug!(moved_rows = mapping.moved_rows(), "rows rebalanced");
        BalanceOutcome {
            fragments: remapped,
            mapping,
            applied: true,
        }
    } else {
        debug!(
            violations = violations.len(),
            first = %violations[0],
            "row balancing skipped"
        );
        BalanceOutcome {
            fragments,
            mapping,
            applied: false,
        }
    }
}
