//! Greedy placement of packages on the loading grid.
//!
//! Every package is offered to an ordered list of passes; the first pass that
//! finds a cell wins:
//! - `FloorOnePreference`: lowest floor, emptiest row first
//! - `SupportAware`: upper floors, first fit with strict support rules
//! - `Relaxed`: every floor, first fit with the relaxed support lookup
//!
//! A package no pass can place stays unplaced. That is a normal outcome, not
//! an error.

use tracing::debug;

use crate::grid::{CellRecord, OccupancyGrid, SupportMode};
use crate::packaging::Package;
use crate::types::{Category, GridBounds, GridPosition, Measured};

/// Placement strategy of a single pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementPass {
    FloorOnePreference,
    SupportAware,
    Relaxed,
}

impl PlacementPass {
    /// Order in which the passes are tried.
    pub const SEQUENCE: [PlacementPass; 3] = [
        PlacementPass::FloorOnePreference,
        PlacementPass::SupportAware,
        PlacementPass::Relaxed,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PlacementPass::FloorOnePreference => "floor_one_preference",
            PlacementPass::SupportAware => "support_aware",
            PlacementPass::Relaxed => "relaxed",
        }
    }

    /// Finds a cell for `package` without changing the grid.
    fn find_cell(self, ctx: &PlanningContext, package: &Package) -> Option<GridPosition> {
        match self {
            PlacementPass::FloorOnePreference => ctx.find_floor_one_cell(package),
            PlacementPass::SupportAware => ctx.first_fit(2, package, SupportMode::Strict),
            PlacementPass::Relaxed => ctx.first_fit(1, package, SupportMode::Relaxed),
        }
    }
}

/// Mutable state of one planning request.
///
/// Owns the occupancy grid; nothing is shared between requests.
#[derive(Clone, Debug)]
pub struct PlanningContext {
    grid: OccupancyGrid,
    max_row_length: f64,
    epsilon: f64,
}

impl PlanningContext {
    pub fn new(bounds: GridBounds, max_row_length: f64, epsilon: f64) -> Self {
        Self {
            grid: OccupancyGrid::new(bounds),
            max_row_length,
            epsilon,
        }
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn max_row_length(&self) -> f64 {
        self.max_row_length
    }

    /// Remaining row length on `(floor, row)`.
    pub fn remaining_capacity(&self, floor: u32, row: u32) -> f64 {
        self.max_row_length - self.grid.row_used_length(floor, row)
    }

    fn has_capacity(&self, floor: u32, row: u32, package: &Package) -> bool {
        package.fits_in(self.remaining_capacity(floor, row), self.epsilon)
    }

    /// Whether a package of `category` may sit on top of what lies below `pos`.
    ///
    /// Floor 1 always succeeds. Above it, the first occupied cell found below
    /// decides: large packages accept anything, small ones only small support.
    /// Nothing below means no support.
    pub fn can_place_on_top(&self, pos: GridPosition, category: Category, mode: SupportMode) -> bool {
        if pos.is_ground() {
            return true;
        }
        self.grid
            .find_support(pos, mode)
            .is_some_and(|hit| category.can_rest_on(hit.category))
    }

    /// Whether any lower floor holds something in the same row.
    pub fn check_support(&self, pos: GridPosition) -> bool {
        pos.is_ground() || self.grid.find_support(pos, SupportMode::Strict).is_some()
    }

    /// Whether occupying `pos` keeps every cell above it compatibly supported.
    ///
    /// Only a large package can break this: it may become the nearest support
    /// of a small package that already sits higher up in the same row.
    pub fn keeps_upper_floors_sound(&self, pos: GridPosition, category: Category) -> bool {
        let floors = self.grid.bounds().floors;
        let has_cells_above =
            ((pos.floor + 1)..=floors).any(|floor| !self.grid.row_is_empty(floor, pos.row));
        if !category.is_large() || !has_cells_above {
            return true;
        }

        let mut trial = self.grid.clone();
        let probe = CellRecord {
            length: 0.0,
            category,
            owner: usize::MAX,
        };
        if !trial.place(pos, probe) {
            return false;
        }
        ((pos.floor + 1)..=floors).all(|floor| {
            trial
                .row_cells(floor, pos.row)
                .all(|(above, record)| trial.supports(above, record.category))
        })
    }

    fn find_floor_one_cell(&self, package: &Package) -> Option<GridPosition> {
        let bounds = *self.grid.bounds();
        let mut rows: Vec<u32> = (1..=bounds.rows)
            .filter(|row| self.has_capacity(1, *row, package))
            .collect();

        // Empty rows first, then the least loaded; row index breaks ties.
        rows.sort_by(|a, b| {
            self.grid
                .row_is_empty(1, *b)
                .cmp(&self.grid.row_is_empty(1, *a))
                .then_with(|| {
                    self.grid
                        .row_used_length(1, *a)
                        .total_cmp(&self.grid.row_used_length(1, *b))
                })
                .then_with(|| a.cmp(b))
        });

        rows.into_iter().find_map(|row| {
            (1..=bounds.columns)
                .map(|column| GridPosition::new(1, row, column))
                .find(|pos| {
                    !self.grid.is_occupied(*pos)
                        && self.keeps_upper_floors_sound(*pos, package.category)
                })
        })
    }

    fn first_fit(&self, from_floor: u32, package: &Package, mode: SupportMode) -> Option<GridPosition> {
        let bounds = *self.grid.bounds();
        for floor in from_floor..=bounds.floors {
            for row in 1..=bounds.rows {
                if !self.has_capacity(floor, row, package) {
                    continue;
                }
                for column in 1..=bounds.columns {
                    let pos = GridPosition::new(floor, row, column);
                    if self.grid.is_occupied(pos) {
                        continue;
                    }
                    let supported = match mode {
                        SupportMode::Strict => {
                            self.can_place_on_top(pos, package.category, mode)
                                && self.check_support(pos)
                        }
                        SupportMode::Relaxed => self.can_place_on_top(pos, package.category, mode),
                    };
                    if supported && self.keeps_upper_floors_sound(pos, package.category) {
                        return Some(pos);
                    }
                }
            }
        }
        None
    }

    /// Tries every pass in order and occupies the first cell found.
    ///
    /// # Parameters
    /// * `owner` - Identifier stored in the occupied cell (package sequence index)
    /// * `package` - The package to place
    ///
    /// # Returns
    /// The cell and the winning pass, or `None` if the package does not fit.
    pub fn place(&mut self, owner: usize, package: &Package) -> Option<(GridPosition, PlacementPass)> {
        for pass in PlacementPass::SEQUENCE {
            let Some(pos) = pass.find_cell(self, package) else {
                continue;
            };
            let record = CellRecord {
                length: package.length,
                category: package.category,
                owner,
            };
            if self.grid.place(pos, record) {
                debug!(
                    item_slot = package.item_slot,
                    package = package.package_index,
                    %pos,
                    pass = pass.code(),
                    "package placed"
                );
                return Some((pos, pass));
            }
        }
        debug!(
            item_slot = package.item_slot,
            package = package.package_index,
            length = package.length,
            "package does not fit"
        );
        None
    }
}

/// Places `packages` in sequence order.
///
/// `on_decision` is called once per package with its outcome. A package that
/// directly follows a failed, identical package of the same item is reported
/// unplaced without a search: a failed placement leaves the grid unchanged.
///
/// # Returns
/// One entry per package (same order): the assigned cell, or `None`.
pub fn plan_packages(
    ctx: &mut PlanningContext,
    packages: &[Package],
    mut on_decision: impl FnMut(&Package, Option<(GridPosition, PlacementPass)>),
) -> Vec<Option<GridPosition>> {
    let mut last_failure: Option<&Package> = None;
    packages
        .iter()
        .enumerate()
        .map(|(owner, package)| {
            let outcome = match last_failure {
                Some(failed) if repeats(failed, package) => None,
                _ => ctx.place(owner, package),
            };
            last_failure = outcome.is_none().then_some(package);
            on_decision(package, outcome);
            outcome.map(|(pos, _)| pos)
        })
        .collect()
}

fn repeats(failed: &Package, next: &Package) -> bool {
    failed.item_slot == next.item_slot
        && failed.category == next.category
        && failed.length.total_cmp(&next.length).is_eq()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn package(item_slot: usize, length: f64) -> Package {
        Package {
            item_slot,
            package_index: 0,
            length,
            category: Category::from_length(length, 5.80),
            quantity: 10,
        }
    }

    fn context(max_row_length: f64, columns: u32) -> PlanningContext {
        PlanningContext::new(GridBounds::with_columns(columns), max_row_length, 1e-6)
    }

    #[test]
    fn floor_one_opens_new_rows_before_topping_up() {
        let mut ctx = context(12.0, 3);
        let placements = plan_packages(&mut ctx, &[package(0, 4.0), package(1, 4.0), package(2, 4.0)], |_, _| {});
        assert_eq!(
            placements,
            vec![
                Some(GridPosition::new(1, 1, 1)),
                Some(GridPosition::new(1, 2, 1)),
                Some(GridPosition::new(1, 3, 1)),
            ]
        );
    }

    #[test]
    fn floor_one_tops_up_least_loaded_row() {
        let mut ctx = context(12.0, 4);
        let packages = [
            package(0, 8.0),
            package(1, 3.0),
            package(2, 5.0),
            package(3, 2.0),
        ];
        let placements = plan_packages(&mut ctx, &packages, |_, _| {});
        // rows now hold 8.0 / 3.0 / 5.0; the 2.0 joins the 3.0 row
        assert_eq!(placements[3], Some(GridPosition::new(1, 2, 2)));
    }

    #[test]
    fn upper_floor_requires_support_and_capacity() {
        let mut ctx = context(6.0, 3);
        let packages = [
            package(0, 6.0),
            package(1, 6.0),
            package(2, 6.0),
            package(3, 6.0),
        ];
        let mut passes = Vec::new();
        let placements = plan_packages(&mut ctx, &packages, |_, outcome| {
            passes.push(outcome.map(|(_, pass)| pass));
        });
        assert_eq!(placements[3], Some(GridPosition::new(2, 1, 1)));
        assert_eq!(passes[3], Some(PlacementPass::SupportAware));
        assert!(ctx.check_support(GridPosition::new(2, 1, 1)));
    }

    #[test]
    fn small_package_never_lands_on_large_only_row() {
        let mut ctx = context(6.0, 3);
        // floor 1: row 1 large, rows 2 and 3 small and full
        let packages = [
            package(0, 6.0),
            package(1, 5.0),
            package(2, 5.0),
            package(3, 5.0),
        ];
        let placements = plan_packages(&mut ctx, &packages, |_, _| {});
        assert_eq!(placements[3], Some(GridPosition::new(2, 2, 1)));
        assert!(!ctx.can_place_on_top(
            GridPosition::new(2, 1, 1),
            Category::Small,
            SupportMode::Strict
        ));
    }

    #[test]
    fn package_longer_than_row_is_unplaced() {
        let mut ctx = context(5.0, 3);
        let placements = plan_packages(&mut ctx, &[package(0, 6.0)], |_, _| {});
        assert_eq!(placements, vec![None]);
    }

    #[test]
    fn full_grid_leaves_packages_unplaced() {
        let mut ctx = context(3.0, 3);
        let packages: Vec<_> = (0..13).map(|i| package(i, 3.0)).collect();
        let placements = plan_packages(&mut ctx, &packages, |_, _| {});
        let placed = placements.iter().filter(|p| p.is_some()).count();
        assert_eq!(placed, 12);
        assert_eq!(placements[12], None);
    }

    #[test]
    fn failed_package_settles_its_identical_followers() {
        let mut ctx = context(6.0, 3);
        let packages = [
            package(0, 7.0),
            Package {
                package_index: 1,
                ..package(0, 7.0)
            },
            package(1, 6.0),
        ];
        let mut decisions = Vec::new();
        let placements = plan_packages(&mut ctx, &packages, |package, outcome| {
            decisions.push((package.item_slot, package.package_index, outcome.is_some()));
        });
        assert_eq!(placements, vec![None, None, Some(GridPosition::new(1, 1, 1))]);
        assert_eq!(decisions, vec![(0, 0, false), (0, 1, false), (1, 0, true)]);
    }

    #[test]
    fn relaxed_pass_places_when_strict_support_is_missing() {
        let mut ctx = context(6.0, 3);
        let cell = |length, category, owner| CellRecord {
            length,
            category,
            owner,
        };
        ctx.grid
            .place(GridPosition::new(1, 1, 1), cell(3.0, Category::Small, 0));
        ctx.grid
            .place(GridPosition::new(1, 1, 2), cell(3.0, Category::Small, 1));
        ctx.grid
            .place(GridPosition::new(1, 2, 1), cell(6.0, Category::Large, 2));
        ctx.grid
            .place(GridPosition::new(1, 3, 1), cell(6.0, Category::Large, 3));
        ctx.grid
            .place(GridPosition::new(2, 1, 1), cell(6.0, Category::Large, 4));

        let outcome = ctx.place(5, &package(0, 3.0));
        assert_eq!(
            outcome,
            Some((GridPosition::new(3, 1, 2), PlacementPass::Relaxed))
        );
        assert!(ctx.check_support(GridPosition::new(3, 1, 2)));
    }

    #[test]
    fn relaxed_lookup_accepts_what_strict_lookup_refuses() {
        let mut ctx = context(12.0, 3);
        let cell = |length, category, owner| CellRecord {
            length,
            category,
            owner,
        };
        ctx.grid
            .place(GridPosition::new(1, 1, 1), cell(4.0, Category::Small, 0));
        ctx.grid
            .place(GridPosition::new(1, 1, 2), cell(4.0, Category::Small, 1));
        ctx.grid
            .place(GridPosition::new(2, 1, 2), cell(4.0, Category::Large, 2));

        let pos = GridPosition::new(3, 1, 1);
        assert!(!ctx.can_place_on_top(pos, Category::Small, SupportMode::Strict));
        assert!(ctx.can_place_on_top(pos, Category::Small, SupportMode::Relaxed));
        assert!(ctx.check_support(pos));
    }

    #[test]
    fn large_package_never_slides_under_a_small_one() {
        let mut ctx = context(12.0, 3);
        let small = |length, owner| CellRecord {
            length,
            category: Category::Small,
            owner,
        };
        ctx.grid.place(GridPosition::new(1, 1, 1), small(2.0, 0));
        ctx.grid.place(GridPosition::new(2, 1, 2), small(2.0, 1));
        ctx.grid.place(GridPosition::new(1, 2, 1), small(12.0, 2));
        ctx.grid.place(GridPosition::new(1, 3, 1), small(12.0, 3));

        let gap = GridPosition::new(1, 1, 2);
        assert!(!ctx.keeps_upper_floors_sound(gap, Category::Large));
        assert!(ctx.keeps_upper_floors_sound(gap, Category::Small));

        // Row 1 is the only floor-one row with room; the gap is skipped.
        let placements = plan_packages(&mut ctx, &[package(0, 6.0)], |_, _| {});
        assert_eq!(placements, vec![Some(GridPosition::new(1, 1, 3))]);
    }
}
