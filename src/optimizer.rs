//! Load planning for the multi-level loading grid.
//!
//! This module wires the planning stages together:
//! - normalization (filtering, section length, column bound)
//! - packaging (bundles of 10/20, placement order)
//! - placement (three ordered passes with support rules)
//! - assembly (fragments with conserved quantities)
//! - row balancing (long bundles into the lowest row slots)
//!
//! Every call builds its own planning context; calls share no state and the
//! result depends only on the input (including item order).

use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::assemble::assemble_fragments;
use crate::balance::balance_rows;
use crate::model::{Item, LayoutFragment, RejectedItem, RejectionReason, Section, VehicleSpec};
use crate::normalize::normalize;
use crate::packaging::{build_packages, order_packages, total_package_count};
use crate::planner::{PlanningContext, plan_packages};
use crate::types::{
    Category, EPSILON_LENGTH, GridBounds, GridPosition, LARGE_LENGTH_THRESHOLD, Weighted,
};
use crate::validator::{LayoutViolation, validate_layout};

/// Configuration for the planning heuristic.
///
/// Holds the packaging threshold, the ordering bands and the numerical tolerance.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlanningConfig {
    /// Length at and above which items are bundled as large (tens)
    pub large_length_threshold: f64,
    /// Lower bound of the "medium" ordering band, in meters
    pub medium_min_length: f64,
    /// Upper bound of the "medium" band as a share of the row length (exclusive)
    pub medium_max_ratio: f64,
    /// Share of the row length from which packages are placed last
    pub long_ratio: f64,
    /// Tolerance for length comparisons
    pub length_epsilon: f64,
    /// Whether the row balancer runs after placement
    pub balance_rows: bool,
}

impl PlanningConfig {
    pub const DEFAULT_LARGE_LENGTH_THRESHOLD: f64 = LARGE_LENGTH_THRESHOLD;
    pub const DEFAULT_MEDIUM_MIN_LENGTH: f64 = 2.0;
    pub const DEFAULT_MEDIUM_MAX_RATIO: f64 = 0.75;
    pub const DEFAULT_LONG_RATIO: f64 = 0.85;
    pub const DEFAULT_LENGTH_EPSILON: f64 = EPSILON_LENGTH;
    pub const DEFAULT_BALANCE_ROWS: bool = true;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PlanningConfigBuilder {
        PlanningConfigBuilder::default()
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            large_length_threshold: Self::DEFAULT_LARGE_LENGTH_THRESHOLD,
            medium_min_length: Self::DEFAULT_MEDIUM_MIN_LENGTH,
            medium_max_ratio: Self::DEFAULT_MEDIUM_MAX_RATIO,
            long_ratio: Self::DEFAULT_LONG_RATIO,
            length_epsilon: Self::DEFAULT_LENGTH_EPSILON,
            balance_rows: Self::DEFAULT_BALANCE_ROWS,
        }
    }
}

/// Builder for `PlanningConfig`.
#[derive(Clone, Debug, Default)]
pub struct PlanningConfigBuilder {
    config: PlanningConfig,
}

impl PlanningConfigBuilder {
    pub fn large_length_threshold(mut self, threshold: f64) -> Self {
        self.config.large_length_threshold = threshold;
        self
    }

    pub fn medium_min_length(mut self, length: f64) -> Self {
        self.config.medium_min_length = length;
        self
    }

    pub fn medium_max_ratio(mut self, ratio: f64) -> Self {
        self.config.medium_max_ratio = ratio;
        self
    }

    pub fn long_ratio(mut self, ratio: f64) -> Self {
        self.config.long_ratio = ratio;
        self
    }

    pub fn length_epsilon(mut self, epsilon: f64) -> Self {
        self.config.length_epsilon = epsilon;
        self
    }

    pub fn balance_rows(mut self, enabled: bool) -> Self {
        self.config.balance_rows = enabled;
        self
    }

    /// Creates the final configuration.
    pub fn build(self) -> PlanningConfig {
        self.config
    }
}

/// Figures of one planning run.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSummary {
    pub section: Section,
    pub max_row_length: f64,
    pub grid: GridBounds,
    /// Packages needed for every unit, including ones never built.
    pub total_packages: u64,
    pub placed_packages: u64,
    pub unplaced_packages: u64,
    /// Σ unit weight × quantity over placed fragments, in kg.
    pub placed_weight: f64,
    pub weight_capacity: Option<f64>,
    /// Reported only; the planner does not enforce weight limits.
    pub exceeds_weight_capacity: bool,
    pub rows_balanced: bool,
}

/// Result of planning one section.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub fragments: Vec<LayoutFragment>,
    pub rejected_items: Vec<RejectedItem>,
    pub summary: LayoutSummary,
}

impl LayoutResult {
    /// Whether every planned unit received a grid position.
    pub fn is_complete(&self) -> bool {
        self.fragments.iter().all(LayoutFragment::is_placed)
    }

    pub fn placed(&self) -> impl Iterator<Item = &LayoutFragment> {
        self.fragments.iter().filter(|f| f.is_placed())
    }

    pub fn unplaced(&self) -> impl Iterator<Item = &LayoutFragment> {
        self.fragments.iter().filter(|f| !f.is_placed())
    }

    /// Units that did not fit.
    pub fn unplaced_quantity(&self) -> u64 {
        self.unplaced().map(|f| f.quantity).sum()
    }

    /// Re-checks the placed fragments against every layout invariant.
    pub fn violations(&self, config: &PlanningConfig) -> Vec<LayoutViolation> {
        validate_layout(
            &self.fragments,
            self.summary.grid,
            self.summary.max_row_length,
            config.length_epsilon,
        )
    }
}

/// Events emitted while planning, for live visualization.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PlanEvent {
    /// Planning of a section starts.
    PlanStarted {
        section: Section,
        max_row_length: f64,
        columns: u32,
        items: usize,
        packages: u64,
    },
    /// An item was excluded before planning.
    ItemRejected {
        source_index: usize,
        product_id: Option<String>,
        reason_code: String,
        reason_text: String,
    },
    /// A package received a cell.
    PackagePlaced {
        source_index: usize,
        product_id: String,
        package_index: u32,
        quantity: u64,
        length: f64,
        category: Category,
        position: GridPosition,
        pass: String,
    },
    /// No pass found a cell for a package.
    PackageUnplaced {
        source_index: usize,
        product_id: String,
        package_index: u32,
        quantity: u64,
        length: f64,
    },
    /// The row balancer ran.
    RowsBalanced { moved_rows: usize, applied: bool },
    /// Planning finished.
    Finished {
        placed_packages: u64,
        unplaced_packages: u64,
        fragments: usize,
    },
}

/// Plans `items` onto `section` of `vehicle` with the default configuration.
///
/// # Parameters
/// * `items` - Product lines to load
/// * `vehicle` - The vehicle and its cargo sections
/// * `section` - Section to plan (`Full` for the whole vehicle)
///
/// # Returns
/// `LayoutResult` with placed and unplaced fragments
///
/// # Examples
/// ```
/// use beam_stacker::model::{Item, Section, VehicleSpec};
/// use beam_stacker::optimizer::compute_layout;
///
/// let items = vec![Item::new("HEB-200", 25).with_length(6.0)];
/// let result = compute_layout(&items, &VehicleSpec::single(12.0), Section::Full);
/// assert!(result.is_complete());
/// assert_eq!(result.fragments.len(), 3);
/// ```
pub fn compute_layout(items: &[Item], vehicle: &VehicleSpec, section: Section) -> LayoutResult {
    compute_layout_with_config(items, vehicle, section, PlanningConfig::default())
}

/// Planning with a custom configuration.
pub fn compute_layout_with_config(
    items: &[Item],
    vehicle: &VehicleSpec,
    section: Section,
    config: PlanningConfig,
) -> LayoutResult {
    compute_layout_with_progress(items, vehicle, section, config, |_| {})
}

/// Planning with a custom configuration and a live progress callback.
///
/// Calls `on_event` for every significant step (suitable for SSE).
pub fn compute_layout_with_progress(
    items: &[Item],
    vehicle: &VehicleSpec,
    section: Section,
    config: PlanningConfig,
    mut on_event: impl FnMut(&PlanEvent),
) -> LayoutResult {
    let input = normalize(items, vehicle, section, &config);

    for rejected in &input.rejected {
        on_event(&PlanEvent::ItemRejected {
            source_index: rejected.source_index,
            product_id: rejected.item.product_id.clone(),
            reason_code: rejected.reason.code().to_string(),
            reason_text: rejected.reason.to_string(),
        });
    }

    let mut packages = build_packages(&input.items, input.bounds.cell_count());
    order_packages(&mut packages, input.max_row_length, &config);
    let total_packages = total_package_count(&input.items);

    on_event(&PlanEvent::PlanStarted {
        section,
        max_row_length: input.max_row_length,
        columns: input.bounds.columns,
        items: input.items.len(),
        packages: total_packages,
    });

    let mut ctx = PlanningContext::new(input.bounds, input.max_row_length, config.length_epsilon);
    let placements = plan_packages(&mut ctx, &packages, |package, outcome| {
        let candidate = &input.items[package.item_slot];
        let product_id = candidate.item.product_id.clone().unwrap_or_default();
        match outcome {
            Some((position, pass)) => on_event(&PlanEvent::PackagePlaced {
                source_index: candidate.source_index,
                product_id,
                package_index: package.package_index,
                quantity: package.quantity,
                length: package.length,
                category: package.category,
                position,
                pass: pass.code().to_string(),
            }),
            None => on_event(&PlanEvent::PackageUnplaced {
                source_index: candidate.source_index,
                product_id,
                package_index: package.package_index,
                quantity: package.quantity,
                length: package.length,
            }),
        }
    });

    let placed_packages = placements.iter().filter(|p| p.is_some()).count() as u64;
    let unplaced_packages = total_packages - placed_packages;

    let mut fragments = assemble_fragments(&input.items, &packages, &placements);

    let mut rows_balanced = false;
    if config.balance_rows {
        let outcome = balance_rows(
            fragments,
            input.bounds,
            input.max_row_length,
            config.length_epsilon,
        );
        on_event(&PlanEvent::RowsBalanced {
            moved_rows: if outcome.applied {
                outcome.mapping.moved_rows()
            } else {
                0
            },
            applied: outcome.applied,
        });
        rows_balanced = outcome.applied;
        fragments = outcome.fragments;
    }

    let summary = summarize(
        &fragments,
        vehicle,
        section,
        input.max_row_length,
        input.bounds,
        (placed_packages, unplaced_packages),
        rows_balanced,
        &config,
    );

    debug!(
        %section,
        placed = placed_packages,
        unplaced = unplaced_packages,
        rejected = input.rejected.len(),
        "layout computed"
    );

    on_event(&PlanEvent::Finished {
        placed_packages,
        unplaced_packages,
        fragments: fragments.len(),
    });

    LayoutResult {
        fragments,
        rejected_items: input.rejected,
        summary,
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn summarize(
    fragments: &[LayoutFragment],
    vehicle: &VehicleSpec,
    section: Section,
    max_row_length: f64,
    grid: GridBounds,
    (placed_packages, unplaced_packages): (u64, u64),
    rows_balanced: bool,
    config: &PlanningConfig,
) -> LayoutSummary {
    let placed_weight: f64 = fragments
        .iter()
        .filter(|f| f.is_placed())
        .map(|f| f.weight())
        .sum();
    let weight_capacity = vehicle.section_capacity(section);
    let exceeds_weight_capacity =
        weight_capacity.is_some_and(|capacity| placed_weight > capacity + config.length_epsilon);

    LayoutSummary {
        section,
        max_row_length,
        grid,
        total_packages: placed_packages + unplaced_packages,
        placed_packages,
        unplaced_packages,
        placed_weight,
        weight_capacity,
        exceeds_weight_capacity,
        rows_balanced,
    }
}

/// Plans of every cargo section of a vehicle.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLayout {
    /// One entry per section: `full` for rigid vehicles, `front` then `rear`
    /// for articulated ones.
    pub sections: Vec<LayoutResult>,
}

impl VehicleLayout {
    /// Whether every unit found a place in some section.
    pub fn is_complete(&self) -> bool {
        self.sections.last().is_none_or(LayoutResult::is_complete)
    }
}

/// Plans a whole vehicle.
///
/// Rigid vehicles get a single `full` plan. Articulated vehicles are planned
/// front first; whatever the front cannot take (leftovers and items longer
/// than the front section) is offered to the rear section. Indices in the
/// rear result refer to the caller's `items`.
pub fn compute_vehicle_layout(
    items: &[Item],
    vehicle: &VehicleSpec,
    config: PlanningConfig,
) -> VehicleLayout {
    if !vehicle.is_articulated() {
        return VehicleLayout {
            sections: vec![compute_layout_with_config(items, vehicle, Section::Full, config)],
        };
    }

    let mut front = compute_layout_with_config(items, vehicle, Section::Front, config);

    let mut carry_over: Vec<(usize, Item)> = front
        .unplaced()
        .map(|fragment| {
            let mut item = fragment.to_item();
            item.grid_position = None;
            (fragment.source_index, item)
        })
        .collect();
    let (too_long, rejected): (Vec<_>, Vec<_>) = front
        .rejected_items
        .drain(..)
        .partition(|r| r.reason == RejectionReason::ExceedsSectionLength);
    front.rejected_items = rejected;
    carry_over.extend(too_long.into_iter().map(|r| (r.source_index, r.item)));
    carry_over.sort_by_key(|(source_index, _)| *source_index);

    let (origins, rear_items): (Vec<usize>, Vec<Item>) = carry_over.into_iter().unzip();
    let mut rear = compute_layout_with_config(&rear_items, vehicle, Section::Rear, config);
    for fragment in &mut rear.fragments {
        fragment.source_index = origins[fragment.source_index];
    }
    for rejected in &mut rear.rejected_items {
        rejected.source_index = origins[rejected.source_index];
    }

    // Leftovers of the front are not final until the rear had its chance.
    front.fragments.retain(LayoutFragment::is_placed);

    VehicleLayout {
        sections: vec![front, rear],
    }
}
