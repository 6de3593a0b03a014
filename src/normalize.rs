//! Input normalization.
//!
//! Filters the raw item list, resolves the cargo section's maximum row length
//! and derives the column bound of the loading grid.

use crate::model::{Item, RejectedItem, RejectionReason, Section, VehicleSpec};
use crate::optimizer::PlanningConfig;
use crate::types::{Category, GridBounds, MAX_COLUMNS, MIN_COLUMNS, Measured, package_count};

/// An item that survived filtering, ready for packaging.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateItem {
    /// Index of the item in the caller's list.
    pub source_index: usize,
    pub item: Item,
    pub quantity: u64,
    pub length: f64,
    pub category: Category,
}

impl CandidateItem {
    pub fn package_size(&self) -> u64 {
        self.category.package_size()
    }

    /// Packages needed for the whole quantity.
    pub fn package_count(&self) -> u64 {
        package_count(self.quantity, self.package_size())
    }
}

impl Measured for CandidateItem {
    fn length(&self) -> f64 {
        self.length
    }
}

/// Result of normalization.
#[derive(Clone, Debug)]
pub struct NormalizedInput {
    pub section: Section,
    pub max_row_length: f64,
    pub bounds: GridBounds,
    /// Surviving items, ordered by their `position` hint.
    pub items: Vec<CandidateItem>,
    pub rejected: Vec<RejectedItem>,
}

/// Filters `items` for planning in `section` of `vehicle`.
///
/// Items without identity or with a non-positive quantity are dropped. When
/// `section` is a sub-section of an articulated vehicle, items longer than the
/// sub-section are dropped too. Every drop is listed in `rejected`.
pub fn normalize(
    items: &[Item],
    vehicle: &VehicleSpec,
    section: Section,
    config: &PlanningConfig,
) -> NormalizedInput {
    let max_row_length = sanitize_length(vehicle.section_length(section));
    let subsection = vehicle.is_subsection(section);

    let mut candidates = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();

    for (source_index, item) in items.iter().enumerate() {
        let reason = if !item.has_identity() {
            Some(RejectionReason::MissingIdentity)
        } else if item.quantity <= 0 {
            Some(RejectionReason::NonPositiveQuantity)
        } else if subsection
            && item.effective_length() > max_row_length + config.length_epsilon
        {
            Some(RejectionReason::ExceedsSectionLength)
        } else {
            None
        };

        if let Some(reason) = reason {
            rejected.push(RejectedItem {
                source_index,
                item: item.clone(),
                reason,
            });
            continue;
        }

        let length = item.effective_length();
        candidates.push(CandidateItem {
            source_index,
            item: item.clone(),
            // Positive here, so the conversion is lossless.
            quantity: item.quantity.unsigned_abs(),
            length,
            category: Category::from_length(length, config.large_length_threshold),
        });
    }

    // Stable: items without a position hint keep their input order, after the hinted ones.
    candidates.sort_by_key(|c| (c.item.position.is_none(), c.item.position.unwrap_or(0)));

    let columns = column_bound(max_row_length, &candidates);

    NormalizedInput {
        section,
        max_row_length,
        bounds: GridBounds::with_columns(columns),
        items: candidates,
        rejected,
    }
}

/// `max(3, floor(maxRowLength / shortestLength))`, capped at 50.
///
/// Falls back to 3 when there is no positive item length to divide by.
pub fn column_bound(max_row_length: f64, items: &[CandidateItem]) -> u32 {
    let shortest = items
        .iter()
        .map(|c| c.length)
        .filter(|length| *length > 0.0)
        .min_by(|a, b| a.total_cmp(b));

    let Some(shortest) = shortest else {
        return MIN_COLUMNS;
    };
    if max_row_length <= 0.0 {
        return MIN_COLUMNS;
    }

    let ratio = (max_row_length / shortest).floor();
    if ratio >= f64::from(MAX_COLUMNS) {
        MAX_COLUMNS
    } else {
        (ratio as u32).max(MIN_COLUMNS)
    }
}

fn sanitize_length(length: f64) -> f64 {
    if length.is_finite() && length > 0.0 {
        length
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PlanningConfig {
        PlanningConfig::default()
    }

    #[test]
    fn drops_invalid_items_and_reports_them() {
        let items = vec![
            Item::new("A", 10).with_length(6.0),
            Item {
                quantity: 5,
                ..Item::default()
            },
            Item::new("C", 0).with_length(3.0),
            Item::new("D", -4).with_length(3.0),
        ];

        let input = normalize(&items, &VehicleSpec::single(13.6), Section::Full, &config());

        assert_eq!(input.items.len(), 1);
        assert_eq!(input.items[0].source_index, 0);
        let reasons: Vec<_> = input.rejected.iter().map(|r| (r.source_index, r.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (1, RejectionReason::MissingIdentity),
                (2, RejectionReason::NonPositiveQuantity),
                (3, RejectionReason::NonPositiveQuantity),
            ]
        );
    }

    #[test]
    fn sub_section_excludes_items_longer_than_the_section() {
        let vehicle = VehicleSpec::articulated(6.0, 8.0);
        let items = vec![
            Item::new("short", 10).with_length(5.0),
            Item::new("long", 10).with_length(7.5),
        ];

        let front = normalize(&items, &vehicle, Section::Front, &config());
        assert_eq!(front.max_row_length, 6.0);
        assert_eq!(front.items.len(), 1);
        assert_eq!(front.rejected.len(), 1);
        assert_eq!(front.rejected[0].reason, RejectionReason::ExceedsSectionLength);

        let rear = normalize(&items, &vehicle, Section::Rear, &config());
        assert_eq!(rear.items.len(), 2);
        assert!(rear.rejected.is_empty());
    }

    #[test]
    fn full_mode_keeps_items_longer_than_the_row() {
        let items = vec![Item::new("long", 10).with_length(6.0)];
        let input = normalize(&items, &VehicleSpec::single(5.0), Section::Full, &config());
        assert_eq!(input.items.len(), 1);
        assert!(input.rejected.is_empty());
    }

    #[test]
    fn orders_by_position_hint_stably() {
        let items = vec![
            Item::new("no-hint-1", 1).with_length(1.0),
            Item::new("third", 1).with_length(1.0).with_position(3),
            Item::new("first", 1).with_length(1.0).with_position(1),
            Item::new("no-hint-2", 1).with_length(1.0),
            Item::new("first-b", 1).with_length(1.0).with_position(1),
        ];
        let input = normalize(&items, &VehicleSpec::single(13.6), Section::Full, &config());
        let ids: Vec<_> = input
            .items
            .iter()
            .map(|c| c.item.product_id.clone().unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["first", "first-b", "third", "no-hint-1", "no-hint-2"]);
    }

    #[test]
    fn keeps_quantities_beyond_u32() {
        let quantity = i64::from(u32::MAX) + 11;
        let items = vec![Item::new("bulk", quantity).with_length(3.0)];
        let input = normalize(&items, &VehicleSpec::single(13.6), Section::Full, &config());
        assert_eq!(input.items[0].quantity, u64::from(u32::MAX) + 11);
        assert_eq!(input.items[0].package_count(), 214_748_366);
    }

    #[test]
    fn column_bound_uses_shortest_length() {
        let items = vec![
            Item::new("A", 1).with_length(6.0),
            Item::new("B", 1).with_length(2.5),
        ];
        let input = normalize(&items, &VehicleSpec::single(13.6), Section::Full, &config());
        assert_eq!(input.bounds.columns, 5);
    }

    #[test]
    fn column_bound_has_floor_and_ceiling() {
        let long = vec![Item::new("A", 1).with_length(12.0)];
        let input = normalize(&long, &VehicleSpec::single(13.6), Section::Full, &config());
        assert_eq!(input.bounds.columns, MIN_COLUMNS);

        let tiny = vec![Item::new("A", 1).with_length(0.1)];
        let input = normalize(&tiny, &VehicleSpec::single(13.6), Section::Full, &config());
        assert_eq!(input.bounds.columns, MAX_COLUMNS);
    }

    #[test]
    fn column_bound_falls_back_without_lengths() {
        let items = vec![Item::new("A", 5), Item::new("B", 5).with_length(-1.0)];
        let input = normalize(&items, &VehicleSpec::single(13.6), Section::Full, &config());
        assert_eq!(input.bounds.columns, 3);
        assert_eq!(input.items.len(), 2);
        assert!(input.items.iter().all(|c| c.category == Category::Small));
    }
}
