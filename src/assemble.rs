//! Layout assembly.
//!
//! Turns per-package placements back into item fragments: one fragment per
//! placed package, plus at most one residual fragment per item holding every
//! unit that did not fit. Quantities always add up to the item's quantity.

use crate::model::LayoutFragment;
use crate::normalize::CandidateItem;
use crate::packaging::Package;
use crate::types::GridPosition;

/// Builds fragments for `items` from `packages` and their `placements`.
///
/// `placements[i]` is the cell assigned to `packages[i]`. Packages may come in
/// any order; fragments are emitted per item (in item order) and, within an
/// item, in package order, followed by the residual fragment if any.
pub fn assemble_fragments(
    items: &[CandidateItem],
    packages: &[Package],
    placements: &[Option<GridPosition>],
) -> Vec<LayoutFragment> {
    let mut per_item: Vec<Vec<(u32, u64, Option<GridPosition>)>> = vec![Vec::new(); items.len()];
    for (package, placement) in packages.iter().zip(placements.iter()) {
        if let Some(slot) = per_item.get_mut(package.item_slot) {
            slot.push((package.package_index, package.quantity, *placement));
        }
    }

    let mut fragments = Vec::with_capacity(packages.len() + items.len());
    for (candidate, mut slots) in items.iter().zip(per_item) {
        slots.sort_by_key(|(package_index, _, _)| *package_index);

        let mut placed_quantity: u64 = 0;
        for (_, quantity, placement) in &slots {
            if let Some(pos) = placement {
                placed_quantity += quantity;
                fragments.push(LayoutFragment::from_item(
                    candidate.source_index,
                    &candidate.item,
                    candidate.category,
                    *quantity,
                    Some(*pos),
                ));
            }
        }

        let leftover = candidate.quantity.saturating_sub(placed_quantity);
        if leftover > 0 {
            fragments.push(LayoutFragment::from_item(
                candidate.source_index,
                &candidate.item,
                candidate.category,
                leftover,
                None,
            ));
        }
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use crate::packaging::build_packages;
    use crate::types::Category;

    fn candidate(id: &str, quantity: u64, length: f64) -> CandidateItem {
        CandidateItem {
            source_index: 7,
            item: Item::new(id, quantity as i64).with_length(length),
            quantity,
            length,
            category: Category::from_length(length, 5.80),
        }
    }

    #[test]
    fn all_placed_yields_one_fragment_per_package() {
        let items = vec![candidate("A", 25, 6.0)];
        let packages = build_packages(&items, usize::MAX);
        let placements: Vec<_> = (1..=3).map(|row| Some(GridPosition::new(1, row, 1))).collect();

        let fragments = assemble_fragments(&items, &packages, &placements);
        let quantities: Vec<_> = fragments.iter().map(|f| f.quantity).collect();
        assert_eq!(quantities, vec![10, 10, 5]);
        assert!(fragments.iter().all(|f| f.is_placed() && f.source_index == 7));
    }

    #[test]
    fn unplaced_packages_merge_into_one_residual() {
        let items = vec![candidate("B", 45, 3.0)];
        let packages = build_packages(&items, usize::MAX);
        let placements = vec![Some(GridPosition::new(1, 1, 1)), None, None];

        let fragments = assemble_fragments(&items, &packages, &placements);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].quantity, 20);
        assert!(fragments[0].is_placed());
        assert_eq!(fragments[1].quantity, 25);
        assert!(!fragments[1].is_placed());
    }

    #[test]
    fn package_order_is_restored_per_item() {
        let items = vec![candidate("A", 15, 6.0), candidate("B", 10, 2.0)];
        let mut packages = build_packages(&items, usize::MAX);
        packages.reverse();
        // reversed: B#0, A#1, A#0
        let placements = vec![
            Some(GridPosition::new(1, 3, 1)),
            Some(GridPosition::new(1, 2, 1)),
            None,
        ];

        let fragments = assemble_fragments(&items, &packages, &placements);
        let summary: Vec<_> = fragments
            .iter()
            .map(|f| (f.product_id.as_str(), f.quantity, f.grid_position))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A", 5, Some(GridPosition::new(1, 2, 1))),
                ("A", 10, None),
                ("B", 10, Some(GridPosition::new(1, 3, 1))),
            ]
        );
    }

    #[test]
    fn units_of_unbuilt_packages_land_in_the_residual() {
        let quantity = u64::from(u32::MAX) + 9;
        let items = vec![candidate("bulk", quantity, 6.0)];
        let packages = build_packages(&items, 36);
        assert_eq!(packages.len(), 36);
        let placements: Vec<_> = (0..packages.len())
            .map(|i| (i < 2).then(|| GridPosition::new(1, i as u32 + 1, 1)))
            .collect();

        let fragments = assemble_fragments(&items, &packages, &placements);
        let quantities: Vec<_> = fragments.iter().map(|f| (f.quantity, f.is_placed())).collect();
        assert_eq!(
            quantities,
            vec![(10, true), (10, true), (quantity - 20, false)]
        );
        let total: u64 = fragments.iter().map(|f| f.quantity).sum();
        assert_eq!(total, quantity);
    }

    #[test]
    fn quantities_are_conserved() {
        let items = vec![candidate("A", 37, 6.0), candidate("B", 61, 4.0)];
        let packages = build_packages(&items, usize::MAX);
        let placements: Vec<_> = packages
            .iter()
            .enumerate()
            .map(|(i, _)| (i % 2 == 0).then(|| GridPosition::new(1, 1, i as u32 + 1)))
            .collect();

        let fragments = assemble_fragments(&items, &packages, &placements);
        for (slot, item) in items.iter().enumerate() {
            let id = item.item.product_id.clone().unwrap_or_default();
            let total: u64 = fragments
                .iter()
                .filter(|f| f.product_id == id)
                .map(|f| f.quantity)
                .sum();
            assert_eq!(total, item.quantity, "item slot {}", slot);
            let residuals = fragments
                .iter()
                .filter(|f| f.product_id == id && !f.is_placed())
                .count();
            assert!(residuals <= 1);
        }
    }
}
