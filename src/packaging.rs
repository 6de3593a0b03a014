//! Package grouping and ordering.
//!
//! Each item's quantity is split into packages (bundles of 10 long or 20
//! short beams). The package sequence is then ordered so that the greedy
//! planner sees medium lengths first and very long ones last, which makes it
//! combine several packages into nearly full rows.

use std::cmp::Ordering;

use crate::normalize::CandidateItem;
use crate::optimizer::PlanningConfig;
use crate::types::{Category, Measured};

/// One placement unit: up to `package_size` units of one item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Package {
    /// Index into the normalized item list.
    pub item_slot: usize,
    /// Position of the package within its item (0-based).
    pub package_index: u32,
    pub length: f64,
    pub category: Category,
    /// Units in this package; only the last package of an item may be short.
    pub quantity: u64,
}

impl Measured for Package {
    fn length(&self) -> f64 {
        self.length
    }
}

/// Flattens items into packages, in item order and package order.
///
/// At most `per_item_limit` packages are built for one item. Every placed
/// package takes a cell of its own, so passing the grid's cell count loses
/// nothing: units beyond the limit end up in the item's residual fragment.
pub fn build_packages(items: &[CandidateItem], per_item_limit: usize) -> Vec<Package> {
    let limit = u32::try_from(per_item_limit).unwrap_or(u32::MAX);
    let mut packages = Vec::new();
    for (item_slot, candidate) in items.iter().enumerate() {
        let size = candidate.package_size();
        let count = u32::try_from(candidate.package_count()).map_or(limit, |count| count.min(limit));
        let mut remaining = candidate.quantity;
        for package_index in 0..count {
            let quantity = remaining.min(size);
            remaining -= quantity;
            packages.push(Package {
                item_slot,
                package_index,
                length: candidate.length,
                category: candidate.category,
                quantity,
            });
        }
    }
    packages
}

/// Packages needed for every unit of `items`, built or not.
pub fn total_package_count(items: &[CandidateItem]) -> u64 {
    items.iter().map(CandidateItem::package_count).sum()
}

/// Sorts packages into placement order (stable).
pub fn order_packages(packages: &mut [Package], max_row_length: f64, config: &PlanningConfig) {
    packages.sort_by(|a, b| compare_packages(a, b, max_row_length, config));
}

/// Three-tier placement order.
///
/// 1. medium lengths (`[medium_min, medium_max_ratio · max)`) first;
/// 2. very long lengths (`≥ long_ratio · max`) last;
/// 3. length descending, large before small on ties.
pub fn compare_packages(
    a: &Package,
    b: &Package,
    max_row_length: f64,
    config: &PlanningConfig,
) -> Ordering {
    let is_medium = |p: &Package| {
        p.length >= config.medium_min_length && p.length < config.medium_max_ratio * max_row_length
    };
    let is_very_long = |p: &Package| p.length >= config.long_ratio * max_row_length;

    is_medium(b)
        .cmp(&is_medium(a))
        .then_with(|| is_very_long(a).cmp(&is_very_long(b)))
        .then_with(|| b.length.total_cmp(&a.length))
        .then_with(|| b.category.is_large().cmp(&a.category.is_large()))
}
