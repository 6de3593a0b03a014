//! Data models for load planning.
//!
//! This module defines the records exchanged with the outside world:
//! - `Item`: a product line to be loaded (quantity, length, unit weight)
//! - `VehicleSpec`: the vehicle and its cargo sections
//! - `LayoutFragment`: a slice of an item, placed on the grid or left over
//! - `RejectedItem`: an item excluded from planning, with the reason

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{Category, GridPosition, Measured, Weighted, validation};

/// Validation error for vehicle data.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid length: {0}")]
    InvalidLength(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Missing section length: {0}")]
    MissingSectionLength(String),
}

/// A product line to be loaded.
///
/// Only `quantity` is mandatory on the wire; everything else may be absent.
/// Invalid items are not rejected at deserialization time, the normalizer
/// sorts them out and reports them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "productId": "HEB-200",
    "productName": "HEB 200 S235",
    "quantity": 25,
    "length": 6.0,
    "weight": 61.3,
    "position": 1
}))]
pub struct Item {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: String,
    pub quantity: i64,
    /// Length in meters.
    #[serde(default)]
    pub length: Option<f64>,
    /// Weight per unit in kg.
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub grid_position: Option<GridPosition>,
}

impl Item {
    /// Creates an item with identity and quantity only.
    ///
    /// # Examples
    /// ```
    /// use beam_stacker::model::Item;
    ///
    /// let item = Item::new("IPE-160", 40).with_length(6.0).with_weight(15.8);
    /// assert!(item.has_identity());
    /// assert_eq!(item.effective_length(), 6.0);
    /// ```
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        let product_id = product_id.into();
        Self {
            product_name: product_id.clone(),
            product_id: Some(product_id),
            quantity,
            ..Self::default()
        }
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// Whether the item carries a non-blank product id.
    pub fn has_identity(&self) -> bool {
        self.product_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }

    /// Length used for planning; missing or unusable lengths count as 0.
    pub fn effective_length(&self) -> f64 {
        match self.length {
            Some(length) if length.is_finite() && length > 0.0 => length,
            _ => 0.0,
        }
    }

    /// Unit weight used for summaries; missing or unusable weights count as 0.
    pub fn unit_weight(&self) -> f64 {
        match self.weight {
            Some(weight) if weight.is_finite() && weight > 0.0 => weight,
            _ => 0.0,
        }
    }
}

impl Measured for Item {
    fn length(&self) -> f64 {
        self.effective_length()
    }
}

/// Kind of vehicle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    #[default]
    Single,
    Articulated,
    Semi,
}

/// Cargo section a plan targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Front,
    Rear,
    #[default]
    Full,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Front => write!(f, "front"),
            Section::Rear => write!(f, "rear"),
            Section::Full => write!(f, "full"),
        }
    }
}

/// Vehicle description.
///
/// Articulated vehicles carry two independent cargo sections, each with its
/// own length and weight capacity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "type": "ARTICULATED",
    "length": 15.6,
    "frontSectionLength": 7.7,
    "rearSectionLength": 7.9,
    "frontMaxWeight": 11000.0,
    "rearMaxWeight": 12000.0
}))]
pub struct VehicleSpec {
    #[serde(rename = "type", default)]
    pub vehicle_type: VehicleType,
    pub length: f64,
    #[serde(default)]
    pub front_section_length: Option<f64>,
    #[serde(default)]
    pub rear_section_length: Option<f64>,
    #[serde(default)]
    pub max_weight: Option<f64>,
    #[serde(default)]
    pub front_max_weight: Option<f64>,
    #[serde(default)]
    pub rear_max_weight: Option<f64>,
}

impl VehicleSpec {
    /// Rigid vehicle with a single cargo area.
    pub fn single(length: f64) -> Self {
        Self::rigid(VehicleType::Single, length)
    }

    /// Semi-trailer with a single cargo area.
    pub fn semi(length: f64) -> Self {
        Self::rigid(VehicleType::Semi, length)
    }

    /// Truck-and-trailer combination with two cargo sections.
    pub fn articulated(front_length: f64, rear_length: f64) -> Self {
        Self {
            vehicle_type: VehicleType::Articulated,
            length: front_length + rear_length,
            front_section_length: Some(front_length),
            rear_section_length: Some(rear_length),
            max_weight: None,
            front_max_weight: None,
            rear_max_weight: None,
        }
    }

    fn rigid(vehicle_type: VehicleType, length: f64) -> Self {
        Self {
            vehicle_type,
            length,
            front_section_length: None,
            rear_section_length: None,
            max_weight: None,
            front_max_weight: None,
            rear_max_weight: None,
        }
    }

    /// Sets the overall weight capacity (Builder pattern light).
    pub fn with_max_weight(mut self, max_weight: f64) -> Self {
        self.max_weight = Some(max_weight);
        self
    }

    /// Sets the per-section weight capacities.
    pub fn with_section_weights(mut self, front: f64, rear: f64) -> Self {
        self.front_max_weight = Some(front);
        self.rear_max_weight = Some(rear);
        self
    }

    pub fn is_articulated(&self) -> bool {
        self.vehicle_type == VehicleType::Articulated
    }

    /// Whether `section` is a sub-section of an articulated vehicle.
    pub fn is_subsection(&self, section: Section) -> bool {
        self.is_articulated() && section != Section::Full
    }

    /// Checks lengths and capacities.
    ///
    /// # Returns
    /// `Ok(())` for a usable vehicle, otherwise `Err(ValidationError)`
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_length(self.length, "Vehicle length")
            .map_err(ValidationError::InvalidLength)?;

        if self.is_articulated() {
            for (value, name) in [
                (self.front_section_length, "Front section length"),
                (self.rear_section_length, "Rear section length"),
            ] {
                let value = value.ok_or_else(|| {
                    ValidationError::MissingSectionLength(format!(
                        "{} is required for articulated vehicles",
                        name
                    ))
                })?;
                validation::validate_length(value, name).map_err(ValidationError::InvalidLength)?;
            }
        }

        validation::validate_capacity(self.max_weight, "Max weight")
            .and_then(|_| validation::validate_capacity(self.front_max_weight, "Front max weight"))
            .and_then(|_| validation::validate_capacity(self.rear_max_weight, "Rear max weight"))
            .map_err(ValidationError::InvalidWeight)
    }

    /// Maximum row length for a section.
    ///
    /// Front/rear on a vehicle without sub-sections resolve to the whole length.
    pub fn section_length(&self, section: Section) -> f64 {
        if !self.is_articulated() {
            return self.length;
        }
        match section {
            Section::Full => self.length,
            Section::Front => self.front_section_length.unwrap_or(self.length),
            Section::Rear => self.rear_section_length.unwrap_or(self.length),
        }
    }

    /// Weight capacity for a section, if known.
    pub fn section_capacity(&self, section: Section) -> Option<f64> {
        if !self.is_articulated() {
            return self.max_weight;
        }
        match section {
            Section::Full => self.max_weight.or_else(|| {
                self.front_max_weight
                    .zip(self.rear_max_weight)
                    .map(|(front, rear)| front + rear)
            }),
            Section::Front => self.front_max_weight,
            Section::Rear => self.rear_max_weight,
        }
    }
}

/// A slice of an item: placed on the grid or left over.
///
/// Mirrors the source item except for `quantity` (subdivided) and
/// `grid_position` (assigned, or absent for "does not fit").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayoutFragment {
    /// Index of the source item in the request.
    pub source_index: usize,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u64,
    pub length: Option<f64>,
    pub weight: Option<f64>,
    pub position: Option<i64>,
    pub notes: Option<String>,
    pub category: Category,
    pub grid_position: Option<GridPosition>,
}

impl LayoutFragment {
    /// Creates a fragment of `item` with the given quantity and cell.
    pub fn from_item(
        source_index: usize,
        item: &Item,
        category: Category,
        quantity: u64,
        grid_position: Option<GridPosition>,
    ) -> Self {
        Self {
            source_index,
            product_id: item.product_id.clone().unwrap_or_default(),
            product_name: item.product_name.clone(),
            quantity,
            length: item.length,
            weight: item.weight,
            position: item.position,
            notes: item.notes.clone(),
            category,
            grid_position,
        }
    }

    pub fn is_placed(&self) -> bool {
        self.grid_position.is_some()
    }

    /// Returns the item this fragment was cut from, with the fragment's quantity.
    pub fn to_item(&self) -> Item {
        Item {
            product_id: Some(self.product_id.clone()),
            product_name: self.product_name.clone(),
            // Fragments are cut from positive `i64` quantities.
            quantity: i64::try_from(self.quantity).unwrap_or(i64::MAX),
            length: self.length,
            weight: self.weight,
            position: self.position,
            notes: self.notes.clone(),
            grid_position: self.grid_position,
        }
    }
}

impl Measured for LayoutFragment {
    fn length(&self) -> f64 {
        match self.length {
            Some(length) if length.is_finite() && length > 0.0 => length,
            _ => 0.0,
        }
    }
}

/// Total weight of the fragment (unit weight × quantity).
impl Weighted for LayoutFragment {
    fn weight(&self) -> f64 {
        match self.weight {
            Some(weight) if weight.is_finite() && weight > 0.0 => weight * self.quantity as f64,
            _ => 0.0,
        }
    }
}

/// Reasons why an item was excluded from planning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MissingIdentity,
    NonPositiveQuantity,
    ExceedsSectionLength,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::MissingIdentity => "missing_identity",
            RejectionReason::NonPositiveQuantity => "non_positive_quantity",
            RejectionReason::ExceedsSectionLength => "exceeds_section_length",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::MissingIdentity => write!(f, "Item has no product id"),
            RejectionReason::NonPositiveQuantity => write!(f, "Item quantity is not positive"),
            RejectionReason::ExceedsSectionLength => {
                write!(f, "Item is longer than the requested cargo section")
            }
        }
    }
}

/// Item that was excluded from planning.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectedItem {
    pub source_index: usize,
    pub item: Item,
    pub reason: RejectionReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_identity_requires_non_blank_id() {
        assert!(Item::new("A", 1).has_identity());
        assert!(!Item::new("  ", 1).has_identity());
        let anonymous = Item {
            quantity: 3,
            ..Item::default()
        };
        assert!(!anonymous.has_identity());
    }

    #[test]
    fn item_effective_length_ignores_unusable_values() {
        assert_eq!(Item::new("A", 1).effective_length(), 0.0);
        assert_eq!(Item::new("A", 1).with_length(-2.0).effective_length(), 0.0);
        assert_eq!(Item::new("A", 1).with_length(f64::NAN).effective_length(), 0.0);
        assert_eq!(Item::new("A", 1).with_length(4.5).effective_length(), 4.5);
    }

    #[test]
    fn item_deserializes_from_camel_case() {
        let json = r#"{"productId":"X1","productName":"Flat bar","quantity":12,"length":3.0}"#;
        let item: Item = serde_json::from_str(json).expect("valid item json");
        assert_eq!(item.product_id.as_deref(), Some("X1"));
        assert_eq!(item.quantity, 12);
        assert_eq!(item.length, Some(3.0));
        assert_eq!(item.weight, None);
        assert_eq!(item.grid_position, None);
    }

    #[test]
    fn vehicle_type_uses_upper_case_tags() {
        let json = r#"{"type":"ARTICULATED","length":15.0,"frontSectionLength":7.0,"rearSectionLength":8.0}"#;
        let vehicle: VehicleSpec = serde_json::from_str(json).expect("valid vehicle json");
        assert!(vehicle.is_articulated());
        assert_eq!(vehicle.section_length(Section::Front), 7.0);
        assert_eq!(vehicle.section_length(Section::Rear), 8.0);
        assert_eq!(vehicle.section_length(Section::Full), 15.0);
    }

    #[test]
    fn rigid_vehicle_ignores_sub_sections() {
        let vehicle = VehicleSpec::single(13.6).with_max_weight(24000.0);
        assert!(!vehicle.is_subsection(Section::Front));
        assert_eq!(vehicle.section_length(Section::Rear), 13.6);
        assert_eq!(vehicle.section_capacity(Section::Front), Some(24000.0));
    }

    #[test]
    fn articulated_capacity_sums_sections_for_full_plans() {
        let vehicle = VehicleSpec::articulated(7.0, 8.0).with_section_weights(10000.0, 12000.0);
        assert_eq!(vehicle.section_capacity(Section::Front), Some(10000.0));
        assert_eq!(vehicle.section_capacity(Section::Full), Some(22000.0));
    }

    #[test]
    fn validate_rejects_bad_vehicles() {
        assert!(VehicleSpec::single(13.6).validate().is_ok());
        assert!(matches!(
            VehicleSpec::single(0.0).validate(),
            Err(ValidationError::InvalidLength(_))
        ));

        let mut missing = VehicleSpec::articulated(7.0, 8.0);
        missing.rear_section_length = None;
        assert!(matches!(
            missing.validate(),
            Err(ValidationError::MissingSectionLength(_))
        ));

        let heavy = VehicleSpec::single(13.6).with_max_weight(-1.0);
        assert!(matches!(
            heavy.validate(),
            Err(ValidationError::InvalidWeight(_))
        ));
    }

    #[test]
    fn fragment_weight_scales_with_quantity() {
        let item = Item::new("A", 10).with_length(6.0).with_weight(2.5);
        let fragment = LayoutFragment::from_item(0, &item, Category::Large, 4, None);
        assert!((fragment.weight() - 10.0).abs() < 1e-9);
        assert!(!fragment.is_placed());
        assert_eq!(fragment.to_item().quantity, 4);
    }

    #[test]
    fn rejection_reason_codes() {
        assert_eq!(RejectionReason::MissingIdentity.code(), "missing_identity");
        assert_eq!(
            serde_json::to_value(RejectionReason::ExceedsSectionLength).expect("serializable"),
            serde_json::json!("exceeds_section_length")
        );
    }
}
