//! Load planning for multi-level beam loading grids.
//!
//! Items are bundled into packages, placed on a 4-floor × 3-row grid under
//! row-length, support and stacking rules, and returned as fragments that
//! conserve every item's quantity.

pub mod api;
pub mod assemble;
pub mod balance;
pub mod config;
pub mod grid;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod optimizer;
pub mod packaging;
pub mod planner;
pub mod remote;
pub mod types;
pub mod validator;

pub use model::{Item, LayoutFragment, Section, VehicleSpec};
pub use optimizer::{
    LayoutResult, PlanEvent, PlanningConfig, compute_layout, compute_layout_with_config,
    compute_layout_with_progress, compute_vehicle_layout,
};
pub use validator::validate_layout;
