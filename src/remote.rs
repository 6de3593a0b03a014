//! Remote placement optimizer.
//!
//! An alternative to the local heuristic: the normalized and packaged input is
//! summarized and sent to an external planning service, which answers with
//! one cell per package. The answer is checked against the placement contract
//! and then assembled exactly like a local plan, so quantities are conserved
//! no matter what the service returns.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::assemble::assemble_fragments;
use crate::config::RemoteConfig;
use crate::model::{Item, Section, VehicleSpec};
use crate::normalize::{NormalizedInput, normalize};
use crate::optimizer::{LayoutResult, PlanningConfig, summarize};
use crate::packaging::{build_packages, total_package_count};
use crate::types::{Category, GridBounds, GridPosition};
use crate::validator::validate_layout;

/// Errors of the remote optimizer.
#[derive(Debug, Error)]
pub enum RemoteOptimizerError {
    #[error("Remote optimizer is not configured")]
    NotConfigured,
    #[error("Remote optimizer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Remote optimizer answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Remote optimizer response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Remote optimizer returned an invalid plan: {0}")]
    InvalidPlan(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    section: Section,
    max_row_length: f64,
    grid: GridBounds,
    items: Vec<PlanRequestItem<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanRequestItem<'a> {
    item_index: usize,
    product_id: &'a str,
    product_name: &'a str,
    length: f64,
    unit_weight: f64,
    quantity: u64,
    category: Category,
    package_size: u64,
    package_count: u64,
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    placements: Vec<RemotePlacement>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemotePlacement {
    item_index: usize,
    floor: u32,
    row: u32,
    column: u32,
}

/// Client for an external planning service.
#[derive(Clone, Debug)]
pub struct RemoteOptimizer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: Option<String>,
    planning: PlanningConfig,
}

impl RemoteOptimizer {
    /// Creates a client from the remote configuration.
    ///
    /// Fails with `NotConfigured` when no endpoint URL is set.
    pub fn from_config(
        config: &RemoteConfig,
        planning: PlanningConfig,
    ) -> Result<Self, RemoteOptimizerError> {
        let url = config.url().ok_or(RemoteOptimizerError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("beam_stacker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: config.api_key().map(str::to_string),
            model: config.model().map(str::to_string),
            planning,
        })
    }

    /// Plans `items` onto `section` of `vehicle` through the remote service.
    pub async fn compute_layout(
        &self,
        items: &[Item],
        vehicle: &VehicleSpec,
        section: Section,
    ) -> Result<LayoutResult, RemoteOptimizerError> {
        let input = normalize(items, vehicle, section, &self.planning);
        let placements = if input.items.is_empty() {
            Vec::new()
        } else {
            self.request_placements(&input).await?
        };
        self.assemble(input, vehicle, section, &placements)
    }

    async fn request_placements(
        &self,
        input: &NormalizedInput,
    ) -> Result<Vec<RemotePlacement>, RemoteOptimizerError> {
        let body = PlanRequest {
            model: self.model.as_deref(),
            section: input.section,
            max_row_length: input.max_row_length,
            grid: input.bounds,
            items: input
                .items
                .iter()
                .enumerate()
                .map(|(item_index, candidate)| PlanRequestItem {
                    item_index,
                    product_id: candidate.item.product_id.as_deref().unwrap_or_default(),
                    product_name: &candidate.item.product_name,
                    length: candidate.length,
                    unit_weight: candidate.item.unit_weight(),
                    quantity: candidate.quantity,
                    category: candidate.category,
                    package_size: candidate.package_size(),
                    package_count: candidate.package_count(),
                })
                .collect(),
        };

        info!(
            url = %self.url,
            items = body.items.len(),
            "🌐 Requesting remote plan"
        );

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RemoteOptimizerError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let plan: PlanResponse = serde_json::from_str(&text)?;
        Ok(plan.placements)
    }

    fn assemble(
        &self,
        input: NormalizedInput,
        vehicle: &VehicleSpec,
        section: Section,
        placements: &[RemotePlacement],
    ) -> Result<LayoutResult, RemoteOptimizerError> {
        check_contract(&input, placements)?;

        // Remote columns may exceed the local bound, so the grid's cell count
        // alone does not cap the placements of one item.
        let limit = input.bounds.cell_count().max(placements.len());
        let packages = build_packages(&input.items, limit);

        // Placements fill each item's packages in package order.
        let mut item_packages: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (slot, package) in packages.iter().enumerate() {
            item_packages.entry(package.item_slot).or_default().push(slot);
        }
        let mut assigned: Vec<Option<GridPosition>> = vec![None; packages.len()];
        let mut used_per_item: BTreeMap<usize, usize> = BTreeMap::new();
        for placement in placements {
            let used = used_per_item.entry(placement.item_index).or_insert(0);
            let slot = item_packages
                .get(&placement.item_index)
                .and_then(|slots| slots.get(*used));
            if let Some(&slot) = slot {
                assigned[slot] = Some(GridPosition::new(
                    placement.floor,
                    placement.row,
                    placement.column,
                ));
            }
            *used += 1;
        }

        let fragments = assemble_fragments(&input.items, &packages, &assigned);
        let violations = validate_layout(
            &fragments,
            input.bounds,
            input.max_row_length,
            self.planning.length_epsilon,
        );
        for violation in &violations {
            warn!(%violation, "⚠️ Remote plan breaks a layout rule");
        }

        let placed_packages = assigned.iter().filter(|p| p.is_some()).count() as u64;
        let unplaced_packages = total_package_count(&input.items) - placed_packages;
        let summary = summarize(
            &fragments,
            vehicle,
            section,
            input.max_row_length,
            input.bounds,
            (placed_packages, unplaced_packages),
            false,
            &self.planning,
        );

        info!(
            placed = placed_packages,
            unplaced = unplaced_packages,
            violations = violations.len(),
            "📦 Remote plan assembled"
        );

        Ok(LayoutResult {
            fragments,
            rejected_items: input.rejected,
            summary,
        })
    }
}

fn check_contract(
    input: &NormalizedInput,
    placements: &[RemotePlacement],
) -> Result<(), RemoteOptimizerError> {
    let invalid = |message: String| Err(RemoteOptimizerError::InvalidPlan(message));
    let mut cells = HashSet::new();
    let mut per_item: BTreeMap<usize, u64> = BTreeMap::new();

    for placement in placements {
        let Some(candidate) = input.items.get(placement.item_index) else {
            return invalid(format!(
                "item index {} is out of range (0..{})",
                placement.item_index,
                input.items.len()
            ));
        };
        if !(1..=input.bounds.floors).contains(&placement.floor) {
            return invalid(format!("floor {} is out of range", placement.floor));
        }
        if !(1..=input.bounds.rows).contains(&placement.row) {
            return invalid(format!("row {} is out of range", placement.row));
        }
        if placement.column < 1 {
            return invalid("columns start at 1".to_string());
        }

        let position = GridPosition::new(placement.floor, placement.row, placement.column);
        if !cells.insert(position) {
            return invalid(format!("cell {} is assigned twice", position));
        }

        let count = per_item.entry(placement.item_index).or_insert(0);
        *count += 1;
        let allowed = candidate.package_count();
        if *count > allowed {
            return invalid(format!(
                "item {} has more placements than packages ({})",
                placement.item_index, allowed
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn optimizer(server: &MockServer) -> RemoteOptimizer {
        let config = RemoteConfig::new(server.url("/plan"))
            .with_api_key("secret")
            .with_timeout(Duration::from_secs(5));
        RemoteOptimizer::from_config(&config, PlanningConfig::default())
            .expect("configured optimizer")
    }

    fn items() -> Vec<Item> {
        vec![
            Item::new("HEB-200", 25).with_length(6.0),
            Item::new("L-50", 20).with_length(2.5),
        ]
    }

    #[tokio::test]
    async fn valid_plan_is_assembled_with_residuals() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/plan")
                .header("authorization", "Bearer secret")
                .body_contains("\"packageCount\":3");
            then.status(200).json_body(json!({
                "placements": [
                    { "itemIndex": 0, "floor": 1, "row": 1, "column": 1 },
                    { "itemIndex": 0, "floor": 1, "row": 2, "column": 1 },
                    { "itemIndex": 1, "floor": 1, "row": 3, "column": 1 }
                ]
            }));
        });

        let result = optimizer(&server)
            .compute_layout(&items(), &VehicleSpec::single(12.0), Section::Full)
            .await
            .expect("remote plan");

        mock.assert();
        let heb: Vec<_> = result
            .fragments
            .iter()
            .filter(|f| f.product_id == "HEB-200")
            .map(|f| (f.quantity, f.is_placed()))
            .collect();
        assert_eq!(heb, vec![(10, true), (10, true), (5, false)]);
        assert_eq!(result.summary.placed_packages, 3);
        assert_eq!(result.summary.unplaced_packages, 1);
        assert!(!result.summary.rows_balanced);
    }

    #[tokio::test]
    async fn duplicate_cells_are_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/plan");
            then.status(200).json_body(json!({
                "placements": [
                    { "itemIndex": 0, "floor": 1, "row": 1, "column": 1 },
                    { "itemIndex": 1, "floor": 1, "row": 1, "column": 1 }
                ]
            }));
        });

        let err = optimizer(&server)
            .compute_layout(&items(), &VehicleSpec::single(12.0), Section::Full)
            .await
            .expect_err("duplicate cell");
        assert!(matches!(err, RemoteOptimizerError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn too_many_placements_for_an_item_are_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/plan");
            then.status(200).json_body(json!({
                "placements": [
                    { "itemIndex": 1, "floor": 1, "row": 1, "column": 1 },
                    { "itemIndex": 1, "floor": 1, "row": 2, "column": 1 }
                ]
            }));
        });

        let err = optimizer(&server)
            .compute_layout(&items(), &VehicleSpec::single(12.0), Section::Full)
            .await
            .expect_err("one package only");
        assert!(matches!(err, RemoteOptimizerError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn out_of_range_coordinates_are_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/plan");
            then.status(200).json_body(json!({
                "placements": [{ "itemIndex": 0, "floor": 5, "row": 1, "column": 1 }]
            }));
        });

        let err = optimizer(&server)
            .compute_layout(&items(), &VehicleSpec::single(12.0), Section::Full)
            .await
            .expect_err("floor 5");
        assert!(err.to_string().contains("floor 5"));
    }

    #[tokio::test]
    async fn http_errors_and_garbage_are_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/plan");
            then.status(500).body("boom");
        });
        let err = optimizer(&server)
            .compute_layout(&items(), &VehicleSpec::single(12.0), Section::Full)
            .await
            .expect_err("server error");
        assert!(matches!(err, RemoteOptimizerError::Status { status: 500, .. }));

        let garbage = MockServer::start();
        garbage.mock(|when, then| {
            when.method(POST).path("/plan");
            then.status(200).body("not json");
        });
        let err = optimizer(&garbage)
            .compute_layout(&items(), &VehicleSpec::single(12.0), Section::Full)
            .await
            .expect_err("undecodable body");
        assert!(matches!(err, RemoteOptimizerError::Decode(_)));
    }

    #[tokio::test]
    async fn nothing_to_plan_skips_the_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/plan");
            then.status(500);
        });

        let result = optimizer(&server)
            .compute_layout(&[Item::new("", 5)], &VehicleSpec::single(12.0), Section::Full)
            .await
            .expect("empty plan");
        mock.assert_hits(0);
        assert!(result.fragments.is_empty());
        assert_eq!(result.rejected_items.len(), 1);
    }

    #[test]
    fn missing_url_means_not_configured() {
        let err = RemoteOptimizer::from_config(&RemoteConfig::default(), PlanningConfig::default())
            .expect_err("no url");
        assert!(matches!(err, RemoteOptimizerError::NotConfigured));
    }
}
