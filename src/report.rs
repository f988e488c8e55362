//! Output payload for visualisation clients.
//!
//! Internally a position is (width, depth, height). The payload uses the
//! viewer's convention instead: `x` runs along the container length, `y` is the
//! height and `z` runs across the width.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::genetic::LoadPlan;
use crate::model::{ContainerSpec, Package, PlacedBox};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportSize {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One placed box as the viewer expects it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "BOX0",
    "type": "box",
    "color": "red",
    "size": { "width": 940.0, "height": 1203.0, "depth": 660.0 },
    "position": { "x": 0.0, "y": 0.0, "z": 770.0 }
}))]
pub struct ReportItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    pub size: ReportSize,
    pub position: ReportPosition,
}

impl ReportItem {
    /// Builds the record for a placed box, remapping axes.
    pub fn from_placement(package: &Package, placed: &PlacedBox) -> Self {
        let lower = placed.lower_corner();
        Self {
            id: format!("BOX{}", placed.index),
            kind: "box".to_string(),
            color: package.color.clone(),
            size: ReportSize {
                width: placed.size.x,
                height: placed.size.z,
                depth: placed.size.y,
            },
            position: ReportPosition {
                x: lower.y,
                y: lower.z,
                z: lower.x,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportContainer {
    pub size: ReportSize,
    pub items: Vec<ReportItem>,
}

/// Complete payload: container size plus all placed boxes in insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoadReport {
    pub container: ReportContainer,
}

impl LoadReport {
    pub fn from_plan(plan: &LoadPlan) -> Self {
        Self::new(
            &plan.spec,
            plan.placements()
                .map(|(package, placed)| ReportItem::from_placement(package, placed))
                .collect(),
        )
    }

    pub fn new(spec: &ContainerSpec, items: Vec<ReportItem>) -> Self {
        Self {
            container: ReportContainer {
                size: ReportSize {
                    width: spec.width,
                    height: spec.height,
                    depth: spec.length,
                },
                items,
            },
        }
    }

    /// Compact JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
