//! Platzierungslogik für das Beladen eines Containers über eine Höhenkarte.
//!
//! Dieser Modul implementiert drei Bausteine:
//! - Bewertung einer einzelnen Kandidatenposition (`evaluate_placement`)
//! - Erschöpfende Suche über alle Rasterzellen (`find_best_position`)
//! - Festschreiben einer Box inklusive Rasterverfeinerung (`load_box`)
//!
//! Eine Box wird nur auf einer ebenen Fläche abgestellt: alle Zellen unter der
//! Grundfläche müssen exakt dieselbe Höhe haben. Überhänge gibt es nicht.

use std::fmt;

use tracing::{debug, trace};

use crate::geometry::{center_offset, interval_containing, lies_on_line};
use crate::grid::{Axis, GridError, HeightGrid};
use crate::model::{Container, PlacedBox};
use crate::types::{BoundingBox, EPSILON_GENERAL, EPSILON_HEIGHT, Vec3};

/// Startwert der Suche; bleibt er unverändert, wurde keine Position gefunden.
pub const NO_POSITION_SCORE: f64 = 1e10;

/// Konfiguration für Bewertung und Suche.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Gewicht des Zentrierungsterms (Abstand zur Breitenmitte) im Score
    pub centering_weight: f64,
    /// Toleranz für Höhenvergleiche unter der Grundfläche
    pub height_epsilon: f64,
    /// Allgemeine Toleranz für Koordinatenvergleiche
    pub general_epsilon: f64,
    /// Bei Gleichstand gewinnt die zuerst gescannte statt der zuletzt gescannten Zelle
    pub prefer_first_tie: bool,
}

impl PackingConfig {
    pub const DEFAULT_CENTERING_WEIGHT: f64 = 1e-5;
    pub const DEFAULT_HEIGHT_EPSILON: f64 = EPSILON_HEIGHT;
    pub const DEFAULT_GENERAL_EPSILON: f64 = EPSILON_GENERAL;
    pub const DEFAULT_PREFER_FIRST_TIE: bool = false;

    /// Erstellt einen Builder für benutzerdefinierte Konfiguration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            centering_weight: Self::DEFAULT_CENTERING_WEIGHT,
            height_epsilon: Self::DEFAULT_HEIGHT_EPSILON,
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
            prefer_first_tie: Self::DEFAULT_PREFER_FIRST_TIE,
        }
    }
}

/// Builder für `PackingConfig`.
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    /// Setzt das Gewicht des Zentrierungsterms.
    pub fn centering_weight(mut self, weight: f64) -> Self {
        self.config.centering_weight = weight;
        self
    }

    /// Setzt die Höhentoleranz.
    pub fn height_epsilon(mut self, epsilon: f64) -> Self {
        self.config.height_epsilon = epsilon;
        self
    }

    /// Setzt die allgemeine Toleranz.
    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    /// Legt fest, welche Zelle bei Gleichstand gewinnt.
    pub fn prefer_first_tie(mut self, prefer_first: bool) -> Self {
        self.config.prefer_first_tie = prefer_first;
        self
    }

    /// Erstellt die finale Konfiguration.
    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Ergebnis der Prüfung einer Kandidatenposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementReason {
    Accepted,
    DoesNotFit,
    NotWellSupported,
    ExceedsHeight,
}

impl PlacementReason {
    pub fn code(&self) -> &'static str {
        match self {
            PlacementReason::Accepted => "accepted",
            PlacementReason::DoesNotFit => "does_not_fit",
            PlacementReason::NotWellSupported => "not_well_supported",
            PlacementReason::ExceedsHeight => "exceeds_height",
        }
    }
}

impl fmt::Display for PlacementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementReason::Accepted => write!(f, "No problems encountered"),
            PlacementReason::DoesNotFit => {
                write!(f, "Box does not fit within the container width or length")
            }
            PlacementReason::NotWellSupported => write!(
                f,
                "Box is not well supported by the floor or previously loaded boxes (uneven height level)"
            ),
            PlacementReason::ExceedsHeight => write!(f, "Box exceeds the container height"),
        }
    }
}

/// Bewertung einer Kandidatenposition.
///
/// Niedrigere Scores sind besser. Für unzulässige Positionen ist der Score 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementEvaluation {
    pub feasible: bool,
    pub score: f64,
    pub reason: PlacementReason,
}

impl PlacementEvaluation {
    fn rejected(reason: PlacementReason) -> Self {
        Self {
            feasible: false,
            score: 0.0,
            reason,
        }
    }
}

/// Beste gefundene Position einer Suche.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BestPosition {
    pub row: usize,
    pub column: usize,
    pub score: f64,
}

impl BestPosition {
    /// Sentinel-Ergebnis ohne zulässige Position.
    pub const NONE: BestPosition = BestPosition {
        row: 0,
        column: 0,
        score: NO_POSITION_SCORE,
    };

    /// Gibt an, ob die Suche eine zulässige Position gefunden hat.
    pub fn is_found(&self) -> bool {
        self.score < NO_POSITION_SCORE
    }
}

/// Reale Ecken einer Box, deren untere Ecke auf Zelle (row, column) liegt.
///
/// `x` = Breite, `y` = Tiefe, `z` = Höhe.
fn footprint(grid: &HeightGrid, row: usize, column: usize, size: Vec3) -> Option<BoundingBox> {
    let x = *grid.width_coordinates().get(row)?;
    let y = *grid.depth_coordinates().get(column)?;
    let lower = Vec3::new(x, y, grid.height(row, column));
    Some(BoundingBox::from_position_and_dims(lower, size))
}

/// Prüft, ob die obere Ecke innerhalb von Breite und Tiefe des Containers liegt.
fn within_extents(grid: &HeightGrid, upper: Vec3, config: &PackingConfig) -> bool {
    upper.x <= grid.width_extent() + config.general_epsilon
        && upper.y <= grid.depth_extent() + config.general_epsilon
}

/// Zellbereich (letzte Zeile, letzte Spalte), den die obere Ecke erreicht.
fn covered_until(grid: &HeightGrid, upper: Vec3, config: &PackingConfig) -> Option<(usize, usize)> {
    let row_after = interval_containing(grid.width_coordinates(), upper.x, config.general_epsilon)?;
    let column_after =
        interval_containing(grid.depth_coordinates(), upper.y, config.general_epsilon)?;
    Some((row_after, column_after))
}

/// Bewertet, ob eine Box mit unterer Ecke in Zelle (row, column) abgestellt werden kann.
///
/// Prüfreihenfolge: Container-Grenzen, ebene Auflage, Höhe. Der Score einer
/// zulässigen Position ist die Tiefenkoordinate nach dem Abstellen (Lademeter)
/// plus ein kleiner Zentrierungsterm entlang der Breite.
///
/// # Parameter
/// * `grid` - Aktuelle Höhenkarte
/// * `row`, `column` - Rasterzelle der unteren Ecke
/// * `size` - Abmessungen der Box (Breite, Tiefe, Höhe)
/// * `config` - Konfigurationsparameter
pub fn evaluate_placement(
    grid: &HeightGrid,
    row: usize,
    column: usize,
    size: Vec3,
    config: &PackingConfig,
) -> PlacementEvaluation {
    let Some(bounds) = footprint(grid, row, column, size) else {
        return PlacementEvaluation::rejected(PlacementReason::DoesNotFit);
    };
    let (lower, upper) = (bounds.min, bounds.max);

    if !within_extents(grid, upper, config) {
        return PlacementEvaluation::rejected(PlacementReason::DoesNotFit);
    }

    let Some((row_after, column_after)) = covered_until(grid, upper, config) else {
        return PlacementEvaluation::rejected(PlacementReason::DoesNotFit);
    };

    // Keine Überhänge: jede Zelle unter der Grundfläche hat die Höhe der Ecke.
    for i in row..=row_after {
        for j in column..=column_after {
            if (grid.height(i, j) - lower.z).abs() > config.height_epsilon {
                return PlacementEvaluation::rejected(PlacementReason::NotWellSupported);
            }
        }
    }

    if upper.z > grid.height_limit() + config.general_epsilon {
        return PlacementEvaluation::rejected(PlacementReason::ExceedsHeight);
    }

    let score =
        upper.y + config.centering_weight * center_offset(lower.x, upper.x, grid.width_extent());

    PlacementEvaluation {
        feasible: true,
        score,
        reason: PlacementReason::Accepted,
    }
}

/// Durchsucht alle Rasterzellen zeilenweise nach der Position mit dem kleinsten Score.
///
/// Standardmäßig gewinnt bei Gleichstand die zuletzt gescannte Zelle (`<=`);
/// mit `prefer_first_tie` die zuerst gescannte.
///
/// # Rückgabewert
/// Beste Position oder `BestPosition::NONE`, falls keine Zelle zulässig ist
pub fn find_best_position(grid: &HeightGrid, size: Vec3, config: &PackingConfig) -> BestPosition {
    let mut best = BestPosition::NONE;

    for row in 0..grid.rows() {
        for column in 0..grid.columns() {
            let evaluation = evaluate_placement(grid, row, column, size, config);
            if !evaluation.feasible {
                trace!(row, column, reason = evaluation.reason.code(), "candidate rejected");
                continue;
            }

            let better = if config.prefer_first_tie {
                evaluation.score < best.score
            } else {
                evaluation.score <= best.score
            };
            if better {
                best = BestPosition {
                    row,
                    column,
                    score: evaluation.score,
                };
            }
        }
    }

    debug!(
        row = best.row,
        column = best.column,
        score = best.score,
        found = best.is_found(),
        "best position search finished"
    );
    best
}

/// Schreibt eine Box mit unterer Ecke in Zelle (row, column) fest.
///
/// Verfeinert das Raster an der oberen Ecke, falls diese nicht auf einer
/// vorhandenen Linie liegt, setzt alle überdeckten Zellen auf die neue Höhe und
/// hängt die Box an die Liste des Containers an.
///
/// Die Auflage wird hier nicht erneut geprüft; das ist Aufgabe der Bewertung.
///
/// # Rückgabewert
/// `Ok(false)` ohne Änderung, wenn die Box Breite, Tiefe oder Höhe überschreitet
pub fn load_box(
    container: &mut Container,
    row: usize,
    column: usize,
    size: Vec3,
    config: &PackingConfig,
) -> Result<bool, GridError> {
    let grid = &container.grid;
    let bounds = footprint(grid, row, column, size).ok_or(GridError::CellOutOfRange { row, column })?;
    let (lower, upper) = (bounds.min, bounds.max);

    if !within_extents(grid, upper, config)
        || upper.z > grid.height_limit() + config.general_epsilon
    {
        debug!(row, column, "box does not fit, nothing loaded");
        return Ok(false);
    }

    let Some((row_after, column_after)) = covered_until(grid, upper, config) else {
        return Ok(false);
    };

    let grid = &mut container.grid;
    if !lies_on_line(grid.width_coordinates(), row_after + 1, upper.x, config.general_epsilon) {
        grid.insert_coordinate(Axis::Width, row_after + 1, upper.x)?;
    }
    if !lies_on_line(
        grid.depth_coordinates(),
        column_after + 1,
        upper.y,
        config.general_epsilon,
    ) {
        grid.insert_coordinate(Axis::Depth, column_after + 1, upper.y)?;
    }

    let top = upper.z.min(grid.height_limit());
    for i in row..=row_after {
        for j in column..=column_after {
            grid.set_height(i, j, top)?;
        }
    }

    container.placed.push(PlacedBox {
        index: container.placed.len(),
        size,
        bounds: BoundingBox::new(lower, Vec3::new(upper.x, upper.y, top)),
    });
    Ok(true)
}

/// Sucht die beste Position und lädt die Box dort.
///
/// # Rückgabewert
/// Die genutzte Position, oder `None`, wenn keine zulässige Position existiert
pub fn load_at_best_position(
    container: &mut Container,
    size: Vec3,
    config: &PackingConfig,
) -> Result<Option<BestPosition>, GridError> {
    let best = find_best_position(&container.grid, size, config);
    if !best.is_found() {
        return Ok(None);
    }
    let loaded = load_box(container, best.row, best.column, size, config)?;
    Ok(loaded.then_some(best))
}
