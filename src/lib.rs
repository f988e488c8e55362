//! Container loading on a height-map grid, with a genetic search over load orders.
//!
//! Bottom-up: [`grid`] holds the height map, [`optimizer`] evaluates, searches
//! and commits single boxes, [`genetic`] searches load orders using those as its
//! fitness oracle and [`report`] turns a plan into the viewer payload.

pub mod api;
pub mod config;
pub mod genetic;
pub mod geometry;
pub mod grid;
pub mod model;
pub mod optimizer;
pub mod report;
pub mod types;
