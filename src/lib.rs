//! # overlapspace
//!
//! Structural analysis of a labeled embedding dataset for model-debugging dashboards:
//!
//! - `index`: exact inner-product nearest-neighbour index over unit-norm embeddings.
//! - `tagging`: per-row smart tags derived from neighbourhoods across train/eval splits
//!   (`conflicting_neighbors_<split>`, `no_close_<split>`).
//! - `overlap`: Parzen-window density-ratio estimator of class overlap, with the spectral
//!   statistics (Bray-Curtis affinity, Laplacian eigenpairs, cumulative spectral gradient)
//!   computed in `laplacian`.
//! - `layout`: deterministic flow-diagram (Sankey) layout of an overlap matrix.
//! - `analysis`: the facade consumed by the dashboard layer, caching encoders and indices.

pub mod analysis;
pub mod builder;
pub mod core;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod laplacian;
pub mod layout;
pub mod overlap;
pub mod sampling;
pub mod tagging;

#[cfg(test)]
mod tests;
