//! Flow-diagram (Sankey) layout of a class-overlap matrix.
//!
//! The layout has two disjoint node sets over the same class space: source nodes on the
//! left (`x = 0.001`) and target nodes on the right (`x = 0.999`). Each retained entry
//! `S[i][j] >= threshold` becomes a link from source `i` to target `j`.
//!
//! Steps:
//! 1. flatten `S` into `(row, col, value)` triples sorted by descending value
//!    (stable: ties keep row-major order);
//! 2. without an explicit threshold, take the 10th-highest off-diagonal value floored
//!    to two decimals (`default_threshold`);
//! 3. keep entries at or above the threshold, the diagonal only with `self_overlap`;
//! 4. link weight is `value`, times the source class count with `scale_by_class`;
//! 5. nodes are ordered by descending total off-diagonal overlap involving their class;
//! 6. node heights are proportional to linked mass, separated by at most `NODE_PAD`, and `y`
//!    is the middle of each band; all coordinates stay strictly inside (0, 1).
//!
//! The layout never mutates the estimate and keeps `S` asymmetric as given.

use std::cmp::Ordering;

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::{CsMat, TriMat};

/// Number of off-diagonal pairs the default threshold aims to display.
pub const DEFAULT_TOP_PAIRS: usize = 10;
/// Vertical gap between stacked nodes, in layout units.
pub const NODE_PAD: f64 = 0.02;
/// Distance kept from the (0, 1) borders.
pub const EDGE_MARGIN: f64 = 0.001;

pub const PALETTE: [&str; 10] = [
    "#636EFA", "#EF553B", "#00CC96", "#AB63FA", "#FFA15A", "#19D3F3", "#FF6692", "#B6E880",
    "#FF97FF", "#FECB52",
];

/// One `(row, col, value)` entry of the overlap matrix, in dense class indices.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlapPair {
    pub source: usize,
    pub target: usize,
    pub value: f64,
}

impl OverlapPair {
    #[inline]
    pub fn is_self(&self) -> bool {
        self.source == self.target
    }
}

/// Threshold picked by `default_threshold` together with the pairs it keeps.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdSelection {
    pub threshold: f64,
    pub selected: Vec<OverlapPair>,
}

/// Floors to two decimals; the epsilon absorbs binary rounding (0.29 * 100 = 28.999..).
#[inline]
pub fn floor_2dp(value: f64) -> f64 {
    (value * 100.0 + 1e-9).floor() / 100.0
}

/// Default threshold over off-diagonal pairs sorted by descending value.
///
/// Takes the `target_pairs`-th highest value (the lowest one when fewer pairs exist),
/// floored to two decimals, and returns every pair at or above it, ties included.
/// With no pairs at all the threshold is 0.
pub fn default_threshold(sorted_desc: &[OverlapPair], target_pairs: usize) -> ThresholdSelection {
    if sorted_desc.is_empty() || target_pairs == 0 {
        return ThresholdSelection {
            threshold: 0.0,
            selected: Vec::new(),
        };
    }
    let pick = target_pairs.min(sorted_desc.len()) - 1;
    if sorted_desc.len() < target_pairs {
        debug!(
            "only {} off-diagonal pairs (< {}), using the lowest value",
            sorted_desc.len(),
            target_pairs
        );
    }
    let threshold = floor_2dp(sorted_desc[pick].value);
    let selected = sorted_desc
        .iter()
        .copied()
        .filter(|p| p.value >= threshold)
        .collect();
    ThresholdSelection {
        threshold,
        selected,
    }
}

/// Flattens a square matrix into triples sorted by descending value (stable).
pub fn sorted_pairs(s: &DenseMatrix<f64>) -> Vec<OverlapPair> {
    let (n, m) = s.shape();
    assert_eq!(n, m, "overlap matrix must be square: ({},{})", n, m);
    let mut pairs: Vec<OverlapPair> = (0..n)
        .flat_map(|i| {
            (0..n).map(move |j| OverlapPair {
                source: i,
                target: j,
                value: *s.get((i, j)),
            })
        })
        .collect();
    pairs.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    pairs
}

/// Request-scoped layout options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    /// Keep diagonal entries as links.
    pub self_overlap: bool,
    /// Multiply link weights by the source class count.
    pub scale_by_class: bool,
    /// Explicit threshold; computed with `default_threshold` when absent.
    pub overlap_threshold: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeSide {
    Source,
    Target,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    /// Dense class index.
    pub class_index: usize,
    pub label: String,
    pub side: NodeSide,
    pub x: f64,
    pub y: f64,
    pub color: String,
    /// Classes this one overlaps with above threshold (diagonal excluded).
    pub overlap_count: usize,
    pub hover: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutLink {
    /// Position of the source node in `OverlapLayout::nodes`.
    pub source: usize,
    /// Position of the target node in `OverlapLayout::nodes`.
    pub target: usize,
    pub weight: f64,
    /// Raw overlap value `S[i][j]`.
    pub value: f64,
}

/// Renderable node/link geometry and the threshold that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlapLayout {
    pub nodes: Vec<LayoutNode>,
    pub links: Vec<LayoutLink>,
    pub threshold: f64,
}

impl OverlapLayout {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn source_nodes(&self) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.iter().filter(|n| n.side == NodeSide::Source)
    }

    pub fn target_nodes(&self) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.iter().filter(|n| n.side == NodeSide::Target)
    }
}

/// Builds `OverlapLayout`s from an overlap matrix; stateless apart from its options.
#[derive(Clone, Debug, Default)]
pub struct OverlapLayoutEngine {
    pub params: LayoutParams,
}

impl OverlapLayoutEngine {
    pub fn new(params: LayoutParams) -> Self {
        Self { params }
    }

    /// Lays out `s` with `class_counts[i]` members and display `labels[i]` per class.
    ///
    /// # Panics
    ///
    /// - If `s` is not square.
    /// - If `class_counts` or `labels` do not have one entry per class.
    pub fn layout(
        &self,
        s: &DenseMatrix<f64>,
        class_counts: &[usize],
        labels: &[String],
    ) -> OverlapLayout {
        let n = s.shape().0;
        let pairs = sorted_pairs(s);
        assert_eq!(class_counts.len(), n, "one class count per class expected");
        assert_eq!(labels.len(), n, "one label per class expected");

        let non_self: Vec<OverlapPair> = pairs.iter().copied().filter(|p| !p.is_self()).collect();
        let threshold = match self.params.overlap_threshold {
            Some(t) => t,
            None => default_threshold(&non_self, DEFAULT_TOP_PAIRS).threshold,
        };
        info!(
            "Overlap layout: {} classes, threshold={:.2}, self_overlap={}, scale_by_class={}",
            n, threshold, self.params.self_overlap, self.params.scale_by_class
        );

        let working: &[OverlapPair] = if self.params.self_overlap {
            &pairs
        } else {
            &non_self
        };
        let retained: Vec<OverlapPair> = working
            .iter()
            .copied()
            .filter(|p| p.value >= threshold)
            .collect();
        debug!("{} of {} pairs retained", retained.len(), working.len());

        let weight_of = |p: &OverlapPair| {
            if self.params.scale_by_class {
                p.value * class_counts[p.source] as f64
            } else {
                p.value
            }
        };

        // node order: total off-diagonal overlap involving the class, pre-threshold
        let mut involvement = vec![0.0; n];
        for p in &non_self {
            involvement[p.source] += p.value;
            involvement[p.target] += p.value;
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            involvement[b]
                .partial_cmp(&involvement[a])
                .unwrap_or(Ordering::Equal)
        });

        let mut source_mass = vec![0.0; n];
        let mut target_mass = vec![0.0; n];
        let mut source_used = vec![false; n];
        let mut target_used = vec![false; n];
        for p in &retained {
            let w = weight_of(p);
            source_mass[p.source] += w;
            target_mass[p.target] += w;
            source_used[p.source] = true;
            target_used[p.target] = true;
        }
        let sources: Vec<usize> = order.iter().copied().filter(|&c| source_used[c]).collect();
        let targets: Vec<usize> = order.iter().copied().filter(|&c| target_used[c]).collect();

        let overlaps = thresholded_overlaps(s, threshold);
        let source_counts = row_counts(&overlaps);
        let target_counts = row_counts(&overlaps.to_csc());

        let source_y = stack_positions(&sources, &source_mass);
        let target_y = stack_positions(&targets, &target_mass);

        let mut nodes = Vec::with_capacity(sources.len() + targets.len());
        let mut source_pos = vec![usize::MAX; n];
        let mut target_pos = vec![usize::MAX; n];
        for (k, &c) in sources.iter().enumerate() {
            source_pos[c] = nodes.len();
            nodes.push(make_node(c, &labels[c], NodeSide::Source, source_y[k], source_counts[c]));
        }
        for (k, &c) in targets.iter().enumerate() {
            target_pos[c] = nodes.len();
            nodes.push(make_node(c, &labels[c], NodeSide::Target, target_y[k], target_counts[c]));
        }

        let links: Vec<LayoutLink> = retained
            .iter()
            .map(|p| LayoutLink {
                source: source_pos[p.source],
                target: target_pos[p.target],
                weight: weight_of(p),
                value: p.value,
            })
            .collect();
        trace!("layout nodes: {:?}", nodes);

        OverlapLayout {
            nodes,
            links,
            threshold,
        }
    }
}

fn make_node(
    class_index: usize,
    label: &str,
    side: NodeSide,
    y: f64,
    overlap_count: usize,
) -> LayoutNode {
    let x = match side {
        NodeSide::Source => EDGE_MARGIN,
        NodeSide::Target => 1.0 - EDGE_MARGIN,
    };
    let hover = match side {
        NodeSide::Source => format!("{} overlaps with {} class(es)", label, overlap_count),
        NodeSide::Target => format!("{} is overlapped by {} class(es)", label, overlap_count),
    };
    LayoutNode {
        class_index,
        label: label.to_string(),
        side,
        x,
        y,
        color: PALETTE[class_index % PALETTE.len()].to_string(),
        overlap_count,
        hover,
    }
}

/// Off-diagonal entries at or above `threshold` as a sparse 0/1 CSR matrix.
fn thresholded_overlaps(s: &DenseMatrix<f64>, threshold: f64) -> CsMat<f64> {
    let n = s.shape().0;
    let mut tri = TriMat::new((n, n));
    for i in 0..n {
        for j in 0..n {
            if i != j && *s.get((i, j)) >= threshold {
                tri.add_triplet(i, j, 1.0);
            }
        }
    }
    tri.to_csr()
}

/// Stored entries per outer dimension (rows for CSR, columns for CSC).
fn row_counts(m: &CsMat<f64>) -> Vec<usize> {
    m.outer_iterator().map(|v| v.nnz()).collect()
}

/// Middle of each node's band when nodes are stacked top to bottom with heights
/// proportional to their mass.
///
/// Padding shrinks below `NODE_PAD` when there are many nodes, so gaps never take
/// more than half of the axis.
fn stack_positions(nodes: &[usize], mass: &[f64]) -> Vec<f64> {
    if nodes.is_empty() {
        return Vec::new();
    }
    let total: f64 = nodes.iter().map(|&c| mass[c]).sum();
    let pad = NODE_PAD.min(0.5 / nodes.len() as f64);
    let available = 1.0 - pad * (nodes.len() - 1) as f64;

    let mut cursor = 0.0;
    nodes
        .iter()
        .map(|&c| {
            let share = if total > 0.0 {
                mass[c] / total
            } else {
                1.0 / nodes.len() as f64
            };
            let height = share * available;
            let y = cursor + height / 2.0;
            cursor += height + pad;
            y.clamp(EDGE_MARGIN, 1.0 - EDGE_MARGIN)
        })
        .collect()
}
