//! Neighbour-derived smart tags.
//!
//! For every row `r` of a source split and every available target split, the tagger
//! retrieves `K` neighbours (the row itself excluded when source and target coincide)
//! and derives:
//!
//! - `conflicting_neighbors_<split>`: the fraction of the `K` neighbours whose label
//!   differs from `r`'s label is at least `conflicting_neighbors_threshold`. The
//!   denominator is always `K`, even when fewer neighbours exist.
//! - `no_close_<split>`: the nearest neighbour's similarity is below `no_close_threshold`.
//!
//! Splits that are not loaded yield `false` tags and an empty neighbour list.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::builder::SimilarityConfig;
use crate::core::{EmbeddingMatrix, NeighborRecord, Split};
use crate::error::AnalysisResult;
use crate::index::NeighborIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    ConflictingNeighbors,
    NoClose,
}

impl TagKind {
    pub const ALL: [TagKind; 2] = [TagKind::ConflictingNeighbors, TagKind::NoClose];

    /// Dataset column name of this tag for `split`, e.g. `no_close_eval`.
    pub fn column(&self, split: Split) -> String {
        let prefix = match self {
            TagKind::ConflictingNeighbors => "conflicting_neighbors",
            TagKind::NoClose => "no_close",
        };
        format!("{}_{}", prefix, split)
    }
}

/// Tags of one row against one target split.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitTags {
    pub conflicting_neighbors: bool,
    pub no_close: bool,
    pub neighbors: Vec<NeighborRecord>,
}

/// Tags of one row against both splits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowTags {
    pub train: SplitTags,
    pub eval: SplitTags,
}

impl RowTags {
    pub fn get(&self, split: Split) -> &SplitTags {
        match split {
            Split::Train => &self.train,
            Split::Eval => &self.eval,
        }
    }

    fn get_mut(&mut self, split: Split) -> &mut SplitTags {
        match split {
            Split::Train => &mut self.train,
            Split::Eval => &mut self.eval,
        }
    }

    pub fn tag(&self, kind: TagKind, split: Split) -> bool {
        let tags = self.get(split);
        match kind {
            TagKind::ConflictingNeighbors => tags.conflicting_neighbors,
            TagKind::NoClose => tags.no_close,
        }
    }

    /// All four tag columns, keyed by column name.
    pub fn columns(&self) -> BTreeMap<String, bool> {
        Split::ALL
            .iter()
            .flat_map(|&split| {
                TagKind::ALL
                    .iter()
                    .map(move |&kind| (kind.column(split), self.tag(kind, split)))
            })
            .collect()
    }
}

/// Number of rows flagged per tag column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub rows: usize,
    pub counts: BTreeMap<String, usize>,
}

impl TagSummary {
    pub fn from_tags(tags: &[RowTags]) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for split in Split::ALL {
            for kind in TagKind::ALL {
                let n = tags.iter().filter(|t| t.tag(kind, split)).count();
                counts.insert(kind.column(split), n);
            }
        }
        Self {
            rows: tags.len(),
            counts,
        }
    }
}

/// A loaded split as seen by the tagger: its index (over its own embeddings) and labels.
#[derive(Clone, Copy, Debug)]
pub struct SplitView<'a> {
    pub split: Split,
    pub index: &'a NeighborIndex,
    pub labels: &'a [usize],
}

impl<'a> SplitView<'a> {
    pub fn new(split: Split, index: &'a NeighborIndex, labels: &'a [usize]) -> Self {
        assert_eq!(
            index.len(),
            labels.len(),
            "index rows must match number of labels"
        );
        Self {
            split,
            index,
            labels,
        }
    }

    #[inline]
    pub fn embeddings(&self) -> &'a EmbeddingMatrix {
        self.index.vectors()
    }
}

pub struct NeighborTagger {
    pub neighbors: usize,
    pub conflicting_neighbors_threshold: f64,
    pub no_close_threshold: f64,
}

impl NeighborTagger {
    pub fn new(config: &SimilarityConfig) -> Self {
        Self {
            neighbors: config.neighbors,
            conflicting_neighbors_threshold: config.conflicting_neighbors_threshold,
            no_close_threshold: config.no_close_threshold,
        }
    }

    /// Tags every row of `source` against each split in `targets`.
    ///
    /// `targets` holds the loaded splits; a split missing from it leaves default tags.
    /// `source` may appear in `targets`, in which case self matches are excluded.
    pub fn tag(
        &self,
        source: &SplitView,
        targets: &[SplitView],
    ) -> AnalysisResult<Vec<RowTags>> {
        info!(
            "Tagging {} rows of `{}` against {:?}",
            source.labels.len(),
            source.split,
            targets.iter().map(|t| t.split).collect::<Vec<_>>()
        );
        let mut tags = vec![RowTags::default(); source.labels.len()];

        for target in targets {
            let same_split = target.split == source.split;
            let neighbours =
                target
                    .index
                    .search_batch(source.embeddings(), self.neighbors, same_split)?;

            for (row, nbrs) in neighbours.into_iter().enumerate() {
                let own = source.labels[row];
                let split_tags = tags[row].get_mut(target.split);
                split_tags.conflicting_neighbors = self.is_conflicting(own, &nbrs, target.labels);
                split_tags.no_close = self.is_isolated(&nbrs);
                split_tags.neighbors = nbrs;
            }
            debug!(
                "`{}` vs `{}`: {} conflicting, {} without close neighbour",
                source.split,
                target.split,
                tags.iter().filter(|t| t.get(target.split).conflicting_neighbors).count(),
                tags.iter().filter(|t| t.get(target.split).no_close).count()
            );
        }

        Ok(tags)
    }

    /// Share of the `K` neighbours labelled differently from `own` reaches the threshold.
    pub fn is_conflicting(
        &self,
        own: usize,
        neighbours: &[NeighborRecord],
        labels: &[usize],
    ) -> bool {
        if neighbours.is_empty() || self.neighbors == 0 {
            return false;
        }
        let disagreeing = neighbours.iter().filter(|n| labels[n.row] != own).count();
        let ratio = disagreeing as f64 / self.neighbors as f64;
        ratio >= self.conflicting_neighbors_threshold
    }

    /// Nearest neighbour is less similar than the threshold.
    pub fn is_isolated(&self, neighbours: &[NeighborRecord]) -> bool {
        neighbours
            .first()
            .map(|n| n.similarity < self.no_close_threshold)
            .unwrap_or(false)
    }
}
