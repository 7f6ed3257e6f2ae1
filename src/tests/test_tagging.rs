use crate::builder::SimilarityConfig;
use crate::core::{EmbeddingMatrix, NeighborRecord, Split};
use crate::index::NeighborIndex;
use crate::tagging::{NeighborTagger, RowTags, SplitView, TagKind, TagSummary};
use crate::tests::init;
use crate::tests::test_data::planar;

/// 21 nearby unit vectors: row 0 and rows 4..=20 labelled 0, rows 1..=3 labelled 1.
fn crowded_split() -> (EmbeddingMatrix, Vec<usize>) {
    let rows: Vec<Vec<f64>> = (0..21).map(|i| planar(0.01 * i as f64)).collect();
    let labels: Vec<usize> = (0..21).map(|i| if (1..=3).contains(&i) { 1 } else { 0 }).collect();
    (EmbeddingMatrix::from_rows(rows), labels)
}

fn tagger(conflicting: f64, no_close: f64, k: usize) -> NeighborTagger {
    NeighborTagger::new(&SimilarityConfig {
        neighbors: k,
        conflicting_neighbors_threshold: conflicting,
        no_close_threshold: no_close,
        ..Default::default()
    })
}

#[test]
fn test_conflicting_ratio_uses_constant_denominator() {
    let labels: Vec<usize> = (0..21).map(|i| if (1..=3).contains(&i) { 1 } else { 0 }).collect();
    let neighbours: Vec<NeighborRecord> = (1..=20)
        .map(|row| NeighborRecord::new(row, 1.0 - 0.01 * row as f64))
        .collect();

    // 3 of 20 disagree -> 0.15
    assert!(tagger(0.1, 0.5, 20).is_conflicting(0, &neighbours, &labels));
    assert!(!tagger(0.2, 0.5, 20).is_conflicting(0, &neighbours, &labels));

    // only the first 5 matched: 3 / 20 still, not 3 / 5
    assert!(!tagger(0.2, 0.5, 20).is_conflicting(0, &neighbours[..5], &labels));
}

#[test]
fn test_tagging_within_split() {
    init();
    let (vectors, labels) = crowded_split();
    let index = NeighborIndex::build(vectors);
    let train = SplitView::new(Split::Train, &index, &labels);

    let tags = tagger(0.1, 0.5, 20).tag(&train, &[train]).unwrap();
    assert_eq!(tags.len(), 21);
    assert!(tags[0].train.conflicting_neighbors);
    assert!(tags[1].train.conflicting_neighbors);
    for (i, t) in tags.iter().enumerate() {
        assert_eq!(t.train.neighbors.len(), 20);
        assert!(t.train.neighbors.iter().all(|n| n.row != i));
        assert!(!t.train.no_close);
    }

    let strict = tagger(0.2, 0.5, 20).tag(&train, &[train]).unwrap();
    assert!(!strict[0].train.conflicting_neighbors);
    assert!(!strict[4].train.conflicting_neighbors);
    // row 1 disagrees with 18 of its 20 neighbours
    assert!(strict[1].train.conflicting_neighbors);
}

#[test]
fn test_missing_split_defaults_to_false() {
    let (vectors, labels) = crowded_split();
    let index = NeighborIndex::build(vectors);
    let train = SplitView::new(Split::Train, &index, &labels);

    let tags = tagger(0.0, 2.0, 20).tag(&train, &[train]).unwrap();
    for t in &tags {
        assert_eq!(t.eval, Default::default());
        assert!(!t.eval.conflicting_neighbors);
        assert!(!t.eval.no_close);
        assert!(t.eval.neighbors.is_empty());
    }
}

#[test]
fn test_no_close_flags_isolated_rows() {
    let vectors = EmbeddingMatrix::from_rows(vec![
        vec![1.0, 0.0, 0.0],
        vec![0.99, 0.141, 0.0],
        vec![0.0, 0.0, 1.0],
    ]);
    let labels = vec![0, 0, 1];
    let index = NeighborIndex::build(vectors);
    let train = SplitView::new(Split::Train, &index, &labels);

    let tags = tagger(0.9, 0.5, 1).tag(&train, &[train]).unwrap();
    assert!(!tags[0].train.no_close);
    assert!(!tags[1].train.no_close);
    assert!(tags[2].train.no_close);
}

#[test]
fn test_cross_split_keeps_exact_matches() {
    let (train_vectors, train_labels) = crowded_split();
    let train_index = NeighborIndex::build(train_vectors);

    let eval_vectors = EmbeddingMatrix::from_rows(vec![planar(0.0), planar(0.02)]);
    let eval_labels = vec![1, 0];
    let eval_index = NeighborIndex::build(eval_vectors);

    let train = SplitView::new(Split::Train, &train_index, &train_labels);
    let eval = SplitView::new(Split::Eval, &eval_index, &eval_labels);

    let tags = tagger(0.9, 0.5, 20).tag(&eval, &[train, eval]).unwrap();
    assert_eq!(tags[0].train.neighbors[0].row, 0);
    assert!((tags[0].train.neighbors[0].similarity - 1.0).abs() < 1e-12);
    assert_eq!(tags[0].train.neighbors.len(), 20);

    // eval label 1 against mostly label-0 train rows: 17 of 20 disagree
    assert!(!tags[0].train.conflicting_neighbors);
    // within eval only the other eval row remains
    assert_eq!(tags[0].eval.neighbors.len(), 1);
    assert_eq!(tags[0].eval.neighbors[0].row, 1);
}

#[test]
fn test_columns_and_summary() {
    let mut row = RowTags::default();
    row.train.conflicting_neighbors = true;
    row.eval.no_close = true;

    let columns = row.columns();
    assert_eq!(columns.len(), 4);
    assert_eq!(columns["conflicting_neighbors_train"], true);
    assert_eq!(columns["no_close_train"], false);
    assert_eq!(columns["conflicting_neighbors_eval"], false);
    assert_eq!(columns["no_close_eval"], true);
    assert_eq!(TagKind::NoClose.column(Split::Eval), "no_close_eval");

    let summary = TagSummary::from_tags(&[row.clone(), RowTags::default(), row]);
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.counts["conflicting_neighbors_train"], 2);
    assert_eq!(summary.counts["no_close_eval"], 2);
    assert_eq!(summary.counts["no_close_train"], 0);
}
