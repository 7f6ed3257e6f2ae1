use crate::core::EmbeddingMatrix;
use crate::error::AnalysisError;
use crate::index::NeighborIndex;
use crate::tests::init;
use crate::tests::test_data::unit_vectors;

#[test]
fn test_search_returns_k_sorted_records() {
    init();
    let vectors = unit_vectors(50, 8, 7);
    let index = NeighborIndex::build(vectors.clone());

    for i in 0..vectors.nitems {
        let hits = index.search(vectors.row(i), 10).unwrap();
        assert_eq!(hits.len(), 10);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }
}

#[test]
fn test_self_query_finds_itself_first() {
    let vectors = unit_vectors(30, 4, 3);
    let index = NeighborIndex::build(vectors.clone());

    let hits = index.search(vectors.row(5), 1).unwrap();
    assert_eq!(hits[0].row, 5);
    assert!((hits[0].similarity - 1.0).abs() < 1e-12);
}

#[test]
fn test_batch_excludes_self_within_split() {
    let vectors = unit_vectors(25, 6, 11);
    let index = NeighborIndex::build(vectors.clone());

    let all = index.search_batch(&vectors, 5, true).unwrap();
    assert_eq!(all.len(), 25);
    for (i, hits) in all.iter().enumerate() {
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|h| h.row != i), "row {} returned itself", i);
    }

    // cross-split style query keeps the exact match
    let kept = index.search_batch(&vectors, 5, false).unwrap();
    for (i, hits) in kept.iter().enumerate() {
        assert_eq!(hits[0].row, i);
    }
}

#[test]
fn test_k_larger_than_index() {
    let vectors = unit_vectors(4, 3, 1);
    let index = NeighborIndex::build(vectors.clone());

    assert_eq!(index.search(vectors.row(0), 10).unwrap().len(), 4);
    assert_eq!(
        index.search_excluding(vectors.row(0), 10, Some(0)).unwrap().len(),
        3
    );
}

#[test]
fn test_empty_index_returns_nothing() {
    let index = NeighborIndex::build(EmbeddingMatrix::empty(3));
    assert!(index.is_empty());

    // emptiness wins over a mismatched query width
    let hits = index.search(&[1.0, 0.0], 5).unwrap();
    assert!(hits.is_empty());

    let queries = unit_vectors(3, 3, 2);
    let batch = index.search_batch(&queries, 5, false).unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.iter().all(|h| h.is_empty()));
}

#[test]
fn test_dimension_mismatch() {
    let index = NeighborIndex::build(unit_vectors(10, 3, 5));

    let err = index.search(&[1.0, 0.0], 2).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::DimensionMismatch {
            expected: 3,
            found: 2
        }
    ));

    let queries = unit_vectors(2, 4, 5);
    assert!(matches!(
        index.search_batch(&queries, 2, false),
        Err(AnalysisError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_rebuild_is_deterministic() {
    let vectors = unit_vectors(40, 5, 21);
    let a = NeighborIndex::build(vectors.clone());
    let b = NeighborIndex::build(vectors.clone());

    for i in 0..vectors.nitems {
        let ha = a.search_excluding(vectors.row(i), 7, Some(i)).unwrap();
        let hb = b.search_excluding(vectors.row(i), 7, Some(i)).unwrap();
        assert_eq!(ha, hb);
    }
}

#[test]
fn test_ties_break_by_row_index() {
    let vectors = EmbeddingMatrix::from_rows(vec![
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 0.0],
        vec![1.0, 0.0],
    ]);
    let index = NeighborIndex::build(vectors);

    let hits = index.search(&[1.0, 0.0], 3).unwrap();
    let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
    assert_eq!(rows, vec![1, 2, 3]);

    let hits = index.search_excluding(&[1.0, 0.0], 2, Some(2)).unwrap();
    let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
    assert_eq!(rows, vec![1, 3]);
}
