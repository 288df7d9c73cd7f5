use ragkit_core::error::Error;
use ragkit_core::traits::DenseSource;
use ragkit_vector::{open_db, write_dense_index, LanceDenseIndex};

fn unit(v: &[f32]) -> Vec<f32> {
    let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / n).collect()
}

fn positions(hits: &[ragkit_core::types::Candidate]) -> Vec<usize> {
    hits.iter().map(|h| h.position).collect()
}

#[tokio::test]
async fn dense_full_flow() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().into_owned();
    let conn = open_db(&uri).await?;
    let vectors = vec![unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 1.0, 0.0]), unit(&[0.0, 0.0, 1.0]), unit(&[1.0, 1.0, 0.0])];
    write_dense_index(&conn, "knowledge_dense", 3, &vectors).await?;

    let index = LanceDenseIndex::open(&uri, "knowledge_dense").await?;
    assert_eq!(index.len(), 4);
    assert_eq!(index.dim(), 3);

    let hits = index.search(&unit(&[1.0, 0.1, 0.0]), 2)?;
    assert_eq!(positions(&hits), vec![0, 3]);
    assert!(hits[0].score <= 1.0 && hits[0].score > hits[1].score);
    Ok(())
}

#[tokio::test]
async fn fetch_beyond_table_returns_every_row_nearest_first() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().into_owned();
    let conn = open_db(&uri).await?;
    let vectors = vec![unit(&[1.0, 0.0]), unit(&[0.0, 1.0]), unit(&[1.0, 1.0])];
    write_dense_index(&conn, "d", 2, &vectors).await?;

    let index = LanceDenseIndex::open(&uri, "d").await?;
    let hits = index.search(&unit(&[1.0, 0.2]), 10)?;
    assert_eq!(positions(&hits), vec![0, 2, 1]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    // exact vectors score 1 after clipping
    let exact = index.search(&unit(&[0.0, 1.0]), 1)?;
    assert_eq!(exact[0].position, 1);
    assert!((exact[0].score - 1.0).abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn equal_distances_break_by_position() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().into_owned();
    let conn = open_db(&uri).await?;
    let v = unit(&[0.0, 1.0]);
    write_dense_index(&conn, "d", 2, &[v.clone(), v.clone(), v]).await?;

    let index = LanceDenseIndex::open(&uri, "d").await?;
    assert_eq!(positions(&index.search(&unit(&[1.0, 0.0]), 3)?), vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn query_checks_happen_before_searching() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().into_owned();
    let conn = open_db(&uri).await?;
    write_dense_index(&conn, "d", 2, &[unit(&[1.0, 0.0])]).await?;

    let index = LanceDenseIndex::open(&uri, "d").await?;
    assert!(matches!(index.search(&[1.0, 0.0, 0.0], 1), Err(Error::DimensionMismatch { expected: 2, got: 3 })));
    assert!(matches!(index.search(&[1.0, 0.0], 0), Err(Error::InvalidParameter(_))));
    Ok(())
}

#[tokio::test]
async fn empty_table_opens_and_finds_nothing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().into_owned();
    let conn = open_db(&uri).await?;
    write_dense_index(&conn, "empty", 4, &[]).await?;

    let index = LanceDenseIndex::open(&uri, "empty").await?;
    assert_eq!(index.len(), 0);
    assert_eq!(index.dim(), 4);
    assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_table_is_unavailable() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().into_owned();
    let err = LanceDenseIndex::open(&uri, "absent").await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn writer_refuses_mismatched_dimensions() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = open_db(&tmp.path().to_string_lossy()).await?;
    let err = write_dense_index(&conn, "t", 3, &[vec![1.0, 0.0]]).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
    Ok(())
}

#[tokio::test]
async fn writer_refuses_existing_table() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = open_db(&tmp.path().to_string_lossy()).await?;
    write_dense_index(&conn, "t", 2, &[unit(&[1.0, 0.0])]).await?;
    let err = write_dense_index(&conn, "t", 2, &[unit(&[0.0, 1.0])]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
    Ok(())
}
