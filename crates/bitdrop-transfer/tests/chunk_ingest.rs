//! Integration test: chunk ingestion rules as senders experience them

mod common;

use std::sync::Arc;

use bitdrop_core::{BitdropError, ErrorClass, UploadId};
use common::{harness, request, RecordingNotifier};

#[tokio::test]
async fn chunks_land_in_staging_layout() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();

    for index in 1..=3 {
        let staged = h
            .services
            .receiver
            .receive(&id, index, 3, "cGF5bG9hZA==")
            .await
            .unwrap();
        let expected = h
            .tmp
            .path()
            .join("staging")
            .join(id.to_string())
            .join("of-3")
            .join(index.to_string());
        assert_eq!(staged.path, expected);
        assert!(expected.exists());
    }
}

#[tokio::test]
async fn out_of_order_arrival_completes() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();

    for index in [2, 3, 1] {
        h.services
            .receiver
            .receive(&id, index, 3, &format!("chunk-{index}"))
            .await
            .unwrap();
    }
    h.services
        .finalizer
        .complete(request(id, "abcdef", "ooo.txt"))
        .await
        .unwrap();

    let set = h.services.retriever.fetch_all(&id).await.unwrap();
    assert_eq!(set.chunks, vec!["chunk-1", "chunk-2", "chunk-3"]);
}

#[tokio::test]
async fn invalid_ranges_are_rejected() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    let r = &h.services.receiver;

    for (index, total) in [(0, 3), (-1, 3), (1, 0), (1, -5)] {
        let err = r.receive(&id, index, total, "x").await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation, "({index}, {total})");
        assert_eq!(
            err.to_string(),
            "chunkIndex and totalChunks must be natural numbers"
        );
    }

    for index in [4, 5] {
        let err = r.receive(&id, index, 3, "x").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("chunkIndex was {index}, but totalChunks is only 3")
        );
    }
}

#[tokio::test]
async fn duplicate_chunk_poisons_upload_for_good() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    let r = &h.services.receiver;

    r.receive(&id, 1, 2, "a").await.unwrap();
    let err = r.receive(&id, 1, 2, "a").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Upload {id} contains duplicate chunkIndex values")
    );

    // the remaining chunk still cannot be added
    assert!(matches!(
        r.receive(&id, 2, 2, "b").await,
        Err(BitdropError::DuplicateChunk(_))
    ));

    match h.services.finalizer.complete(request(id, "abcd", "f")).await {
        Err(BitdropError::IncompleteUpload { poisoned, .. }) => assert!(poisoned),
        other => panic!("expected IncompleteUpload, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_duplicates_admit_exactly_one() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    let r = &h.services.receiver;

    let results = race_same_index(r, &id).await;
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1, "exactly one writer may win the index");
}

async fn race_same_index(
    r: &bitdrop_transfer::ChunkReceiver,
    id: &UploadId,
) -> Vec<Result<bitdrop_core::StagedChunk, BitdropError>> {
    let (a, b, c) = tokio::join!(
        r.receive(id, 1, 1, "first"),
        r.receive(id, 1, 1, "second"),
        r.receive(id, 1, 1, "third"),
    );
    vec![a, b, c]
}

#[tokio::test]
async fn changing_total_midway_is_rejected() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    let r = &h.services.receiver;

    r.receive(&id, 1, 3, "a").await.unwrap();
    let err = r.receive(&id, 2, 2, "b").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert!(matches!(
        err,
        BitdropError::TotalMismatch {
            expected: 3,
            got: 2,
            ..
        }
    ));
}
