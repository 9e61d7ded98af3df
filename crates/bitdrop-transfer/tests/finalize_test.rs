//! Integration test: finalize preconditions, exclusivity and delivery

mod common;

use std::sync::Arc;

use bitdrop_core::{BitdropError, ErrorClass, UploadId};
use common::{harness, request, upload, FailingNotifier, RecordingNotifier};
use secrecy::SecretString;

fn chunks(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("chunk-{i}")).collect()
}

#[tokio::test]
async fn unknown_upload_is_not_found() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    let err = h
        .services
        .finalizer
        .complete(request(id, "abcd", "f.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, BitdropError::UploadNotFound(u) if u == id));
    assert_eq!(err.to_string(), format!("No upload found for {id}"));
}

#[tokio::test]
async fn incomplete_upload_reports_present_chunks() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    for index in [1, 3] {
        h.services
            .receiver
            .receive(&id, index, 4, "x")
            .await
            .unwrap();
    }

    match h.services.finalizer.complete(request(id, "abcd", "f.txt")).await {
        Err(BitdropError::IncompleteUpload {
            total,
            present,
            poisoned,
        }) => {
            assert_eq!(total, 4);
            assert_eq!(present, vec![1, 3]);
            assert!(!poisoned);
        }
        other => panic!("expected IncompleteUpload, got {other:?}"),
    }

    // resubmitting the missing chunks recovers the upload
    for index in [2, 4] {
        h.services
            .receiver
            .receive(&id, index, 4, "x")
            .await
            .unwrap();
    }
    h.services
        .finalizer
        .complete(request(id, "abcd", "f.txt"))
        .await
        .unwrap();
}

#[tokio::test]
async fn wrong_token_is_unauthorized_and_retryable() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    upload(&h.services, &id, &chunks(2)).await;

    let mut bad = request(id, "abcd", "f.txt");
    bad.auth_token = Some(SecretString::from("guess"));
    let err = h.services.finalizer.complete(bad).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Unauthorized);

    let mut missing = request(id, "abcd", "f.txt");
    missing.auth_token = None;
    assert!(matches!(
        h.services.finalizer.complete(missing).await,
        Err(BitdropError::Unauthorized)
    ));

    // staging is left alone, so the right token still works
    h.services
        .finalizer
        .complete(request(id, "abcd", "f.txt"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mode_needs_opt_in() {
    let notifier = Arc::new(RecordingNotifier::default());
    let h = harness(notifier.clone(), false).await;
    let id = UploadId::new_v4();
    upload(&h.services, &id, &chunks(1)).await;

    let mut req = request(id, "abcd", "f.txt");
    req.auth_token = None;
    req.test_mode = true;
    assert!(matches!(
        h.services.finalizer.complete(req).await,
        Err(BitdropError::Unauthorized)
    ));

    let notifier = Arc::new(RecordingNotifier::default());
    let h = harness(notifier.clone(), true).await;
    upload(&h.services, &id, &chunks(1)).await;
    let mut req = request(id, "abcd", "f.txt");
    req.auth_token = None;
    req.test_mode = true;
    let receipt = h.services.finalizer.complete(req).await.unwrap();
    assert_eq!(receipt.delivery_id, None);
    assert!(notifier.sent.lock().await.is_empty(), "test mode skips delivery");
}

#[tokio::test]
async fn invalid_key_segments_are_rejected() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    upload(&h.services, &id, &chunks(1)).await;

    for (hash, filename) in [("abcd", "../escape"), ("abcd", ""), ("../../x", "f"), ("abc", "f")] {
        let err = h
            .services
            .finalizer
            .complete(request(id, hash, filename))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation, "{hash:?} / {filename:?}");
    }
    assert!(!h.tmp.path().join("store").join("..").join("escape").exists());
}

#[tokio::test]
async fn notification_carries_link_and_delivery_id() {
    let notifier = Arc::new(RecordingNotifier::default());
    let h = harness(notifier.clone(), false).await;
    let id = UploadId::new_v4();
    upload(&h.services, &id, &chunks(2)).await;

    let mut req = request(id, "abcd", "report.pdf");
    req.message = Some("Quarterly numbers".into());
    let receipt = h.services.finalizer.complete(req).await.unwrap();
    assert_eq!(receipt.delivery_id.as_deref(), Some("msg-1"));
    assert_eq!(receipt.filename, "report.pdf");

    let sent = notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "recipient@example.com");
    assert_eq!(sent[0].subject, "A file was shared with you on BitDrop!");
    assert!(sent[0].body.starts_with("Quarterly numbers\n\n"));
    assert!(sent[0].body.ends_with(&format!("/verify?id={id}")));
}

#[tokio::test]
async fn delivery_failure_keeps_the_commit() {
    let h = harness(Arc::new(FailingNotifier), false).await;
    let id = UploadId::new_v4();
    upload(&h.services, &id, &chunks(3)).await;

    match h.services.finalizer.complete(request(id, "abcd", "kept.txt")).await {
        Err(BitdropError::Delivery { receipt, reason }) => {
            assert_eq!(receipt.upload_id, id);
            assert_eq!(receipt.delivery_id, None);
            assert!(reason.contains("mail relay unreachable"));
        }
        other => panic!("expected Delivery, got {other:?}"),
    }

    assert_eq!(h.services.retriever.chunk_count(&id).await.unwrap(), 3);
}

#[tokio::test]
async fn second_finalize_never_succeeds() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    upload(&h.services, &id, &chunks(2)).await;

    h.services
        .finalizer
        .complete(request(id, "abcd", "once.txt"))
        .await
        .unwrap();

    // staging is gone after the first finalize
    assert!(matches!(
        h.services.finalizer.complete(request(id, "abcd", "once.txt")).await,
        Err(BitdropError::UploadNotFound(_))
    ));

    // re-staging the same id cannot produce a second record
    upload(&h.services, &id, &chunks(2)).await;
    let err = h
        .services
        .finalizer
        .complete(request(id, "abcd", "once.txt"))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::AlreadyFinalized);
    assert!(h.services.retriever.lookup(&id).await.is_ok());
}

#[tokio::test]
async fn concurrent_finalize_admits_one() {
    let h = harness(Arc::new(RecordingNotifier::default()), false).await;
    let id = UploadId::new_v4();
    upload(&h.services, &id, &chunks(4)).await;

    let f = &h.services.finalizer;
    let (a, b) = tokio::join!(
        f.complete(request(id, "abcd", "race.txt")),
        f.complete(request(id, "abcd", "race.txt")),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                err,
                BitdropError::AlreadyFinalized(_) | BitdropError::UploadNotFound(_)
            ),
            "unexpected loser error: {err:?}"
        );
    }
    assert!(h.services.retriever.lookup(&id).await.is_ok());
}
