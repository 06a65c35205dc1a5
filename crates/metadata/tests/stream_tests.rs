//! Stream index tests.

mod common;

use common::{
    TestMetadata, blob_hash, outpoint, repeated_hash, repeated_stream_hash, stream_hash,
    stream_pieces,
};
use larder_core::{BlobInfo, StreamStatus};
use larder_metadata::MetadataError;
use larder_metadata::repos::*;

#[tokio::test]
async fn test_stream_roundtrip_with_terminator() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();

    let piece_hash = repeated_hash("aa");
    let stream = repeated_stream_hash("bb");
    store.register_blob(&piece_hash).await.unwrap();
    store
        .create_stream(&stream, "movie.mp4", "deadbeef", "movie.mp4")
        .await
        .unwrap();
    store
        .append_pieces(
            &stream,
            &[
                BlobInfo::new(piece_hash.clone(), 0, "iv0", 100),
                BlobInfo::terminator(1, "iv1"),
            ],
        )
        .await
        .unwrap();

    let pieces = store.reconstruct(&stream).await.unwrap();
    assert_eq!(
        pieces,
        vec![
            BlobInfo::new(piece_hash, 0, "iv0", 100),
            BlobInfo::terminator(1, "iv1"),
        ]
    );
}

#[tokio::test]
async fn test_reconstruct_returns_pieces_then_terminator() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("ordered");
    let pieces = stream_pieces("ordered", 5);

    store
        .create_stream(&stream, "a.bin", "key", "a.bin")
        .await
        .unwrap();
    // Arrival order must not matter.
    let mut shuffled = pieces.clone();
    shuffled.reverse();
    store.append_pieces(&stream, &shuffled).await.unwrap();

    let rebuilt = store.reconstruct(&stream).await.unwrap();
    assert_eq!(rebuilt.len(), 6);
    assert_eq!(rebuilt, pieces);
    let last = rebuilt.last().unwrap();
    assert!(last.hash.is_none());
    assert_eq!(last.length, 0);
    assert_eq!(store.piece_count(&stream).await.unwrap(), 5);
}

#[tokio::test]
async fn test_reconstruct_truncates_at_gap() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("gappy");

    store
        .create_stream(&stream, "gap.bin", "key", "gap.bin")
        .await
        .unwrap();
    store
        .append_pieces(
            &stream,
            &[
                BlobInfo::new(blob_hash("p0"), 0, "iv0", 10),
                BlobInfo::new(blob_hash("p2"), 2, "iv2", 10),
                BlobInfo::terminator(3, "iv3"),
            ],
        )
        .await
        .unwrap();

    let rebuilt = store.reconstruct(&stream).await.unwrap();
    assert_eq!(
        rebuilt,
        vec![
            BlobInfo::new(blob_hash("p0"), 0, "iv0", 10),
            BlobInfo::terminator(3, "iv3"),
        ]
    );
    // The piece past the gap is still stored.
    assert_eq!(store.piece_count(&stream).await.unwrap(), 2);
}

#[tokio::test]
async fn test_reconstruct_without_terminator() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("open-ended");

    store
        .create_stream(&stream, "x", "key", "x")
        .await
        .unwrap();
    store
        .append_pieces(&stream, &[BlobInfo::new(blob_hash("only"), 0, "iv0", 1)])
        .await
        .unwrap();

    let rebuilt = store.reconstruct(&stream).await.unwrap();
    assert_eq!(rebuilt.len(), 1);
    assert!(rebuilt[0].hash.is_some());
}

#[tokio::test]
async fn test_first_terminator_wins() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("terminated");

    store
        .create_stream(&stream, "t", "key", "t")
        .await
        .unwrap();
    store
        .append_pieces(&stream, &[BlobInfo::terminator(0, "first")])
        .await
        .unwrap();
    store
        .append_pieces(&stream, &[BlobInfo::terminator(0, "second")])
        .await
        .unwrap();

    let rebuilt = store.reconstruct(&stream).await.unwrap();
    assert_eq!(rebuilt, vec![BlobInfo::terminator(0, "first")]);
    assert_eq!(metadata.count("stream_terminators").await, 1);
}

#[tokio::test]
async fn test_duplicate_stream_rejected() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("dup");

    let id = store
        .create_stream(&stream, "first.mp4", "key1", "first.mp4")
        .await
        .unwrap();
    let err = store
        .create_stream(&stream, "second.mp4", "key2", "second.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::AlreadyExists(_)), "got {err:?}");

    let info = store.stream_info(&stream).await.unwrap();
    assert_eq!(info.file_name.as_deref(), Some("first.mp4"));
    assert_eq!(info.decryption_key.as_deref(), Some("key1"));
    assert_eq!(store.stream_id(&stream).await.unwrap(), Some(id));
    assert_eq!(metadata.count("files").await, 1);
}

#[tokio::test]
async fn test_new_stream_is_pending() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();

    let id = store
        .create_stream(&stream_hash("new"), "n", "key", "suggested")
        .await
        .unwrap();

    assert_eq!(
        store.file_status(id).await.unwrap(),
        Some(StreamStatus::Pending)
    );
    let info = store.stream_info(&stream_hash("new")).await.unwrap();
    assert_eq!(info.suggested_file_name.as_deref(), Some("suggested"));
}

#[tokio::test]
async fn test_unknown_stream_lookups() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("nobody");

    let err = store.stream_info(&stream).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)), "got {err:?}");

    let err = store.reconstruct(&stream).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)), "got {err:?}");

    let err = store
        .append_pieces(&stream, &stream_pieces("nobody", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)), "got {err:?}");

    assert!(!store.stream_exists(&stream).await.unwrap());
    assert!(store.stream_id(&stream).await.unwrap().is_none());
    assert_eq!(store.piece_count(&stream).await.unwrap(), 0);
}

#[tokio::test]
async fn test_hashless_piece_with_length_rejected() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("bad-piece");

    store
        .create_stream(&stream, "b", "key", "b")
        .await
        .unwrap();
    let bad = BlobInfo {
        hash: None,
        position: 1,
        iv: "iv1".to_string(),
        length: 42,
    };
    let err = store
        .append_pieces(
            &stream,
            &[BlobInfo::new(blob_hash("good"), 0, "iv0", 5), bad],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MetadataError::InvalidInput(_)), "got {err:?}");
    // Nothing from the batch was written.
    assert_eq!(store.blob_count().await.unwrap(), 0);
    assert_eq!(store.piece_count(&stream).await.unwrap(), 0);
}

#[tokio::test]
async fn test_blob_membership_queries() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("membership");
    let pieces = stream_pieces("membership", 3);

    store
        .create_stream(&stream, "m", "key", "m")
        .await
        .unwrap();
    store.append_pieces(&stream, &pieces).await.unwrap();

    let second = pieces[1].hash.clone().unwrap();
    assert_eq!(store.stream_of_blob(&second).await.unwrap(), Some(stream.clone()));
    assert_eq!(store.blob_position(&stream, &second).await.unwrap(), Some(1));

    let stranger = blob_hash("stranger");
    store.register_blob(&stranger).await.unwrap();
    assert!(store.stream_of_blob(&stranger).await.unwrap().is_none());
    assert!(store.blob_position(&stream, &stranger).await.unwrap().is_none());

    let row = store.get_blob(&second).await.unwrap().unwrap();
    assert_eq!(row.stream_position, Some(1));
    assert_eq!(row.iv.as_deref(), Some("iv1"));
    assert_eq!(row.blob_length, Some(2 * 1024 * 1024));
}

#[tokio::test]
async fn test_list_and_delete_streams() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let keep = stream_hash("keep");
    let dropped = stream_hash("drop");

    store.create_stream(&keep, "k", "key", "k").await.unwrap();
    store.create_stream(&dropped, "d", "key", "d").await.unwrap();
    let pieces = stream_pieces("drop", 2);
    store.append_pieces(&dropped, &pieces).await.unwrap();

    assert_eq!(store.list_streams().await.unwrap(), vec![keep.clone(), dropped.clone()]);

    store.delete_stream(&dropped).await.unwrap();

    assert_eq!(store.list_streams().await.unwrap(), vec![keep]);
    assert_eq!(metadata.count("stream_terminators").await, 0);
    // Pieces survive as unowned blobs.
    let first = pieces[0].hash.clone().unwrap();
    let row = store.get_blob(&first).await.unwrap().unwrap();
    assert!(row.file_id.is_none());
    assert!(store.stream_of_blob(&first).await.unwrap().is_none());

    let err = store.delete_stream(&dropped).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_descriptor_link() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("described");
    let sd_hash = blob_hash("described-sd");

    store
        .create_stream(&stream, "d", "key", "d")
        .await
        .unwrap();
    assert!(store.descriptor_for_stream(&stream).await.unwrap().is_none());

    store.set_descriptor(&stream, &sd_hash).await.unwrap();

    assert_eq!(
        store.descriptor_for_stream(&stream).await.unwrap(),
        Some(sd_hash.clone())
    );
    assert_eq!(
        store.stream_for_descriptor(&sd_hash).await.unwrap(),
        Some(stream.clone())
    );
    assert_eq!(store.stream_of_blob(&sd_hash).await.unwrap(), Some(stream));
    assert!(
        store
            .stream_for_descriptor(&blob_hash("other"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_link_claim() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();
    let stream = stream_hash("claimed");
    let point = outpoint("t1", 0);

    let id = store
        .create_stream(&stream, "c", "key", "c")
        .await
        .unwrap();

    let err = store
        .link_claim(&stream, &point.claim_id())
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::UnknownClaim(_)), "got {err:?}");

    let claim_id = store.observe_claim("cat", &point, true).await.unwrap();
    store.link_claim(&stream, &claim_id).await.unwrap();

    assert_eq!(store.stream_claim_id(id).await.unwrap(), Some(claim_id));
    assert_eq!(
        store.stream_claim_name(id).await.unwrap().as_deref(),
        Some("cat")
    );
}
