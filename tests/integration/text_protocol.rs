//! Text-protocol end-to-end tests against a single in-memory tier: covers
//! scenario (a) from the chunking behavior (single-chunk round trip with
//! exact backend item shape), a multi-chunk item, delete completeness, and
//! miss-on-partial-write.

use chunkcache_core::wire::MetaRecord;
use chunkcache_engine::backend::BackendHandler;
use chunkcache_engine::keys::{chunk_key, meta_key};

use crate::support::{spawn_single_tier, unique_key, TextClient};

#[tokio::test]
async fn single_chunk_round_trip_has_exact_backend_shape() {
    let daemon = spawn_single_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("small");

    assert_eq!(client.set(&key, 7, 0, b"hello world").await.unwrap(), "STORED");

    let got = client.get(&key).await.unwrap().expect("should be a hit");
    assert_eq!(got.0, 7);
    assert_eq!(got.1, b"hello world");

    // Metadata record matches §3's on-disk layout exactly.
    let meta_raw = daemon.l1.get(&meta_key(key.as_bytes())).await.unwrap();
    let payload = match meta_raw {
        chunkcache_engine::backend::GetResult::Hit { payload, .. } => payload,
        chunkcache_engine::backend::GetResult::Miss => panic!("metadata missing"),
    };
    let meta = MetaRecord::parse(&payload).expect("metadata should parse");
    assert_eq!({ meta.length }, 11);
    assert_eq!({ meta.orig_flags }, 7);
    assert_eq!({ meta.num_chunks }, 1);

    // Chunk payload is token-prefixed and padded to the configured chunk size.
    let chunk_raw = daemon.l1.get(&chunk_key(key.as_bytes(), 0)).await.unwrap();
    let chunk_payload = match chunk_raw {
        chunkcache_engine::backend::GetResult::Hit { payload, .. } => payload,
        chunkcache_engine::backend::GetResult::Miss => panic!("chunk 0 missing"),
    };
    assert_eq!(chunk_payload.len(), 16 + 1024);
    assert_eq!(&chunk_payload[16..27], b"hello world");
}

#[tokio::test]
async fn multi_chunk_value_round_trips() {
    let daemon = spawn_single_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("big");

    let value = vec![0x5au8; 2500];
    assert_eq!(client.set(&key, 0, 0, &value).await.unwrap(), "STORED");

    let meta_raw = daemon.l1.get(&meta_key(key.as_bytes())).await.unwrap();
    let payload = match meta_raw {
        chunkcache_engine::backend::GetResult::Hit { payload, .. } => payload,
        chunkcache_engine::backend::GetResult::Miss => panic!("metadata missing"),
    };
    let meta = MetaRecord::parse(&payload).unwrap();
    assert_eq!({ meta.num_chunks }, 3);

    let got = client.get(&key).await.unwrap().expect("should be a hit");
    assert_eq!(got.1, value);
}

#[tokio::test]
async fn delete_removes_metadata_and_all_chunks() {
    let daemon = spawn_single_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("del");

    let value = vec![0x11u8; 2500];
    client.set(&key, 0, 0, &value).await.unwrap();
    assert_eq!(client.delete(&key).await.unwrap(), "DELETED");

    assert!(client.get(&key).await.unwrap().is_none());
    assert!(matches!(
        daemon.l1.get(&meta_key(key.as_bytes())).await.unwrap(),
        chunkcache_engine::backend::GetResult::Miss
    ));
    for i in 0..3 {
        assert!(matches!(
            daemon.l1.get(&chunk_key(key.as_bytes(), i)).await.unwrap(),
            chunkcache_engine::backend::GetResult::Miss
        ));
    }

    // Deleting an already-absent key reports NOT_FOUND, not an error.
    assert_eq!(client.delete(&key).await.unwrap(), "NOT_FOUND");
}

#[tokio::test]
async fn get_on_unknown_key_is_a_clean_miss() {
    let daemon = spawn_single_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    assert!(client.get(&unique_key("never_set")).await.unwrap().is_none());
}

#[tokio::test]
async fn partial_write_without_metadata_is_a_miss_not_an_error() {
    let daemon = spawn_single_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("partial");

    // Simulate a write that stored chunks but never reached the metadata
    // record (e.g. the proxy crashed mid-SET): a reader must see a miss.
    daemon
        .l1
        .force_set_raw(&chunk_key(key.as_bytes(), 0), 0, bytes::Bytes::from_static(b"orphan chunk"), 0);

    assert!(client.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn touch_extends_expiration_and_reports_not_found_when_absent() {
    let daemon = spawn_single_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("touch");

    client.set(&key, 0, 0, b"val").await.unwrap();
    assert_eq!(client.touch(&key, 100).await.unwrap(), "TOUCHED");
    assert_eq!(client.touch(&unique_key("nope"), 100).await.unwrap(), "NOT_FOUND");
}

#[tokio::test]
async fn gat_returns_value_and_extends_expiration() {
    let daemon = spawn_single_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("gat");

    client.set(&key, 3, 0, b"gattable").await.unwrap();
    let got = client.gat(&key, 60).await.unwrap().expect("hit");
    assert_eq!(got.0, 3);
    assert_eq!(got.1, b"gattable");

    assert!(client.gat(&unique_key("gat_missing"), 60).await.unwrap().is_none());
}

#[tokio::test]
async fn overwrite_with_fewer_chunks_does_not_leave_stale_tail_chunk() {
    // Invariant 2: an overwrite fully replaces the logical value. Writing a
    // shorter value after a longer one must not resurrect the old tail
    // chunk on read.
    let daemon = spawn_single_tier(64).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("shrink");

    let long_value = vec![0xaa; 200];
    client.set(&key, 0, 0, &long_value).await.unwrap();

    let short_value = vec![0xbb; 10];
    client.set(&key, 0, 0, &short_value).await.unwrap();

    let got = client.get(&key).await.unwrap().expect("hit");
    assert_eq!(got.1, short_value);
}
