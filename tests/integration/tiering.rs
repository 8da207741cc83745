//! Two-tier orchestration behavior: write L2-then-L1, read L1-first with
//! fire-and-forget L1 population on an L2 hit, and delete/touch fan-out.

use std::time::Duration;

use chunkcache_engine::backend::BackendHandler;
use chunkcache_engine::keys::meta_key;

use crate::support::{spawn_two_tier, unique_key, TextClient};

#[tokio::test]
async fn set_populates_both_tiers() {
    let daemon = spawn_two_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("both");

    client.set(&key, 0, 0, b"value").await.unwrap();

    assert!(matches!(
        daemon.l1.get(&meta_key(key.as_bytes())).await.unwrap(),
        chunkcache_engine::backend::GetResult::Hit { .. }
    ));
    assert!(matches!(
        daemon.l2.get(&meta_key(key.as_bytes())).await.unwrap(),
        chunkcache_engine::backend::GetResult::Hit { .. }
    ));
}

#[tokio::test]
async fn l1_miss_l2_hit_populates_l1_in_background() {
    let daemon = spawn_two_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("backfill");

    // Seed L2 only, as if another proxy instance wrote it and this one's
    // L1 has never seen it.
    daemon.l2.force_set_raw(&meta_key(key.as_bytes()), 0, {
        let meta = chunkcache_core::wire::MetaRecord::new(5, 0, 1, 1024, [1u8; 16]);
        bytes::Bytes::copy_from_slice(&meta.to_bytes())
    }, 0);
    let mut chunk = vec![1u8; 16];
    chunk.extend_from_slice(b"hello");
    chunk.resize(16 + 1024, 0);
    daemon.l2.force_set_raw(
        &chunkcache_engine::keys::chunk_key(key.as_bytes(), 0),
        0,
        bytes::Bytes::from(chunk),
        0,
    );

    let got = client.get(&key).await.unwrap().expect("should hit via L2");
    assert_eq!(got.1, b"hello");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        matches!(
            daemon.l1.get(&meta_key(key.as_bytes())).await.unwrap(),
            chunkcache_engine::backend::GetResult::Hit { .. }
        ),
        "L1 should have been populated in the background after the L2 hit"
    );
}

#[tokio::test]
async fn get_misses_when_both_tiers_miss() {
    let daemon = spawn_two_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    assert!(client.get(&unique_key("neither")).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_removes_from_both_tiers() {
    let daemon = spawn_two_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("del_both");

    client.set(&key, 0, 0, b"gone soon").await.unwrap();
    assert_eq!(client.delete(&key).await.unwrap(), "DELETED");

    assert!(matches!(
        daemon.l1.get(&meta_key(key.as_bytes())).await.unwrap(),
        chunkcache_engine::backend::GetResult::Miss
    ));
    assert!(matches!(
        daemon.l2.get(&meta_key(key.as_bytes())).await.unwrap(),
        chunkcache_engine::backend::GetResult::Miss
    ));
}

#[tokio::test]
async fn touch_extends_both_tiers() {
    let daemon = spawn_two_tier(1024).await.unwrap();
    let mut client = TextClient::connect(daemon.port).await.unwrap();
    let key = unique_key("touch_both");

    client.set(&key, 0, 0, b"val").await.unwrap();
    assert_eq!(client.touch(&key, 300).await.unwrap(), "TOUCHED");
}
