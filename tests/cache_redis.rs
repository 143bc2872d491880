//! An unreachable or stalled cache store degrades to pass-through instead of failing calls

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use maximo_gateway::cache::{CacheManager, CacheTtls, RedisBackend, RedisSettings};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

fn settings(port: u16) -> RedisSettings {
    RedisSettings {
        host: "127.0.0.1".into(),
        port,
        db: 0,
        password: None,
        connect_timeout: Duration::from_millis(300),
        command_timeout: Duration::from_millis(300),
        retry_cooldown: Duration::from_secs(60),
    }
}

fn cache(settings: &RedisSettings) -> CacheManager {
    let backend = RedisBackend::new(settings).unwrap();
    CacheManager::new(Arc::new(backend), CacheTtls::default())
}

/// Number of RESP arrays (one per command) in a chunk
fn command_count(chunk: &[u8]) -> usize {
    (0..chunk.len())
        .filter(|&i| chunk[i] == b'*' && (i == 0 || chunk[i - 1] == b'\n'))
        .count()
}

/// Answers every setup command with `+OK`, then goes silent once a `GET` arrives
async fn stall_on_get(mut socket: TcpStream) {
    let mut buf = vec![0u8; 4096];
    let mut stalled = false;
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let chunk = &buf[..n];
        if stalled || chunk.windows(7).any(|w| w == b"\r\nGET\r\n") {
            stalled = true;
            continue;
        }
        for _ in 0..command_count(chunk) {
            if socket.write_all(b"+OK\r\n").await.is_err() {
                return;
            }
        }
    }
}

async fn stalled_server() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(stall_on_get(socket));
        }
    });
    (port, accepted)
}

#[tokio::test]
async fn reads_miss_and_writes_report_failure() {
    let cache = cache(&settings(1));

    assert!(cache.is_enabled());
    assert_eq!(cache.get("get_asset:A1").await, None);
    assert!(!cache.set("get_asset:A1", &json!({"assetnum": "A1"}), Some(Duration::from_secs(60))).await);
    assert!(!cache.delete("get_asset:A1").await);
    assert_eq!(cache.delete_matching("get_asset:*").await, 0);
    assert!(!cache.health().await);

    cache.close().await;
}

#[tokio::test]
async fn stalled_store_is_bounded_then_bypassed() {
    let (port, accepted) = stalled_server().await;
    let cache = cache(&settings(port));

    let started = Instant::now();
    let value = tokio::time::timeout(Duration::from_secs(5), cache.get("get_asset:A1"))
        .await
        .expect("cache read must not hang");
    assert_eq!(value, None);
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());

    // 冷却期内直接跳过，不再连接
    let started = Instant::now();
    assert_eq!(cache.get("get_asset:A1").await, None);
    assert!(!cache.set("get_asset:A1", &json!({"assetnum": "A1"}), None).await);
    assert!(!cache.health().await);
    assert!(started.elapsed() < Duration::from_millis(200), "took {:?}", started.elapsed());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}
