//! Client library against a real server instance.

use std::sync::Arc;
use std::time::Duration;

use tokenbucket_client::{ClientError, Reply, TokenBucketClient};
use tokenbucket_server::config::Config;
use tokenbucket_server::server::Server;

async fn start_server() -> std::net::SocketAddr {
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        rate: 1.0,
        capacity: 1,
        gc_interval: Duration::from_secs(3600),
        gc_threshold: Duration::from_secs(3600),
        max_buckets: 16,
        lock_duration: Duration::from_secs(300),
        log_level: "info".to_string(),
    };
    let server = Arc::new(Server::bind(config).await.unwrap());
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.start().await });
    addr
}

#[tokio::test]
async fn test_consume_and_stats() {
    let addr = start_server().await;
    let mut client = TokenBucketClient::connect(addr).await.unwrap();

    let reply = client.consume("jobs").await.unwrap();
    assert_eq!(reply, Reply::Ok("tokens=0,rate=1,capacity=1".to_string()));

    let reply = client.consume("jobs").await.unwrap();
    assert!(matches!(reply, Reply::Wait { seconds, .. } if seconds > 0.0));

    let stats = client.stats("jobs").await.unwrap();
    assert_eq!(stats, "tokens=0,rate=1,capacity=1");
}

#[tokio::test]
async fn test_acquire_retries_after_wait() {
    let addr = start_server().await;
    let mut client = TokenBucketClient::connect(addr).await.unwrap();

    // 50 tokens/sec: the second acquire's WAIT hint is ~20ms
    client.set_rate("burst", 50.0).await.unwrap();
    client.acquire("burst").await.unwrap();
    let stats = client.acquire("burst").await.unwrap();
    assert!(stats.starts_with("tokens="), "got {stats}");
}

async fn lock_until_granted(client: &mut TokenBucketClient, bucket: &str) -> Reply {
    loop {
        match client.lock(bucket).await.unwrap() {
            Reply::Wait { seconds, .. } => {
                tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            }
            other => return other,
        }
    }
}

#[tokio::test]
async fn test_lock_and_release() {
    let addr = start_server().await;
    let mut holder = TokenBucketClient::connect(addr).await.unwrap();
    let mut other = TokenBucketClient::connect(addr).await.unwrap();

    // Fast refill so the post-release lock gets a token promptly
    holder.set_rate("deploy", 1000.0).await.unwrap();
    assert!(matches!(holder.lock("deploy").await.unwrap(), Reply::Ok(_)));
    assert_eq!(
        other.lock("deploy").await.unwrap(),
        Reply::Error("Bucket deploy is already locked".to_string())
    );

    assert_eq!(
        holder.release("deploy").await.unwrap(),
        Reply::Ok("RELEASED deploy".to_string())
    );
    assert!(matches!(lock_until_granted(&mut other, "deploy").await, Reply::Ok(_)));
}

#[tokio::test]
async fn test_server_error_surfaces() {
    let addr = start_server().await;
    let mut client = TokenBucketClient::connect(addr).await.unwrap();

    let err = client.acquire("!!").await.unwrap_err();
    assert!(matches!(err, ClientError::Server(msg) if msg == "Invalid bucket name"));
}
