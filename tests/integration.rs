use std::collections::HashMap;
use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::{RedisError, Value};
use tokio::net::TcpListener;

use redigate::backend::memory::MemoryBackend;
use redigate::config::SetConfig;
use redigate::gateway::Gateway;
use redigate::server::serve_tcp;
use redigate::store::Store;

/// Serves `set` on an ephemeral port and returns a client connected to it.
async fn connect(set: SetConfig) -> Result<MultiplexedConnection, RedisError> {
    let backend = MemoryBackend::new();
    let store = Store::new(Arc::new(backend), set.settings("test"));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(serve_tcp(
        listener,
        Gateway::new(store),
        set.max_request_size(),
    ));

    let client = redis::Client::open(format!("redis://{addr}/"))?;
    client.get_multiplexed_async_connection().await
}

async fn standard() -> MultiplexedConnection {
    connect(SetConfig::new("127.0.0.1:0", "redis")).await.unwrap()
}

async fn expanded() -> MultiplexedConnection {
    let mut set = SetConfig::new("127.0.0.1:0", "maps");
    set.expanded_map = true;
    set.cache_size = Some(100);
    connect(set).await.unwrap()
}

#[tokio::test]
async fn test_strings() {
    let mut con = standard().await;

    let res: Vec<Value> = redis::pipe()
        .cmd("SET").arg("key_1").arg(1)
        .cmd("SET").arg("key_2").arg("Argentina")
        .cmd("SET").arg("key_2").arg("Thailand")
        .cmd("GET").arg("key_1")
        .cmd("GET").arg("key_2")
        .cmd("GET").arg("nonexistent")
        .cmd("SETNX").arg("key_3").arg("a")
        .cmd("SETNX").arg("key_3").arg("b")
        .cmd("GET").arg("key_3")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(
        res,
        vec![
            Value::Okay,
            Value::Okay,
            Value::Okay,
            Value::Data(b"1".to_vec()),
            Value::Data(b"Thailand".to_vec()),
            Value::Nil,
            Value::Int(1),
            Value::Int(0),
            Value::Data(b"a".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_binary_values() {
    let mut con = standard().await;
    let payload = vec![0_u8, 159, 146, 150, b'\r', b'\n'];

    let _: () = redis::cmd("SET")
        .arg("binary")
        .arg(&payload[..])
        .query_async(&mut con)
        .await
        .unwrap();
    let res: Vec<u8> = redis::cmd("GET")
        .arg("binary")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(res, payload);
}

#[tokio::test]
async fn test_mset_mget_del() {
    let mut con = standard().await;

    let res: (Value, Vec<Option<String>>, i64, i64, Option<String>) = redis::pipe()
        .cmd("MSET").arg("a").arg("1").arg("b").arg("2")
        .cmd("MGET").arg("a").arg("b").arg("c")
        .cmd("DEL").arg("a")
        .cmd("DEL").arg("a")
        .cmd("GET").arg("a")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(
        res,
        (
            Value::Okay,
            vec![Some("1".to_string()), Some("2".to_string()), None],
            1,
            0,
            None
        )
    );
}

#[tokio::test]
async fn test_counters() {
    let mut con = standard().await;

    let res: Vec<i64> = redis::pipe()
        .cmd("INCR").arg("counter")
        .cmd("INCRBY").arg("counter").arg(10)
        .cmd("DECR").arg("counter")
        .cmd("DECRBY").arg("counter").arg(3)
        .cmd("INCRBYEX").arg("volatile").arg(60).arg(5)
        .cmd("TTL").arg("volatile")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(res, vec![1, 11, 10, 7, 5, 60]);
}

#[tokio::test]
async fn test_hashes() {
    let mut con = standard().await;

    let res: (i64, i64, String, Value, Vec<Option<String>>, i64, i64) = redis::pipe()
        .cmd("HSET").arg("hash").arg("f1").arg("a")
        .cmd("HSET").arg("hash").arg("f1").arg("b")
        .cmd("HGET").arg("hash").arg("f1")
        .cmd("HMSET").arg("hash").arg("f2").arg("c").arg("f3").arg("d")
        .cmd("HMGET").arg("hash").arg("f1").arg("f3").arg("f4")
        .cmd("HDEL").arg("hash").arg("f3")
        .cmd("HINCRBY").arg("hash").arg("n").arg(4)
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(
        res,
        (
            1,
            0,
            "b".to_string(),
            Value::Okay,
            vec![Some("b".to_string()), Some("d".to_string()), None],
            1,
            4
        )
    );

    let all: HashMap<String, String> = redis::cmd("HGETALL")
        .arg("hash")
        .query_async(&mut con)
        .await
        .unwrap();
    assert_eq!(
        all,
        HashMap::from([
            ("f1".to_string(), "b".to_string()),
            ("f2".to_string(), "c".to_string()),
            ("n".to_string(), "4".to_string()),
        ])
    );
}

#[tokio::test]
async fn test_lists() {
    let mut con = standard().await;

    let res: (i64, i64, i64, Vec<String>, Vec<String>, Option<String>, Option<String>, i64) =
        redis::pipe()
            .cmd("RPUSH").arg("list").arg("A")
            .cmd("RPUSH").arg("list").arg("B")
            .cmd("RPUSH").arg("list").arg("C")
            .cmd("LRANGE").arg("list").arg(-2).arg(-1)
            .cmd("LRANGE").arg("list").arg(5).arg(10)
            .cmd("LPOP").arg("list")
            .cmd("RPOP").arg("list")
            .cmd("LLEN").arg("list")
            .query_async(&mut con)
            .await
            .unwrap();

    assert_eq!(
        res,
        (
            1,
            2,
            3,
            vec!["B".to_string(), "C".to_string()],
            vec![],
            Some("A".to_string()),
            Some("C".to_string()),
            1
        )
    );

    let res: (i64, i64, Value, Vec<String>) = redis::pipe()
        .cmd("LPUSH").arg("list").arg("Z")
        .cmd("RPUSHEX").arg("list").arg("Y").arg(100)
        .cmd("LTRIM").arg("list").arg(0).arg(1)
        .cmd("LRANGE").arg("list").arg(0).arg(-1)
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(
        res,
        (
            2,
            3,
            Value::Okay,
            vec!["Z".to_string(), "B".to_string()]
        )
    );
}

#[tokio::test]
async fn test_expire_and_ttl() {
    let mut con = standard().await;

    let res: Vec<i64> = redis::pipe()
        .cmd("TTL").arg("key")
        .cmd("EXPIRE").arg("key").arg(10)
        .cmd("SETEX").arg("key").arg(100).arg("v").ignore()
        .cmd("TTL").arg("key")
        .cmd("EXPIRE").arg("key").arg(-1)
        .cmd("TTL").arg("key")
        .cmd("EXPIRE").arg("key").arg(20)
        .cmd("TTL").arg("key")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(res, vec![-2, 0, 100, 1, 100, 1, 20]);
}

#[tokio::test]
async fn test_transaction() {
    let mut con = standard().await;

    let res: (String, i64, i64) = redis::pipe()
        .atomic()
        .cmd("SET").arg("key").arg(5).ignore()
        .cmd("GET").arg("key")
        .cmd("INCRBY").arg("key").arg(2)
        .cmd("HSET").arg("hash").arg("f").arg("v")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(res, ("5".to_string(), 7, 1));
}

#[tokio::test]
async fn test_errors() {
    let mut con = standard().await;

    let err = redis::cmd("PING")
        .query_async::<_, Value>(&mut con)
        .await
        .unwrap_err();
    assert_eq!(err.detail(), Some("unknown command 'PING'"));

    let err = redis::cmd("INCRBY")
        .arg("key")
        .arg("ten")
        .query_async::<_, Value>(&mut con)
        .await
        .unwrap_err();
    assert_eq!(err.detail(), Some("value is not an integer or out of range"));

    // The connection is still usable.
    let res: Option<String> = redis::cmd("GET")
        .arg("key")
        .query_async(&mut con)
        .await
        .unwrap();
    assert_eq!(res, None);
}

#[tokio::test]
async fn test_concurrent_hset() {
    let backend = MemoryBackend::new();
    let store = Store::new(
        Arc::new(backend),
        SetConfig::new("127.0.0.1:0", "redis").settings("test"),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_tcp(listener, Gateway::new(store), 1024));

    let client = redis::Client::open(format!("redis://{addr}/")).unwrap();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let mut con = client.get_multiplexed_async_connection().await.unwrap();
            redis::cmd("HSET")
                .arg("hash")
                .arg("field")
                .arg(i)
                .query_async::<_, i64>(&mut con)
                .await
                .unwrap()
        }));
    }

    let mut created = 0;
    for task in tasks {
        created += task.await.unwrap();
    }
    assert_eq!(created, 1);

    let mut con = client.get_multiplexed_async_connection().await.unwrap();
    let value: i64 = redis::cmd("HGET")
        .arg("hash")
        .arg("field")
        .query_async(&mut con)
        .await
        .unwrap();
    assert!((0..8).contains(&value));
}

#[tokio::test]
async fn test_expanded_map() {
    let mut con = expanded().await;

    let res: (i64, i64, String, i64, Option<String>, i64, String) = redis::pipe()
        .cmd("HSET").arg("map").arg("f").arg("a")
        .cmd("HSET").arg("map").arg("g").arg("b")
        .cmd("HGET").arg("map").arg("f")
        .cmd("DEL").arg("map")
        .cmd("HGET").arg("map").arg("f")
        .cmd("HSET").arg("map").arg("f").arg("c")
        .cmd("HGET").arg("map").arg("f")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(
        res,
        (1, 1, "a".to_string(), 1, None, 1, "c".to_string())
    );

    let res: Vec<i64> = redis::pipe()
        .cmd("HINCRBYEX").arg("counts").arg("hits").arg(3).arg(50)
        .cmd("HINCRBY").arg("counts").arg("hits").arg(2)
        .cmd("TTL").arg("counts")
        .query_async(&mut con)
        .await
        .unwrap();

    assert_eq!(res, vec![3, 5, 50]);
}
