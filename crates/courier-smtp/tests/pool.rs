//! Connection pool behaviour over scripted transports.

#![allow(clippy::unwrap_used)]

mod common;

use common::{MockTransport, ready_script};
use courier_smtp::{Config, Envelope, Error, Pool, Rejection};

fn pool(transport: &MockTransport) -> Pool<MockTransport> {
    let transport = transport.clone();
    Pool::new(Config::new("mx.example.com"), move |_| Ok(transport.clone()))
}

#[tokio::test]
async fn first_acquire_opens_and_handshakes() {
    let transport = MockTransport::new([ready_script().build()]);
    let pool = pool(&transport);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id(), 1);
    assert_eq!(transport.connects(), 1);
    assert_eq!(pool.connection_count().await, 1);
    assert_eq!(pool.idle_count().await, 0);

    pool.release(conn).await;
    assert_eq!(pool.idle_count().await, 1);
}

#[tokio::test]
async fn idle_connection_is_probed_and_reused() {
    let transport = MockTransport::new([ready_script()
        .write(b"RSET\r\n")
        .read(b"250 2.0.0 OK\r\n")
        .build()]);
    let pool = pool(&transport);

    let first = pool.acquire().await.unwrap();
    let id = first.id();
    pool.release(first).await;

    let second = pool.acquire().await.unwrap();
    assert_eq!(second.id(), id);
    assert_eq!(transport.connects(), 1);
    assert_eq!(pool.connection_count().await, 1);
}

#[tokio::test]
async fn failed_probe_marks_broken_and_opens_new() {
    let transport = MockTransport::new([
        ready_script()
            .write(b"RSET\r\n")
            .read(b"421 4.4.2 Timeout\r\n")
            .build(),
        ready_script().build(),
    ]);
    let pool = pool(&transport);

    let first = pool.acquire().await.unwrap();
    pool.release(first).await;

    let second = pool.acquire().await.unwrap();
    assert_eq!(second.id(), 2);
    assert_eq!(transport.connects(), 2);
    assert_eq!(pool.connection_count().await, 2);
    assert_eq!(pool.idle_count().await, 0);

    pool.release(second).await;
    assert_eq!(pool.idle_count().await, 1);
}

#[tokio::test]
async fn busy_connections_are_skipped() {
    let transport = MockTransport::new([ready_script().build(), ready_script().build()]);
    let pool = pool(&transport);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(transport.connects(), 2);

    pool.release(a).await;
    pool.release(b).await;
}

#[tokio::test]
async fn shutdown_quits_idle_and_closes_broken() {
    let transport = MockTransport::new([
        ready_script()
            .write(b"RSET\r\n")
            .read(b"421 closing\r\n")
            .build(),
        ready_script()
            .write(b"RSET\r\n")
            .read(b"250 OK\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build(),
        ready_script()
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build(),
    ]);
    let pool = pool(&transport);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();
    pool.release(a).await;
    pool.release(b).await;
    pool.release(c).await;

    // Probing 1 fails and breaks it; 2 answers.
    let b = pool.acquire().await.unwrap();
    assert_eq!(b.id(), 2);
    pool.release(b).await;

    assert_eq!(pool.connection_count().await, 3);
    assert_eq!(pool.idle_count().await, 2);

    pool.shutdown().await;

    assert!(transport.is_closed());
    assert!(pool.is_stopped().await);
    assert_eq!(pool.connection_count().await, 0);
    assert_eq!(transport.connects(), 3);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_stops_acquire() {
    let transport = MockTransport::new([ready_script()
        .write(b"QUIT\r\n")
        .read(b"221 bye\r\n")
        .build()]);
    let pool = pool(&transport);

    let conn = pool.acquire().await.unwrap();
    pool.release(conn).await;

    pool.shutdown().await;
    pool.shutdown().await;

    assert!(matches!(pool.acquire().await, Err(Error::PoolStopped)));
    assert_eq!(transport.connects(), 1);
}

#[tokio::test]
async fn busy_connection_survives_shutdown_and_closes_on_release() {
    let transport = MockTransport::new([ready_script()
        .write(b"QUIT\r\n")
        .read(b"221 bye\r\n")
        .build()]);
    let pool = pool(&transport);

    let conn = pool.acquire().await.unwrap();
    pool.shutdown().await;
    assert_eq!(pool.connection_count().await, 1);
    assert!(!conn.is_closed());

    pool.release(conn).await;
    assert_eq!(pool.connection_count().await, 0);
}

#[tokio::test]
async fn connect_failure_is_connection_error() {
    let transport = MockTransport::new([]);
    let pool = pool(&transport);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(pool.connection_count().await, 0);
}

#[tokio::test]
async fn handshake_failure_keeps_broken_connection_tracked() {
    let transport = MockTransport::new([
        tokio_test::io::Builder::new()
            .read(b"554 no service\r\n")
            .build(),
        ready_script().build(),
    ]);
    let pool = pool(&transport);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::GreetingRejected(_)));
    assert_eq!(pool.connection_count().await, 1);
    assert_eq!(pool.idle_count().await, 0);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id(), 2);
    pool.release(conn).await;
}

#[tokio::test]
async fn send_delivers_and_parks_connection() {
    let transport = MockTransport::new([ready_script()
        .write(b"MAIL FROM:<bounce@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<to@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 go\r\n")
        .write(b"Subject: x\r\n\r\nhello\r\n.\r\n")
        .read(b"250 queued\r\n")
        .write(b"RSET\r\n")
        .read(b"250 OK\r\n")
        .build()]);
    let pool = pool(&transport);

    let envelope = Envelope::new("from@example.com")
        .return_path("bounce@example.com")
        .to("to@example.com");
    pool.send(&envelope, "Subject: x\r\n\r\nhello\r\n")
        .await
        .unwrap();
    assert_eq!(pool.idle_count().await, 1);

    let bad = Envelope::new("from@example.com").to("nobody");
    let err = pool.send(&bad, "x").await.unwrap_err();
    assert!(matches!(err, Error::RecipientRejected(Rejection::Invalid(_))));
    assert_eq!(pool.idle_count().await, 1);
    assert_eq!(transport.connects(), 1);
}
