//! End-to-end tests of the handshake driver and encrypted channel

use std::time::Duration;

use bytes::Bytes;
use crypto_session::{HandshakeError, HandshakeState, KdfParams};
use net_transport::{
    FramedConnection, HandshakeOptions, SecureChannel, TransportError, framed_stream,
};
use secrecy::SecretString;

fn options() -> HandshakeOptions {
    HandshakeOptions {
        kdf: KdfParams::insecure_fast(),
        timeout: Some(Duration::from_secs(10)),
    }
}

async fn establish(
    client_pw: &str,
    server_pw: &str,
    client_conn: FramedConnection,
    server_conn: FramedConnection,
) -> (
    Result<SecureChannel, TransportError>,
    Result<SecureChannel, TransportError>,
) {
    let server_pw = SecretString::from(server_pw);
    let server = tokio::spawn(async move {
        SecureChannel::accept(server_conn, &server_pw, &options()).await
    });
    let client = SecureChannel::connect(client_conn, &SecretString::from(client_pw), &options()).await;
    (client, server.await.unwrap())
}

#[tokio::test]
async fn test_channel_roundtrip_over_pair() {
    let (a, b) = FramedConnection::pair();
    let (client, server) = establish("correct-horse", "correct-horse", a, b).await;

    let (client_tx, mut client_rx) = client.unwrap().split();
    let (server_tx, mut server_rx) = server.unwrap().split();

    client_tx.send(b"request").await.unwrap();
    assert_eq!(server_rx.recv().await.unwrap().unwrap(), b"request");

    server_tx.send(b"").await.unwrap();
    server_tx.send(b"response").await.unwrap();
    assert_eq!(client_rx.recv().await.unwrap().unwrap(), b"");
    assert_eq!(client_rx.recv().await.unwrap().unwrap(), b"response");
}

#[tokio::test]
async fn test_channel_over_content_length_socket() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (client, server) = establish("pw", "pw", framed_stream(a), framed_stream(b)).await;

    let (client_tx, _client_rx) = client.unwrap().split();
    let (_server_tx, mut server_rx) = server.unwrap().split();

    for i in 0..10u8 {
        client_tx.send(&[i; 100]).await.unwrap();
    }
    for i in 0..10u8 {
        assert_eq!(server_rx.recv().await.unwrap().unwrap(), vec![i; 100]);
    }
}

#[tokio::test]
async fn test_wrong_password_reported_as_authentication_failure() {
    let (a, b) = FramedConnection::pair();
    let (client, server) = establish("wrong", "correct-horse", a, b).await;

    let server_err = server.err().unwrap();
    assert!(matches!(
        server_err,
        TransportError::Handshake(HandshakeError::AuthenticationFailed)
    ));

    // The responder closes without replying.
    let client_err = client.err().unwrap();
    assert!(client_err.is_authentication_failure());
    assert!(matches!(
        client_err,
        TransportError::Handshake(HandshakeError::TransportClosed {
            state: HandshakeState::AwaitingServerHello
        })
    ));
}

#[tokio::test]
async fn test_concurrent_senders_keep_wire_order() {
    let (a, b) = FramedConnection::pair();
    let (client, server) = establish("pw", "pw", a, b).await;

    let (client_tx, _client_rx) = client.unwrap().split();
    let (_server_tx, mut server_rx) = server.unwrap().split();

    let mut tasks = Vec::new();
    for task in 0..4u8 {
        let tx = client_tx.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..5u8 {
                tx.send(&[task, i]).await.unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    // Every frame decrypts, so nonce order matched arrival order.
    let mut seen = Vec::new();
    for _ in 0..20 {
        seen.push(server_rx.recv().await.unwrap().unwrap());
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 20);
}

#[tokio::test]
async fn test_injected_frame_closes_both_directions() {
    let (a, mut attacker) = FramedConnection::pair();
    let (b, mut relay) = FramedConnection::pair();

    // Relay the handshake between the two ends, then inject garbage.
    let relay_task = tokio::spawn(async move {
        let client_hello = attacker.incoming.recv().await.unwrap();
        relay.outgoing.send(client_hello).await.unwrap();
        let server_hello = relay.incoming.recv().await.unwrap();
        attacker.outgoing.send(server_hello).await.unwrap();
        let client_ready = attacker.incoming.recv().await.unwrap();
        relay.outgoing.send(client_ready).await.unwrap();
        (attacker, relay)
    });

    // a: initiator talking through the attacker, b: responder behind the relay
    let client_pw = SecretString::from("pw");
    let client = tokio::spawn(async move {
        SecureChannel::connect(a, &client_pw, &options()).await
    });
    let server = SecureChannel::accept(b, &SecretString::from("pw"), &options())
        .await
        .unwrap();
    let (attacker, mut relay) = relay_task.await.unwrap();
    let client = client.await.unwrap().unwrap();

    let (_client_tx, _client_rx) = client.split();
    let (server_tx, mut server_rx) = server.split();

    relay
        .outgoing
        .send(Bytes::from_static(&[0u8; 40]))
        .await
        .unwrap();

    assert!(matches!(server_rx.recv().await, Err(TransportError::Decryption)));
    assert!(matches!(server_rx.recv().await, Err(TransportError::Decryption)));
    assert!(server_tx.is_closed().await);
    assert!(server_tx.send(b"late").await.is_err());
    drop(attacker);
}

#[tokio::test]
async fn test_injected_frame_tears_down_while_sender_is_blocked() {
    let (a, mut attacker) = FramedConnection::pair();
    let (b, mut relay) = FramedConnection::pair();

    let relay_task = tokio::spawn(async move {
        let client_hello = attacker.incoming.recv().await.unwrap();
        relay.outgoing.send(client_hello).await.unwrap();
        let server_hello = relay.incoming.recv().await.unwrap();
        attacker.outgoing.send(server_hello).await.unwrap();
        let client_ready = attacker.incoming.recv().await.unwrap();
        relay.outgoing.send(client_ready).await.unwrap();
        (attacker, relay)
    });

    let client_pw = SecretString::from("pw");
    let client = tokio::spawn(async move {
        SecureChannel::connect(a, &client_pw, &options()).await
    });
    let server = SecureChannel::accept(b, &SecretString::from("pw"), &options())
        .await
        .unwrap();
    let (_attacker, relay) = relay_task.await.unwrap();
    let _client = client.await.unwrap().unwrap();

    let (server_tx, mut server_rx) = server.split();

    // Nobody drains the server's outgoing frames: fill the channel, then
    // leave one more send parked on it while holding the send lock.
    for i in 0..net_transport::CHANNEL_CAPACITY {
        server_tx.send(&[i as u8]).await.unwrap();
    }
    let blocked_tx = server_tx.clone();
    let blocked = tokio::spawn(async move { blocked_tx.send(b"stuck").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished());

    relay
        .outgoing
        .send(Bytes::from_static(&[0u8; 40]))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), server_rx.recv())
        .await
        .expect("decrypt failure must not wait on the blocked sender");
    assert!(matches!(received, Err(TransportError::Decryption)));

    let blocked = tokio::time::timeout(Duration::from_secs(2), blocked)
        .await
        .expect("blocked send must be released")
        .unwrap();
    assert!(blocked.is_err());
    assert!(server_tx.is_closed().await);
    drop(relay);
}

#[tokio::test]
async fn test_handshake_timeout() {
    let (a, _silent_peer) = FramedConnection::pair();
    let options = HandshakeOptions {
        kdf: KdfParams::insecure_fast(),
        timeout: Some(Duration::from_millis(200)),
    };

    let result = SecureChannel::connect(a, &SecretString::from("pw"), &options).await;
    assert!(matches!(
        result,
        Err(TransportError::Handshake(HandshakeError::TimedOut {
            state: HandshakeState::AwaitingServerHello
        }))
    ));
}

#[tokio::test]
async fn test_peer_close_mid_handshake() {
    let (a, mut b) = FramedConnection::pair();
    let server = tokio::spawn(async move {
        // Read the ClientHello and hang up.
        let _ = b.incoming.recv().await;
        drop(b);
    });

    let result = SecureChannel::connect(a, &SecretString::from("pw"), &options()).await;
    server.await.unwrap();
    assert!(result.err().unwrap().is_authentication_failure());
}

#[tokio::test]
async fn test_clean_close_yields_none() {
    let (a, b) = FramedConnection::pair();
    let (client, server) = establish("pw", "pw", a, b).await;

    let (client_tx, client_rx) = client.unwrap().split();
    let (_server_tx, mut server_rx) = server.unwrap().split();

    client_tx.send(b"bye").await.unwrap();
    client_tx.close().await;
    drop(client_rx);

    assert_eq!(server_rx.recv().await.unwrap().unwrap(), b"bye");
    assert!(server_rx.recv().await.unwrap().is_none());
}
