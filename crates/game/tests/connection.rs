//! Integration coverage that ties the transport and wire modules together: a
//! real QUIC connection carrying framed, bit-packed snapshot bytes end to end.
//! Unit tests within `transport.rs` and `wire/framer.rs` each cover their own
//! module in isolation; this file proves the seam between them.

use physx_core::wire::{encode_header, vec3_48_decode, vec3_48_encode, CompressionProfile, Framer};
use physx_core::{Client, Listener};

async fn loopback_pair() -> (Listener, u16) {
    let listener = Listener::bind("127.0.0.1:0", None, None).expect("bind self-signed listener");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

#[tokio::test]
async fn framed_payload_survives_a_real_quic_round_trip() {
    let (listener, port) = loopback_pair().await;

    let server = tokio::spawn(async move {
        let conn = listener.accept().await.expect("server accept");
        let mut framer = Framer::new(1 << 20, 1 << 20);
        let mut buf = [0u8; 256];
        loop {
            let n = conn.recv(&mut buf).await.expect("server recv");
            assert_ne!(n, 0, "stream closed before a full payload arrived");
            let mut delivered = None;
            framer
                .feed(&buf[..n], |payload| delivered = Some(payload.to_vec()))
                .expect("frame reassembly");
            if let Some(payload) = delivered {
                return payload;
            }
        }
    });

    let client = Client::connect("localhost", port, false)
        .await
        .expect("client connect");

    let pos = glam::Vec3::new(12.5, -3.0, 400.25);
    let bits = vec3_48_encode(pos);
    let mut payload = Vec::new();
    for b in bits {
        payload.extend_from_slice(&b.to_le_bytes());
    }
    let header = encode_header(payload.len(), CompressionProfile::None);
    let mut framed = header.to_vec();
    framed.extend_from_slice(&payload);

    client.send(framed.into()).await.expect("client send");

    let received = tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .expect("server task timed out")
        .expect("server task panicked");

    let bits: [u16; 3] = [
        u16::from_le_bytes([received[0], received[1]]),
        u16::from_le_bytes([received[2], received[3]]),
        u16::from_le_bytes([received[4], received[5]]),
    ];
    let decoded = vec3_48_decode(bits);
    assert!((decoded - pos).length() <= 1.0 / 64.0 + 1e-4);
}

#[tokio::test]
async fn client_disconnect_is_observed_by_the_server_side_handle() {
    let (listener, port) = loopback_pair().await;

    let server = tokio::spawn(async move { listener.accept().await.expect("server accept") });

    let client = Client::connect("localhost", port, false)
        .await
        .expect("client connect");
    let server_conn = server.await.expect("server task panicked");

    client.disconnect();

    let mut buf = [0u8; 16];
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), server_conn.recv(&mut buf))
        .await
        .expect("server recv timed out");
    match result {
        Ok(0) => {}
        Ok(n) => panic!("expected stream end, got {n} bytes"),
        Err(_) => {}
    }
}
