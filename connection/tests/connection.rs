//! Integration tests for the connection crate against a scripted peer on loopback.

use bitcoin::p2p::address::AddrV2;
use bitcoin::p2p::ServiceFlags;
use bitcoin::Network;
use peermap_connection::handshake::{self, HandshakeInfo, HandshakeState};
use peermap_connection::wire::{AddrEntry, Message};
use peermap_connection::{ConnectionConfiguration, PeerAddress, TcpConnection, Transport};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

const NONCE: u64 = 42;

/// Spawn a peer which completes the handshake, answers pings and serves one address list.
async fn scripted_peer(network: Network, addresses: Vec<AddrEntry>) -> PeerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, remote) = listener.accept().await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut transport = Transport::new(network.magic(), reader, writer);
        let config = ConnectionConfiguration::non_listening(network, 70016, None);
        let them = PeerAddress::from_socket_addr(remote);

        loop {
            match transport.read().await {
                Ok(Message::Version(_)) => {
                    let mut version =
                        handshake::version_message(&config, &them, handshake::generate_nonce());
                    version.services = ServiceFlags::NETWORK | ServiceFlags::WITNESS;
                    version.user_agent = "/Satoshi:27.0.0/".to_string();
                    version.start_height = 850_000;
                    transport.write(&Message::Version(version)).await.unwrap();
                    transport.write(&Message::Verack).await.unwrap();
                }
                Ok(Message::Ping(nonce)) => {
                    transport.write(&Message::Pong(nonce)).await.unwrap();
                }
                Ok(Message::GetAddr) => {
                    transport
                        .write(&Message::Addr(addresses.clone()))
                        .await
                        .unwrap();
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    PeerAddress::from_socket_addr(local)
}

fn entry(last_octet: u8) -> AddrEntry {
    AddrEntry {
        timestamp: 1_700_000_000,
        services: ServiceFlags::NETWORK,
        host: AddrV2::Ipv4(Ipv4Addr::new(10, 0, 0, last_octet)),
        port: 0,
    }
}

#[tokio::test]
async fn test_handshake_and_address_exchange() {
    let network = Network::Regtest;
    let peer = scripted_peer(network, vec![entry(2), entry(3)]).await;
    let config = ConnectionConfiguration::non_listening(network, 70016, None);

    let mut connection = TcpConnection::tcp(peer.clone(), &config)
        .await
        .expect("Failed to establish connection");

    let nonce = handshake::generate_nonce();
    connection
        .send(Message::Version(handshake::version_message(
            &config, &peer, nonce,
        )))
        .await
        .expect("Failed to send version");

    let mut state = HandshakeState::VersionSent;
    let mut info = None;
    while !state.is_complete() {
        let message = timeout(Duration::from_secs(5), connection.receive())
            .await
            .expect("Timeout waiting for handshake")
            .expect("Failed to receive message");
        match message {
            Message::Version(version) => {
                info = Some(HandshakeInfo::from(&version));
                state = state.on_version().expect("Duplicate version");
                connection.send(Message::Verack).await.unwrap();
            }
            Message::Verack => state = state.on_verack(),
            _ => {}
        }
    }

    let info = info.unwrap();
    assert_eq!(info.user_agent, "/Satoshi:27.0.0/");
    assert_eq!(info.start_height, 850_000);
    assert!(info.services.has(ServiceFlags::WITNESS));

    connection.send(Message::Ping(NONCE)).await.unwrap();
    connection.send(Message::GetAddr).await.unwrap();

    let mut pong = None;
    let mut addresses = None;
    while pong.is_none() || addresses.is_none() {
        match timeout(Duration::from_secs(5), connection.receive())
            .await
            .expect("Timeout waiting for response")
            .expect("Failed to receive message")
        {
            Message::Pong(nonce) => pong = Some(nonce),
            Message::Addr(entries) => addresses = Some(entries),
            _ => {}
        }
    }

    assert_eq!(pong, Some(NONCE));
    let discovered: Vec<PeerAddress> = addresses
        .unwrap()
        .iter()
        .map(|entry| entry.to_peer_address(config.default_port()))
        .collect();
    assert_eq!(discovered.len(), 2);
    assert!(discovered.iter().all(|peer| peer.port == 18444));

    connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_peer_close_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and hang up straight away.
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let config = ConnectionConfiguration::non_listening(Network::Regtest, 70016, None);
    let mut connection = TcpConnection::tcp(PeerAddress::from_socket_addr(local), &config)
        .await
        .unwrap();

    let error = timeout(Duration::from_secs(5), connection.receive())
        .await
        .expect("Timeout waiting for close")
        .unwrap_err();
    assert!(error.is_closed());
}
