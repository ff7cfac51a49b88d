//! 루프백 UDP 탐색 테스트

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use beam::{Broadcaster, Config, DiscoveryListener, Error, Host, HostRegistry, UdpBroadcaster};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_repeated_beacons_and_garbage() {
    let listener = DiscoveryListener::bind(&Config::local_test()).await.unwrap();
    let target: SocketAddr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let (mut discovery, task) = listener.spawn(cancel.clone());

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for payload in [
        &b"alpha|4000"[..],
        b"alpha|4000",
        b"nonsense",
        b"beta|4001",
        b"beta|port",
        b"alpha|4000",
    ] {
        peer.send_to(payload, target).await.unwrap();
    }

    let registry = HostRegistry::new();
    for _ in 0..4 {
        let host = tokio::time::timeout(WAIT, discovery.hosts.recv())
            .await
            .unwrap()
            .unwrap();
        registry.insert(host);
    }

    let mut errors = Vec::new();
    for _ in 0..2 {
        errors.push(
            tokio::time::timeout(WAIT, discovery.errors.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert!(matches!(errors[0], Error::MalformedAnnouncement(_)));
    assert!(matches!(errors[1], Error::InvalidPort { .. }));

    let entries = registry.snapshot();
    assert_eq!(entries.len(), 2);
    assert_eq!((entries[0].id, &entries[0].host), (1, &Host::new("alpha", LOOPBACK, 4000)));
    assert_eq!((entries[1].id, &entries[1].host), (2, &Host::new("beta", LOOPBACK, 4001)));

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_beacon_reaches_listener() {
    let listener = DiscoveryListener::bind(&Config::local_test()).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let cancel = CancellationToken::new();
    let (mut discovery, _task) = listener.spawn(cancel.clone());

    let beacon = UdpBroadcaster::new(Config::local_test().with_discovery_port(port))
        .start("desk", 4321, cancel.child_token())
        .await
        .unwrap();

    let host = tokio::time::timeout(WAIT, discovery.hosts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(host, Host::new("desk", LOOPBACK, 4321));
    assert_eq!(host.to_string(), "desk -- 127.0.0.1:4321");

    // 부모 토큰 취소가 비컨까지 전파
    cancel.cancel();
    tokio::time::timeout(WAIT, beacon).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_closes_both_streams() {
    let listener = DiscoveryListener::bind(&Config::local_test()).await.unwrap();
    let cancel = CancellationToken::new();
    let (mut discovery, task) = listener.spawn(cancel.clone());

    // 데드라인 만료 몇 번은 에러가 아님
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(discovery.errors.try_recv().is_err());

    cancel.cancel();
    let hosts = tokio::time::timeout(WAIT, discovery.hosts.recv()).await.unwrap();
    let errors = tokio::time::timeout(WAIT, discovery.errors.recv()).await.unwrap();
    assert!(hosts.is_none());
    assert!(errors.is_none());
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}
