// Common utilities for integration tests
#![allow(dead_code)]

use rand::Rng;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tcp_relay::config::{AppConfig, RelaySettings};
use tcp_relay::control::ControlPlane;
use tcp_relay::registry::Registry;
use tcp_relay::resolver::SystemResolver;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::time::sleep;

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Random payload of `len` bytes
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random::<u8>()).collect()
}

/// Settings for a harness whose acceptors relay to `target_port` on localhost
pub fn test_settings(target_port: u16) -> RelaySettings {
    RelaySettings {
        bind_addr: LOCALHOST,
        first_port: get_available_port(),
        target_port,
        rate_window_ms: 100,
        ..RelaySettings::default()
    }
}

/// Config resolving every name in `hosts` to localhost
pub fn test_config(target_port: u16, hosts: &[&str]) -> AppConfig {
    AppConfig {
        relay: test_settings(target_port),
        hosts: hosts
            .iter()
            .map(|h| (h.to_string(), LOCALHOST))
            .collect::<HashMap<_, _>>(),
    }
}

/// Control plane over a fresh registry, for use inside a tokio test
pub fn test_control(config: &AppConfig) -> ControlPlane {
    let registry = Registry::new(config.relay.clone());
    let resolver = SystemResolver::with_overrides(config.hosts.clone());
    ControlPlane::new(registry, Arc::new(resolver))
}

/// Create a simple echo server for testing
pub async fn start_echo_server(port: u16) -> tokio::task::JoinHandle<()> {
    let listener = TokioTcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .expect("Failed to bind echo server");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    })
}

/// Server that discards everything it receives and counts the bytes
pub async fn start_sink_server(port: u16) -> Arc<AtomicU64> {
    let listener = TokioTcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .expect("Failed to bind sink server");
    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                    counter.fetch_add(n as u64, Ordering::Relaxed);
                }
            });
        }
    });
    received
}

/// Server that writes `payload` to every connection and then closes it
pub async fn start_source_server(port: u16, payload: Vec<u8>) {
    let listener = TokioTcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .expect("Failed to bind source server");
    let payload = Arc::new(payload);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let payload = Arc::clone(&payload);
            tokio::spawn(async move {
                let _ = socket.write_all(&payload).await;
                let _ = socket.shutdown().await;
            });
        }
    });
}

/// Poll `cond` every 10ms until it holds or `max_wait` elapses
pub async fn wait_until(max_wait: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let attempts = (max_wait.as_millis() / 10).max(1);
    for _ in 0..attempts {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Wait until the registry holds `count` relays
pub async fn wait_for_relays(registry: &Registry, count: usize) {
    assert!(
        wait_until(Duration::from_secs(5), || registry.relays().len() >= count).await,
        "expected {} relays, found {}",
        count,
        registry.relays().len()
    );
}

/// Listening port printed by `addrelay`
pub fn port_from_addrelay(output: &str) -> u16 {
    output
        .strip_prefix("Acceptor active on ")
        .and_then(|rest| rest.split(',').next())
        .and_then(|port| port.parse().ok())
        .unwrap_or_else(|| panic!("unexpected addrelay output: {}", output))
}
