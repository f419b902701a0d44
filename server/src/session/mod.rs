//! Push subscriptions for remote listeners
//!
//! A UDP peer that sends `subscribe` gets a broadcaster subscription and a
//! forwarder task relaying every channel message to its address. Sessions are
//! renewed by re-subscribing and expire after `session_timeout` of silence.

use crate::broadcast::{Broadcaster, Subscription};
use protocol::{AdminResponse, Channel};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type SessionKey = (SocketAddr, Channel);

/// Subscriber session information
#[derive(Debug)]
struct Session {
    created_at: Instant,
    last_seen: Instant,
    cancel: CancellationToken,
}

/// Session manager
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
    session_timeout: Duration,
    broadcaster: Arc<Broadcaster>,
    socket: Arc<UdpSocket>,
}

impl SessionManager {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        socket: Arc<UdpSocket>,
        session_timeout_sec: u64,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_timeout: Duration::from_secs(session_timeout_sec),
            broadcaster,
            socket,
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.session_timeout.as_secs()
    }

    /// Start or renew a session; returns true if a new one was created
    pub async fn subscribe(&self, addr: SocketAddr, channel: Channel) -> bool {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.get_mut(&(addr, channel)) {
            session.last_seen = Instant::now();
            debug!(peer = %addr, channel = %channel, "Session renewed");
            return false;
        }

        let cancel = CancellationToken::new();
        let subscription = self.broadcaster.subscribe(channel);
        tokio::spawn(forward(
            subscription,
            self.broadcaster.clone(),
            self.socket.clone(),
            addr,
            cancel.clone(),
        ));

        let now = Instant::now();
        sessions.insert(
            (addr, channel),
            Session {
                created_at: now,
                last_seen: now,
                cancel,
            },
        );
        info!(peer = %addr, channel = %channel, "Subscriber session started");
        true
    }

    /// End a session; returns false if there was none
    pub async fn unsubscribe(&self, addr: SocketAddr, channel: Channel) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(&(addr, channel)) {
            Some(session) => {
                session.cancel.cancel();
                info!(
                    peer = %addr,
                    channel = %channel,
                    lifetime_secs = session.created_at.elapsed().as_secs(),
                    "Subscriber session ended"
                );
                true
            }
            None => false,
        }
    }

    /// Remove expired sessions; returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let before = sessions.len();

        sessions.retain(|(addr, channel), session| {
            let alive = now.duration_since(session.last_seen) < self.session_timeout;
            if !alive {
                session.cancel.cancel();
                debug!(peer = %addr, channel = %channel, "Subscriber session expired");
            }
            alive
        });

        before - sessions.len()
    }

    /// Get number of active sessions
    pub async fn active_sessions(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Cancel every session
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values() {
            session.cancel.cancel();
        }
        sessions.clear();
    }
}

/// Relay one subscription to one peer until cancelled
async fn forward(
    mut subscription: Subscription,
    broadcaster: Arc<Broadcaster>,
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
    cancel: CancellationToken,
) {
    let channel = subscription.channel();
    debug!(peer = %addr, channel = %channel, subscription = %subscription.id(), "Forwarder started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let response = AdminResponse::Message {
                    channel,
                    message: message.as_ref().clone(),
                };
                match response.to_bytes() {
                    Ok(bytes) => {
                        // A failing peer only affects its own session
                        if let Err(e) = socket.send_to(&bytes, addr).await {
                            warn!(peer = %addr, channel = %channel, error = %e, "Failed to push message");
                        }
                    }
                    Err(e) => {
                        warn!(peer = %addr, channel = %channel, error = %e, "Failed to encode message");
                    }
                }
            }
        }
    }

    broadcaster.unsubscribe(subscription);
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{FeedMessage, Snapshot, Source};

    async fn setup(timeout_sec: u64) -> (SessionManager, Arc<Broadcaster>, UdpSocket) {
        let broadcaster = Arc::new(Broadcaster::new(16));
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let manager = SessionManager::new(broadcaster.clone(), server, timeout_sec);
        (manager, broadcaster, peer)
    }

    async fn recv_response(peer: &UdpSocket) -> AdminResponse {
        let mut buf = vec![0u8; 65535];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .expect("timed out waiting for push")
            .unwrap();
        AdminResponse::from_bytes(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_subscribed_peer_receives_channel_messages() {
        let (manager, broadcaster, peer) = setup(60).await;
        let addr = peer.local_addr().unwrap();

        assert!(manager.subscribe(addr, Channel::WeatherRaw).await);
        assert!(!manager.subscribe(addr, Channel::WeatherRaw).await);
        assert_eq!(broadcaster.subscriber_count(Channel::WeatherRaw), 1);

        let message = FeedMessage::reading(Source::Weather, &Snapshot::new("t").with_value("wind", 2.5));
        broadcaster.publish(Channel::WeatherRaw, message.clone());

        match recv_response(&peer).await {
            AdminResponse::Message { channel, message: received } => {
                assert_eq!(channel, Channel::WeatherRaw);
                assert_eq!(received, message);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_subscription() {
        let (manager, broadcaster, peer) = setup(60).await;
        let addr = peer.local_addr().unwrap();

        manager.subscribe(addr, Channel::Alerts).await;
        assert!(manager.unsubscribe(addr, Channel::Alerts).await);
        assert!(!manager.unsubscribe(addr, Channel::Alerts).await);

        for _ in 0..50 {
            if broadcaster.subscriber_count(Channel::Alerts) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broadcaster.subscriber_count(Channel::Alerts), 0);
        assert_eq!(manager.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_cleaned_up() {
        let (manager, _broadcaster, peer) = setup(0).await;
        let addr = peer.local_addr().unwrap();

        manager.subscribe(addr, Channel::Alerts).await;
        manager.subscribe(addr, Channel::InverterRaw).await;

        assert_eq!(manager.cleanup_expired().await, 2);
        assert_eq!(manager.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_live_sessions_survive_cleanup() {
        let (manager, _broadcaster, peer) = setup(60).await;
        manager.subscribe(peer.local_addr().unwrap(), Channel::Alerts).await;

        assert_eq!(manager.cleanup_expired().await, 0);
        assert_eq!(manager.active_sessions().await, 1);

        manager.shutdown().await;
        assert_eq!(manager.active_sessions().await, 0);
    }
}
