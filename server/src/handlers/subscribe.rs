//! Push subscription requests

use crate::session::SessionManager;
use protocol::{AdminResponse, Channel};
use std::net::SocketAddr;

/// Subscribing again renews the session
pub async fn handle_subscribe(
    sessions: &SessionManager,
    peer: SocketAddr,
    channel: Channel,
) -> AdminResponse {
    sessions.subscribe(peer, channel).await;
    AdminResponse::Subscribed {
        channel,
        timeout_secs: sessions.timeout_secs(),
    }
}

pub async fn handle_unsubscribe(
    sessions: &SessionManager,
    peer: SocketAddr,
    channel: Channel,
) -> AdminResponse {
    let existed = sessions.unsubscribe(peer, channel).await;
    AdminResponse::Unsubscribed { channel, existed }
}
