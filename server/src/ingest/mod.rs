//! Telemetry stream consumers
//!
//! One UDP port per source; each datagram carries one JSON record.

use crate::error::EngineError;
use crate::service::AlertService;
use protocol::{MAX_DATAGRAM_SIZE, Snapshot, Source};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consume `source` records from `socket` until `cancel` fires
pub async fn run_stream(
    source: Source,
    socket: UdpSocket,
    service: Arc<AlertService>,
    cancel: CancellationToken,
) {
    if let Ok(addr) = socket.local_addr() {
        info!(source = %source, "Consuming {} records on {}", source, addr);
    }

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    error!(source = %source, "Error receiving record: {}", e);
                    continue;
                }
            },
        };

        let snapshot = match decode(&buf[..len]) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(source = %source, peer = %peer, "Dropping record: {}", e);
                continue;
            }
        };

        debug!(source = %source, ds = %snapshot.ds, values = snapshot.values.len(), "Record received");
        service.ingest(source, snapshot).await;
    }

    info!(source = %source, "Stream consumer stopped");
}

fn decode(bytes: &[u8]) -> Result<Snapshot, EngineError> {
    Ok(Snapshot::from_json(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::service;
    use protocol::Channel;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_decode_rejects_malformed_records() {
        assert!(decode(br#"{"ds":"2024-01-01T00:00:00","temp":40}"#).is_ok());
        assert!(matches!(decode(b"not json"), Err(EngineError::Decode(_))));
        assert!(matches!(decode(br#"{"temp":40}"#), Err(EngineError::Decode(_))));
        assert!(matches!(decode(b"[1,2]"), Err(EngineError::Decode(_))));
    }

    #[tokio::test]
    async fn test_consumer_feeds_service_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(service(&dir, 50));
        let mut raw = service.broadcaster().subscribe(Channel::WeatherRaw);

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_stream(Source::Weather, socket, service.clone(), cancel.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"{broken", addr).await.unwrap();
        sender
            .send_to(br#"{"ds":"2024-01-01T00:00:00","irradiance":640.5}"#, addr)
            .await
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(2), raw.recv())
            .await
            .expect("timed out waiting for reading")
            .unwrap();
        match message.as_ref() {
            protocol::FeedMessage::Reading { source, ds, values } => {
                assert_eq!(*source, Source::Weather);
                assert_eq!(ds, "2024-01-01T00:00:00");
                assert_eq!(values["irradiance"].as_f64(), 640.5);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("consumer did not stop")
            .unwrap();
    }
}
