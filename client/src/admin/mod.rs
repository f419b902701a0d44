//! Admin endpoint client
//!
//! Blocking request/response over one UDP socket. The same socket receives
//! pushed channel messages once it has subscribed.

use crate::config::ServerConfig;
use protocol::{AdminRequest, AdminResponse, MAX_DATAGRAM_SIZE, ProtocolError};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Cannot resolve server address {0}")]
    Resolve(String),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("No response from {addr} after {attempts} attempts")]
    NoResponse { addr: SocketAddr, attempts: u32 },
}

pub struct AdminClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    retry_attempts: u32,
    timeout: Duration,
}

impl AdminClient {
    pub fn connect(config: &ServerConfig) -> Result<Self, AdminError> {
        let target = config.admin_addr();
        Self::connect_to(&target, Duration::from_millis(config.timeout_ms), config.retry_attempts)
    }

    pub fn connect_to(target: &str, timeout: Duration, retry_attempts: u32) -> Result<Self, AdminError> {
        let server_addr = target
            .to_socket_addrs()
            .map_err(|_| AdminError::Resolve(target.to_string()))?
            .next()
            .ok_or_else(|| AdminError::Resolve(target.to_string()))?;

        let bind_addr = if server_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.set_write_timeout(Some(Duration::from_millis(1000)))?;

        debug!("Admin client initialized for {}", server_addr);

        Ok(Self {
            socket,
            server_addr,
            retry_attempts: retry_attempts.max(1),
            timeout,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Send `request` and wait for its reply, retrying on timeout
    pub fn request(&self, request: &AdminRequest) -> Result<AdminResponse, AdminError> {
        for attempt in 1..=self.retry_attempts {
            debug!("Request attempt {}/{}: {:?}", attempt, self.retry_attempts, request);
            self.send(request)?;

            match self.recv_reply()? {
                Some(response) => return Ok(response),
                None => warn!("No response to attempt {} from {}", attempt, self.server_addr),
            }
        }

        Err(AdminError::NoResponse {
            addr: self.server_addr,
            attempts: self.retry_attempts,
        })
    }

    /// Fire-and-forget send
    pub fn send(&self, request: &AdminRequest) -> Result<(), AdminError> {
        let bytes = request.to_bytes()?;
        self.socket.send_to(&bytes, self.server_addr)?;
        Ok(())
    }

    /// Next datagram from the server within `wait`; `None` on timeout
    pub fn recv(&self, wait: Duration) -> Result<Option<AdminResponse>, AdminError> {
        self.socket.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;
        let result = self.recv_one();
        self.socket.set_read_timeout(Some(self.timeout))?;
        result
    }

    /// Wait for a reply, skipping pushed channel messages
    fn recv_reply(&self) -> Result<Option<AdminResponse>, AdminError> {
        loop {
            match self.recv_one()? {
                Some(AdminResponse::Message { .. }) => continue,
                other => return Ok(other),
            }
        }
    }

    fn recv_one(&self) -> Result<Option<AdminResponse>, AdminError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            if from != self.server_addr {
                debug!("Ignoring datagram from {}", from);
                continue;
            }

            match AdminResponse::from_bytes(&buf[..len]) {
                Ok(response) => return Ok(Some(response)),
                Err(e) => {
                    warn!("Invalid response from {}: {}", from, e);
                    continue;
                }
            }
        }
    }
}

/// Send each record as one datagram to a stream port
pub struct StreamSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl StreamSender {
    pub fn connect(target: &str) -> Result<Self, AdminError> {
        let target_addr = target
            .to_socket_addrs()
            .map_err(|_| AdminError::Resolve(target.to_string()))?
            .next()
            .ok_or_else(|| AdminError::Resolve(target.to_string()))?;

        let bind_addr = if target_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        info!("Sending records to {}", target_addr);

        Ok(Self {
            socket,
            target: target_addr,
        })
    }

    pub fn send(&self, record: &[u8]) -> Result<(), AdminError> {
        if record.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::DatagramTooLarge {
                max: MAX_DATAGRAM_SIZE,
                actual: record.len(),
            }
            .into());
        }
        self.socket.send_to(record, self.target)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use protocol::{Channel, FeedMessage, Snapshot, Source};
    use std::thread;

    /// Bind a fake admin endpoint answering each request with `reply(request)`;
    /// the first `drop_first` requests go unanswered
    pub(crate) fn fake_server<F>(drop_first: usize, reply: F) -> (SocketAddr, thread::JoinHandle<Vec<AdminRequest>>)
    where
        F: Fn(&AdminRequest) -> Vec<AdminResponse> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let addr = socket.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            while let Ok((len, peer)) = socket.recv_from(&mut buf) {
                let request = AdminRequest::from_bytes(&buf[..len]).unwrap();
                seen.push(request.clone());
                if seen.len() <= drop_first {
                    continue;
                }
                for response in reply(&request) {
                    socket.send_to(&response.to_bytes().unwrap(), peer).unwrap();
                }
            }
            seen
        });

        (addr, handle)
    }

    fn client(addr: SocketAddr, attempts: u32) -> AdminClient {
        AdminClient::connect_to(&addr.to_string(), Duration::from_millis(100), attempts).unwrap()
    }

    #[test]
    fn test_request_gets_reply() {
        let (addr, server) = fake_server(0, |_| vec![AdminResponse::Deleted { count: 4 }]);

        let response = client(addr, 3).request(&AdminRequest::DeleteAllAlerts).unwrap();

        assert_eq!(response, AdminResponse::Deleted { count: 4 });
        assert_eq!(server.join().unwrap(), vec![AdminRequest::DeleteAllAlerts]);
    }

    #[test]
    fn test_request_retries_after_timeout() {
        let (addr, server) = fake_server(2, |_| vec![AdminResponse::Rules { rules: vec![] }]);

        let response = client(addr, 3).request(&AdminRequest::GetRules).unwrap();

        assert_eq!(response, AdminResponse::Rules { rules: vec![] });
        assert_eq!(server.join().unwrap().len(), 3);
    }

    #[test]
    fn test_request_gives_up() {
        let (addr, server) = fake_server(usize::MAX, |_| vec![]);

        let result = client(addr, 2).request(&AdminRequest::ListAlerts);

        assert!(matches!(result, Err(AdminError::NoResponse { attempts: 2, .. })));
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_reply_skips_pushed_messages() {
        let (addr, _server) = fake_server(0, |_| {
            vec![
                AdminResponse::Message {
                    channel: Channel::InverterRaw,
                    message: FeedMessage::reading(Source::Inverter, &Snapshot::new("t")),
                },
                AdminResponse::Alerts { entries: vec![] },
            ]
        });

        let response = client(addr, 1).request(&AdminRequest::ListAlerts).unwrap();

        assert_eq!(response, AdminResponse::Alerts { entries: vec![] });
    }

    #[test]
    fn test_stream_sender_delivers_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let sender = StreamSender::connect(&receiver.local_addr().unwrap().to_string()).unwrap();

        sender.send(br#"{"ds":"t","v":1}"#).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], br#"{"ds":"t","v":1}"#);
        assert!(sender.send(&vec![b' '; MAX_DATAGRAM_SIZE + 1]).is_err());
    }
}
