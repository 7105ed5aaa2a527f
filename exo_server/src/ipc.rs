//! IPC endpoints: reliable event stream and lossy datagram channels.
//!
//! Everything is nonblocking; the dispatcher polls. Event clients are
//! TCP connections exchanging bounded messages (one read chunk = one
//! request, first byte = code). Datagram endpoints learn their remote
//! set from inbound traffic: any first-heard source joins the broadcast
//! set, and a zero-length goodbye datagram is sent to each known remote
//! on close.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};

use tracing::{debug, trace, warn};

use exo_common::consts::MAX_MESSAGE_LENGTH;

/// Identifier of one connected event client, stable across polls.
pub type ClientId = u64;

struct EventClient {
    id: ClientId,
    stream: TcpStream,
    peer: SocketAddr,
}

/// Reliable request/reply endpoint (TCP).
pub struct EventsEndpoint {
    listener: TcpListener,
    clients: Vec<EventClient>,
    next_id: ClientId,
}

impl EventsEndpoint {
    /// Bind and switch to nonblocking accepts.
    pub fn bind(host: &str, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port))?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            clients: Vec::new(),
            next_id: 1,
        })
    }

    /// Bound address (useful with an ephemeral port).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of connected clients.
    pub fn clients_number(&self) -> usize {
        self.clients.len()
    }

    /// Accept every pending connection.
    pub fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    let id = self.next_id;
                    self.next_id += 1;
                    debug!(%peer, id, "event client connected");
                    self.clients.push(EventClient { id, stream, peer });
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                Err(error) => {
                    warn!(%error, "event accept failed");
                    break;
                }
            }
        }
    }

    /// Snapshot of connected client ids.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|client| client.id).collect()
    }

    /// Read one request from a client into `buf`. `None` when nothing is
    /// pending; a closed or broken connection drops the client.
    pub fn receive_from(&mut self, id: ClientId, buf: &mut [u8]) -> Option<usize> {
        let position = self.clients.iter().position(|client| client.id == id)?;
        let client = &mut self.clients[position];
        match client.stream.read(buf) {
            Ok(0) => {
                debug!(peer = %client.peer, "event client disconnected");
                self.clients.remove(position);
                None
            }
            Ok(read) => {
                trace!(peer = %client.peer, read, "event request");
                Some(read)
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => None,
            Err(error) => {
                debug!(peer = %client.peer, %error, "event client dropped");
                self.clients.remove(position);
                None
            }
        }
    }

    /// Send one reply to a client; a failed write drops the client.
    pub fn send_to(&mut self, id: ClientId, message: &[u8]) {
        let Some(position) = self.clients.iter().position(|client| client.id == id) else {
            return;
        };
        let message = &message[..message.len().min(MAX_MESSAGE_LENGTH)];
        let client = &mut self.clients[position];
        if let Err(error) = client.stream.write_all(message) {
            debug!(peer = %client.peer, %error, "event reply failed, dropping client");
            self.clients.remove(position);
        }
    }

    /// Send one frame to every connected client (unsolicited messages).
    pub fn broadcast(&mut self, message: &[u8]) {
        let ids = self.client_ids();
        for id in ids {
            self.send_to(id, message);
        }
    }
}

/// Lossy streaming endpoint (UDP) with a learned remote set.
pub struct DatagramEndpoint {
    socket: UdpSocket,
    remotes: Vec<SocketAddr>,
}

impl DatagramEndpoint {
    /// Bind and switch to nonblocking reads.
    pub fn bind(host: &str, port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((host, port))?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            remotes: Vec::new(),
        })
    }

    /// Bound address (useful with an ephemeral port).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Known broadcast targets.
    pub fn remotes_number(&self) -> usize {
        self.remotes.len()
    }

    /// Receive one datagram, learning its source. `None` when the socket
    /// is drained.
    pub fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
        match self.socket.recv_from(buf) {
            Ok((received, source)) => {
                if !self.remotes.contains(&source) {
                    debug!(%source, "datagram client learned");
                    self.remotes.push(source);
                }
                Some(received.min(MAX_MESSAGE_LENGTH))
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => None,
            Err(error) => {
                // Per-message failure: drop it, keep the socket.
                trace!(%error, "datagram receive error");
                None
            }
        }
    }

    /// Send one message to every known remote.
    pub fn broadcast(&mut self, message: &[u8]) {
        let message = &message[..message.len().min(MAX_MESSAGE_LENGTH)];
        for remote in &self.remotes {
            if let Err(error) = self.socket.send_to(message, remote) {
                trace!(%remote, %error, "datagram send failed");
            }
        }
    }

    /// Zero-length goodbye to each known remote.
    pub fn close(&mut self) {
        for remote in &self.remotes {
            let _ = self.socket.send_to(&[], remote);
        }
        self.remotes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn drain_events(endpoint: &mut EventsEndpoint, buf: &mut [u8]) -> Option<(ClientId, usize)> {
        endpoint.accept_pending();
        for id in endpoint.client_ids() {
            if let Some(read) = endpoint.receive_from(id, buf) {
                return Some((id, read));
            }
        }
        None
    }

    fn poll<T>(timeout: Duration, mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(value) = attempt() {
                return Some(value);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn event_request_reply_roundtrip() {
        let mut endpoint = EventsEndpoint::bind("127.0.0.1", 0).unwrap();
        let addr = endpoint.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&[6]).unwrap();

        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let (id, read) =
            poll(Duration::from_secs(2), || drain_events(&mut endpoint, &mut buf)).unwrap();
        assert_eq!(read, 1);
        assert_eq!(buf[0], 6);

        endpoint.send_to(id, &[6]);
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut reply = [0u8; 1];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(reply[0], 6);
    }

    #[test]
    fn closed_event_clients_are_dropped() {
        let mut endpoint = EventsEndpoint::bind("127.0.0.1", 0).unwrap();
        let addr = endpoint.local_addr().unwrap();
        {
            let _client = TcpStream::connect(addr).unwrap();
            poll(Duration::from_secs(2), || {
                endpoint.accept_pending();
                (endpoint.clients_number() == 1).then_some(())
            })
            .unwrap();
        }
        // Client hung up: the next read reaps it.
        let mut buf = [0u8; 8];
        poll(Duration::from_secs(2), || {
            for id in endpoint.client_ids() {
                let _ = endpoint.receive_from(id, &mut buf);
            }
            (endpoint.clients_number() == 0).then_some(())
        })
        .unwrap();
    }

    #[test]
    fn datagram_learns_remotes_and_broadcasts() {
        let mut endpoint = DatagramEndpoint::bind("127.0.0.1", 0).unwrap();
        let addr = endpoint.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(&[1, 2, 3], addr).unwrap();

        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let received =
            poll(Duration::from_secs(2), || endpoint.receive(&mut buf)).unwrap();
        assert_eq!(received, 3);
        assert_eq!(endpoint.remotes_number(), 1);

        endpoint.broadcast(&[9, 9]);
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut reply = [0u8; 8];
        let (len, _) = client.recv_from(&mut reply).unwrap();
        assert_eq!(&reply[..len], &[9, 9]);

        // Goodbye frame on close is empty.
        endpoint.close();
        let (len, _) = client.recv_from(&mut reply).unwrap();
        assert_eq!(len, 0);
        assert_eq!(endpoint.remotes_number(), 0);
    }
}
