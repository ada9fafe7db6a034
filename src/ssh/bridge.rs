// BBS Node - Secure Transport Bridge
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Relays plaintext between a secure session and a loopback socket
//!
//! The interactive side only ever sees the plain end of a loopback TCP pair.
//! Two tasks move bytes across: the reader pops from the session and writes
//! to the relay end, the writer reads the relay end and pushes into the
//! session. Both share one cancellation token, so when either stops the
//! other follows and the caller sees the plain end close.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::ProtocolSession;
use super::server::RusshProtocol;
use super::session::{HandshakeFailure, HandshakeState, SecureSession};
use crate::config::{RELAY_CHUNK_SIZE, RELAY_POLL_INTERVAL};
use crate::{log_debug, log_info, log_warn};

/// Why a relay task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The other task or the owner tore the bridge down
    Cancelled,
    /// The session reported end of stream
    RemoteClosed,
    /// The loopback end closed or failed
    LocalClosed,
    /// The session accepted none of the pushed bytes
    PushFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("secure session is not ready: {0}")]
    Handshake(HandshakeFailure),
    #[error("cannot create loopback pair: {0}")]
    LoopbackPair(#[source] io::Error),
}

pub struct TransportBridge<P: ProtocolSession + 'static = RusshProtocol> {
    session: Arc<SecureSession<P>>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<RelayExit>>,
    writer: Option<JoinHandle<RelayExit>>,
}

impl<P: ProtocolSession + 'static> TransportBridge<P> {
    /// Start relaying for a ready session; returns the plaintext end
    pub async fn start(session: SecureSession<P>) -> Result<(Self, TcpStream), BridgeError> {
        if let HandshakeState::Failed(failure) = session.state() {
            return Err(BridgeError::Handshake(failure.clone()));
        }

        let (relay_end, plain_end) = loopback_pair().await.map_err(BridgeError::LoopbackPair)?;
        let session = Arc::new(session);
        let cancel = CancellationToken::new();
        let (local_read, local_write) = relay_end.into_split();

        let reader = tokio::spawn(remote_to_local(session.clone(), local_write, cancel.clone()));
        let writer = tokio::spawn(local_to_remote(session.clone(), local_read, cancel.clone()));

        log_info!("Secure transport bridge started");
        Ok((
            Self {
                session,
                cancel,
                reader: Some(reader),
                writer: Some(writer),
            },
            plain_end,
        ))
    }

    pub fn session(&self) -> &SecureSession<P> {
        &self.session
    }

    /// True once either relay task has stopped or shutdown was requested
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the bridge starts tearing down
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Stop both relay tasks and wait for them; returns (reader, writer) exits
    pub async fn shutdown(&mut self) -> (RelayExit, RelayExit) {
        self.cancel.cancel();
        let reader = join_relay(self.reader.take()).await;
        let writer = join_relay(self.writer.take()).await;
        log_debug!("Secure transport bridge stopped: {:?} / {:?}", reader, writer);
        (reader, writer)
    }
}

impl<P: ProtocolSession + 'static> Drop for TransportBridge<P> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn join_relay(task: Option<JoinHandle<RelayExit>>) -> RelayExit {
    match task {
        Some(task) => task.await.unwrap_or(RelayExit::Cancelled),
        None => RelayExit::Cancelled,
    }
}

/// Connected loopback pair as (relay end, plain end)
async fn loopback_pair() -> io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;

    let (connected, (accepted, peer)) =
        tokio::try_join!(TcpStream::connect(addr), listener.accept())?;
    drop(listener);

    if peer != connected.local_addr()? {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("unexpected peer {} on loopback listener", peer),
        ));
    }

    connected.set_nodelay(true)?;
    accepted.set_nodelay(true)?;
    Ok((accepted, connected))
}

async fn remote_to_local<P: ProtocolSession>(
    session: Arc<SecureSession<P>>,
    mut local: OwnedWriteHalf,
    cancel: CancellationToken,
) -> RelayExit {
    let _teardown = cancel.clone().drop_guard();
    let mut buf = vec![0u8; RELAY_CHUNK_SIZE];
    let mut backlog = false;

    loop {
        if backlog {
            // Keep popping until the session has nothing buffered
            if cancel.is_cancelled() {
                return RelayExit::Cancelled;
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return RelayExit::Cancelled,
                _ = session.wait_readable(RELAY_POLL_INTERVAL) => {}
            }
        }

        let n = match session.pop_data(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                log_debug!("Reader relay stopping: {}", e);
                return RelayExit::RemoteClosed;
            }
        };
        backlog = n > 0;

        if n > 0 {
            if let Err(e) = local.write_all(&buf[..n]).await {
                log_debug!("Reader relay lost the local end: {}", e);
                return RelayExit::LocalClosed;
            }
        }
    }
}

async fn local_to_remote<P: ProtocolSession>(
    session: Arc<SecureSession<P>>,
    mut local: OwnedReadHalf,
    cancel: CancellationToken,
) -> RelayExit {
    let _teardown = cancel.clone().drop_guard();
    let mut buf = vec![0u8; RELAY_CHUNK_SIZE];

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return RelayExit::Cancelled,
            read = tokio::time::timeout(RELAY_POLL_INTERVAL, local.read(&mut buf)) => match read {
                Err(_) => continue,
                Ok(Ok(0)) => return RelayExit::LocalClosed,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    log_debug!("Writer relay lost the local end: {}", e);
                    return RelayExit::LocalClosed;
                }
            }
        };

        let mut sent = 0;
        while sent < n {
            let pushed = session.push_data(&buf[sent..n]).await;
            if pushed == 0 {
                log_warn!("Secure session refused {} bytes, closing bridge", n - sent);
                return RelayExit::PushFailed;
            }
            sent += pushed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::identity::HostIdentity;
    use crate::ssh::protocol::{ActivateStatus, ProtocolError, Readiness};
    use crate::ssh::session::tests::{loopback_pair as socket_pair, test_identity};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Wire {
        to_remote: Mutex<Vec<u8>>,
        from_remote: Mutex<VecDeque<u8>>,
        /// Packets handed out one per pop, like the russh inbound queue
        packets: Mutex<VecDeque<Vec<u8>>>,
        remote_closed: AtomicBool,
        hold_pop: AtomicBool,
        refuse_handshake: AtomicBool,
        fail_push: AtomicBool,
        in_flight: AtomicBool,
        overlaps: AtomicUsize,
        notify: Arc<Notify>,
    }

    impl Wire {
        fn enter(&self) {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn leave(&self) {
            self.in_flight.store(false, Ordering::SeqCst);
        }

        fn send_from_remote(&self, data: &[u8]) {
            self.from_remote.lock().unwrap().extend(data.iter().copied());
            self.notify.notify_one();
        }

        /// Queue several packets behind a single readiness wakeup
        fn send_packets(&self, packets: &[&[u8]]) {
            let mut queue = self.packets.lock().unwrap();
            for packet in packets {
                queue.push_back(packet.to_vec());
                self.notify.notify_one();
            }
        }
    }

    struct MemoryProtocol {
        wire: Arc<Wire>,
    }

    #[async_trait]
    impl ProtocolSession for MemoryProtocol {
        fn attach_private_key(&mut self, _identity: &HostIdentity) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn attach_socket(&mut self, _socket: TcpStream) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn set_auto_respond(&mut self, _enabled: bool) -> Result<(), ProtocolError> {
            Ok(())
        }

        async fn activate(&mut self) -> Result<(), ActivateStatus> {
            if self.wire.refuse_handshake.load(Ordering::SeqCst) {
                return Err(ActivateStatus::Failed(ProtocolError::Failed("refused".into())));
            }
            Ok(())
        }

        async fn push(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
            self.wire.enter();
            // Give a concurrent pop the chance to overlap if it could
            tokio::task::yield_now().await;
            let result = if self.wire.fail_push.load(Ordering::SeqCst) {
                Err(ProtocolError::Closed)
            } else {
                self.wire.to_remote.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            };
            self.wire.leave();
            result
        }

        async fn flush(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn pop(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
            self.wire.enter();
            if self.wire.hold_pop.load(Ordering::SeqCst) {
                // Widen the window a concurrent push would have to hit
                std::thread::sleep(Duration::from_micros(200));
            }
            if let Some(packet) = self.wire.packets.lock().unwrap().pop_front() {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                self.wire.leave();
                return Ok(n);
            }
            let mut pending = self.wire.from_remote.lock().unwrap();
            let result = if pending.is_empty() && self.wire.remote_closed.load(Ordering::SeqCst) {
                Err(ProtocolError::Closed)
            } else {
                let n = buf.len().min(pending.len());
                for (slot, byte) in buf.iter_mut().zip(pending.drain(..n)) {
                    *slot = byte;
                }
                Ok(n)
            };
            drop(pending);
            self.wire.leave();
            result
        }

        fn readiness(&self) -> Option<Arc<dyn Readiness>> {
            Some(self.wire.notify.clone())
        }
    }

    async fn start_bridge(
        dir: &TempDir,
        wire: &Arc<Wire>,
    ) -> Result<(TransportBridge<MemoryProtocol>, TcpStream), BridgeError> {
        let identity = test_identity(dir);
        let (socket, _peer) = socket_pair().await;
        let protocol = MemoryProtocol { wire: wire.clone() };
        let session = SecureSession::with_protocol(protocol, socket, &identity).await;
        TransportBridge::start(session).await
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[tokio::test]
    async fn test_bytes_cross_the_bridge_intact_both_ways() {
        let dir = TempDir::new().unwrap();
        let wire = Arc::new(Wire::default());
        let (mut bridge, mut plain) = start_bridge(&dir, &wire).await.unwrap();

        // Larger than one relay chunk in each direction
        let inbound = pattern(RELAY_CHUNK_SIZE * 2 + 123, 7);
        wire.send_from_remote(&inbound);
        let mut received = vec![0u8; inbound.len()];
        tokio::time::timeout(Duration::from_secs(10), plain.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, inbound);

        let outbound = pattern(RELAY_CHUNK_SIZE * 3 + 5, 99);
        plain.write_all(&outbound).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            while wire.to_remote.lock().unwrap().len() < outbound.len() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*wire.to_remote.lock().unwrap(), outbound);

        assert_eq!(wire.overlaps.load(Ordering::SeqCst), 0);
        assert!(!bridge.is_closed());
        assert_eq!(
            bridge.shutdown().await,
            (RelayExit::Cancelled, RelayExit::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_packets_sharing_one_wakeup_are_relayed_together() {
        let dir = TempDir::new().unwrap();
        let wire = Arc::new(Wire::default());
        let (mut bridge, mut plain) = start_bridge(&dir, &wire).await.unwrap();

        wire.send_packets(&[b"first", b"second", b"third"]);

        // Well inside one poll interval: nothing waits for a timeout
        let mut received = [0u8; 16];
        tokio::time::timeout(RELAY_POLL_INTERVAL / 2, plain.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&received, b"firstsecondthird");
        bridge.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_push_and_pop_never_overlap_under_load() {
        let dir = TempDir::new().unwrap();
        let wire = Arc::new(Wire::default());
        wire.hold_pop.store(true, Ordering::SeqCst);
        let (mut bridge, plain) = start_bridge(&dir, &wire).await.unwrap();
        let (mut plain_read, mut plain_write) = plain.into_split();

        let outbound = pattern(RELAY_CHUNK_SIZE * 2, 3);
        let inbound = pattern(64 * 256, 11);

        let to_send = outbound.clone();
        let typist = tokio::spawn(async move {
            for piece in to_send.chunks(512) {
                plain_write.write_all(piece).await.unwrap();
                tokio::task::yield_now().await;
            }
            plain_write
        });
        let remote = wire.clone();
        let from_remote = inbound.clone();
        let sender = tokio::spawn(async move {
            for piece in from_remote.chunks(64) {
                remote.send_from_remote(piece);
                tokio::task::yield_now().await;
            }
        });

        let mut received = vec![0u8; inbound.len()];
        tokio::time::timeout(Duration::from_secs(20), plain_read.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        sender.await.unwrap();
        let _plain_write = typist.await.unwrap();
        tokio::time::timeout(Duration::from_secs(20), async {
            while wire.to_remote.lock().unwrap().len() < outbound.len() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(received, inbound);
        assert_eq!(*wire.to_remote.lock().unwrap(), outbound);
        assert_eq!(wire.overlaps.load(Ordering::SeqCst), 0);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_push_failure_tears_down_the_bridge() {
        let dir = TempDir::new().unwrap();
        let wire = Arc::new(Wire::default());
        wire.fail_push.store(true, Ordering::SeqCst);
        let (mut bridge, mut plain) = start_bridge(&dir, &wire).await.unwrap();

        plain.write_all(b"lost keystroke").await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), bridge.closed())
            .await
            .unwrap();

        assert_eq!(
            bridge.shutdown().await,
            (RelayExit::Cancelled, RelayExit::PushFailed)
        );
        let mut rest = [0u8; 16];
        let n = plain.read(&mut rest).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_remote_close_tears_down_the_bridge() {
        let dir = TempDir::new().unwrap();
        let wire = Arc::new(Wire::default());
        let (mut bridge, _plain) = start_bridge(&dir, &wire).await.unwrap();

        wire.remote_closed.store(true, Ordering::SeqCst);
        wire.notify.notify_one();
        tokio::time::timeout(Duration::from_secs(10), bridge.closed())
            .await
            .unwrap();

        assert_eq!(
            bridge.shutdown().await,
            (RelayExit::RemoteClosed, RelayExit::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_failed_handshake_is_refused() {
        let dir = TempDir::new().unwrap();
        let wire = Arc::new(Wire::default());
        wire.refuse_handshake.store(true, Ordering::SeqCst);

        let result = start_bridge(&dir, &wire).await;

        assert!(matches!(
            result,
            Err(BridgeError::Handshake(HandshakeFailure::Rejected(_)))
        ));
    }
}
