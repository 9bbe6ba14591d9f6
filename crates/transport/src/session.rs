//! The server session (spec §4.H): a listening endpoint that accepts one
//! connection at a time, authenticates it, and either hands it off to a
//! replay handler or services one of the two auxiliary endpoints (Ping,
//! Shutdown).
//!
//! The interpreter is single-threaded per spec §5, so sessions are served
//! one connection at a time on the accepting thread; a second watchdog
//! thread only ever flips an `AtomicBool` and never touches the socket.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gapir_core::token_eq;

use crate::error::{TransportError, TransportResult};
use crate::framing::read_frame;
use crate::wire::ControlMessage;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared handle a caller can use to request shutdown from outside
/// [`ServerSession::run`] (e.g. a signal handler).
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct ServerSession {
    listener: TcpListener,
    auth_token: Vec<u8>,
    idle_timeout: Duration,
    idle_seconds: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl ServerSession {
    /// Binds to `addr` (port `0` picks a free ephemeral port, per spec §6's
    /// `--port` flag). Callers print the bound port via [`Self::local_port`]
    /// before entering [`Self::run`].
    pub fn bind(addr: &str, auth_token: Vec<u8>, idle_timeout: Duration) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            auth_token,
            idle_timeout,
            idle_seconds: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_port(&self) -> TransportResult<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Accepts connections until shutdown, dispatching authenticated
    /// `Replay` connections to `on_replay`. Returns once the idle watchdog
    /// or an explicit `Shutdown` endpoint fires.
    pub fn run(&self, mut on_replay: impl FnMut(TcpStream)) -> TransportResult<()> {
        let watchdog = self.spawn_watchdog();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    self.idle_seconds.store(0, Ordering::SeqCst);
                    if let Err(e) = self.handle_connection(stream, &mut on_replay) {
                        tracing::warn!("replay connection ended with error: {e}");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Give whatever the handler is doing a short grace period before
        // this call returns, so a caller tearing down the process doesn't
        // cut off a connection that just finished its last frame.
        std::thread::sleep(Duration::from_secs(1));
        drop(watchdog);
        Ok(())
    }

    fn handle_connection(&self, mut stream: TcpStream, on_replay: &mut impl FnMut(TcpStream)) -> TransportResult<()> {
        stream.set_nonblocking(false)?;
        let control: ControlMessage = match read_frame(&mut stream)? {
            Some(msg) => msg,
            None => return Ok(()),
        };
        match control {
            ControlMessage::Replay { auth_token } => {
                if !token_eq(&self.auth_token, &auth_token) {
                    return Err(TransportError::AuthenticationFailed);
                }
                on_replay(stream);
                Ok(())
            }
            ControlMessage::Ping => {
                self.idle_seconds.store(0, Ordering::SeqCst);
                Ok(())
            }
            ControlMessage::Shutdown => {
                self.shutdown.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn spawn_watchdog(&self) -> std::thread::JoinHandle<()> {
        let idle_seconds = self.idle_seconds.clone();
        let shutdown = self.shutdown.clone();
        let timeout_secs = self.idle_timeout.as_secs().max(1);
        std::thread::Builder::new()
            .name("gapir-idle-watchdog".into())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_secs(1));
                    let secs = idle_seconds.fetch_add(1, Ordering::SeqCst) + 1;
                    if secs >= timeout_secs {
                        shutdown.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            })
            .expect("failed to spawn idle watchdog thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::write_frame;
    use std::sync::mpsc;

    #[test]
    fn rejects_mismatched_auth_token() {
        let session = Arc::new(ServerSession::bind("127.0.0.1:0", b"correct".to_vec(), Duration::from_secs(60)).unwrap());
        let port = session.local_port().unwrap();
        let (tx, rx) = mpsc::channel();
        let run_session = session.clone();
        let shutdown = session.shutdown_handle();
        let handle = std::thread::spawn(move || {
            let _ = run_session.run(move |_stream| {
                tx.send(()).unwrap();
            });
        });

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write_frame(&mut client, &ControlMessage::Replay { auth_token: b"wrong".to_vec() }).unwrap();
        // The handler never fires for a rejected token.
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
        drop(client);
        shutdown.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn accepts_matching_auth_token_and_invokes_handler() {
        let session = Arc::new(ServerSession::bind("127.0.0.1:0", b"secret".to_vec(), Duration::from_secs(60)).unwrap());
        let port = session.local_port().unwrap();
        let (tx, rx) = mpsc::channel();
        let run_session = session.clone();
        let shutdown = session.shutdown_handle();
        let handle = std::thread::spawn(move || {
            let _ = run_session.run(move |_stream| {
                tx.send(()).unwrap();
            });
        });

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write_frame(&mut client, &ControlMessage::Replay { auth_token: b"secret".to_vec() }).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        shutdown.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn shutdown_control_message_ends_run() {
        let session = Arc::new(ServerSession::bind("127.0.0.1:0", b"secret".to_vec(), Duration::from_secs(60)).unwrap());
        let port = session.local_port().unwrap();
        let run_session = session.clone();
        let handle = std::thread::spawn(move || run_session.run(|_stream| {}));

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write_frame(&mut client, &ControlMessage::Shutdown).unwrap();
        drop(client);

        let result = handle.join().unwrap();
        assert!(result.is_ok());
    }
}
