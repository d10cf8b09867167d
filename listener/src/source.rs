use std::io::ErrorKind::ConnectionReset;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::{net::UdpSocket, task::JoinHandle};

use crate::{config::Config, Error, Result};

/// A captured udp datagram with its remote endpoint.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Bytes,
    pub remote: SocketAddr,
}

impl Datagram {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Datagram source bound to a local udp endpoint.
///
/// `bind` opens the socket without receiving; `start` spawns the receive
/// task; `stop` aborts the task and closes the socket. A stopped source
/// may be started again, which opens a fresh socket on the same
/// endpoint.
pub struct UdpSource {
    local: SocketAddr,
    buffer_size: usize,
    receive_buffer: usize,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpSource {
    /// Open a udp socket with `SO_REUSEADDR` set and bind it to `local`.
    ///
    /// Does not start receiving.
    pub async fn bind(local: SocketAddr, config: &Config) -> Result<Self> {
        let socket = open_socket(local, config.receive_buffer)?;
        Ok(Self {
            local,
            buffer_size: config.buffer_size,
            receive_buffer: config.receive_buffer,
            socket: Mutex::new(Some(Arc::new(socket))),
            task: Mutex::new(None),
        })
    }

    /// Start the receive loop.
    ///
    /// Each received datagram is delivered to `callback` exactly once
    /// with its remote endpoint. Socket errors other than a connection
    /// reset terminate the loop; the source must be torn down and
    /// re-created to recover.
    pub fn start<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Datagram) + Send + Sync + 'static,
    {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(Error::InvalidState("source is already started"));
        }

        let socket = {
            let mut guard = self.socket.lock();
            match guard.as_ref() {
                Some(socket) => socket.clone(),
                None => {
                    let socket =
                        Arc::new(open_socket(self.local, self.receive_buffer)?);
                    *guard = Some(socket.clone());
                    socket
                }
            }
        };

        *task = Some(tokio::spawn(receive_loop(
            socket,
            self.buffer_size,
            callback,
        )));

        Ok(())
    }

    /// Stop receiving and close the socket.
    pub fn stop(&self) -> Result<()> {
        let task = self
            .task
            .lock()
            .take()
            .ok_or(Error::InvalidState("source is not started"))?;

        task.abort();
        self.socket.lock().take();
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket()?.local_addr()?)
    }

    /// Join a multicast group.
    ///
    /// The source must be started, and the group's address family must
    /// match the bound endpoint. For ipv4 the membership is registered on
    /// the bound interface address.
    pub fn join_multicast(&self, addr: IpAddr, ttl: Option<u32>) -> Result<()> {
        if !self.is_started() {
            return Err(Error::InvalidState("source is not started"));
        }

        let socket = self.socket()?;
        match (addr, self.local) {
            (IpAddr::V4(addr), SocketAddr::V4(local)) => {
                socket.join_multicast_v4(addr, *local.ip())?;
                if let Some(ttl) = ttl {
                    socket.set_multicast_ttl_v4(ttl)?;
                }
            }
            (IpAddr::V6(addr), SocketAddr::V6(_)) => {
                socket.join_multicast_v6(&addr, 0)?;
            }
            _ => {
                return Err(Error::InvalidArgument(
                    "multicast address family mismatch",
                ))
            }
        }

        log::info!("joined multicast group: addr={:?}", addr);
        Ok(())
    }

    /// Leave a multicast group joined with `join_multicast`.
    pub fn drop_multicast(&self, addr: IpAddr) -> Result<()> {
        let socket = self.socket()?;
        match (addr, self.local) {
            (IpAddr::V4(addr), SocketAddr::V4(local)) => {
                socket.leave_multicast_v4(addr, *local.ip())?;
            }
            (IpAddr::V6(addr), SocketAddr::V6(_)) => {
                socket.leave_multicast_v6(&addr, 0)?;
            }
            _ => {
                return Err(Error::InvalidArgument(
                    "multicast address family mismatch",
                ))
            }
        }

        log::info!("left multicast group: addr={:?}", addr);
        Ok(())
    }

    pub fn ttl(&self) -> Result<u32> {
        Ok(self.socket()?.ttl()?)
    }

    pub fn set_ttl(&self, ttl: u32) -> Result<()> {
        Ok(self.socket()?.set_ttl(ttl)?)
    }

    pub fn broadcast(&self) -> Result<bool> {
        Ok(self.socket()?.broadcast()?)
    }

    pub fn set_broadcast(&self, on: bool) -> Result<()> {
        Ok(self.socket()?.set_broadcast(on)?)
    }

    /// Kernel receive buffer size actually granted by the OS.
    pub fn receive_buffer_size(&self) -> Result<usize> {
        let socket = self.socket()?;
        Ok(SockRef::from(socket.as_ref()).recv_buffer_size()?)
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.socket
            .lock()
            .clone()
            .ok_or(Error::InvalidState("source socket is closed"))
    }
}

fn open_socket(local: SocketAddr, receive_buffer: usize) -> Result<UdpSocket> {
    let socket =
        Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(receive_buffer)?;
    socket.set_nonblocking(true)?;
    socket.bind(&local.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// udp socket receive loop.
///
/// Reads datagrams into a `buffer_size` buffer and hands an owned copy
/// to the callback. A remote host shutting down surfaces as a connection
/// reset on some platforms and is not an error for a listen-only socket.
async fn receive_loop<F>(socket: Arc<UdpSocket>, buffer_size: usize, callback: F)
where
    F: Fn(Datagram) + Send + Sync + 'static,
{
    let mut buf = vec![0u8; buffer_size];

    loop {
        let (size, remote) = match socket.recv_from(&mut buf).await {
            Ok(s) => s,
            Err(e) => {
                if e.kind() == ConnectionReset {
                    continue;
                }

                log::warn!("udp socket receive error: {:?}", e);
                break;
            }
        };

        log::trace!("udp socket receive: size={}, addr={:?}", size, remote);
        callback(Datagram {
            data: Bytes::copy_from_slice(&buf[..size]),
            remote,
        });
    }
}
