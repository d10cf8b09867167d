use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::Config;
use crate::observer::Observer;
use crate::sequencer::{self, Shared};
use crate::source::UdpSource;
use crate::statistics::{Counts, Statistics};
use crate::stream::FrameStream;
use crate::uri::Uri;
use crate::{Error, Result};

/// Rtp listener.
///
/// Binds a udp endpoint, reorders incoming rtp packets by their 16 bit
/// sequence number and exposes marker-delimited frames, either one by
/// one through [`next_frame`](Listener::next_frame) or as a continuous
/// byte stream through [`stream`](Listener::stream).
///
/// # Example
///
/// ```no_run
/// use rtp_listener::Listener;
///
/// #[tokio::main]
/// async fn main() -> rtp_listener::Result<()> {
///     let listener = Listener::open("udp://@239.255.42.42:5004").await?;
///
///     loop {
///         if let Some(frame) = listener.next_frame() {
///             println!("frame: {} bytes", frame.len());
///         }
///     }
/// }
/// ```
pub struct Listener<T = ()> {
    config: Config,
    source: UdpSource,
    shared: Arc<Shared>,
    observer: Arc<T>,
    statistics: Statistics,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Listener<()> {
    /// Bind with the default configuration and no observer.
    ///
    /// Does not start listening.
    pub async fn bind(local: SocketAddr) -> Result<Self> {
        Self::with_observer(local, Config::default(), ()).await
    }

    /// Open a listener from a `udp://[bind_ip]@[join_ip][:port]` uri and
    /// start it.
    ///
    /// Missing pieces of the uri default to any / any / 1234. When the
    /// join address falls in the multicast range (224.0.0.0/4) the group
    /// is joined after startup.
    pub async fn open(uri: &str) -> Result<Self> {
        Self::open_with(uri, Config::default(), ()).await
    }
}

impl<T: Observer + 'static> Listener<T> {
    /// Bind a listener with an explicit configuration and observer.
    ///
    /// Does not start listening.
    pub async fn with_observer(
        local: SocketAddr,
        config: Config,
        observer: T,
    ) -> Result<Self> {
        let source = UdpSource::bind(local, &config).await?;
        Ok(Self {
            shared: Arc::new(Shared::new()),
            observer: Arc::new(observer),
            statistics: Statistics::default(),
            worker: Mutex::new(None),
            source,
            config,
        })
    }

    /// [`open`](Listener::open) with an explicit configuration and
    /// observer.
    pub async fn open_with(uri: &str, config: Config, observer: T) -> Result<Self> {
        let uri: Uri = uri.parse()?;
        let listener = Self::with_observer(
            SocketAddr::from((uri.bind, uri.port)),
            config,
            observer,
        )
        .await?;

        listener.start_listening()?;
        if uri.join.is_multicast() {
            listener.source.join_multicast(uri.join.into(), None)?;
        }

        Ok(listener)
    }

    /// Start the datagram source and the sequencing worker.
    ///
    /// Must be called from within a tokio runtime; the receive loop runs
    /// as a task on it. The sequencing worker is a dedicated thread and
    /// consumers do not need the runtime.
    pub fn start_listening(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::InvalidState("listener is already started"));
        }

        // a receive callback racing with the previous shutdown may have
        // slipped a packet in after the teardown cleared the queues
        self.shared.clear();
        self.shared.start();

        {
            let shared = self.shared.clone();
            let observer = self.observer.clone();
            let statistics = self.statistics.clone();
            if let Err(e) = self.source.start(move |datagram| {
                sequencer::ingest(&shared, observer.as_ref(), &statistics, datagram);
            }) {
                self.shared.shutdown();
                return Err(e);
            }
        }

        let shared = self.shared.clone();
        let observer = self.observer.clone();
        let statistics = self.statistics.clone();
        let verify_payload_type = self.config.verify_payload_type;
        let max_buffered = self.config.max_buffered;
        *worker = Some(std::thread::spawn(move || {
            sequencer::run(
                shared,
                observer,
                statistics,
                verify_payload_type,
                max_buffered,
            )
        }));

        if let Ok(local) = self.source.local_addr() {
            log::info!("rtp listener started: bind={}", local);
        }

        Ok(())
    }
}

impl<T> Listener<T> {
    /// Stop the sequencing worker and the datagram source, discarding
    /// any queued packets.
    ///
    /// Stopping a listener that is not started is an error. Dropping the
    /// listener shuts it down idempotently instead.
    pub fn stop_listening(&self) -> Result<()> {
        let handle = self
            .worker
            .lock()
            .take()
            .ok_or(Error::InvalidState("listener is not started"))?;

        self.shared.shutdown();
        if let Err(e) = self.source.stop() {
            log::warn!("datagram source stop failed: {:?}", e);
        }

        if handle.join().is_err() {
            log::warn!("sequencing worker panicked");
        }

        self.shared.clear();

        log::info!("rtp listener stopped");
        Ok(())
    }

    /// Remove and return the earliest sequenced packet's payload, or
    /// `None` when the sequenced queue is empty. Never blocks.
    pub fn next_payload(&self) -> Option<Bytes> {
        self.shared.next_payload()
    }

    /// Remove and return the earliest complete frame: the concatenated
    /// payloads of the sequenced packets up to and including the first
    /// marker packet. `None` when no complete frame is buffered. Never
    /// blocks.
    pub fn next_frame(&self) -> Option<Bytes> {
        self.shared.next_frame()
    }

    /// A blocking byte stream view over the reassembled frames.
    pub fn stream(&self) -> FrameStream {
        FrameStream::new(self.shared.clone(), &self.config)
    }

    pub fn statistics(&self) -> Counts {
        self.statistics.counts()
    }

    /// The underlying datagram source, for multicast membership and
    /// socket option access.
    pub fn source(&self) -> &UdpSource {
        &self.source
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.source.local_addr()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            let _ = self.stop_listening();
        }
    }
}
