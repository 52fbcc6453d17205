use crate::{
    codec::SegmentCodec,
    config::Config,
    error::{Result, SmuxError},
    lifecycle::{terminated, DuplexState, Lifecycle},
    reader::{Dispatch, Reader},
    segment::Segment,
    state::{SessionState, WindowStats},
    writer::Writer,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};

/// Work for the send loop, processed strictly in order.
#[derive(Debug)]
enum Outbound {
    Segment(Segment),
    /// Flush everything queued before, then shut the transport's write half.
    Close,
}

/// One smux stream running over a byte transport.
///
/// The application side is [`write`](SmuxDuplex::write) and
/// [`recv`](SmuxDuplex::recv); the transport side is driven by two background
/// tasks spawned in [`new`](SmuxDuplex::new). A fatal error on either side
/// stops both.
///
/// ```no_run
/// use smux_duplex::{Config, SmuxDuplex};
///
/// # async fn run(socket: tokio::net::TcpStream) -> smux_duplex::Result<()> {
/// let duplex = SmuxDuplex::new(socket, Config::default()).await?;
/// duplex.write(&b"hello"[..])?;
/// while let Some(data) = duplex.recv().await? {
///     println!("{} bytes", data.len());
/// }
/// duplex.close().await
/// # }
/// ```
#[derive(Debug)]
pub struct SmuxDuplex {
    inner: Arc<DuplexInner>,
    data_rx: flume::Receiver<Bytes>,
}

/// State shared between the handle and its background tasks
#[derive(Debug)]
struct DuplexInner {
    /// Counters and reassembly buffer; never locked across an await
    state: Mutex<SessionState>,
    lifecycle: Lifecycle,
    reader: Reader,
    writer: Writer,
    /// Sender for outgoing segments (to send_loop)
    outbound_tx: flume::Sender<Outbound>,
    fin_sent: AtomicBool,
}

impl SmuxDuplex {
    /// Queues the opening handshake and starts driving `transport`.
    pub async fn new<T>(transport: T, config: Config) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;

        let (read_half, write_half) = tokio::io::split(transport);
        let chunks = FramedRead::new(read_half, BytesCodec::new());
        let sink = FramedWrite::new(write_half, SegmentCodec::new());

        let (outbound_tx, outbound_rx) = flume::unbounded();
        let (data_tx, data_rx) = flume::unbounded();

        let inner = Arc::new(DuplexInner {
            state: Mutex::new(SessionState::new(&config)),
            lifecycle: Lifecycle::new(),
            reader: Reader::new(),
            writer: Writer::new(),
            outbound_tx,
            fin_sent: AtomicBool::new(false),
        });

        inner.open()?;

        let recv_inner = Arc::clone(&inner);
        tokio::spawn(recv_loop(chunks, recv_inner, data_tx));

        let send_inner = Arc::clone(&inner);
        tokio::spawn(send_loop(sink, outbound_rx, send_inner));

        inner.lifecycle.advance(DuplexState::Active);

        Ok(Self { inner, data_rx })
    }

    #[inline]
    pub fn stream_id(&self) -> u32 {
        self.inner.stream_id()
    }

    pub fn state(&self) -> DuplexState {
        self.inner.lifecycle.current()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn stats(&self) -> WindowStats {
        self.inner.lock_state().stats()
    }

    /// Sends `data` as one PSH segment.
    ///
    /// [`SmuxError::PeerWindowOverflow`] means the peer has not acknowledged
    /// enough yet; the duplex stays usable and the caller decides when to
    /// retry.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        let current = self.state();
        if !current.is_writable() {
            return Err(current.unusable());
        }

        let mut state = self.inner.lock_state();
        if self.inner.fin_sent.load(Ordering::Acquire) {
            return Err(SmuxError::Closed);
        }

        let segment = self.inner.writer.on_write(&mut state, data.into())?;
        // Queue under the lock so segments leave in the order they were counted
        self.inner.queue(Outbound::Segment(segment))
    }

    /// Next fragment from the peer.
    ///
    /// `Ok(None)` once the peer sent FIN or the duplex closed cleanly. After
    /// a fatal error, fragments delivered before it are still returned, then
    /// [`SmuxError::Aborted`].
    pub async fn recv(&self) -> Result<Option<Bytes>> {
        match self.data_rx.recv_async().await {
            Ok(data) => Ok(Some(data)),
            Err(_) => match self.state() {
                DuplexState::Errored(e) => Err(SmuxError::Aborted(e)),
                _ => Ok(None),
            },
        }
    }

    /// Ends our sending direction with a FIN. Receiving is unaffected.
    pub fn finish(&self) -> Result<()> {
        let current = self.state();
        if current.is_terminal() {
            return Err(current.unusable());
        }

        self.inner.send_fin()
    }

    /// Closes gracefully: FIN if not yet sent, flush, shut the transport down.
    pub async fn close(&self) -> Result<()> {
        if self.inner.lifecycle.advance(DuplexState::Closing) {
            let queued = self
                .inner
                .send_fin()
                .and_then(|_| self.inner.queue(Outbound::Close));

            if queued.is_err() {
                self.inner.lifecycle.close();
            }
        }

        self.closed().await
    }

    /// Resolves when the duplex is closed or has failed.
    pub async fn closed(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.subscribe();
        terminated(&mut lifecycle).await;
        self.inner.lifecycle.outcome()
    }

    /// Fails the duplex with `reason`, stopping both directions.
    pub fn abort(&self, reason: SmuxError) {
        tracing::debug!("Aborting stream {}: {}", self.inner.stream_id(), reason);
        self.inner.lifecycle.fail(reason);
    }
}

impl Drop for SmuxDuplex {
    fn drop(&mut self) {
        self.inner.lifecycle.close();
    }
}

impl DuplexInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must not be called while the state lock is held.
    fn stream_id(&self) -> u32 {
        self.lock_state().stream_id()
    }

    fn queue(&self, outbound: Outbound) -> Result<()> {
        self.outbound_tx
            .send(outbound)
            .map_err(|_| SmuxError::Closed)
    }

    fn open(&self) -> Result<()> {
        let state = self.lock_state();
        for segment in self.writer.handshake(&state) {
            self.queue(Outbound::Segment(segment))?;
        }
        tracing::debug!("Handshake queued for stream {}", state.stream_id());
        drop(state);

        self.lifecycle.advance(DuplexState::Open);
        Ok(())
    }

    fn send_fin(&self) -> Result<()> {
        let state = self.lock_state();
        if self.fin_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::debug!("Sending FIN for stream {}", state.stream_id());
        self.queue(Outbound::Segment(self.writer.fin(&state)))
    }

    /// Hands one reader side effect to the application or the transport.
    fn route(&self, dispatch: Dispatch, data_tx: &mut Option<flume::Sender<Bytes>>) {
        match dispatch {
            Dispatch::Data(data) => match data_tx {
                Some(tx) => {
                    if tx.send(data).is_err() {
                        tracing::trace!("Application receiver dropped");
                    }
                }
                None => {
                    tracing::warn!(
                        "Dropping {} bytes received after FIN on stream {}",
                        data.len(),
                        self.stream_id()
                    );
                }
            },
            Dispatch::Fin => {
                tracing::debug!("Peer finished stream {}", self.stream_id());
                // Dropping the sender is the end-of-data signal
                data_tx.take();
            }
            Dispatch::Reply(segment) => {
                if self.queue(Outbound::Segment(segment)).is_err() {
                    tracing::trace!("Reply dropped, send loop gone");
                }
            }
        }
    }
}

/// Background task that feeds transport chunks through the reader
async fn recv_loop<T>(
    mut chunks: FramedRead<ReadHalf<T>, BytesCodec>,
    inner: Arc<DuplexInner>,
    data_tx: flume::Sender<Bytes>,
) where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut data_tx = Some(data_tx);
    let mut lifecycle = inner.lifecycle.subscribe();
    let mut dispatched = Vec::new();

    loop {
        tokio::select! {
            chunk = chunks.next() => {
                match chunk {
                    Some(Ok(chunk)) => {
                        let result = {
                            let mut state = inner.lock_state();
                            inner.reader.on_chunk(&mut state, &chunk, &mut dispatched)
                        };

                        // Segments before a failure are still delivered
                        for dispatch in dispatched.drain(..) {
                            inner.route(dispatch, &mut data_tx);
                        }

                        if let Err(e) = result {
                            tracing::error!(
                                "Inbound error on stream {}: {}",
                                inner.stream_id(),
                                e
                            );
                            inner.lifecycle.fail(e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("Transport read error: {}", e);
                        inner.lifecycle.fail(e.into());
                        break;
                    }
                    None => {
                        tracing::info!("Transport closed");
                        inner.lifecycle.close();
                        break;
                    }
                }
            }
            _ = terminated(&mut lifecycle) => {
                tracing::info!("recv_loop shutting down");
                break;
            }
        }
    }
}

/// Background task that writes queued segments to the transport
async fn send_loop<T>(
    mut sink: FramedWrite<WriteHalf<T>, SegmentCodec>,
    outbound_rx: flume::Receiver<Outbound>,
    inner: Arc<DuplexInner>,
) where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut lifecycle = inner.lifecycle.subscribe();

    loop {
        tokio::select! {
            result = outbound_rx.recv_async() => {
                match result {
                    Ok(Outbound::Segment(segment)) => {
                        tracing::trace!(
                            "-> {:?} stream={} len={}",
                            segment.cmd(),
                            segment.stream_id(),
                            segment.fragment_size()
                        );
                        if let Err(e) = sink.send(segment).await {
                            tracing::error!("Segment send error: {}", e);
                            inner.lifecycle.fail(e);
                            break;
                        }
                    }
                    Ok(Outbound::Close) => {
                        if let Err(e) = sink.close().await {
                            tracing::error!("Transport shutdown error: {}", e);
                            inner.lifecycle.fail(e);
                            break;
                        }
                        inner.lifecycle.close();
                        break;
                    }
                    Err(_) => {
                        tracing::info!("Segment sender closed");
                        break;
                    }
                }
            }
            _ = terminated(&mut lifecycle) => {
                tracing::info!("send_loop shutting down");
                break;
            }
        }
    }
}
