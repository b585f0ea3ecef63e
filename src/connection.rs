use crate::error::{AzmError, Channel, Result};
use crate::protocol::{Format, Request};
use crate::subscription::SubscriptionTable;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};

/// Status parameter read by the keepalive loop
pub const KEEPALIVE_PARAM: &str = "KeepAlive";

const MAX_DATAGRAM: usize = 65_536;

/// Host and the two ports of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub tcp_port: u16,
    pub udp_port: u16,
}

impl Endpoint {
    fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    fn udp_addr(&self) -> String {
        format!("{}:{}", self.host, self.udp_port)
    }
}

/// Line-oriented writer over the TCP write half, shared with the keepalive task
#[derive(Clone)]
pub(crate) struct LineWriter {
    stream: Arc<Mutex<Option<OwnedWriteHalf>>>,
    connected: Arc<AtomicBool>,
}

impl LineWriter {
    fn new(stream: OwnedWriteHalf, connected: Arc<AtomicBool>) -> Self {
        Self {
            stream: Arc::new(Mutex::new(Some(stream))),
            connected,
        }
    }

    /// Write one request; an I/O failure marks the link down
    pub(crate) async fn send(&self, request: &Request) -> Result<()> {
        let line = request.to_line()?;
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(AzmError::NotConnected)?;

        tracing::debug!("Sending: {}", line.trim_end());

        let written = async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = written {
            tracing::error!("Connection lost while sending message: {}", e);
            self.connected.store(false, Ordering::SeqCst);
            return Err(AzmError::ConnectionLost(e));
        }
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("TCP shutdown: {}", e);
            }
        }
    }
}

/// An open TCP + UDP link to one device and its background tasks
pub struct Connection {
    writer: LineWriter,
    connected: Arc<AtomicBool>,
    #[cfg(test)]
    udp_local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Open both channels, wait `settle`, then start the listeners and keepalive.
    ///
    /// Anything opened before a failure is dropped (and so closed) on return.
    pub async fn open(
        endpoint: &Endpoint,
        subscriptions: Arc<SubscriptionTable>,
        connected: Arc<AtomicBool>,
        settle: Duration,
        keepalive: Duration,
    ) -> Result<Self> {
        let tcp_addr = endpoint.tcp_addr();
        let stream = TcpStream::connect(&tcp_addr)
            .await
            .map_err(|source| AzmError::ConnectFailed {
                channel: Channel::Tcp,
                addr: tcp_addr.clone(),
                source,
            })?;
        tracing::info!("TCP connection established to {}", tcp_addr);

        let udp_addr = endpoint.udp_addr();
        let udp = open_udp(&udp_addr)
            .await
            .map_err(|source| AzmError::ConnectFailed {
                channel: Channel::Udp,
                addr: udp_addr.clone(),
                source,
            })?;
        #[cfg(test)]
        let udp_local_addr = udp.local_addr()?;
        tracing::info!("UDP connection established to {}", udp_addr);

        // Give the device a moment to settle after connection
        sleep(settle).await;

        let (reader, writer) = stream.into_split();
        let writer = LineWriter::new(writer, connected.clone());
        connected.store(true, Ordering::SeqCst);

        let mut tasks = vec![
            spawn_tcp_listener(reader, subscriptions.clone(), connected.clone()),
            spawn_udp_listener(Arc::new(udp), subscriptions),
        ];
        if keepalive.is_zero() {
            tracing::debug!("Keepalive disabled");
        } else {
            tasks.push(spawn_keepalive(writer.clone(), connected.clone(), keepalive));
        }

        Ok(Self {
            writer,
            connected,
            #[cfg(test)]
            udp_local_addr,
            tasks,
        })
    }

    pub(crate) fn writer(&self) -> LineWriter {
        self.writer.clone()
    }

    #[cfg(test)]
    pub(crate) fn udp_local_addr(&self) -> SocketAddr {
        self.udp_local_addr
    }

    /// Stop the background tasks and close both channels
    pub async fn close(mut self) {
        self.connected.store(false, Ordering::SeqCst);

        for handle in self.tasks.drain(..) {
            handle.abort();
            // Finished or cancelled, either way the task has released its socket.
            let _ = handle.await;
        }

        self.writer.shutdown().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for handle in &self.tasks {
            handle.abort();
        }
    }
}

async fn open_udp(addr: &str) -> std::io::Result<UdpSocket> {
    let remote = lookup_host(addr).await?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("no address for {}", addr),
        )
    })?;

    let local: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(socket)
}

/// Drain newline-delimited messages from the TCP stream
fn spawn_tcp_listener(
    reader: OwnedReadHalf,
    subscriptions: Arc<SubscriptionTable>,
    connected: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => {
                    tracing::info!("TCP connection closed by device");
                    break;
                }
                Ok(_) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    subscriptions.dispatch(&line, Channel::Tcp);
                }
                Err(e) => {
                    tracing::error!("TCP listen error: {}", e);
                    break;
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
    })
}

/// Route every datagram from the device
fn spawn_udp_listener(
    socket: Arc<UdpSocket>,
    subscriptions: Arc<SubscriptionTable>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match socket.recv(&mut buf).await {
                Ok(n) => {
                    subscriptions.dispatch(&buf[..n], Channel::Udp);
                }
                Err(e) => {
                    tracing::error!("UDP error: {}", e);
                }
            }
        }
    })
}

fn spawn_keepalive(
    writer: LineWriter,
    connected: Arc<AtomicBool>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if !connected.load(Ordering::SeqCst) {
                break;
            }
            let request = Request::get(KEEPALIVE_PARAM, Format::Str);
            if let Err(e) = writer.send(&request).await {
                tracing::error!("Keepalive error: {}", e);
            }
        }
        tracing::debug!("Keepalive stopped");
    })
}
