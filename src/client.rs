use crate::config::DeviceConfig;
use crate::connection::{Connection, Endpoint};
use crate::error::{AzmError, Result};
use crate::protocol::{Format, ParamRequest, ParamUpdate, Request};
use crate::subscription::{Callback, SubscriptionTable};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Client for one Atlas AZM4/AZM8 device
///
/// The `AzmClient` owns the TCP control stream and the UDP meter endpoint,
/// sends control messages and routes incoming parameter updates to the
/// callback registered for each parameter name.
pub struct AzmClient {
    config: DeviceConfig,
    subscriptions: Arc<SubscriptionTable>,
    connected: Arc<AtomicBool>,
    link: Mutex<Option<Connection>>,
}

impl AzmClient {
    /// Create a client without connecting
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            subscriptions: Arc::new(SubscriptionTable::new()),
            connected: Arc::new(AtomicBool::new(false)),
            link: Mutex::new(None),
        }
    }

    /// Create a client and connect it
    ///
    /// # Example
    ///
    /// ```no_run
    /// use atlas_azm::{AzmClient, DeviceConfig, Format};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = AzmClient::open(DeviceConfig::new("192.168.1.50")).await?;
    ///     client.set("ZoneMute_0", 1, Format::Val).await?;
    ///     client.disconnect().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(config: DeviceConfig) -> Result<Self> {
        let client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }

    /// Get the device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Get the host and ports this client connects to
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.config.host.clone(),
            tcp_port: self.config.tcp_port,
            udp_port: self.config.udp_port,
        }
    }

    /// Establish the TCP and UDP channels.
    ///
    /// On failure nothing is left half open and the client stays disconnected.
    pub async fn connect(&self) -> Result<()> {
        self.disconnect_link().await;

        match Connection::open(
            &self.endpoint(),
            self.subscriptions.clone(),
            self.connected.clone(),
            self.config.settle_delay(),
            self.config.keepalive_interval(),
        )
        .await
        {
            Ok(connection) => {
                *self.link_guard() = Some(connection);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to connect: {}", e);
                self.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Close all connections. Safe to call any number of times.
    pub async fn disconnect(&self) {
        self.disconnect_link().await;
        self.subscriptions.clear();
        tracing::info!("Disconnected from Atlas AZM at {}", self.config.host);
    }

    async fn disconnect_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let link = self.link_guard().take();
        if let Some(connection) = link {
            connection.close().await;
        }
    }

    /// Check if both channels are open and healthy
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Set a parameter value
    pub async fn set(&self, param: &str, value: impl Into<Value>, fmt: Format) -> Result<()> {
        self.send(Request::set(param, value, fmt)).await
    }

    /// Bump a parameter value (increment/decrement)
    pub async fn bump(&self, param: &str, delta: impl Into<Value>, fmt: Format) -> Result<()> {
        self.send(Request::bump(param, delta, fmt)).await
    }

    /// Request a parameter value once.
    ///
    /// The reply arrives through the subscription callback, if there is one.
    pub async fn get(&self, param: &str, fmt: Format) -> Result<()> {
        self.send(Request::get(param, fmt)).await
    }

    /// Subscribe to parameter updates
    pub async fn subscribe<F>(&self, param: &str, fmt: Format, callback: F) -> Result<()>
    where
        F: Fn(&str, &ParamUpdate) + Send + Sync + 'static,
    {
        self.subscribe_multiple(&[ParamRequest::new(param, fmt)], callback)
            .await
    }

    /// Subscribe to several parameters with one message and one shared callback
    pub async fn subscribe_multiple<F>(&self, params: &[ParamRequest], callback: F) -> Result<()>
    where
        F: Fn(&str, &ParamUpdate) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);

        // Register first so a reply racing the send is not lost.
        let previous: Vec<Option<Callback>> = params
            .iter()
            .map(|p| self.subscriptions.insert(p.param.clone(), callback.clone()))
            .collect();

        let request = match params {
            [single] => Request::subscribe(&single.param, single.fmt),
            _ => Request::subscribe_many(params),
        };

        if let Err(e) = self.send(request).await {
            for (p, previous) in params.iter().zip(previous).rev() {
                self.subscriptions.restore(&p.param, &callback, previous);
            }
            return Err(e);
        }

        tracing::debug!(
            "Subscribed to {} parameters: {:?}",
            params.len(),
            params.iter().map(|p| p.param.as_str()).collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Unsubscribe from parameter updates.
    ///
    /// The local registration is always removed, even when the link is down.
    pub async fn unsubscribe(&self, param: &str, fmt: Format) {
        self.subscriptions.remove(param);

        match self.send(Request::unsubscribe(param, fmt)).await {
            Ok(()) => tracing::debug!("Unsubscribed from {}", param),
            Err(e) => tracing::debug!(
                "Could not notify device of unsubscribe from {} (already removed locally): {}",
                param,
                e
            ),
        }
    }

    /// Check if a callback is registered for a parameter
    pub fn is_subscribed(&self, param: &str) -> bool {
        self.subscriptions.contains(param)
    }

    /// Get the number of subscribed parameters
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    #[cfg(test)]
    pub(crate) fn udp_local_addr(&self) -> Option<std::net::SocketAddr> {
        self.link_guard().as_ref().map(Connection::udp_local_addr)
    }

    async fn send(&self, request: Request) -> Result<()> {
        let writer = self
            .link_guard()
            .as_ref()
            .map(Connection::writer)
            .ok_or(AzmError::NotConnected)?;
        writer.send(&request).await
    }

    fn link_guard(&self) -> MutexGuard<'_, Option<Connection>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::{TcpListener, UdpSocket};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// In-process stand-in for the mixer
    pub(crate) struct FakeDevice {
        listener: TcpListener,
        pub(crate) udp: UdpSocket,
    }

    /// The device side of an accepted TCP connection
    pub(crate) struct DeviceSession {
        lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl FakeDevice {
        pub(crate) async fn start() -> Self {
            Self {
                listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
                udp: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            }
        }

        pub(crate) fn config(&self) -> DeviceConfig {
            DeviceConfig::builder("127.0.0.1")
                .tcp_port(self.listener.local_addr().unwrap().port())
                .udp_port(self.udp.local_addr().unwrap().port())
                .settle_delay(Duration::ZERO)
                .build()
        }

        pub(crate) async fn accept(&self) -> DeviceSession {
            let (stream, _) = timeout(WAIT, self.listener.accept()).await.unwrap().unwrap();
            let (reader, writer) = stream.into_split();
            DeviceSession {
                lines: BufReader::new(reader).lines(),
                writer,
            }
        }

        /// Send a datagram to the client's UDP endpoint
        pub(crate) async fn push_udp(&self, client: &AzmClient, payload: &str) {
            let port = client.udp_local_addr().unwrap().port();
            self.udp
                .send_to(payload.as_bytes(), ("127.0.0.1", port))
                .await
                .unwrap();
        }
    }

    impl DeviceSession {
        pub(crate) async fn recv(&mut self) -> Value {
            let line = timeout(WAIT, self.lines.next_line())
                .await
                .expect("timed out waiting for a request")
                .unwrap()
                .expect("client closed the connection");
            serde_json::from_str(&line).unwrap()
        }

        pub(crate) async fn push(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        pub(crate) async fn closed(&mut self) -> bool {
            matches!(timeout(WAIT, self.lines.next_line()).await, Ok(Ok(None)) | Ok(Err(_)))
        }
    }

    /// Connect a client to a fresh fake device
    pub(crate) async fn connected_pair() -> (FakeDevice, DeviceSession, AzmClient) {
        let device = FakeDevice::start().await;
        let client = AzmClient::new(device.config());
        let (connected, session) = tokio::join!(client.connect(), device.accept());
        connected.unwrap();
        (device, session, client)
    }

    type Seen = Arc<StdMutex<Vec<(String, Value)>>>;

    fn recording(seen: &Seen) -> impl Fn(&str, &ParamUpdate) + Send + Sync + 'static {
        let seen = seen.clone();
        move |param: &str, update: &ParamUpdate| {
            seen.lock()
                .unwrap()
                .push((param.to_string(), Value::Object(update.fields().clone())));
        }
    }

    async fn wait_for(seen: &Seen, count: usize) {
        timeout(WAIT, async {
            while seen.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for callbacks");
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_twice() {
        let (_device, mut session, client) = connected_pair().await;
        assert!(client.is_connected());

        client.disconnect().await;
        assert!(!client.is_connected());
        client.disconnect().await;
        assert!(!client.is_connected());

        assert!(session.closed().await);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_client_disconnected() {
        // Grab a free port, then release it so nothing is listening there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = AzmClient::new(
            DeviceConfig::builder("127.0.0.1")
                .tcp_port(port)
                .settle_delay(Duration::ZERO)
                .build(),
        );

        let err = client.connect().await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(!client.is_connected());
        assert!(matches!(
            client.set("ZoneMute_0", 1, Format::Val).await,
            Err(AzmError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_set_bump_get_wire_format() {
        let (_device, mut session, client) = connected_pair().await;

        client.set("ZoneMute_0", 0, Format::Val).await.unwrap();
        assert_eq!(
            session.recv().await,
            serde_json::json!({"jsonrpc": "2.0", "method": "set", "params": {"param": "ZoneMute_0", "val": 0}})
        );

        client.bump("ZoneGain_1", -5, Format::Pct).await.unwrap();
        let bump = session.recv().await;
        assert_eq!(bump["method"], "bmp");
        assert_eq!(bump["params"]["pct"], -5);

        client.get("ZoneName_1", Format::Str).await.unwrap();
        let get = session.recv().await;
        assert_eq!(get["method"], "get");
        assert_eq!(get["params"]["fmt"], "str");

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_subscribe_multiple_round_trip() {
        let (_device, mut session, client) = connected_pair().await;
        let seen: Seen = Arc::default();

        client
            .subscribe_multiple(
                &[ParamRequest::new("A", Format::Val), ParamRequest::new("B", Format::Str)],
                recording(&seen),
            )
            .await
            .unwrap();

        let sub = session.recv().await;
        assert_eq!(sub["method"], "sub");
        assert_eq!(sub["params"].as_array().map(Vec::len), Some(2));

        session.push(r#"{"method":"update","params":{"param":"A","val":3}}"#).await;
        session.push(r#"{"method":"update","params":{"param":"B","str":"Lounge"}}"#).await;
        wait_for(&seen, 2).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "A");
        assert_eq!(seen[0].1, serde_json::json!({"param": "A", "val": 3}));
        assert_eq!(seen[1].0, "B");
        assert_eq!(seen[1].1, serde_json::json!({"param": "B", "str": "Lounge"}));

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_resubscribe_routes_to_latest_callback() {
        let (_device, mut session, client) = connected_pair().await;
        let first: Seen = Arc::default();
        let second: Seen = Arc::default();

        client.subscribe("P", Format::Val, recording(&first)).await.unwrap();
        client.subscribe("P", Format::Pct, recording(&second)).await.unwrap();
        assert_eq!(client.subscription_count(), 1);
        session.recv().await;
        session.recv().await;

        session.push(r#"{"method":"update","params":{"param":"P","pct":40}}"#).await;
        wait_for(&second, 1).await;
        assert!(first.lock().unwrap().is_empty());

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_stop_listener() {
        let (_device, mut session, client) = connected_pair().await;
        let seen: Seen = Arc::default();
        client.subscribe("A", Format::Val, recording(&seen)).await.unwrap();
        session.recv().await;

        session.push("{not json").await;
        session.push(r#"{"method":"error","params":{"message":"bad param"}}"#).await;
        session.push(r#"{"method":"getResp","params":[{"param":"Ghost","val":1},{"param":"A","val":7}]}"#).await;
        wait_for(&seen, 1).await;

        assert_eq!(seen.lock().unwrap()[0].1["val"], 7);
        assert!(client.is_connected());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_udp_updates_are_routed() {
        let (device, mut session, client) = connected_pair().await;
        let seen: Seen = Arc::default();
        client.subscribe("SourceMeter_0", Format::Val, recording(&seen)).await.unwrap();
        session.recv().await;

        device.push_udp(&client, "garbage").await;
        device
            .push_udp(&client, r#"{"method":"update","params":{"param":"SourceMeter_0","val":-18.5}}"#)
            .await;
        wait_for(&seen, 1).await;

        assert_eq!(seen.lock().unwrap()[0].1["val"], -18.5);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_without_link_still_removes() {
        let (_device, mut session, client) = connected_pair().await;
        client.subscribe("A", Format::Val, |_: &str, _: &ParamUpdate| {}).await.unwrap();
        session.recv().await;

        // Simulate a dropped link without clearing the table.
        client.disconnect_link().await;
        assert!(client.is_subscribed("A"));

        client.unsubscribe("A", Format::Val).await;
        assert!(!client.is_subscribed("A"));
    }

    #[tokio::test]
    async fn test_unsubscribe_sends_unsub() {
        let (_device, mut session, client) = connected_pair().await;
        client.subscribe("A", Format::Val, |_: &str, _: &ParamUpdate| {}).await.unwrap();
        session.recv().await;

        client.unsubscribe("A", Format::Val).await;
        let unsub = session.recv().await;
        assert_eq!(unsub["method"], "unsub");
        assert_eq!(unsub["params"]["param"], "A");
        assert_eq!(client.subscription_count(), 0);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_failed_subscribe_is_rolled_back() {
        let client = AzmClient::new(DeviceConfig::new("127.0.0.1"));
        let result = client.subscribe("A", Format::Val, |_: &str, _: &ParamUpdate| {}).await;
        assert!(matches!(result, Err(AzmError::NotConnected)));
        assert!(!client.is_subscribed("A"));
    }

    #[tokio::test]
    async fn test_failed_resubscribe_keeps_working_callback() {
        let (device, mut session, client) = connected_pair().await;
        let first: Seen = Arc::default();
        let second: Seen = Arc::default();
        client.subscribe("A", Format::Val, recording(&first)).await.unwrap();
        session.recv().await;

        // Drop the link but keep the routing table.
        client.disconnect_link().await;
        let result = client.subscribe("A", Format::Pct, recording(&second)).await;
        assert!(matches!(result, Err(AzmError::NotConnected)));
        assert!(client.is_subscribed("A"));

        let (connected, mut session) = tokio::join!(client.connect(), device.accept());
        connected.unwrap();
        session.push(r#"{"method":"update","params":{"param":"A","val":4}}"#).await;
        wait_for(&first, 1).await;
        assert!(second.lock().unwrap().is_empty());

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_failure_marks_disconnected() {
        let (_device, session, client) = connected_pair().await;
        drop(session);

        // The first writes after the peer closes may still be buffered.
        let err = timeout(WAIT, async {
            loop {
                match client.set("ZoneMute_0", 1, Format::Val).await {
                    Ok(()) => tokio::time::sleep(Duration::from_millis(5)).await,
                    Err(e) => break e,
                }
            }
        })
        .await
        .expect("send never failed after the device closed");

        assert!(matches!(err, AzmError::ConnectionLost(_)));
        assert!(err.is_connectivity());
        assert!(!client.is_connected());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_device_close_marks_disconnected() {
        let (_device, session, client) = connected_pair().await;
        drop(session);

        timeout(WAIT, async {
            while client.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client never noticed the closed stream");
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_keepalive_reads_status_param() {
        let device = FakeDevice::start().await;
        let mut config = device.config();
        config.keepalive_interval_ms = 50;
        let client = AzmClient::new(config);
        let (connected, mut session) = tokio::join!(client.connect(), device.accept());
        connected.unwrap();

        let ping = session.recv().await;
        assert_eq!(ping["method"], "get");
        assert_eq!(ping["params"], serde_json::json!({"param": "KeepAlive", "fmt": "str"}));
        client.disconnect().await;
    }
}
