use crate::metrics::{
    BRIDGE_CONNECTED, MESSAGES_ACKED, MESSAGES_DROPPED, MESSAGES_PUBLISHED, MESSAGES_REDELIVERED,
};
use crate::payload::{PayloadError, PayloadTemplate};
use crate::protocol::{
    HelloMsg, IncomingMessage, ProtocolVersion, QoS, TelemetryMsg, DEFAULT_TOPIC,
};
use engine_core::{LatestReading, Reading, TimeBase};
use rand::Rng;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Longest partial line kept from the subscriber before it is disconnected.
const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: String,
    pub topic: String,
    pub qos: QoS,
    pub require_handshake: bool,
    /// How long a QoS 1 message waits for its ack before being sent again.
    pub ack_timeout: Duration,
    pub max_redeliveries: u32,
    /// Unacked messages kept at once; the oldest is dropped beyond this.
    pub max_in_flight: usize,
    pub template: PayloadTemplate,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            qos: QoS::AtMostOnce,
            require_handshake: false,
            ack_timeout: Duration::from_secs(2),
            max_redeliveries: 3,
            max_in_flight: 64,
            template: PayloadTemplate::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to configure listener: {0}")]
    Listener(#[source] std::io::Error),
}

#[derive(Debug)]
struct InboundState {
    handshake_seen: bool,
    client_id: Option<String>,
}

impl InboundState {
    fn new() -> Self {
        Self {
            handshake_seen: false,
            client_id: None,
        }
    }

    fn reset(&mut self) {
        self.handshake_seen = false;
        self.client_id = None;
    }

    fn note_handshake(&mut self, hello: &HelloMsg) {
        self.handshake_seen = true;
        self.client_id = hello.client_id.clone();
    }
}

#[derive(Debug)]
struct InFlight {
    msg: TelemetryMsg,
    sent_at: Instant,
    redeliveries: u32,
}

/// Delivery bookkeeping: sequence numbers, message ids, and the QoS 1
/// in-flight queue ordered by send time.
#[derive(Debug)]
struct Outbox {
    qos: QoS,
    ack_timeout: Duration,
    max_redeliveries: u32,
    max_in_flight: usize,
    sequence: u64,
    in_flight: VecDeque<InFlight>,
}

impl Outbox {
    fn new(config: &BridgeConfig) -> Self {
        Self {
            qos: config.qos,
            ack_timeout: config.ack_timeout,
            max_redeliveries: config.max_redeliveries,
            max_in_flight: config.max_in_flight.max(1),
            sequence: 0,
            in_flight: VecDeque::new(),
        }
    }

    /// Random non-zero id not used by any in-flight message.
    fn next_message_id(&self) -> u32 {
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.gen_range(1..=u32::MAX);
            if !self.in_flight.iter().any(|f| f.msg.message_id == id) {
                return id;
            }
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Record a first delivery. QoS 1 messages stay queued until acked.
    fn sent(&mut self, msg: &TelemetryMsg, now: Instant) {
        MESSAGES_PUBLISHED.inc();
        if self.qos != QoS::AtLeastOnce {
            return;
        }
        if self.in_flight.len() >= self.max_in_flight {
            if let Some(evicted) = self.in_flight.pop_front() {
                MESSAGES_DROPPED.inc();
                warn!(
                    message_id = evicted.msg.message_id,
                    in_flight = self.max_in_flight,
                    "In-flight queue full, dropping oldest message"
                );
            }
        }
        self.in_flight.push_back(InFlight {
            msg: msg.clone(),
            sent_at: now,
            redeliveries: 0,
        });
    }

    fn ack(&mut self, message_id: u32) -> bool {
        match self.in_flight.iter().position(|f| f.msg.message_id == message_id) {
            Some(pos) => {
                self.in_flight.remove(pos);
                MESSAGES_ACKED.inc();
                true
            }
            None => false,
        }
    }

    /// The next message whose ack timed out, marked as a duplicate. Messages
    /// that used up their redeliveries are dropped on the way.
    fn due(&mut self, now: Instant) -> Option<TelemetryMsg> {
        loop {
            let front = self.in_flight.front()?;
            if now.duration_since(front.sent_at) < self.ack_timeout {
                return None;
            }
            let mut entry = self.in_flight.pop_front()?;
            if entry.redeliveries >= self.max_redeliveries {
                MESSAGES_DROPPED.inc();
                warn!(
                    message_id = entry.msg.message_id,
                    redeliveries = entry.redeliveries,
                    "Message not acknowledged, dropping"
                );
                continue;
            }
            entry.redeliveries += 1;
            entry.sent_at = now;
            entry.msg.dup = true;
            MESSAGES_REDELIVERED.inc();
            let msg = entry.msg.clone();
            self.in_flight.push_back(entry);
            return Some(msg);
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

fn telemetry_msg(
    reading: &Reading,
    config: &BridgeConfig,
    sequence: u64,
    message_id: u32,
    unix_us: u64,
) -> Result<TelemetryMsg, PayloadError> {
    Ok(TelemetryMsg {
        msg_type: "telemetry",
        protocol_version: ProtocolVersion::v1(),
        sequence,
        message_id,
        qos: config.qos.level(),
        dup: false,
        topic: config.topic.clone(),
        timestamp_us: reading.timestamp_us,
        unix_us,
        tick: reading.tick,
        phase: reading.phase.as_str(),
        running: reading.running(),
        payload: config.template.render(reading)?,
    })
}

/// Drain complete lines from the front of `buf`, trimmed and non-empty.
/// A trailing partial line stays buffered.
fn take_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line = buf.drain(..=pos).collect::<Vec<u8>>();
        if let Ok(text) = std::str::from_utf8(&line) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }
    lines
}

fn encode_line(msg: &TelemetryMsg) -> Option<Vec<u8>> {
    match serde_json::to_vec(msg) {
        Ok(mut line) => {
            line.push(b'\n');
            Some(line)
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode telemetry message");
            None
        }
    }
}

/// Line-delimited JSON publisher serving one subscriber at a time.
pub struct Bridge {
    listener: TcpListener,
    config: BridgeConfig,
}

impl Bridge {
    pub fn bind(config: BridgeConfig) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(&config.bind_addr).map_err(|source| BridgeError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(BridgeError::Listener)?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Publish each new reading from `latest` until `stop` is raised.
    pub fn run(self, latest: Arc<LatestReading>, timebase: TimeBase, stop: Arc<AtomicBool>) {
        let Bridge { listener, config } = self;

        info!(
            addr = %config.bind_addr,
            topic = %config.topic,
            qos = config.qos.level(),
            require_handshake = config.require_handshake,
            "Bridge listening"
        );

        let mut client: Option<TcpStream> = None;
        let mut recv_buf: Vec<u8> = Vec::with_capacity(4096);
        let mut send_buf: Vec<u8> = Vec::new();
        let mut send_offset: usize = 0;
        let mut last_tick: Option<u64> = None;
        let mut outbox = Outbox::new(&config);
        let mut inbound_state = InboundState::new();

        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if client.is_none() {
                match listener.accept() {
                    Ok((stream, addr)) => match stream.set_nonblocking(true) {
                        Ok(()) => {
                            info!(client_addr = %addr, "Bridge client connected");
                            client = Some(stream);
                            BRIDGE_CONNECTED.set(1.0);
                        }
                        Err(err) => {
                            warn!(client_addr = %addr, error = %err, "Failed to configure client");
                        }
                    },
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        warn!("Bridge accept error: {}", err);
                    }
                }
            }

            let mut drop_client = false;
            if let Some(stream) = client.as_mut() {
                // Receive data
                let mut temp = [0u8; 1024];
                match stream.read(&mut temp) {
                    Ok(0) => {
                        info!("Bridge client disconnected");
                        drop_client = true;
                    }
                    Ok(n) => {
                        recv_buf.extend_from_slice(&temp[..n]);
                        for line in take_lines(&mut recv_buf) {
                            match IncomingMessage::parse(&line) {
                                Some(msg) => handle_incoming(
                                    msg,
                                    config.require_handshake,
                                    &mut inbound_state,
                                    &mut outbox,
                                ),
                                None => debug!(line = %line, "Ignoring unrecognised message"),
                            }
                        }
                        if recv_buf.len() > MAX_LINE_BYTES {
                            warn!(
                                buffered = recv_buf.len(),
                                limit = MAX_LINE_BYTES,
                                "Bridge client line too long, disconnecting"
                            );
                            drop_client = true;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        warn!(error = %err, "Bridge read error");
                        drop_client = true;
                    }
                }

                let may_publish = !config.require_handshake || inbound_state.handshake_seen;
                if !drop_client && send_buf.is_empty() && may_publish {
                    let now = Instant::now();
                    if let Some(msg) = outbox.due(now) {
                        debug!(message_id = msg.message_id, "Redelivering telemetry");
                        if let Some(line) = encode_line(&msg) {
                            send_buf = line;
                            send_offset = 0;
                        }
                    } else if let Some(reading) = latest.newer_than(last_tick) {
                        last_tick = Some(reading.tick);
                        let sequence = outbox.next_sequence();
                        let message_id = outbox.next_message_id();
                        match telemetry_msg(
                            &reading,
                            &config,
                            sequence,
                            message_id,
                            timebase.unix_us(),
                        ) {
                            Ok(msg) => {
                                if let Some(line) = encode_line(&msg) {
                                    outbox.sent(&msg, now);
                                    send_buf = line;
                                    send_offset = 0;
                                }
                            }
                            Err(e) => {
                                warn!(tick = reading.tick, error = %e, "Failed to render payload");
                            }
                        }
                    }
                }

                if !drop_client && !send_buf.is_empty() {
                    match stream.write(&send_buf[send_offset..]) {
                        Ok(0) => {
                            info!("Bridge client disconnected");
                            drop_client = true;
                        }
                        Ok(n) => {
                            send_offset += n;
                            if send_offset >= send_buf.len() {
                                send_buf.clear();
                                send_offset = 0;
                            }
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                        Err(err) => {
                            warn!(error = %err, "Bridge write error");
                            drop_client = true;
                        }
                    }
                }
            }

            if drop_client {
                info!(client_id = ?inbound_state.client_id, "Bridge client dropped");
                client = None;
                BRIDGE_CONNECTED.set(0.0);
                recv_buf.clear();
                send_buf.clear();
                send_offset = 0;
                inbound_state.reset();
                if outbox.in_flight() > 0 {
                    debug!(
                        in_flight = outbox.in_flight(),
                        "Keeping unacknowledged messages for the next subscriber"
                    );
                }
            }

            std::thread::sleep(Duration::from_millis(5));
        }

        BRIDGE_CONNECTED.set(0.0);
    }
}

/// Bind and serve in the calling thread.
pub fn run_bridge(
    latest: Arc<LatestReading>,
    timebase: TimeBase,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
) -> Result<(), BridgeError> {
    Bridge::bind(config)?.run(latest, timebase, stop);
    Ok(())
}

#[instrument(skip_all)]
fn handle_incoming(
    msg: IncomingMessage,
    require_handshake: bool,
    inbound_state: &mut InboundState,
    outbox: &mut Outbox,
) {
    match msg {
        IncomingMessage::Hello(hello) => {
            if !hello.protocol_version.is_supported() {
                warn!(
                    major = hello.protocol_version.major,
                    minor = hello.protocol_version.minor,
                    "Unsupported protocol version"
                );
                return;
            }
            inbound_state.note_handshake(&hello);
            info!(
                client_id = ?hello.client_id,
                capabilities = ?hello.capabilities,
                "Bridge handshake received"
            );
        }
        IncomingMessage::Ack(ack) => {
            if !ack.protocol_version.is_supported() {
                warn!(
                    major = ack.protocol_version.major,
                    minor = ack.protocol_version.minor,
                    "Unsupported protocol version"
                );
                return;
            }
            if require_handshake && !inbound_state.handshake_seen {
                warn!("Ack received before handshake");
                return;
            }
            if outbox.ack(ack.message_id) {
                debug!(message_id = ack.message_id, "Message acknowledged");
            } else {
                debug!(message_id = ack.message_id, "Ack for unknown message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::DutyPhase;

    fn qos1_config() -> BridgeConfig {
        BridgeConfig {
            qos: QoS::AtLeastOnce,
            ack_timeout: Duration::from_millis(100),
            max_redeliveries: 2,
            max_in_flight: 4,
            ..BridgeConfig::default()
        }
    }

    fn reading(tick: u64) -> Reading {
        Reading {
            tick,
            timestamp_us: 1_704_067_200_000_000 + tick * 500_000,
            phase: DutyPhase::Running,
            revolution: 1500.0,
            pressure: 4.5,
            temperature: 70.0,
        }
    }

    fn msg(outbox: &mut Outbox, config: &BridgeConfig, tick: u64) -> TelemetryMsg {
        let sequence = outbox.next_sequence();
        let id = outbox.next_message_id();
        telemetry_msg(&reading(tick), config, sequence, id, 0).unwrap()
    }

    #[test]
    fn telemetry_message_carries_reading_and_payload() {
        let config = BridgeConfig::default();
        let m = telemetry_msg(&reading(3), &config, 9, 77, 123).unwrap();
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["type"], "telemetry");
        assert_eq!(value["protocol_version"]["major"], 1);
        assert_eq!(value["sequence"], 9);
        assert_eq!(value["message_id"], 77);
        assert_eq!(value["qos"], 0);
        assert_eq!(value["dup"], false);
        assert_eq!(value["topic"], DEFAULT_TOPIC);
        assert_eq!(value["tick"], 3);
        assert_eq!(value["phase"], "running");
        assert_eq!(value["running"], true);
        assert_eq!(value["payload"][0]["revolution"], 1500.0);
    }

    #[test]
    fn qos0_keeps_nothing_in_flight() {
        let config = BridgeConfig::default();
        let mut outbox = Outbox::new(&config);
        let m = msg(&mut outbox, &config, 0);
        let now = Instant::now();
        outbox.sent(&m, now);
        assert_eq!(outbox.in_flight(), 0);
        assert!(outbox.due(now + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn ack_clears_in_flight_message() {
        let config = qos1_config();
        let mut outbox = Outbox::new(&config);
        let m = msg(&mut outbox, &config, 0);
        let now = Instant::now();
        outbox.sent(&m, now);
        assert_eq!(outbox.in_flight(), 1);
        assert!(!outbox.ack(m.message_id.wrapping_add(1)));
        assert!(outbox.ack(m.message_id));
        assert_eq!(outbox.in_flight(), 0);
        assert!(outbox.due(now + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn unacked_message_is_redelivered_then_dropped() {
        let config = qos1_config();
        let mut outbox = Outbox::new(&config);
        let m = msg(&mut outbox, &config, 0);
        let start = Instant::now();
        outbox.sent(&m, start);

        assert!(outbox.due(start + Duration::from_millis(50)).is_none());

        let first = outbox.due(start + Duration::from_millis(100)).unwrap();
        assert_eq!(first.message_id, m.message_id);
        assert_eq!(first.sequence, m.sequence);
        assert!(first.dup);

        let second = outbox.due(start + Duration::from_millis(200)).unwrap();
        assert_eq!(second.message_id, m.message_id);

        // Redeliveries exhausted
        assert!(outbox.due(start + Duration::from_millis(300)).is_none());
        assert_eq!(outbox.in_flight(), 0);
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let config = qos1_config();
        let mut outbox = Outbox::new(&config);
        let now = Instant::now();
        let mut ids = Vec::new();
        for tick in 0..5 {
            let m = msg(&mut outbox, &config, tick);
            ids.push(m.message_id);
            outbox.sent(&m, now);
        }
        assert_eq!(outbox.in_flight(), 4);
        assert!(!outbox.ack(ids[0]));
        assert!(outbox.ack(ids[4]));
    }

    #[test]
    fn message_ids_are_non_zero_and_sequences_increase() {
        let config = qos1_config();
        let mut outbox = Outbox::new(&config);
        let a = msg(&mut outbox, &config, 0);
        let b = msg(&mut outbox, &config, 1);
        assert_ne!(a.message_id, 0);
        assert_ne!(b.message_id, 0);
        assert_eq!(b.sequence, a.sequence + 1);
    }

    #[test]
    fn handshake_gates_acks_when_required() {
        let config = qos1_config();
        let mut outbox = Outbox::new(&config);
        let mut inbound = InboundState::new();
        let m = msg(&mut outbox, &config, 0);
        outbox.sent(&m, Instant::now());

        let ack = format!(r#"{{"type":"ack","message_id":{}}}"#, m.message_id);
        handle_incoming(
            IncomingMessage::parse(&ack).unwrap(),
            true,
            &mut inbound,
            &mut outbox,
        );
        assert_eq!(outbox.in_flight(), 1);

        let hello = r#"{"type":"hello","protocol_version":{"major":1,"minor":0},"client_id":"c"}"#;
        handle_incoming(
            IncomingMessage::parse(hello).unwrap(),
            true,
            &mut inbound,
            &mut outbox,
        );
        assert!(inbound.handshake_seen);
        assert_eq!(inbound.client_id.as_deref(), Some("c"));

        handle_incoming(
            IncomingMessage::parse(&ack).unwrap(),
            true,
            &mut inbound,
            &mut outbox,
        );
        assert_eq!(outbox.in_flight(), 0);
    }

    #[test]
    fn unsupported_hello_is_ignored() {
        let config = BridgeConfig::default();
        let mut outbox = Outbox::new(&config);
        let mut inbound = InboundState::new();
        let hello = r#"{"type":"hello","protocol_version":{"major":2,"minor":0}}"#;
        handle_incoming(
            IncomingMessage::parse(hello).unwrap(),
            true,
            &mut inbound,
            &mut outbox,
        );
        assert!(!inbound.handshake_seen);
    }

    #[test]
    fn take_lines_keeps_partial_tail() {
        let mut buf = b"{\"a\":1}\n\n  {\"b\":2}  \n{\"c\"".to_vec();
        let lines = take_lines(&mut buf);
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert_eq!(buf, br#"{"c""#.to_vec());
    }

    #[test]
    fn oversized_line_disconnects_client() {
        let bridge = Bridge::bind(BridgeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..BridgeConfig::default()
        })
        .unwrap();
        let addr = bridge.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_bridge = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            bridge.run(
                Arc::new(LatestReading::new()),
                TimeBase::new(),
                stop_bridge,
            )
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let chunk = vec![b'x'; 8 * 1024];
        for _ in 0..(MAX_LINE_BYTES / chunk.len() + 2) {
            if stream.write_all(&chunk).is_err() {
                break;
            }
        }

        // No reading is ever published, so the only way out of read is the
        // bridge closing the connection.
        let mut buf = [0u8; 64];
        match stream.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => panic!("unexpected {n} bytes from bridge"),
            Err(e) => assert!(
                !matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ),
                "bridge kept the client: {e}"
            ),
        }

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn bind_failure_is_reported() {
        let first = Bridge::bind(BridgeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..BridgeConfig::default()
        })
        .unwrap();
        let addr = first.local_addr().unwrap();
        let err = Bridge::bind(BridgeConfig {
            bind_addr: addr.to_string(),
            ..BridgeConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, BridgeError::Bind { .. }));
    }
}
