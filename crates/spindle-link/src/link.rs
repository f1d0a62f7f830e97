use crate::metrics::{self, StatsCursor, CLIENT_CONNECTED, CONNECTIONS, TELEMETRY_LINES};
use crate::protocol::encode_telemetry;
use crate::transport::Transport;
use spindle_core::control_loop::ControllerContext;
use spindle_core::hal::MotorIO;
use spindle_core::shutdown::ShutdownReason;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub telemetry_interval: Duration,
    /// Loop sleep while a client is attached
    pub connected_poll: Duration,
    /// Loop sleep while waiting for a client
    pub idle_poll: Duration,
    pub read_chunk: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            telemetry_interval: Duration::from_millis(500),
            connected_poll: Duration::from_millis(10),
            idle_poll: Duration::from_millis(100),
            read_chunk: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSummary {
    pub connections: u64,
    pub telemetry_lines: u64,
    pub bytes_received: u64,
}

/// Pending telemetry line and how much of it the socket has taken.
#[derive(Default)]
struct SendBuffer {
    bytes: Vec<u8>,
    offset: usize,
}

impl SendBuffer {
    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn load(&mut self, line: Vec<u8>) {
        self.bytes = line;
        self.offset = 0;
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.offset = 0;
    }

    /// Pushes what the socket accepts; `Ok(false)` means the peer is gone.
    fn flush_into<W: Write>(&mut self, stream: &mut W) -> std::io::Result<bool> {
        if self.is_empty() {
            return Ok(true);
        }
        match stream.write(&self.bytes[self.offset..]) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.offset += n;
                if self.offset >= self.bytes.len() {
                    self.clear();
                }
                Ok(true)
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }
}

/// Serves one client at a time until `stop` is raised.
///
/// The control tick runs on every iteration whether or not a client is
/// attached. The actuator is brought to the safe state on every connect, every
/// disconnect and on exit.
pub fn run_link<IO: MotorIO, T: Transport>(
    ctx: &mut ControllerContext<IO>,
    transport: &mut T,
    config: &LinkConfig,
    stop: &AtomicBool,
) -> LinkSummary {
    let mut summary = LinkSummary::default();
    let mut client: Option<T::Stream> = None;
    let mut send_buf = SendBuffer::default();
    let mut recv_buf = vec![0u8; config.read_chunk.max(1)];
    let mut last_telemetry = Instant::now();
    let mut cursor = StatsCursor::default();

    info!(
        tick_period_us = ctx.tick_period_us(),
        strategy = ctx.strategy_name(),
        "Link loop started"
    );

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        if client.is_none() {
            match transport.accept() {
                Ok(Some(accepted)) => {
                    info!(peer = %accepted.peer, "Client connected");
                    ctx.on_connect();
                    client = Some(accepted.stream);
                    send_buf.clear();
                    last_telemetry = Instant::now();
                    summary.connections += 1;
                    CONNECTIONS.inc();
                    CLIENT_CONNECTED.set(1.0);
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Accept error"),
            }
        }

        ctx.advance_io();
        if let Some(report) = ctx.service_tick() {
            metrics::record_tick(&report);
        }

        let mut dropped: Option<ShutdownReason> = None;
        if let Some(stream) = client.as_mut() {
            if send_buf.is_empty() && last_telemetry.elapsed() >= config.telemetry_interval {
                send_buf.load(encode_telemetry(ctx.smoothed_rpm()));
                last_telemetry = Instant::now();
                summary.telemetry_lines += 1;
                TELEMETRY_LINES.inc();
            }

            match send_buf.flush_into(stream) {
                Ok(true) => {}
                Ok(false) => dropped = Some(ShutdownReason::Disconnect),
                Err(err) => {
                    warn!(error = %err, "Client write error");
                    dropped = Some(ShutdownReason::TransportError);
                }
            }

            if dropped.is_none() {
                match stream.read(&mut recv_buf) {
                    Ok(0) => dropped = Some(ShutdownReason::Disconnect),
                    Ok(n) => {
                        summary.bytes_received += n as u64;
                        let parsed = ctx.feed(&recv_buf[..n]);
                        debug!(bytes = n, commands = parsed, "Client input");
                    }
                    Err(err)
                        if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                    Err(err) => {
                        warn!(error = %err, "Client read error");
                        dropped = Some(ShutdownReason::TransportError);
                    }
                }
            }
        }

        if let Some(reason) = dropped {
            info!(reason = reason.as_str(), "Client disconnected");
            client = None;
            send_buf.clear();
            ctx.on_disconnect(reason);
            CLIENT_CONNECTED.set(0.0);
        }

        cursor.publish(ctx.stats());

        let pause = if client.is_some() {
            config.connected_poll
        } else {
            config.idle_poll
        };
        std::thread::sleep(pause);
    }

    drop(client);
    ctx.all_stop(ShutdownReason::Terminate);
    cursor.publish(ctx.stats());
    CLIENT_CONNECTED.set(0.0);
    info!(
        connections = summary.connections,
        telemetry_lines = summary.telemetry_lines,
        "Link loop stopped"
    );
    summary
}
