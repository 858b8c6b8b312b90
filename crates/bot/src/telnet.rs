//! Telnet transport (C1): RFC 854/858/1091/1073 option negotiation, IAC
//! escaping, and raw byte I/O over TCP. No decoding happens here — bytes
//! that survive the telnet layer are handed to the terminal emulator
//! unchanged.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{BotError, ErrorKind};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const GA: u8 = 249;
pub const SE: u8 = 240;

pub const OPT_BINARY: u8 = 0;
pub const OPT_ECHO: u8 = 1;
pub const OPT_SUPPRESS_GA: u8 = 3;
pub const OPT_TTYPE: u8 = 24;
pub const OPT_NAWS: u8 = 31;

const TTYPE_IS: u8 = 0;
const TTYPE_SEND: u8 = 1;

/// One decoded telnet-layer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    Data(Vec<u8>),
    Will(u8),
    Wont(u8),
    Do(u8),
    Dont(u8),
    Subnegotiation(u8, Vec<u8>),
    GoAhead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Normal,
    Iac,
    Cmd,
    Sb,
    SbData,
    SbIac,
}

/// Incremental telnet protocol parser. Feeding a byte stream in arbitrary
/// chunks produces the same event sequence as feeding it whole, exercised
/// by `telnet_tests`.
#[derive(Debug, Default)]
pub struct TelnetParser {
    state: ParseStateHolder,
    data_buf: Vec<u8>,
    sb_opt: u8,
    sb_buf: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParseStateHolder(ParseState);

impl Default for ParseStateHolder {
    fn default() -> Self {
        Self(ParseState::Normal)
    }
}

impl TelnetParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TelnetEvent> {
        let mut events = Vec::new();
        for &b in bytes {
            self.feed_byte(b, &mut events);
        }
        self.flush_data(&mut events);
        events
    }

    fn flush_data(&mut self, events: &mut Vec<TelnetEvent>) {
        if !self.data_buf.is_empty() {
            events.push(TelnetEvent::Data(std::mem::take(&mut self.data_buf)));
        }
    }

    fn feed_byte(&mut self, b: u8, events: &mut Vec<TelnetEvent>) {
        match self.state.0 {
            ParseState::Normal => {
                if b == IAC {
                    self.flush_data(events);
                    self.state.0 = ParseState::Iac;
                } else {
                    self.data_buf.push(b);
                }
            }
            ParseState::Iac => match b {
                IAC => {
                    self.data_buf.push(IAC);
                    self.state.0 = ParseState::Normal;
                }
                WILL | WONT | DO | DONT => {
                    self.sb_opt = b;
                    self.state.0 = ParseState::Cmd;
                }
                SB => {
                    self.sb_buf.clear();
                    self.state.0 = ParseState::Sb;
                }
                GA => {
                    events.push(TelnetEvent::GoAhead);
                    self.state.0 = ParseState::Normal;
                }
                _ => {
                    // Unhandled simple command (NOP, AYT, ...); ignore.
                    self.state.0 = ParseState::Normal;
                }
            },
            ParseState::Cmd => {
                let cmd = self.sb_opt;
                let event = match cmd {
                    WILL => TelnetEvent::Will(b),
                    WONT => TelnetEvent::Wont(b),
                    DO => TelnetEvent::Do(b),
                    DONT => TelnetEvent::Dont(b),
                    _ => unreachable!("sb_opt only ever set to a negotiation verb"),
                };
                events.push(event);
                self.state.0 = ParseState::Normal;
            }
            ParseState::Sb => {
                self.sb_opt = b;
                self.sb_buf.clear();
                self.state.0 = ParseState::SbData;
            }
            ParseState::SbData => {
                if b == IAC {
                    self.state.0 = ParseState::SbIac;
                } else {
                    self.sb_buf.push(b);
                }
            }
            ParseState::SbIac => match b {
                SE => {
                    events.push(TelnetEvent::Subnegotiation(
                        self.sb_opt,
                        std::mem::take(&mut self.sb_buf),
                    ));
                    self.state.0 = ParseState::Normal;
                }
                IAC => {
                    self.sb_buf.push(IAC);
                    self.state.0 = ParseState::SbData;
                }
                _ => {
                    // Malformed subnegotiation; drop it and resync.
                    self.state.0 = ParseState::Normal;
                }
            },
        }
    }
}

/// Double every IAC byte in a payload so it cannot be misread as a telnet
/// command on the wire.
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for &b in payload {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}

/// Inverse of [`escape`]: collapse doubled IAC bytes back to one.
pub fn unescape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        out.push(payload[i]);
        if payload[i] == IAC && payload.get(i + 1) == Some(&IAC) {
            i += 1;
        }
        i += 1;
    }
    out
}

/// Tracks local (`us`) and remote (`them`) option agreement state and
/// produces the response bytes required to reach the minimal subset this
/// bot needs: WILL BINARY, WILL SUPPRESS-GO-AHEAD, SB TTYPE IS "ANSI",
/// SB NAWS 80x25. Everything else is declined.
#[derive(Debug)]
pub struct NegotiationState {
    us: [bool; 256],
    them: [bool; 256],
    naws_cols: u16,
    naws_rows: u16,
}

impl Default for NegotiationState {
    fn default() -> Self {
        Self {
            us: [false; 256],
            them: [false; 256],
            naws_cols: 0,
            naws_rows: 0,
        }
    }
}

impl NegotiationState {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { naws_cols: cols, naws_rows: rows, ..Default::default() }
    }

    /// Process one decoded event, returning the raw bytes (already
    /// IAC-escaped at the command level) that should be sent in reply.
    pub fn handle(&mut self, event: &TelnetEvent) -> Vec<u8> {
        match *event {
            TelnetEvent::Do(opt) => self.on_do(opt),
            TelnetEvent::Dont(opt) => {
                self.us[opt as usize] = false;
                Vec::new()
            }
            TelnetEvent::Will(opt) => self.on_will(opt),
            TelnetEvent::Wont(opt) => {
                self.them[opt as usize] = false;
                Vec::new()
            }
            TelnetEvent::Subnegotiation(opt, ref data) => self.on_subnegotiation(opt, data),
            _ => Vec::new(),
        }
    }

    fn on_do(&mut self, opt: u8) -> Vec<u8> {
        let accept = matches!(opt, OPT_BINARY | OPT_SUPPRESS_GA | OPT_TTYPE);
        self.us[opt as usize] = accept;
        vec![IAC, if accept { WILL } else { WONT }, opt]
    }

    fn on_will(&mut self, opt: u8) -> Vec<u8> {
        let accept = matches!(opt, OPT_BINARY | OPT_SUPPRESS_GA | OPT_ECHO);
        self.them[opt as usize] = accept;
        vec![IAC, if accept { DO } else { DONT }, opt]
    }

    fn on_subnegotiation(&mut self, opt: u8, data: &[u8]) -> Vec<u8> {
        if opt == OPT_TTYPE && data.first() == Some(&TTYPE_SEND) {
            build_ttype_is("ANSI")
        } else {
            Vec::new()
        }
    }

    /// Bytes for the opening handshake this bot always offers, independent
    /// of server-initiated negotiation.
    pub fn opening_handshake(&mut self) -> Vec<u8> {
        self.us[OPT_BINARY as usize] = true;
        self.us[OPT_SUPPRESS_GA as usize] = true;
        let mut out = vec![IAC, WILL, OPT_BINARY, IAC, WILL, OPT_SUPPRESS_GA, IAC, DO, OPT_NAWS];
        out.extend(build_naws(self.naws_cols, self.naws_rows));
        out
    }
}

fn build_ttype_is(name: &str) -> Vec<u8> {
    let mut out = vec![IAC, SB, OPT_TTYPE, TTYPE_IS];
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&[IAC, SE]);
    out
}

pub fn build_naws(cols: u16, rows: u16) -> Vec<u8> {
    let mut out = vec![IAC, SB, OPT_NAWS];
    for word in [cols, rows] {
        for byte in word.to_be_bytes() {
            out.push(byte);
            if byte == IAC {
                out.push(IAC);
            }
        }
    }
    out.extend_from_slice(&[IAC, SE]);
    out
}

/// A live telnet connection. Binary-clean: application bytes that survive
/// the protocol layer are returned as-is from [`Transport::read_available`].
pub struct Transport {
    stream: TcpStream,
    parser: TelnetParser,
    negotiation: NegotiationState,
    read_buf: [u8; 4096],
}

impl Transport {
    pub async fn connect(host: &str, port: u16, cols: u16, rows: u16) -> Result<Self, BotError> {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            let kind = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                ErrorKind::ConnectionRefused
            } else {
                ErrorKind::Disconnected
            };
            BotError::new(kind, e.to_string())
        })?;
        let mut negotiation = NegotiationState::new(cols, rows);
        let handshake = negotiation.opening_handshake();
        let mut transport = Self { stream, parser: TelnetParser::new(), negotiation, read_buf: [0u8; 4096] };
        transport.write_raw(&handshake).await?;
        Ok(transport)
    }

    /// Send application bytes. IAC bytes in `payload` are escaped; the
    /// write is issued in one call so an escaped sequence is never split.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), BotError> {
        let escaped = escape(payload);
        self.write_raw(&escaped).await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), BotError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| BotError::new(ErrorKind::WriteFailed, e.to_string()))
    }

    /// Pull whatever application bytes are available within `timeout_ms`,
    /// transparently answering any protocol negotiation encountered.
    /// Returns an empty vector on timeout with no data (not an error).
    pub async fn read_available(&mut self, timeout_ms: u64) -> Result<Vec<u8>, BotError> {
        let read = timeout(Duration::from_millis(timeout_ms), self.stream.read(&mut self.read_buf)).await;
        let n = match read {
            Ok(Ok(0)) => return Err(BotError::new(ErrorKind::Disconnected, "EOF from server")),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(BotError::new(ErrorKind::Disconnected, e.to_string())),
            Err(_) => return Ok(Vec::new()), // timed out, no data yet
        };

        let events = self.parser.feed(&self.read_buf[..n]);
        let mut data = Vec::new();
        let mut replies = Vec::new();
        for event in &events {
            match event {
                TelnetEvent::Data(bytes) => data.extend_from_slice(bytes),
                other => replies.extend(self.negotiation.handle(other)),
            }
        }
        if !replies.is_empty() {
            self.write_raw(&replies).await?;
        }
        Ok(data)
    }
}

#[cfg(test)]
#[path = "telnet_tests.rs"]
mod tests;
