use crate::mumble::config::{MumbleConfig, PLUGIN_CONTEXT, PROTOCOL_VERSION};
use crate::mumble::envelope::{Envelope, EnvelopeWriter};
use crate::mumble::message::MessageKind;
use crate::transport::errors::TransportError;
use log::info;
use mumble_protocol_2x::control::{msgs, ControlPacket, RawControlPacket};
use mumble_protocol_2x::voice::{Clientbound, Serverbound};
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Server messages the directory and session engine act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    ServerVersion {
        release: Option<String>,
    },
    Reject {
        reason: String,
    },
    ServerSync {
        session: u32,
    },
    ChannelState {
        id: u32,
        name: Option<String>,
    },
    ChannelRemove {
        id: u32,
    },
    UserState {
        session: u32,
        name: Option<String>,
        channel_id: Option<u32>,
    },
    UserRemove {
        session: u32,
    },
}

pub fn version_packet(config: &MumbleConfig) -> ControlPacket<Serverbound> {
    let mut version = msgs::Version::new();
    version.version_v1 = Some(PROTOCOL_VERSION);
    version.release = Some(config.release.clone());
    ControlPacket::Version(Box::new(version))
}

pub fn authenticate_packet(config: &MumbleConfig) -> ControlPacket<Serverbound> {
    let mut auth = msgs::Authenticate::new();
    auth.username = Some(config.username.clone());
    auth.password = config.password.clone();
    auth.celt_versions = config
        .celt_versions
        .iter()
        .map(|version| *version as i32)
        .collect();
    ControlPacket::Authenticate(Box::new(auth))
}

pub fn ping_packet(timestamp: u64) -> ControlPacket<Serverbound> {
    let mut ping = msgs::Ping::new();
    ping.timestamp = Some(timestamp);
    ControlPacket::Ping(Box::new(ping))
}

pub fn plugin_context_packet(session: u32) -> ControlPacket<Serverbound> {
    let mut state = msgs::UserState::new();
    state.session = Some(session);
    state.plugin_context = Some(PLUGIN_CONTEXT.to_vec());
    ControlPacket::UserState(Box::new(state))
}

pub fn join_channel_packet(session: u32, channel_id: u32) -> ControlPacket<Serverbound> {
    let mut state = msgs::UserState::new();
    state.session = Some(session);
    state.channel_id = Some(channel_id);
    ControlPacket::UserState(Box::new(state))
}

/// Serializes a control packet body and wraps it for the envelope codec.
pub fn encode_packet<Dst>(packet: ControlPacket<Dst>) -> Result<Envelope, TransportError>
where
    Dst: mumble_protocol_2x::voice::VoicePacketDst,
{
    let raw = RawControlPacket::from(packet);
    let kind = MessageKind::try_from(raw.id)?;
    Ok(Envelope::new(kind, raw.bytes))
}

/// Parses the body of an inbound envelope the engine acts on.
///
/// Returns `Ok(None)` for kinds that are handled generically; those bodies are
/// never parsed.
pub fn decode_control(envelope: &Envelope) -> Result<Option<ControlMessage>, TransportError> {
    match envelope.kind {
        MessageKind::Version
        | MessageKind::Reject
        | MessageKind::ServerSync
        | MessageKind::ChannelState
        | MessageKind::ChannelRemove
        | MessageKind::UserState
        | MessageKind::UserRemove => {}
        _ => return Ok(None),
    }

    let raw = RawControlPacket {
        id: envelope.kind.code(),
        bytes: envelope.body.clone(),
    };
    let packet = ControlPacket::<Clientbound>::try_from(raw).map_err(|err| {
        TransportError::Protocol(format!("malformed {:?} body: {err:?}", envelope.kind))
    })?;
    Ok(map_control_packet(packet))
}

fn map_control_packet(packet: ControlPacket<Clientbound>) -> Option<ControlMessage> {
    match packet {
        ControlPacket::Version(msg) => Some(ControlMessage::ServerVersion {
            release: msg.release.clone(),
        }),
        ControlPacket::Reject(msg) => Some(ControlMessage::Reject {
            reason: msg.reason.clone().unwrap_or_default(),
        }),
        ControlPacket::ServerSync(msg) => {
            let session = msg.session?;
            Some(ControlMessage::ServerSync { session })
        }
        ControlPacket::ChannelState(msg) => {
            let id = msg.channel_id?;
            Some(ControlMessage::ChannelState {
                id,
                name: msg.name.clone(),
            })
        }
        ControlPacket::ChannelRemove(msg) => {
            let id = msg.channel_id?;
            Some(ControlMessage::ChannelRemove { id })
        }
        ControlPacket::UserState(msg) => {
            let session = msg.session?;
            Some(ControlMessage::UserState {
                session,
                name: msg.name.clone(),
                channel_id: msg.channel_id,
            })
        }
        ControlPacket::UserRemove(msg) => {
            let session = msg.session?;
            Some(ControlMessage::UserRemove { session })
        }
        _ => None,
    }
}

/// Serialized write path shared by the handshake, the keepalive task and
/// caller-issued requests. One lock acquisition covers one whole envelope.
#[derive(Clone)]
pub struct Outbound {
    writer: Arc<Mutex<EnvelopeWriter<Box<dyn Write + Send>>>>,
}

impl Outbound {
    pub fn new(stream: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(EnvelopeWriter::new(stream))),
        }
    }

    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TransportError::Io("outbound writer poisoned".to_string()))?;
        writer.send(envelope)
    }

    pub fn send(&self, packet: ControlPacket<Serverbound>) -> Result<(), TransportError> {
        let envelope = encode_packet(packet)?;
        let kind = envelope.kind;
        self.send_envelope(envelope)?;
        if kind != MessageKind::Ping {
            info!("<<< {kind:?}");
        }
        Ok(())
    }
}

/// Closing the stream must make a blocked read on the other half fail.
pub trait StreamCloser: Send + Sync {
    fn close(&self) -> io::Result<()>;
}

impl StreamCloser for TcpStream {
    fn close(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// A connected byte stream split into independently owned halves.
pub struct DuplexStream {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub closer: Arc<dyn StreamCloser>,
}

pub trait StreamConnector: Send {
    fn connect(&mut self, config: &MumbleConfig) -> Result<DuplexStream, TransportError>;
}

pub struct FnConnector<F> {
    connect: F,
}

impl<F> FnConnector<F> {
    pub fn new(connect: F) -> Self {
        Self { connect }
    }
}

impl<F> StreamConnector for FnConnector<F>
where
    F: FnMut(&MumbleConfig) -> Result<DuplexStream, TransportError> + Send,
{
    fn connect(&mut self, config: &MumbleConfig) -> Result<DuplexStream, TransportError> {
        (self.connect)(config)
    }
}

#[derive(Debug, Default)]
pub struct TlsConnector;

impl StreamConnector for TlsConnector {
    fn connect(&mut self, config: &MumbleConfig) -> Result<DuplexStream, TransportError> {
        tls_connect(config)
    }
}

/// How long the reader holds the TLS session before letting a writer in.
const TLS_READ_SLICE: Duration = Duration::from_millis(50);

pub fn tls_connect(config: &MumbleConfig) -> Result<DuplexStream, TransportError> {
    let tcp = TcpStream::connect((config.server.as_str(), config.port))?;
    tcp.set_nodelay(true)?;
    let closer = tcp.try_clone()?;

    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|err| TransportError::Io(format!("tls connector init failed: {err}")))?;
    if config.accept_invalid_certs {
        builder.set_verify(SslVerifyMode::NONE);
    }
    let connector = builder.build();
    let stream = connector
        .connect(&config.server, tcp)
        .map_err(|err| TransportError::Io(format!("tls handshake failed: {err}")))?;
    stream.get_ref().set_read_timeout(Some(TLS_READ_SLICE))?;

    let shared = Arc::new(Mutex::new(stream));
    Ok(DuplexStream {
        reader: Box::new(TlsHalf {
            stream: Arc::clone(&shared),
        }),
        writer: Box::new(TlsHalf { stream: shared }),
        closer: Arc::new(closer),
    })
}

/// One side of a TLS session shared between the read loop and the writers.
struct TlsHalf {
    stream: Arc<Mutex<SslStream<TcpStream>>>,
}

impl TlsHalf {
    fn with_stream<T>(
        &self,
        op: impl FnOnce(&mut SslStream<TcpStream>) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| io::Error::new(ErrorKind::Other, "tls stream poisoned"))?;
        op(&mut stream)
    }
}

impl Read for TlsHalf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.with_stream(|stream| stream.read(buf)) {
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    std::thread::yield_now();
                }
                other => return other,
            }
        }
    }
}

impl Write for TlsHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_stream(|stream| stream.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_stream(|stream| stream.flush())
    }
}
