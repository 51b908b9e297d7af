pub mod bitstream;
pub mod config;
pub mod control;
pub mod envelope;
pub mod events;
pub mod keepalive;
pub mod message;
pub mod session;
pub mod state;
pub mod voice;

#[cfg(test)]
mod testing;

pub use config::MumbleConfig;
pub use control::{tls_connect, ControlMessage, DuplexStream, StreamConnector, TlsConnector};
pub use envelope::{Envelope, EnvelopeCodec};
pub use events::{EventSink, TransportEvent};
pub use message::MessageKind;
pub use session::{MumbleSession, SessionHandle};
pub use voice::{AudioBackend, AudioDecoder, AudioPipeline, PlaybackSink, VoiceFrameBatch};
