use crate::mumble::control::{encode_packet, DuplexStream, StreamCloser};
use crate::mumble::envelope::{Envelope, EnvelopeCodec, EnvelopeReader};
use crate::mumble::message::MessageKind;
use bytes::BytesMut;
use mumble_protocol_2x::control::{ControlPacket, RawControlPacket};
use mumble_protocol_2x::voice::{Clientbound, Serverbound};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::codec::Encoder;

#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().expect("buffer lock").clone()
    }

    /// Every envelope written so far, in order.
    pub fn envelopes(&self) -> Vec<Envelope> {
        let mut reader = EnvelopeReader::new(Cursor::new(self.contents()));
        let mut envelopes = Vec::new();
        while let Some(envelope) = reader.recv().expect("outbound stream desynchronised") {
            envelopes.push(envelope);
        }
        envelopes
    }

    pub fn kinds(&self) -> Vec<MessageKind> {
        self.envelopes()
            .into_iter()
            .map(|envelope| envelope.kind)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct NoopCloser {
    pub calls: Arc<AtomicUsize>,
}

impl StreamCloser for NoopCloser {
    fn close(&self) -> io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reader that fails every read, standing in for a reset or locally closed socket.
pub struct BrokenReader;

impl Read for BrokenReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionAborted, "aborted"))
    }
}

pub fn server_envelope(packet: ControlPacket<Clientbound>) -> Envelope {
    encode_packet(packet).expect("encode failed")
}

pub fn serverbound(envelope: &Envelope) -> ControlPacket<Serverbound> {
    let raw = RawControlPacket {
        id: envelope.kind.code(),
        bytes: envelope.body.clone(),
    };
    ControlPacket::try_from(raw).expect("decode failed")
}

pub fn encode_stream(envelopes: Vec<Envelope>) -> Vec<u8> {
    let mut codec = EnvelopeCodec::new();
    let mut out = BytesMut::new();
    for envelope in envelopes {
        codec.encode(envelope, &mut out).expect("encode failed");
    }
    out.to_vec()
}

pub fn memory_duplex(
    inbound: impl Read + Send + 'static,
    outbound: SharedBuffer,
    closer: NoopCloser,
) -> DuplexStream {
    DuplexStream {
        reader: Box::new(inbound),
        writer: Box::new(outbound),
        closer: Arc::new(closer),
    }
}
