use crate::mumble::message::MessageKind;
use crate::transport::errors::TransportError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{ErrorKind, Read, Write};
use tokio_util::codec::{Decoder, Encoder};

pub const HEADER_LEN: usize = 6;

/// Largest body accepted from the server before treating the stream as desynchronised.
pub const MAX_BODY_LEN: usize = 8 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub body: Bytes,
}

impl Envelope {
    pub fn new(kind: MessageKind, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }
}

/// Frames envelopes as `u16 type | u32 length | body`, both big-endian.
#[derive(Debug, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, TransportError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let code = u16::from_be_bytes([src[0], src[1]]);
        let kind = MessageKind::try_from(code)?;
        let len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if len > MAX_BODY_LEN {
            return Err(TransportError::Protocol(format!(
                "{kind:?} envelope of {len} bytes exceeds limit"
            )));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(len).freeze();
        Ok(Some(Envelope { kind, body }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Envelope>, TransportError> {
        match self.decode(buf)? {
            Some(envelope) => Ok(Some(envelope)),
            None if buf.is_empty() => Ok(None),
            None => Err(TransportError::Protocol(format!(
                "stream ended inside an envelope ({} bytes pending)",
                buf.len()
            ))),
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), TransportError> {
        let len = u32::try_from(item.body.len()).map_err(|_| {
            TransportError::Protocol(format!("{:?} body too large to frame", item.kind))
        })?;
        dst.reserve(HEADER_LEN + item.body.len());
        dst.put_u16(item.kind.code());
        dst.put_u32(len);
        dst.extend_from_slice(&item.body);
        Ok(())
    }
}

/// Blocking reader that pulls whole envelopes off a byte stream.
pub struct EnvelopeReader<R> {
    stream: R,
    codec: EnvelopeCodec,
    read_buf: BytesMut,
}

impl<R: Read> EnvelopeReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            codec: EnvelopeCodec::new(),
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    /// Returns `Ok(None)` when the stream closes on an envelope boundary.
    pub fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        loop {
            if let Some(envelope) = self.codec.decode(&mut self.read_buf)? {
                return Ok(Some(envelope));
            }

            let mut buffer = [0u8; 4096];
            let bytes_read = match self.stream.read(&mut buffer) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if bytes_read == 0 {
                return self.codec.decode_eof(&mut self.read_buf);
            }
            self.read_buf.extend_from_slice(&buffer[..bytes_read]);
        }
    }
}

/// Blocking writer; each `send` writes one complete envelope.
pub struct EnvelopeWriter<W> {
    stream: W,
    codec: EnvelopeCodec,
}

impl<W: Write> EnvelopeWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            codec: EnvelopeCodec::new(),
        }
    }

    pub fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let mut out = BytesMut::with_capacity(HEADER_LEN + envelope.body.len());
        self.codec.encode(envelope, &mut out)?;
        self.stream.write_all(&out)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}
