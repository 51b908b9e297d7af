use crate::mumble::bitstream::{FrameSpan, PacketReader};
use crate::mumble::config::{FRAME_SIZE, SAMPLE_RATE};
use crate::transport::errors::TransportError;
use bytes::Bytes;
use log::debug;

/// Audio encoding announced in the top three bits of a tunnel payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioKind {
    CeltAlpha,
    Ping,
    Speex,
    CeltBeta,
    Opus,
    Unknown(u8),
}

impl From<u8> for AudioKind {
    fn from(value: u8) -> Self {
        match value {
            0 => AudioKind::CeltAlpha,
            1 => AudioKind::Ping,
            2 => AudioKind::Speex,
            3 => AudioKind::CeltBeta,
            4 => AudioKind::Opus,
            other => AudioKind::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One tunnel payload split into its audio frames. Not retained past decode.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceFrameBatch {
    pub kind: AudioKind,
    pub flags: u8,
    pub source_session: u64,
    pub sequence: u64,
    pub frames: Vec<Bytes>,
    pub position: Option<Position>,
    /// False when the payload ended early; `frames` holds what parsed before the fault.
    pub complete: bool,
}

/// Splits a tunnel payload into frames. Returns `None` only for an empty payload.
pub fn parse_tunnel_payload(payload: &Bytes) -> Option<VoiceFrameBatch> {
    let header = *payload.first()?;
    let mut reader = PacketReader::new(payload.slice(1..));

    let source_session = reader.read_varint();
    let sequence = reader.read_varint();

    let mut frames = Vec::new();
    loop {
        let header = reader.next_header();
        match header.span {
            FrameSpan::Frame(len) => {
                let frame = reader.data_block(len);
                if reader.is_valid() {
                    frames.push(frame);
                }
            }
            FrameSpan::Gap(len) => reader.skip(len),
        }
        if !header.more || !reader.is_valid() {
            break;
        }
    }

    let position = if reader.remaining() > 0 {
        let x = reader.read_float();
        let y = reader.read_float();
        let z = reader.read_float();
        reader.is_valid().then_some(Position { x, y, z })
    } else {
        None
    };

    Some(VoiceFrameBatch {
        kind: AudioKind::from(header >> 5 & 0x07),
        flags: header & 0x1f,
        source_session,
        sequence,
        frames,
        position,
        complete: reader.is_valid(),
    })
}

/// Turns one compressed frame into exactly one block of PCM samples.
pub trait AudioDecoder: Send {
    fn decode(&mut self, frame: &[u8], pcm: &mut [i16]);
}

pub trait PlaybackSink: Send {
    fn write(&mut self, pcm: &[i16]);
}

/// Opens the per-connection decoder and playback sink at authentication time.
pub trait AudioBackend: Send {
    fn open(
        &mut self,
        sample_rate: u32,
        frame_size: usize,
    ) -> Result<(Box<dyn AudioDecoder>, Box<dyn PlaybackSink>), TransportError>;
}

#[derive(Debug, Default)]
pub struct NoopAudioBackend;

struct SilentDecoder;

impl AudioDecoder for SilentDecoder {
    fn decode(&mut self, _frame: &[u8], pcm: &mut [i16]) {
        pcm.fill(0);
    }
}

struct DiscardSink;

impl PlaybackSink for DiscardSink {
    fn write(&mut self, _pcm: &[i16]) {}
}

impl AudioBackend for NoopAudioBackend {
    fn open(
        &mut self,
        _sample_rate: u32,
        _frame_size: usize,
    ) -> Result<(Box<dyn AudioDecoder>, Box<dyn PlaybackSink>), TransportError> {
        Ok((Box::new(SilentDecoder), Box::new(DiscardSink)))
    }
}

/// Decoder and sink for the lifetime of one authenticated connection.
pub struct AudioPipeline {
    decoder: Box<dyn AudioDecoder>,
    sink: Box<dyn PlaybackSink>,
    pcm: Vec<i16>,
}

impl AudioPipeline {
    pub fn open(backend: &mut dyn AudioBackend) -> Result<Self, TransportError> {
        let (decoder, sink) = backend.open(SAMPLE_RATE, FRAME_SIZE)?;
        Ok(Self {
            decoder,
            sink,
            pcm: vec![0; FRAME_SIZE],
        })
    }

    /// Decodes every captured frame in arrival order and plays each block.
    pub fn play(&mut self, batch: &VoiceFrameBatch) {
        for frame in &batch.frames {
            self.pcm.fill(0);
            self.decoder.decode(frame, &mut self.pcm);
            self.sink.write(&self.pcm);
        }
    }

    /// Parses and plays one tunnel payload; malformed tails are dropped, not raised.
    pub fn handle_tunnel(&mut self, payload: &Bytes) -> Option<VoiceFrameBatch> {
        let batch = parse_tunnel_payload(payload)?;
        if !batch.complete {
            debug!(
                "malformed voice packet from session {} seq {}: kept {} frames",
                batch.source_session,
                batch.sequence,
                batch.frames.len()
            );
        }
        if let Some(position) = batch.position {
            debug!("x: {} y: {} z: {}", position.x, position.y, position.z);
        }
        self.play(&batch);
        Some(batch)
    }
}
