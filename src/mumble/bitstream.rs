use bytes::{BufMut, Bytes, BytesMut};

/// Cursor over a tunneled voice payload.
///
/// Integers use a self-describing variable-length encoding keyed on the
/// leading byte:
///
/// | prefix      | payload                         |
/// |-------------|---------------------------------|
/// | `0xxxxxxx`  | 7-bit value                     |
/// | `10xxxxxx`  | 14-bit value, 1 more byte       |
/// | `110xxxxx`  | 21-bit value, 2 more bytes      |
/// | `1110xxxx`  | 28-bit value, 3 more bytes      |
/// | `111100__`  | 32-bit value in 4 more bytes    |
/// | `111101__`  | 64-bit value in 8 more bytes    |
/// | `111110__`  | bitwise NOT of the next varint  |
/// | `111111xx`  | bitwise NOT of `xx`             |
///
/// Reads never panic. Running past the end clears [`PacketReader::is_valid`]
/// and yields zeros or empty blocks from then on.
#[derive(Debug, Clone)]
pub struct PacketReader {
    data: Bytes,
    offset: usize,
    ok: bool,
}

/// What a per-frame header byte announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSpan {
    /// Capture the next `n` bytes as one frame.
    Frame(usize),
    /// Advance past `n` bytes without capturing.
    Gap(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub span: FrameSpan,
    pub more: bool,
}

impl FrameHeader {
    const CONTINUATION: u8 = 0x80;
    const GAP: u8 = 0x40;

    pub fn from_byte(byte: u8) -> Self {
        let value = byte & !Self::CONTINUATION;
        let span = if value & Self::GAP == 0 {
            FrameSpan::Frame(usize::from(value))
        } else {
            FrameSpan::Gap(usize::from(value))
        };
        Self {
            span,
            more: byte & Self::CONTINUATION != 0,
        }
    }

    /// Frames must be shorter than 64 bytes and gaps between 64 and 127 bytes;
    /// other lengths have no single-byte header.
    pub fn to_byte(self) -> u8 {
        let value = match self.span {
            FrameSpan::Frame(len) => {
                debug_assert!(len < usize::from(Self::GAP), "frame of {len} bytes");
                (len as u8) & 0x3f
            }
            FrameSpan::Gap(len) => {
                debug_assert!(
                    (usize::from(Self::GAP)..0x80).contains(&len),
                    "gap of {len} bytes"
                );
                ((len as u8) & 0x7f) | Self::GAP
            }
        };
        if self.more {
            value | Self::CONTINUATION
        } else {
            value
        }
    }
}

impl PacketReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
            ok: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.ok
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Consumes one raw byte, or returns 0 and invalidates at the end of input.
    pub fn next(&mut self) -> u8 {
        match self.data.get(self.offset) {
            Some(&byte) => {
                self.offset += 1;
                byte
            }
            None => {
                self.ok = false;
                0
            }
        }
    }

    pub fn next_header(&mut self) -> FrameHeader {
        FrameHeader::from_byte(self.next())
    }

    fn next_u64(&mut self) -> u64 {
        u64::from(self.next())
    }

    pub fn read_varint(&mut self) -> u64 {
        let mut inverted = false;
        loop {
            let lead = self.next_u64();
            let value = if lead & 0x80 == 0x00 {
                lead & 0x7f
            } else if lead & 0xc0 == 0x80 {
                (lead & 0x3f) << 8 | self.next_u64()
            } else if lead & 0xf0 == 0xf0 {
                match lead & 0xfc {
                    0xf0 => self.read_be(4),
                    0xf4 => self.read_be(8),
                    0xf8 => {
                        inverted = !inverted;
                        continue;
                    }
                    _ => !(lead & 0x03),
                }
            } else if lead & 0xf0 == 0xe0 {
                (lead & 0x0f) << 24 | self.read_be(3)
            } else {
                (lead & 0x1f) << 16 | self.read_be(2)
            };
            return if inverted { !value } else { value };
        }
    }

    fn read_be(&mut self, width: usize) -> u64 {
        (0..width).fold(0, |acc, _| acc << 8 | self.next_u64())
    }

    pub fn read_float(&mut self) -> f32 {
        if self.remaining() < 4 {
            self.ok = false;
            self.offset = self.data.len();
            return 0.0;
        }
        let bytes = [
            self.data[self.offset],
            self.data[self.offset + 1],
            self.data[self.offset + 2],
            self.data[self.offset + 3],
        ];
        self.offset += 4;
        f32::from_le_bytes(bytes)
    }

    /// Returns the next `len` bytes without copying; empty and invalid if short.
    pub fn data_block(&mut self, len: usize) -> Bytes {
        if self.remaining() < len {
            self.ok = false;
            self.offset = self.data.len();
            return Bytes::new();
        }
        let block = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        block
    }

    pub fn skip(&mut self, len: usize) {
        if self.remaining() < len {
            self.ok = false;
            self.offset = self.data.len();
            return;
        }
        self.offset += len;
    }
}

/// Writing dual of [`PacketReader`], used to build tunnel payloads.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_byte(&mut self, byte: u8) -> &mut Self {
        self.buf.put_u8(byte);
        self
    }

    pub fn put_header(&mut self, header: FrameHeader) -> &mut Self {
        self.put_byte(header.to_byte())
    }

    pub fn put_block(&mut self, block: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(block);
        self
    }

    pub fn put_float(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_varint(&mut self, value: u64) -> &mut Self {
        let mut value = value;
        if value & 0x8000_0000_0000_0000 != 0 && !value < 0x1_0000_0000 {
            value = !value;
            if value <= 0x03 {
                return self.put_byte(0xfc | value as u8);
            }
            self.buf.put_u8(0xf8);
        }

        if value < 0x80 {
            self.buf.put_u8(value as u8);
        } else if value < 0x4000 {
            self.buf.put_u8(0x80 | (value >> 8) as u8);
            self.buf.put_u8(value as u8);
        } else if value < 0x20_0000 {
            self.buf.put_u8(0xc0 | (value >> 16) as u8);
            self.buf.put_u16(value as u16);
        } else if value < 0x1000_0000 {
            self.buf.put_u8(0xe0 | (value >> 24) as u8);
            self.buf.put_u8((value >> 16) as u8);
            self.buf.put_u16(value as u16);
        } else if value < 0x1_0000_0000 {
            self.buf.put_u8(0xf0);
            self.buf.put_u32(value as u32);
        } else {
            self.buf.put_u8(0xf4);
            self.buf.put_u64(value);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}
