//! Low level abstractions for reading and writing the bytes making up DNS
//! packets.
//!
//! Three implementations are provided: `BytePacketBuffer` wraps a fixed
//! 512-byte array for reading UDP datagrams off the wire, `VectorPacketBuffer`
//! wraps a growable `Vec<u8>` for building responses and for read/write paths
//! that don't know their final size up front, and `StreamPacketBuffer` wraps a
//! `Read` stream (a TCP connection with its 2-byte length prefix already
//! consumed) for incremental byte-at-a-time reads.

use std::io::Read;

use derive_more::{Display, Error, From};

#[derive(Debug, Display, From, Error)]
pub enum BufferError {
    EndOfBuffer,
    JumpLimitExceeded,
    LabelTooLong,
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, BufferError>;

/// Shared interface for a buffer that `DnsHeader`/`DnsQuestion`/`DnsRecord`
/// read and write through. Implementors own the backing storage; callers
/// only ever see positions and byte ranges.
pub trait PacketBuffer {
    fn read(&mut self) -> Result<u8>;
    fn get(&mut self, pos: usize) -> Result<u8>;
    fn get_range(&mut self, start: usize, len: usize) -> Result<&[u8]>;
    fn set(&mut self, pos: usize, val: u8) -> Result<()>;

    fn write(&mut self, val: u8) -> Result<()>;

    fn pos(&self) -> usize;
    fn seek(&mut self, pos: usize) -> Result<()>;
    fn step(&mut self, steps: usize) -> Result<()>;

    fn set_u16(&mut self, pos: usize, val: u16) -> Result<()> {
        self.set(pos, (val >> 8) as u8)?;
        self.set(pos + 1, (val & 0xFF) as u8)?;

        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.read()
    }

    fn read_u16(&mut self) -> Result<u16> {
        let hi = self.read()? as u16;
        let lo = self.read()? as u16;

        Ok((hi << 8) | lo)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut res: u32 = 0;
        for _ in 0..4 {
            res = (res << 8) | (self.read()? as u32);
        }

        Ok(res)
    }

    fn read_qname(&mut self, outstr: &mut String) -> Result<()> {
        let mut pos = self.pos();

        let mut jumped = false;
        let mut jumps_performed = 0;
        let max_jumps = 5;

        let mut delim = "";
        loop {
            if jumps_performed > max_jumps {
                return Err(BufferError::JumpLimitExceeded);
            }

            let len = self.get(pos)?;

            if (len & 0xC0) == 0xC0 {
                if !jumped {
                    self.seek(pos + 2)?;
                }

                let b2 = self.get(pos + 1)? as u16;
                let offset = (((len as u16) ^ 0xC0) << 8) | b2;
                pos = offset as usize;

                jumped = true;
                jumps_performed += 1;

                continue;
            }

            pos += 1;

            if len == 0 {
                break;
            }

            outstr.push_str(delim);

            let str_buffer = self.get_range(pos, len as usize)?;
            outstr.push_str(&String::from_utf8_lossy(str_buffer).to_lowercase());

            delim = ".";

            pos += len as usize;
        }

        if !jumped {
            self.seek(pos)?;
        }

        Ok(())
    }

    fn write_u8(&mut self, val: u8) -> Result<()> {
        self.write(val)?;

        Ok(())
    }

    fn write_u16(&mut self, val: u16) -> Result<()> {
        self.write((val >> 8) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn write_u32(&mut self, val: u32) -> Result<()> {
        self.write(((val >> 24) & 0xFF) as u8)?;
        self.write(((val >> 16) & 0xFF) as u8)?;
        self.write(((val >> 8) & 0xFF) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn write_qname(&mut self, qname: &str) -> Result<()> {
        for label in qname.split('.').filter(|label| !label.is_empty()) {
            let len = label.len();
            if len > 0x3F {
                return Err(BufferError::LabelTooLong);
            }

            self.write_u8(len as u8)?;
            for b in label.as_bytes() {
                self.write_u8(*b)?;
            }
        }

        self.write_u8(0)?;

        Ok(())
    }
}

/// A fixed 512-byte buffer, large enough for any non-EDNS UDP datagram this
/// server sends or receives.
pub struct BytePacketBuffer {
    pub buf: [u8; 512],
    pub pos: usize,
}

impl BytePacketBuffer {
    pub fn new() -> BytePacketBuffer {
        BytePacketBuffer {
            buf: [0; 512],
            pos: 0,
        }
    }
}

impl Default for BytePacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuffer for BytePacketBuffer {
    fn read(&mut self) -> Result<u8> {
        if self.pos >= 512 {
            return Err(BufferError::EndOfBuffer);
        }
        let res = self.buf[self.pos];
        self.pos += 1;

        Ok(res)
    }

    fn get(&mut self, pos: usize) -> Result<u8> {
        if pos >= 512 {
            return Err(BufferError::EndOfBuffer);
        }
        Ok(self.buf[pos])
    }

    fn get_range(&mut self, start: usize, len: usize) -> Result<&[u8]> {
        if start + len >= 512 {
            return Err(BufferError::EndOfBuffer);
        }
        Ok(&self.buf[start..start + len])
    }

    fn set(&mut self, pos: usize, val: u8) -> Result<()> {
        if pos >= 512 {
            return Err(BufferError::EndOfBuffer);
        }
        self.buf[pos] = val;

        Ok(())
    }

    fn write(&mut self, val: u8) -> Result<()> {
        if self.pos >= 512 {
            return Err(BufferError::EndOfBuffer);
        }
        self.buf[self.pos] = val;
        self.pos += 1;

        Ok(())
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        self.pos = pos;

        Ok(())
    }

    fn step(&mut self, steps: usize) -> Result<()> {
        self.pos += steps;

        Ok(())
    }
}

/// A growable buffer used when the final packet size isn't known ahead of
/// time (building a response, or staging an outbound query).
#[derive(Default)]
pub struct VectorPacketBuffer {
    pub buffer: Vec<u8>,
    pub pos: usize,
}

impl VectorPacketBuffer {
    pub fn new() -> VectorPacketBuffer {
        VectorPacketBuffer {
            buffer: Vec::new(),
            pos: 0,
        }
    }
}

impl PacketBuffer for VectorPacketBuffer {
    fn read(&mut self) -> Result<u8> {
        let res = self.get(self.pos)?;
        self.pos += 1;

        Ok(res)
    }

    fn get(&mut self, pos: usize) -> Result<u8> {
        self.buffer.get(pos).copied().ok_or(BufferError::EndOfBuffer)
    }

    fn get_range(&mut self, start: usize, len: usize) -> Result<&[u8]> {
        if start + len > self.buffer.len() {
            return Err(BufferError::EndOfBuffer);
        }
        Ok(&self.buffer[start..start + len])
    }

    fn set(&mut self, pos: usize, val: u8) -> Result<()> {
        if pos >= self.buffer.len() {
            return Err(BufferError::EndOfBuffer);
        }
        self.buffer[pos] = val;

        Ok(())
    }

    fn write(&mut self, val: u8) -> Result<()> {
        self.buffer.push(val);
        self.pos += 1;

        Ok(())
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        self.pos = pos;

        Ok(())
    }

    fn step(&mut self, steps: usize) -> Result<()> {
        self.pos += steps;

        Ok(())
    }
}

/// Incremental reader over a TCP stream, used after the 2-byte length
/// prefix has already been consumed by the caller (see `netutil`).
pub struct StreamPacketBuffer<'a, T>
where
    T: Read,
{
    pub stream: &'a mut T,
    pub buffer: Vec<u8>,
    pub pos: usize,
}

impl<'a, T> StreamPacketBuffer<'a, T>
where
    T: Read,
{
    pub fn new(stream: &'a mut T) -> StreamPacketBuffer<'a, T> {
        StreamPacketBuffer {
            stream,
            buffer: Vec::new(),
            pos: 0,
        }
    }
}

impl<'a, T> PacketBuffer for StreamPacketBuffer<'a, T>
where
    T: Read,
{
    fn read(&mut self) -> Result<u8> {
        while self.pos >= self.buffer.len() {
            let mut byte = [0; 1];
            self.stream.read_exact(&mut byte)?;
            self.buffer.push(byte[0]);
        }

        let res = self.buffer[self.pos];
        self.pos += 1;

        Ok(res)
    }

    fn get(&mut self, pos: usize) -> Result<u8> {
        while pos >= self.buffer.len() {
            let mut byte = [0; 1];
            self.stream.read_exact(&mut byte)?;
            self.buffer.push(byte[0]);
        }

        Ok(self.buffer[pos])
    }

    fn get_range(&mut self, start: usize, len: usize) -> Result<&[u8]> {
        while start + len > self.buffer.len() {
            let mut byte = [0; 1];
            self.stream.read_exact(&mut byte)?;
            self.buffer.push(byte[0]);
        }

        Ok(&self.buffer[start..start + len])
    }

    fn set(&mut self, pos: usize, val: u8) -> Result<()> {
        self.buffer[pos] = val;

        Ok(())
    }

    fn write(&mut self, val: u8) -> Result<()> {
        self.buffer.push(val);
        self.pos += 1;

        Ok(())
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        self.pos = pos;

        Ok(())
    }

    fn step(&mut self, steps: usize) -> Result<()> {
        self.pos += steps;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_buffer_roundtrip() {
        let mut buf = VectorPacketBuffer::new();
        buf.write_qname("www.example.com.").unwrap();
        buf.write_u16(0x1234).unwrap();

        buf.seek(0).unwrap();
        let mut name = String::new();
        buf.read_qname(&mut name).unwrap();
        assert_eq!(name, "www.example.com");
        assert_eq!(buf.read_u16().unwrap(), 0x1234);
    }

    #[test]
    fn test_qname_compression_jump() {
        let mut buf = VectorPacketBuffer::new();
        buf.write_qname("example.com.").unwrap();
        let second_pos = buf.pos();
        // A pointer back to offset 0.
        buf.write_u8(0xC0).unwrap();
        buf.write_u8(0x00).unwrap();

        buf.seek(second_pos).unwrap();
        let mut name = String::new();
        buf.read_qname(&mut name).unwrap();
        assert_eq!(name, "example.com");
    }

    #[test]
    fn test_byte_buffer_end_of_buffer() {
        let mut buf = BytePacketBuffer::new();
        buf.seek(511).unwrap();
        assert!(buf.read().is_ok());
        assert!(matches!(buf.read(), Err(BufferError::EndOfBuffer)));
    }

    proptest::proptest! {
        #[test]
        fn qname_round_trip_preserves_labels(
            labels in proptest::collection::vec("[a-z0-9]{1,12}", 1..8)
        ) {
            let name = labels.join(".");
            let mut buf = VectorPacketBuffer::new();
            buf.write_qname(&name).unwrap();
            buf.seek(0).unwrap();
            let mut out = String::new();
            buf.read_qname(&mut out).unwrap();
            assert_eq!(out, name);
        }
    }
}
