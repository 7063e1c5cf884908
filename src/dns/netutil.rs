//! Length-prefix framing for DNS-over-TCP: a 2-byte big-endian length
//! ahead of each encoded packet (RFC 1035 §4.2.2).

use std::io::{Read, Result, Write};
use std::net::TcpStream;

pub fn read_packet_length(stream: &mut TcpStream) -> Result<u16> {
    read_packet_length_generic(stream)
}

pub fn write_packet_length(stream: &mut TcpStream, len: usize) -> Result<()> {
    write_packet_length_generic(stream, len)
}

pub fn read_packet_length_generic<R: Read>(stream: &mut R) -> Result<u16> {
    let mut len_buffer = [0; 2];
    stream.read_exact(&mut len_buffer)?;
    Ok(((len_buffer[0] as u16) << 8) | (len_buffer[1] as u16))
}

pub fn write_packet_length_generic<W: Write>(stream: &mut W, len: usize) -> Result<()> {
    let mut len_buffer = [0; 2];
    len_buffer[0] = (len >> 8) as u8;
    len_buffer[1] = (len & 0xFF) as u8;
    stream.write_all(&len_buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_length_prefix_round_trip() {
        let mut buf = Vec::new();
        write_packet_length_generic(&mut buf, 1300).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_packet_length_generic(&mut cursor).unwrap(), 1300);
    }
}
