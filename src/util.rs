//! # MQTT Serialization Utilities
//!
//! This module provides helper functions for reading and writing MQTT-specific data types
//! from and to byte buffers, such as variable-byte integers and length-prefixed strings.

use crate::error::{MqttError, ProtocolError};
use crate::transport::ErrorPlaceHolder;

/// Result type of the codec helpers.
pub type CodecResult<T> = Result<T, MqttError<ErrorPlaceHolder>>;

/// Largest value a four-byte variable-byte integer can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// Returns `Ok(None)` when the buffer ends before the integer does.
pub fn try_read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> CodecResult<Option<usize>> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let Some(encoded_byte) = buf.get(*cursor + i) else {
            return Ok(None);
        };
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
    }
    *cursor += i + 1;
    Ok(Some(value))
}

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// This is a common encoding scheme in MQTT for packet lengths.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> CodecResult<usize> {
    try_read_variable_byte_integer(cursor, buf)?
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))
}

/// Writes a variable-byte integer to the start of the buffer and returns the byte count.
pub fn write_variable_byte_integer_len(buf: &mut [u8], mut val: usize) -> CodecResult<usize> {
    if val > MAX_REMAINING_LENGTH {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(MqttError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a big-endian `u16`, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> CodecResult<u16> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> CodecResult<&'a str> {
    let len = read_u16(cursor, buf)? as usize;
    let s = core::str::from_utf8(
        buf.get(*cursor..*cursor + len)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?,
    )
    .map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))?;
    *cursor += len;
    Ok(s)
}

/// Writes binary data (prefixed with a 2-byte length) to the buffer.
pub fn write_binary(buf: &mut [u8], data: &[u8]) -> CodecResult<usize> {
    let len = data.len();
    if len > u16::MAX as usize {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let len_bytes = (len as u16).to_be_bytes();

    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(MqttError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&len_bytes);
    slice[2..].copy_from_slice(data);
    Ok(required_space)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) to the buffer.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> CodecResult<usize> {
    write_binary(buf, s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_byte_integer_boundaries() {
        for (value, encoded) in [
            (0usize, &[0x00u8][..]),
            (127, &[0x7F][..]),
            (128, &[0x80, 0x01][..]),
            (16_383, &[0xFF, 0x7F][..]),
            (16_384, &[0x80, 0x80, 0x01][..]),
            (MAX_REMAINING_LENGTH, &[0xFF, 0xFF, 0xFF, 0x7F][..]),
        ] {
            let mut buf = [0u8; 4];
            let n = write_variable_byte_integer_len(&mut buf, value).unwrap();
            assert_eq!(&buf[..n], encoded);

            let mut cursor = 0;
            assert_eq!(read_variable_byte_integer(&mut cursor, encoded).unwrap(), value);
            assert_eq!(cursor, encoded.len());
        }
    }

    #[test]
    fn test_variable_byte_integer_too_long() {
        let mut cursor = 0;
        assert!(matches!(
            read_variable_byte_integer(&mut cursor, &[0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
            Err(MqttError::Protocol(ProtocolError::MalformedPacket))
        ));
        assert!(matches!(
            write_variable_byte_integer_len(&mut [0u8; 8], MAX_REMAINING_LENGTH + 1),
            Err(MqttError::Protocol(ProtocolError::PayloadTooLarge))
        ));
    }

    #[test]
    fn test_incomplete_variable_byte_integer() {
        let mut cursor = 0;
        assert_eq!(
            try_read_variable_byte_integer(&mut cursor, &[0x80, 0x80]).unwrap(),
            None
        );
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_utf8_string() {
        let mut buf = [0u8; 16];
        let n = write_utf8_string(&mut buf, "MQTT").unwrap();
        assert_eq!(&buf[..n], &[0x00, 0x04, b'M', b'Q', b'T', b'T']);

        let mut cursor = 0;
        assert_eq!(read_utf8_string(&mut cursor, &buf[..n]).unwrap(), "MQTT");
        assert_eq!(cursor, n);
    }

    #[test]
    fn test_utf8_string_errors() {
        let mut cursor = 0;
        assert!(matches!(
            read_utf8_string(&mut cursor, &[0x00, 0x05, b'a']),
            Err(MqttError::Protocol(ProtocolError::MalformedPacket))
        ));

        let mut cursor = 0;
        assert!(matches!(
            read_utf8_string(&mut cursor, &[0x00, 0x02, 0xC3, 0x28]),
            Err(MqttError::Protocol(ProtocolError::InvalidUtf8String))
        ));

        assert!(matches!(
            write_utf8_string(&mut [0u8; 3], "abc"),
            Err(MqttError::BufferTooSmall)
        ));
    }
}
