// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT 3.1.1 packet codec.
//!
//! The subset the listener needs: CONNECT/CONNACK, SUBSCRIBE/SUBACK (QoS 1),
//! PUBLISH (inbound, QoS 0/1), PUBACK, PINGREQ/PINGRESP, DISCONNECT.
//!
//! # Wire Format
//!
//! ```text
//! +----------------------------------------------------------+
//! | Fixed header: type(4) | flags(4) | remaining length varint|
//! +----------------------------------------------------------+
//! | Variable header + payload (per packet type)               |
//! +----------------------------------------------------------+
//! ```
//!
//! Remaining length is 1-4 bytes, 7 bits per byte, high bit = continuation.
//! Multi-byte integers are big-endian; strings are u16-length-prefixed UTF-8.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};
use thiserror::Error;

// Packet type ids (high nibble of the fixed header byte).
const TYPE_CONNECT: u8 = 1;
const TYPE_CONNACK: u8 = 2;
const TYPE_PUBLISH: u8 = 3;
const TYPE_PUBACK: u8 = 4;
const TYPE_SUBSCRIBE: u8 = 8;
const TYPE_SUBACK: u8 = 9;
const TYPE_PINGREQ: u8 = 12;
const TYPE_PINGRESP: u8 = 13;
const TYPE_DISCONNECT: u8 = 14;

/// MQTT protocol level for 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed remaining length")]
    BadRemainingLength,

    #[error("unsupported packet type: {0}")]
    UnsupportedType(u8),

    #[error("invalid UTF-8 in string field")]
    BadString,

    #[error("unsupported QoS: {0}")]
    BadQos(u8),
}

/// An MQTT control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect {
        client_id: String,
        keep_alive_secs: u16,
        clean_session: bool,
    },
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    Publish {
        topic: String,
        /// Present for QoS 1 and above.
        packet_id: Option<u16>,
        payload: Vec<u8>,
        qos: u8,
        dup: bool,
        retain: bool,
    },
    PubAck {
        packet_id: u16,
    },
    Subscribe {
        packet_id: u16,
        topic: String,
        qos: u8,
    },
    SubAck {
        packet_id: u16,
        return_codes: Vec<u8>,
    },
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Encode the packet, appending fixed header and body to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut body = Vec::new();
        let header = match self {
            Packet::Connect {
                client_id,
                keep_alive_secs,
                clean_session,
            } => {
                write_string(&mut body, "MQTT");
                body.push(PROTOCOL_LEVEL);
                body.push(if *clean_session { 0x02 } else { 0x00 });
                body.extend_from_slice(&keep_alive_secs.to_be_bytes());
                write_string(&mut body, client_id);
                TYPE_CONNECT << 4
            }
            Packet::ConnAck {
                session_present,
                return_code,
            } => {
                body.push(if *session_present { 0x01 } else { 0x00 });
                body.push(*return_code);
                TYPE_CONNACK << 4
            }
            Packet::Publish {
                topic,
                packet_id,
                payload,
                qos,
                dup,
                retain,
            } => {
                write_string(&mut body, topic);
                if let Some(id) = packet_id {
                    body.extend_from_slice(&id.to_be_bytes());
                }
                body.extend_from_slice(payload);
                (TYPE_PUBLISH << 4)
                    | ((*dup as u8) << 3)
                    | ((*qos & 0x03) << 1)
                    | (*retain as u8)
            }
            Packet::PubAck { packet_id } => {
                body.extend_from_slice(&packet_id.to_be_bytes());
                TYPE_PUBACK << 4
            }
            Packet::Subscribe {
                packet_id,
                topic,
                qos,
            } => {
                body.extend_from_slice(&packet_id.to_be_bytes());
                write_string(&mut body, topic);
                body.push(*qos);
                // SUBSCRIBE requires fixed header flags 0b0010
                (TYPE_SUBSCRIBE << 4) | 0x02
            }
            Packet::SubAck {
                packet_id,
                return_codes,
            } => {
                body.extend_from_slice(&packet_id.to_be_bytes());
                body.extend_from_slice(return_codes);
                TYPE_SUBACK << 4
            }
            Packet::PingReq => TYPE_PINGREQ << 4,
            Packet::PingResp => TYPE_PINGRESP << 4,
            Packet::Disconnect => TYPE_DISCONNECT << 4,
        };

        buf.push(header);
        write_remaining_length(buf, body.len());
        buf.extend_from_slice(&body);
    }

    /// Decode a packet body given the fixed header byte.
    ///
    /// The caller has already consumed the remaining-length varint and read
    /// exactly `body` bytes.
    pub fn decode(header: u8, body: &[u8]) -> Result<Packet, CodecError> {
        let kind = header >> 4;
        let flags = header & 0x0F;
        let mut cursor = Cursor::new(body);

        let packet = match kind {
            TYPE_CONNECT => {
                let protocol = read_string(&mut cursor)?;
                if protocol != "MQTT" {
                    return Err(CodecError::BadString);
                }
                let _level = cursor.read_u8()?;
                let connect_flags = cursor.read_u8()?;
                let keep_alive_secs = cursor.read_u16::<BigEndian>()?;
                let client_id = read_string(&mut cursor)?;
                Packet::Connect {
                    client_id,
                    keep_alive_secs,
                    clean_session: connect_flags & 0x02 != 0,
                }
            }
            TYPE_CONNACK => {
                let ack_flags = cursor.read_u8()?;
                let return_code = cursor.read_u8()?;
                Packet::ConnAck {
                    session_present: ack_flags & 0x01 != 0,
                    return_code,
                }
            }
            TYPE_PUBLISH => {
                let dup = flags & 0x08 != 0;
                let qos = (flags >> 1) & 0x03;
                let retain = flags & 0x01 != 0;
                if qos > 2 {
                    return Err(CodecError::BadQos(qos));
                }

                let topic = read_string(&mut cursor)?;
                let packet_id = if qos > 0 {
                    Some(cursor.read_u16::<BigEndian>()?)
                } else {
                    None
                };
                let mut payload = Vec::new();
                cursor.read_to_end(&mut payload)?;
                Packet::Publish {
                    topic,
                    packet_id,
                    payload,
                    qos,
                    dup,
                    retain,
                }
            }
            TYPE_PUBACK => Packet::PubAck {
                packet_id: cursor.read_u16::<BigEndian>()?,
            },
            TYPE_SUBSCRIBE => {
                let packet_id = cursor.read_u16::<BigEndian>()?;
                let topic = read_string(&mut cursor)?;
                let qos = cursor.read_u8()?;
                if qos > 2 {
                    return Err(CodecError::BadQos(qos));
                }
                Packet::Subscribe {
                    packet_id,
                    topic,
                    qos,
                }
            }
            TYPE_SUBACK => {
                let packet_id = cursor.read_u16::<BigEndian>()?;
                let mut return_codes = Vec::new();
                cursor.read_to_end(&mut return_codes)?;
                Packet::SubAck {
                    packet_id,
                    return_codes,
                }
            }
            TYPE_PINGREQ => Packet::PingReq,
            TYPE_PINGRESP => Packet::PingResp,
            TYPE_DISCONNECT => Packet::Disconnect,
            other => return Err(CodecError::UnsupportedType(other)),
        };

        Ok(packet)
    }
}

/// Append a remaining-length varint (1-4 bytes).
pub fn write_remaining_length(buf: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if len == 0 {
            break;
        }
    }
}

/// Decode a remaining-length varint from a byte sequence.
///
/// Returns `(value, bytes consumed)`.
pub fn read_remaining_length(bytes: &[u8]) -> Result<(usize, usize), CodecError> {
    let mut value = 0usize;
    for (i, byte) in bytes.iter().enumerate() {
        if i >= 4 {
            return Err(CodecError::BadRemainingLength);
        }
        value |= ((byte & 0x7F) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::BadRemainingLength)
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, CodecError> {
    let len = cursor.read_u16::<BigEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| CodecError::BadString)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) -> Packet {
        let mut buf = Vec::new();
        packet.encode(&mut buf);

        let header = buf[0];
        let (len, consumed) = read_remaining_length(&buf[1..]).expect("remaining length");
        let body = &buf[1 + consumed..];
        assert_eq!(body.len(), len);

        Packet::decode(header, body).expect("decode")
    }

    #[test]
    fn test_connect_round_trip() {
        let packet = Packet::Connect {
            client_id: "coldtrace-listener".into(),
            keep_alive_secs: 30,
            clean_session: true,
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn test_publish_qos0_round_trip() {
        let packet = Packet::Publish {
            topic: "medicine/data".into(),
            packet_id: None,
            payload: br#"{"temp":22}"#.to_vec(),
            qos: 0,
            dup: false,
            retain: false,
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn test_publish_qos1_round_trip() {
        let packet = Packet::Publish {
            topic: "medicine/data".into(),
            packet_id: Some(7),
            payload: vec![1, 2, 3],
            qos: 1,
            dup: true,
            retain: false,
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn test_subscribe_suback_round_trip() {
        let subscribe = Packet::Subscribe {
            packet_id: 12,
            topic: "medicine/data".into(),
            qos: 1,
        };
        assert_eq!(round_trip(subscribe.clone()), subscribe);

        let suback = Packet::SubAck {
            packet_id: 12,
            return_codes: vec![0x01],
        };
        assert_eq!(round_trip(suback.clone()), suback);
    }

    #[test]
    fn test_empty_body_packets() {
        for packet in [Packet::PingReq, Packet::PingResp, Packet::Disconnect] {
            let mut buf = Vec::new();
            packet.encode(&mut buf);
            assert_eq!(buf.len(), 2);
            assert_eq!(buf[1], 0);
            assert_eq!(round_trip(packet.clone()), packet);
        }
    }

    #[test]
    fn test_subscribe_header_flags() {
        let mut buf = Vec::new();
        Packet::Subscribe {
            packet_id: 1,
            topic: "t".into(),
            qos: 1,
        }
        .encode(&mut buf);
        assert_eq!(buf[0], 0x82);
    }

    #[test]
    fn test_remaining_length_boundaries() {
        for (len, encoded) in [
            (0usize, vec![0x00]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16383, vec![0xFF, 0x7F]),
            (16384, vec![0x80, 0x80, 0x01]),
        ] {
            let mut buf = Vec::new();
            write_remaining_length(&mut buf, len);
            assert_eq!(buf, encoded, "encoding {}", len);

            let (decoded, consumed) = read_remaining_length(&buf).expect("decode");
            assert_eq!(decoded, len);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_malformed_remaining_length() {
        assert!(matches!(
            read_remaining_length(&[0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(CodecError::BadRemainingLength)
        ));
        assert!(matches!(
            read_remaining_length(&[0x80]),
            Err(CodecError::BadRemainingLength)
        ));
    }

    #[test]
    fn test_truncated_body_is_an_error() {
        // CONNACK with a one-byte body
        assert!(Packet::decode(TYPE_CONNACK << 4, &[0x00]).is_err());
    }

    #[test]
    fn test_unsupported_type() {
        assert!(matches!(
            Packet::decode(0x50, &[]),
            Err(CodecError::UnsupportedType(5))
        ));
    }
}
