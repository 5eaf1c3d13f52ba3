// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Async MQTT client over a TCP stream.
//!
//! Single-connection, sequential delivery: one inbound PUBLISH at a time,
//! acknowledged explicitly by the caller. Keep-alive PINGREQs are sent when
//! the connection is idle. A broken connection surfaces as an error; the
//! caller owns the reconnect loop.

use super::packet::{CodecError, Packet};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Client connection options.
#[derive(Debug, Clone)]
pub struct MqttOptions {
    /// Client identifier sent in CONNECT.
    pub client_id: String,

    /// Keep-alive interval. Zero disables keep-alive pings.
    pub keep_alive: Duration,

    /// Request a clean session.
    pub clean_session: bool,
}

impl Default for MqttOptions {
    fn default() -> Self {
        Self {
            client_id: "coldtrace".to_string(),
            keep_alive: Duration::from_secs(30),
            clean_session: true,
        }
    }
}

/// One delivered message.
#[derive(Debug, Clone)]
pub struct InboundPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Present for QoS 1; must be acknowledged after the message is durable.
    pub packet_id: Option<u16>,
}

/// MQTT client errors.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("broker refused connection: return code {0}")]
    ConnectionRefused(u8),

    #[error("subscription refused: return code {0:#x}")]
    SubscribeFailed(u8),

    #[error("broker closed the connection")]
    Disconnected,

    #[error("protocol violation: {0}")]
    Protocol(&'static str),
}

/// MQTT 3.1.1 client bound to one broker connection.
pub struct MqttClient {
    stream: TcpStream,
    keep_alive: Duration,
    next_packet_id: u16,
}

impl MqttClient {
    /// Open a TCP connection and perform the CONNECT/CONNACK handshake.
    pub async fn connect(addr: &str, options: &MqttOptions) -> Result<Self, MqttError> {
        let stream = TcpStream::connect(addr).await?;
        let mut client = Self {
            stream,
            keep_alive: options.keep_alive,
            next_packet_id: 1,
        };

        client
            .send(&Packet::Connect {
                client_id: options.client_id.clone(),
                keep_alive_secs: options.keep_alive.as_secs().min(u16::MAX as u64) as u16,
                clean_session: options.clean_session,
            })
            .await?;

        match client.read_packet().await? {
            Packet::ConnAck { return_code: 0, .. } => Ok(client),
            Packet::ConnAck { return_code, .. } => Err(MqttError::ConnectionRefused(return_code)),
            _ => Err(MqttError::Protocol("expected CONNACK")),
        }
    }

    /// Subscribe to one topic at QoS 1 and wait for the SUBACK.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        let packet_id = self.take_packet_id();
        self.send(&Packet::Subscribe {
            packet_id,
            topic: topic.to_string(),
            qos: 1,
        })
        .await?;

        loop {
            match self.read_packet().await? {
                Packet::SubAck {
                    packet_id: ack_id,
                    return_codes,
                } => {
                    if ack_id != packet_id {
                        return Err(MqttError::Protocol("SUBACK packet id mismatch"));
                    }
                    match return_codes.first() {
                        Some(&code) if code <= 2 => return Ok(()),
                        Some(&code) => return Err(MqttError::SubscribeFailed(code)),
                        None => return Err(MqttError::Protocol("empty SUBACK")),
                    }
                }
                Packet::PingResp => continue,
                _ => return Err(MqttError::Protocol("expected SUBACK")),
            }
        }
    }

    /// Wait for the next inbound PUBLISH.
    ///
    /// Keep-alive is serviced transparently: when the connection is idle for
    /// a full keep-alive interval, a PINGREQ goes out and the wait resumes.
    pub async fn next_publish(&mut self) -> Result<InboundPublish, MqttError> {
        loop {
            let first = match self.read_first_byte().await {
                Ok(Some(byte)) => byte,
                Ok(None) => {
                    // Idle for a keep-alive interval
                    self.send(&Packet::PingReq).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.read_packet_after(first).await? {
                Packet::Publish {
                    topic,
                    packet_id,
                    payload,
                    ..
                } => {
                    return Ok(InboundPublish {
                        topic,
                        payload,
                        packet_id,
                    })
                }
                Packet::PingResp => continue,
                Packet::Disconnect => return Err(MqttError::Disconnected),
                other => {
                    tracing::trace!(?other, "ignoring unexpected packet");
                    continue;
                }
            }
        }
    }

    /// Acknowledge a QoS 1 delivery.
    pub async fn ack(&mut self, packet_id: u16) -> Result<(), MqttError> {
        self.send(&Packet::PubAck { packet_id }).await
    }

    /// Send DISCONNECT and close the connection.
    pub async fn disconnect(mut self) -> Result<(), MqttError> {
        self.send(&Packet::Disconnect).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), MqttError> {
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    /// Read the fixed-header byte, or `None` after a keep-alive interval of
    /// idleness. Only the first byte carries a timeout: once a packet has
    /// started, the rest is read to completion.
    async fn read_first_byte(&mut self) -> Result<Option<u8>, MqttError> {
        if self.keep_alive.is_zero() {
            return Ok(Some(self.read_u8_mapped().await?));
        }

        match tokio::time::timeout(self.keep_alive, self.read_u8_mapped()).await {
            Ok(Ok(byte)) => Ok(Some(byte)),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn read_u8_mapped(&mut self) -> Result<u8, MqttError> {
        match self.stream.read_u8().await {
            Ok(byte) => Ok(byte),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(MqttError::Disconnected),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_packet(&mut self) -> Result<Packet, MqttError> {
        let first = self.read_u8_mapped().await?;
        self.read_packet_after(first).await
    }

    /// Read remaining length and body after the fixed-header byte.
    async fn read_packet_after(&mut self, first: u8) -> Result<Packet, MqttError> {
        let len = self.read_remaining_length().await?;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;
        Ok(Packet::decode(first, &body)?)
    }

    async fn read_remaining_length(&mut self) -> Result<usize, MqttError> {
        let mut value = 0usize;
        for i in 0..4 {
            let byte = self.read_u8_mapped().await?;
            value |= ((byte & 0x7F) as usize) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::BadRemainingLength.into())
    }

    fn take_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal in-process broker side speaking the same codec.
    async fn read_broker_packet(stream: &mut TcpStream) -> Packet {
        let first = stream.read_u8().await.expect("header byte");
        let mut len = 0usize;
        for i in 0..4 {
            let byte = stream.read_u8().await.expect("length byte");
            len |= ((byte & 0x7F) as usize) << (7 * i);
            if byte & 0x80 == 0 {
                break;
            }
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.expect("body");
        Packet::decode(first, &body).expect("decode")
    }

    async fn write_broker_packet(stream: &mut TcpStream, packet: Packet) {
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        stream.write_all(&buf).await.expect("write");
    }

    #[tokio::test]
    async fn test_connect_subscribe_receive_ack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();

        let broker = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");

            match read_broker_packet(&mut stream).await {
                Packet::Connect { client_id, .. } => assert_eq!(client_id, "test-client"),
                other => panic!("expected CONNECT, got {:?}", other),
            }
            write_broker_packet(
                &mut stream,
                Packet::ConnAck {
                    session_present: false,
                    return_code: 0,
                },
            )
            .await;

            let packet_id = match read_broker_packet(&mut stream).await {
                Packet::Subscribe {
                    packet_id, topic, ..
                } => {
                    assert_eq!(topic, "medicine/data");
                    packet_id
                }
                other => panic!("expected SUBSCRIBE, got {:?}", other),
            };
            write_broker_packet(
                &mut stream,
                Packet::SubAck {
                    packet_id,
                    return_codes: vec![0x01],
                },
            )
            .await;

            write_broker_packet(
                &mut stream,
                Packet::Publish {
                    topic: "medicine/data".into(),
                    packet_id: Some(99),
                    payload: br#"{"temp":22}"#.to_vec(),
                    qos: 1,
                    dup: false,
                    retain: false,
                },
            )
            .await;

            match read_broker_packet(&mut stream).await {
                Packet::PubAck { packet_id } => assert_eq!(packet_id, 99),
                other => panic!("expected PUBACK, got {:?}", other),
            }
        });

        let options = MqttOptions {
            client_id: "test-client".into(),
            keep_alive: Duration::from_secs(5),
            clean_session: true,
        };
        let mut client = MqttClient::connect(&addr, &options).await.expect("connect");
        client.subscribe("medicine/data").await.expect("subscribe");

        let publish = client.next_publish().await.expect("publish");
        assert_eq!(publish.topic, "medicine/data");
        assert_eq!(publish.payload, br#"{"temp":22}"#);
        assert_eq!(publish.packet_id, Some(99));

        client.ack(99).await.expect("ack");
        broker.await.expect("broker task");
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let _ = read_broker_packet(&mut stream).await;
            write_broker_packet(
                &mut stream,
                Packet::ConnAck {
                    session_present: false,
                    return_code: 5, // not authorized
                },
            )
            .await;
        });

        let result = MqttClient::connect(&addr, &MqttOptions::default()).await;
        assert!(matches!(result, Err(MqttError::ConnectionRefused(5))));
    }

    #[tokio::test]
    async fn test_broker_close_surfaces_as_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let _ = read_broker_packet(&mut stream).await;
            write_broker_packet(
                &mut stream,
                Packet::ConnAck {
                    session_present: false,
                    return_code: 0,
                },
            )
            .await;
            // Drop the connection without a DISCONNECT.
        });

        let mut client = MqttClient::connect(&addr, &MqttOptions::default())
            .await
            .expect("connect");
        assert!(matches!(
            client.next_publish().await,
            Err(MqttError::Disconnected)
        ));
    }
}
