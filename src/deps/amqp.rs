//! AMQP 0-9-1 connection-class framing.
//!
//! Covers only what opening and closing a broker connection needs: the
//! protocol header, method frames on channel 0, and heartbeats.
//!
//! # Frame layout
//! ```text
//! +------+---------+---------+-------------+-----------+
//! | type | channel |  size   |   payload   | frame-end |
//! |  u8  |   u16   |   u32   | size octets |   0xCE    |
//! +------+---------+---------+-------------+-----------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";

pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEARTBEAT: u8 = 8;
pub const FRAME_END: u8 = 0xCE;

pub const REPLY_SUCCESS: u16 = 200;
pub const ACCESS_REFUSED: u16 = 403;
pub const NOT_ALLOWED: u16 = 530;

/// Frame size accepted before tuning.
const MAX_FRAME_SIZE: u32 = 1 << 20;

const CONNECTION_CLASS: u16 = 10;

#[derive(Debug, Error)]
pub enum AmqpError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("peer does not speak AMQP 0-9-1")]
    UnsupportedProtocol,
}

fn protocol(message: impl Into<String>) -> AmqpError {
    AmqpError::Protocol(message.into())
}

/// A raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub channel: u16,
    pub payload: Bytes,
}

/// Connection-class methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Start {
        version_major: u8,
        version_minor: u8,
        mechanisms: String,
        locales: String,
    },
    StartOk {
        mechanism: String,
        response: Bytes,
        locale: String,
    },
    Tune {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    TuneOk {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    Open {
        virtual_host: String,
    },
    OpenOk,
    Close {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    CloseOk,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Start { .. } => "connection.start",
            Method::StartOk { .. } => "connection.start-ok",
            Method::Tune { .. } => "connection.tune",
            Method::TuneOk { .. } => "connection.tune-ok",
            Method::Open { .. } => "connection.open",
            Method::OpenOk => "connection.open-ok",
            Method::Close { .. } => "connection.close",
            Method::CloseOk => "connection.close-ok",
        }
    }

    fn method_id(&self) -> u16 {
        match self {
            Method::Start { .. } => 10,
            Method::StartOk { .. } => 11,
            Method::Tune { .. } => 30,
            Method::TuneOk { .. } => 31,
            Method::Open { .. } => 40,
            Method::OpenOk => 41,
            Method::Close { .. } => 50,
            Method::CloseOk => 51,
        }
    }

    /// SASL PLAIN response for `user`/`password`.
    pub fn plain_credentials(user: &str, password: &str) -> Bytes {
        let mut response = BytesMut::with_capacity(user.len() + password.len() + 2);
        response.put_u8(0);
        response.put_slice(user.as_bytes());
        response.put_u8(0);
        response.put_slice(password.as_bytes());
        response.freeze()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(CONNECTION_CLASS);
        buf.put_u16(self.method_id());

        match self {
            Method::Start {
                version_major,
                version_minor,
                mechanisms,
                locales,
            } => {
                buf.put_u8(*version_major);
                buf.put_u8(*version_minor);
                put_table(buf, &[]);
                put_long_str(buf, mechanisms.as_bytes());
                put_long_str(buf, locales.as_bytes());
            }
            Method::StartOk {
                mechanism,
                response,
                locale,
            } => {
                put_client_properties(buf);
                put_short_str(buf, mechanism);
                put_long_str(buf, response);
                put_short_str(buf, locale);
            }
            Method::Tune {
                channel_max,
                frame_max,
                heartbeat,
            }
            | Method::TuneOk {
                channel_max,
                frame_max,
                heartbeat,
            } => {
                buf.put_u16(*channel_max);
                buf.put_u32(*frame_max);
                buf.put_u16(*heartbeat);
            }
            Method::Open { virtual_host } => {
                put_short_str(buf, virtual_host);
                // reserved-1 (capabilities), reserved-2 (insist)
                put_short_str(buf, "");
                buf.put_u8(0);
            }
            Method::OpenOk => put_short_str(buf, ""),
            Method::Close {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                buf.put_u16(*reply_code);
                put_short_str(buf, reply_text);
                buf.put_u16(*class_id);
                buf.put_u16(*method_id);
            }
            Method::CloseOk => {}
        }
    }

    pub fn decode(payload: Bytes) -> Result<Self, AmqpError> {
        let mut d = Decoder(payload);
        let class_id = d.u16()?;
        let method_id = d.u16()?;

        if class_id != CONNECTION_CLASS {
            return Err(protocol(format!(
                "unexpected method {class_id}.{method_id} on channel 0"
            )));
        }

        let method = match method_id {
            10 => {
                let version_major = d.u8()?;
                let version_minor = d.u8()?;
                d.skip_table()?;
                Method::Start {
                    version_major,
                    version_minor,
                    mechanisms: d.long_string()?,
                    locales: d.long_string()?,
                }
            }
            11 => {
                d.skip_table()?;
                Method::StartOk {
                    mechanism: d.short_str()?,
                    response: d.long_bytes()?,
                    locale: d.short_str()?,
                }
            }
            30 | 31 => {
                let channel_max = d.u16()?;
                let frame_max = d.u32()?;
                let heartbeat = d.u16()?;
                if method_id == 30 {
                    Method::Tune {
                        channel_max,
                        frame_max,
                        heartbeat,
                    }
                } else {
                    Method::TuneOk {
                        channel_max,
                        frame_max,
                        heartbeat,
                    }
                }
            }
            40 => Method::Open {
                virtual_host: d.short_str()?,
            },
            41 => Method::OpenOk,
            50 => Method::Close {
                reply_code: d.u16()?,
                reply_text: d.short_str()?,
                class_id: d.u16()?,
                method_id: d.u16()?,
            },
            51 => Method::CloseOk,
            other => {
                return Err(protocol(format!(
                    "unsupported connection method {other}"
                )))
            }
        };

        Ok(method)
    }
}

/// Client properties advertising `authentication_failure_close`, so the
/// broker reports rejected credentials with `connection.close` instead of
/// dropping the socket.
fn put_client_properties(buf: &mut BytesMut) {
    let mut capabilities = BytesMut::new();
    put_short_str(&mut capabilities, "authentication_failure_close");
    capabilities.put_u8(b't');
    capabilities.put_u8(1);

    let mut product = BytesMut::new();
    product.put_slice(env!("CARGO_PKG_NAME").as_bytes());

    let mut entries = BytesMut::new();
    put_short_str(&mut entries, "product");
    entries.put_u8(b'S');
    put_long_str(&mut entries, &product);
    put_short_str(&mut entries, "capabilities");
    entries.put_u8(b'F');
    put_table(&mut entries, &capabilities);

    put_table(buf, &entries);
}

fn put_table(buf: &mut BytesMut, entries: &[u8]) {
    buf.put_u32(entries.len() as u32);
    buf.put_slice(entries);
}

fn put_short_str(buf: &mut BytesMut, value: &str) {
    let bytes = &value.as_bytes()[..value.len().min(u8::MAX as usize)];
    buf.put_u8(bytes.len() as u8);
    buf.put_slice(bytes);
}

fn put_long_str(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
}

struct Decoder(Bytes);

impl Decoder {
    fn need(&self, n: usize) -> Result<(), AmqpError> {
        if self.0.remaining() < n {
            return Err(protocol("truncated method payload"));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, AmqpError> {
        self.need(1)?;
        Ok(self.0.get_u8())
    }

    fn u16(&mut self) -> Result<u16, AmqpError> {
        self.need(2)?;
        Ok(self.0.get_u16())
    }

    fn u32(&mut self) -> Result<u32, AmqpError> {
        self.need(4)?;
        Ok(self.0.get_u32())
    }

    fn take(&mut self, n: usize) -> Result<Bytes, AmqpError> {
        self.need(n)?;
        Ok(self.0.split_to(n))
    }

    fn short_str(&mut self) -> Result<String, AmqpError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| protocol("short string is not UTF-8"))
    }

    fn long_bytes(&mut self) -> Result<Bytes, AmqpError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn long_string(&mut self) -> Result<String, AmqpError> {
        let bytes = self.long_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| protocol("long string is not UTF-8"))
    }

    fn skip_table(&mut self) -> Result<(), AmqpError> {
        self.long_bytes().map(|_| ())
    }
}

/// Read one frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, AmqpError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 7];
    reader.read_exact(&mut header).await?;

    // A broker that rejects our protocol version answers with its own header.
    if &header[..4] == b"AMQP" {
        return Err(AmqpError::UnsupportedProtocol);
    }

    let kind = header[0];
    let channel = u16::from_be_bytes([header[1], header[2]]);
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]);

    if size > MAX_FRAME_SIZE {
        return Err(protocol(format!("frame of {size} bytes exceeds limit")));
    }

    let mut payload = vec![0u8; size as usize + 1];
    reader.read_exact(&mut payload).await?;

    if payload.pop() != Some(FRAME_END) {
        return Err(protocol("missing frame-end octet"));
    }

    Ok(Frame {
        kind,
        channel,
        payload: Bytes::from(payload),
    })
}

/// Read the next connection method, skipping heartbeats.
pub async fn read_method<R>(reader: &mut R) -> Result<Method, AmqpError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = read_frame(reader).await?;
        match frame.kind {
            FRAME_HEARTBEAT => continue,
            FRAME_METHOD if frame.channel == 0 => return Method::decode(frame.payload),
            kind => {
                return Err(protocol(format!(
                    "unexpected frame type {kind} on channel {}",
                    frame.channel
                )))
            }
        }
    }
}

/// Write a connection method on channel 0.
pub async fn write_method<W>(writer: &mut W, method: &Method) -> Result<(), AmqpError>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = BytesMut::new();
    method.encode(&mut payload);

    let mut frame = BytesMut::with_capacity(payload.len() + 8);
    frame.put_u8(FRAME_METHOD);
    frame.put_u16(0);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(&payload);
    frame.put_u8(FRAME_END);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_heartbeat<W>(writer: &mut W) -> Result<(), AmqpError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&[FRAME_HEARTBEAT, 0, 0, 0, 0, 0, 0, FRAME_END])
        .await?;
    writer.flush().await?;
    Ok(())
}
