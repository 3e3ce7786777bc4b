//! Violet packet codec.
//!
//! Wire layout: `0x7F`, then any number of `[type:1][len:3 BE][data:len]`
//! blocks, then `0xFF`.

use crate::error::PacketError;

const HEADER: u8 = 0x7f;
const TRAILER: u8 = 0xff;
const MAX_BLOCK_LEN: usize = 0x00ff_ffff;

const AMBIENT: u8 = 0x04;
const MESSAGE: u8 = 0x0a;
const SLEEP: u8 = 0x0b;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Ambient services block (LED and ear states).
    Ambient(Vec<u8>),
    /// Message program, e.g. `"MU http://...\nPL 3\nMW\n"`.
    Message(String),
    /// `true` puts the device to sleep, `false` wakes it.
    Sleep(bool),
    /// Block types this server does not interpret; relayed untouched.
    Unknown { kind: u8, data: Vec<u8> },
}

impl Packet {
    pub fn message(program: impl Into<String>) -> Self {
        Packet::Message(program.into())
    }

    pub fn kind(&self) -> u8 {
        match self {
            Packet::Ambient(_) => AMBIENT,
            Packet::Message(_) => MESSAGE,
            Packet::Sleep(_) => SLEEP,
            Packet::Unknown { kind, .. } => *kind,
        }
    }

    fn data(&self) -> Vec<u8> {
        match self {
            Packet::Ambient(data) => data.clone(),
            Packet::Message(program) => program.as_bytes().to_vec(),
            Packet::Sleep(asleep) => vec![u8::from(*asleep)],
            Packet::Unknown { data, .. } => data.clone(),
        }
    }

    /// Encode a single block as a complete packet.
    pub fn encode(&self) -> Vec<u8> {
        encode(std::slice::from_ref(self))
    }
}

pub fn encode(packets: &[Packet]) -> Vec<u8> {
    let mut out = vec![HEADER];
    for packet in packets {
        let data = packet.data();
        let len = data.len().min(MAX_BLOCK_LEN);
        out.push(packet.kind());
        out.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&data[..len]);
    }
    out.push(TRAILER);
    out
}

pub fn decode(bytes: &[u8]) -> Result<Vec<Packet>, PacketError> {
    let (&first, mut rest) = bytes.split_first().ok_or(PacketError::Empty)?;
    if first != HEADER {
        return Err(PacketError::BadHeader(first));
    }

    let mut packets = Vec::new();
    loop {
        let offset = bytes.len() - rest.len();
        let (&kind, tail) = rest.split_first().ok_or(PacketError::Truncated(offset))?;
        if kind == TRAILER {
            if !tail.is_empty() {
                return Err(PacketError::TrailingData);
            }
            return Ok(packets);
        }
        if tail.len() < 3 {
            return Err(PacketError::Truncated(offset));
        }
        let len = u32::from_be_bytes([0, tail[0], tail[1], tail[2]]) as usize;
        let tail = &tail[3..];
        if tail.len() < len {
            return Err(PacketError::Truncated(offset));
        }
        let (data, next) = tail.split_at(len);
        packets.push(match kind {
            AMBIENT => Packet::Ambient(data.to_vec()),
            MESSAGE => Packet::Message(String::from_utf8_lossy(data).into_owned()),
            SLEEP if data.len() == 1 => Packet::Sleep(data[0] != 0),
            _ => Packet::Unknown {
                kind,
                data: data.to_vec(),
            },
        });
        rest = next;
    }
}
