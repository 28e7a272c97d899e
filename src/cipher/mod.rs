//! Team broadcast codec.
//!
//! Turns a plaintext broadcast into a text-safe envelope:
//!
//! ```text
//! nibble_encode( header(12 bytes, big-endian) || xor(plaintext, key, rotation) )
//! header = sender_id:u16 | counter:u8 | rotation:u8 | timestamp:u32 | checksum:[u8; 2] | length:u16
//! ```
//!
//! The key is derived from the team name alone, so every agent of a team can
//! read every other agent's broadcasts. This is an obfuscation layer, not a
//! confidentiality boundary.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

/// Salt shared by every agent for team key derivation.
pub const KEY_SALT: &[u8] = b"3301";

/// PBKDF2 rounds for team key derivation.
pub const KEY_ITERATIONS: u32 = 10_000;

/// Length of the derived team key in bytes.
pub const KEY_LEN: usize = 2048;

/// Size of the fixed binary header.
pub const HEADER_LEN: usize = 12;

/// Glyph for each nibble value; index = nibble.
pub const NIBBLE_ALPHABET: &[u8; 16] = b"AIOUaiouqpdbQPDB";

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Ways an inbound envelope can fail to decode. All of them are non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("nibble-encoded text has odd length")]
    OddLength,

    #[error("character {0:?} is outside the nibble alphabet")]
    InvalidGlyph(char),

    #[error("envelope shorter than its header or declared length")]
    Truncated,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("decrypted payload is not valid text")]
    InvalidText,

    #[error("payload of {0} bytes does not fit the u16 length field")]
    TooLong(usize),
}

// ---------------------------------------------------------------------------
// Team secret
// ---------------------------------------------------------------------------

/// Key bytes derived from a team name. Never transmitted.
#[derive(Clone, PartialEq, Eq)]
pub struct TeamSecret(Vec<u8>);

impl TeamSecret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for TeamSecret {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for TeamSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TeamSecret({} bytes)", self.0.len())
    }
}

/// Derive the team key. Expensive; call once per process.
pub fn derive_key(team_name: &str) -> TeamSecret {
    let mut key = vec![0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(team_name.as_bytes(), KEY_SALT, KEY_ITERATIONS, &mut key);
    TeamSecret(key)
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Repeating-key XOR starting at `offset` into the key. Self-inverse.
pub fn xor_cipher(data: &[u8], key: &[u8], offset: usize) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ key[(i + offset) % key.len()])
        .collect()
}

/// 32-bit FNV-1a truncated to its low 16 bits, big-endian.
pub fn checksum(data: &[u8]) -> [u8; 2] {
    let mut h = FNV_OFFSET_BASIS;
    for byte in data {
        h ^= u32::from(*byte);
        h = h.wrapping_mul(FNV_PRIME);
    }
    let [_, _, hi, lo] = h.to_be_bytes();
    [hi, lo]
}

/// Two glyphs per byte, high nibble first.
pub fn nibble_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push(NIBBLE_ALPHABET[usize::from(byte >> 4)] as char);
        out.push(NIBBLE_ALPHABET[usize::from(byte & 0x0F)] as char);
    }
    out
}

fn glyph_value(c: char) -> Result<u8, CodecError> {
    NIBBLE_ALPHABET
        .iter()
        .position(|g| *g as char == c)
        .map(|i| i as u8)
        .ok_or(CodecError::InvalidGlyph(c))
}

pub fn nibble_decode(text: &str) -> Result<Vec<u8>, CodecError> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() % 2 != 0 {
        return Err(CodecError::OddLength);
    }
    chars
        .chunks_exact(2)
        .map(|pair| Ok((glyph_value(pair[0])? << 4) | glyph_value(pair[1])?))
        .collect()
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    sender_id: u16,
    counter: u8,
    rotation: u8,
    timestamp: u32,
    checksum: [u8; 2],
    length: u16,
}

impl Header {
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.sender_id.to_be_bytes());
        out[2] = self.counter;
        out[3] = self.rotation;
        out[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        out[8..10].copy_from_slice(&self.checksum);
        out[10..12].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    fn from_bytes(raw: &[u8]) -> Result<Self, CodecError> {
        if raw.len() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        Ok(Self {
            sender_id: u16::from_be_bytes([raw[0], raw[1]]),
            counter: raw[2],
            rotation: raw[3],
            timestamp: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
            checksum: [raw[8], raw[9]],
            length: u16::from_be_bytes([raw[10], raw[11]]),
        })
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A broadcast that decoded and passed its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub sender_id: u16,
    pub counter: u8,
    pub timestamp: u32,
    pub content: String,
}

/// Encode with the current wall-clock timestamp.
pub fn encode(
    sender_id: u16,
    counter: u8,
    plaintext: &[u8],
    key: &TeamSecret,
) -> Result<String, CodecError> {
    let now = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX);
    encode_at(sender_id, counter, plaintext, key, now)
}

/// Encode with an explicit timestamp.
pub fn encode_at(
    sender_id: u16,
    counter: u8,
    plaintext: &[u8],
    key: &TeamSecret,
    timestamp: u32,
) -> Result<String, CodecError> {
    let length = u16::try_from(plaintext.len()).map_err(|_| CodecError::TooLong(plaintext.len()))?;
    // The header only has a byte for the rotation; a key longer than 255
    // bytes still rotates by the counter alone.
    let rotation = (usize::from(counter) % key.len().max(1)) as u8;
    let ciphertext = xor_cipher(plaintext, key.as_bytes(), usize::from(rotation));

    let header = Header {
        sender_id,
        counter,
        rotation,
        timestamp,
        checksum: checksum(&ciphertext),
        length,
    };

    let mut envelope = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    envelope.extend_from_slice(&header.to_bytes());
    envelope.extend_from_slice(&ciphertext);
    Ok(nibble_encode(&envelope))
}

/// Decode an envelope with the local team key.
pub fn decode(text: &str, key: &TeamSecret) -> Result<DecodedMessage, CodecError> {
    let raw = nibble_decode(text)?;
    let header = Header::from_bytes(&raw)?;

    let end = HEADER_LEN + usize::from(header.length);
    let ciphertext = raw.get(HEADER_LEN..end).ok_or(CodecError::Truncated)?;

    if checksum(ciphertext) != header.checksum {
        return Err(CodecError::ChecksumMismatch);
    }

    let plaintext = xor_cipher(ciphertext, key.as_bytes(), usize::from(header.rotation));
    let content = String::from_utf8(plaintext).map_err(|_| CodecError::InvalidText)?;

    Ok(DecodedMessage {
        sender_id: header.sender_id,
        counter: header.counter,
        timestamp: header.timestamp,
        content,
    })
}
