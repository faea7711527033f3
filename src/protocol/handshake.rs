//! RTMP handshake, server side
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes) -------------->|
//!   |                                        |
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes) ---------------|
//!   |<------ S2 (1536 bytes) ---------------|
//!   |                                        |
//!   |------- C2 (1536 bytes) -------------->|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! Modern encoders use the "complex" handshake: C1 hides an HMAC-SHA256
//! digest inside one of two 764-byte blocks (schema 0: digest block first,
//! schema 1: digest block second). Older encoders use the simple handshake
//! with a zeroed version field and no digest. On C1 we try schema 0, then
//! schema 1, then simple; the first validator that accepts decides the
//! flavor for the rest of the exchange. C2 content is not validated.

use bytes::{BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

type HmacSha256 = Hmac<Sha256>;

const DIGEST_LEN: usize = 32;

/// "Genuine Adobe Flash Player 001" plus the shared tail bytes
const GENUINE_FP_KEY: [u8; 62] = [
    b'G', b'e', b'n', b'u', b'i', b'n', b'e', b' ', b'A', b'd', b'o', b'b', b'e', b' ',
    b'F', b'l', b'a', b's', b'h', b' ', b'P', b'l', b'a', b'y', b'e', b'r', b' ', b'0',
    b'0', b'1', 0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E, 0x00, 0xD0, 0xD1,
    0x02, 0x9E, 0x7E, 0x57, 0x6E, 0xEC, 0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB, 0x93, 0xB8,
    0xE6, 0x36, 0xCF, 0xEB, 0x31, 0xAE,
];

/// "Genuine Adobe Flash Media Server 001" plus the shared tail bytes
const GENUINE_FMS_KEY: [u8; 68] = [
    b'G', b'e', b'n', b'u', b'i', b'n', b'e', b' ', b'A', b'd', b'o', b'b', b'e', b' ',
    b'F', b'l', b'a', b's', b'h', b' ', b'M', b'e', b'd', b'i', b'a', b' ', b'S', b'e',
    b'r', b'v', b'e', b'r', b' ', b'0', b'0', b'1', 0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68,
    0xBE, 0xE8, 0x2E, 0x00, 0xD0, 0xD1, 0x02, 0x9E, 0x7E, 0x57, 0x6E, 0xEC, 0x5D, 0x2D,
    0x29, 0x80, 0x6F, 0xAB, 0x93, 0xB8, 0xE6, 0x36, 0xCF, 0xEB, 0x31, 0xAE,
];

/// Which handshake flavor C1 validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    Simple,
    ComplexSchema0,
    ComplexSchema1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Waiting for the client's C0+C1
    WaitingForClientHello,
    /// S0S1S2 sent, waiting for C2
    WaitingForClientEcho,
    /// Handshake complete
    Done,
}

/// Server-side handshake state machine
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    kind: Option<HandshakeKind>,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::WaitingForClientHello,
            kind: None,
        }
    }

    /// True once C2 has been consumed
    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// The flavor C1 validated against; set after C0C1 is processed
    pub fn kind(&self) -> Option<HandshakeKind> {
        self.kind
    }

    /// Feed buffered bytes; returns S0S1S2 when C0C1 has arrived
    ///
    /// Consumes nothing until a full packet for the current state is
    /// buffered, so callers just accumulate and retry.
    pub fn process(&mut self, data: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.state {
            HandshakeState::WaitingForClientHello => self.process_client_hello(data),
            HandshakeState::WaitingForClientEcho => self.process_client_echo(data),
            HandshakeState::Done => Ok(None),
        }
    }

    fn process_client_hello(&mut self, data: &mut BytesMut) -> Result<Option<Bytes>> {
        if data.len() < 1 + HANDSHAKE_SIZE {
            return Ok(None);
        }

        let version = data[0];
        // Lenient: some encoders send values above 3.
        if version < RTMP_VERSION {
            return Err(HandshakeError::InvalidVersion(version).into());
        }

        let mut c1 = [0u8; HANDSHAKE_SIZE];
        c1.copy_from_slice(&data[1..1 + HANDSHAKE_SIZE]);
        let _ = data.split_to(1 + HANDSHAKE_SIZE);

        let (kind, client_digest) = validate_c1(&c1)?;
        self.kind = Some(kind);

        let mut response = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
        response.put_u8(RTMP_VERSION);
        match kind {
            HandshakeKind::Simple => {
                response.put_slice(&generate_simple_s1());
                response.put_slice(&generate_simple_s2(&c1));
            }
            HandshakeKind::ComplexSchema0 | HandshakeKind::ComplexSchema1 => {
                let digest = client_digest.expect("complex kinds carry a digest");
                response.put_slice(&generate_complex_s1());
                response.put_slice(&generate_complex_s2(&digest));
            }
        }

        tracing::debug!(kind = ?kind, "Handshake C1 validated");
        self.state = HandshakeState::WaitingForClientEcho;
        Ok(Some(response.freeze()))
    }

    fn process_client_echo(&mut self, data: &mut BytesMut) -> Result<Option<Bytes>> {
        if data.len() < HANDSHAKE_SIZE {
            return Ok(None);
        }

        // C2 content is not validated; consuming it completes the
        // handshake.
        let _ = data.split_to(HANDSHAKE_SIZE);
        self.state = HandshakeState::Done;
        Ok(None)
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate C1, trying complex schema 0, complex schema 1, then simple
fn validate_c1(c1: &[u8; HANDSHAKE_SIZE]) -> Result<(HandshakeKind, Option<[u8; DIGEST_LEN]>)> {
    if let Some(digest) = validate_digest(c1, digest_offset(c1, 8)) {
        return Ok((HandshakeKind::ComplexSchema0, Some(digest)));
    }
    if let Some(digest) = validate_digest(c1, digest_offset(c1, 772)) {
        return Ok((HandshakeKind::ComplexSchema1, Some(digest)));
    }
    // Simple handshake announces itself with a zeroed version field.
    if c1[4..8] == [0, 0, 0, 0] {
        return Ok((HandshakeKind::Simple, None));
    }
    Err(HandshakeError::DigestMismatch.into())
}

/// Digest position inside the 764-byte block starting at `block`
///
/// The first four bytes of the block are an offset field; the digest sits
/// `sum(offset bytes) % 728` bytes past them.
fn digest_offset(packet: &[u8; HANDSHAKE_SIZE], block: usize) -> usize {
    let sum: usize = packet[block..block + 4].iter().map(|&b| b as usize).sum();
    block + 4 + sum % 728
}

/// Check the HMAC at `offset` against the rest of the packet
fn validate_digest(
    packet: &[u8; HANDSHAKE_SIZE],
    offset: usize,
) -> Option<[u8; DIGEST_LEN]> {
    let expected = hmac_excluding(&GENUINE_FP_KEY[..30], packet, offset);
    if expected[..] == packet[offset..offset + DIGEST_LEN] {
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&packet[offset..offset + DIGEST_LEN]);
        Some(digest)
    } else {
        None
    }
}

/// HMAC-SHA256 over the packet with the 32-byte digest region skipped
fn hmac_excluding(key: &[u8], packet: &[u8; HANDSHAKE_SIZE], offset: usize) -> [u8; DIGEST_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(&packet[..offset]);
    mac.update(&packet[offset + DIGEST_LEN..]);
    mac.finalize().into_bytes().into()
}

fn hmac_over(key: &[u8], data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn unix_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// Fill with pseudo-random bytes
///
/// The handshake filler carries no secrets, so a seeded LCG is enough.
fn fill_random(buf: &mut [u8], mut seed: u64) {
    for chunk in buf.chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = seed.to_le_bytes();
        let len = chunk.len().min(8);
        chunk[..len].copy_from_slice(&bytes[..len]);
    }
}

/// S1 for the simple handshake: time + zero + random
fn generate_simple_s1() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    let timestamp = unix_millis();
    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());
    fill_random(&mut packet[8..], timestamp as u64);
    packet
}

/// S2 for the simple handshake: echo C1 with our receive timestamp
fn generate_simple_s2(c1: &[u8; HANDSHAKE_SIZE]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = *c1;
    echo[4..8].copy_from_slice(&unix_millis().to_be_bytes());
    echo
}

/// S1 for the complex handshake: random packet with an FMS-keyed digest
/// embedded at the schema-0 position
fn generate_complex_s1() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    let timestamp = unix_millis();
    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());
    packet[4..8].copy_from_slice(&[4, 5, 0, 1]);
    fill_random(&mut packet[8..], timestamp as u64 ^ 0x5DEECE66D);

    let offset = digest_offset(&packet, 8);
    let digest = hmac_excluding(&GENUINE_FMS_KEY[..36], &packet, offset);
    packet[offset..offset + DIGEST_LEN].copy_from_slice(&digest);
    packet
}

/// S2 for the complex handshake: random body signed with a key derived
/// from the client's digest
fn generate_complex_s2(client_digest: &[u8; DIGEST_LEN]) -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    fill_random(
        &mut packet[..HANDSHAKE_SIZE - DIGEST_LEN],
        unix_millis() as u64 ^ 0x2545F491,
    );

    let signing_key = hmac_over(&GENUINE_FMS_KEY, client_digest);
    let signature = hmac_over(&signing_key, &packet[..HANDSHAKE_SIZE - DIGEST_LEN]);
    packet[HANDSHAKE_SIZE - DIGEST_LEN..].copy_from_slice(&signature);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a complex C1 the way a Flash-player-side encoder would
    fn make_complex_c1(schema1: bool, seed: u64) -> [u8; HANDSHAKE_SIZE] {
        let mut packet = [0u8; HANDSHAKE_SIZE];
        packet[0..4].copy_from_slice(&1000u32.to_be_bytes());
        packet[4..8].copy_from_slice(&[9, 0, 124, 2]);
        fill_random(&mut packet[8..], seed);

        let block = if schema1 { 772 } else { 8 };
        let offset = digest_offset(&packet, block);
        let digest = hmac_excluding(&GENUINE_FP_KEY[..30], &packet, offset);
        packet[offset..offset + DIGEST_LEN].copy_from_slice(&digest);
        packet
    }

    fn make_simple_c1(seed: u64) -> [u8; HANDSHAKE_SIZE] {
        let mut packet = [0u8; HANDSHAKE_SIZE];
        packet[0..4].copy_from_slice(&1000u32.to_be_bytes());
        fill_random(&mut packet[8..], seed);
        packet
    }

    fn run_c0c1(c1: [u8; HANDSHAKE_SIZE]) -> (Handshake, Result<Option<Bytes>>) {
        let mut handshake = Handshake::new();
        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&c1);
        let response = handshake.process(&mut buf);
        (handshake, response)
    }

    #[test]
    fn test_schema0_c1_detected() {
        let (handshake, response) = run_c0c1(make_complex_c1(false, 42));
        let response = response.unwrap().expect("S0S1S2");
        assert_eq!(response.len(), 1 + HANDSHAKE_SIZE * 2);
        assert_eq!(handshake.kind(), Some(HandshakeKind::ComplexSchema0));
    }

    #[test]
    fn test_schema1_c1_detected() {
        let (handshake, _) = run_c0c1(make_complex_c1(true, 43));
        assert_eq!(handshake.kind(), Some(HandshakeKind::ComplexSchema1));
    }

    #[test]
    fn test_simple_c1_detected() {
        let (handshake, response) = run_c0c1(make_simple_c1(44));
        let response = response.unwrap().expect("S0S1S2");
        assert_eq!(handshake.kind(), Some(HandshakeKind::Simple));
        // Simple S2 echoes C1's random data.
        let c1 = make_simple_c1(44);
        assert_eq!(&response[1 + HANDSHAKE_SIZE + 8..], &c1[8..]);
    }

    #[test]
    fn test_corrupted_digest_rejected() {
        let mut c1 = make_complex_c1(false, 45);
        let offset = digest_offset(&c1, 8);
        c1[offset] ^= 0xFF;

        let (_, response) = run_c0c1(c1);
        assert!(response.is_err());
    }

    #[test]
    fn test_invalid_version_rejected() {
        let mut handshake = Handshake::new();
        let mut buf = BytesMut::new();
        buf.put_u8(2);
        buf.put_slice(&make_simple_c1(46));

        assert!(handshake.process(&mut buf).is_err());
    }

    #[test]
    fn test_complex_s1_carries_valid_server_digest() {
        let s1 = generate_complex_s1();
        let offset = digest_offset(&s1, 8);
        let expected = hmac_excluding(&GENUINE_FMS_KEY[..36], &s1, offset);
        assert_eq!(&s1[offset..offset + DIGEST_LEN], &expected[..]);
    }

    #[test]
    fn test_complex_s2_signature_verifies() {
        let c1 = make_complex_c1(false, 47);
        let offset = digest_offset(&c1, 8);
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&c1[offset..offset + DIGEST_LEN]);

        let s2 = generate_complex_s2(&digest);
        let key = hmac_over(&GENUINE_FMS_KEY, &digest);
        let expected = hmac_over(&key, &s2[..HANDSHAKE_SIZE - DIGEST_LEN]);
        assert_eq!(&s2[HANDSHAKE_SIZE - DIGEST_LEN..], &expected[..]);
    }

    #[test]
    fn test_full_exchange_completes() {
        let mut handshake = Handshake::new();
        let mut buf = BytesMut::new();
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&make_complex_c1(false, 48));

        let response = handshake.process(&mut buf).unwrap();
        assert!(response.is_some());
        assert!(!handshake.is_done());

        // C2: echo of S1, content is not validated
        buf.put_slice(&[0u8; HANDSHAKE_SIZE]);
        let response = handshake.process(&mut buf).unwrap();
        assert!(response.is_none());
        assert!(handshake.is_done());
    }

    #[test]
    fn test_incomplete_packets_consume_nothing() {
        let mut handshake = Handshake::new();
        let mut buf = BytesMut::new();
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&[0u8; 100]);

        let before = buf.len();
        let response = handshake.process(&mut buf).unwrap();
        assert!(response.is_none());
        assert_eq!(buf.len(), before);
    }

    #[test]
    fn test_leftover_bytes_preserved_after_c0c1() {
        // Chunk data pipelined right behind C0C1 must survive.
        let mut handshake = Handshake::new();
        let mut buf = BytesMut::new();
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&make_simple_c1(49));
        buf.put_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        handshake.process(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }
}
