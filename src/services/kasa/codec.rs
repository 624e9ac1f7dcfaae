//! Kasa wire format.
//!
//! Payloads are JSON, obfuscated with an XOR autokey stream cipher seeded
//! with 171. Over TCP each payload is prefixed with its length as a u32
//! big-endian; UDP discovery sends the bare ciphertext.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::KasaError;

pub const SEED_KEY: u8 = 171;
pub const HEADER_LEN: usize = 4;

/// Upper bound on a declared frame length. Real replies are a few KB.
const MAX_FRAME_LEN: usize = 1 << 20;

/// The key for the next byte is always the previous ciphertext byte.
pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = SEED_KEY;
    plain
        .iter()
        .map(|&p| {
            let c = key ^ p;
            key = c;
            c
        })
        .collect()
}

pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = SEED_KEY;
    cipher
        .iter()
        .map(|&c| {
            let p = key ^ c;
            key = c;
            p
        })
        .collect()
}

/// Length-prefixed ciphertext, ready for a TCP write.
pub fn frame(plain: &[u8]) -> Vec<u8> {
    let cipher = encrypt(plain);
    let mut out = Vec::with_capacity(HEADER_LEN + cipher.len());
    out.extend_from_slice(&(cipher.len() as u32).to_be_bytes());
    out.extend_from_slice(&cipher);
    out
}

/// Frames plaintext JSON bytes out and decrypted JSON bytes in.
#[derive(Debug, Default, Clone, Copy)]
pub struct KasaCodec;

impl Decoder for KasaCodec {
    type Item = Vec<u8>;
    type Error = KasaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let declared = u32::from_be_bytes(header) as usize;
        if declared > MAX_FRAME_LEN {
            return Err(KasaError::InvalidResponse(format!(
                "declared frame length {declared} exceeds limit"
            )));
        }

        if src.len() < HEADER_LEN + declared {
            src.reserve(HEADER_LEN + declared - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(declared);
        Ok(Some(decrypt(&payload)))
    }
}

impl Encoder<Vec<u8>> for KasaCodec {
    type Error = KasaError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let cipher = encrypt(&item);
        dst.reserve(HEADER_LEN + cipher.len());
        dst.put_u32(cipher.len() as u32);
        dst.put_slice(&cipher);
        Ok(())
    }
}
