//! l33t envelope
//! 
//! A replay file starts with the four ASCII bytes `l33t`, then a 32 bit
//! little endian length, then a zlib stream holding the real payload.  The
//! length is advisory only; the game writes it but nothing checks it, so the
//! decoder inflates whatever remains in the stream instead of trusting it.
//! 
//! Gzip wrapping of the outer file is a CLI concern; this module never looks
//! for gzip.

use std::io::{Read,ErrorKind};
use flate2::read::ZlibDecoder;
use crate::Error;

/// the envelope magic
pub const MAGIC: &[u8;4] = b"l33t";

/// Validate the envelope and inflate the payload.
/// `stream` is anything readable, usually `std::fs::File` or a byte slice.
/// Returns the decompressed buffer.
pub fn decompress_l33t<R: Read>(stream: &mut R) -> Result<Vec<u8>,Error> {
    let mut magic = [0u8;4];
    match stream.read_exact(&mut magic) {
        Ok(()) => {},
        Err(e) if e.kind()==ErrorKind::UnexpectedEof => return Err(Error::BadMagic),
        Err(e) => return Err(Error::Io(e))
    }
    if &magic != MAGIC {
        return Err(Error::BadMagic);
    }
    let mut len_bytes = [0u8;4];
    match stream.read_exact(&mut len_bytes) {
        Ok(()) => {},
        Err(e) if e.kind()==ErrorKind::UnexpectedEof => return Err(Error::Bounds { offset: 4, width: 4 }),
        Err(e) => return Err(Error::Io(e))
    }
    // advisory only, the payload runs to the end of the stream
    log::debug!("envelope advertises {} compressed bytes",i32::from_le_bytes(len_bytes));
    let mut inflated = Vec::new();
    ZlibDecoder::new(stream).read_to_end(&mut inflated).map_err(Error::Decompress)?;
    log::debug!("inflated payload of {} bytes",inflated.len());
    Ok(inflated)
}

#[cfg(test)]
fn deflate(payload: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(),flate2::Compression::default());
    enc.write_all(payload).expect("deflate failed");
    enc.finish().expect("deflate failed")
}

#[cfg(test)]
pub fn wrap_l33t(payload: &[u8]) -> Vec<u8> {
    let z = deflate(payload);
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&(z.len() as i32).to_le_bytes());
    out.extend_from_slice(&z);
    out
}

#[test]
fn valid_envelope() {
    let stream = wrap_l33t(b"hello world");
    let buf = decompress_l33t(&mut stream.as_slice()).expect("decode failed");
    assert_eq!(buf,b"hello world");
}

#[test]
fn envelope_inverts_compression() {
    let payload: Vec<u8> = (0u16..2048).map(|i| (i % 251) as u8).collect();
    let stream = wrap_l33t(&payload);
    let buf = decompress_l33t(&mut stream.as_slice()).expect("decode failed");
    assert_eq!(buf,payload);
}

#[test]
fn invalid_magic() {
    let mut stream = b"abcd".to_vec();
    stream.extend_from_slice(&deflate(b"hello world"));
    match decompress_l33t(&mut stream.as_slice()) {
        Err(Error::BadMagic) => {},
        other => panic!("expected bad magic, got {:?}",other)
    }
}

#[test]
fn empty_stream() {
    match decompress_l33t(&mut (&[] as &[u8])) {
        Err(Error::BadMagic) => {},
        other => panic!("expected bad magic, got {:?}",other)
    }
}

#[test]
fn truncated_payload() {
    // advertised length is far larger than the garbage that follows
    let mut stream = b"l33t".to_vec();
    stream.extend_from_slice(&1000i32.to_le_bytes());
    stream.extend_from_slice(b"incomplete_data");
    match decompress_l33t(&mut stream.as_slice()) {
        Err(Error::Decompress(_)) => {},
        other => panic!("expected decompress error, got {:?}",other)
    }
}
