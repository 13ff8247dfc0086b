//! Byte cursor primitives
//! 
//! All multi-byte integers in a replay buffer are little endian.  Readers
//! take `(buffer,offset)` and do not mutate anything; whoever calls them is
//! responsible for advancing their own cursor.  Reads past the end of the
//! buffer fail with `Error::Bounds` carrying the offset and required width.

use crate::Error;

/// checked slice of `width` bytes starting at `offset`
fn read_bytes(data: &[u8],offset: usize,width: usize) -> Result<&[u8],Error> {
    offset.checked_add(width)
        .and_then(|end| data.get(offset..end))
        .ok_or(Error::Bounds { offset, width })
}

pub fn read_u8(data: &[u8],offset: usize) -> Result<u8,Error> {
    let b = read_bytes(data,offset,1)?;
    Ok(b[0])
}

pub fn read_u16(data: &[u8],offset: usize) -> Result<u16,Error> {
    let b = read_bytes(data,offset,2)?;
    Ok(u16::from_le_bytes([b[0],b[1]]))
}

pub fn read_i16(data: &[u8],offset: usize) -> Result<i16,Error> {
    let b = read_bytes(data,offset,2)?;
    Ok(i16::from_le_bytes([b[0],b[1]]))
}

pub fn read_u32(data: &[u8],offset: usize) -> Result<u32,Error> {
    let b = read_bytes(data,offset,4)?;
    Ok(u32::from_le_bytes([b[0],b[1],b[2],b[3]]))
}

pub fn read_i32(data: &[u8],offset: usize) -> Result<i32,Error> {
    let b = read_bytes(data,offset,4)?;
    Ok(i32::from_le_bytes([b[0],b[1],b[2],b[3]]))
}

/// single byte, 0 is false, anything else is true
pub fn read_bool(data: &[u8],offset: usize) -> Result<bool,Error> {
    Ok(read_u8(data,offset)? != 0)
}

/// copy of `count` bytes starting at `offset`, for opaque runs
pub fn read_opaque(data: &[u8],offset: usize,count: usize) -> Result<Vec<u8>,Error> {
    Ok(read_bytes(data,offset,count)?.to_vec())
}

/// Read a UTF-16LE string.  The layout is a 16 bit character count, two
/// padding bytes (not enforced), then the code units, e.g. "Hi" is encoded
/// as `02 00 00 00 48 00 69 00`.  Returns the text and the offset directly
/// after it, which is `offset + 4 + 2*num_chars`.  Malformed code units are
/// decoded lossily.
pub fn read_utf16le_string(data: &[u8],offset: usize) -> Result<(String,usize),Error> {
    let num_chars = read_u16(data,offset)? as usize;
    let start = offset + 4;
    let raw = read_bytes(data,start,2*num_chars)?;
    let mut units: Vec<u16> = Vec::with_capacity(num_chars);
    for pair in raw.chunks_exact(2) {
        units.push(u16::from_le_bytes([pair[0],pair[1]]));
    }
    Ok((String::from_utf16_lossy(&units),start + 2*num_chars))
}

#[test]
fn little_endian_integers() {
    let data = [0x01,0x02,0x03,0x04];
    assert_eq!(read_u16(&data,0).unwrap(),513);
    assert_eq!(read_u16(&data,2).unwrap(),1027);
    assert_eq!(read_u32(&data,0).unwrap(),0x04030201);
    let data = [0xff,0xff,0xfe,0xff,0xff,0xff];
    assert_eq!(read_i16(&data,0).unwrap(),-1);
    assert_eq!(read_i32(&data,2).unwrap(),-2);
}

#[test]
fn booleans() {
    let data = [0x01,0x00,0x03];
    assert_eq!(read_bool(&data,0).unwrap(),true);
    assert_eq!(read_bool(&data,1).unwrap(),false);
    assert_eq!(read_bool(&data,2).unwrap(),true);
}

#[test]
fn utf16_strings() {
    // count of 5, two padding bytes, then "Hello" as UTF-16LE code units
    let data = hex::decode("05000000480065006c006c006f00").unwrap();
    let (s,next) = read_utf16le_string(&data,0).expect("read failed");
    assert_eq!(s,"Hello");
    assert_eq!(next,14);
    // empty string is just the count and padding
    let data = b"\x00\x00\x00\x00";
    let (s,next) = read_utf16le_string(data,0).expect("read failed");
    assert_eq!(s,"");
    assert_eq!(next,4);
}

#[test]
fn out_of_bounds() {
    let data = [0x01,0x02];
    match read_u32(&data,0) {
        Err(Error::Bounds { offset: 0, width: 4 }) => {},
        other => panic!("expected bounds error, got {:?}",other)
    }
    match read_u16(&data,usize::MAX) {
        Err(Error::Bounds { .. }) => {},
        other => panic!("expected bounds error, got {:?}",other)
    }
}
