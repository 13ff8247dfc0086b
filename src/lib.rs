//! # Replay Decoder Library
//! 
//! Decode l33t-compressed recorded-game files from a real-time strategy title
//! * `envelope` validates the `l33t` magic and inflates the zlib payload
//! * `node_tree` discovers the tagged metadata hierarchy inside the decompressed buffer
//! * `metadata` extracts the build string and the typed profile keys
//! * `commands` walks the per-tick command stream behind the metadata region
//! * `replay` bundles everything into a single record with a JSON projection
//! 
//! The parsing functions are pure: they take the decompressed buffer plus an
//! offset and hand back values and new offsets, so the same buffer can be
//! shared across as many readers as needed.
//! 
//! ## File Example
//! 
//! ```rs
//! use replaydecoder::replay;
//! let mut file = std::fs::File::open("some_replay_path").expect("open failed");
//! let rec = replay::parse_replay(&mut file).expect("decode failed");
//! eprintln!("recorded on build {}",rec.build_string);
//! ```
//! 
//! ## Buffer Example
//! 
//! ```rs
//! use replaydecoder::replay;
//! let raw: Vec<u8> = std::fs::read("some_replay_path").expect("read failed");
//! let rec = replay::parse_replay(&mut raw.as_slice()).expect("decode failed");
//! println!("{}",rec.to_json().expect("render failed"));
//! ```

pub mod cursor;
pub mod envelope;
pub mod node_tree;
pub mod metadata;
pub mod commands;
pub mod replay;

/// Decode Errors
/// 
/// Every variant that can be tied to a position in the decompressed buffer
/// carries the offset at which the mismatch was detected.  All of them abort
/// the parse; there is no partial recovery.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("invalid header, expecting 'l33t'")]
    BadMagic,
    #[error("zlib inflate failed: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not find {0} node")]
    NodeNotFound(&'static str),
    #[error("unknown profile key type {code} at offset {offset}")]
    UnknownKeyType { offset: usize, code: u16 },
    #[error("no command footer found after offset {offset}")]
    FooterNotFound { offset: usize },
    #[error("footer marker at offset {offset} is {found}, expecting 1")]
    BadFooter { offset: usize, found: u8 },
    #[error("entry type {entry_type:#x} at offset {offset} sets unsupported bits")]
    BadEntryType { offset: usize, entry_type: u32 },
    #[error("group trailer byte at offset {offset} is {found}, expecting 0")]
    BadFinalByte { offset: usize, found: u8 },
    #[error("no refiner for command type {command_type} at offset {offset}")]
    UnknownCommandType { offset: usize, command_type: u8 },
    #[error("command marker at offset {offset} is {found}, expecting {expected}")]
    BadCommandMarker { offset: usize, expected: u32, found: u32 },
    #[error("player id {id} at offset {offset} is out of range")]
    BadPlayerId { offset: usize, id: u16 },
    #[error("read of {width} bytes at offset {offset} is out of bounds")]
    Bounds { offset: usize, width: usize }
}
