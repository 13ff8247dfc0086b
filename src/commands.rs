//! Command stream
//! 
//! Past the metadata tree the buffer turns into a flat run of command group
//! records, one per simulation tick that carried player input.  Groups are
//! delimited by a fixed eight byte footer sentinel; the first footer after
//! the header region marks where the stream begins.  Each group has a small
//! bitmask header deciding which blocks follow (commands, selection change),
//! and every game command ends in a type specific tail whose width comes
//! from the refiner table.
//! 
//! Layouts here were recovered by eyeballing hexdumps, which is why so many
//! strides skip opaque bytes.  The "must equal" checks are the anchors that
//! keep the cursor honest; any mismatch aborts the parse.

use memchr::memmem;
use crate::Error;
use crate::cursor::{read_u8,read_u16,read_u32,read_opaque};

/// delimits command group records
pub const FOOTER: [u8;8] = [0x00,0x01,0x00,0x00,0x00,0x00,0x00,0x00];

/// One player action.  Argument bytes and vectors are kept opaque; decoding
/// their meaning is out of scope for the parser.
#[derive(Debug,Clone)]
pub struct GameCommand {
    pub command_type: u8,
    /// 0..=12, except type 19 commands which carry it in the prelude
    pub player_id: u16,
    pub source_units: Vec<u32>,
    /// three 32 bit floats each, interpretation deferred
    pub source_vectors: Vec<[u8;12]>,
    pub pre_argument_bytes: Vec<u8>,
    pub offset_end: usize
}

/// One tick's worth of player actions plus bookkeeping.
#[derive(Debug,Clone)]
pub struct CommandGroup {
    pub offset_end: usize,
    pub commands: Vec<GameCommand>,
    pub selected_units: Vec<u32>,
    pub entry_index: u32
}

/// Field width units used by the refiner table.
#[derive(Debug,Clone,Copy)]
pub enum Field {
    I32,
    I8,
    F32,
    V3F
}

impl Field {
    pub fn width(self) -> usize {
        match self {
            Field::I32 | Field::F32 => 4,
            Field::I8 => 1,
            Field::V3F => 12
        }
    }
}

/// Tail layout by command type.  The widths are data, not behavior: the
/// parser only sums them to know how far to advance.  A command type with
/// no entry here is a fatal decode error.
pub fn refiner(command_type: u8) -> Option<&'static [Field]> {
    use Field::*;
    Some(match command_type {
        0 => &[I32,I32,I32,I32,V3F,F32,I32,I32,I32],
        1 => &[I32,I32,I32],
        2 => &[I32,I32,I32,I32,I8,I8],
        3 => &[I32,I32,I32,V3F,I32,I32,F32,I32,I32,I32,I32],
        4 => &[I32,I32,V3F,F32,I32,I32],
        7 => &[I32,I32,I8],
        9 => &[I32,I32],
        12 => &[I32,I32,I32,V3F,V3F,I32,I32,F32,I32,I32,I8],
        13 => &[I32,I32,I32,I32,F32],
        14 => &[I32,I32],
        18 => &[I32,I32,I32],
        19 => &[I32,I32,I32,I32,F32,F32,I8],
        23 => &[I32,I32,I32,I8,I8],
        25 => &[I32,I32,I8,I8,I32],
        26 => &[I32,I32,I8,I32],
        34 => &[I32,I32],
        35 => &[I32,I32,I32],
        37 => &[I32,I32,I8,I32],
        38 => &[I32,I32,I32],
        41 => &[I32,I32,I32,I32,I32,I32,I32,I32,I32,I32,I32,I8],
        44 => &[I32,I32,I32,I32],
        45 => &[I32,I32,I32,I32,I32],
        48 => &[I32,I32,I32,I32],
        53 => &[I32,I32,I32],
        55 => &[I32,I32,V3F],
        66 => &[I32,I32,I32],
        67 => &[I32,I32,I8],
        68 => &[I32,I32,V3F,V3F],
        69 => &[I32,I32,I32,V3F,V3F],
        71 => &[I32,I32],
        72 => &[I8,I32,I32,I8,I8,I8],
        75 => &[I32,I32,I32,I32],
        _ => return None
    })
}

/// Walk the command stream.  `header_end_offset` is the first byte after
/// the metadata tree; the stream proper starts five bytes past the end of
/// the first footer found at or after it.  Groups are parsed until the
/// cursor lands on the last byte of the buffer.
pub fn parse_command_list(data: &[u8],header_end_offset: usize) -> Result<Vec<CommandGroup>,Error> {
    log::debug!("searching for the first footer after offset {}",header_end_offset);
    let tail = data.get(header_end_offset..)
        .ok_or(Error::FooterNotFound { offset: header_end_offset })?;
    let first_footer = header_end_offset + memmem::find(tail,&FOOTER)
        .ok_or(Error::FooterNotFound { offset: header_end_offset })?;
    let first_footer_end = parse_footer(data,first_footer)?;
    let mut offset = first_footer_end + 5;
    let mut groups: Vec<CommandGroup> = Vec::new();
    while offset + 1 != data.len() {
        let group = parse_command_group(data,offset)?;
        offset = group.offset_end;
        groups.push(group);
    }
    log::debug!("parsed {} command groups",groups.len());
    Ok(groups)
}

/// Parse one footer starting at `offset` and return the offset directly
/// after it.
fn parse_footer(data: &[u8],offset: usize) -> Result<usize,Error> {
    let mut position = offset;
    let extra = read_u8(data,position)? as usize;
    if extra > 0 {
        log::debug!("footer at offset {} carries {} extra bytes",offset,extra);
    }
    position += 1 + extra;
    let marker = read_u8(data,position)?;
    if marker != 1 {
        return Err(Error::BadFooter { offset: position, found: marker });
    }
    position += 1;
    position += 9;
    let quarter_len = read_u16(data,position)? as usize;
    position += 4;
    Ok(position + 4*quarter_len)
}

/// Parse one command group record.  The entry type is a bitmask over bits
/// 0, 5, 6 and 7; bit 5 and bit 6 both choose a command count width and
/// cannot appear together.
fn parse_command_group(data: &[u8],offset: usize) -> Result<CommandGroup,Error> {
    let group_offset = offset;
    let mut position = offset;
    let entry_type = read_u32(data,position)?;
    position += 4;
    // one opaque byte with no documented meaning
    read_u8(data,position)?;
    position += 1;
    if entry_type & 0xE1 != entry_type {
        return Err(Error::BadEntryType { offset: group_offset, entry_type });
    }
    if entry_type & 0x60 == 0x60 {
        return Err(Error::BadEntryType { offset: group_offset, entry_type });
    }
    position += if entry_type & 1 == 0 { 4 } else { 1 };

    let mut commands: Vec<GameCommand> = Vec::new();
    if entry_type & 0x60 != 0 {
        let count = if entry_type & 0x20 != 0 {
            let c = read_u8(data,position)? as usize;
            position += 1;
            c
        } else {
            let c = read_u32(data,position)? as usize;
            position += 4;
            c
        };
        for _ in 0..count {
            let command = parse_game_command(data,position)?;
            position = command.offset_end;
            commands.push(command);
        }
    }

    let mut selected_units: Vec<u32> = Vec::new();
    if entry_type & 0x80 != 0 {
        let count = read_u8(data,position)?;
        position += 1;
        for _ in 0..count {
            selected_units.push(read_u32(data,position)?);
            position += 4;
        }
    }

    position = parse_footer(data,position)?;
    let entry_index = read_u32(data,position)?;
    position += 4;
    let last = read_u8(data,position)?;
    if last != 0 {
        return Err(Error::BadFinalByte { offset: position, found: last });
    }
    position += 1;
    Ok(CommandGroup { offset_end: position, commands, selected_units, entry_index })
}

/// Parse one game command starting at `offset`.
fn parse_game_command(data: &[u8],offset: usize) -> Result<GameCommand,Error> {
    let prelude_offset = offset;
    let command_type = read_u8(data,offset + 1)?;
    log::debug!("game command of type {} at offset {}",command_type,offset);
    let mut position = offset + 10;
    position += if command_type == 14 { 20 } else { 8 };
    let marker = read_u32(data,position)?;
    if marker != 3 {
        return Err(Error::BadCommandMarker { offset: position, expected: 3, found: marker });
    }
    position += 4;
    let player_id: u16;
    if command_type == 19 {
        // this type keeps the player in its prelude
        player_id = read_u8(data,prelude_offset + 7)? as u16;
        position += 4;
    } else {
        let one = read_u16(data,position)?;
        if one != 1 {
            return Err(Error::BadCommandMarker { offset: position, expected: 1, found: one as u32 });
        }
        position += 4;
        let id = read_u16(data,position)?;
        if id > 12 {
            return Err(Error::BadPlayerId { offset: position, id });
        }
        player_id = id;
        position += 4;
    }
    position += 4;

    let num_units = read_u16(data,position)?;
    position += 4;
    let mut source_units: Vec<u32> = Vec::with_capacity(num_units as usize);
    for _ in 0..num_units {
        source_units.push(read_u16(data,position)? as u32);
        position += 4;
    }

    let num_vectors = read_u16(data,position)?;
    position += 4;
    let mut source_vectors: Vec<[u8;12]> = Vec::with_capacity(num_vectors as usize);
    for _ in 0..num_vectors {
        let raw = read_opaque(data,position,12)?;
        let mut vector = [0u8;12];
        vector.copy_from_slice(&raw);
        source_vectors.push(vector);
        position += 12;
    }

    let extra = read_u16(data,position)? as usize;
    position += 4;
    let pre_argument_bytes = read_opaque(data,position,13 + extra)?;
    position += 13 + extra;

    let widths = refiner(command_type)
        .ok_or(Error::UnknownCommandType { offset: prelude_offset, command_type })?;
    position += widths.iter().map(|f| f.width()).sum::<usize>();

    Ok(GameCommand {
        command_type,
        player_id,
        source_units,
        source_vectors,
        pre_argument_bytes,
        offset_end: position
    })
}

/// the sentinel, nine bytes of trailer, then a zero quarter-length
#[cfg(test)]
fn push_empty_footer(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&FOOTER);
    buf.extend_from_slice(&[0,0,0]);
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
}

/// a plain game command with the given type, player 2, one unit, one
/// vector and two extra argument bytes
#[cfg(test)]
fn push_game_command(buf: &mut Vec<u8>,command_type: u8) {
    let start = buf.len();
    buf.extend_from_slice(&[0,command_type,0,0,0,0,0,0,0,0]);
    buf.extend_from_slice(&[0u8;8]);
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&[0,0,0,0]);
    buf.extend_from_slice(&1u16.to_le_bytes()); // one unit
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&5u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&1u16.to_le_bytes()); // one vector
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&[0xAA;12]);
    buf.extend_from_slice(&2u16.to_le_bytes()); // two extra argument bytes
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&[0xBB;15]);
    assert_eq!(buf.len() - start,77);
}

#[test]
fn footer_strides() {
    let mut buf = Vec::new();
    push_empty_footer(&mut buf);
    assert_eq!(parse_footer(&buf,0).expect("footer failed"),15);
    // two extra bytes and a quarter length of one
    let mut buf = vec![2u8,0xFF,0xFF];
    buf.push(1);
    buf.extend_from_slice(&[0u8;9]);
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&[0u8;4]);
    assert_eq!(parse_footer(&buf,0).expect("footer failed"),buf.len());
}

#[test]
fn footer_marker_must_be_one() {
    let mut buf = vec![0u8,2];
    buf.extend_from_slice(&[0u8;20]);
    match parse_footer(&buf,0) {
        Err(Error::BadFooter { offset: 1, found: 2 }) => {},
        other => panic!("expected bad footer, got {:?}",other)
    }
}

#[test]
fn entry_type_rejection() {
    // both count-width bits at once
    let mut buf = 0x60u32.to_le_bytes().to_vec();
    buf.extend_from_slice(&[0u8;8]);
    match parse_command_group(&buf,0) {
        Err(Error::BadEntryType { offset: 0, entry_type: 0x60 }) => {},
        other => panic!("expected bad entry type, got {:?}",other)
    }
    // a bit outside the 0xE1 mask
    let mut buf = 0x02u32.to_le_bytes().to_vec();
    buf.extend_from_slice(&[0u8;8]);
    match parse_command_group(&buf,0) {
        Err(Error::BadEntryType { offset: 0, entry_type: 0x02 }) => {},
        other => panic!("expected bad entry type, got {:?}",other)
    }
}

#[test]
fn group_with_one_command() {
    let mut buf = 0x21u32.to_le_bytes().to_vec(); // bit 0 and bit 5
    buf.push(0); // opaque byte
    buf.push(0); // bit 0 set, one byte skipped
    buf.push(1); // one command
    push_game_command(&mut buf,9);
    // type 9 tail is two int32s
    buf.extend_from_slice(&[0u8;8]);
    push_empty_footer(&mut buf);
    buf.extend_from_slice(&42u32.to_le_bytes());
    buf.push(0);
    let group = parse_command_group(&buf,0).expect("group failed");
    assert_eq!(group.offset_end,buf.len());
    assert_eq!(group.entry_index,42);
    assert!(group.selected_units.is_empty());
    assert_eq!(group.commands.len(),1);
    let command = &group.commands[0];
    assert_eq!(command.command_type,9);
    assert_eq!(command.player_id,2);
    assert_eq!(command.source_units,vec![5]);
    assert_eq!(command.source_vectors,vec![[0xAA;12]]);
    assert_eq!(command.pre_argument_bytes,vec![0xBB;15]);
}

#[test]
fn group_with_selection_change() {
    let mut buf = 0x80u32.to_le_bytes().to_vec();
    buf.push(0); // opaque byte
    buf.extend_from_slice(&[0,0,0,0]); // bit 0 clear, four bytes skipped
    buf.push(2); // two selected units
    buf.extend_from_slice(&7u32.to_le_bytes());
    buf.extend_from_slice(&9u32.to_le_bytes());
    push_empty_footer(&mut buf);
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.push(0);
    let group = parse_command_group(&buf,0).expect("group failed");
    assert_eq!(group.selected_units,vec![7,9]);
    assert!(group.commands.is_empty());
    assert_eq!(group.entry_index,1);
}

#[test]
fn trailer_byte_must_be_zero() {
    let mut buf = 0x80u32.to_le_bytes().to_vec();
    buf.push(0);
    buf.extend_from_slice(&[0,0,0,0]);
    buf.push(0); // empty selection
    push_empty_footer(&mut buf);
    buf.extend_from_slice(&1u32.to_le_bytes());
    let bad_at = buf.len();
    buf.push(7);
    match parse_command_group(&buf,0) {
        Err(Error::BadFinalByte { offset, found: 7 }) if offset==bad_at => {},
        other => panic!("expected bad final byte, got {:?}",other)
    }
}

#[test]
fn command_type_fourteen_takes_the_long_prelude() {
    let mut buf = vec![0u8,14,0,0,0,0,0,0,0,0];
    buf.extend_from_slice(&[0u8;20]);
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&3u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&[0,0,0,0]);
    buf.extend_from_slice(&[0u8;4]); // no units
    buf.extend_from_slice(&[0u8;4]); // no vectors
    buf.extend_from_slice(&[0u8;4]); // no extra bytes
    buf.extend_from_slice(&[0u8;13]);
    buf.extend_from_slice(&[0u8;8]); // type 14 tail
    let command = parse_game_command(&buf,0).expect("command failed");
    assert_eq!(command.command_type,14);
    assert_eq!(command.player_id,3);
    assert_eq!(command.offset_end,buf.len());
}

#[test]
fn command_type_nineteen_reads_player_from_prelude() {
    let mut buf = vec![0u8,19,0,0,0,0,0,5,0,0];
    buf.extend_from_slice(&[0u8;8]);
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(&[0u8;4]); // skipped where others check the one marker
    buf.extend_from_slice(&[0u8;4]);
    buf.extend_from_slice(&[0u8;4]); // no units
    buf.extend_from_slice(&[0u8;4]); // no vectors
    buf.extend_from_slice(&[0u8;4]); // no extra bytes
    buf.extend_from_slice(&[0u8;13]);
    buf.extend_from_slice(&[0u8;25]); // type 19 tail
    let command = parse_game_command(&buf,0).expect("command failed");
    assert_eq!(command.command_type,19);
    assert_eq!(command.player_id,5);
    assert_eq!(command.offset_end,buf.len());
}

#[test]
fn player_id_ceiling() {
    let mut buf = vec![0u8,9,0,0,0,0,0,0,0,0];
    buf.extend_from_slice(&[0u8;8]);
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    buf.extend_from_slice(&13u16.to_le_bytes());
    buf.extend_from_slice(&[0u8;32]);
    match parse_game_command(&buf,0) {
        Err(Error::BadPlayerId { id: 13, .. }) => {},
        other => panic!("expected bad player id, got {:?}",other)
    }
}

#[test]
fn unknown_command_type() {
    let mut buf = Vec::new();
    push_game_command(&mut buf,99);
    buf.extend_from_slice(&[0u8;64]);
    match parse_game_command(&buf,0) {
        Err(Error::UnknownCommandType { offset: 0, command_type: 99 }) => {},
        other => panic!("expected unknown command type, got {:?}",other)
    }
}

#[test]
fn command_marker_must_be_three() {
    let mut buf = vec![0u8,9,0,0,0,0,0,0,0,0];
    buf.extend_from_slice(&[0u8;8]);
    buf.extend_from_slice(&4u32.to_le_bytes());
    buf.extend_from_slice(&[0u8;8]);
    match parse_game_command(&buf,0) {
        Err(Error::BadCommandMarker { offset: 18, expected: 3, found: 4 }) => {},
        other => panic!("expected bad marker, got {:?}",other)
    }
}

#[test]
fn command_list_needs_a_footer() {
    let data = vec![0u8;64];
    match parse_command_list(&data,0) {
        Err(Error::FooterNotFound { offset: 0 }) => {},
        other => panic!("expected footer not found, got {:?}",other)
    }
}

#[test]
fn command_list_walks_to_the_last_byte() {
    let mut data = vec![0u8;32]; // header region
    push_empty_footer(&mut data); // first footer at 32, ends at 47
    data.extend_from_slice(&[0u8;5]); // stream starts at 52
    data.extend_from_slice(&0x80u32.to_le_bytes());
    data.push(0);
    data.extend_from_slice(&[0,0,0,0]);
    data.push(1);
    data.extend_from_slice(&7u32.to_le_bytes());
    push_empty_footer(&mut data);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.push(0);
    data.push(0); // trailing byte the walk stops on
    let groups = parse_command_list(&data,0).expect("list failed");
    assert_eq!(groups.len(),1);
    assert_eq!(groups[0].selected_units,vec![7]);
    assert_eq!(groups[0].offset_end,data.len() - 1);
}
