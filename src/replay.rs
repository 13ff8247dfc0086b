//! Replay record
//! 
//! Ties the other modules together: inflate the envelope, build the node
//! tree, pull the build string and profile keys out of it, then walk the
//! command stream that follows.  The resulting record owns the decompressed
//! buffer; everything else stores offsets into it, so the record is cheap
//! to move around and safe to share.

use std::io::Read;
use indexmap::IndexMap;
use serde::Serialize;
use crate::Error;
use crate::envelope::decompress_l33t;
use crate::node_tree::NodeTree;
use crate::metadata::{read_build_string,parse_profile_keys,KeyValue};
use crate::commands::{parse_command_list,CommandGroup};

/// Everything decoded from one replay file.
#[derive(Debug)]
pub struct Replay {
    /// the decompressed payload the offsets below point into
    pub data: Vec<u8>,
    pub tree: NodeTree,
    pub command_groups: Vec<CommandGroup>,
    pub build_string: String,
    /// keyname to value, in table order
    pub profile_keys: IndexMap<String,KeyValue>
}

/// The portable projection of a replay.  Command groups are parsed but not
/// projected yet.
#[derive(Serialize)]
pub struct ReplayDocument<'a> {
    pub build_string: &'a str,
    pub profile_keys: &'a IndexMap<String,KeyValue>
}

impl Replay {
    pub fn document(&self) -> ReplayDocument {
        ReplayDocument {
            build_string: &self.build_string,
            profile_keys: &self.profile_keys
        }
    }

    /// Render the projection as JSON with four space indentation.
    pub fn to_json(&self) -> Result<String,serde_json::Error> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut out,formatter);
        self.document().serialize(&mut ser)?;
        // serde_json never emits invalid UTF-8
        Ok(String::from_utf8(out).expect("json was not utf-8"))
    }
}

/// Decode a whole replay from a readable stream.
/// `stream` is usually `std::fs::File`, possibly behind a gzip decoder, or
/// a byte slice.
pub fn parse_replay<R: Read>(stream: &mut R) -> Result<Replay,Error> {
    let data = decompress_l33t(stream)?;
    let tree = NodeTree::build(&data)?;
    tree.log_tree();
    let build_string = read_build_string(&tree,&data)?;
    let profile_keys = parse_profile_keys(&tree,&data)?;
    let header_end = tree.get(tree.root()).end_offset();
    let command_groups = parse_command_list(&data,header_end)?;
    Ok(Replay { data, tree, command_groups, build_string, profile_keys })
}

/// metadata fixture plus a one-group command stream, l33t wrapped
#[cfg(test)]
fn replay_fixture() -> Vec<u8> {
    use crate::commands::FOOTER;
    let mut payload = crate::metadata::metadata_fixture();
    assert_eq!(payload.len(),373); // root node ends here
    payload.extend_from_slice(&FOOTER);
    payload.extend_from_slice(&[0,0,0]);
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&[0,0]); // first footer ends at 388
    payload.extend_from_slice(&[0u8;5]); // stream starts at 393
    payload.extend_from_slice(&0x80u32.to_le_bytes());
    payload.push(0);
    payload.extend_from_slice(&[0,0,0,0]);
    payload.push(1);
    payload.extend_from_slice(&7u32.to_le_bytes());
    payload.extend_from_slice(&FOOTER);
    payload.extend_from_slice(&[0,0,0]);
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&[0,0]);
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.push(0);
    payload.push(0); // last byte of the buffer
    crate::envelope::wrap_l33t(&payload)
}

#[test]
fn decodes_a_full_replay() {
    let stream = replay_fixture();
    let replay = parse_replay(&mut stream.as_slice()).expect("decode failed");
    assert_eq!(replay.build_string,"Hi");
    assert_eq!(replay.profile_keys.get("gamename"),Some(&KeyValue::String("Test".to_string())));
    assert_eq!(replay.profile_keys.get("playercount"),Some(&KeyValue::Int16(4)));
    assert_eq!(replay.command_groups.len(),1);
    assert_eq!(replay.command_groups[0].selected_units,vec![7]);
    assert_eq!(replay.command_groups[0].entry_index,1);
    assert_eq!(replay.tree.get(replay.tree.root()).token,"GM");
}

#[test]
fn json_projection_uses_four_spaces() {
    let stream = replay_fixture();
    let replay = parse_replay(&mut stream.as_slice()).expect("decode failed");
    let expected = concat!(
        "{\n",
        "    \"build_string\": \"Hi\",\n",
        "    \"profile_keys\": {\n",
        "        \"gamename\": \"Test\",\n",
        "        \"playercount\": 4\n",
        "    }\n",
        "}"
    );
    assert_eq!(replay.to_json().expect("render failed"),expected);
}
