//! Match metadata readers
//! 
//! Two well known locations in the node tree carry match metadata: the `FH`
//! node directly under the root holds the build string, and `MP/ST` holds
//! the profile key table, a counted list of named, typed scalars.  Each key
//! type owns its exact stride through the table, including the two byte
//! padding skips between fields; those constants are load bearing and must
//! not be "simplified".

use indexmap::IndexMap;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::Serialize;
use crate::Error;
use crate::cursor::{read_u16,read_i16,read_u32,read_i32,read_bool,read_utf16le_string};
use crate::node_tree::NodeTree;

/// Wire codes for profile key values.  Anything else is a fatal decode
/// error.
#[derive(Debug,Clone,Copy,PartialEq,Eq,FromPrimitive)]
pub enum KeyType {
    Uint32 = 1,
    Int32 = 2,
    GameSyncState = 3,
    Int16 = 4,
    Boolean = 6,
    String = 10
}

/// A decoded profile key value.  `Null` stands in for the opaque
/// gamesyncstate payload and serializes as JSON null.
#[derive(Debug,Clone,PartialEq,Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Null,
    Uint32(u32),
    Int32(i32),
    Int16(i16),
    Boolean(bool),
    String(String)
}

/// Find the `FH` node under the root and read the build string at
/// `offset + 6`.  More information lives in `FH` but its meaning is
/// unknown.
pub fn read_build_string(tree: &NodeTree,data: &[u8]) -> Result<String,Error> {
    let nodes = tree.get_children(tree.root(),&["FH"]);
    if nodes.is_empty() {
        return Err(Error::NodeNotFound("FH"));
    }
    if nodes.len() > 1 {
        log::warn!("found {} FH nodes, using the first",nodes.len());
    }
    let fh = tree.get(nodes[0]);
    // skip token, size and two padding bytes
    let (build_string,_) = read_utf16le_string(data,fh.offset + 6)?;
    log::debug!("build string {}",build_string);
    Ok(build_string)
}

/// Find the `MP/ST` node and decode the profile key table, keeping
/// insertion order.
pub fn parse_profile_keys(tree: &NodeTree,data: &[u8]) -> Result<IndexMap<String,KeyValue>,Error> {
    let nodes = tree.get_children(tree.root(),&["MP","ST"]);
    if nodes.is_empty() {
        return Err(Error::NodeNotFound("ST"));
    }
    if nodes.len() > 1 {
        log::warn!("found {} ST nodes, using the first",nodes.len());
    }
    let st = tree.get(nodes[0]);
    // token and size (4), then six padding bytes
    let mut position = st.offset + 10;
    let num_keys = read_u16(data,position)?;
    position += 4;
    log::debug!("profile key table holds {} keys",num_keys);
    let mut keys = IndexMap::new();
    for _ in 0..num_keys {
        let (keyname,p1) = read_utf16le_string(data,position)?;
        let code = read_u16(data,p1)?;
        let keytype = KeyType::from_u16(code)
            .ok_or(Error::UnknownKeyType { offset: p1, code })?;
        // key type (2) plus two padding bytes
        let p2 = p1 + 4;
        let (value,next) = match keytype {
            KeyType::String => {
                let (s,end) = read_utf16le_string(data,p2 + 2)?;
                (KeyValue::String(s),end)
            },
            KeyType::Uint32 => (KeyValue::Uint32(read_u32(data,p2 + 2)?),p2 + 6),
            KeyType::Int32 => (KeyValue::Int32(read_i32(data,p2 + 2)?),p2 + 6),
            KeyType::Int16 => (KeyValue::Int16(read_i16(data,p2 + 2)?),p2 + 4),
            KeyType::Boolean => (KeyValue::Boolean(read_bool(data,p2)?),p2 + 3),
            KeyType::GameSyncState => (KeyValue::Null,p2 + 10)
        };
        log::debug!("profile key {} = {:?}",keyname,value);
        keys.insert(keyname,value);
        position = next;
    }
    Ok(keys)
}

#[cfg(test)]
use crate::node_tree::TREE_START_OFFSET;

/// encode a UTF-16LE string with its count and padding prefix
#[cfg(test)]
fn push_string(buf: &mut Vec<u8>,s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    for unit in s.encode_utf16() {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
}

/// Buffer with a GM root holding FH ("Hi") and MP/ST with two profile
/// keys: gamename = "Test" (string) and playercount = 4 (int16).
#[cfg(test)]
pub fn metadata_fixture() -> Vec<u8> {
    let mut data = vec![0u8;TREE_START_OFFSET];
    data.extend_from_slice(b"GM");
    data.extend_from_slice(&110u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"FH");
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"Hi");
    data.resize(281,0); // pad FH payload out to its end offset
    data.extend_from_slice(b"MP");
    data.extend_from_slice(&86u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"ST");
    data.extend_from_slice(&80u16.to_le_bytes());
    data.extend_from_slice(&[0,0,0,0,0,0]); // padding out to offset + 10
    assert_eq!(data.len(),297);
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"gamename");
    data.extend_from_slice(&10u16.to_le_bytes()); // string
    data.extend_from_slice(&[0,0,0,0]);
    push_string(&mut data,"Test");
    assert_eq!(data.len(),339);
    push_string(&mut data,"playercount");
    data.extend_from_slice(&4u16.to_le_bytes()); // int16
    data.extend_from_slice(&[0,0,0,0]);
    data.extend_from_slice(&4i16.to_le_bytes());
    assert_eq!(data.len(),373);
    data
}

#[test]
fn build_string_from_fh_node() {
    // root RT of size 100 holding FH at 263 of size 12, payload "Hi"
    let mut data = vec![0u8;TREE_START_OFFSET];
    data.extend_from_slice(b"RT");
    data.extend_from_slice(&100u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"FH");
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"Hi");
    data.resize(363,0);
    let tree = NodeTree::build(&data).expect("build failed");
    assert_eq!(read_build_string(&tree,&data).expect("no build string"),"Hi");
}

#[test]
fn duplicate_fh_nodes_use_the_first() {
    let mut data = vec![0u8;TREE_START_OFFSET];
    data.extend_from_slice(b"RT");
    data.extend_from_slice(&100u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"FH");
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"Hi");
    data.resize(281,0);
    data.extend_from_slice(b"FH");
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"Yo");
    data.resize(363,0);
    let tree = NodeTree::build(&data).expect("build failed");
    assert_eq!(tree.get_children(tree.root(),&["FH"]).len(),2);
    assert_eq!(read_build_string(&tree,&data).expect("no build string"),"Hi");
}

#[test]
fn missing_fh_node() {
    let mut data = vec![0u8;TREE_START_OFFSET];
    data.extend_from_slice(b"RT");
    data.extend_from_slice(&100u16.to_le_bytes());
    data.resize(363,0);
    let tree = NodeTree::build(&data).expect("build failed");
    match read_build_string(&tree,&data) {
        Err(Error::NodeNotFound("FH")) => {},
        other => panic!("expected missing FH, got {:?}",other)
    }
}

#[test]
fn profile_key_dispatch() {
    let data = metadata_fixture();
    let tree = NodeTree::build(&data).expect("build failed");
    let keys = parse_profile_keys(&tree,&data).expect("no profile keys");
    assert_eq!(keys.len(),2);
    let mut iter = keys.iter();
    assert_eq!(iter.next(),Some((&"gamename".to_string(),&KeyValue::String("Test".to_string()))));
    assert_eq!(iter.next(),Some((&"playercount".to_string(),&KeyValue::Int16(4))));
}

#[test]
fn missing_st_node() {
    let mut data = vec![0u8;TREE_START_OFFSET];
    data.extend_from_slice(b"RT");
    data.extend_from_slice(&100u16.to_le_bytes());
    data.resize(363,0);
    let tree = NodeTree::build(&data).expect("build failed");
    match parse_profile_keys(&tree,&data) {
        Err(Error::NodeNotFound("ST")) => {},
        other => panic!("expected missing ST, got {:?}",other)
    }
}

#[test]
fn unknown_key_type() {
    let mut data = metadata_fixture();
    // overwrite the gamename key type (offset 321) with an unassigned code
    data[321] = 9;
    data[322] = 0;
    let tree = NodeTree::build(&data).expect("build failed");
    match parse_profile_keys(&tree,&data) {
        Err(Error::UnknownKeyType { offset: 321, code: 9 }) => {},
        other => panic!("expected unknown key type, got {:?}",other)
    }
}

#[test]
fn all_key_type_strides() {
    // one key of every type back to back, checking the cursor lands right
    let mut data = vec![0u8;TREE_START_OFFSET];
    data.extend_from_slice(b"GM");
    data.extend_from_slice(&0u16.to_le_bytes()); // size patched below
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"MP");
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"ST");
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&[0,0,0,0,0,0]);
    data.extend_from_slice(&6u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"a");
    data.extend_from_slice(&1u16.to_le_bytes()); // uint32
    data.extend_from_slice(&[0,0,0,0]);
    data.extend_from_slice(&7u32.to_le_bytes());
    push_string(&mut data,"b");
    data.extend_from_slice(&2u16.to_le_bytes()); // int32
    data.extend_from_slice(&[0,0,0,0]);
    data.extend_from_slice(&(-7i32).to_le_bytes());
    push_string(&mut data,"c");
    data.extend_from_slice(&3u16.to_le_bytes()); // gamesyncstate, ten opaque bytes
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(&[0xEE;10]);
    push_string(&mut data,"d");
    data.extend_from_slice(&4u16.to_le_bytes()); // int16
    data.extend_from_slice(&[0,0,0,0]);
    data.extend_from_slice(&(-2i16).to_le_bytes());
    push_string(&mut data,"e");
    data.extend_from_slice(&6u16.to_le_bytes()); // boolean
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(&[1,0,0]);
    push_string(&mut data,"f");
    data.extend_from_slice(&10u16.to_le_bytes()); // string
    data.extend_from_slice(&[0,0,0,0]);
    push_string(&mut data,"done");
    let end = data.len();
    let gm_size = (end - 257 - 6) as u16;
    let mp_size = (end - 263 - 6) as u16;
    let st_size = (end - 269 - 6) as u16;
    data[259..261].copy_from_slice(&gm_size.to_le_bytes());
    data[265..267].copy_from_slice(&mp_size.to_le_bytes());
    data[271..273].copy_from_slice(&st_size.to_le_bytes());
    let tree = NodeTree::build(&data).expect("build failed");
    let keys = parse_profile_keys(&tree,&data).expect("no profile keys");
    assert_eq!(keys.get("a"),Some(&KeyValue::Uint32(7)));
    assert_eq!(keys.get("b"),Some(&KeyValue::Int32(-7)));
    assert_eq!(keys.get("c"),Some(&KeyValue::Null));
    assert_eq!(keys.get("d"),Some(&KeyValue::Int16(-2)));
    assert_eq!(keys.get("e"),Some(&KeyValue::Boolean(true)));
    assert_eq!(keys.get("f"),Some(&KeyValue::String("done".to_string())));
}
