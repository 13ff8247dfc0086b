//! Metadata node tree
//! 
//! The decompressed buffer carries a hierarchy of tagged nodes starting at a
//! fixed offset.  A node is a two byte token (uppercase ASCII or digits), a
//! 16 bit payload size, and two padding bytes; its payload may interleave
//! opaque bytes with further nodes, and nothing records how many children
//! there are.  Children are therefore discovered by scanning for the next
//! two token bytes inside the parent's window, with a cap on how far the
//! scan may wander before giving up.
//! 
//! Nodes live in a flat arena and refer to each other by index, so parent
//! back-references need no ownership cycle.

use crate::Error;
use crate::cursor::read_u16;

/// where the root node starts in the decompressed buffer
pub const TREE_START_OFFSET: usize = 257;
/// token (2) + size (2) + padding (2)
pub const NODE_PREFIX_SIZE: usize = 6;
/// how far a child scan may advance past its starting position
pub const MAX_SCAN_LENGTH: usize = 50;

/// index into the arena behind `NodeTree`
pub type NodeId = usize;

/// A tagged node.  Offsets point into the decompressed buffer; the node
/// itself stores no payload bytes.
#[derive(Debug)]
pub struct Node {
    /// two characters, each uppercase ASCII or a digit
    pub token: String,
    /// start of the node, pointing at the token bytes
    pub offset: usize,
    /// payload length from the two bytes after the token
    pub size: u16,
    pub parent: Option<NodeId>,
    /// insertion order follows byte order in the buffer
    pub children: Vec<NodeId>
}

impl Node {
    pub fn end_offset(&self) -> usize {
        self.offset + self.size as usize + NODE_PREFIX_SIZE
    }
}

/// test for membership in the token alphabet `{A..Z, 0..9}`
fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit()
}

/// Search for two adjacent token-alphabet bytes starting at `offset`.
/// The scan gives up once it reaches `upper_bound`, runs out of buffer, or
/// advances more than `MAX_SCAN_LENGTH` bytes past `offset`.  Returns the
/// position of the first byte of the pair, if any.
pub fn find_two_letter_seq(data: &[u8],offset: usize,upper_bound: Option<usize>) -> Option<usize> {
    let mut position = offset;
    loop {
        if let Some(bound) = upper_bound {
            if position >= bound {
                return None;
            }
        }
        if position + 1 >= data.len() {
            return None;
        }
        if is_token_byte(data[position]) && is_token_byte(data[position + 1]) {
            return Some(position);
        }
        position += 1;
        if position > offset + MAX_SCAN_LENGTH {
            // probably sitting in padding, give up rather than wander into payload
            log::warn!("no two letter sequence within {} bytes of offset {}",MAX_SCAN_LENGTH,offset);
            return None;
        }
    }
}

/// The node hierarchy of one replay, arena backed.  Id 0 is the root.
#[derive(Debug)]
pub struct NodeTree {
    nodes: Vec<Node>
}

impl NodeTree {
    /// Build the tree from a decompressed buffer.  The root's token and size
    /// are read at `TREE_START_OFFSET`; children are discovered recursively.
    pub fn build(data: &[u8]) -> Result<NodeTree,Error> {
        let token = token_at(data,TREE_START_OFFSET)?;
        let size = read_u16(data,TREE_START_OFFSET + 2)?;
        let root = Node {
            token,
            offset: TREE_START_OFFSET,
            size,
            parent: None,
            children: Vec::new()
        };
        log::debug!("root node {} with payload of {} bytes",root.token,root.size);
        let mut tree = NodeTree { nodes: vec![root] };
        tree.build_children(0,data)?;
        Ok(tree)
    }

    /// Discover the direct children of `parent`, then recurse into each.
    fn build_children(&mut self,parent: NodeId,data: &[u8]) -> Result<(),Error> {
        let parent_end = self.nodes[parent].end_offset();
        // skip the two token bytes before searching
        let mut position = self.nodes[parent].offset + 2;
        let mut spawned: Vec<NodeId> = Vec::new();
        while position < parent_end {
            let hit = match find_two_letter_seq(data,position,Some(parent_end)) {
                Some(p) => p,
                None => break
            };
            let token = token_at(data,hit)?;
            let size = read_u16(data,hit + 2)?;
            let node = Node {
                token,
                offset: hit,
                size,
                parent: Some(parent),
                children: Vec::new()
            };
            let node_end = node.end_offset();
            if node_end > parent_end {
                // kept anyway, the format has been seen to overrun
                log::warn!("node {} at offset {} ends at {} beyond its parent at {}",
                    node.token,node.offset,node_end,parent_end);
            }
            let id = self.nodes.len();
            self.nodes.push(node);
            self.nodes[parent].children.push(id);
            spawned.push(id);
            position = node_end;
        }
        for child in spawned {
            self.build_children(child,data)?;
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn get(&self,id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// slash joined tokens from the root down to `id`
    pub fn path(&self,id: NodeId) -> String {
        match self.nodes[id].parent {
            None => self.nodes[id].token.clone(),
            Some(parent) => format!("{}/{}",self.path(parent),self.nodes[id].token)
        }
    }

    /// Every descendant of `id` reached by matching each path element to a
    /// direct child in turn.  Duplicate tokens fan out, so the result can
    /// hold any number of nodes.  The empty path is `id` itself.
    pub fn get_children(&self,id: NodeId,path: &[&str]) -> Vec<NodeId> {
        if path.is_empty() {
            return vec![id];
        }
        let mut found = Vec::new();
        for &child in &self.nodes[id].children {
            if self.nodes[child].token == path[0] {
                found.extend(self.get_children(child,&path[1..]));
            }
        }
        found
    }

    /// one debug line per node, preorder
    pub fn log_tree(&self) {
        self.log_subtree(0);
    }

    fn log_subtree(&self,id: NodeId) {
        let node = &self.nodes[id];
        log::debug!("{} -- offset={}, end_offset={} size={}, children={}",
            self.path(id),node.offset,node.end_offset(),node.size,node.children.len());
        for &child in &node.children {
            self.log_subtree(child);
        }
    }
}

/// two token bytes at `offset` as an owned string
fn token_at(data: &[u8],offset: usize) -> Result<String,Error> {
    let bytes = offset.checked_add(2)
        .and_then(|end| data.get(offset..end))
        .ok_or(Error::Bounds { offset, width: 2 })?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
fn leaf(token: &str,offset: usize,size: u16,parent: Option<NodeId>) -> Node {
    Node { token: token.to_string(), offset, size, parent, children: Vec::new() }
}

#[test]
fn scan_hits_and_misses() {
    assert_eq!(find_two_letter_seq(b"xxYZabc",0,None),Some(2));
    assert_eq!(find_two_letter_seq(b"xxYZabc",1,None),Some(2));
    assert_eq!(find_two_letter_seq(b"xxxxabc",0,None),None);
    assert_eq!(find_two_letter_seq(b"abcdEF",0,None),Some(4));
    assert_eq!(find_two_letter_seq(b"XxYzEF",3,Some(6)),Some(4));
    // a bound at or below the scan start means no hit
    assert_eq!(find_two_letter_seq(b"xxYZabc",0,Some(0)),None);
}

#[test]
fn scan_boundaries() {
    assert_eq!(find_two_letter_seq(b"",0,None),None);
    assert_eq!(find_two_letter_seq(b"A",0,None),None);
    assert_eq!(find_two_letter_seq(b"AB",1,None),None);
    // the pair sits one byte past the scan cap
    let mut long = vec![b'x';51];
    long.extend_from_slice(b"AB");
    assert_eq!(find_two_letter_seq(&long,0,None),None);
    // exactly at the cap is still found
    let mut edge = vec![b'x';50];
    edge.extend_from_slice(b"AB");
    assert_eq!(find_two_letter_seq(&edge,0,None),Some(50));
}

#[test]
fn end_offset_accounts_for_prefix() {
    let node = leaf("AA",5,15,None);
    assert_eq!(node.end_offset(),5 + 15 + NODE_PREFIX_SIZE);
}

#[test]
fn paths_and_lookup() {
    let mut tree = NodeTree { nodes: vec![leaf("GM",0,60,None)] };
    tree.nodes.push(leaf("FH",10,5,Some(0)));
    tree.nodes.push(leaf("MP",21,20,Some(0)));
    tree.nodes.push(leaf("ST",27,8,Some(2)));
    tree.nodes[0].children = vec![1,2];
    tree.nodes[2].children = vec![3];
    assert_eq!(tree.path(0),"GM");
    assert_eq!(tree.path(1),"GM/FH");
    assert_eq!(tree.path(3),"GM/MP/ST");
    assert_eq!(tree.get_children(0,&[]),vec![0]);
    assert_eq!(tree.get_children(0,&["FH"]),vec![1]);
    assert_eq!(tree.get_children(0,&["MP","ST"]),vec![3]);
    assert!(tree.get_children(0,&["ZZ"]).is_empty());
}

#[test]
fn duplicate_tokens_fan_out() {
    let mut tree = NodeTree { nodes: vec![leaf("GM",0,60,None)] };
    tree.nodes.push(leaf("XN",10,5,Some(0)));
    tree.nodes.push(leaf("XN",21,5,Some(0)));
    tree.nodes.push(leaf("XN",27,2,Some(2)));
    tree.nodes[0].children = vec![1,2];
    tree.nodes[2].children = vec![3];
    assert_eq!(tree.get_children(0,&["XN"]),vec![1,2]);
    assert_eq!(tree.get_children(0,&["XN","XN"]),vec![3]);
}

#[test]
fn build_discovers_nested_nodes() {
    // prelude, then GM holding FH and MP/ST
    let mut data = vec![0u8;TREE_START_OFFSET];
    data.extend_from_slice(b"GM");
    data.extend_from_slice(&110u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    assert_eq!(data.len(),263);
    data.extend_from_slice(b"FH");
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(&[0u8;12]); // FH payload, ends at 281
    assert_eq!(data.len(),281);
    data.extend_from_slice(b"MP");
    data.extend_from_slice(&86u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    assert_eq!(data.len(),287);
    data.extend_from_slice(b"ST");
    data.extend_from_slice(&80u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.resize(373,0); // ST payload runs to the shared end offset
    let tree = NodeTree::build(&data).expect("build failed");
    assert_eq!(tree.len(),4);
    let root = tree.get(tree.root());
    assert_eq!(root.token,"GM");
    assert_eq!(root.offset,TREE_START_OFFSET);
    assert_eq!(root.end_offset(),373);
    assert_eq!(root.children.len(),2);
    let fh = tree.get(tree.get_children(0,&["FH"])[0]);
    assert_eq!((fh.offset,fh.size,fh.end_offset()),(263,12,281));
    let st = tree.get(tree.get_children(0,&["MP","ST"])[0]);
    assert_eq!((st.offset,st.size,st.end_offset()),(287,80,373));
    assert_eq!(tree.path(tree.get_children(0,&["MP","ST"])[0]),"GM/MP/ST");
}
