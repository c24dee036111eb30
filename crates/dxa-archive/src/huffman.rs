//! DxLib adaptive Huffman decoder.
//!
//! A compressed block starts with a bit-packed header (MSB-first):
//!
//! ```text
//! 6 bits  width-1 | width bits  original size
//! 6 bits  width-1 | width bits  compressed body size
//! 256 x { 3 bits (width/2)-1 | 1 bit sign | width bits magnitude }
//! ```
//!
//! The first weight is absolute; every following weight is a signed delta
//! against its predecessor, computed with 16-bit wraparound. The header is
//! padded to a whole byte and followed by the code stream, which is read
//! least-significant-bit first.
//!
//! The tree always has 511 nodes: leaves 0..=255 are byte values, internal
//! nodes 256..=510 are created in merge order, and node 510 is the root.

use dxa_common::BitReader;
use tracing::trace;

use crate::{Error, Result};

/// Number of symbol leaves.
const LEAF_COUNT: usize = 256;

/// Total nodes in the tree.
pub(crate) const NODE_COUNT: usize = LEAF_COUNT * 2 - 1;

/// Index of the root node.
pub(crate) const ROOT: usize = NODE_COUNT - 1;

/// Width of the direct lookup table index.
const LOOKUP_BITS: u32 = 9;

/// Within this many bytes of the end, decoding starts at the root instead
/// of using the lookahead table, which could peek past the stream.
const TAIL_GUARD: u64 = 17;

/// Longest possible code: a fully skewed tree over 256 leaves.
const MAX_CODE_BYTES: usize = 32;

/// Decoded Huffman block header.
#[derive(Debug, Clone)]
pub struct HuffmanHeader {
    /// Size of the decoded output.
    pub original_size: u64,
    /// Size of the code stream following the header.
    pub compressed_size: u64,
    /// Bytes taken by the header itself, rounded up.
    pub header_size: u64,
    /// Per-symbol weights.
    pub weights: [u16; LEAF_COUNT],
}

impl HuffmanHeader {
    /// Read the size fields and the delta-coded weight table.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut bits = BitReader::new(data);
        let original_size = read_sized(&mut bits)?;
        let compressed_size = read_sized(&mut bits)?;

        let mut weights = [0u16; LEAF_COUNT];
        for i in 0..LEAF_COUNT {
            let width = (bits.read(3)? as u32 + 1) * 2;
            let minus = bits.read_flag()?;
            let magnitude = bits.read(width)? as u16;

            weights[i] = match i {
                0 => magnitude,
                _ if minus => weights[i - 1].wrapping_sub(magnitude),
                _ => weights[i - 1].wrapping_add(magnitude),
            };
        }

        Ok(Self {
            original_size,
            compressed_size,
            header_size: bits.bytes_consumed() as u64,
            weights,
        })
    }

    /// Total block length implied by the header.
    #[inline]
    pub fn block_size(&self) -> u64 {
        self.header_size.saturating_add(self.compressed_size)
    }
}

/// A size field: 6 bits of width minus one, then the value.
fn read_sized(bits: &mut BitReader<'_>) -> Result<u64> {
    let width = bits.read(6)? as u32 + 1;
    Ok(bits.read(width)?)
}

/// Read only the decoded size of a block.
pub(crate) fn decoded_size(data: &[u8]) -> Result<u64> {
    let mut bits = BitReader::new(data);
    read_sized(&mut bits)
}

/// One arena slot. Links are indices into the node array.
#[derive(Debug, Clone, Copy)]
struct Node {
    weight: u64,
    parent: Option<u16>,
    children: [Option<u16>; 2],
    /// Which child slot of the parent this node occupies.
    slot: u8,
    /// Root-to-node path, bit `k` at byte `k / 8`, position `k % 8`.
    code: [u8; MAX_CODE_BYTES],
    code_len: u16,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            weight: 0,
            parent: None,
            children: [None; 2],
            slot: 0,
            code: [0; MAX_CODE_BYTES],
            code_len: 0,
        }
    }
}

/// Huffman tree rebuilt for each block.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTree {
    nodes: Vec<Node>,
}

impl HuffmanTree {
    /// Build the tree by greedy merging and derive every node's code.
    pub(crate) fn build(weights: &[u16; LEAF_COUNT]) -> Self {
        let mut nodes = vec![Node::default(); NODE_COUNT];
        for (node, &weight) in nodes.iter_mut().zip(weights) {
            node.weight = u64::from(weight);
        }

        let mut tree = Self { nodes };
        tree.merge();
        tree.derive_codes();
        tree
    }

    /// Repeatedly join the two lightest parentless nodes.
    ///
    /// The scan walks nodes in index order and stops once it has seen every
    /// parentless node, so ties always go to the lowest index and the first
    /// minimum found becomes child 0.
    fn merge(&mut self) {
        let mut next = LEAF_COUNT;
        let mut active = LEAF_COUNT;

        while active > 1 {
            let mut min1: Option<usize> = None;
            let mut min2: Option<usize> = None;

            let mut seen = 0;
            let mut index = 0;
            while seen < active {
                let node = &self.nodes[index];
                if node.parent.is_none() {
                    seen += 1;
                    match min1 {
                        Some(m1) if self.nodes[m1].weight <= node.weight => {
                            if min2.map_or(true, |m2| self.nodes[m2].weight > node.weight) {
                                min2 = Some(index);
                            }
                        }
                        _ => {
                            min2 = min1;
                            min1 = Some(index);
                        }
                    }
                }
                index += 1;
            }

            // `active > 1` guarantees two candidates
            let (Some(first), Some(second)) = (min1, min2) else {
                break;
            };

            let weight = self.nodes[first].weight + self.nodes[second].weight;
            let merged = &mut self.nodes[next];
            merged.parent = None;
            merged.weight = weight;
            merged.children = [Some(first as u16), Some(second as u16)];

            self.nodes[first].slot = 0;
            self.nodes[first].parent = Some(next as u16);
            self.nodes[second].slot = 1;
            self.nodes[second].parent = Some(next as u16);

            next += 1;
            active -= 1;
        }
    }

    /// Walk each node up to the root and store the reversed slot path.
    fn derive_codes(&mut self) {
        let mut path = [0u8; LEAF_COUNT];

        for index in 0..NODE_COUNT {
            let mut len = 0;
            let mut current = index;
            while let Some(parent) = self.nodes[current].parent {
                path[len] = self.nodes[current].slot;
                len += 1;
                current = usize::from(parent);
            }

            let node = &mut self.nodes[index];
            node.code = [0; MAX_CODE_BYTES];
            node.code_len = len as u16;
            for (k, &bit) in path[..len].iter().rev().enumerate() {
                node.code[k / 8] |= bit << (k % 8);
            }
        }
    }

    /// For every 9-bit lookahead, the first non-root node whose code is a
    /// prefix of it.
    fn lookup_table(&self) -> Vec<Option<u16>> {
        (0..1usize << LOOKUP_BITS)
            .map(|lookahead| {
                self.nodes[..ROOT]
                    .iter()
                    .position(|node| {
                        let len = u32::from(node.code_len);
                        if len == 0 || len > LOOKUP_BITS {
                            return false;
                        }
                        let mask = (1usize << len) - 1;
                        let code = usize::from(node.code[0]) | usize::from(node.code[1]) << 8;
                        lookahead & mask == code & mask
                    })
                    .map(|index| index as u16)
            })
            .collect()
    }

    /// Code length of a node, 0 for the root.
    #[cfg(test)]
    pub(crate) fn code_len(&self, index: usize) -> usize {
        usize::from(self.nodes[index].code_len)
    }

    /// Code bits of a node in root-to-node order.
    #[cfg(test)]
    pub(crate) fn code_bits(&self, index: usize) -> impl Iterator<Item = u8> + '_ {
        let node = &self.nodes[index];
        (0..usize::from(node.code_len)).map(move |k| (node.code[k / 8] >> (k % 8)) & 1)
    }

    fn child(&self, index: usize, bit: usize) -> Result<usize> {
        self.nodes[index].children[bit]
            .map(usize::from)
            .ok_or_else(|| Error::CorruptStream(format!("Huffman node {index} has no child {bit}")))
    }
}

/// LSB-first cursor over the code stream.
struct CodeStream<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> CodeStream<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn total_bits(&self) -> usize {
        self.data.len() * 8
    }

    /// The next nine bits without consuming them; bits past the end read as 0.
    fn peek_lookup(&self) -> usize {
        let byte = self.bit_pos / 8;
        let shift = self.bit_pos % 8;
        let lo = usize::from(self.data.get(byte).copied().unwrap_or(0));
        let hi = usize::from(self.data.get(byte + 1).copied().unwrap_or(0));
        ((lo | hi << 8) >> shift) & ((1 << LOOKUP_BITS) - 1)
    }

    fn consume(&mut self, count: usize) -> Result<()> {
        if self.bit_pos + count > self.total_bits() {
            return Err(exhausted());
        }
        self.bit_pos += count;
        Ok(())
    }

    fn next_bit(&mut self) -> Result<usize> {
        if self.bit_pos >= self.total_bits() {
            return Err(exhausted());
        }
        let bit = (self.data[self.bit_pos / 8] >> (self.bit_pos % 8)) & 1;
        self.bit_pos += 1;
        Ok(usize::from(bit))
    }
}

fn exhausted() -> Error {
    Error::CorruptStream("Huffman code stream ended before a leaf was reached".into())
}

/// Decode a complete Huffman block.
///
/// `data` must be exactly the block: header plus code stream.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let header = HuffmanHeader::read(data).map_err(|e| match e {
        Error::Common(inner) => Error::CorruptStream(format!("Huffman header: {inner}")),
        other => other,
    })?;

    let supplied = data.len() as u64;
    if supplied != header.block_size() {
        return Err(Error::SizeMismatch {
            supplied,
            expected: header.block_size(),
        });
    }

    let body = &data[header.header_size as usize..];
    // Every symbol costs at least one bit.
    if header.original_size > body.len() as u64 * 8 {
        return Err(Error::CorruptStream(format!(
            "{} output bytes cannot come from {} code bytes",
            header.original_size,
            body.len()
        )));
    }
    if header.original_size == 0 {
        return Ok(Vec::new());
    }

    let tree = HuffmanTree::build(&header.weights);
    trace!(
        original_size = header.original_size,
        compressed_size = header.compressed_size,
        header_size = header.header_size,
        max_leaf_code = (0..LEAF_COUNT).map(|i| tree.nodes[i].code_len).max().unwrap_or(0),
        "decoding Huffman block"
    );

    unpack(&tree, body, header.original_size)
}

fn unpack(tree: &HuffmanTree, body: &[u8], original_size: u64) -> Result<Vec<u8>> {
    let table = tree.lookup_table();
    let mut stream = CodeStream::new(body);
    let mut out = Vec::with_capacity(original_size as usize);

    for position in 0..original_size {
        let mut node = if position + TAIL_GUARD >= original_size {
            ROOT
        } else {
            let start = table[stream.peek_lookup()]
                .map(usize::from)
                .ok_or_else(|| Error::CorruptStream("no Huffman code matches lookahead".into()))?;
            stream.consume(usize::from(tree.nodes[start].code_len))?;
            start
        };

        while node >= LEAF_COUNT {
            let bit = stream.next_bit()?;
            node = tree.child(node, bit)?;
        }
        out.push(node as u8);
    }

    Ok(out)
}
