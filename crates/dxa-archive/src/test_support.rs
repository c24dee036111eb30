//! Reference encoders and an archive builder for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::crypto::{Cipher, DxaKey, XorCipher};
use crate::decompress::{DxLz, LzDecoder};
use crate::header::{HeaderFlags, RawHeader};
use crate::huffman::HuffmanTree;
use crate::Result;

/// MSB-first bit writer matching the Huffman header layout.
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    bits: u32,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bits: 0,
        }
    }

    pub(crate) fn write(&mut self, value: u64, width: u32) {
        for i in (0..width).rev() {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= bit << (7 - self.bits % 8);
            self.bits += 1;
        }
    }

    /// Size field: 6-bit width minus one, then the value.
    pub(crate) fn write_sized(&mut self, value: u64) {
        let width = (64 - value.leading_zeros()).max(1);
        self.write(u64::from(width - 1), 6);
        self.write(value, width);
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Huffman-encode with weights taken from byte frequencies.
pub(crate) fn huffman_encode(data: &[u8]) -> Vec<u8> {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[usize::from(b)] += 1;
    }
    let max = counts.iter().copied().max().unwrap_or(0);

    let mut weights = [0u16; 256];
    for (weight, &count) in weights.iter_mut().zip(&counts) {
        *weight = if max > 0xFFFF && count > 0 {
            (count * 0xFFFF / max).max(1) as u16
        } else {
            count as u16
        };
    }
    huffman_encode_with_weights(data, &weights)
}

/// Huffman-encode with an explicit weight table.
pub(crate) fn huffman_encode_with_weights(data: &[u8], weights: &[u16; 256]) -> Vec<u8> {
    let tree = HuffmanTree::build(weights);

    let mut body: Vec<u8> = Vec::new();
    let mut bit_pos = 0usize;
    for &symbol in data {
        for bit in tree.code_bits(usize::from(symbol)) {
            if bit_pos % 8 == 0 {
                body.push(0);
            }
            let last = body.len() - 1;
            body[last] |= bit << (bit_pos % 8);
            bit_pos += 1;
        }
    }

    let mut writer = BitWriter::new();
    writer.write_sized(data.len() as u64);
    writer.write_sized(body.len() as u64);
    let mut previous = 0u16;
    for (i, &weight) in weights.iter().enumerate() {
        let (minus, magnitude) = if i == 0 || weight >= previous {
            (false, weight.wrapping_sub(if i == 0 { 0 } else { previous }))
        } else {
            (true, previous - weight)
        };
        let bits = (16 - magnitude.leading_zeros()).max(1);
        let width = (bits + 1) / 2 * 2;
        writer.write(u64::from(width / 2 - 1), 3);
        writer.write(u64::from(minus), 1);
        writer.write(u64::from(magnitude), width);
        previous = weight;
    }

    let mut block = writer.finish();
    block.extend_from_slice(&body);
    block
}

/// DxLib LZ encoder with a greedy matcher over short distances.
pub(crate) fn lz_encode(data: &[u8]) -> Vec<u8> {
    const MAX_DISTANCE: usize = 256;
    const MAX_LENGTH: usize = 4 + 255;

    let mut counts = [0usize; 256];
    for &b in data {
        counts[usize::from(b)] += 1;
    }
    let keycode = (0..=255u8)
        .min_by_key(|&b| counts[usize::from(b)])
        .unwrap_or(0);

    let mut body = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let mut best = (0, 0);
        for distance in 1..=i.min(MAX_DISTANCE) {
            let mut len = 0;
            while i + len < data.len() && len < MAX_LENGTH && data[i + len] == data[i + len - distance] {
                len += 1;
            }
            if len > best.0 {
                best = (len, distance);
            }
        }

        let (len, distance) = best;
        if len >= 4 {
            let stored = len - 4;
            let mut code = ((stored & 0x1F) << 3) as u8;
            if stored > 0x1F {
                code |= 0x4;
            }
            body.push(keycode);
            body.push(if code >= keycode { code + 1 } else { code });
            if stored > 0x1F {
                body.push((stored >> 5) as u8);
            }
            body.push((distance - 1) as u8);
            i += len;
        } else {
            body.push(data[i]);
            if data[i] == keycode {
                body.push(keycode);
            }
            i += 1;
        }
    }

    let mut out = Vec::with_capacity(body.len() + 9);
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.write_u32::<LittleEndian>((body.len() + 9) as u32).unwrap();
    out.push(keycode);
    out.extend_from_slice(&body);
    out
}

/// Upper-case ASCII letters, leaving Shift-JIS double-byte pairs alone.
pub(crate) fn sjis_upper(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if matches!(b, 0x81..=0x9F | 0xE0..=0xFC) && i + 1 < bytes.len() {
            out.extend_from_slice(&bytes[i..i + 2]);
            i += 2;
        } else {
            out.push(b.to_ascii_uppercase());
            i += 1;
        }
    }
    out
}

/// Name table record: pack count, parity, upper-cased name, original name.
pub(crate) fn name_record(original: &[u8]) -> Vec<u8> {
    let upper = sjis_upper(original);
    let packs = (original.len() + 1 + 3) / 4;
    let parity = upper.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));

    let mut out = Vec::new();
    out.write_u16::<LittleEndian>(packs as u16).unwrap();
    out.write_u16::<LittleEndian>(parity).unwrap();
    for name in [&upper, &original.to_vec()] {
        let mut padded = name.clone();
        padded.resize(packs * 4, 0);
        out.extend_from_slice(&padded);
    }
    out
}

/// How a fixture file is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Packing {
    Stored,
    Lz,
    Huffman,
    LzHuffman,
}

enum Child {
    Dir(usize),
    File(usize),
}

struct Dir {
    name: String,
    parent: Option<usize>,
    children: Vec<Child>,
}

/// Builds DXA v8 archives in memory.
pub(crate) struct ArchiveBuilder {
    files: Vec<(String, Vec<u8>, Packing)>,
    password: Option<String>,
    compress_index: bool,
    huffman_kb: u8,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self {
            files: Vec::new(),
            password: None,
            compress_index: false,
            huffman_kb: 0xFF,
        }
    }

    pub(crate) fn file(mut self, path: &str, data: impl Into<Vec<u8>>, packing: Packing) -> Self {
        self.files.push((path.to_string(), data.into(), packing));
        self
    }

    pub(crate) fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub(crate) fn compress_index(mut self, compress: bool) -> Self {
        self.compress_index = compress;
        self
    }

    pub(crate) fn huffman_kb(mut self, kb: u8) -> Self {
        self.huffman_kb = kb;
        self
    }

    fn tree(&self) -> Vec<Dir> {
        let mut dirs = vec![Dir {
            name: String::new(),
            parent: None,
            children: Vec::new(),
        }];

        for (file_index, (path, _, _)) in self.files.iter().enumerate() {
            let mut current = 0;
            let parts: Vec<&str> = path.split('/').collect();
            for part in &parts[..parts.len() - 1] {
                let existing = dirs[current].children.iter().find_map(|child| match child {
                    Child::Dir(d) if dirs[*d].name == *part => Some(*d),
                    _ => None,
                });
                current = match existing {
                    Some(d) => d,
                    None => {
                        dirs.push(Dir {
                            name: part.to_string(),
                            parent: Some(current),
                            children: Vec::new(),
                        });
                        let d = dirs.len() - 1;
                        dirs[current].children.push(Child::Dir(d));
                        d
                    }
                };
            }
            dirs[current].children.push(Child::File(file_index));
        }
        dirs
    }

    /// Encode one payload, returning (stored bytes, lz size, huffman size).
    fn pack(&self, data: &[u8], packing: Packing) -> (Vec<u8>, i64, i64) {
        let huffman = |input: &[u8]| -> (Vec<u8>, i64) {
            let cap = if self.huffman_kb == 0xFF {
                None
            } else {
                Some(usize::from(self.huffman_kb) * 1024)
            };
            match cap {
                Some(edge) if input.len() > edge * 2 => {
                    let mut ends = input[..edge].to_vec();
                    ends.extend_from_slice(&input[input.len() - edge..]);
                    let mut stored = huffman_encode(&ends);
                    let huffman_size = stored.len() as i64;
                    stored.extend_from_slice(&input[edge..input.len() - edge]);
                    (stored, huffman_size)
                }
                _ => {
                    let stored = huffman_encode(input);
                    let size = stored.len() as i64;
                    (stored, size)
                }
            }
        };

        match packing {
            Packing::Stored => (data.to_vec(), -1, -1),
            Packing::Lz => {
                let lz = lz_encode(data);
                let size = lz.len() as i64;
                (lz, size, -1)
            }
            Packing::Huffman => {
                let (stored, size) = huffman(data);
                (stored, -1, size)
            }
            Packing::LzHuffman => {
                let lz = lz_encode(data);
                let (stored, size) = huffman(&lz);
                (stored, lz.len() as i64, size)
            }
        }
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        const DIR_RECORD: usize = 0x20;
        const FILE_RECORD: usize = 0x48;

        let dirs = self.tree();
        let password = self.password.as_deref().map(str::as_bytes);

        let mut file_table_offsets = Vec::with_capacity(dirs.len());
        let mut running = 0;
        for dir in &dirs {
            file_table_offsets.push(running);
            running += dir.children.len() * FILE_RECORD;
        }
        let file_table_len = running;

        let mut names = Vec::new();
        let mut add_name = |name: &str| -> i64 {
            let offset = names.len() as i64;
            let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(name);
            names.extend_from_slice(&name_record(&encoded));
            offset
        };

        let upper_of = |name: &str| sjis_upper(&encoding_rs::SHIFT_JIS.encode(name).0);

        let mut payload = Vec::new();
        let mut file_table = vec![0u8; file_table_len];
        let mut dir_table = Vec::new();

        for (index, dir) in dirs.iter().enumerate() {
            let (self_offset, parent_offset) = match dir.parent {
                None => (-1i64, -1i64),
                Some(parent) => {
                    let slot = dirs[parent]
                        .children
                        .iter()
                        .position(|c| matches!(c, Child::Dir(d) if *d == index))
                        .unwrap();
                    (
                        (file_table_offsets[parent] + slot * FILE_RECORD) as i64,
                        (parent * DIR_RECORD) as i64,
                    )
                }
            };
            dir_table.write_i64::<LittleEndian>(self_offset).unwrap();
            dir_table.write_i64::<LittleEndian>(parent_offset).unwrap();
            dir_table.write_i64::<LittleEndian>(dir.children.len() as i64).unwrap();
            dir_table
                .write_i64::<LittleEndian>(file_table_offsets[index] as i64)
                .unwrap();

            for (slot, child) in dir.children.iter().enumerate() {
                let mut record = Vec::with_capacity(FILE_RECORD);
                match child {
                    Child::Dir(d) => {
                        record.write_i64::<LittleEndian>(add_name(&dirs[*d].name)).unwrap();
                        record.write_i64::<LittleEndian>(0x10).unwrap();
                        record.extend_from_slice(&[0u8; 0x18]);
                        record.write_i64::<LittleEndian>((*d * DIR_RECORD) as i64).unwrap();
                        record.write_i64::<LittleEndian>(0).unwrap();
                        record.write_i64::<LittleEndian>(-1).unwrap();
                        record.write_i64::<LittleEndian>(-1).unwrap();
                    }
                    Child::File(f) => {
                        let (path, data, packing) = &self.files[*f];
                        let file_name = path.rsplit('/').next().unwrap_or(path);
                        let (mut stored, lz_size, huffman_size) = self.pack(data, *packing);

                        if let Some(password) = password {
                            let mut chain = vec![upper_of(file_name)];
                            let mut current = Some(index);
                            while let Some(d) = current {
                                if dirs[d].parent.is_some() {
                                    chain.push(upper_of(&dirs[d].name));
                                }
                                current = dirs[d].parent;
                            }
                            let key = DxaKey::for_entry(password, chain.iter().map(Vec::as_slice));
                            XorCipher.apply(&mut stored, data.len() as u64, &key);
                        }

                        record.write_i64::<LittleEndian>(add_name(file_name)).unwrap();
                        record.write_i64::<LittleEndian>(0x20).unwrap();
                        record.extend_from_slice(&[0u8; 0x18]);
                        record.write_i64::<LittleEndian>(payload.len() as i64).unwrap();
                        record.write_i64::<LittleEndian>(data.len() as i64).unwrap();
                        record.write_i64::<LittleEndian>(lz_size).unwrap();
                        record.write_i64::<LittleEndian>(huffman_size).unwrap();
                        payload.extend_from_slice(&stored);
                    }
                }
                let at = file_table_offsets[index] + slot * FILE_RECORD;
                file_table[at..at + FILE_RECORD].copy_from_slice(&record);
            }
        }

        let file_table_offset = names.len();
        let dir_table_offset = file_table_offset + file_table.len();
        let mut index = names;
        index.extend_from_slice(&file_table);
        index.extend_from_slice(&dir_table);
        let index_size = index.len();

        let mut stored_index = if self.compress_index {
            huffman_encode(&lz_encode(&index))
        } else {
            index
        };
        if let Some(password) = password {
            XorCipher.apply(&mut stored_index, 0, &DxaKey::from_keyword(password));
        }

        let flags = HeaderFlags {
            no_key: password.is_none(),
            no_head_compress: !self.compress_index,
        };
        let header = RawHeader {
            magic: RawHeader::MAGIC,
            version: RawHeader::VERSION,
            index_size: index_size as u32,
            base_offset: RawHeader::SIZE as i64,
            index_offset: (RawHeader::SIZE + payload.len()) as i64,
            file_table_offset: file_table_offset as i64,
            dir_table_offset: dir_table_offset as i64,
            code_page: 932,
            flags: flags.bits(),
            huffman_kb: self.huffman_kb,
            reserved: [0; 15],
        };

        let mut archive = zerocopy::IntoBytes::as_bytes(&header).to_vec();
        archive.extend_from_slice(&payload);
        archive.extend_from_slice(&stored_index);
        archive
    }
}

/// Cipher that counts its invocations.
#[derive(Debug, Default)]
pub(crate) struct CountingCipher {
    pub(crate) calls: AtomicUsize,
}

impl Cipher for CountingCipher {
    fn apply(&self, data: &mut [u8], position: u64, key: &DxaKey) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        XorCipher.apply(data, position, key);
    }
}

/// LZ decoder that counts its invocations.
#[derive(Debug, Default)]
pub(crate) struct CountingLz {
    pub(crate) calls: AtomicUsize,
}

impl LzDecoder for CountingLz {
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DxLz.decompress(data, expected_size)
    }
}
