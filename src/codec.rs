//! C5 — piece transport wire codec.
//!
//! Every record is hand-packed into little-endian bytes, matching the
//! reference implementation's approach: this layer predates (and is far
//! narrower than) anything `serde`/`bincode` would buy us, so it stays raw
//! byte slicing the way `saw_message`'s record switch in the original does.
//! A malformed or truncated record aborts only the remainder of the packet
//! it appeared in — see [`crate::error::FramingError`] and never the caller's
//! session with that peer.

use crate::error::FramingError;
use crate::tree::TreeKey;

pub const TAG_BAR: u8 = b'B';
pub const TAG_LENGTH: u8 = b'L';
// Bit 0x20 distinguishes sub-1 MiB ('p'/'q') from above-1 MiB ('P'/'Q');
// bit 0x01 is the end-of-item flag, clear on 'p'/'P' and set on 'q'/'Q'.
pub const TAG_PIECE_SMALL_MID: u8 = b'q';
pub const TAG_PIECE_SMALL_END: u8 = b'p';
pub const TAG_PIECE_LARGE_MID: u8 = b'Q';
pub const TAG_PIECE_LARGE_END: u8 = b'P';
pub const TAG_REQUEST: u8 = b'R';
pub const TAG_SYNC_TREE: u8 = b'S';

/// Records too small or too large in a single piece are not emitted; the
/// scheduler caps `length` itself, the decoder only validates it fits.
pub const MAX_PIECE_BYTES: usize = 2047;
const ONE_MIB: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub bid_prefix: u64,
    pub version: u64,
    pub recipient_prefix: u32,
    pub size_byte: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthAdvert {
    pub bid_prefix: u64,
    pub version: u64,
    pub body_length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub bid_prefix: u64,
    pub version: u64,
    pub offset: u64,
    pub length: u16,
    pub is_manifest: bool,
    pub end_of_item: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub target_sid_prefix: u16,
    pub bid_prefix: u64,
    /// 23-bit offset; top bit of the 24-bit on-wire field selects
    /// manifest (1) vs body (0).
    pub offset: u32,
    pub is_manifest: bool,
    pub size_byte: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTreeWrapper {
    pub recipient_sid_prefix: u32,
    pub local_seq: u8,
    pub remote_seq_ack: u8,
    pub remote_bitmap: u16,
    pub records: Vec<TreeKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Bar(Bar),
    Length(LengthAdvert),
    Piece(Piece),
    Request(Request),
    SyncTree(SyncTreeWrapper),
}

fn need(buf: &[u8], n: usize, tag: u8) -> Result<(), FramingError> {
    if buf.len() < n {
        return Err(FramingError::Truncated {
            record_type: tag,
            expected: n,
            found: buf.len(),
        });
    }
    Ok(())
}

/// Pack `offset | (length << 20) | (is_manifest << 31)` into the low 32
/// bits, with bits 32..48 (if present) carrying the high 16 bits of a
/// 36-bit offset for bundles larger than 1 MiB.
fn pack_offset_compound(offset: u64, length: u16, is_manifest: bool) -> (u32, u16) {
    let low20 = (offset & 0xF_FFFF) as u32;
    let high16 = (offset >> 20) as u16;
    let low = low20 | ((length as u32 & 0x7FF) << 20) | ((is_manifest as u32) << 31);
    (low, high16)
}

fn unpack_offset_compound(low: u32, high16: u16) -> (u64, u16, bool) {
    let offset_low20 = (low & 0xF_FFFF) as u64;
    let length = ((low >> 20) & 0x7FF) as u16;
    let is_manifest = (low >> 31) & 1 == 1;
    let offset = offset_low20 | ((high16 as u64) << 20);
    (offset, length, is_manifest)
}

pub fn encode_bar(bar: &Bar, out: &mut Vec<u8>) {
    out.push(TAG_BAR);
    out.extend_from_slice(&bar.bid_prefix.to_le_bytes());
    out.extend_from_slice(&bar.version.to_le_bytes());
    out.extend_from_slice(&bar.recipient_prefix.to_le_bytes());
    out.push(bar.size_byte);
    out.extend_from_slice(&[0u8; 2]); // reserved, keeps the record 24 bytes
}

pub fn encode_length(len: &LengthAdvert, out: &mut Vec<u8>) {
    out.push(TAG_LENGTH);
    out.extend_from_slice(&len.bid_prefix.to_le_bytes());
    out.extend_from_slice(&len.version.to_le_bytes());
    out.extend_from_slice(&len.body_length.to_le_bytes());
}

pub fn encode_piece(piece: &Piece, out: &mut Vec<u8>) {
    let large = piece.offset + piece.length as u64 > ONE_MIB;
    let tag = match (large, piece.end_of_item) {
        (false, false) => TAG_PIECE_SMALL_MID,
        (false, true) => TAG_PIECE_SMALL_END,
        (true, false) => TAG_PIECE_LARGE_MID,
        (true, true) => TAG_PIECE_LARGE_END,
    };
    let (low, high16) = pack_offset_compound(piece.offset, piece.length, piece.is_manifest);
    out.push(tag);
    out.extend_from_slice(&piece.bid_prefix.to_le_bytes());
    out.extend_from_slice(&piece.version.to_le_bytes());
    out.extend_from_slice(&low.to_le_bytes());
    if large {
        out.extend_from_slice(&high16.to_le_bytes());
    }
    out.extend_from_slice(&piece.data);
}

pub fn encode_request(req: &Request, out: &mut Vec<u8>) {
    out.push(TAG_REQUEST);
    out.extend_from_slice(&req.target_sid_prefix.to_le_bytes());
    out.extend_from_slice(&req.bid_prefix.to_le_bytes());
    let mut offset_field = req.offset & 0x7F_FFFF;
    if req.is_manifest {
        offset_field |= 1 << 23;
    }
    out.extend_from_slice(&offset_field.to_le_bytes()[..3]);
    out.push(req.size_byte);
    out.push(0); // reserved, keeps the record 16 bytes
}

pub fn encode_sync_tree(wrapper: &SyncTreeWrapper, out: &mut Vec<u8>) {
    out.push(TAG_SYNC_TREE);
    out.extend_from_slice(&wrapper.recipient_sid_prefix.to_le_bytes()[..3]);
    out.push(wrapper.local_seq);
    out.push(wrapper.remote_seq_ack);
    out.extend_from_slice(&wrapper.remote_bitmap.to_le_bytes());
    out.push(wrapper.records.len().min(u8::MAX as usize) as u8);
    for key in wrapper.records.iter().take(u8::MAX as usize) {
        out.extend_from_slice(&key.payload);
        out.push(key.min_prefix_len);
        out.push(key.prefix_len);
    }
}

pub fn encode(record: &Record, out: &mut Vec<u8>) {
    match record {
        Record::Bar(b) => encode_bar(b, out),
        Record::Length(l) => encode_length(l, out),
        Record::Piece(p) => encode_piece(p, out),
        Record::Request(r) => encode_request(r, out),
        Record::SyncTree(s) => encode_sync_tree(s, out),
    }
}

/// Parse one record from the front of `buf`, returning it along with the
/// number of bytes consumed. Callers loop this until the buffer is empty or
/// a [`FramingError`] is returned, at which point the remainder of the
/// packet is discarded.
pub fn decode_one(buf: &[u8]) -> Result<(Record, usize), FramingError> {
    let tag = *buf.first().ok_or(FramingError::ShortHeader(1))?;
    match tag {
        TAG_BAR => {
            need(buf, 24, tag)?;
            let bid_prefix = u64::from_le_bytes(buf[1..9].try_into().unwrap());
            let version = u64::from_le_bytes(buf[9..17].try_into().unwrap());
            let recipient_prefix = u32::from_le_bytes(buf[17..21].try_into().unwrap());
            let size_byte = buf[21];
            Ok((
                Record::Bar(Bar {
                    bid_prefix,
                    version,
                    recipient_prefix,
                    size_byte,
                }),
                24,
            ))
        }
        TAG_LENGTH => {
            need(buf, 21, tag)?;
            let bid_prefix = u64::from_le_bytes(buf[1..9].try_into().unwrap());
            let version = u64::from_le_bytes(buf[9..17].try_into().unwrap());
            let body_length = u32::from_le_bytes(buf[17..21].try_into().unwrap());
            Ok((
                Record::Length(LengthAdvert {
                    bid_prefix,
                    version,
                    body_length,
                }),
                21,
            ))
        }
        TAG_PIECE_SMALL_MID | TAG_PIECE_SMALL_END | TAG_PIECE_LARGE_MID | TAG_PIECE_LARGE_END => {
            let large = matches!(tag, TAG_PIECE_LARGE_MID | TAG_PIECE_LARGE_END);
            let end_of_item = matches!(tag, TAG_PIECE_SMALL_END | TAG_PIECE_LARGE_END);
            let header_len = if large { 23 } else { 21 };
            need(buf, header_len, tag)?;
            let bid_prefix = u64::from_le_bytes(buf[1..9].try_into().unwrap());
            let version = u64::from_le_bytes(buf[9..17].try_into().unwrap());
            let low = u32::from_le_bytes(buf[17..21].try_into().unwrap());
            let high16 = if large {
                u16::from_le_bytes(buf[21..23].try_into().unwrap())
            } else {
                0
            };
            let (offset, length, is_manifest) = unpack_offset_compound(low, high16);
            let data_start = header_len;
            let data_end = data_start + length as usize;
            need(buf, data_end, tag)?;
            Ok((
                Record::Piece(Piece {
                    bid_prefix,
                    version,
                    offset,
                    length,
                    is_manifest,
                    end_of_item,
                    data: buf[data_start..data_end].to_vec(),
                }),
                data_end,
            ))
        }
        TAG_REQUEST => {
            need(buf, 16, tag)?;
            let target_sid_prefix = u16::from_le_bytes(buf[1..3].try_into().unwrap());
            let bid_prefix = u64::from_le_bytes(buf[3..11].try_into().unwrap());
            let mut offset_bytes = [0u8; 4];
            offset_bytes[..3].copy_from_slice(&buf[11..14]);
            let packed = u32::from_le_bytes(offset_bytes);
            let is_manifest = (packed >> 23) & 1 == 1;
            let offset = packed & 0x7F_FFFF;
            let size_byte = buf[14];
            Ok((
                Record::Request(Request {
                    target_sid_prefix,
                    bid_prefix,
                    offset,
                    is_manifest,
                    size_byte,
                }),
                16,
            ))
        }
        TAG_SYNC_TREE => {
            need(buf, 9, tag)?;
            let mut prefix_bytes = [0u8; 4];
            prefix_bytes[..3].copy_from_slice(&buf[1..4]);
            let recipient_sid_prefix = u32::from_le_bytes(prefix_bytes);
            let local_seq = buf[4];
            let remote_seq_ack = buf[5];
            let remote_bitmap = u16::from_le_bytes(buf[6..8].try_into().unwrap());
            let count = buf[8] as usize;
            let total_len = 9 + count * 10;
            need(buf, total_len, tag)?;
            let mut records = Vec::with_capacity(count);
            for i in 0..count {
                let start = 9 + i * 10;
                let mut payload = [0u8; 8];
                payload.copy_from_slice(&buf[start..start + 8]);
                let min_prefix_len = buf[start + 8];
                let prefix_len = buf[start + 9];
                records.push(TreeKey {
                    payload,
                    prefix_len,
                    min_prefix_len,
                });
            }
            Ok((
                Record::SyncTree(SyncTreeWrapper {
                    recipient_sid_prefix,
                    local_seq,
                    remote_seq_ack,
                    remote_bitmap,
                    records,
                }),
                total_len,
            ))
        }
        other => Err(FramingError::UnknownRecordType(other)),
    }
}

/// Decode every record in `buf`, stopping (without erroring) at the first
/// record that fails to parse — its bytes and everything after are simply
/// dropped, per §7: a framing error discards the remainder of the packet,
/// it never propagates further.
pub fn decode_all(mut buf: &[u8]) -> Vec<Record> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        match decode_one(buf) {
            Ok((record, used)) => {
                out.push(record);
                buf = &buf[used..];
            }
            Err(_) => break,
        }
    }
    out
}
