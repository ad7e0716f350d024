//! Binary, length-prefixed wire format shared by the RPC transport and
//! every on-disk store backend. All integers are little-endian.
//!
//! ```text
//! Sum      := u16 hash_type_tag, i64 digest_len, digest_len bytes
//! Node     := Sum sum, Sum start, Sum end
//! BlobInfo := Sum sum, i64 size
//! Blob     := Sum sum, i64 payload_len, payload_len bytes
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use epher_hash::{HashError, HashType, Sum};
use epher_store::{BlobInfo, Node};
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated record: {0}")]
    Truncated(String),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

fn io_to_codec(err: io::Error, what: &str) -> CodecError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => CodecError::Truncated(what.to_string()),
        _ => CodecError::Io(err),
    }
}

pub fn encode_sum<W: Write>(w: &mut W, sum: &Sum) -> CodecResult<()> {
    w.write_u16::<LittleEndian>(sum.hash_type().tag())?;
    w.write_i64::<LittleEndian>(sum.digest().len() as i64)?;
    w.write_all(sum.digest())?;
    Ok(())
}

pub fn decode_sum<R: Read>(r: &mut R) -> CodecResult<Sum> {
    let tag = r
        .read_u16::<LittleEndian>()
        .map_err(|e| io_to_codec(e, "sum tag"))?;
    let hash_type = HashType::from_tag(tag)?;

    let len = r
        .read_i64::<LittleEndian>()
        .map_err(|e| io_to_codec(e, "sum length"))?;
    if len < 0 {
        return Err(CodecError::Malformed(format!("negative sum length {len}")));
    }
    let mut digest = vec![0u8; len as usize];
    r.read_exact(&mut digest)
        .map_err(|e| io_to_codec(e, "sum digest"))?;

    Ok(Sum::new(hash_type, digest)?)
}

pub fn encode_node<W: Write>(w: &mut W, node: &Node) -> CodecResult<()> {
    encode_sum(w, &node.sum)?;
    encode_sum(w, &node.start)?;
    encode_sum(w, &node.end)?;
    Ok(())
}

pub fn decode_node<R: Read>(r: &mut R) -> CodecResult<Node> {
    let sum = decode_sum(r)?;
    let start = decode_sum(r)?;
    let end = decode_sum(r)?;
    Ok(Node { sum, start, end })
}

pub fn encode_blob_info<W: Write>(w: &mut W, info: &BlobInfo) -> CodecResult<()> {
    encode_sum(w, &info.sum)?;
    w.write_i64::<LittleEndian>(info.size)?;
    Ok(())
}

pub fn decode_blob_info<R: Read>(r: &mut R) -> CodecResult<BlobInfo> {
    let sum = decode_sum(r)?;
    let size = r
        .read_i64::<LittleEndian>()
        .map_err(|e| io_to_codec(e, "blob info size"))?;
    if size < 0 {
        return Err(CodecError::Malformed(format!("negative blob size {size}")));
    }
    Ok(BlobInfo { sum, size })
}

/// Encodes a blob record: its sum followed by a length-prefixed payload.
pub fn encode_blob<W: Write>(w: &mut W, sum: &Sum, payload: &[u8]) -> CodecResult<()> {
    encode_sum(w, sum)?;
    w.write_i64::<LittleEndian>(payload.len() as i64)?;
    w.write_all(payload)?;
    Ok(())
}

/// Decodes a blob record into its sum and payload.
pub fn decode_blob<R: Read>(r: &mut R) -> CodecResult<(Sum, Vec<u8>)> {
    let sum = decode_sum(r)?;
    let len = r
        .read_i64::<LittleEndian>()
        .map_err(|e| io_to_codec(e, "blob length"))?;
    if len < 0 {
        return Err(CodecError::Malformed(format!("negative blob length {len}")));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)
        .map_err(|e| io_to_codec(e, "blob payload"))?;
    Ok((sum, payload))
}

/// A codec for the wire types, so callers that are generic over the wire
/// format (rather than hardwired to the free functions above) have a trait
/// object or type parameter to hold onto.
pub trait Codec: Send + Sync {
    fn encode_sum(&self, w: &mut dyn Write, sum: &Sum) -> CodecResult<()>;
    fn decode_sum(&self, r: &mut dyn Read) -> CodecResult<Sum>;
    fn encode_node(&self, w: &mut dyn Write, node: &Node) -> CodecResult<()>;
    fn decode_node(&self, r: &mut dyn Read) -> CodecResult<Node>;
    fn encode_blob_info(&self, w: &mut dyn Write, info: &BlobInfo) -> CodecResult<()>;
    fn decode_blob_info(&self, r: &mut dyn Read) -> CodecResult<BlobInfo>;
    fn encode_blob(&self, w: &mut dyn Write, sum: &Sum, payload: &[u8]) -> CodecResult<()>;
    fn decode_blob(&self, r: &mut dyn Read) -> CodecResult<(Sum, Vec<u8>)>;
}

/// The little-endian framing documented at the top of this module, behind
/// the [`Codec`] trait. Stateless: every method just delegates to the free
/// function of the same name.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn encode_sum(&self, w: &mut dyn Write, sum: &Sum) -> CodecResult<()> {
        encode_sum(w, sum)
    }

    fn decode_sum(&self, r: &mut dyn Read) -> CodecResult<Sum> {
        decode_sum(r)
    }

    fn encode_node(&self, w: &mut dyn Write, node: &Node) -> CodecResult<()> {
        encode_node(w, node)
    }

    fn decode_node(&self, r: &mut dyn Read) -> CodecResult<Node> {
        decode_node(r)
    }

    fn encode_blob_info(&self, w: &mut dyn Write, info: &BlobInfo) -> CodecResult<()> {
        encode_blob_info(w, info)
    }

    fn decode_blob_info(&self, r: &mut dyn Read) -> CodecResult<BlobInfo> {
        decode_blob_info(r)
    }

    fn encode_blob(&self, w: &mut dyn Write, sum: &Sum, payload: &[u8]) -> CodecResult<()> {
        encode_blob(w, sum, payload)
    }

    fn decode_blob(&self, r: &mut dyn Read) -> CodecResult<(Sum, Vec<u8>)> {
        decode_blob(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epher_hash::sum as hash_sum;

    fn sample_sum(data: &[u8]) -> Sum {
        hash_sum(HashType::Sha1, data)
    }

    #[test]
    fn sum_roundtrips() {
        let s = sample_sum(b"hello");
        let mut buf = Vec::new();
        encode_sum(&mut buf, &s).unwrap();
        let got = decode_sum(&mut &buf[..]).unwrap();
        assert_eq!(got, s);
    }

    #[test]
    fn node_roundtrips() {
        let start = sample_sum(b"left");
        let end = sample_sum(b"right");
        let node_sum = epher_hash::sum_concat(HashType::Sha1, start.digest(), end.digest());
        let node = Node {
            sum: node_sum,
            start,
            end,
        };
        let mut buf = Vec::new();
        encode_node(&mut buf, &node).unwrap();
        let got = decode_node(&mut &buf[..]).unwrap();
        assert_eq!(got, node);
    }

    #[test]
    fn blob_info_roundtrips() {
        let info = BlobInfo {
            sum: sample_sum(b"x"),
            size: 42,
        };
        let mut buf = Vec::new();
        encode_blob_info(&mut buf, &info).unwrap();
        let got = decode_blob_info(&mut &buf[..]).unwrap();
        assert_eq!(got, info);
    }

    #[test]
    fn blob_roundtrips() {
        let s = sample_sum(b"payload-sum");
        let mut buf = Vec::new();
        encode_blob(&mut buf, &s, b"the payload").unwrap();
        let (got_sum, got_payload) = decode_blob(&mut &buf[..]).unwrap();
        assert_eq!(got_sum, s);
        assert_eq!(got_payload, b"the payload");
    }

    #[test]
    fn truncated_sum_is_reported_as_truncated() {
        let s = sample_sum(b"short");
        let mut buf = Vec::new();
        encode_sum(&mut buf, &s).unwrap();
        buf.truncate(buf.len() - 1);
        let err = decode_sum(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated(_)));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(99).unwrap();
        buf.write_i64::<LittleEndian>(4).unwrap();
        buf.write_all(&[0u8; 4]).unwrap();
        let err = decode_sum(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CodecError::Hash(HashError::UnknownType(99))));
    }

    #[test]
    fn binary_codec_roundtrips_through_the_trait() {
        let codec = BinaryCodec;
        let s = sample_sum(b"via-trait");
        let mut buf = Vec::new();
        codec.encode_sum(&mut buf, &s).unwrap();
        let got = codec.decode_sum(&mut &buf[..]).unwrap();
        assert_eq!(got, s);
    }

    #[test]
    fn negative_length_is_malformed() {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(HashType::Sha1.tag()).unwrap();
        buf.write_i64::<LittleEndian>(-1).unwrap();
        let err = decode_sum(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
