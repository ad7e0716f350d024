use epher_hash::{HashType, Sum};
use epher_store::StoreError;

/// Renders a `Sum` as a URL query value: `"<tag>:<hex digest>"`. Distinct
/// from the wire codec's length-prefixed binary encoding — this is purely
/// for addressing an object in a request URL.
pub fn format(sum: &Sum) -> String {
    format!("{}:{}", sum.hash_type().tag(), sum.to_hex())
}

pub fn parse(raw: &str) -> Result<Sum, StoreError> {
    let (tag, hex_digest) = raw
        .split_once(':')
        .ok_or_else(|| StoreError::Malformed(format!("malformed sum parameter {raw:?}")))?;
    let tag: u16 = tag
        .parse()
        .map_err(|_| StoreError::Malformed(format!("malformed sum tag in {raw:?}")))?;
    let hash_type = HashType::from_tag(tag)?;
    let digest = hex::decode(hex_digest)
        .map_err(|_| StoreError::Malformed(format!("malformed sum digest in {raw:?}")))?;
    Ok(Sum::new(hash_type, digest)?)
}
