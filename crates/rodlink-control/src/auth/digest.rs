//! RFID tag provisioning digest.
//!
//! An authorized tag stores the hex SHA3-512 digest of `tag_id × fp`, where
//! `fp` is the fingerprint of the rig's CA certificate read from
//! `ca-chain.txt` (colon-separated hex).  The product is hashed as its
//! minimal big-endian byte representation.  `auth_tag` on the reader side
//! compares the stored text against this digest; [`provision_tag`] writes
//! it onto a blank tag.

use sha3::{Digest, Sha3_512};

use crate::auth::collaborators::{CollaboratorError, RfidReader, TagId};

/// Parses a certificate fingerprint of the form `AB:CD:EF:...` (colons and
/// surrounding whitespace optional) into raw bytes.
///
/// # Errors
///
/// Returns the `hex` error for non-hex content.
pub fn parse_fingerprint(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(cleaned)
}

/// Computes the digest expected on an authorized tag.
pub fn tag_digest(tag_id: TagId, fingerprint: &[u8]) -> String {
    let product = mul_be(fingerprint, tag_id);
    let mut hasher = Sha3_512::new();
    hasher.update(&product);
    hex::encode(hasher.finalize())
}

/// Reads the tag in range and writes its provisioning digest.  Returns the
/// tag id that was provisioned.
///
/// # Errors
///
/// Propagates reader failures.
pub fn provision_tag<R: RfidReader>(
    reader: &mut R,
    fingerprint: &[u8],
) -> Result<TagId, CollaboratorError> {
    let (tag_id, _) = reader.read_tag()?;
    reader.write_tag(&tag_digest(tag_id, fingerprint))?;
    Ok(tag_id)
}

/// Multiplies a big-endian unsigned integer by `factor`, returning the
/// minimal big-endian representation (empty for zero).  The fingerprint is
/// wider than any machine integer, so this is done by hand.
fn mul_be(value: &[u8], factor: u64) -> Vec<u8> {
    let mut little_endian: Vec<u8> = Vec::with_capacity(value.len() + 8);
    let mut carry: u128 = 0;
    for &byte in value.iter().rev() {
        let product = u128::from(byte) * u128::from(factor) + carry;
        little_endian.push((product & 0xFF) as u8);
        carry = product >> 8;
    }
    while carry > 0 {
        little_endian.push((carry & 0xFF) as u8);
        carry >>= 8;
    }
    while little_endian.last() == Some(&0) {
        little_endian.pop();
    }
    little_endian.reverse();
    little_endian
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference path for products small enough to fit a u128.
    fn expected_product_bytes(value: u128, factor: u128) -> Vec<u8> {
        let product = value * factor;
        let bytes = product.to_be_bytes();
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        bytes[first..].to_vec()
    }

    #[test]
    fn test_mul_be_matches_u128_reference() {
        let cases: [(&[u8], u64); 4] = [
            (&[0x01, 0x02], 1000),
            (&[0xFF, 0xFF, 0xFF, 0xFF], u64::MAX),
            (&[0x80], 2),
            (&[0x00, 0x05], 3),
        ];
        for (value, factor) in cases {
            let mut wide: u128 = 0;
            for &b in value {
                wide = (wide << 8) | u128::from(b);
            }
            assert_eq!(
                mul_be(value, factor),
                expected_product_bytes(wide, u128::from(factor)),
                "value {value:?} × {factor}"
            );
        }
    }

    #[test]
    fn test_mul_be_by_zero_is_empty() {
        assert!(mul_be(&[0xAB, 0xCD], 0).is_empty());
    }

    #[test]
    fn test_parse_fingerprint_strips_colons_and_whitespace() {
        let parsed = parse_fingerprint(" AB:CD:01 \n").unwrap();
        assert_eq!(parsed, vec![0xAB, 0xCD, 0x01]);
    }

    #[test]
    fn test_parse_fingerprint_rejects_non_hex() {
        assert!(parse_fingerprint("ZZ:01").is_err());
    }

    #[test]
    fn test_tag_digest_is_128_hex_chars() {
        let fp = [0xAB; 32];
        let digest = tag_digest(12345, &fp);
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tag_digest_is_deterministic_and_tag_sensitive() {
        let fp = [0x42; 32];
        assert_eq!(tag_digest(1, &fp), tag_digest(1, &fp));
        assert_ne!(tag_digest(1, &fp), tag_digest(2, &fp));
        assert_ne!(tag_digest(1, &fp), tag_digest(1, &[0x43; 32]));
    }

    #[test]
    fn test_tag_digest_matches_direct_hash_for_small_product() {
        // Independent computation through u128 arithmetic.
        let fp = [0x01, 0x00]; // 256
        let tag: TagId = 10;
        let expected_bytes = expected_product_bytes(256, 10);
        let mut hasher = Sha3_512::new();
        hasher.update(&expected_bytes);
        let expected = hex::encode(hasher.finalize());

        assert_eq!(tag_digest(tag, &fp), expected);
    }

    #[test]
    fn test_provision_writes_the_expected_digest() {
        use crate::auth::collaborators::MockRfidReader;

        let fp = [0x11; 16];
        let expected = tag_digest(777, &fp);

        let mut reader = MockRfidReader::new();
        reader
            .expect_read_tag()
            .times(1)
            .returning(|| Ok((777, String::new())));
        reader
            .expect_write_tag()
            .withf(move |digest| digest == expected)
            .times(1)
            .returning(|_| Ok(()));

        let tag = provision_tag(&mut reader, &fp).unwrap();
        assert_eq!(tag, 777);
    }
}
