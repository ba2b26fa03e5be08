use crate::slots::SLOT_COUNT;

/// Compute CRC16 (XMODEM) hash over the provided bytes.
pub fn crc16(data: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(data)
}

/// Hash slot for a key, honoring `{…}` hash tags as specified by Redis
/// Cluster: when the key contains a non-empty brace-delimited segment, only
/// that segment is hashed.
pub fn key_hash_slot(key: &[u8]) -> u16 {
    crc16(trim_hash_tag(key)) % SLOT_COUNT
}

fn trim_hash_tag(key: &[u8]) -> &[u8] {
    if let Some(begin) = key.iter().position(|&b| b == b'{') {
        if let Some(offset) = key[begin + 1..].iter().position(|&b| b == b'}') {
            if offset > 0 {
                let start = begin + 1;
                return &key[start..start + offset];
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_tag_groups_keys_on_one_slot() {
        assert_eq!(
            key_hash_slot(b"{user1000}.following"),
            key_hash_slot(b"{user1000}.followers")
        );
    }

    #[test]
    fn empty_hash_tag_hashes_whole_key() {
        assert_eq!(key_hash_slot(b"foo{}bar"), crc16(b"foo{}bar") % SLOT_COUNT);
    }

    #[test]
    fn known_slot_values() {
        // slot of "foo" as published in the cluster specification examples
        assert_eq!(key_hash_slot(b"foo"), 12182);
    }
}
