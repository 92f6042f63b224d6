use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::Config;
use crate::database::Database;
use crate::utils;

const ERR_MSG_ITER: &str = "error iterating scanned data";
const NUM_ENTRIES: u64 = 1_001;
const PREFIX_A: &[u8; 1] = b"a";
/// We use this in tests as it is middle in lexicographical sort order.
const PREFIX_B: &[u8; 1] = b"b";
const PREFIX_C: &[u8; 1] = b"c";

#[tokio::test]
async fn test_exhaustive_scan_prefix_and_range_behavior() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let db = Database::new(config.clone()).await?;
    let tree = db.get_events_tree().await?;

    // Load data distributed across three key prefixes which are used to assert correctness of
    // range scans and prefix scans, which depend upon the correctness of key encoding.
    load_data(&tree)?;

    // Assert that prefix scan finds the correct amount of data.
    let mut count = 0;
    for kv_res in tree.scan_prefix(PREFIX_B) {
        let (key, val) = kv_res.context(ERR_MSG_ITER)?;
        assert!(key[0] == PREFIX_B[0], "bad key prefix: got {} expected {}", key[0], PREFIX_B[0]);
        count += 1;
        let _key = utils::decode_u64(&key[1..])?;
        let _val = utils::decode_u64(&val)?;
    }
    assert_eq!(count, NUM_ENTRIES, "expected scan_prefix to find {} entries, got {}", NUM_ENTRIES, count);

    // Assert that range scans preserve sort order based on our key prefix strategy.
    let (start, stop, mut count, mut current_offset) = (PREFIX_B, PREFIX_C, 0, 0u64);
    for kv_res in tree.range::<_, std::ops::Range<&[u8]>>(start..stop) {
        let (key, val) = kv_res.context(ERR_MSG_ITER)?;
        assert!(key[0] == PREFIX_B[0], "bad key prefix: got {} expected {}", key[0], PREFIX_B[0]);
        count += 1;
        let key = utils::decode_u64(&key[1..])?;
        let val = utils::decode_u64(&val)?;
        assert_eq!(key, current_offset, "db.range with prefix iterated out of order, expected key {} got {}", current_offset, key);
        assert_eq!(val, current_offset, "db.range with prefix iterated out of order, expected val {} got {}", current_offset, val);
        current_offset += 1;
    }
    assert_eq!(count, NUM_ENTRIES, "expected range to find {} entries, got {}", NUM_ENTRIES, count);

    Ok(())
}

/// Write `NUM_ENTRIES` entries under each of the three test prefixes.
fn load_data(tree: &sled::Tree) -> Result<()> {
    let mut batch = sled::Batch::default();
    for prefix in [PREFIX_A, PREFIX_B, PREFIX_C] {
        for offset in 0..NUM_ENTRIES {
            batch.insert(&utils::encode_byte_prefix(prefix, offset), &utils::encode_u64(offset));
        }
    }
    tree.apply_batch(batch).context("error applying batch of test data")?;
    Ok(())
}

#[test]
fn test_uuid_key_encoding() -> Result<()> {
    let id = Uuid::new_v4();

    let key = utils::encode_uuid_prefix(b"c", &id);
    assert!(key[0] == b'c', "expected key prefix byte {} got {}", b'c', key[0]);
    let decoded = utils::decode_uuid(&key[1..])?;
    assert!(decoded == id, "expected decoded uuid {} got {}", id, decoded);

    let composite = utils::encode_uuid_u64_prefix(b"r", &id, 42);
    assert!(&composite[1..17] == id.as_bytes(), "expected uuid bytes to be embedded in composite key");
    let offset = utils::decode_u64(&composite[17..])?;
    assert!(offset == 42, "expected decoded offset 42 got {}", offset);

    Ok(())
}

#[test]
fn test_uuid_u64_keys_sort_by_offset_per_parent() {
    let id = Uuid::new_v4();

    let lo = utils::encode_uuid_u64_prefix(b"r", &id, 1);
    let hi = utils::encode_uuid_u64_prefix(b"r", &id, 2);

    assert!(lo < hi, "expected offset 1 key to sort before offset 2 key");
}

#[test]
fn test_decode_u64_rejects_bad_lengths() {
    let res = utils::decode_u64(&[0u8; 7]);
    assert!(res.is_err(), "expected decode of 7 bytes to fail");
    let res = utils::decode_i64(&[0u8; 9]);
    assert!(res.is_err(), "expected decode of 9 bytes to fail");
}

#[test]
fn test_i64_keys_sort_numerically_across_sign() -> Result<()> {
    let values = [i64::MIN, -1_000, -1, 0, 1, 1_000, i64::MAX];
    let mut keys: Vec<[u8; 8]> = values.iter().map(|&val| utils::encode_i64(val)).collect();
    keys.sort();

    for (idx, key) in keys.iter().enumerate() {
        let decoded = utils::decode_i64(key)?;
        assert!(decoded == values[idx], "expected key at index {} to decode to {} got {}", idx, values[idx], decoded);
    }

    Ok(())
}

#[test]
fn test_decode_uuid_rejects_bad_lengths() -> Result<()> {
    let err = match utils::decode_uuid(&[0u8; 3]) {
        Ok(id) => anyhow::bail!("expected decode of 3 bytes to fail, got {}", id),
        Err(err) => err,
    };
    assert!(err.to_string().contains("invalid byte array"), "unexpected error message: {}", err);
    Ok(())
}
