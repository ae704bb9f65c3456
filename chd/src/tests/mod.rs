use super::{hash::StringHash, Builder, Error, Table, Value, ValueMode};
use alloc::{collections::BTreeSet, format, vec, vec::Vec};
use rapidhash::RapidRng;
use test_log::test;

const NUMERALS: [(&str, &str); 7] = [
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
];

/// Random byte strings of length 1 to 32, deduplicated.
fn random_keys(seed: u64, count: usize) -> Vec<Vec<u8>> {
    let mut rng = RapidRng::new(seed);
    let mut seen = BTreeSet::new();
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let len = (rng.next() % 32 + 1) as usize;
        let key: Vec<u8> = (0..len).map(|_| rng.next() as u8).collect();
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}

fn build_bytes(entries: &[(Vec<u8>, Vec<u8>)]) -> Table<'static> {
    let mut builder = Builder::new(ValueMode::Bytes, entries.len());
    for (key, value) in entries {
        builder.add(key.clone(), value.clone());
    }
    builder.build().unwrap()
}

#[test]
fn numerals() {
    let mut builder = Builder::new(ValueMode::Bytes, NUMERALS.len());
    for (key, value) in NUMERALS {
        builder.add(key, value);
    }
    let table = builder.build().unwrap();

    assert_eq!(table.size(), 15);
    assert_eq!(table.bucket_count(), 7);
    assert_eq!(table.len(), 7);
    for (key, value) in NUMERALS {
        assert_eq!(table.get(key.as_bytes()), Some(Value::Bytes(value.as_bytes())));
    }
    assert_eq!(table.get(b"monkey"), None);
}

#[test]
fn roundtrip_bytes() {
    let keys = random_keys(0x1234, 5000);
    let entries: Vec<(Vec<u8>, Vec<u8>)> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| (key.clone(), format!("value {i}").into_bytes()))
        .collect();
    let table = build_bytes(&entries);

    for (key, value) in &entries {
        assert_eq!(table.get_bytes(key), Some(&value[..]));
        assert!(table.contains_key(key), "{key:?} is present");
    }
}

#[test]
fn roundtrip_integers() {
    let keys = random_keys(0x5678, 5000);
    let mut rng = RapidRng::new(0x9abc);
    let values: Vec<u64> = (0..keys.len())
        .map(|i| match i % 3 {
            0 => i as u64,
            1 => rng.next(),
            _ => u64::MAX - i as u64,
        })
        .collect();

    let mut builder = Builder::new(ValueMode::UInt64, keys.len());
    for (key, &value) in keys.iter().zip(&values) {
        builder.add_uvarint64(key.clone(), value);
    }
    let table = builder.build().unwrap();
    assert_eq!(table.value_mode(), ValueMode::UInt64);

    for (key, &value) in keys.iter().zip(&values) {
        assert_eq!(table.get(key), Some(Value::UInt64(value)));
        assert_eq!(table.get_u64(key), Some(value));
        assert_eq!(table.get_bytes(key), None);
    }
}

#[test]
fn no_false_positives() {
    let keys = random_keys(0xdead, 2000);
    let (present, absent) = keys.split_at(1000);
    let entries: Vec<(Vec<u8>, Vec<u8>)> = present
        .iter()
        .map(|key| (key.clone(), b"x".to_vec()))
        .collect();
    let table = build_bytes(&entries);

    for key in absent {
        assert_eq!(table.get(key), None, "{key:?} was never added");
        assert!(!table.contains_key(key), "{key:?} was never added");
    }
}

#[test]
fn no_collisions() {
    let keys = random_keys(0xbeef, 3000);
    let entries: Vec<(Vec<u8>, Vec<u8>)> =
        keys.iter().map(|key| (key.clone(), vec![])).collect();
    let table = build_bytes(&entries);

    let mut slots = BTreeSet::new();
    for key in &keys {
        let slot = table.slot(key).unwrap();
        assert!(slot < table.size(), "slot {slot} in range");
        assert!(slots.insert(slot), "slot {slot} used twice");
    }
    assert_eq!(table.iter().count(), keys.len());
}

#[test]
fn duplicate_is_rejected() {
    let mut builder = Builder::new(ValueMode::Bytes, NUMERALS.len() + 1);
    for (key, value) in NUMERALS {
        builder.add(key, value);
    }
    builder.add("four", "IV");
    assert!(matches!(
        builder.build(),
        Err(Error::DuplicateKey { key }) if key == b"four"
    ));
}

#[test]
fn empty_table() {
    let table = Builder::new(ValueMode::UInt64, 0).build().unwrap();
    assert!(table.is_empty(), "no entries");
    assert_eq!(table.bucket_count(), 1);
    assert_eq!(table.size(), 3);
    assert_eq!(table.iter().next(), None);
    for key in random_keys(1, 100) {
        assert_eq!(table.get(&key), None);
    }

    let reloaded: Table = Table::load_from_bytes(table.to_bytes(), false).unwrap();
    assert_eq!(reloaded, table);
    assert_eq!(reloaded.get(b""), None);
}

/// Compare two tables by their contents rather than by their bytes.
fn assert_same_contents(left: &Table<'_>, right: &Table<'_>) {
    assert_eq!(left.len(), right.len());
    assert_eq!(left.size(), right.size());
    assert_eq!(left.bucket_count(), right.bucket_count());
    assert_eq!(left.stores_keys(), right.stores_keys());
    assert_eq!(left.value_mode(), right.value_mode());
    assert!(left.seeds().eq(right.seeds()), "seeds differ");
    assert!(left.indices().eq(right.indices()), "indices differ");
    for slot in 0..left.size() {
        assert_eq!(left.key_at(slot), right.key_at(slot), "key at {slot}");
        assert_eq!(left.value_at(slot), right.value_at(slot), "value at {slot}");
    }
}

#[test]
fn serialization_roundtrip() {
    for count in [0, 1, 2, 1000] {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = random_keys(count as u64, count)
            .into_iter()
            .map(|key| {
                let value = key.iter().rev().copied().collect();
                (key, value)
            })
            .collect();
        let table = build_bytes(&entries);

        let mut bytes = Vec::new();
        table.write(&mut bytes).unwrap();
        assert_eq!(bytes, table.to_bytes());

        let borrowed: Table = Table::load_from_bytes(&bytes, false).unwrap();
        assert_same_contents(&table, &borrowed);
        borrowed.verify().unwrap();
        let owned: Table = Table::load_from_bytes(&bytes, true).unwrap();
        assert_same_contents(&table, &owned);
        let read: Table = Table::read_from(&bytes[..]).unwrap();
        assert_same_contents(&table, &read);

        for (key, value) in &entries {
            assert_eq!(borrowed.get_bytes(key), Some(&value[..]));
        }
    }
}

#[test]
fn swapped_pairs() {
    for i in 0..32u8 {
        for j in 0..32u8 {
            if i == j {
                continue;
            }
            let mut builder = Builder::new(ValueMode::Bytes, 2);
            builder.add([i, j], "a");
            builder.add([j, i], "b");
            let table = builder.build().unwrap();
            let mut bytes = Vec::new();
            table.write(&mut bytes).unwrap();
            assert_eq!(table.get_bytes(&[i, j]), Some(&b"a"[..]));
            assert_eq!(table.get_bytes(&[j, i]), Some(&b"b"[..]));
        }
    }
}

#[test]
fn reproducible() {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = random_keys(0xface, 500)
        .into_iter()
        .map(|key| (key, b"v".to_vec()))
        .collect();
    assert_eq!(build_bytes(&entries), build_bytes(&entries));

    // A different seed source lays the table out differently, with the same contents
    let mut builder = Builder::with_seed_source(ValueMode::Bytes, 500, RapidRng::new(99));
    for (key, value) in &entries {
        builder.add(key.clone(), value.clone());
    }
    let other: Table = builder.build().unwrap();
    assert_ne!(other.seeds().next(), build_bytes(&entries).seeds().next());
    for (key, value) in &entries {
        assert_eq!(other.get_bytes(key), Some(&value[..]));
    }
}

#[test]
fn concurrent_reads() {
    let keys = random_keys(0xcafe, 2000);
    let mut builder = Builder::new(ValueMode::UInt64, keys.len());
    for (i, key) in keys.iter().enumerate() {
        builder.add_uvarint64(key.clone(), i as u64);
    }
    let bytes = builder.build().unwrap().to_bytes().to_vec();
    let table: Table = Table::load_from_bytes(&bytes, false).unwrap();

    std::thread::scope(|scope| {
        for offset in 0..4 {
            let (table, keys) = (&table, &keys);
            scope.spawn(move || {
                for (i, key) in keys.iter().enumerate().skip(offset).step_by(4) {
                    assert_eq!(table.get_u64(key), Some(i as u64));
                }
            });
        }
    });
}

/// FNV-1a, to check that tables remember which hash built them.
struct Fnv;

impl StringHash for Fnv {
    const ID: u8 = 200;

    fn hash(key: &[u8]) -> u64 {
        key.iter().fold(0xcbf2_9ce4_8422_2325, |hash: u64, &byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
    }
}

#[test]
fn custom_hash() {
    let mut builder: Builder<Fnv> =
        Builder::with_seed_source(ValueMode::Bytes, NUMERALS.len(), RapidRng::new(5));
    for (key, value) in NUMERALS {
        builder.add(key, value);
    }
    let table = builder.build().unwrap();
    for (key, value) in NUMERALS {
        assert_eq!(table.get_bytes(key.as_bytes()), Some(value.as_bytes()));
    }

    let reloaded: Table<'_, Fnv> = Table::load_from_bytes(table.to_bytes(), false).unwrap();
    assert_eq!(reloaded.get_bytes(b"six"), Some(&b"6"[..]));

    assert!(matches!(
        <Table>::load_from_bytes(table.to_bytes(), false),
        Err(Error::HashMismatch {
            expected: 1,
            found: 200
        })
    ));
}

#[test]
fn rejects_foreign_blobs() {
    let mut builder = Builder::new(ValueMode::Bytes, NUMERALS.len());
    for (key, value) in NUMERALS {
        builder.add(key, value);
    }
    let bytes = builder.build().unwrap().to_bytes().to_vec();

    assert!(matches!(
        <Table>::load_from_bytes(b"not a table at all, just some text", false),
        Err(Error::BadMagic)
    ));

    let mut newer = bytes.clone();
    newer[4] = 9;
    assert!(matches!(
        <Table>::load_from_bytes(&newer, false),
        Err(Error::UnsupportedVersion(9))
    ));

    assert!(matches!(
        <Table>::load_from_bytes(&bytes[..bytes.len() - 1], false),
        Err(Error::Corrupt(_))
    ));
    assert!(matches!(
        <Table>::read_from(&bytes[..20]),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn without_keys() {
    let mut builder = Builder::new(ValueMode::Bytes, NUMERALS.len());
    builder.store_keys(false);
    for (key, value) in NUMERALS {
        builder.add(key, value);
    }
    let table = builder.build().unwrap();
    assert!(!table.stores_keys(), "keys were not requested");

    for (key, value) in NUMERALS {
        assert_eq!(table.get_bytes(key.as_bytes()), Some(value.as_bytes()));
    }
    assert!(table.iter().all(|(_, key, _)| key.is_none()), "no keys");

    let mut with_keys = Builder::new(ValueMode::Bytes, NUMERALS.len());
    for (key, value) in NUMERALS {
        with_keys.add(key, value);
    }
    assert!(
        table.to_bytes().len() < with_keys.build().unwrap().to_bytes().len(),
        "dropping keys shrinks the table"
    );
}

#[test]
fn owned_outlives_buffer() {
    let mut builder = Builder::new(ValueMode::UInt64, 3);
    builder.add_uvarint64("a", 1);
    builder.add_uvarint64("b", 300);
    builder.add_uvarint64("c", 1 << 40);
    let bytes = builder.build().unwrap().to_bytes().to_vec();

    let owned = {
        let borrowed: Table<'_> = Table::load_from_bytes(&bytes, false).unwrap();
        borrowed.into_owned()
    };
    drop(bytes);
    assert_eq!(owned.get_u64(b"b"), Some(300));
    assert_eq!(owned.get_u64(b"c"), Some(1 << 40));
}
