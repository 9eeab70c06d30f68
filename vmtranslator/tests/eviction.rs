//! Cold-read/write round trips, range checks, and forced eviction, end
//! to end against a real `Translator`.

use vmtranslator::{Error, Translator, NUM_FRAMES, VIRTUAL_MEMORY_SIZE};

#[test]
fn cold_read_then_write_then_read() {
    let mut t = Translator::new();
    assert_eq!(t.read(0x12).unwrap(), 0);
    t.write(0x12, 42).unwrap();
    assert_eq!(t.read(0x12).unwrap(), 42);
}

#[test]
fn out_of_range_address_fails_cleanly() {
    let mut t = Translator::new();
    assert_eq!(
        t.write(VIRTUAL_MEMORY_SIZE, 1).unwrap_err(),
        Error::AddressOutOfRange(VIRTUAL_MEMORY_SIZE)
    );
}

/// Accessing more distinct pages than `NUM_FRAMES` forces at least one
/// eviction. Every page must still read back its own value afterwards:
/// eviction writes the old page out and `restore` brings it back in
/// exactly when it's next walked to.
#[test]
fn writes_survive_forced_eviction() {
    let _ = env_logger::try_init();
    let mut t = Translator::new();

    // Four virtual addresses in distinct root-table slots; walking to each
    // one allocates a fresh middle-table frame and a fresh data frame, so
    // the fourth access needs more frames than `NUM_FRAMES` provides.
    let addresses: Vec<u64> = (0..4).map(|root: u64| root << 6).collect();
    assert!(addresses.len() as u64 > NUM_FRAMES / 2);

    for (i, &va) in addresses.iter().enumerate() {
        t.write(va, 100 + i as i64).unwrap();
    }
    for (i, &va) in addresses.iter().enumerate() {
        assert_eq!(t.read(va).unwrap(), 100 + i as i64, "page at {va:#x} lost its value");
    }
}

#[test]
fn distinct_offsets_within_one_page_are_independent() {
    let mut t = Translator::new();
    t.write(0x10, 1).unwrap();
    t.write(0x11, 2).unwrap();
    t.write(0x12, 3).unwrap();
    assert_eq!(t.read(0x10).unwrap(), 1);
    assert_eq!(t.read(0x11).unwrap(), 2);
    assert_eq!(t.read(0x12).unwrap(), 3);
}
