use super::*;

static ONE: [u8; 5] = [1, 2, 3, 4, 5];
static TWO: [u8; 9] = [6, 7, 8, 9, 10, 11, 12, 13, 14];
static THREE: [u8; 3] = [15, 16, 17];

static PARTS: [DescriptorPart; 3] = [
    DescriptorPart::sram(&ONE),
    DescriptorPart::sram(&TWO),
    DescriptorPart::sram(&THREE),
];

static TABLE: MultiPartTable = MultiPartTable::new(&PARTS);

#[test]
fn total_length_sums_parts() {
    assert_eq!(TABLE.count(), 3);
    assert_eq!(TABLE.total_length(), 17);
    assert_eq!(TABLE.part(1).length, 9);
}

#[test]
fn empty_table() {
    static NONE: [DescriptorPart; 0] = [];
    let t = MultiPartTable::new(&NONE);
    assert_eq!(t.count(), 0);
    assert_eq!(t.total_length(), 0);
}

#[test]
fn sram_source_reads_back() {
    let src = ByteSource::sram(&ONE);
    assert_eq!(src.memory(), Memory::Sram);
    // SAFETY: ONE has five valid bytes
    assert_eq!(unsafe { src.as_slice(5) }, &ONE);
}

#[test]
fn cursor_advance_and_offset() {
    let origin = ByteSource::sram(&TWO);
    let mut cursor = origin;
    cursor.advance(4);
    assert_eq!(cursor.offset_from(&origin), 4);
    // SAFETY: five bytes remain past offset 4
    assert_eq!(unsafe { cursor.as_slice(2) }, &[10, 11]);
}

#[test]
fn flash_source_is_tagged() {
    let src = ByteSource::flash(THREE.as_ptr());
    assert_eq!(src.memory(), Memory::Flash);
    assert_eq!(src.addr(), THREE.as_ptr());
}

#[test]
fn part_from_slice_takes_its_length() {
    let p = DescriptorPart::sram(&THREE);
    assert_eq!(p.length, 3);
    assert_eq!(p.data.addr(), THREE.as_ptr());
}
