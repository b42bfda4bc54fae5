//! Shared helpers for the integration tests.
//!
//! `city_database` writes a minimal GeoIP2 City style MMDB file by hand: a
//! one node search tree where every address in 0.0.0.0/1 resolves to a
//! single Mountain View record and everything in 128.0.0.0/1 is unknown.

#![allow(dead_code)]

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

const NODE_COUNT: u32 = 1;
const DATA_SECTION_SEPARATOR: [u8; 16] = [0; 16];
const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Address covered by the test database.
pub const KNOWN_ADDRESS: &str = "8.8.8.8";
/// Address outside the test database.
pub const UNKNOWN_ADDRESS: &str = "200.1.1.1";

fn string(out: &mut Vec<u8>, s: &str) {
    assert!(s.len() < 29);
    out.push(0x40 | s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

fn map_header(out: &mut Vec<u8>, pairs: u8) {
    assert!(pairs < 29);
    out.push(0xE0 | pairs);
}

fn double(out: &mut Vec<u8>, value: f64) {
    out.push(0x68);
    out.extend_from_slice(&value.to_be_bytes());
}

fn uint16(out: &mut Vec<u8>, value: u16) {
    out.push(0xA2);
    out.extend_from_slice(&value.to_be_bytes());
}

fn uint32(out: &mut Vec<u8>, value: u32) {
    out.push(0xC4);
    out.extend_from_slice(&value.to_be_bytes());
}

fn uint64(out: &mut Vec<u8>, value: u64) {
    // Extended type 9: size byte, then type - 7.
    out.push(0x08);
    out.push(0x02);
    out.extend_from_slice(&value.to_be_bytes());
}

fn array_header(out: &mut Vec<u8>, len: u8) {
    // Extended type 11.
    out.push(len);
    out.push(0x04);
}

fn names(out: &mut Vec<u8>, english: &str) {
    map_header(out, 1);
    string(out, "names");
    map_header(out, 1);
    string(out, "en");
    string(out, english);
}

fn city_record() -> Vec<u8> {
    let mut out = Vec::new();
    map_header(&mut out, 4);
    string(&mut out, "city");
    names(&mut out, "Mountain View");
    string(&mut out, "continent");
    names(&mut out, "North America");
    string(&mut out, "country");
    names(&mut out, "United States");
    string(&mut out, "location");
    map_header(&mut out, 2);
    string(&mut out, "latitude");
    double(&mut out, 37.4192);
    string(&mut out, "longitude");
    double(&mut out, -122.0574);
    out
}

fn metadata() -> Vec<u8> {
    let mut out = Vec::new();
    map_header(&mut out, 9);
    string(&mut out, "binary_format_major_version");
    uint16(&mut out, 2);
    string(&mut out, "binary_format_minor_version");
    uint16(&mut out, 0);
    string(&mut out, "build_epoch");
    uint64(&mut out, 1_700_000_000);
    string(&mut out, "database_type");
    string(&mut out, "GeoLite2-City");
    string(&mut out, "description");
    map_header(&mut out, 0);
    string(&mut out, "ip_version");
    uint16(&mut out, 4);
    string(&mut out, "languages");
    array_header(&mut out, 1);
    string(&mut out, "en");
    string(&mut out, "node_count");
    uint32(&mut out, NODE_COUNT);
    string(&mut out, "record_size");
    uint16(&mut out, 24);
    out
}

fn record24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes()[1..]);
}

/// Bytes of the test database.
pub fn city_database() -> Vec<u8> {
    let mut out = Vec::new();
    // Left branch points at data offset 0, right branch means "no data".
    record24(&mut out, NODE_COUNT + 16);
    record24(&mut out, NODE_COUNT);
    out.extend_from_slice(&DATA_SECTION_SEPARATOR);
    out.extend_from_slice(&city_record());
    out.extend_from_slice(METADATA_MARKER);
    out.extend_from_slice(&metadata());
    out
}

/// The test database as a download would serve it.
pub fn gzipped_city_database() -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&city_database()).unwrap();
    encoder.finish().unwrap()
}
