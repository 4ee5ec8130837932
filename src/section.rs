//! Splitting a supout file into sections and unwrapping each one.
//!
//! A section is base64 text between BEGIN/END markers. Decoded and
//! descrambled it reads `name \0 zlib-stream`.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;

use error::SectionError;
use tribit;

pub const BEGIN_MARKER: &str = "--BEGIN ROUTEROS SUPOUT SECTION";
pub const END_MARKER: &str = "--END ROUTEROS SUPOUT SECTION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Size of the zlib stream as stored in the dump.
    pub compressed: usize,
    pub payload: Vec<u8>,
}

/// Returns the base64 body of every non-empty section, whitespace removed.
/// Padding characters are turned into `A` (zero bits) as the capture tool
/// pads inside the scrambled data.
pub fn split(text: &str) -> Vec<String> {
    text.replace(END_MARKER, "")
        .split(BEGIN_MARKER)
        .map(|s| s.split_whitespace().collect::<String>().replace('=', "A"))
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn decode(body: &str) -> Result<Section, SectionError> {
    let raw = tribit::decode(&STANDARD.decode(body)?);
    let nul = raw.iter().position(|&b| b == 0).ok_or(SectionError::MissingName)?;
    let (name, blob) = (&raw[..nul], &raw[nul + 1..]);
    if !name.is_ascii() {
        return Err(SectionError::BadName(String::from_utf8_lossy(name).into_owned()));
    }
    let name: String = name.iter().cloned().map(char::from).collect();

    let mut payload = Vec::new();
    ZlibDecoder::new(blob)
        .read_to_end(&mut payload)
        .map_err(SectionError::Inflate)?;
    info!("section {}: {} bytes compressed, {} raw", name, blob.len(), payload.len());
    Ok(Section {
        name,
        compressed: blob.len(),
        payload,
    })
}

/// File name for section number `index`: `NN_name` with anything outside
/// `[-._a-zA-Z0-9]` replaced by `#`.
pub fn output_name(index: usize, name: &str) -> String {
    let clean: String = name
        .chars()
        .map(|c| match c {
            '-' | '.' | '_' | 'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '#',
        })
        .collect();
    format!("{:02}_{}", index, clean)
}
