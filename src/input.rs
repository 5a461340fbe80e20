// src/input.rs
// =============================================================================
// Reading the list of links a user wants downloaded.
//
// Links can come in two shapes, and both may be mixed:
// - comma separated: "http://a.test/1.jpg, http://a.test/2.jpg"
// - one per line (the usual format of a links.txt file)
//
// Files are read as UTF-8. Text editors on some systems still save Latin-1,
// so if the bytes aren't valid UTF-8 we decode them as Latin-1 instead of
// refusing the file.
// =============================================================================

use std::path::Path;

// Splits text into links on commas and line breaks, dropping blanks.
pub fn parse_links(text: &str) -> Vec<String> {
    text.split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .map(str::to_string)
        .collect()
}

// Reads a links file, see parse_links for the accepted format.
pub fn read_links_file(path: &Path) -> std::io::Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    Ok(parse_links(&decode_text(bytes)))
}

fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        // Every byte is a valid Latin-1 code point
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}
