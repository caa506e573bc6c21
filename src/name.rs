//! Key and value names as stored on disk.
//!
//! Names carry an explicit byte length and one of two encodings: the
//! compressed form (single-byte, in the hive's ASCII code page) or UTF-16LE.
//! The raw bytes are kept as stored; conversion happens on demand.

use crate::error::{RegistryError, Result};
use crate::options::Codepage;
use crate::utils::fill_buffer;
use encoding_rs::UTF_16LE;

/// Encoding of a stored name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameEncoding {
    /// Compressed single-byte name, decoded with the hive's code page.
    Ascii,
    /// UTF-16 little-endian name.
    Utf16Le,
}

impl NameEncoding {
    fn label(&self) -> &'static str {
        match self {
            NameEncoding::Ascii => "ASCII",
            NameEncoding::Utf16Le => "UTF-16LE",
        }
    }
}

/// A name exactly as stored in a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedName {
    bytes: Vec<u8>,
    encoding: NameEncoding,
}

impl EncodedName {
    /// Wraps stored name bytes.
    pub fn new(bytes: Vec<u8>, encoding: NameEncoding) -> Self {
        Self { bytes, encoding }
    }

    /// Returns an empty name.
    pub fn empty() -> Self {
        Self::new(Vec::new(), NameEncoding::Utf16Le)
    }

    /// Raw stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Stored encoding.
    pub fn encoding(&self) -> NameEncoding {
        self.encoding
    }

    /// Returns true if the name has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decodes the name to a `String`.
    ///
    /// With `strict` set, undecodable bytes fail with `RegistryError::Encoding`
    /// (reported at `offset`); otherwise they become U+FFFD.
    pub fn decode(&self, codepage: Codepage, strict: bool, offset: u32) -> Result<String> {
        let encoding = match self.encoding {
            NameEncoding::Ascii => codepage.encoding(),
            NameEncoding::Utf16Le => UTF_16LE,
        };

        if strict {
            encoding
                .decode_without_bom_handling_and_without_replacement(&self.bytes)
                .map(|decoded| decoded.into_owned())
                .ok_or(RegistryError::Encoding {
                    offset,
                    encoding: self.encoding.label(),
                })
        } else {
            let (decoded, _had_errors) = encoding.decode_without_bom_handling(&self.bytes);
            Ok(decoded.into_owned())
        }
    }

    /// Decodes the name to UTF-16 code units.
    pub fn to_utf16(&self, codepage: Codepage, strict: bool, offset: u32) -> Result<Vec<u16>> {
        Ok(self.decode(codepage, strict, offset)?.encode_utf16().collect())
    }

    /// Code units of the name without validation, used for comparisons.
    fn units(&self, codepage: Codepage) -> Vec<u16> {
        match self.encoding {
            NameEncoding::Utf16Le => self
                .bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
            NameEncoding::Ascii => {
                let (decoded, _) = codepage
                    .encoding()
                    .decode_without_bom_handling(&self.bytes);
                decoded.encode_utf16().collect()
            }
        }
    }

    /// Exact comparison against a UTF-8 query.
    ///
    /// The query is re-encoded into the stored encoding and compared byte
    /// for byte. A query that cannot be represented never matches.
    pub fn matches_exact(&self, query: &str, codepage: Codepage) -> bool {
        match self.encoding {
            NameEncoding::Ascii => {
                let (encoded, _, had_errors) = codepage.encoding().encode(query);
                !had_errors && encoded.as_ref() == self.bytes.as_slice()
            }
            NameEncoding::Utf16Le => {
                self.bytes.len() == query.encode_utf16().count() * 2
                    && query
                        .encode_utf16()
                        .flat_map(u16::to_le_bytes)
                        .eq(self.bytes.iter().copied())
            }
        }
    }

    /// Exact comparison against a UTF-16 query.
    pub fn matches_exact_utf16(&self, query: &[u16], codepage: Codepage) -> bool {
        match self.encoding {
            NameEncoding::Utf16Le => {
                self.bytes.len() == query.len() * 2
                    && query
                        .iter()
                        .flat_map(|unit| unit.to_le_bytes())
                        .eq(self.bytes.iter().copied())
            }
            NameEncoding::Ascii => match String::from_utf16(query) {
                Ok(query) => self.matches_exact(&query, codepage),
                Err(_) => false,
            },
        }
    }

    /// Case-insensitive comparison against UTF-16 code units.
    ///
    /// Both sides are folded unit by unit with [`fold_utf16`].
    pub fn matches_ignore_case(&self, query: &[u16], codepage: Codepage) -> bool {
        let units = self.units(codepage);
        units.len() == query.len()
            && units
                .iter()
                .zip(query)
                .all(|(&stored, &wanted)| fold_utf16(stored) == fold_utf16(wanted))
    }
}

/// A stored name bound to the decoding options of its hive.
///
/// Provides the size-then-fill accessors in three representations: the raw
/// stored bytes, UTF-8, and UTF-16. Sizes count elements of the
/// representation and exclude any terminator.
#[derive(Debug, Clone)]
pub struct RegString {
    name: EncodedName,
    codepage: Codepage,
    strict: bool,
    offset: u32,
}

impl RegString {
    /// Binds a stored name read from the record at `offset`.
    pub fn new(name: EncodedName, codepage: Codepage, strict: bool, offset: u32) -> Self {
        Self {
            name,
            codepage,
            strict,
            offset,
        }
    }

    /// Size of the raw stored bytes.
    pub fn raw_size(&self) -> usize {
        self.name.as_bytes().len()
    }

    /// Copies the raw stored bytes into `buffer`.
    pub fn copy_raw(&self, buffer: &mut [u8]) -> Result<usize> {
        fill_buffer(self.name.as_bytes(), buffer)
    }

    /// Decodes to UTF-8.
    pub fn to_utf8(&self) -> Result<String> {
        self.name.decode(self.codepage, self.strict, self.offset)
    }

    /// Size of the UTF-8 form in bytes.
    pub fn utf8_size(&self) -> Result<usize> {
        Ok(self.to_utf8()?.len())
    }

    /// Copies the UTF-8 form into `buffer`.
    pub fn copy_utf8(&self, buffer: &mut [u8]) -> Result<usize> {
        fill_buffer(self.to_utf8()?.as_bytes(), buffer)
    }

    /// Decodes to UTF-16 code units.
    pub fn to_utf16(&self) -> Result<Vec<u16>> {
        self.name.to_utf16(self.codepage, self.strict, self.offset)
    }

    /// Size of the UTF-16 form in code units.
    pub fn utf16_size(&self) -> Result<usize> {
        Ok(self.to_utf16()?.len())
    }

    /// Copies the UTF-16 form into `buffer`.
    pub fn copy_utf16(&self, buffer: &mut [u16]) -> Result<usize> {
        fill_buffer(&self.to_utf16()?, buffer)
    }
}

/// Simple uppercase mapping of one UTF-16 code unit.
///
/// ASCII letters are folded directly; other units use the Unicode simple
/// uppercase mapping when it yields exactly one BMP character. Surrogates
/// and units with multi-character mappings are returned unchanged.
pub fn fold_utf16(unit: u16) -> u16 {
    if unit < 0x80 {
        return u16::from((unit as u8).to_ascii_uppercase());
    }

    match char::from_u32(u32::from(unit)) {
        Some(c) => {
            let mut upper = c.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) if u32::from(u) <= 0xFFFF => u32::from(u) as u16,
                _ => unit,
            }
        }
        None => unit,
    }
}
