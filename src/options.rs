//! Options controlling how a hive is opened and how names are decoded.

use encoding_rs::Encoding;

/// Code page used for names stored in the compressed (ASCII) form.
///
/// Compressed names are single-byte strings in the code page of the system
/// that wrote the hive. Windows-1252 is the usual choice for western hives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codepage {
    number: u32,
    encoding: &'static Encoding,
}

impl Codepage {
    /// Windows-1252 (western European), the default.
    pub const WINDOWS_1252: Codepage = Codepage {
        number: 1252,
        encoding: encoding_rs::WINDOWS_1252,
    };

    /// Maps a Windows code page number to a decoder.
    ///
    /// Returns `None` for code pages that have no single- or multi-byte
    /// decoder available.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use regf_nav::Codepage;
    /// assert_eq!(Codepage::from_number(1251).unwrap().number(), 1251);
    /// assert!(Codepage::from_number(12345).is_none());
    /// ```
    pub fn from_number(number: u32) -> Option<Self> {
        let encoding = match number {
            874 => encoding_rs::WINDOWS_874,
            932 => encoding_rs::SHIFT_JIS,
            936 => encoding_rs::GBK,
            949 => encoding_rs::EUC_KR,
            950 => encoding_rs::BIG5,
            1250 => encoding_rs::WINDOWS_1250,
            1251 => encoding_rs::WINDOWS_1251,
            // 20127 (US-ASCII) is a subset of 1252 and decodes identically.
            1252 | 20127 => encoding_rs::WINDOWS_1252,
            1253 => encoding_rs::WINDOWS_1253,
            1254 => encoding_rs::WINDOWS_1254,
            1255 => encoding_rs::WINDOWS_1255,
            1256 => encoding_rs::WINDOWS_1256,
            1257 => encoding_rs::WINDOWS_1257,
            1258 => encoding_rs::WINDOWS_1258,
            28591 => encoding_rs::WINDOWS_1252,
            28592 => encoding_rs::ISO_8859_2,
            28593 => encoding_rs::ISO_8859_3,
            28594 => encoding_rs::ISO_8859_4,
            28595 => encoding_rs::ISO_8859_5,
            28596 => encoding_rs::ISO_8859_6,
            28597 => encoding_rs::ISO_8859_7,
            28598 => encoding_rs::ISO_8859_8,
            28599 => encoding_rs::WINDOWS_1254,
            28603 => encoding_rs::ISO_8859_13,
            28605 => encoding_rs::ISO_8859_15,
            65001 => encoding_rs::UTF_8,
            _ => return None,
        };
        Some(Self { number, encoding })
    }

    /// Windows code page number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Underlying `encoding_rs` encoding.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

impl Default for Codepage {
    fn default() -> Self {
        Self::WINDOWS_1252
    }
}

/// Options applied to every handle derived from one opened hive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiveOptions {
    /// Code page for compressed names.
    pub ascii_codepage: Codepage,

    /// Fail with `Encoding` errors instead of substituting U+FFFD.
    pub strict_encoding: bool,

    /// Reject hives whose base block checksum does not match.
    pub verify_checksum: bool,
}

impl Default for HiveOptions {
    fn default() -> Self {
        Self {
            ascii_codepage: Codepage::default(),
            strict_encoding: false,
            verify_checksum: true,
        }
    }
}

impl HiveOptions {
    /// Sets the code page used for compressed names.
    pub fn with_ascii_codepage(mut self, codepage: Codepage) -> Self {
        self.ascii_codepage = codepage;
        self
    }

    /// Enables or disables strict name decoding.
    pub fn with_strict_encoding(mut self, strict: bool) -> Self {
        self.strict_encoding = strict;
        self
    }

    /// Enables or disables base block checksum verification.
    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }
}
