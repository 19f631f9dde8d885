use crate::midi::error::FormatError;

/// Longest legal variable-length quantity, in bytes.
const MAX_VARINT_BYTES: usize = 4;

/// A bounded cursor over a byte slice.
///
/// Each track chunk is decoded through a sub-reader covering exactly the
/// chunk's declared byte range, so a read past the end of a track fails
/// instead of bleeding into the next chunk. Offsets reported in errors
/// are absolute positions in the file image.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Absolute file offset of `bytes[0]`.
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute offset of the next unread byte.
    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn truncated(&self) -> FormatError {
        FormatError::Malformed {
            offset: self.offset(),
            reason: "unexpected end of data",
        }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, FormatError> {
        match self.bytes.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(self.truncated()),
        }
    }

    /// Look at the next byte without consuming it.
    pub(crate) fn peek_u8(&self) -> Result<u8, FormatError> {
        self.bytes.get(self.pos).copied().ok_or_else(|| self.truncated())
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let end = match self.pos.checked_add(len) {
            Some(end) if end <= self.bytes.len() => end,
            _ => return Err(self.truncated()),
        };
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), FormatError> {
        self.read_bytes(len).map(|_| ())
    }

    pub(crate) fn read_u16_be(&mut self) -> Result<u16, FormatError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32_be(&mut self) -> Result<u32, FormatError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 4-byte chunk tag and compare it against the expected one.
    pub(crate) fn expect_tag(&mut self, expected: &[u8; 4]) -> Result<(), FormatError> {
        let bytes = self.read_bytes(4)?;
        if bytes != &expected[..] {
            return Err(FormatError::BadChunkTag {
                expected: *expected,
                found: [bytes[0], bytes[1], bytes[2], bytes[3]],
            });
        }
        Ok(())
    }

    /// Decode a variable-length quantity.
    ///
    /// The low 7 bits of each byte accumulate most-significant-first and
    /// the high bit marks continuation. The format never needs more than
    /// 4 bytes, so a 5th continuation byte is treated as corruption.
    pub(crate) fn read_varint(&mut self) -> Result<u32, FormatError> {
        let start = self.offset();
        let mut value = 0u32;
        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(FormatError::Malformed {
            offset: start,
            reason: "variable-length quantity longer than 4 bytes",
        })
    }

    /// Split off the next `len` bytes as their own bounded reader.
    pub(crate) fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>, FormatError> {
        let base = self.offset();
        let bytes = self.read_bytes(len)?;
        Ok(ByteReader { bytes, pos: 0, base })
    }
}
