use {
    crate::result::DecodeError,
    std::{fmt::Display, str::FromStr},
};

/// Cursor over the content of one length prefixed blob.
///
/// Blobs are encoded as `<decimal length>:<raw bytes>` and nest freely.
/// A reader never looks past the end of the blob it was created for.
pub struct Reader<'a> {
    pub data: &'a [u8],
    pub cur: usize,
}

impl<'a> Reader<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, cur: 0 }
    }
    /// Whether any byte of this blob is still unconsumed
    pub const fn has_remaining(&self) -> bool {
        self.cur < self.data.len()
    }
    /// Pops the next blob and returns a reader over its content
    pub fn blob(&mut self) -> Result<Self, DecodeError> {
        let mut size: usize = 0;
        loop {
            let Some(&c) = self.data.get(self.cur) else {
                return Err(DecodeError::MissingBlob);
            };
            self.cur += 1;
            if c == b':' {
                break;
            }
            if !c.is_ascii_digit() {
                return Err(DecodeError::MissingBlobSize);
            }
            size = size
                .checked_mul(10)
                .and_then(|s| s.checked_add(usize::from(c - b'0')))
                .ok_or(DecodeError::LengthOverflow)?;
        }
        let end = self.cur.checked_add(size).ok_or(DecodeError::LengthOverflow)?;
        let content = self
            .data
            .get(self.cur..end)
            .ok_or(DecodeError::PrematureEnd)?;
        self.cur = end;
        Ok(Reader::new(content))
    }
    /// Like [`Self::blob`], but yields an empty blob if this blob is already used up
    pub fn opt_blob(&mut self) -> Result<Self, DecodeError> {
        if self.has_remaining() {
            self.blob()
        } else {
            Ok(Reader::new(&[]))
        }
    }
    pub fn bytes_blob(&mut self) -> Result<&'a [u8], DecodeError> {
        Ok(self.blob()?.data)
    }
    pub fn string_blob(&mut self) -> Result<String, DecodeError> {
        Ok(lossy_string(self.bytes_blob()?))
    }
    pub fn num_blob<T: FromStr>(&mut self) -> Result<T, DecodeError> {
        parse_num(self.bytes_blob()?)
    }
    /// Numeric blob that may be absent at the end of this blob
    pub fn opt_num_blob<T: FromStr + Default>(&mut self) -> Result<T, DecodeError> {
        let blob = self.opt_blob()?;
        if blob.data.is_empty() {
            Ok(T::default())
        } else {
            parse_num(blob.data)
        }
    }
    pub fn opt_string_blob(&mut self) -> Result<String, DecodeError> {
        Ok(lossy_string(self.opt_blob()?.data))
    }
    pub fn bool_blob(&mut self) -> Result<bool, DecodeError> {
        match self.bytes_blob()? {
            b"0" => Ok(false),
            b"1" => Ok(true),
            _ => Err(DecodeError::InvalidBool),
        }
    }
}

pub fn parse_num<T: FromStr>(bytes: &[u8]) -> Result<T, DecodeError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(DecodeError::InvalidNumber)
}

pub fn lossy_string(bytes: &[u8]) -> String {
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Decoded string is not valid UTF-8, replacing invalid sequences");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

pub fn write_blob(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(data);
}

pub fn write_num_blob(out: &mut Vec<u8>, num: impl Display) {
    write_blob(out, num.to_string().as_bytes());
}

pub fn write_bool_blob(out: &mut Vec<u8>, b: bool) {
    write_blob(out, if b { b"1" } else { b"0" });
}

/// Writes whatever `f` produces as one blob
pub fn write_nested_blob(out: &mut Vec<u8>, f: impl FnOnce(&mut Vec<u8>)) {
    let mut inner = Vec::new();
    f(&mut inner);
    write_blob(out, &inner);
}

#[test]
fn test_nested_blobs() {
    let mut out = Vec::new();
    write_nested_blob(&mut out, |out| {
        write_num_blob(out, -42);
        write_blob(out, b"a:b\0c");
        write_bool_blob(out, true);
    });
    assert_eq!(out, b"15:3:-425:a:b\0c1:1");
    let mut rd = Reader::new(&out);
    let mut inner = rd.blob().unwrap();
    assert!(!rd.has_remaining());
    assert_eq!(inner.num_blob::<i64>().unwrap(), -42);
    assert_eq!(inner.bytes_blob().unwrap(), b"a:b\0c");
    assert!(inner.bool_blob().unwrap());
    assert!(!inner.has_remaining());
    assert_eq!(inner.opt_blob().unwrap().data, b"");
}

#[test]
fn test_blob_errors() {
    assert_eq!(Reader::new(b"").blob().err(), Some(DecodeError::MissingBlob));
    assert_eq!(Reader::new(b"12").blob().err(), Some(DecodeError::MissingBlob));
    assert_eq!(
        Reader::new(b"1x:a").blob().err(),
        Some(DecodeError::MissingBlobSize)
    );
    assert_eq!(
        Reader::new(b"9:abc").blob().err(),
        Some(DecodeError::PrematureEnd)
    );
    assert_eq!(
        Reader::new(b"99999999999999999999999:a").blob().err(),
        Some(DecodeError::LengthOverflow)
    );
}
