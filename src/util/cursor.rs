use crate::error::{Result, StreamError};

/// A read cursor over a byte slice that advances as it is consumed and
/// fails rather than panicking on a short read. Specialized for the
/// schema blob and frame message layouts, which are fixed-layout rather
/// than self-delimiting.
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(StreamError::SchemaDecode(format!(
                "expected {} more bytes, only {} remain",
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_native(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads 8 bytes and reverses them if `big_endian` doesn't match the
    /// host's native order, per the explicit per-byte swap in `wire::endian`.
    pub fn read_i64_netbytes(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(crate::wire::endian::i64_from_net_bytes(arr))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn read_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StreamError::SchemaDecode(format!("invalid utf8 in name: {e}")))
    }

    /// Reads a `u32 length`-prefixed name, network byte order length field.
    pub fn read_prefixed_name_net(&mut self) -> Result<String> {
        let len = self.read_u32_be()? as usize;
        self.read_string(len)
    }
}

/// An append-only write cursor building up one of the crate's fixed
/// binary layouts, instead of repeating `extend_from_slice` call chains
/// at each call site.
#[derive(Debug, Default)]
pub struct WriteCursor {
    buf: Vec<u8>,
}

impl WriteCursor {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn write_u32_be(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_u32_native(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_ne_bytes());
        self
    }

    pub fn write_i64_netbytes(&mut self, v: i64) -> &mut Self {
        self.buf
            .extend_from_slice(&crate::wire::endian::i64_to_net_bytes(v));
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Writes a `u32` network-byte-order length prefix followed by `name`.
    pub fn write_prefixed_name_net(&mut self, name: &str) -> &mut Self {
        self.write_u32_be(name.len() as u32);
        self.write_bytes(name.as_bytes());
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
