//! The little bit of RIFF the sample streamer needs: positioned chunk reads
//! and sub chunk lookup

use {crate::result::SampleError, std::fmt};

/// Four character chunk identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub [u8; 4]);

impl ChunkId {
    /// Outermost chunk of a RIFF file
    pub const RIFF: Self = Self(*b"RIFF");
    /// Form type of wave files
    pub const WAVE: Self = Self(*b"WAVE");
    /// Sample format
    pub const FMT: Self = Self(*b"fmt ");
    /// Sample data, raw PCM or compressed frames
    pub const DATA: Self = Self(*b"data");
    /// Gigasampler wave extension, only present for compressed samples
    pub const EWAV: Self = Self(*b"ewav");
    /// Sampler info, including loop points
    pub const SMPL: Self = Self(*b"smpl");
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '?'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId(\"{self}\")")
    }
}

/// Where a seek offset is relative to
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Whence {
    /// From the start of the chunk
    #[default]
    Start,
    /// Forward from the current position
    CurPos,
    /// Backward from the current position
    Backward,
    /// Backward from the last byte of the chunk
    End,
}

/// Seekable view of one chunk's body
pub trait ChunkStream {
    /// The chunk's identifier
    fn id(&self) -> ChunkId;
    /// Size of the chunk body in bytes
    fn size(&self) -> usize;
    /// Current read position
    fn pos(&self) -> usize;
    /// Moves the read position, clamped to the chunk body. Returns the new position.
    fn set_pos(&mut self, offset: usize, whence: Whence) -> usize;
    /// Reads as many bytes as are available, up to `buf.len()`. Returns the amount read.
    fn read(&mut self, buf: &mut [u8]) -> usize;
    /// Bytes left until the end of the chunk
    fn remaining(&self) -> usize {
        self.size().saturating_sub(self.pos())
    }
    /// Whether there is anything left to read
    fn is_ready(&self) -> bool {
        self.remaining() > 0
    }
}

/// A list chunk, giving access to its sub chunks
pub trait ChunkList {
    /// Stream type of the sub chunks
    type Chunk: ChunkStream;
    /// First sub chunk called `id`, positioned at its start
    fn sub_chunk(&self, id: ChunkId) -> Option<Self::Chunk>;
}

/// Chunk body living in memory
#[derive(Clone, Debug)]
pub struct MemChunk<'a> {
    id: ChunkId,
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemChunk<'a> {
    /// Creates a chunk positioned at its start
    #[must_use]
    pub const fn new(id: ChunkId, data: &'a [u8]) -> Self {
        Self { id, data, pos: 0 }
    }
    /// The whole chunk body
    #[must_use]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }
}

impl ChunkStream for MemChunk<'_> {
    fn id(&self) -> ChunkId {
        self.id
    }
    fn size(&self) -> usize {
        self.data.len()
    }
    fn pos(&self) -> usize {
        self.pos
    }
    fn set_pos(&mut self, offset: usize, whence: Whence) -> usize {
        let size = self.data.len();
        let pos = match whence {
            Whence::Start => offset,
            Whence::CurPos => self.pos.saturating_add(offset),
            Whence::Backward => self.pos.saturating_sub(offset),
            Whence::End => size.saturating_sub(1).saturating_sub(offset),
        };
        self.pos = pos.min(size);
        self.pos
    }
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let src = &self.data[self.pos..];
        let amount = src.len().min(buf.len());
        buf[..amount].copy_from_slice(&src[..amount]);
        self.pos += amount;
        amount
    }
}

/// List of chunks living in memory
#[derive(Clone, Debug, Default)]
pub struct MemList<'a> {
    chunks: Vec<(ChunkId, &'a [u8])>,
}

impl<'a> MemList<'a> {
    /// Creates an empty list
    #[must_use]
    pub const fn new() -> Self {
        Self { chunks: Vec::new() }
    }
    /// Appends a sub chunk
    pub fn push(&mut self, id: ChunkId, data: &'a [u8]) {
        self.chunks.push((id, data));
    }
    /// Parses a sequence of `id, u32 size, body, pad byte` chunks.
    ///
    /// A last chunk whose declared size runs past the end of `data` is cut
    /// short instead of rejected.
    #[must_use]
    pub fn parse(data: &'a [u8]) -> Self {
        let mut list = Self::new();
        let mut cur: usize = 0;
        while let Some(header) = cur.checked_add(8).and_then(|end| data.get(cur..end)) {
            let mut id = [0; 4];
            id.copy_from_slice(&header[..4]);
            let id = ChunkId(id);
            let size: u32 = bytemuck::pod_read_unaligned(&header[4..]);
            let size = u32::from_le(size) as usize;
            let start = cur + 8;
            let end = start.saturating_add(size);
            let body = if let Some(body) = data.get(start..end) {
                body
            } else {
                let left = data.len() - start;
                tracing::warn!("Chunk '{id}' claims {size} bytes, only {left} left");
                &data[start..]
            };
            list.push(id, body);
            // Chunk bodies are padded to even sizes
            cur = end.saturating_add(size & 1);
        }
        list
    }
    /// Parses a whole `RIFF` file of form type `form`
    pub fn from_riff(data: &'a [u8], form: ChunkId) -> Result<Self, SampleError> {
        match (data.get(..4), data.get(8..12)) {
            (Some(riff), Some(ty)) if riff == ChunkId::RIFF.0 && ty == form.0 => {
                Ok(Self::parse(&data[12..]))
            }
            _ => Err(SampleError::NotRiff(form)),
        }
    }
    /// Identifiers of all sub chunks, in file order
    pub fn ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.iter().map(|(id, _)| *id)
    }
}

impl<'a> ChunkList for MemList<'a> {
    type Chunk = MemChunk<'a>;
    fn sub_chunk(&self, id: ChunkId) -> Option<MemChunk<'a>> {
        self.chunks
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|&(id, data)| MemChunk::new(id, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeking_is_clamped() {
        let data = [0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut ck = MemChunk::new(ChunkId::DATA, &data);
        assert_eq!(ck.set_pos(4, Whence::Start), 4);
        assert_eq!(ck.set_pos(3, Whence::CurPos), 7);
        assert_eq!(ck.set_pos(2, Whence::Backward), 5);
        assert_eq!(ck.set_pos(0, Whence::End), 9);
        assert_eq!(ck.set_pos(99, Whence::CurPos), 10);
        assert!(!ck.is_ready());
        assert_eq!(ck.set_pos(99, Whence::Backward), 0);
        let mut buf = [0; 4];
        assert_eq!(ck.read(&mut buf), 4);
        assert_eq!(buf, [0, 1, 2, 3]);
        ck.set_pos(8, Whence::Start);
        assert_eq!(ck.remaining(), 2);
        assert_eq!(ck.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[8, 9]);
    }

    #[test]
    fn parse_chunks() {
        let mut riff = b"RIFF\0\0\0\0WAVE".to_vec();
        riff.extend_from_slice(b"fmt \x03\0\0\0abc\0");
        riff.extend_from_slice(b"data\x04\0\0\0wxyz");
        riff.extend_from_slice(b"smpl\x10\0\0\0ab");
        let list = MemList::from_riff(&riff, ChunkId::WAVE).unwrap();
        assert_eq!(
            list.ids().collect::<Vec<_>>(),
            [ChunkId::FMT, ChunkId::DATA, ChunkId::SMPL]
        );
        assert_eq!(list.sub_chunk(ChunkId::FMT).unwrap().data(), b"abc");
        assert_eq!(list.sub_chunk(ChunkId::DATA).unwrap().size(), 4);
        assert_eq!(list.sub_chunk(ChunkId::SMPL).unwrap().data(), b"ab");
        assert!(list.sub_chunk(ChunkId::EWAV).is_none());
        assert!(MemList::from_riff(b"RIFX\0\0\0\0WAVE", ChunkId::WAVE).is_err());
        assert_eq!(ChunkId::FMT.to_string(), "fmt ");
        assert_eq!(format!("{:?}", ChunkId(*b"a\0bc")), "ChunkId(\"a?bc\")");
    }
}
