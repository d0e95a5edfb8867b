//! Bounds-checked little-endian reads over byte buffers.

/// Forward cursor over a byte slice. Reads past the end return `None`.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
  data: &'a [u8],
  pos: usize,
}

impl<'a> ByteCursor<'a> {
  pub fn new(data: &'a [u8]) -> Self {
    Self { data, pos: 0 }
  }

  #[inline]
  pub fn position(&self) -> usize {
    self.pos
  }

  #[inline]
  pub fn remaining(&self) -> usize {
    self.data.len() - self.pos
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.remaining() == 0
  }

  pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
    let end = self.pos.checked_add(len)?;
    let bytes = self.data.get(self.pos..end)?;
    self.pos = end;
    Some(bytes)
  }

  pub fn read_u8(&mut self) -> Option<u8> {
    self.take(1).map(|b| b[0])
  }

  pub fn read_u16_le(&mut self) -> Option<u16> {
    self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
  }

  pub fn read_u32_le(&mut self) -> Option<u32> {
    self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
  }
}

/// Little-endian field reads at fixed offsets inside one record.
#[derive(Clone, Copy, Debug)]
pub struct RecordView<'a> {
  bytes: &'a [u8],
}

impl<'a> RecordView<'a> {
  pub fn new(bytes: &'a [u8]) -> Self {
    Self { bytes }
  }

  pub fn u8_at(&self, offset: usize) -> Option<u8> {
    self.bytes.get(offset).copied()
  }

  pub fn u16_at(&self, offset: usize) -> Option<u16> {
    let b = self.bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
  }

  pub fn u32_at(&self, offset: usize) -> Option<u32> {
    let b = self.bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
  }

  pub fn array4_at(&self, offset: usize) -> Option<[u8; 4]> {
    let b = self.bytes.get(offset..offset.checked_add(4)?)?;
    Some([b[0], b[1], b[2], b[3]])
  }
}
