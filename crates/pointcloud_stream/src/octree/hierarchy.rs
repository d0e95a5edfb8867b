//! Hierarchy page decoding.
//!
//! A page is a flat run of 5-byte records in breadth-first order:
//!
//! ```text
//!   [mask: u8][point_count: u32 le]  [mask][count]  ...
//!    page root                        first present child of root ...
//! ```
//!
//! Decoding runs on a worker. It yields a [`PageLayout`] that the coordinator
//! turns into nodes with `Octree::install_page`.

use std::collections::VecDeque;

use super::mask::OctantMask;
use crate::constants::HIERARCHY_RECORD_SIZE;
use crate::error::PageError;
use crate::reader::ByteCursor;

/// One decoded record with the page-local name of its node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageEntry {
  /// Octant digits below the page root ("" for the root itself).
  pub local_name: String,
  pub mask: OctantMask,
  /// Zero until resolved from the point file size.
  pub point_count: i64,
}

/// Decoded page in breadth-first order. `entries[0]` is the page root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageLayout {
  pub entries: Vec<PageEntry>,
}

impl PageLayout {
  /// Decodes records until the page's depth span is exhausted.
  ///
  /// Children of nodes whose local name is `step_size - 1` digits long
  /// start the next page and have no record here.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "page::decode"))]
  pub fn decode(bytes: &[u8], step_size: u32, path: &str) -> Result<Self, PageError> {
    if bytes.is_empty() {
      return Err(PageError::Empty { path: path.to_string() });
    }
    if bytes.len() % HIERARCHY_RECORD_SIZE != 0 {
      return Err(PageError::Misaligned {
        path: path.to_string(),
        len: bytes.len(),
      });
    }

    let boundary = step_size.saturating_sub(1) as usize;
    let mut cursor = ByteCursor::new(bytes);
    let mut pending: VecDeque<String> = VecDeque::from([String::new()]);
    let mut entries = Vec::with_capacity(bytes.len() / HIERARCHY_RECORD_SIZE);

    while let Some(local_name) = pending.pop_front() {
      let (Some(mask), Some(count)) = (cursor.read_u8(), cursor.read_u32_le()) else {
        return Err(PageError::Truncated {
          path: path.to_string(),
          records: entries.len(),
        });
      };
      let mask = OctantMask(mask);
      if local_name.len() < boundary {
        for octant in mask.iter() {
          pending.push_back(format!("{local_name}{octant}"));
        }
      }
      entries.push(PageEntry {
        local_name,
        mask,
        point_count: count as i64,
      });
    }

    if !cursor.is_empty() {
      log::debug!(
        "page {path}: ignoring {} trailing records",
        cursor.remaining() / HIERARCHY_RECORD_SIZE
      );
    }
    Ok(Self { entries })
  }

  /// Replaces zero counts with `file_len(local_name) / stride`.
  pub fn resolve_unknown_counts(
    &mut self,
    stride: usize,
    mut file_len: impl FnMut(&str) -> Result<u64, PageError>,
  ) -> Result<(), PageError> {
    for entry in self.entries.iter_mut().filter(|e| e.point_count == 0) {
      let len = file_len(&entry.local_name)?;
      entry.point_count = (len / stride.max(1) as u64) as i64;
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Encodes a layout back to page bytes. Used to build fixture trees.
pub fn encode_page(entries: &[(u8, u32)]) -> Vec<u8> {
  let mut out = Vec::with_capacity(entries.len() * HIERARCHY_RECORD_SIZE);
  for &(mask, count) in entries {
    out.push(mask);
    out.extend_from_slice(&count.to_le_bytes());
  }
  out
}
