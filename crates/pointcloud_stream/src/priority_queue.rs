//! Indexed binary heap with stable, generation-checked handles.
//!
//! The heap stores slot indices; each slot stores the item, its priority and
//! the slot's current heap position. A handle names a slot, so it keeps
//! resolving to the right heap position however often the heap reorders.
//!
//! ```text
//!   heap:  [ 3 | 0 | 5 | 1 ]        (slot indices, heap order)
//!   slots: 0:{B, p, at 1}  1:{D, p, at 3}  2:<free gen 4>  3:{A, p, at 0} ...
//! ```
//!
//! Freed slots go on a free list and are reused. Every reuse bumps the slot's
//! generation so an old handle can never address the new occupant.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

/// Opaque reference to an enqueued item.
///
/// Valid from `enqueue` until the item leaves the queue (by `remove`,
/// `dequeue` or `clear`). Handles are `Copy`; copies go stale together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueHandle {
  slot: u32,
  generation: u32,
  queue: u32,
}

fn next_queue_id() -> u32 {
  static COUNTER: AtomicU32 = AtomicU32::new(0);
  COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

struct Slot<T, P> {
  entry: Option<(T, P)>,
  heap_index: usize,
  generation: u32,
}

/// Comparator: `Greater` means the left priority belongs nearer the top.
pub type Comparator<P> = fn(&P, &P) -> Ordering;

fn ascending<P: PartialOrd>(a: &P, b: &P) -> Ordering {
  a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

fn descending<P: PartialOrd>(a: &P, b: &P) -> Ordering {
  b.partial_cmp(a).unwrap_or(Ordering::Equal)
}

/// Array-backed binary heap addressed by [`QueueHandle`]s.
///
/// All mutating operations are O(log n); `len` is O(1).
pub struct IndexedPriorityQueue<T, P> {
  id: u32,
  slots: Vec<Slot<T, P>>,
  heap: Vec<u32>,
  free: Vec<u32>,
  compare: Comparator<P>,
}

impl<T, P: PartialOrd> IndexedPriorityQueue<T, P> {
  /// Queue whose top is the highest priority.
  pub fn new_max() -> Self {
    Self::with_comparator(ascending::<P>)
  }

  /// Queue whose top is the lowest priority.
  pub fn new_min() -> Self {
    Self::with_comparator(descending::<P>)
  }
}

impl<T, P> IndexedPriorityQueue<T, P> {
  pub fn with_comparator(compare: Comparator<P>) -> Self {
    Self {
      id: next_queue_id(),
      slots: Vec::new(),
      heap: Vec::new(),
      free: Vec::new(),
      compare,
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.heap.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.heap.is_empty()
  }

  /// True if `handle` was issued by this queue and its item is still queued.
  pub fn contains(&self, handle: QueueHandle) -> bool {
    handle.queue == self.id
      && self
        .slots
        .get(handle.slot as usize)
        .is_some_and(|slot| slot.generation == handle.generation && slot.entry.is_some())
  }

  pub fn enqueue(&mut self, item: T, priority: P) -> QueueHandle {
    let heap_index = self.heap.len();
    let slot_index = match self.free.pop() {
      Some(index) => {
        let slot = &mut self.slots[index as usize];
        slot.entry = Some((item, priority));
        slot.heap_index = heap_index;
        index
      }
      None => {
        self.slots.push(Slot {
          entry: Some((item, priority)),
          heap_index,
          generation: 0,
        });
        (self.slots.len() - 1) as u32
      }
    };
    self.heap.push(slot_index);
    self.sift_up(heap_index);

    QueueHandle {
      slot: slot_index,
      generation: self.slots[slot_index as usize].generation,
      queue: self.id,
    }
  }

  pub fn peek(&self) -> Option<&T> {
    self.heap.first().map(|&slot| &self.entry(slot).0)
  }

  pub fn peek_priority(&self) -> Option<&P> {
    self.heap.first().map(|&slot| &self.entry(slot).1)
  }

  /// Item and priority at the top, with the handle that addresses it.
  pub fn peek_entry(&self) -> Option<(QueueHandle, &T, &P)> {
    let &slot = self.heap.first()?;
    let (item, priority) = self.entry(slot);
    Some((self.handle_for(slot), item, priority))
  }

  pub fn dequeue(&mut self) -> Option<(T, P)> {
    if self.heap.is_empty() {
      return None;
    }
    Some(self.remove_at(0))
  }

  /// Removes the item addressed by `handle`.
  ///
  /// A stale or foreign handle is a caller defect: it asserts in debug
  /// builds and is ignored in release builds.
  pub fn remove(&mut self, handle: QueueHandle) -> Option<(T, P)> {
    if !self.check_handle(handle) {
      return None;
    }
    let index = self.slots[handle.slot as usize].heap_index;
    Some(self.remove_at(index))
  }

  /// Changes the priority of a queued item and restores heap order.
  pub fn update_priority(&mut self, handle: QueueHandle, priority: P) -> bool {
    if !self.check_handle(handle) {
      return false;
    }
    let slot = &mut self.slots[handle.slot as usize];
    if let Some(entry) = slot.entry.as_mut() {
      entry.1 = priority;
    }
    let index = slot.heap_index;
    self.sift_up(index);
    let index = self.slots[handle.slot as usize].heap_index;
    self.sift_down(index);
    true
  }

  pub fn get(&self, handle: QueueHandle) -> Option<&T> {
    if !self.contains(handle) {
      return None;
    }
    self.slots[handle.slot as usize].entry.as_ref().map(|(item, _)| item)
  }

  pub fn priority(&self, handle: QueueHandle) -> Option<&P> {
    if !self.contains(handle) {
      return None;
    }
    self.slots[handle.slot as usize].entry.as_ref().map(|(_, p)| p)
  }

  /// Drops every item. Outstanding handles become stale.
  pub fn clear(&mut self) {
    for &slot_index in &self.heap {
      let slot = &mut self.slots[slot_index as usize];
      slot.entry = None;
      slot.generation = slot.generation.wrapping_add(1);
    }
    self.heap.clear();
    self.free.clear();
    self.free.extend((0..self.slots.len() as u32).rev());
  }

  /// Items in heap order (not sorted).
  pub fn iter(&self) -> impl Iterator<Item = (&T, &P)> + '_ {
    self.heap.iter().map(move |&slot| {
      let (item, priority) = self.entry(slot);
      (item, priority)
    })
  }

  /// Items in heap order together with their handles.
  pub fn iter_handles(&self) -> impl Iterator<Item = (QueueHandle, &T)> + '_ {
    self
      .heap
      .iter()
      .map(move |&slot| (self.handle_for(slot), &self.entry(slot).0))
  }

  fn handle_for(&self, slot: u32) -> QueueHandle {
    QueueHandle {
      slot,
      generation: self.slots[slot as usize].generation,
      queue: self.id,
    }
  }

  fn check_handle(&self, handle: QueueHandle) -> bool {
    let valid = self.contains(handle);
    debug_assert!(valid, "stale or foreign queue handle {handle:?}");
    valid
  }

  #[inline]
  fn entry(&self, slot: u32) -> &(T, P) {
    match self.slots[slot as usize].entry.as_ref() {
      Some(entry) => entry,
      None => unreachable!("heap references a free slot"),
    }
  }

  /// True if the item at heap position `a` belongs above the one at `b`.
  #[inline]
  fn outranks(&self, a: usize, b: usize) -> bool {
    let pa = &self.entry(self.heap[a]).1;
    let pb = &self.entry(self.heap[b]).1;
    (self.compare)(pa, pb) == Ordering::Greater
  }

  fn swap(&mut self, a: usize, b: usize) {
    self.heap.swap(a, b);
    self.slots[self.heap[a] as usize].heap_index = a;
    self.slots[self.heap[b] as usize].heap_index = b;
  }

  fn sift_up(&mut self, mut index: usize) {
    while index > 0 {
      let parent = (index - 1) / 2;
      if !self.outranks(index, parent) {
        break;
      }
      self.swap(index, parent);
      index = parent;
    }
  }

  fn sift_down(&mut self, mut index: usize) {
    let len = self.heap.len();
    loop {
      let left = 2 * index + 1;
      if left >= len {
        break;
      }
      let right = left + 1;
      let child = if right < len && self.outranks(right, left) {
        right
      } else {
        left
      };
      if !self.outranks(child, index) {
        break;
      }
      self.swap(index, child);
      index = child;
    }
  }

  fn remove_at(&mut self, index: usize) -> (T, P) {
    let last = self.heap.len() - 1;
    if index != last {
      self.swap(index, last);
    }
    let slot_index = match self.heap.pop() {
      Some(slot) => slot,
      None => unreachable!("remove_at on empty heap"),
    };

    let slot = &mut self.slots[slot_index as usize];
    slot.generation = slot.generation.wrapping_add(1);
    let entry = match slot.entry.take() {
      Some(entry) => entry,
      None => unreachable!("heap references a free slot"),
    };
    self.free.push(slot_index);

    if index < self.heap.len() {
      self.sift_up(index);
      self.sift_down(index);
    }
    entry
  }
}

#[cfg(test)]
#[path = "priority_queue_test.rs"]
mod priority_queue_test;
