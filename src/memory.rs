use std::fmt;

use crate::constants::EMPTY_FRAME;
use crate::error::FrameError;
use crate::page::Page;

/// Rule used to pick the resident page that makes room in a full store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Least recently touched frame, ties broken by the lowest frame index.
    Lru,
    /// Round-robin over occupied frames, starting after the last evicted one.
    Sequential,
}

impl EvictionPolicy {
    /// Parse a policy name as written in run scripts.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lru" => Some(EvictionPolicy::Lru),
            "sequential" => Some(EvictionPolicy::Sequential),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Sequential => "sequential",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An occupied frame slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Logical time of the last allocation, top-up or access.
    pub last_touch: u64,
    pub page: Page,
    /// Index of this page in its owner's page table.
    pub logical_index: usize,
}

/// The frame a store would give up next under a given policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub frame: usize,
    pub owner: String,
    pub logical_index: usize,
    pub stored: usize,
}

/// Fixed-size array of frames; instantiated once as RAM and once as disk.
#[derive(Debug, Clone)]
pub struct FrameStore {
    label: &'static str,
    page_size: usize,
    slots: Vec<Option<Frame>>,
    occupied: usize,
    bytes_stored: usize,
    /// Cursor for [`EvictionPolicy::Sequential`].
    last_evicted: Option<usize>,
}

impl FrameStore {
    /// Create an empty store of `frame_count` frames of `page_size` bytes each
    pub fn new(label: &'static str, page_size: usize, frame_count: usize) -> Self {
        FrameStore {
            label,
            page_size,
            slots: vec![None; frame_count],
            occupied: 0,
            bytes_stored: 0,
            last_evicted: None,
        }
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied frames
    #[inline]
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    #[inline]
    pub fn free_frames(&self) -> usize {
        self.slots.len() - self.occupied
    }

    /// Bytes in use across all resident pages
    #[inline]
    pub fn bytes_stored(&self) -> usize {
        self.bytes_stored
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.slots.len() * self.page_size
    }

    /// Byte budget left, including slack inside partially filled pages
    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.capacity_bytes() - self.bytes_stored
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.occupied == self.slots.len()
    }

    /// Get the frame at `index`, if it is occupied
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.slots.get(index)?.as_ref()
    }

    /// Iterate over occupied frames with their indices
    pub fn frames(&self) -> impl Iterator<Item = (usize, &Frame)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|frame| (index, frame)))
    }

    /// Place `page` into the first empty frame and return its index.
    pub fn insert(
        &mut self,
        timestamp: u64,
        page: Page,
        logical_index: usize,
    ) -> Result<usize, FrameError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FrameError::Full)?;

        self.occupied += 1;
        self.bytes_stored += page.stored();
        self.slots[index] = Some(Frame {
            last_touch: timestamp,
            page,
            logical_index,
        });
        Ok(index)
    }

    /// Split `bytes` into pages for `owner`, numbering new pages from
    /// `first_logical_index`.
    ///
    /// Returns the frame indices of the new pages in logical order. The list
    /// is empty when the request was packed into existing pages. On failure
    /// every page inserted by this call is released again, so callers never
    /// observe a partial allocation.
    pub fn allocate(
        &mut self,
        timestamp: u64,
        owner: &str,
        bytes: usize,
        first_logical_index: usize,
    ) -> Result<Vec<usize>, FrameError> {
        if bytes == 0 {
            return Ok(Vec::new());
        }
        if bytes > self.free_bytes() {
            return Err(FrameError::OutOfSpace);
        }

        // No frame left: the only option is packing into an existing page.
        if self.is_full() {
            return if self.top_up(owner, bytes, timestamp) {
                Ok(Vec::new())
            } else {
                Err(FrameError::OutOfSpace)
            };
        }

        let mut frames = Vec::new();
        let mut remaining = bytes;
        let mut logical_index = first_logical_index;

        while remaining >= self.page_size {
            let page = Page::full(owner, self.page_size);
            match self.insert(timestamp, page, logical_index) {
                Ok(index) => frames.push(index),
                Err(_) => {
                    self.rollback(&frames);
                    return Err(FrameError::OutOfSpace);
                }
            }
            remaining -= self.page_size;
            logical_index += 1;
        }

        if remaining > 0 && !self.top_up(owner, remaining, timestamp) {
            let placed = Page::new(owner, self.page_size, remaining)
                .ok_or(FrameError::OutOfSpace)
                .and_then(|page| self.insert(timestamp, page, logical_index));
            match placed {
                Ok(index) => frames.push(index),
                Err(_) => {
                    self.rollback(&frames);
                    return Err(FrameError::OutOfSpace);
                }
            }
        }

        log::trace!(
            "{}: allocated {bytes} bytes for {owner} in frames {frames:?}",
            self.label
        );
        Ok(frames)
    }

    /// Pack `bytes` into the first page of `owner` with enough free room.
    pub fn top_up(&mut self, owner: &str, bytes: usize, timestamp: u64) -> bool {
        let Some(frame) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|frame| frame.page.owner() == owner && frame.page.free() >= bytes)
        else {
            return false;
        };

        if !frame.page.try_store(bytes) {
            return false;
        }
        frame.last_touch = timestamp;
        self.bytes_stored += bytes;
        true
    }

    /// Pick the frame `policy` would evict next. Nothing is removed.
    pub fn select_eviction_candidate(&self, policy: EvictionPolicy) -> Option<EvictionCandidate> {
        let index = self.victim_index(policy)?;
        let frame = self.frame(index)?;
        Some(EvictionCandidate {
            frame: index,
            owner: frame.page.owner().to_string(),
            logical_index: frame.logical_index,
            stored: frame.page.stored(),
        })
    }

    /// Remove and return the frame `policy` selects, advancing the
    /// round-robin cursor.
    pub fn evict(&mut self, policy: EvictionPolicy) -> Option<(usize, Frame)> {
        let index = self.victim_index(policy)?;
        let frame = self.release(index)?;
        self.last_evicted = Some(index);
        Some((index, frame))
    }

    fn victim_index(&self, policy: EvictionPolicy) -> Option<usize> {
        match policy {
            EvictionPolicy::Lru => self
                .frames()
                .min_by_key(|&(index, frame)| (frame.last_touch, index))
                .map(|(index, _)| index),
            EvictionPolicy::Sequential => {
                let count = self.slots.len();
                let start = self.last_evicted.map_or(0, |last| last + 1);
                (0..count)
                    .map(|offset| (start + offset) % count)
                    .find(|&index| self.slots[index].is_some())
            }
        }
    }

    /// Empty the slot at `index` and return what it held.
    pub fn remove(&mut self, index: usize) -> Result<Frame, FrameError> {
        if index >= self.slots.len() {
            return Err(FrameError::FrameOutOfRange(index));
        }
        self.release(index).ok_or(FrameError::EmptyFrame(index))
    }

    fn release(&mut self, index: usize) -> Option<Frame> {
        let frame = self.slots.get_mut(index)?.take()?;
        self.occupied -= 1;
        self.bytes_stored -= frame.page.stored();
        Some(frame)
    }

    fn rollback(&mut self, frames: &[usize]) {
        for &index in frames.iter().rev() {
            self.release(index);
        }
    }

    /// Find the frame holding page `logical_index` of `owner`
    pub fn find_by_owner(&self, owner: &str, logical_index: usize) -> Option<usize> {
        self.frames()
            .find(|(_, frame)| frame.page.owner() == owner && frame.logical_index == logical_index)
            .map(|(index, _)| index)
    }

    /// Touch frame `index` if it holds page `logical_index` of `owner`.
    ///
    /// Returns `false` (and changes nothing) on any mismatch.
    pub fn access(
        &mut self,
        index: usize,
        timestamp: u64,
        owner: &str,
        logical_index: usize,
    ) -> bool {
        match self.slots.get_mut(index) {
            Some(Some(frame))
                if frame.page.owner() == owner && frame.logical_index == logical_index =>
            {
                frame.last_touch = timestamp;
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            label: self.label,
            total_bytes: self.capacity_bytes(),
            allocated_bytes: self.bytes_stored,
            frames: self
                .slots
                .iter()
                .map(|slot| {
                    slot.as_ref()
                        .map(|frame| (frame.page.owner().to_string(), frame.logical_index))
                })
                .collect(),
        }
    }
}

/// Point-in-time view of a store, as handed to the report layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub label: &'static str,
    pub total_bytes: usize,
    pub allocated_bytes: usize,
    /// `None` for an empty frame, otherwise `(owner, logical_index)`.
    pub frames: Vec<Option<(String, usize)>>,
}

impl fmt::Display for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} size: {}, allocated: {}",
            self.label, self.total_bytes, self.allocated_bytes
        )?;
        let entries: Vec<String> = self
            .frames
            .iter()
            .map(|slot| match slot {
                Some((owner, index)) => format!("({owner}, {index})"),
                None => EMPTY_FRAME.to_string(),
            })
            .collect();
        write!(f, "[{}]", entries.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram(frames: usize) -> FrameStore {
        FrameStore::new("RAM", 4, frames)
    }

    #[test]
    fn test_store_initialization() {
        let store = ram(3);
        assert_eq!(store.frame_count(), 3);
        assert_eq!(store.capacity_bytes(), 12);
        assert_eq!(store.occupied(), 0);
        assert_eq!(store.bytes_stored(), 0);
        assert!(!store.is_full());
    }

    #[test]
    fn test_insert_uses_first_empty_slot() {
        let mut store = ram(2);
        assert_eq!(store.insert(0, Page::full("A", 4), 0), Ok(0));
        assert_eq!(store.insert(1, Page::new("B", 4, 2).unwrap(), 0), Ok(1));
        assert_eq!(store.bytes_stored(), 6);
        assert!(store.is_full());

        // Full store rejects without touching anything
        assert_eq!(store.insert(2, Page::full("C", 4), 0), Err(FrameError::Full));
        assert_eq!(store.occupied(), 2);
        assert_eq!(store.bytes_stored(), 6);
    }

    #[test]
    fn test_allocate_splits_into_pages() {
        // 10 bytes with 4-byte pages: two full pages plus a 2-byte residual
        let mut store = ram(4);
        let frames = store.allocate(7, "A", 10, 0).unwrap();
        assert_eq!(frames, vec![0, 1, 2]);

        let logical: Vec<usize> = frames
            .iter()
            .map(|&i| store.frame(i).unwrap().logical_index)
            .collect();
        assert_eq!(logical, vec![0, 1, 2]);
        assert_eq!(store.frame(2).unwrap().page.stored(), 2);
        assert_eq!(store.bytes_stored(), 10);
    }

    #[test]
    fn test_allocate_starts_at_given_logical_index() {
        let mut store = ram(4);
        let frames = store.allocate(0, "A", 8, 5).unwrap();
        assert_eq!(store.frame(frames[0]).unwrap().logical_index, 5);
        assert_eq!(store.frame(frames[1]).unwrap().logical_index, 6);
    }

    #[test]
    fn test_allocate_residual_tops_up_existing_page() {
        let mut store = ram(4);
        store.allocate(0, "A", 1, 0).unwrap();

        // The 2-byte residual fits into A's first page, no new frame
        let frames = store.allocate(3, "A", 6, 1).unwrap();
        assert_eq!(frames, vec![1]);
        assert_eq!(store.occupied(), 2);
        assert_eq!(store.frame(0).unwrap().page.stored(), 3);
        assert_eq!(store.frame(0).unwrap().last_touch, 3);
        assert_eq!(store.bytes_stored(), 7);
    }

    #[test]
    fn test_allocate_zero_bytes() {
        let mut store = ram(1);
        assert_eq!(store.allocate(0, "A", 0, 0), Ok(Vec::new()));
        assert_eq!(store.occupied(), 0);
    }

    #[test]
    fn test_allocate_in_full_store_only_tops_up() {
        let mut store = ram(1);
        store.allocate(0, "A", 1, 0).unwrap();
        assert!(store.is_full());

        assert_eq!(store.allocate(1, "A", 3, 1), Ok(Vec::new()));
        assert_eq!(store.frame(0).unwrap().page.stored(), 4);
        assert_eq!(store.allocate(2, "A", 1, 1), Err(FrameError::OutOfSpace));
        assert_eq!(store.allocate(2, "B", 0, 0), Ok(Vec::new()));
    }

    #[test]
    fn test_allocate_beyond_byte_budget_fails() {
        let mut store = ram(2);
        assert_eq!(store.allocate(0, "A", 9, 0), Err(FrameError::OutOfSpace));
        assert_eq!(store.occupied(), 0);
    }

    #[test]
    fn test_allocate_is_all_or_nothing() {
        // 3 frames, one holding a 1-byte page of B: 11 bytes of budget left,
        // but 3 new frames are needed for 9 bytes of A and only 2 are free
        let mut store = ram(3);
        store.allocate(0, "B", 1, 0).unwrap();

        assert_eq!(store.allocate(1, "A", 9, 0), Err(FrameError::OutOfSpace));
        assert_eq!(store.occupied(), 1);
        assert_eq!(store.bytes_stored(), 1);
        assert_eq!(store.find_by_owner("A", 0), None);
    }

    #[test]
    fn test_top_up_requires_room() {
        let mut store = ram(2);
        store.insert(0, Page::new("A", 4, 3).unwrap(), 0).unwrap();
        store.insert(0, Page::new("A", 4, 1).unwrap(), 1).unwrap();

        // First page has 1 free byte, second has 3: 2 bytes land in the second
        assert!(store.top_up("A", 2, 9));
        assert_eq!(store.frame(0).unwrap().page.stored(), 3);
        assert_eq!(store.frame(1).unwrap().page.stored(), 3);
        assert_eq!(store.frame(1).unwrap().last_touch, 9);

        assert!(!store.top_up("A", 2, 10));
        assert!(!store.top_up("B", 1, 10));
        assert_eq!(store.bytes_stored(), 6);
    }

    #[test]
    fn test_lru_candidate() {
        let mut store = ram(3);
        store.insert(5, Page::full("A", 4), 0).unwrap();
        store.insert(2, Page::full("B", 4), 0).unwrap();
        store.insert(2, Page::full("C", 4), 0).unwrap();

        // B and C tie on timestamp 2; lowest frame index wins
        let candidate = store.select_eviction_candidate(EvictionPolicy::Lru).unwrap();
        assert_eq!(candidate.frame, 1);
        assert_eq!(candidate.owner, "B");

        // Selection is not removal
        assert_eq!(store.occupied(), 3);
    }

    #[test]
    fn test_lru_respects_access() {
        let mut store = ram(2);
        store.insert(0, Page::full("A", 4), 0).unwrap();
        store.insert(1, Page::full("B", 4), 0).unwrap();
        assert!(store.access(0, 2, "A", 0));

        let (index, frame) = store.evict(EvictionPolicy::Lru).unwrap();
        assert_eq!(index, 1);
        assert_eq!(frame.page.owner(), "B");
    }

    #[test]
    fn test_sequential_round_robin() {
        let mut store = ram(3);
        for owner in ["A", "B", "C"] {
            store.insert(0, Page::full(owner, 4), 0).unwrap();
        }

        let policy = EvictionPolicy::Sequential;
        assert_eq!(store.select_eviction_candidate(policy).unwrap().frame, 0);
        assert_eq!(store.evict(policy).unwrap().0, 0);

        // Refill frame 0; the cursor moves on to frame 1 regardless
        store.insert(0, Page::full("D", 4), 0).unwrap();
        assert_eq!(store.evict(policy).unwrap().0, 1);
        assert_eq!(store.evict(policy).unwrap().0, 2);

        // Wraps around to D in frame 0
        assert_eq!(store.evict(policy).unwrap().0, 0);
        assert!(store.evict(policy).is_none());
    }

    #[test]
    fn test_no_candidate_in_empty_store() {
        let store = ram(2);
        assert!(store.select_eviction_candidate(EvictionPolicy::Lru).is_none());
        assert!(store.select_eviction_candidate(EvictionPolicy::Sequential).is_none());
    }

    #[test]
    fn test_remove() {
        let mut store = ram(2);
        store.insert(0, Page::new("A", 4, 3).unwrap(), 4).unwrap();

        let frame = store.remove(0).unwrap();
        assert_eq!(frame.page.stored(), 3);
        assert_eq!(frame.logical_index, 4);
        assert_eq!(store.occupied(), 0);
        assert_eq!(store.bytes_stored(), 0);

        assert_eq!(store.remove(0), Err(FrameError::EmptyFrame(0)));
        assert_eq!(store.remove(7), Err(FrameError::FrameOutOfRange(7)));
    }

    #[test]
    fn test_find_by_owner() {
        let mut store = ram(3);
        store.insert(0, Page::full("A", 4), 0).unwrap();
        store.insert(0, Page::full("B", 4), 0).unwrap();
        store.insert(0, Page::full("A", 4), 1).unwrap();

        assert_eq!(store.find_by_owner("A", 1), Some(2));
        assert_eq!(store.find_by_owner("B", 0), Some(1));
        assert_eq!(store.find_by_owner("B", 1), None);
    }

    #[test]
    fn test_access_miss_does_not_mutate() {
        let mut store = ram(2);
        store.insert(3, Page::full("A", 4), 0).unwrap();

        assert!(!store.access(0, 9, "B", 0));
        assert!(!store.access(0, 9, "A", 1));
        assert!(!store.access(1, 9, "A", 0));
        assert!(!store.access(5, 9, "A", 0));
        assert_eq!(store.frame(0).unwrap().last_touch, 3);

        assert!(store.access(0, 9, "A", 0));
        assert_eq!(store.frame(0).unwrap().last_touch, 9);
    }

    #[test]
    fn test_snapshot_display() {
        let mut store = ram(2);
        store.insert(0, Page::new("A", 4, 3).unwrap(), 1).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total_bytes, 8);
        assert_eq!(snapshot.allocated_bytes, 3);
        assert_eq!(snapshot.frames, vec![Some(("A".to_string(), 1)), None]);
        assert_eq!(
            snapshot.to_string(),
            "RAM size: 8, allocated: 3\n[(A, 1), EMPTY]"
        );
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(EvictionPolicy::from_name("lru"), Some(EvictionPolicy::Lru));
        assert_eq!(
            EvictionPolicy::from_name(" Sequential\n"),
            Some(EvictionPolicy::Sequential)
        );
        assert_eq!(EvictionPolicy::from_name("fifo"), None);
        assert_eq!(EvictionPolicy::Lru.to_string(), "lru");
    }
}
