/// A fixed-capacity unit of process memory.
///
/// Pages only track how many bytes are in use; no content is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    owner: String,
    capacity: usize,
    stored: usize,
}

impl Page {
    /// Create a page holding `stored` bytes out of `capacity`, or `None`
    /// when they do not fit.
    pub fn new(owner: impl Into<String>, capacity: usize, stored: usize) -> Option<Self> {
        if stored > capacity {
            return None;
        }
        Some(Page {
            owner: owner.into(),
            capacity,
            stored,
        })
    }

    /// Create a completely filled page.
    pub fn full(owner: impl Into<String>, capacity: usize) -> Self {
        Page {
            owner: owner.into(),
            capacity,
            stored: capacity,
        }
    }

    #[inline]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn stored(&self) -> usize {
        self.stored
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.capacity - self.stored
    }

    /// Pack `bytes` more into the page. All or nothing.
    pub fn try_store(&mut self, bytes: usize) -> bool {
        if self.free() < bytes {
            return false;
        }
        self.stored += bytes;
        true
    }
}
