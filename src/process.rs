/// A simulated process and its page table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    name: String,
    /// Bytes committed through create and allocate calls
    size: usize,
    /// Logical page index -> RAM frame index
    page_table: Vec<usize>,
}

impl Process {
    pub fn new(name: impl Into<String>, size: usize, page_table: Vec<usize>) -> Self {
        Process {
            name: name.into(),
            size,
            page_table,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn page_table(&self) -> &[usize] {
        &self.page_table
    }

    /// Number of logical pages; new pages are numbered from here
    #[inline]
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// RAM frame last recorded for `logical_page`
    pub fn frame_of(&self, logical_page: usize) -> Option<usize> {
        self.page_table.get(logical_page).copied()
    }

    /// Point `logical_page` at a new RAM frame after a fault was serviced
    pub fn map_page(&mut self, logical_page: usize, frame: usize) {
        if let Some(entry) = self.page_table.get_mut(logical_page) {
            *entry = frame;
        }
    }

    /// Record a successful allocation of `bytes`, appending any new frames.
    pub fn grow(&mut self, frames: &[usize], bytes: usize) {
        self.page_table.extend_from_slice(frames);
        self.size += bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_process() {
        let process = Process::new("A", 6, vec![3, 1]);
        assert_eq!(process.name(), "A");
        assert_eq!(process.size(), 6);
        assert_eq!(process.page_count(), 2);
        assert_eq!(process.frame_of(1), Some(1));
        assert_eq!(process.frame_of(2), None);
    }

    #[test]
    fn test_grow_appends_and_credits_full_request() {
        let mut process = Process::new("A", 6, vec![3, 1]);

        // A top-up allocates no frames but still counts towards the size
        process.grow(&[], 1);
        assert_eq!(process.size(), 7);
        assert_eq!(process.page_table(), &[3, 1]);

        process.grow(&[0, 2], 8);
        assert_eq!(process.size(), 15);
        assert_eq!(process.page_table(), &[3, 1, 0, 2]);
    }

    #[test]
    fn test_map_page() {
        let mut process = Process::new("A", 8, vec![0, 1]);
        process.map_page(1, 5);
        assert_eq!(process.page_table(), &[0, 5]);

        // Unknown pages are ignored
        process.map_page(4, 2);
        assert_eq!(process.page_table(), &[0, 5]);
    }
}
