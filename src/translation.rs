/// Decomposition of a process-relative address into page and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: usize,
    /// Logical page index in the owner's page table
    pub page: usize,
    /// Byte offset inside the page
    pub offset: usize,
}

impl VirtualAddress {
    /// Decompose a raw address for the given page size
    pub fn from_raw(va: usize, page_size: usize) -> Self {
        VirtualAddress {
            va,
            page: va / page_size,
            offset: va % page_size,
        }
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VA({}) = (p={}, w={})", self.va, self.page, self.offset)
    }
}
