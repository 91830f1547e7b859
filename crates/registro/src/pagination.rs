/// Offset/limit arithmetic for a listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
            total,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    pub fn total_pages(&self) -> u32 {
        self.total.div_ceil(self.page_size as u64) as u32
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Every page number from 1 to the last page
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        1..=self.total_pages()
    }

    /// 1-based position of the first row on this page, for "showing x-y of z"
    pub fn first_row(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            (self.offset() + 1).min(self.total)
        }
    }

    pub fn last_row(&self) -> u64 {
        (self.offset() + self.page_size as u64).min(self.total)
    }
}
