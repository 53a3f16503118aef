use std::ops::Range;

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// One batch of a log, newest batch first.
///
/// `last` is the `from` to ask for next to get the older batch; `0` means
/// there is nothing older.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub last: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            last: 0,
            data: Vec::new(),
        }
    }
}

/// The slice of a `len`-long sequence that a tail cursor at `from` covers.
///
/// `from` defaults to `len`. A zero page size is treated as one so that
/// following `last` always terminates.
pub fn page_bounds(len: usize, from: Option<usize>, page_size: usize) -> Range<usize> {
    let end = from.unwrap_or(len).min(len);
    let start = end.saturating_sub(page_size.max(1));
    start..end
}

pub fn paginate<T: Clone>(items: &[T], from: Option<usize>, page_size: usize) -> Page<T> {
    let bounds = page_bounds(items.len(), from, page_size);
    Page {
        last: bounds.start,
        data: items[bounds].to_vec(),
    }
}
