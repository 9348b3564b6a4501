//! Page-number pagination shared by every list endpoint.
//!
//! A listing is a finite, restartable sequence: any page may be requested
//! again and yields the same slice as long as the underlying rows have not
//! changed.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  page:      u32,
  page_size: u32,
}

impl PageRequest {
  /// Build a request from raw query parameters.
  ///
  /// Missing values fall back to page 1 and [`DEFAULT_PAGE_SIZE`]; oversize
  /// page sizes are clamped to [`MAX_PAGE_SIZE`]. A zero page or page size is
  /// rejected.
  pub fn new(page: Option<u32>, page_size: Option<u32>) -> Result<Self> {
    let page = page.unwrap_or(1);
    if page == 0 {
      return Err(Error::InvalidPage(page));
    }
    let page_size = match page_size {
      Some(0) => return Err(Error::InvalidPage(0)),
      Some(n) => n.min(MAX_PAGE_SIZE),
      None => DEFAULT_PAGE_SIZE,
    };
    Ok(Self { page, page_size })
  }

  pub fn page(&self) -> u32 { self.page }

  pub fn page_size(&self) -> u32 { self.page_size }

  pub fn limit(&self) -> i64 { i64::from(self.page_size) }

  pub fn offset(&self) -> i64 {
    i64::from(self.page - 1) * i64::from(self.page_size)
  }

  /// Reject pages past the end of a result of `count` rows. Page 1 is always
  /// valid, even for an empty result.
  pub fn check_in_range(&self, count: u64) -> Result<()> {
    if self.page > 1 && self.offset() as u64 >= count {
      return Err(Error::InvalidPage(self.page));
    }
    Ok(())
  }
}

impl Default for PageRequest {
  fn default() -> Self {
    Self { page: 1, page_size: DEFAULT_PAGE_SIZE }
  }
}

/// One page of results plus the navigation needed to fetch its neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  /// Total number of rows across all pages.
  pub count:    u64,
  /// Next page number, if any.
  pub next:     Option<u32>,
  /// Previous page number, if any.
  pub previous: Option<u32>,
  pub results:  Vec<T>,
}

impl<T> Page<T> {
  pub fn new(request: PageRequest, count: u64, results: Vec<T>) -> Self {
    let seen = request.offset() as u64 + results.len() as u64;
    Self {
      count,
      next: (seen < count).then(|| request.page + 1),
      previous: (request.page > 1).then(|| request.page - 1),
      results,
    }
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      count:    self.count,
      next:     self.next,
      previous: self.previous,
      results:  self.results.into_iter().map(f).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_and_clamping() {
    let req = PageRequest::new(None, None).unwrap();
    assert_eq!((req.page(), req.page_size()), (1, DEFAULT_PAGE_SIZE));

    let req = PageRequest::new(Some(3), Some(500)).unwrap();
    assert_eq!(req.page_size(), MAX_PAGE_SIZE);
    assert_eq!(req.offset(), 200);
  }

  #[test]
  fn zero_values_rejected() {
    assert!(matches!(PageRequest::new(Some(0), None), Err(Error::InvalidPage(0))));
    assert!(matches!(PageRequest::new(None, Some(0)), Err(Error::InvalidPage(0))));
  }

  #[test]
  fn navigation_links() {
    let req = PageRequest::new(Some(2), Some(2)).unwrap();
    let page = Page::new(req, 5, vec!['c', 'd']);
    assert_eq!(page.next, Some(3));
    assert_eq!(page.previous, Some(1));

    let req = PageRequest::new(Some(3), Some(2)).unwrap();
    let page = Page::new(req, 5, vec!['e']);
    assert_eq!(page.next, None);
  }

  #[test]
  fn out_of_range_pages() {
    let req = PageRequest::new(Some(1), None).unwrap();
    assert!(req.check_in_range(0).is_ok());

    let req = PageRequest::new(Some(2), Some(10)).unwrap();
    assert!(req.check_in_range(10).is_err());
    assert!(req.check_in_range(11).is_ok());
  }
}
