//! Pagination Engine
//!
//! Turns a row count into the block of page links shown under a listing.
//!
//! Pages are addressed by their database offset (`OFFSET` in the listing
//! query), not by their number. The full list of offsets is split into
//! consecutive chunks of `link_window` entries and only the chunk holding the
//! current offset is rendered, so a listing of 16 pages with a window of 5 shows
//! pages 1-5, 6-10, 11-15 or 16 depending on where the reader is.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLink {
    /// 1-based, absolute across all chunks
    pub page_number: i64,
    pub offset: i64,
    pub is_current: bool,
}

/// Links and navigation state for one listing page.
///
/// `previous_is_active` and `next_is_active` are true when the corresponding
/// control must be rendered *disabled*: there is no page before or after the
/// current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub links: Vec<PageLink>,
    pub next_offset: i64,
    pub previous_offset: i64,
    pub next_is_active: bool,
    pub previous_is_active: bool,
    pub page_count: i64,
}

impl Pagination {
    /// # Panics
    ///
    /// Panics if `page_size` or `link_window` is not positive.
    pub fn compute(page_size: i64, total_items: i64, link_window: i64, start: i64) -> Self {
        assert!(page_size >= 1, "page size must be positive, got {page_size}");
        assert!(link_window >= 1, "link window must be positive, got {link_window}");

        let total_items = total_items.max(0);
        let page_count = total_items / page_size + i64::from(total_items % page_size != 0);
        let offsets = page_offsets(page_size, page_count);
        let chunks = chunk(&offsets, link_window as usize);

        let chunk_index = chunks
            .iter()
            .position(|chunk| chunk.contains(&start))
            .unwrap_or(0);

        let links = chunks
            .get(chunk_index)
            .map(|offsets| {
                offsets
                    .iter()
                    .enumerate()
                    .map(|(i, &offset)| PageLink {
                        page_number: i as i64 + 1 + link_window * chunk_index as i64,
                        offset,
                        is_current: offset == start,
                    })
                    .collect()
            })
            .unwrap_or_default();

        // `start` comes straight from the query string
        let next_offset = start.saturating_add(page_size);
        let previous_offset = start.saturating_sub(page_size);

        Self {
            links,
            next_offset,
            previous_offset,
            next_is_active: next_offset >= total_items,
            previous_is_active: previous_offset < 0,
            page_count,
        }
    }

    pub fn current(&self) -> Option<&PageLink> {
        self.links.iter().find(|link| link.is_current)
    }
}

pub fn page_offsets(page_size: i64, page_count: i64) -> Vec<i64> {
    (0..page_count).map(|i| i * page_size).collect()
}

/// Splits `offsets` into runs of `size`, the last one possibly shorter.
pub fn chunk(offsets: &[i64], size: usize) -> Vec<Vec<i64>> {
    offsets.chunks(size).map(<[i64]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(pagination: &Pagination) -> Vec<i64> {
        pagination.links.iter().map(|l| l.offset).collect()
    }

    fn numbers(pagination: &Pagination) -> Vec<i64> {
        pagination.links.iter().map(|l| l.page_number).collect()
    }

    #[test]
    fn test_first_page() {
        let pagination = Pagination::compute(7, 110, 5, 0);

        assert_eq!(pagination.page_count, 16);
        assert_eq!(offsets(&pagination), vec![0, 7, 14, 21, 28]);
        assert_eq!(numbers(&pagination), vec![1, 2, 3, 4, 5]);
        assert_eq!(pagination.current().map(|l| l.offset), Some(0));
        assert!(pagination.previous_is_active);
        assert!(!pagination.next_is_active);
        assert_eq!(pagination.next_offset, 7);
        assert_eq!(pagination.previous_offset, -7);
    }

    #[test]
    fn test_offset_in_third_chunk() {
        let pagination = Pagination::compute(7, 110, 5, 98);

        assert_eq!(offsets(&pagination), vec![70, 77, 84, 91, 98]);
        assert_eq!(numbers(&pagination), vec![11, 12, 13, 14, 15]);
        assert_eq!(pagination.current().map(|l| l.page_number), Some(15));
        assert_eq!(pagination.next_offset, 105);
        assert!(!pagination.next_is_active);
        assert_eq!(pagination.previous_offset, 91);
        assert!(!pagination.previous_is_active);
    }

    #[test]
    fn test_last_short_chunk() {
        let pagination = Pagination::compute(7, 110, 5, 105);

        assert_eq!(offsets(&pagination), vec![105]);
        assert_eq!(numbers(&pagination), vec![16]);
        assert_eq!(pagination.next_offset, 112);
        assert!(pagination.next_is_active);
    }

    #[test]
    fn test_unknown_offset_defaults_to_first_chunk() {
        let pagination = Pagination::compute(7, 110, 5, 3);
        assert_eq!(offsets(&pagination), vec![0, 7, 14, 21, 28]);
        assert!(pagination.current().is_none());

        let pagination = Pagination::compute(7, 110, 5, 700);
        assert_eq!(numbers(&pagination), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_listing_disables_both_controls() {
        let pagination = Pagination::compute(7, 0, 5, 0);
        assert_eq!(pagination.page_count, 0);
        assert!(pagination.links.is_empty());
        assert!(pagination.previous_is_active);
        assert!(pagination.next_is_active);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_page() {
        let pagination = Pagination::compute(7, 70, 5, 63);
        assert_eq!(pagination.page_count, 10);
        assert_eq!(numbers(&pagination), vec![6, 7, 8, 9, 10]);
        assert!(pagination.next_is_active);
    }

    #[test]
    #[should_panic(expected = "page size must be positive")]
    fn test_zero_page_size_panics() {
        Pagination::compute(0, 10, 5, 0);
    }

    #[test]
    #[should_panic(expected = "link window must be positive")]
    fn test_zero_link_window_panics() {
        Pagination::compute(7, 10, 0, 0);
    }

    #[test]
    fn test_huge_offset_does_not_overflow() {
        let pagination = Pagination::compute(7, 110, 5, i64::MAX);
        assert_eq!(numbers(&pagination), vec![1, 2, 3, 4, 5]);
        assert!(pagination.current().is_none());
        assert_eq!(pagination.next_offset, i64::MAX);
        assert!(pagination.next_is_active);
        assert_eq!(pagination.previous_offset, i64::MAX - 7);
        assert!(!pagination.previous_is_active);

        let pagination = Pagination::compute(7, 110, 5, i64::MIN);
        assert_eq!(pagination.previous_offset, i64::MIN);
        assert!(pagination.previous_is_active);
    }

    #[test]
    fn test_chunks_cover_every_offset_once() {
        for total in 0..60 {
            for page_size in 1..9 {
                for link_window in 1..7 {
                    let page_count = (total + page_size - 1) / page_size;
                    let all = page_offsets(page_size, page_count);
                    assert_eq!(all.len() as i64, page_count);

                    let flattened: Vec<i64> = chunk(&all, link_window as usize)
                        .into_iter()
                        .flatten()
                        .collect();
                    assert_eq!(flattened, all);

                    // Walking every page visits each offset exactly once as current
                    let mut seen = Vec::new();
                    for &start in &all {
                        let pagination = Pagination::compute(page_size, total, link_window, start);
                        let current: Vec<_> =
                            pagination.links.iter().filter(|l| l.is_current).collect();
                        assert_eq!(current.len(), 1);
                        assert_eq!(current[0].offset, start);
                        assert_eq!(pagination.previous_is_active, start - page_size < 0);
                        assert_eq!(pagination.next_is_active, start + page_size >= total);
                        seen.push(current[0].offset);
                    }
                    assert_eq!(seen, all);
                }
            }
        }
    }

    #[test]
    fn test_rechunking_is_idempotent() {
        let all = page_offsets(7, 16);
        for chunk_of in chunk(&all, 5) {
            assert_eq!(chunk(&chunk_of, 5), vec![chunk_of.clone()]);
        }
    }
}
