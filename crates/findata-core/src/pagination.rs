//! Backward-walking pagination for endpoints with capped page sizes.

use std::collections::HashSet;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{Coverage, LowerBound, WindowQuery};
use crate::{Day, FetchError, Record};

/// Records gathered by one walk and the window they are known to cover.
#[derive(Debug, Clone, PartialEq)]
pub struct Walk<T> {
    pub records: Vec<T>,
    pub coverage: Coverage,
    /// `false` when the walk was cut short before proving its lower bound.
    pub exhausted: bool,
}

impl<T: Record> Walk<T> {
    /// A one-request fetch of `query`, seen as a walk of a single page.
    pub fn single(query: &WindowQuery, records: Vec<T>) -> Self {
        let coverage = Coverage::from_fetch(query, &records);
        Self {
            exhausted: !matches!(coverage.lower, LowerBound::Partial(_)),
            records,
            coverage,
        }
    }
}

/// Walks the date axis backward from `end` toward `start`, one page per call.
///
/// Without a `start` the walk is a single "most recent `limit` records"
/// page. Pages are concatenated in fetch order and de-duplicated by natural
/// key, since each page's oldest day is requested again by the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    start: Option<Day>,
    end: Day,
    limit: usize,
}

impl Paginator {
    pub fn new(start: Option<Day>, end: Day, limit: usize) -> Self {
        Self { start, end, limit }
    }

    /// Drive `fetch_page(cursor)` until a stop condition holds:
    ///
    /// 1. the page is empty;
    /// 2. the page is shorter than `limit`;
    /// 3. no `start` was given;
    /// 4. the oldest day in the page is at or before `start`;
    /// 5. the cursor would not move backward.
    ///
    /// Full pages count toward the coverage decision before de-duplication,
    /// and a walk ended by the last condition only covers back to its oldest
    /// day.
    pub async fn collect<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut fetch_page: F,
    ) -> Result<Walk<T>, FetchError>
    where
        T: Record,
        F: FnMut(Day) -> Fut,
        Fut: Future<Output = Result<Vec<T>, FetchError>>,
    {
        let mut cursor = self.end;
        let mut collected = Vec::new();
        let mut seen = HashSet::new();
        let mut pages = 0_u32;
        let mut oldest_seen: Option<Day> = None;

        let exhausted = loop {
            if cancel.is_cancelled() {
                return Err(FetchError::cancelled());
            }

            let page = fetch_page(cursor).await?;
            pages += 1;
            if page.is_empty() {
                break true;
            }

            let page_len = page.len();
            let oldest = page.iter().map(Record::day).min();
            if let Some(day) = oldest {
                oldest_seen = Some(oldest_seen.map_or(day, |earliest| earliest.min(day)));
            }
            for record in page {
                if seen.insert(record.natural_key()) {
                    collected.push(record);
                }
            }

            if page_len < self.limit {
                break true;
            }
            let (Some(start), Some(next)) = (self.start, oldest) else {
                break false;
            };
            if next <= start {
                break true;
            }
            if next >= cursor {
                warn!(
                    family = %T::FAMILY,
                    cursor = %cursor,
                    "page did not move the cursor backward; stopping pagination"
                );
                break false;
            }
            cursor = next;
        };

        let lower = match (exhausted, self.start) {
            (true, Some(start)) => LowerBound::Complete(start),
            (true, None) => LowerBound::Unbounded,
            (false, _) => LowerBound::Partial(oldest_seen.unwrap_or(self.end)),
        };

        debug!(
            family = %T::FAMILY,
            pages,
            records = collected.len(),
            exhausted,
            "pagination finished"
        );
        Ok(Walk {
            records: collected,
            coverage: Coverage {
                lower,
                upper: self.end,
            },
            exhausted,
        })
    }
}
