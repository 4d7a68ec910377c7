//! Cursor-following pagination.
//!
//! [`paginate`] turns a page-fetching function into a lazy stream of items.
//! A page is requested only when the previous one has been fully consumed,
//! and dropping the stream stops further requests, so a search that finds
//! its match on page `p` issues exactly `p` list calls.

use crate::error::{BulkError, ResponseError};
use crate::types::{Cursor, Page};
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::future::Future;
use tracing::trace;

enum NextPage {
    First,
    After(Cursor),
    Exhausted,
}

struct PagerState<T, F> {
    fetch: F,
    buffer: VecDeque<T>,
    next: NextPage,
    pages: u64,
}

/// Stream every item of a paginated catalog.
///
/// `fetch` receives `None` for the first page and the previous page's cursor
/// afterwards. The stream ends after the first page whose truncation flag
/// is false. A truncated page without a cursor yields
/// [`ResponseError::MissingCursor`].
///
/// # Example
///
/// ```rust
/// use aws_bulk::pagination::paginate;
/// use aws_bulk::types::{Cursor, Page};
/// use futures::TryStreamExt;
///
/// # tokio_test::block_on(async {
/// let numbers = paginate("ListNumbers", |cursor: Option<Cursor>| async move {
///     Ok(match cursor {
///         None => Page::more(vec![1, 2], Cursor::new("2")),
///         Some(_) => Page::last(vec![3]),
///     })
/// });
/// let all: Vec<i32> = numbers.try_collect().await?;
/// assert_eq!(all, vec![1, 2, 3]);
/// # Ok::<(), aws_bulk::BulkError>(())
/// # }).unwrap();
/// ```
pub fn paginate<T, F, Fut>(
    operation: &'static str,
    fetch: F,
) -> impl Stream<Item = Result<T, BulkError>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>, BulkError>>,
{
    let state = PagerState {
        fetch,
        buffer: VecDeque::new(),
        next: NextPage::First,
        pages: 0,
    };

    stream::try_unfold(state, move |mut state| async move {
        loop {
            if let Some(item) = state.buffer.pop_front() {
                return Ok(Some((item, state)));
            }

            let cursor = match std::mem::replace(&mut state.next, NextPage::Exhausted) {
                NextPage::Exhausted => return Ok(None),
                NextPage::First => None,
                NextPage::After(cursor) => Some(cursor),
            };

            let page = (state.fetch)(cursor).await?;
            state.pages += 1;
            trace!(
                operation,
                page = state.pages,
                items = page.items.len(),
                truncated = page.truncated,
                "Fetched page"
            );

            state.next = match (page.truncated, page.next_cursor) {
                (false, _) => NextPage::Exhausted,
                (true, Some(cursor)) => NextPage::After(cursor),
                (true, None) => {
                    return Err(BulkError::Response(ResponseError::MissingCursor {
                        operation: operation.to_string(),
                    }))
                }
            };
            state.buffer.extend(page.items);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbered_pages(
        total: usize,
        page_size: usize,
        calls: &AtomicUsize,
    ) -> impl Stream<Item = Result<usize, BulkError>> + '_ {
        paginate("ListNumbers", move |cursor: Option<Cursor>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let start: usize = cursor.map(|c| c.marker.parse().unwrap()).unwrap_or(0);
            let end = (start + page_size).min(total);
            let items: Vec<usize> = (start..end).collect();
            async move {
                Ok(if end < total {
                    Page::more(items, Cursor::new(end.to_string()))
                } else {
                    Page::last(items)
                })
            }
        })
    }

    #[tokio::test]
    async fn test_visits_every_item_once() {
        let calls = AtomicUsize::new(0);
        let items: Vec<usize> = numbered_pages(25, 10, &calls).try_collect().await.unwrap();
        assert_eq!(items, (0..25).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_page_size() {
        let calls = AtomicUsize::new(0);
        let items: Vec<usize> = numbered_pages(20, 10, &calls).try_collect().await.unwrap();
        assert_eq!(items.len(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let calls = AtomicUsize::new(0);
        let items: Vec<usize> = numbered_pages(0, 10, &calls).try_collect().await.unwrap();
        assert!(items.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_early_termination_stops_fetching() {
        let calls = AtomicUsize::new(0);
        let stream = numbered_pages(100, 10, &calls);
        futures::pin_mut!(stream);

        let found = stream
            .as_mut()
            .try_filter(|n| futures::future::ready(*n == 12))
            .next()
            .await;

        assert_eq!(found.unwrap().unwrap(), 12);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_cursor_is_an_error() {
        let stream = paginate("ListBroken", |_cursor: Option<Cursor>| async move {
            Ok(Page {
                items: vec![1],
                next_cursor: None,
                truncated: true,
            })
        });
        let result: Result<Vec<i32>, _> = stream.try_collect().await;
        assert!(matches!(
            result,
            Err(BulkError::Response(ResponseError::MissingCursor { .. }))
        ));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let stream = paginate("ListFailing", |_cursor: Option<Cursor>| async move {
            Err::<Page<i32>, _>(BulkError::Network(crate::error::NetworkError::ConnectionFailed {
                message: "reset".into(),
            }))
        });
        let result: Result<Vec<i32>, _> = stream.try_collect().await;
        assert!(matches!(result, Err(BulkError::Network(_))));
    }
}
