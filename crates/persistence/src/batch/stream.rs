//! Paging and bounded-parallel helpers for very large datasets.

use std::future::Future;

use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};

use super::config::DEFAULT_CONCURRENCY;

/// Splits `items` into order-preserving chunks of at most `size` items.
///
/// A `size` of zero is treated as one.
///
/// ```
/// use chorus_persistence::batch::chunk;
///
/// let chunks = chunk(&[1, 2, 3, 4, 5], 2);
/// assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
/// ```
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

struct Pager<F> {
    fetch: F,
    offset: usize,
    done: bool,
}

/// Pages through a producer until a short page signals the end.
///
/// `fetch(offset, limit)` is called with increasing offsets. Each non-empty
/// page is yielded; a page shorter than `page_size` is the last one. An error
/// is yielded once and ends the stream. Only one page is held at a time.
///
/// ```
/// use chorus_persistence::batch::stream_batch_process;
/// use futures_util::TryStreamExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source: Vec<u32> = (0..7).collect();
/// let pages: Vec<Vec<u32>> = stream_batch_process(3, |offset, limit| {
///     let page = source.iter().skip(offset).take(limit).copied().collect();
///     async move { Ok::<_, std::io::Error>(page) }
/// })
/// .try_collect()
/// .await
/// .unwrap();
/// assert_eq!(pages.len(), 3);
/// # }
/// ```
pub fn stream_batch_process<T, E, F, Fut>(
    page_size: usize,
    fetch: F,
) -> impl Stream<Item = Result<Vec<T>, E>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let page_size = page_size.max(1);
    let pager = Pager {
        fetch,
        offset: 0,
        done: false,
    };

    stream::unfold(pager, move |mut pager| async move {
        if pager.done {
            return None;
        }
        match (pager.fetch)(pager.offset, page_size).await {
            Ok(page) => {
                pager.offset += page.len();
                pager.done = page.len() < page_size;
                if page.is_empty() {
                    None
                } else {
                    Some((Ok(page), pager))
                }
            }
            Err(e) => {
                pager.done = true;
                Some((Err(e), pager))
            }
        }
    })
}

/// Processes `items` in chunks with at most `concurrency` chunks in flight.
///
/// A `concurrency` of zero uses [`DEFAULT_CONCURRENCY`].
///
/// `process(chunk_index, chunk)` runs once per chunk. Side effects across
/// chunks happen in no particular order. The returned values are sorted by
/// chunk index. The first error is returned and chunks not yet started are
/// dropped.
pub async fn parallel_batch_process<T, R, E, F, Fut>(
    items: Vec<T>,
    chunk_size: usize,
    concurrency: usize,
    process: F,
) -> Result<Vec<R>, E>
where
    F: Fn(usize, Vec<T>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(chunk_size).collect::<Vec<_>>());
    }

    let concurrency = if concurrency == 0 {
        DEFAULT_CONCURRENCY
    } else {
        concurrency
    };

    let process = &process;
    let mut results: Vec<(usize, R)> = stream::iter(chunks.into_iter().enumerate())
        .map(|(index, chunk)| async move { process(index, chunk).await.map(|r| (index, r)) })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, r)| r).collect())
}
