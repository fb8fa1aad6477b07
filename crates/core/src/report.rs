//! Bounded diagnostic listing of a selection
//!
//! A selection is single-pass, so printing a few items for debugging would
//! normally eat them. [`SelectionReporter`] buffers what it prints and hands
//! back a selection that replays the buffer before continuing with the
//! untouched rest of the source.

use std::io::Write;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;

/// Default number of items printed
pub const DEFAULT_LIMIT: usize = 300;

/// Prints the head of a selection when verbose
#[derive(Debug, Clone, Copy)]
pub struct SelectionReporter {
    verbose: bool,
    limit: usize,
}

impl SelectionReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Write `func(item)` for up to `limit` items of `selection` to `out`
    ///
    /// Returns a selection that yields every item of the original, in order.
    /// At most `limit` items are pulled from the source before the caller
    /// resumes consuming it. An error among the printed items is replayed in
    /// its position and ends the printing. Write failures are logged and
    /// otherwise ignored.
    pub async fn report<'a, T, F, W>(
        &self,
        mut selection: BoxStream<'a, Result<T>>,
        func: F,
        out: &mut W,
    ) -> BoxStream<'a, Result<T>>
    where
        T: Send + 'a,
        F: Fn(&T) -> String,
        W: Write + ?Sized,
    {
        if !self.verbose || self.limit == 0 {
            return selection;
        }

        let mut buffered = Vec::new();
        while buffered.len() < self.limit {
            match selection.next().await {
                Some(Ok(item)) => {
                    if let Err(e) = writeln!(out, "{}", func(&item)) {
                        tracing::warn!(error = %e, "couldn't write selection diagnostics");
                    }
                    buffered.push(Ok(item));
                }
                Some(Err(e)) => {
                    buffered.push(Err(e));
                    break;
                }
                None => break,
            }
        }
        tracing::debug!(printed = buffered.len(), limit = self.limit, "selection head printed");

        stream::iter(buffered).chain(selection).boxed()
    }
}

/// If `verbose`, print `func(item)` for up to `limit` items of `selection`
///
/// See [`SelectionReporter::report`].
pub async fn print_selection<'a, T, F, W>(
    selection: BoxStream<'a, Result<T>>,
    func: F,
    verbose: bool,
    limit: usize,
    out: &mut W,
) -> BoxStream<'a, Result<T>>
where
    T: Send + 'a,
    F: Fn(&T) -> String,
    W: Write + ?Sized,
{
    SelectionReporter::new(verbose)
        .with_limit(limit)
        .report(selection, func, out)
        .await
}
