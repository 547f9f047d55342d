//! Batch write: one request carrying every pending increment on the page.

use crate::batch::{BatchContext, BatchOutcome, InFlight};
use crate::config::Config;
use crate::events::CounterEvent;
use crate::increment::parse_increment;
use crate::page::{
    counter_key, find_write_targets, ElementRef, PageContext, WriteState, WRITE_MARKER,
};
use crate::transport::{BatchResponse, BatchWriteRequest, CounterIncrement};
use tracing::{debug, error, info, warn};

/// Submits the increments of `marku-set-count` elements.
///
/// An element that reached `submitted` is never sent again, and an element
/// still `processing` is not picked up by an overlapping invocation.
/// Elements left in `submit-error` are retried by the next invocation.
pub struct WriteBatcher<'a> {
    ctx: BatchContext<'a>,
}

impl<'a> WriteBatcher<'a> {
    /// Creates a write batcher over the given collaborators.
    pub fn new(ctx: BatchContext<'a>) -> Self {
        Self { ctx }
    }

    /// Scans the page for pending write elements and submits all of their
    /// increments in one call.
    ///
    /// Elements sharing a key contribute separate entries. The outcome of
    /// the call applies to the whole batch. Dropping the returned future
    /// before the call completes leaves the batch in `submit-error`.
    pub async fn submit_increments(
        &self,
        page: &dyn PageContext,
        config: &Config,
    ) -> BatchOutcome {
        let pending: Vec<ElementRef> = find_write_targets(page)
            .into_iter()
            .filter(|element| !WriteState::excludes_from_batch(element.as_ref()))
            .collect();
        if pending.is_empty() {
            info!("no new elements with {WRITE_MARKER} attribute found");
            return BatchOutcome::NothingToDo;
        }
        debug!(count = pending.len(), "found new set-counter elements");

        let mut contributing: Vec<(String, ElementRef)> = Vec::with_capacity(pending.len());
        let mut counters = Vec::with_capacity(pending.len());
        for element in pending {
            let Some(key) = counter_key(element.as_ref(), WRITE_MARKER) else {
                warn!(element = ?element, "element has empty {WRITE_MARKER} attribute");
                self.ctx.stats.record_skipped();
                continue;
            };
            let increment = parse_increment(element.as_ref());
            WriteState::Processing.apply(element.as_ref());
            counters.push(CounterIncrement {
                key: key.clone(),
                increment,
            });
            contributing.push((key, element));
        }
        if counters.is_empty() {
            return BatchOutcome::NothingToDo;
        }
        let in_flight = InFlight::new(
            contributing.iter().map(|(_, element)| element.clone()).collect(),
            |element| WriteState::SubmitError.apply(element),
        );

        let request = BatchWriteRequest {
            site_id: config.site_id.clone(),
            url: page.current_path(config.include_query),
            counters,
        };
        let result = self
            .ctx
            .call(config, async {
                self.ctx.stats.record_write_batch();
                self.ctx.transport.batch_write(config, &request).await
            })
            .await
            .and_then(BatchResponse::ensure_success);
        in_flight.settle();

        let entries = request.counters.len();
        let elements = contributing.len();
        match result {
            Ok(_) => {
                for (key, element) in contributing {
                    WriteState::Submitted.apply(element.as_ref());
                    let increment = parse_increment(element.as_ref());
                    self.ctx
                        .events
                        .emit(&CounterEvent::Submitted { key, increment });
                }
                self.ctx.stats.record_submitted(elements);
                info!(entries, "all set-counters processed");
                BatchOutcome::Succeeded {
                    keys: entries,
                    elements,
                }
            }
            Err(err) => {
                error!(error = %err, entries, "failed to submit counters batch");
                for (key, element) in contributing {
                    WriteState::SubmitError.apply(element.as_ref());
                    self.ctx.events.emit(&CounterEvent::SubmitError { key });
                }
                self.ctx.stats.record_transport_failure();
                self.ctx.stats.record_submit_failed(elements);
                BatchOutcome::Failed {
                    keys: entries,
                    elements,
                    reason: err.to_string(),
                }
            }
        }
    }
}
