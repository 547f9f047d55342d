//! Batch read: one request for every distinct key on the page.

use crate::batch::{BatchContext, BatchOutcome, InFlight};
use crate::config::Config;
use crate::events::CounterEvent;
use crate::page::{
    counter_key, find_read_targets, ElementRef, PageContext, ReadState, READ_MARKER,
};
use crate::transport::{BatchReadRequest, BatchResponse};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Loads the counts displayed by `marku-get-count` elements.
///
/// Elements sharing a key are fetched once and updated together: after an
/// invocation either all of them are `loaded` with the same text or all of
/// them are `error`.
pub struct ReadBatcher<'a> {
    ctx: BatchContext<'a>,
}

impl<'a> ReadBatcher<'a> {
    /// Creates a read batcher over the given collaborators.
    pub fn new(ctx: BatchContext<'a>) -> Self {
        Self { ctx }
    }

    /// Scans the page, fetches every distinct key in one call and fans the
    /// results out to the bound elements.
    ///
    /// Keys the server does not return are shown as 0. Any failure of the
    /// call marks every requested element `error`, and so does dropping the
    /// returned future before the call completes.
    pub async fn load_counts(&self, page: &dyn PageContext, config: &Config) -> BatchOutcome {
        let elements = find_read_targets(page);
        if elements.is_empty() {
            info!("no elements with {READ_MARKER} attribute found");
            return BatchOutcome::NothingToDo;
        }
        debug!(count = elements.len(), "found counter elements");

        let (keys, mut bound) = self.group_by_key(elements);
        if keys.is_empty() {
            return BatchOutcome::NothingToDo;
        }
        let element_count: usize = bound.values().map(Vec::len).sum();
        let in_flight = InFlight::new(bound.values().flatten().cloned().collect(), |element| {
            ReadState::Error.apply(element)
        });

        let request = BatchReadRequest {
            site_id: config.site_id.clone(),
            keys,
            url: page.current_path(config.include_query),
        };
        let counts = self
            .ctx
            .call(config, async {
                self.ctx.stats.record_read_batch();
                self.ctx.transport.batch_read(config, &request).await
            })
            .await
            .and_then(BatchResponse::into_counts);
        in_flight.settle();

        match counts {
            Ok(counts) => {
                for key in &request.keys {
                    let count = counts.get(key).copied().unwrap_or(0);
                    let text = count.to_string();
                    for element in bound.remove(key).unwrap_or_default() {
                        element.set_text(&text);
                        ReadState::Loaded.apply(element.as_ref());
                        self.ctx.events.emit(&CounterEvent::Loaded {
                            key: key.clone(),
                            count,
                        });
                    }
                }
                self.ctx.stats.record_loaded(element_count);
                info!(
                    keys = request.keys.len(),
                    elements = element_count,
                    "all counters loaded"
                );
                BatchOutcome::Succeeded {
                    keys: request.keys.len(),
                    elements: element_count,
                }
            }
            Err(err) => {
                error!(error = %err, keys = request.keys.len(), "failed to fetch counters batch");
                for key in &request.keys {
                    for element in bound.remove(key).unwrap_or_default() {
                        ReadState::Error.apply(element.as_ref());
                        self.ctx
                            .events
                            .emit(&CounterEvent::Error { key: key.clone() });
                    }
                }
                self.ctx.stats.record_transport_failure();
                self.ctx.stats.record_failed(element_count);
                BatchOutcome::Failed {
                    keys: request.keys.len(),
                    elements: element_count,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Returns the distinct keys in first-seen order and the elements bound
    /// to each, marking every keyed element `loading`.
    fn group_by_key(
        &self,
        elements: Vec<ElementRef>,
    ) -> (Vec<String>, HashMap<String, Vec<ElementRef>>) {
        let mut keys = Vec::new();
        let mut bound: HashMap<String, Vec<ElementRef>> = HashMap::new();

        for element in elements {
            let Some(key) = counter_key(element.as_ref(), READ_MARKER) else {
                warn!(element = ?element, "element has empty {READ_MARKER} attribute");
                self.ctx.stats.record_skipped();
                continue;
            };
            ReadState::Loading.apply(element.as_ref());
            match bound.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().push(element),
                Entry::Vacant(entry) => {
                    keys.push(entry.key().clone());
                    entry.insert(vec![element]);
                }
            }
        }
        (keys, bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::events::EventBus;
    use crate::page::memory::{MemoryElement, MemoryPage};
    use crate::page::NoDocument;
    use crate::stats::EngineStats;
    use crate::transport::mock::{Reply, ScriptedTransport};
    use crate::transport::CounterEntry;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn reader(page: &MemoryPage, key: &str) -> Arc<MemoryElement> {
        page.append(MemoryElement::new().with_attr(READ_MARKER, key).with_text("-"))
    }

    fn entry(key: &str, num: i64) -> CounterEntry {
        CounterEntry {
            key: key.into(),
            num: Some(num),
        }
    }

    fn config() -> Config {
        Config::new("site1", "https://count.example")
    }

    fn record(events: &EventBus) -> Arc<Mutex<Vec<CounterEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        seen
    }

    #[tokio::test]
    async fn test_no_elements_is_noop() {
        let transport = ScriptedTransport::new();
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        let outcome = batcher.load_counts(&NoDocument, &config()).await;

        assert_eq!(outcome, BatchOutcome::NothingToDo);
        assert_eq!(transport.read_count(), 0);
    }

    #[tokio::test]
    async fn test_one_call_for_many_elements() {
        let page = MemoryPage::new();
        let a1 = reader(&page, "a");
        let b = reader(&page, "b");
        let a2 = reader(&page, "a");
        let transport = ScriptedTransport::new()
            .then_read(Reply::Respond(BatchResponse::success(vec![
                entry("a", 5),
                entry("b", 7),
            ])));
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        let outcome = batcher.load_counts(&page, &config()).await;

        assert_eq!(
            outcome,
            BatchOutcome::Succeeded {
                keys: 2,
                elements: 3
            }
        );
        assert_eq!(transport.read_count(), 1);
        assert_eq!(transport.last_read().keys, vec!["a", "b"]);
        assert_eq!(transport.last_read().site_id, "site1");
        assert_eq!(a1.text(), "5");
        assert_eq!(a2.text(), "5");
        assert_eq!(b.text(), "7");
        for element in [&a1, &a2, &b] {
            assert_eq!(element.classes(), vec!["marku-loaded".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_missing_key_counts_as_zero() {
        let page = MemoryPage::new();
        let a = reader(&page, "a");
        let b = reader(&page, "b");
        let transport = ScriptedTransport::new()
            .then_read(Reply::Respond(BatchResponse::success(vec![entry("a", 5)])));
        let events = EventBus::new();
        let seen = record(&events);
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        batcher.load_counts(&page, &config()).await;

        assert_eq!(a.text(), "5");
        assert_eq!(b.text(), "0");
        assert_eq!(ReadState::of(&*a), Some(ReadState::Loaded));
        assert_eq!(ReadState::of(&*b), Some(ReadState::Loaded));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                CounterEvent::Loaded {
                    key: "a".into(),
                    count: 5
                },
                CounterEvent::Loaded {
                    key: "b".into(),
                    count: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_envelope_fails_every_key() {
        let page = MemoryPage::new();
        let a = reader(&page, "a");
        let b1 = reader(&page, "b");
        let b2 = reader(&page, "b");
        let mut response = BatchResponse::success(vec![entry("a", 5)]);
        response.code = 500;
        let transport = ScriptedTransport::new().then_read(Reply::Respond(response));
        let events = EventBus::new();
        let seen = record(&events);
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        let outcome = batcher.load_counts(&page, &config()).await;

        assert!(!outcome.is_success());
        for element in [&a, &b1, &b2] {
            assert_eq!(ReadState::of(&**element), Some(ReadState::Error));
            assert_eq!(element.text(), "-");
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(CounterEvent::is_failure));
        assert_eq!(stats.snapshot().elements_failed, 3);
    }

    #[tokio::test]
    async fn test_transport_error_fails_every_key() {
        let page = MemoryPage::new();
        let a = reader(&page, "a");
        let transport =
            ScriptedTransport::new().then_read(Reply::Fail(TransportError::Status(502)));
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        let outcome = batcher.load_counts(&page, &config()).await;

        match outcome {
            BatchOutcome::Failed { reason, .. } => assert!(reason.contains("502")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ReadState::of(&*a), Some(ReadState::Error));
        assert_eq!(stats.snapshot().transport_failures, 1);
    }

    #[tokio::test]
    async fn test_empty_key_is_skipped() {
        let page = MemoryPage::new();
        let empty = reader(&page, "");
        let a = reader(&page, "a");
        let transport = ScriptedTransport::new();
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        batcher.load_counts(&page, &config()).await;

        assert!(empty.classes().is_empty());
        assert_eq!(empty.text(), "-");
        assert_eq!(ReadState::of(&*a), Some(ReadState::Loaded));
        assert_eq!(transport.last_read().keys, vec!["a"]);
        assert_eq!(stats.snapshot().elements_skipped, 1);
    }

    #[tokio::test]
    async fn test_only_empty_keys_makes_no_call() {
        let page = MemoryPage::new();
        reader(&page, "");
        let transport = ScriptedTransport::new();
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        let outcome = batcher.load_counts(&page, &config()).await;

        assert_eq!(outcome, BatchOutcome::NothingToDo);
        assert_eq!(transport.read_count(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_config_never_reaches_transport() {
        let page = MemoryPage::new();
        let a = reader(&page, "a");
        let transport = ScriptedTransport::new();
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        let outcome = batcher
            .load_counts(&page, &Config::new("site1", ""))
            .await;

        assert!(!outcome.is_success());
        assert_eq!(transport.read_count(), 0);
        assert_eq!(stats.snapshot().read_batches, 0);
        assert_eq!(ReadState::of(&*a), Some(ReadState::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_error() {
        let page = MemoryPage::new();
        let a = reader(&page, "a");
        let transport = ScriptedTransport::new().then_read(Reply::Hang);
        let events = EventBus::new();
        let stats = EngineStats::new();
        let ctx =
            BatchContext::new(&transport, &events, &stats).with_timeout(Duration::from_secs(10));

        let outcome = ReadBatcher::new(ctx).load_counts(&page, &config()).await;

        assert!(!outcome.is_success());
        assert_eq!(ReadState::of(&*a), Some(ReadState::Error));
    }

    #[tokio::test]
    async fn test_reload_resets_previous_state() {
        let page = MemoryPage::new();
        let a = reader(&page, "a");
        let transport = ScriptedTransport::new()
            .then_read(Reply::Fail(TransportError::Request("offline".into())))
            .then_read(Reply::Respond(BatchResponse::success(vec![entry("a", 9)])));
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        batcher.load_counts(&page, &config()).await;
        assert_eq!(ReadState::of(&*a), Some(ReadState::Error));

        batcher.load_counts(&page, &config()).await;
        assert_eq!(a.classes(), vec!["marku-loaded".to_string()]);
        assert_eq!(a.text(), "9");
        assert_eq!(transport.read_count(), 2);
    }

    #[tokio::test]
    async fn test_keys_are_case_sensitive() {
        let page = MemoryPage::new();
        reader(&page, "Views");
        reader(&page, "views");
        let transport = ScriptedTransport::new();
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        batcher.load_counts(&page, &config()).await;

        assert_eq!(transport.last_read().keys, vec!["Views", "views"]);
    }

    #[tokio::test]
    async fn test_page_path_is_sent() {
        let page = MemoryPage::with_location("https://blog.example/post?id=3").unwrap();
        reader(&page, "a");
        let transport = ScriptedTransport::new();
        let events = EventBus::new();
        let stats = EngineStats::new();
        let batcher = ReadBatcher::new(BatchContext::new(&transport, &events, &stats));

        batcher
            .load_counts(&page, &config().with_include_query(false))
            .await;

        assert_eq!(transport.last_read().url.as_deref(), Some("/post"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_invocation_marks_error() {
        let page = MemoryPage::new();
        let a1 = reader(&page, "a");
        let a2 = reader(&page, "a");
        let transport = ScriptedTransport::new().then_read(Reply::Hang);
        let events = EventBus::new();
        let stats = EngineStats::new();
        let ctx =
            BatchContext::new(&transport, &events, &stats).with_timeout(Duration::from_secs(10));
        let batcher = ReadBatcher::new(ctx);
        let config = config();

        let cancelled =
            tokio::time::timeout(Duration::from_secs(1), batcher.load_counts(&page, &config))
                .await;

        assert!(cancelled.is_err());
        assert_eq!(ReadState::of(&*a1), Some(ReadState::Error));
        assert_eq!(ReadState::of(&*a2), Some(ReadState::Error));
        assert_eq!(a1.text(), "-");
    }
}
