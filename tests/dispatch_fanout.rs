//! Fan-out dispatch behavior: failure isolation, cancellation, join-all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use chorus_harness::catalog::ModelDescriptor;
use chorus_harness::dispatch::dispatch_chat;
use chorus_harness::gateway::types::{ChatRequest, FragmentStream};
use chorus_harness::gateway::{Attribution, ChatGateway, ProviderError};
use chorus_harness::resolver::ResolvedTarget;
use chorus_harness::sink::{PanelSink, PlainFormatter, ResultSink, TargetPhase};

/// What one scripted model does when asked to stream.
#[derive(Clone)]
enum Behavior {
    /// Yield these fragments, pausing between them.
    Stream { fragments: Vec<String>, delay_ms: u64 },
    /// Fail before the first fragment.
    FailOpen,
    /// Yield these fragments, then fail mid-stream.
    FailMid { fragments: Vec<String> },
    /// Yield one fragment, then trip the shared cancel flag before the next.
    TripCancel { flag: Arc<AtomicBool> },
}

struct ScriptedGateway {
    behaviors: HashMap<String, Behavior>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    fn new(behaviors: Vec<(&str, Behavior)>) -> Self {
        Self {
            behaviors: behaviors
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn list_models(&self, filter: Option<&str>) -> Result<Vec<String>, ProviderError> {
        let mut ids: Vec<String> = self.behaviors.keys().cloned().collect();
        ids.sort();
        Ok(match filter {
            Some(f) => ids.into_iter().filter(|id| id == f).collect(),
            None => ids,
        })
    }

    async fn stream_chat(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(&req.model)
            .cloned()
            .ok_or_else(|| ProviderError::model_unavailable(req.model.clone()))?;

        match behavior {
            Behavior::Stream { fragments, delay_ms } => {
                let items: Vec<Result<String, ProviderError>> =
                    fragments.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(items).then(move |item| async move {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    item
                })))
            }
            Behavior::FailOpen => Err(ProviderError::provider("test", "open failed", false)),
            Behavior::FailMid { fragments } => {
                let mut items: Vec<Result<String, ProviderError>> =
                    fragments.into_iter().map(Ok).collect();
                items.push(Err(ProviderError::stream("connection reset")));
                Ok(Box::pin(stream::iter(items)))
            }
            Behavior::TripCancel { flag } => {
                let items = vec![
                    (Some("first ".to_string()), Some(flag)),
                    (Some("second".to_string()), None),
                ];
                Ok(Box::pin(stream::iter(items).map(|(text, trip)| {
                    if let Some(flag) = trip {
                        flag.store(true, Ordering::Relaxed);
                    }
                    Ok::<_, ProviderError>(text.unwrap_or_default())
                })))
            }
        }
    }
}

fn target(id: &str) -> ResolvedTarget {
    ResolvedTarget {
        descriptor: ModelDescriptor::synthesized(id),
        model_id: id.to_string(),
    }
}

#[tokio::test]
async fn one_failing_target_does_not_block_or_taint_siblings() {
    let gateway = ScriptedGateway::new(vec![
        (
            "vendor/alpha",
            Behavior::Stream {
                fragments: vec!["Hel".into(), "lo".into()],
                delay_ms: 10,
            },
        ),
        ("vendor/broken", Behavior::FailOpen),
        (
            "vendor/gamma",
            Behavior::Stream {
                fragments: vec!["World".into()],
                delay_ms: 0,
            },
        ),
    ]);
    let sink = PanelSink::new(PlainFormatter);
    let targets = vec![
        target("vendor/alpha"),
        target("vendor/broken"),
        target("vendor/gamma"),
    ];

    let outcomes = dispatch_chat(
        &gateway,
        &targets,
        "question",
        &sink,
        Attribution::new("test"),
        None,
    )
    .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].text, "Hello");
    assert!(!outcomes[0].is_error);
    assert!(outcomes[1].is_error);
    assert!(outcomes[1].text.contains("Error:"));
    assert_eq!(outcomes[2].text, "World");

    assert_eq!(sink.target("alpha").unwrap().phase, TargetPhase::Complete);
    assert_eq!(sink.target("broken").unwrap().phase, TargetPhase::Failed);
    assert_eq!(sink.target("gamma").unwrap().phase, TargetPhase::Complete);
}

#[tokio::test]
async fn mid_stream_failure_discards_partial_output() {
    let gateway = ScriptedGateway::new(vec![(
        "vendor/flaky",
        Behavior::FailMid {
            fragments: vec!["partial ".into(), "output".into()],
        },
    )]);
    let sink = PanelSink::new(PlainFormatter);
    let targets = vec![target("vendor/flaky")];

    let outcomes = dispatch_chat(
        &gateway,
        &targets,
        "question",
        &sink,
        Attribution::new("test"),
        None,
    )
    .await;

    assert!(outcomes[0].is_error);
    let state = sink.target("flaky").unwrap();
    assert_eq!(state.phase, TargetPhase::Failed);
    // The error string replaces, not appends to, the accumulated text.
    assert!(!state.text.contains("partial"));
    assert!(state.text.contains("Error:"));
}

#[tokio::test]
async fn per_target_accumulation_is_monotonic() {
    struct RecordingSink {
        updates: Mutex<Vec<(String, String)>>,
    }
    impl ResultSink for RecordingSink {
        fn register_target(&self, _name: &str) {}
        fn set_user_message(&self, _text: &str) {}
        fn update_target(&self, name: &str, text: &str) {
            self.updates
                .lock()
                .unwrap()
                .push((name.to_string(), text.to_string()));
        }
        fn complete_target(&self, _name: &str, _text: &str, _is_error: bool) {}
        fn set_visibility(&self, _name: &str, _visible: bool) {}
        fn clear(&self) {}
        fn reset_targets(&self) {}
    }

    let gateway = ScriptedGateway::new(vec![
        (
            "vendor/a",
            Behavior::Stream {
                fragments: vec!["1".into(), "2".into(), "3".into()],
                delay_ms: 5,
            },
        ),
        (
            "vendor/b",
            Behavior::Stream {
                fragments: vec!["x".into(), "y".into()],
                delay_ms: 3,
            },
        ),
    ]);
    let sink = RecordingSink {
        updates: Mutex::new(Vec::new()),
    };
    let targets = vec![target("vendor/a"), target("vendor/b")];

    dispatch_chat(
        &gateway,
        &targets,
        "q",
        &sink,
        Attribution::new("test"),
        None,
    )
    .await;

    // Updates for one target extend its previous accumulation; interleaving
    // across targets is unconstrained and not asserted.
    let updates = sink.updates.lock().unwrap();
    let mut last: HashMap<&str, &str> = HashMap::new();
    for (name, text) in updates.iter() {
        if let Some(prev) = last.get(name.as_str()) {
            assert!(
                text.starts_with(prev),
                "{name}: {text:?} does not extend {prev:?}"
            );
        }
        last.insert(name, text);
    }
    assert_eq!(last.get("a").copied(), Some("123"));
    assert_eq!(last.get("b").copied(), Some("xy"));
}

#[tokio::test]
async fn pre_set_cancel_flag_fails_every_target_without_calls() {
    let gateway = ScriptedGateway::new(vec![(
        "vendor/a",
        Behavior::Stream {
            fragments: vec!["never".into()],
            delay_ms: 0,
        },
    )]);
    let sink = PanelSink::new(PlainFormatter);
    let targets = vec![target("vendor/a")];
    let cancel = AtomicBool::new(true);

    let outcomes = dispatch_chat(
        &gateway,
        &targets,
        "q",
        &sink,
        Attribution::new("test"),
        Some(&cancel),
    )
    .await;

    assert!(outcomes[0].is_error);
    assert!(outcomes[0].text.contains("cancelled"));
    // The slot still registered so the panel shows the column.
    assert_eq!(sink.target("a").unwrap().phase, TargetPhase::Failed);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn cancel_mid_stream_stops_forwarding_but_leaves_settled_siblings_alone() {
    let cancel = Arc::new(AtomicBool::new(false));
    let gateway = ScriptedGateway::new(vec![
        (
            "vendor/done",
            Behavior::Stream {
                fragments: vec!["finished".into()],
                delay_ms: 0,
            },
        ),
        (
            "vendor/slow",
            Behavior::TripCancel {
                flag: cancel.clone(),
            },
        ),
    ]);
    let sink = PanelSink::new(PlainFormatter);
    let targets = vec![target("vendor/done"), target("vendor/slow")];

    let outcomes = dispatch_chat(
        &gateway,
        &targets,
        "q",
        &sink,
        Attribution::new("test"),
        Some(cancel.as_ref()),
    )
    .await;

    // The fast sibling settled before the flag fired and keeps its result.
    assert!(!outcomes[0].is_error);
    assert_eq!(outcomes[0].text, "finished");

    // The cancelled target forwarded nothing after the flag and shows the
    // cancellation error instead of its partial text.
    assert!(outcomes[1].is_error);
    let state = sink.target("slow").unwrap();
    assert_eq!(state.phase, TargetPhase::Failed);
    assert!(!state.text.contains("second"));
}
