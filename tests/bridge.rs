//! End-to-end behaviour of the bridge as seen from host threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use plugbridge::config::SchedulerConfig;
use plugbridge::diagnostics::MemorySink;
use plugbridge::host::{CompletionFlags, CompletionList, QueryRequest, ViewId};
use plugbridge::plugin::PluginBridge;
use plugbridge::runtime::{Dispatcher, HandlerError, SchedulerError, TaskStatus};
use plugbridge::BackgroundScheduler;

fn bridge_with_sink() -> (PluginBridge, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let bridge = PluginBridge::with_sink(SchedulerConfig::default(), sink.clone());
    bridge.on_load().unwrap();
    (bridge, sink)
}

fn request(prefix: &str) -> QueryRequest {
    QueryRequest::new(ViewId(1), prefix, vec![prefix.len()])
}

fn labels(list: &CompletionList) -> Vec<String> {
    list.items()
        .unwrap_or_default()
        .into_iter()
        .map(|item| item.label)
        .collect()
}

#[tokio::test]
async fn single_query_fills_placeholder_after_delay() {
    let (bridge, sink) = bridge_with_sink();
    let completions = bridge.query(|_req: QueryRequest| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, HandlerError>(vec!["foo", "bar"])
    });

    let list = completions.query(request("f")).unwrap();
    assert!(!list.is_resolved());

    let resolution = list.resolved().await;
    assert_eq!(labels(&list), ["foo", "bar"]);
    assert_eq!(resolution.flags, CompletionFlags::SuppressDefaultFiltering);
    assert!(sink.is_empty());
    bridge.on_unload();
}

#[tokio::test]
async fn second_query_supersedes_first() {
    let (bridge, sink) = bridge_with_sink();
    let completions = bridge.query(|req: QueryRequest| async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok::<_, HandlerError>(vec![req.prefix])
    });

    let first = completions.query(request("q1")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = completions.query(request("q2")).unwrap();

    first.resolved().await;
    second.resolved().await;
    assert!(labels(&first).is_empty());
    assert_eq!(first.flags(), Some(CompletionFlags::None));
    assert_eq!(labels(&second), ["q2"]);
    // Superseded queries are expected, not failures.
    assert!(sink.is_empty());
    bridge.on_unload();
}

#[test]
fn concurrent_host_threads_leave_one_winner() {
    let (bridge, _sink) = bridge_with_sink();
    let completions = Arc::new(bridge.query(|req: QueryRequest| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, HandlerError>(vec![req.prefix])
    }));

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let completions = Arc::clone(&completions);
            thread::spawn(move || {
                (0..20)
                    .map(|i| completions.query(request(&format!("{t}-{i}"))).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let lists: Vec<CompletionList> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while lists.iter().any(|list| !list.is_resolved()) {
        assert!(std::time::Instant::now() < deadline, "queries did not settle");
        thread::sleep(Duration::from_millis(10));
    }

    let winners = lists.iter().filter(|list| !labels(list).is_empty()).count();
    assert_eq!(winners, 1);
    assert_eq!(completions.in_flight(), 0);
    bridge.on_unload();
}

#[tokio::test]
async fn failing_event_is_reported_and_scheduler_keeps_running() {
    let (bridge, sink) = bridge_with_sink();
    let on_modified = bridge.event(|_view: ViewId| async {
        Err::<(), HandlerError>("modified handler failed".into())
    });

    on_modified.notify(ViewId(3)).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(sink.len(), 1);
    assert!(sink.reports()[0].message.contains("modified handler failed"));

    assert!(bridge.scheduler().is_running());
    let handle = bridge.dispatcher().spawn(async { Ok(()) }).unwrap();
    assert_eq!(handle.settled().await, TaskStatus::Completed);
    bridge.on_unload();
}

#[test]
fn submit_without_scheduler_fails_immediately() {
    let dispatcher = Dispatcher::new(Arc::new(BackgroundScheduler::default()));
    let result = dispatcher.spawn(async { Ok(()) });
    assert!(matches!(result, Err(SchedulerError::NoSchedulerRunning)));
}

#[test]
fn nothing_runs_after_shutdown_returns() {
    let (bridge, _sink) = bridge_with_sink();
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = bridge.event({
        let ticks = Arc::clone(&ticks);
        move |_: ()| {
            let ticks = Arc::clone(&ticks);
            async move {
                while ticks.fetch_add(1, Ordering::SeqCst) < usize::MAX - 1 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Ok::<(), HandlerError>(())
            }
        }
    });

    ticker.notify(()).unwrap();
    while ticks.load(Ordering::SeqCst) < 3 {
        thread::sleep(Duration::from_millis(1));
    }

    bridge.on_unload();
    assert!(bridge.scheduler().thread_id().is_none());
    let after_shutdown = ticks.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), after_shutdown);
}

#[test]
fn setup_twice_then_shutdown_without_setup() {
    let bridge = PluginBridge::default();
    bridge.on_load().unwrap();
    let thread_id = bridge.scheduler().thread_id();
    bridge.on_load().unwrap();
    assert_eq!(bridge.scheduler().thread_id(), thread_id);
    bridge.on_unload();

    PluginBridge::default().on_unload();
}
