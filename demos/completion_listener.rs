//! A plugin with one async completion handler and one async `on_modified` handler,
//! driven by a simulated host thread.
//!
//! Run with `RUST_LOG=debug cargo run --example completion_listener`.

use std::thread;
use std::time::Duration;

use plugbridge::host::{QueryRequest, ViewId};
use plugbridge::plugin::PluginBridge;
use plugbridge::runtime::HandlerError;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bridge = PluginBridge::default();
    bridge.on_load()?;

    let on_query_completions = bridge.query(|_req: QueryRequest| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, HandlerError>(vec!["foo", "bar"])
    });
    let on_modified = bridge.event(|view: ViewId| async move {
        println!("{view} got modified on the background loop!");
        Ok::<(), HandlerError>(())
    });

    // The user types two characters quickly; the first query is superseded.
    on_modified.notify(ViewId(1))?;
    let stale = on_query_completions.query(QueryRequest::new(ViewId(1), "f", vec![1]))?;
    thread::sleep(Duration::from_millis(100));
    on_modified.notify(ViewId(1))?;
    let fresh = on_query_completions.query(QueryRequest::new(ViewId(1), "fo", vec![2]))?;

    // A real host polls its placeholders from the UI thread.
    while !fresh.is_resolved() {
        thread::sleep(Duration::from_millis(50));
    }
    println!("stale: {:?}", stale.snapshot());
    println!("fresh: {:?}", fresh.snapshot());

    bridge.on_unload();
    Ok(())
}
