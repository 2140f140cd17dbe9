//! Counter whose value survives process restarts. Run it a few times:
//! `cargo run -p stash-persist --example counter`

use anyhow::Result;
use serde_json::{json, Value};
use stash_core::{keys::RawKey, State};
use stash_persist::adapter::{Action, Persist};
use stash_storage::file_store::FileStorage;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn counter_reducer(state: Option<&State>, action: &Action) -> State {
    let mut next = state.cloned().unwrap_or_else(|| {
        let mut initial = State::new();
        initial.insert("counter".into(), json!({"count": 0}));
        initial
    });
    if action.kind == "bump" {
        let count = next
            .get("counter")
            .and_then(|slice| slice.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        next.insert("counter".into(), json!({"count": count + 1}));
    }
    next
}

fn main() -> Result<()> {
    init_tracing();

    let data_dir = std::env::temp_dir().join("stash-counter-demo");
    let reducer = Persist::new(vec![RawKey::bare("counter")], FileStorage::new(&data_dir))?
        .rehydrate_on_start(true)
        .wrap(counter_reducer)?;

    let state = reducer.reduce(None, &Action::init());
    let state = reducer.reduce(Some(&state), &Action::new("bump"));

    println!(
        "count is now {} (persisted under {})",
        state
            .get("counter")
            .and_then(|slice| slice.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0),
        data_dir.display()
    );
    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
