//! Basic example showing call tracing and pool monitoring.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;

use db_trace_monitor::prelude::*;
use db_trace_monitor::{LocalPoolMonitor, PoolEvent, PoolEventKind};
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,db_trace_monitor=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Option 1: Default MySQL tracer (select columns hidden)
    let wrapper = TracerWrapper::mysql();

    // Option 2: Custom configuration with inlined argument values
    // let wrapper = TracerWrapper::new(
    //     TracerConfig::mysql()
    //         .with_instance("orders-primary")
    //         .with_user("app")
    //         .with_option(QueryBuilderOption::RawQuery),
    // );

    // A stand-in for a real driver call.
    let query = wrapper.wrap_query(|sql: String, args: Vec<String>| async move {
        tracing::info!(%sql, ?args, "driver received");
        Ok::<_, std::io::Error>(vec![("a", 1)])
    });

    let rows = query
        .call("SELECT name, total FROM orders WHERE id = ?", vec!["42".to_string()])
        .instrument(tracing::info_span!("request", path = "/orders"))
        .await?;
    tracing::info!(rows = rows.len(), "query finished");

    // Pool monitoring: feed driver events to a local monitor.
    let monitor = Arc::new(LocalPoolMonitor::new());
    let on_event = PoolEventHandler::from_env(monitor.clone()).into_callback();
    for kind in [
        PoolEventKind::PoolCreated,
        PoolEventKind::ConnectionCreated,
        PoolEventKind::GetSucceeded,
    ] {
        on_event(&PoolEvent::from(kind).with_address("127.0.0.1:3306"));
    }
    tracing::info!(snapshot = ?monitor.snapshot(), "pool state");

    Ok(())
}
