//! A span-capturing subscriber layer for tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Default)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub parent: Option<u64>,
    pub id: u64,
    pub fields: HashMap<&'static str, String>,
    pub closed: bool,
}

impl CapturedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<&'static str, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name(), format!("{value:?}"));
    }
}

#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<CapturedSpan>>>);

impl Captured {
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.0.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }

    fn with_span(&self, id: &Id, f: impl FnOnce(&mut CapturedSpan)) {
        let mut spans = self.0.lock().unwrap();
        if let Some(span) = spans.iter_mut().rev().find(|s| s.id == id.into_u64()) {
            f(span);
        }
    }
}

struct CaptureLayer(Captured);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let parent = if attrs.is_root() {
            None
        } else if let Some(parent) = attrs.parent() {
            Some(parent.into_u64())
        } else {
            ctx.current_span().id().map(Id::into_u64)
        };
        let mut span = CapturedSpan {
            name: attrs.metadata().name(),
            parent,
            id: id.into_u64(),
            ..Default::default()
        };
        attrs.record(&mut FieldVisitor(&mut span.fields));
        self.0 .0.lock().unwrap().push(span);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        self.0
            .with_span(id, |span| values.record(&mut FieldVisitor(&mut span.fields)));
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        self.0.with_span(&id, |span| span.closed = true);
    }
}

/// Install a capturing subscriber for the current thread.
pub fn capture() -> (Captured, DefaultGuard) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(captured.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (captured, guard)
}
