//! Custom tracing layers for hostmap

use tracing::{Subscriber, span};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonlConfig;
use crate::context::{HostContextData, HostContextGuard};

/// Layer that attaches the current host context to new spans
///
/// Spans opened while a [`HostContextGuard`] is alive get a
/// [`HostContextExtension`], so anything walking the span tree later (the
/// JSON formatter's span list, custom layers) can tell which host the work
/// belonged to even after the guard is gone.
#[derive(Debug, Default)]
pub struct HostContextLayer;

impl HostContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct HostContextExtension {
    pub data: HostContextData,
}

impl<S> Layer<S> for HostContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let data = HostContextGuard::current().or_else(|| {
            // Inherit from the parent so nested spans keep their host
            span.parent().and_then(|parent| {
                parent
                    .extensions()
                    .get::<HostContextExtension>()
                    .map(|ext| ext.data.clone())
            })
        });
        if let Some(data) = data {
            span.extensions_mut().insert(HostContextExtension { data });
        }
    }
}

/// Create a JSONL formatting layer writing to `writer`
pub fn jsonl_layer<S, W>(
    writer: W,
    config: &JsonlConfig,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostmap_core::HostAddress;
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::SubscriberExt;

    fn host_of(span: &tracing::Span) -> Option<String> {
        span.with_subscriber(|(id, dispatch)| {
            let registry = dispatch.downcast_ref::<Registry>()?;
            let data = registry.span(id)?;
            let extensions = data.extensions();
            extensions
                .get::<HostContextExtension>()
                .map(|ext| ext.data.host.clone())
        })
        .flatten()
    }

    #[test]
    fn test_span_carries_host_context() {
        let subscriber = Registry::default().with(HostContextLayer::new());
        tracing::subscriber::with_default(subscriber, || {
            let bare = tracing::info_span!("bare");
            assert_eq!(host_of(&bare), None);

            let address: HostAddress = "10.0.0.3".parse().unwrap();
            let guard = HostContextGuard::for_address(&address);
            let probe = tracing::info_span!("probe");
            drop(guard);

            // Children inherit after the guard is gone
            let _entered = probe.enter();
            let merge = tracing::info_span!("merge");

            assert_eq!(host_of(&probe), Some("10.0.0.3".to_string()));
            assert_eq!(host_of(&merge), Some("10.0.0.3".to_string()));
        });
    }
}
