use tracing::{Span, field};

use super::TraceId;

/// Create a root span for a command / sweep / job
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id.as_str(),
        prefix = field::Empty,
        token = field::Empty
    )
}

/// Fill the namespace and token fields on the current span.
pub fn annotate_span(prefix: &str, token: Option<&str>) {
    let span = Span::current();
    span.record("prefix", field::display(prefix));
    if let Some(token) = token {
        span.record("token", field::display(token));
    }
}
