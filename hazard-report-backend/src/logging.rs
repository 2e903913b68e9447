//! Logging things
//!

use std::time::Duration;

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::Response;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{OnRequest, OnResponse, TraceLayer},
};
use tracing::{trace, warn, Span};

#[derive(Copy, Clone)]
pub(crate) struct ReportSpanner {}

impl<B> tower_http::trace::MakeSpan<B> for ReportSpanner {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            bytes = tracing::field::Empty,
            content_type = tracing::field::Empty
        )
    }
}

impl<B> OnRequest<B> for ReportSpanner {
    fn on_request(&mut self, request: &axum::http::Request<B>, _span: &Span) {
        trace!(query = ?request.uri().query(), "request received");
    }
}

impl<B> OnResponse<B> for ReportSpanner {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        span.record("status", response.status().as_u16());
        span.record("latency_ms", latency.as_millis() as u64);
        // streamed PDFs have no length up front
        if let Some(content_length) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
        {
            span.record("bytes", content_length);
        }
        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            span.record("content_type", content_type);
        }
        if response.status().is_server_error() {
            warn!("response sent with server error");
        } else {
            tracing::event!(tracing::Level::INFO, "response sent");
        }
    }
}

pub(crate) fn logging_layer(
) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, ReportSpanner, ReportSpanner, ReportSpanner>
{
    TraceLayer::new_for_http()
        .on_request(ReportSpanner {})
        .make_span_with(ReportSpanner {})
        .on_response(ReportSpanner {})
}
