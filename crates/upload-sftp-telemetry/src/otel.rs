//! OTel internals: tracing layer and sampling.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::{ExporterBuildError, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider, ShouldSample, SpanLimits};
use tracing_opentelemetry::OpenTelemetryLayer;

/// Guard that shuts down the OTel tracer provider on drop, flushing pending spans.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Build an OpenTelemetry tracing layer and guard.
///
/// Must be called inside a Tokio runtime: the batch processor and the tonic
/// channel both spawn onto it.
pub fn otel_layer<S>(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<S, opentelemetry_sdk::trace::SdkTracer>, OtelGuard), ExporterBuildError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let exporter = SpanExporter::builder().with_tonic().build()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(UploadSampler)
        .with_resource(resource)
        .with_span_limits(SpanLimits::default())
        .build();

    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer("upload-sftp");
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok((layer, OtelGuard { provider }))
}

/// Sampling rate for a span, before parent and error overrides.
///
/// | Span                         | Rate | Rationale                         |
/// |------------------------------|------|-----------------------------------|
/// | `ssh.*`                      | 100% | One per connection / auth attempt |
/// | `upload.*`                   | 100% | One per completed file            |
/// | `sftp.request` verb=`WRITE`  |   1% | One per 32 KiB chunk              |
/// | `sftp.request` (other verbs) |  10% | Moderate volume                   |
/// | other                        |  10% | Default for unclassified spans    |
fn rate_for(name: &str, attributes: &[KeyValue]) -> f64 {
    if name.starts_with("ssh") || name.starts_with("upload") {
        return 1.0;
    }
    if name == "sftp.request" {
        let is_write = attributes
            .iter()
            .any(|kv| kv.key.as_str() == "verb" && kv.value.as_str() == "WRITE");
        return if is_write { 0.01 } else { 0.1 };
    }
    0.1
}

/// Custom sampler with differentiated rates by span category.
#[derive(Debug, Clone)]
struct UploadSampler;

impl ShouldSample for UploadSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        // If parent is sampled, always sample (maintain trace continuity)
        if let Some(cx) = parent_context {
            let parent_span = cx.span();
            let parent_ctx = parent_span.span_context();
            if parent_ctx.is_sampled() {
                return SamplingResult {
                    decision: SamplingDecision::RecordAndSample,
                    attributes: vec![],
                    trace_state: parent_ctx.trace_state().clone(),
                };
            }
        }

        let is_error = attributes.iter().any(|kv| {
            (kv.key.as_str() == "otel.status_code" && kv.value.as_str() == "ERROR")
                || (kv.key.as_str() == "error" && kv.value.as_str() == "true")
        });

        if is_error {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: vec![],
                trace_state: TraceState::default(),
            };
        }

        Sampler::TraceIdRatioBased(rate_for(name, attributes)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_sampled_least() {
        let write = [KeyValue::new("verb", "WRITE")];
        let close = [KeyValue::new("verb", "CLOSE")];
        assert_eq!(rate_for("sftp.request", &write), 0.01);
        assert_eq!(rate_for("sftp.request", &close), 0.1);
        assert_eq!(rate_for("ssh.auth", &[]), 1.0);
        assert_eq!(rate_for("upload.delivered", &[]), 1.0);
    }
}
