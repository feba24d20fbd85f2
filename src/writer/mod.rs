// VictoriaMetrics HTTP writer

mod client;
mod sink;

pub use client::{Delivery, VictoriaMetricsWriter, WriterConfig};
pub use sink::MetricSink;
