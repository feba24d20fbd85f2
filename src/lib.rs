// VictoriaMetrics exporter: entity state changes to InfluxDB line protocol over HTTP

pub mod api;
pub mod config;
pub mod export;
pub mod line;
pub mod state;
pub mod subscription;
pub mod writer;
