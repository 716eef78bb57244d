use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging and trace export
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How `serve` logs.  `RUST_LOG` still overrides `log_filter`.
///
/// Turn milestones (`mm_event` lines) are always logged; an OTLP endpoint
/// additionally exports every `turn` span to a collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    /// One JSON object per line; `false` switches to human-readable output.
    #[serde(default = "d_true")]
    pub json_logs: bool,

    /// OTLP/gRPC collector, e.g. `http://localhost:4317`.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Ratio of turns whose spans are exported, `0.0..=1.0`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            json_logs: true,
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

fn d_log_filter() -> String {
    "info,mm_gateway=debug".into()
}

fn d_true() -> bool {
    true
}

fn d_service_name() -> String {
    "murmur".into()
}

fn d_sample_rate() -> f64 {
    1.0
}
