//! Process-level counters and gauges for the realtime subsystem.

use metrics::{counter, gauge, histogram};

pub fn record_session_created() {
    counter!("shotcoach_sessions_created_total").increment(1);
}

pub fn record_session_reaped() {
    counter!("shotcoach_sessions_reaped_total").increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!("shotcoach_active_sessions").set(count as f64);
}

pub fn record_analysis_cycle(latency_ms: f64) {
    counter!("shotcoach_analysis_cycles_total").increment(1);
    histogram!("shotcoach_analysis_latency_ms").record(latency_ms);
}

pub fn record_advice_emitted(category: &'static str) {
    counter!("shotcoach_advice_emitted_total", "category" => category).increment(1);
}

pub fn record_client_message(kind: &'static str) {
    counter!("shotcoach_client_messages_total", "kind" => kind).increment(1);
}

pub fn record_delivery_failure() {
    counter!("shotcoach_delivery_failures_total").increment(1);
}
