use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Request-level counters owned by the middleware pipeline. Component
/// gauges (clients, subscribers, cache stats) are pulled at render time.
#[derive(Debug, Default)]
pub struct Metrics {
    requests_total: AtomicU64,
    responses_4xx: AtomicU64,
    responses_5xx: AtomicU64,
    rate_limited_total: AtomicU64,
    panics_recovered_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self, status: u16) {
        match status {
            400..=499 => {
                self.responses_4xx.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.responses_5xx.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics_recovered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn rate_limited_total(&self) -> u64 {
        self.rate_limited_total.load(Ordering::Relaxed)
    }

    /// Plaintext `key value` rendering; `extra` carries component gauges.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "http_requests_total {}",
            self.requests_total.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "http_responses_4xx_total {}",
            self.responses_4xx.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "http_responses_5xx_total {}",
            self.responses_5xx.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "http_rate_limited_total {}",
            self.rate_limited_total.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "http_panics_recovered_total {}",
            self.panics_recovered_total.load(Ordering::Relaxed)
        );
        for (key, value) in extra {
            let _ = writeln!(out, "{key} {value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_plaintext_key_value() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_status(404);
        metrics.record_rate_limited();

        let text = metrics.render(&[("ws_clients", 3)]);
        assert!(text.contains("http_requests_total 2\n"));
        assert!(text.contains("http_responses_4xx_total 1\n"));
        assert!(text.contains("http_rate_limited_total 1\n"));
        assert!(text.contains("ws_clients 3\n"));
    }
}
