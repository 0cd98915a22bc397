use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Mutex,
};

use log::{debug, warn};
use serde::Serialize;
use serde_json::json;

/// Events sent to the analytics collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    Join {
        user_id: u64,
    },
    Link {
        user_id: u64,
        kind: String,
    },
    Final {
        user_id: u64,
        score: usize,
        q_total: usize,
        /// Tier name, `None` when no tier matched the score.
        tier: Option<String>,
    },
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::Join { .. } => "join",
            AnalyticsEvent::Link { .. } => "link",
            AnalyticsEvent::Final { .. } => "final",
        }
    }

    pub fn user_id(&self) -> u64 {
        match self {
            AnalyticsEvent::Join { user_id }
            | AnalyticsEvent::Link { user_id, .. }
            | AnalyticsEvent::Final { user_id, .. } => *user_id,
        }
    }

    fn data(&self) -> serde_json::Value {
        match self {
            AnalyticsEvent::Join { .. } => json!({}),
            AnalyticsEvent::Link { kind, .. } => json!({ "kind": kind }),
            AnalyticsEvent::Final {
                score,
                q_total,
                tier,
                ..
            } => json!({
                "score": score,
                "q_total": q_total,
                "tier": tier.as_deref().unwrap_or("none"),
            }),
        }
    }
}

/// Best-effort sink for analytics events. Implementations must never fail the caller.
pub trait Reporter: Send + Sync {
    fn report(&self, event: AnalyticsEvent);
}

/// Counters kept for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub users: usize,
    pub links: BTreeMap<String, usize>,
    pub tiers: BTreeMap<String, usize>,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Users: {}", self.users)?;
        for (kind, count) in &self.links {
            writeln!(f, "Link {}: {}", kind, count)?;
        }
        for (tier, count) in &self.tiers {
            writeln!(f, "Final {}: {}", tier, count)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    users: HashSet<u64>,
    links: BTreeMap<String, usize>,
    tiers: BTreeMap<String, usize>,
}

impl Counters {
    fn record(&mut self, event: &AnalyticsEvent) {
        match event {
            AnalyticsEvent::Join { user_id } => {
                self.users.insert(*user_id);
            }
            AnalyticsEvent::Link { kind, .. } => {
                *self.links.entry(kind.clone()).or_default() += 1;
            }
            AnalyticsEvent::Final { tier, .. } => {
                let tier = tier.clone().unwrap_or_else(|| "none".to_string());
                *self.tiers.entry(tier).or_default() += 1;
            }
        }
    }

    fn stats(&self) -> Stats {
        Stats {
            users: self.users.len(),
            links: self.links.clone(),
            tiers: self.tiers.clone(),
        }
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    token: &'a str,
    event: &'a str,
    user_id: u64,
    data: serde_json::Value,
    ts: i64,
}

/// Posts events to an HTTP collector and keeps local counters.
///
/// Posting happens on a spawned task. Failures are logged and dropped.
pub struct HttpReporter {
    client: reqwest::Client,
    endpoint: Option<(String, String)>,
    counters: Mutex<Counters>,
}

impl HttpReporter {
    /// Posting is disabled unless both `url` and `token` are set.
    pub fn new(url: Option<String>, token: Option<String>) -> Self {
        let endpoint = match (url, token) {
            (Some(url), Some(token)) => Some((url, token)),
            _ => None,
        };
        Self {
            client: reqwest::Client::new(),
            endpoint,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn stats(&self) -> Stats {
        match self.counters.lock() {
            Ok(counters) => counters.stats(),
            Err(poisoned) => poisoned.into_inner().stats(),
        }
    }
}

impl Reporter for HttpReporter {
    fn report(&self, event: AnalyticsEvent) {
        match self.counters.lock() {
            Ok(mut counters) => counters.record(&event),
            Err(poisoned) => poisoned.into_inner().record(&event),
        }

        let Some((url, token)) = self.endpoint.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let payload = Payload {
                token: &token,
                event: event.name(),
                user_id: event.user_id(),
                data: event.data(),
                ts: chrono::Utc::now().timestamp_millis(),
            };
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("[analytics] {} delivered", event.name());
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!("[analytics] http {} {}", status, body);
                }
                Err(err) => warn!("[analytics] error: {}", err),
            }
        });
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Keeps every reported event for later assertions.
    #[derive(Default)]
    pub struct RecordingReporter {
        events: Mutex<Vec<AnalyticsEvent>>,
    }

    impl RecordingReporter {
        pub fn events(&self) -> Vec<AnalyticsEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Reporter for RecordingReporter {
        fn report(&self, event: AnalyticsEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn disabled_reporter_still_counts() {
        let reporter = HttpReporter::new(Some("https://collector.example".into()), None);
        assert!(!reporter.is_enabled());

        reporter.report(AnalyticsEvent::Join { user_id: 1 });
        reporter.report(AnalyticsEvent::Join { user_id: 1 });
        reporter.report(AnalyticsEvent::Join { user_id: 2 });
        reporter.report(AnalyticsEvent::Link {
            user_id: 1,
            kind: "tg".into(),
        });
        reporter.report(AnalyticsEvent::Final {
            user_id: 2,
            score: 3,
            q_total: 10,
            tier: None,
        });

        let stats = reporter.stats();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.links.get("tg"), Some(&1));
        assert_eq!(stats.tiers.get("none"), Some(&1));
        assert!(stats.to_string().contains("Users: 2"));
    }

    #[test]
    fn final_payload_carries_score_and_tier() {
        let event = AnalyticsEvent::Final {
            user_id: 7,
            score: 2,
            q_total: 3,
            tier: Some("tier1".into()),
        };
        assert_eq!(event.name(), "final");
        assert_eq!(event.user_id(), 7);
        assert_eq!(
            event.data(),
            json!({ "score": 2, "q_total": 3, "tier": "tier1" })
        );
    }

    #[tokio::test]
    async fn unreachable_collector_is_swallowed() {
        let reporter = HttpReporter::new(
            Some("http://127.0.0.1:9/collect".into()),
            Some("secret".into()),
        );
        assert!(reporter.is_enabled());
        reporter.report(AnalyticsEvent::Join { user_id: 3 });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(reporter.stats().users, 1);
    }
}
