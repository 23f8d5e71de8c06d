//! # Decision Oracle Gateway
//!
//! ## Purpose
//! Wraps any [`DecisionOracle`] adapter with the cost and reliability policy
//! every grouping/ordering decision routes through:
//! - TTL cache keyed by a content hash of the normalized query; a hit within
//!   the window never re-invokes the oracle
//! - a global ceiling on concurrent outstanding oracle calls, independent of
//!   the CPU worker-pool size
//! - per-call timeout; a timeout is treated as oracle-unavailable
//! - circuit breaker: after a run of consecutive failures all calls
//!   short-circuit to the fallback path for a cooldown period
//! - deterministic rule fallback for unavailable or low-confidence answers,
//!   always flagged low-confidence
//!
//! Every call is counted for observability, cached or not. The gateway is an
//! explicitly constructed, injected instance with its own lifecycle — one per
//! pipeline run, never a process-wide singleton.

use crate::config::OracleConfig;
use crate::oracle::{
    AnswerSource, DecisionOracle, FallbackOracle, GatewayStats, GatewayStatsSnapshot,
    OracleAnswer, OrderingDecision, OrderingQuery, Relationship, RelationshipQuery,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy)]
struct CachedEntry<T> {
    value: T,
    confidence: f64,
    low_confidence: bool,
    inserted: Instant,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Rate-limited, cached, fallback-capable oracle front end
pub struct OracleGateway {
    primary: Arc<dyn DecisionOracle>,
    fallback: FallbackOracle,
    config: OracleConfig,
    relationship_cache: DashMap<u64, CachedEntry<Relationship>>,
    ordering_cache: DashMap<u64, CachedEntry<OrderingDecision>>,
    limiter: Semaphore,
    breaker: Mutex<BreakerState>,
    stats: GatewayStats,
}

impl OracleGateway {
    pub fn new(primary: Arc<dyn DecisionOracle>, config: OracleConfig) -> Self {
        let limiter = Semaphore::new(config.max_concurrent_calls);
        Self {
            primary,
            fallback: FallbackOracle::new(),
            config,
            relationship_cache: DashMap::new(),
            ordering_cache: DashMap::new(),
            limiter,
            breaker: Mutex::new(BreakerState::default()),
            stats: GatewayStats::default(),
        }
    }

    /// Classify the relationship between two documents, applying the full
    /// cache/limit/breaker/fallback policy
    pub async fn classify_relationship(
        &self,
        query: &RelationshipQuery,
    ) -> OracleAnswer<Relationship> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        let key = query.cache_key();

        if let Some(hit) = self.cache_lookup(&self.relationship_cache, key) {
            return hit;
        }

        if self.breaker_open() {
            return self.fallback_relationship(query, "circuit breaker open");
        }

        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => return self.fallback_relationship(query, "rate limiter closed"),
        };
        self.stats.oracle_calls.fetch_add(1, Ordering::Relaxed);

        let call = self.primary.classify_relationship(query);
        match timeout(Duration::from_millis(self.config.call_timeout_ms), call).await {
            Ok(Ok(raw)) => {
                self.record_success();
                if raw.confidence >= self.config.confidence_threshold {
                    self.cache_store(&self.relationship_cache, key, raw.value, raw.confidence, false);
                    OracleAnswer {
                        value: raw.value,
                        confidence: raw.confidence,
                        source: AnswerSource::Oracle,
                        low_confidence: false,
                    }
                } else {
                    tracing::debug!(
                        oracle = self.primary.name(),
                        confidence = raw.confidence,
                        "relationship answer below confidence threshold, using fallback"
                    );
                    let answer = self.fallback_relationship(query, "low confidence");
                    // Cache the substituted answer so an identical query within
                    // the TTL does not re-invoke the oracle.
                    self.cache_store(
                        &self.relationship_cache,
                        key,
                        answer.value,
                        answer.confidence,
                        true,
                    );
                    answer
                }
            }
            Ok(Err(e)) => {
                self.record_failure();
                tracing::warn!(oracle = self.primary.name(), error = %e, "oracle call failed");
                self.fallback_relationship(query, "oracle error")
            }
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
                tracing::warn!(oracle = self.primary.name(), "oracle call timed out");
                self.fallback_relationship(query, "timeout")
            }
        }
    }

    /// Decide chronological order for two documents, applying the full policy
    pub async fn order(&self, query: &OrderingQuery) -> OracleAnswer<OrderingDecision> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        let key = query.cache_key();

        if let Some(hit) = self.cache_lookup(&self.ordering_cache, key) {
            return hit;
        }

        if self.breaker_open() {
            return self.fallback_order(query, "circuit breaker open");
        }

        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => return self.fallback_order(query, "rate limiter closed"),
        };
        self.stats.oracle_calls.fetch_add(1, Ordering::Relaxed);

        let call = self.primary.order(query);
        match timeout(Duration::from_millis(self.config.call_timeout_ms), call).await {
            Ok(Ok(raw)) => {
                self.record_success();
                if raw.confidence >= self.config.confidence_threshold {
                    self.cache_store(&self.ordering_cache, key, raw.value, raw.confidence, false);
                    OracleAnswer {
                        value: raw.value,
                        confidence: raw.confidence,
                        source: AnswerSource::Oracle,
                        low_confidence: false,
                    }
                } else {
                    tracing::debug!(
                        oracle = self.primary.name(),
                        confidence = raw.confidence,
                        "ordering answer below confidence threshold, using fallback"
                    );
                    let answer = self.fallback_order(query, "low confidence");
                    self.cache_store(
                        &self.ordering_cache,
                        key,
                        answer.value,
                        answer.confidence,
                        true,
                    );
                    answer
                }
            }
            Ok(Err(e)) => {
                self.record_failure();
                tracing::warn!(oracle = self.primary.name(), error = %e, "oracle call failed");
                self.fallback_order(query, "oracle error")
            }
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
                tracing::warn!(oracle = self.primary.name(), "oracle call timed out");
                self.fallback_order(query, "timeout")
            }
        }
    }

    /// Copy of the observability counters
    pub fn stats(&self) -> GatewayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drop all cached answers (used between unrelated runs in tests)
    pub fn clear_cache(&self) {
        self.relationship_cache.clear();
        self.ordering_cache.clear();
    }

    fn cache_lookup<T: Copy>(
        &self,
        cache: &DashMap<u64, CachedEntry<T>>,
        key: u64,
    ) -> Option<OracleAnswer<T>> {
        let ttl = Duration::from_secs(self.config.cache_ttl_seconds);
        if let Some(entry) = cache.get(&key) {
            if entry.inserted.elapsed() <= ttl {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Some(OracleAnswer {
                    value: entry.value,
                    confidence: entry.confidence,
                    source: AnswerSource::Cache,
                    low_confidence: entry.low_confidence,
                });
            }
        }
        // Expired entries are removed lazily on the next lookup.
        cache.remove_if(&key, |_, entry| entry.inserted.elapsed() > ttl);
        None
    }

    fn cache_store<T: Copy>(
        &self,
        cache: &DashMap<u64, CachedEntry<T>>,
        key: u64,
        value: T,
        confidence: f64,
        low_confidence: bool,
    ) {
        cache.insert(
            key,
            CachedEntry {
                value,
                confidence,
                low_confidence,
                inserted: Instant::now(),
            },
        );
    }

    fn fallback_relationship(
        &self,
        query: &RelationshipQuery,
        reason: &str,
    ) -> OracleAnswer<Relationship> {
        self.stats.fallback_invocations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(reason, "using fallback for relationship query");
        let raw = self.fallback.classify_rules(query);
        OracleAnswer {
            value: raw.value,
            confidence: raw.confidence,
            source: AnswerSource::Fallback,
            low_confidence: true,
        }
    }

    fn fallback_order(&self, query: &OrderingQuery, reason: &str) -> OracleAnswer<OrderingDecision> {
        self.stats.fallback_invocations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(reason, "using fallback for ordering query");
        let raw = self.fallback.order_rules(query);
        OracleAnswer {
            value: raw.value,
            confidence: raw.confidence,
            source: AnswerSource::Fallback,
            low_confidence: true,
        }
    }

    fn breaker_open(&self) -> bool {
        let mut state = self.breaker.lock();
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // Cooldown elapsed; half-open, let the next call probe.
                state.open_until = None;
                state.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    fn record_success(&self) {
        let mut state = self.breaker.lock();
        state.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut state = self.breaker.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.breaker_failure_threshold {
            state.open_until =
                Some(Instant::now() + Duration::from_secs(self.config.breaker_cooldown_seconds));
            tracing::warn!(
                failures = state.consecutive_failures,
                cooldown_seconds = self.config.breaker_cooldown_seconds,
                "oracle circuit breaker opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PipelineError, Result};
    use crate::oracle::{DocumentFacts, RawAnswer};
    use crate::StatuteType;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Scripted oracle double that counts invocations
    struct CountingOracle {
        calls: AtomicUsize,
        answer: Relationship,
        confidence: f64,
        fail: bool,
    }

    impl CountingOracle {
        fn answering(answer: Relationship, confidence: f64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer,
                confidence,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer: Relationship::Unrelated,
                confidence: 0.0,
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DecisionOracle for CountingOracle {
        fn name(&self) -> &str {
            "counting"
        }

        async fn classify_relationship(
            &self,
            _query: &RelationshipQuery,
        ) -> Result<RawAnswer<Relationship>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::OracleUnavailable {
                    details: "scripted failure".into(),
                });
            }
            Ok(RawAnswer {
                value: self.answer,
                confidence: self.confidence,
            })
        }

        async fn order(&self, _query: &OrderingQuery) -> Result<RawAnswer<OrderingDecision>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::OracleUnavailable {
                    details: "scripted failure".into(),
                });
            }
            Ok(RawAnswer {
                value: OrderingDecision::ABeforeB,
                confidence: self.confidence,
            })
        }
    }

    fn facts(name: &str) -> DocumentFacts {
        DocumentFacts {
            name: name.to_string(),
            date: None,
            statute_type: StatuteType::Act,
            jurisdiction: "federal".to_string(),
        }
    }

    fn query() -> RelationshipQuery {
        RelationshipQuery {
            a: facts("Anti-Terrorism Act 1997"),
            b: facts("Anti-Terrorism (Amendment) Act 2004"),
        }
    }

    #[tokio::test]
    async fn identical_query_invokes_oracle_at_most_once() {
        let oracle = Arc::new(CountingOracle::answering(Relationship::DirectAmendment, 0.9));
        let gateway = OracleGateway::new(oracle.clone(), OracleConfig::default());

        let first = gateway.classify_relationship(&query()).await;
        let second = gateway.classify_relationship(&query()).await;

        assert_eq!(oracle.call_count(), 1);
        assert_eq!(first.source, AnswerSource::Oracle);
        assert_eq!(second.source, AnswerSource::Cache);
        assert_eq!(second.value, Relationship::DirectAmendment);

        let stats = gateway.stats();
        assert_eq!(stats.queries, 2);
        assert_eq!(stats.oracle_calls, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn failure_routes_to_fallback_with_low_confidence_flag() {
        let oracle = Arc::new(CountingOracle::failing());
        let gateway = OracleGateway::new(oracle, OracleConfig::default());

        let answer = gateway.classify_relationship(&query()).await;
        assert_eq!(answer.source, AnswerSource::Fallback);
        assert!(answer.low_confidence);
        // The rule fallback still recognizes the amendment title.
        assert_eq!(answer.value, Relationship::DirectAmendment);
        assert_eq!(gateway.stats().fallback_invocations, 1);
    }

    #[tokio::test]
    async fn low_confidence_answer_is_replaced_and_cached() {
        let oracle = Arc::new(CountingOracle::answering(Relationship::Consolidation, 0.2));
        let gateway = OracleGateway::new(oracle.clone(), OracleConfig::default());

        let first = gateway.classify_relationship(&query()).await;
        assert_eq!(first.source, AnswerSource::Fallback);
        assert!(first.low_confidence);

        // Second identical query hits the cache, not the oracle.
        let second = gateway.classify_relationship(&query()).await;
        assert_eq!(second.source, AnswerSource::Cache);
        assert!(second.low_confidence);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn breaker_opens_after_repeated_failures() {
        let oracle = Arc::new(CountingOracle::failing());
        let config = OracleConfig {
            breaker_failure_threshold: 3,
            breaker_cooldown_seconds: 3600,
            ..OracleConfig::default()
        };
        let gateway = OracleGateway::new(oracle.clone(), config);

        // Distinct queries so the cache never intervenes.
        for i in 0..5 {
            let q = RelationshipQuery {
                a: facts(&format!("Statute {} Act", i)),
                b: facts(&format!("Statute {} (Amendment) Act", i)),
            };
            let answer = gateway.classify_relationship(&q).await;
            assert_eq!(answer.source, AnswerSource::Fallback);
        }

        // Three failures tripped the breaker; the last two calls short-circuit.
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(gateway.stats().fallback_invocations, 5);
    }

    #[tokio::test]
    async fn expired_cache_entry_reinvokes_oracle() {
        let oracle = Arc::new(CountingOracle::answering(Relationship::DirectAmendment, 0.9));
        let config = OracleConfig {
            cache_ttl_seconds: 0,
            ..OracleConfig::default()
        };
        let gateway = OracleGateway::new(oracle.clone(), config);

        gateway.classify_relationship(&query()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        gateway.classify_relationship(&query()).await;

        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn ordering_queries_share_the_policy() {
        let oracle = Arc::new(CountingOracle::answering(Relationship::Unrelated, 0.9));
        let gateway = OracleGateway::new(oracle.clone(), OracleConfig::default());

        let q = OrderingQuery {
            a: facts("Finance Act 1997"),
            b: facts("Finance Act 2004"),
            context: "finance".into(),
        };
        let first = gateway.order(&q).await;
        let second = gateway.order(&q).await;

        assert_eq!(first.value, OrderingDecision::ABeforeB);
        assert_eq!(second.source, AnswerSource::Cache);
        assert_eq!(oracle.call_count(), 1);
    }
}
