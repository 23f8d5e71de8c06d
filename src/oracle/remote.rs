//! # Remote Oracle Adapter
//!
//! ## Purpose
//! Production adapter for a hosted semantic-relationship classifier. Sends the
//! structured query as JSON and parses the classification plus confidence from
//! the response. All retry/fallback policy lives in the gateway; this adapter
//! only reports success or failure.

use crate::errors::{PipelineError, Result};
use crate::oracle::{
    DecisionOracle, OrderingDecision, OrderingQuery, RawAnswer, Relationship, RelationshipQuery,
};
use serde::Deserialize;

/// HTTP client for the hosted decision oracle
pub struct RemoteOracle {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    relationship: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct OrderResponse {
    order: String,
    confidence: f64,
}

impl RemoteOracle {
    /// Create a new client for the given oracle base URL (no trailing slash)
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post<B: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::OracleUnavailable {
                details: format!("oracle returned {}: {}", status.as_u16(), body),
            });
        }

        Ok(response.json().await?)
    }

    fn parse_relationship(raw: &str) -> Relationship {
        match raw {
            "amendment_chain" => Relationship::AmendmentChain,
            "direct_amendment" => Relationship::DirectAmendment,
            "consolidation" => Relationship::Consolidation,
            "constitutional_lineage" => Relationship::ConstitutionalLineage,
            _ => Relationship::Unrelated,
        }
    }

    fn parse_order(raw: &str) -> OrderingDecision {
        match raw {
            "a_before_b" => OrderingDecision::ABeforeB,
            "b_before_a" => OrderingDecision::BBeforeA,
            _ => OrderingDecision::Unknown,
        }
    }
}

#[async_trait::async_trait]
impl DecisionOracle for RemoteOracle {
    fn name(&self) -> &str {
        "remote"
    }

    async fn classify_relationship(
        &self,
        query: &RelationshipQuery,
    ) -> Result<RawAnswer<Relationship>> {
        let response: ClassifyResponse = self.post("/v1/classify", query).await?;
        Ok(RawAnswer {
            value: Self::parse_relationship(&response.relationship),
            confidence: response.confidence,
        })
    }

    async fn order(&self, query: &OrderingQuery) -> Result<RawAnswer<OrderingDecision>> {
        let response: OrderResponse = self.post("/v1/order", query).await?;
        Ok(RawAnswer {
            value: Self::parse_order(&response.order),
            confidence: response.confidence,
        })
    }
}
