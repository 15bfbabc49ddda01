//! CORS-aware search gateway in front of the shared index.
//!
//! Every request first resolves the allowed origin from the parameter store.
//! If that fails the gateway answers 500 with no CORS headers at all; it
//! never falls back to a wildcard origin. Preflight requests stop there with
//! a 204, everything else runs a phrase-prefix query and returns the engine's
//! body verbatim.

use crate::config::{lookup_parameter, GatewaySettings};
use crate::error::ConfigError;
use crate::traits::{ParameterStore, SearchBackend};
use crate::SearchError;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{error, info};

pub const SEARCH_FIELDS: [&str; 5] = ["title", "content", "categoryL", "categoryM", "categoryS"];
pub const ALLOWED_METHODS: &str = "GET,OPTIONS";
pub const ALLOWED_HEADERS: &str = "content-type";
pub const VARY: &str = "Origin, Access-Control-Request-Method, Access-Control-Request-Headers";

pub const CORS_MISCONFIGURED_BODY: &str = "Server CORS misconfiguration";
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayRequest {
    pub method: String,
    pub origin: Option<String>,
    pub query: Option<String>,
}

impl GatewayRequest {
    pub fn search(query: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            origin: None,
            query: Some(query.into()),
        }
    }

    pub fn preflight() -> Self {
        Self {
            method: "OPTIONS".to_string(),
            origin: None,
            query: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Reads a proxy-integration event (REST or HTTP API payload shape).
    pub fn from_proxy_event(event: &Value) -> Self {
        let method = event
            .get("httpMethod")
            .and_then(Value::as_str)
            .or_else(|| event.pointer("/requestContext/http/method").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let origin = event.get("headers").and_then(|headers| {
            headers
                .get("origin")
                .or_else(|| headers.get("Origin"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        let query = event
            .pointer("/queryStringParameters/q")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            method,
            origin,
            query,
        }
    }

    pub fn is_preflight(&self) -> bool {
        self.method.eq_ignore_ascii_case("OPTIONS")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl GatewayResponse {
    pub fn new(status_code: u16, headers: BTreeMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers,
            body: body.into(),
            is_base64_encoded: false,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Phrase-prefix query across every indexed text field.
pub fn build_search_query(text: &str, size: usize) -> Value {
    json!({
        "size": size,
        "query": {
            "multi_match": {
                "query": text,
                "type": "phrase_prefix",
                "fields": SEARCH_FIELDS,
            }
        }
    })
}

pub struct QueryGateway<P, B> {
    parameters: P,
    backend: B,
    settings: GatewaySettings,
}

impl<P, B> QueryGateway<P, B>
where
    P: ParameterStore + Send + Sync,
    B: SearchBackend + Send + Sync,
{
    pub fn new(parameters: P, backend: B, settings: GatewaySettings) -> Self {
        Self {
            parameters,
            backend,
            settings,
        }
    }

    pub async fn handle(&self, request: &GatewayRequest) -> GatewayResponse {
        let cors = match self.cors_headers().await {
            Ok(headers) => headers,
            Err(failure) => {
                error!(error = %failure, "CORS configuration error");
                return GatewayResponse::new(500, BTreeMap::new(), CORS_MISCONFIGURED_BODY);
            }
        };

        if request.is_preflight() {
            return GatewayResponse::new(204, cors, "");
        }

        let text = request.query.as_deref().unwrap_or_default();
        let query = build_search_query(text, self.settings.max_hits);

        match self.execute(&query).await {
            Ok(body) => {
                info!(origin = ?request.origin, query = %text, "search served");
                let mut headers = cors;
                headers.insert("Content-Type".to_string(), "application/json".to_string());
                GatewayResponse::new(200, headers, body)
            }
            Err(failure) => {
                error!(error = %failure, "failed to query search index");
                GatewayResponse::new(500, cors, INTERNAL_ERROR_BODY)
            }
        }
    }

    /// CORS headers for the configured origin. An empty origin counts as a
    /// lookup failure.
    pub async fn cors_headers(&self) -> Result<BTreeMap<String, String>, SearchError> {
        let origin = lookup_parameter(
            &self.parameters,
            &self.settings.allowed_origin_parameter,
            &self.settings.retry,
        )
        .await
        .map_err(|failure| SearchError::CorsConfiguration(failure.to_string()))?;

        let origin = origin.trim();
        if origin.is_empty() || origin == "*" {
            return Err(SearchError::CorsConfiguration(
                ConfigError::EmptyValue(self.settings.allowed_origin_parameter.clone()).to_string(),
            ));
        }

        Ok(BTreeMap::from([
            ("Access-Control-Allow-Origin".to_string(), origin.to_string()),
            ("Access-Control-Allow-Methods".to_string(), ALLOWED_METHODS.to_string()),
            ("Access-Control-Allow-Headers".to_string(), ALLOWED_HEADERS.to_string()),
            ("Vary".to_string(), VARY.to_string()),
        ]))
    }

    async fn execute(&self, query: &Value) -> Result<String, SearchError> {
        let endpoint = lookup_parameter(
            &self.parameters,
            &self.settings.search_host_parameter,
            &self.settings.retry,
        )
        .await?;

        self.backend
            .search(&endpoint, query)
            .await
            .map_err(|failure| SearchError::Execution(failure.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ALLOWED_ORIGIN_PARAMETER, SEARCH_HOST_PARAMETER};
    use crate::models::IndexDocument;
    use crate::retry::RetryPolicy;
    use crate::traits::WriteResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every lookup; names without a value fail.
    #[derive(Default)]
    struct RecordingParameters {
        values: HashMap<&'static str, &'static str>,
        lookups: Mutex<Vec<String>>,
    }

    impl RecordingParameters {
        fn with(mut self, name: &'static str, value: &'static str) -> Self {
            self.values.insert(name, value);
            self
        }

        fn lookups(&self) -> Vec<String> {
            self.lookups.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ParameterStore for RecordingParameters {
        async fn get_parameter(&self, name: &str) -> Result<String, ConfigError> {
            self.lookups.lock().unwrap().push(name.to_string());
            self.values
                .get(name)
                .map(|value| value.to_string())
                .ok_or_else(|| ConfigError::Lookup {
                    name: name.to_string(),
                    details: "parameter store unavailable".to_string(),
                })
        }
    }

    #[derive(Default)]
    struct FakeSearch {
        response: Option<&'static str>,
        searches: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl SearchBackend for FakeSearch {
        async fn put_document(
            &self,
            _endpoint: &str,
            _document_id: &str,
            _document: &IndexDocument,
        ) -> Result<WriteResponse, SearchError> {
            Ok(WriteResponse::with_result("created"))
        }

        async fn delete_document(
            &self,
            _endpoint: &str,
            _document_id: &str,
        ) -> Result<WriteResponse, SearchError> {
            Ok(WriteResponse::with_result("deleted"))
        }

        async fn search(&self, endpoint: &str, query: &Value) -> Result<String, SearchError> {
            self.searches
                .lock()
                .unwrap()
                .push((endpoint.to_string(), query.clone()));
            self.response
                .map(str::to_string)
                .ok_or_else(|| SearchError::BackendResponse {
                    backend: "opensearch".to_string(),
                    details: "503 Service Unavailable".to_string(),
                })
        }
    }

    const ORIGIN: &str = "https://www.example.com";
    const HITS: &str = r#"{"hits":{"total":{"value":1},"hits":[{"_id":"1"}]}}"#;

    fn configured() -> RecordingParameters {
        RecordingParameters::default()
            .with(ALLOWED_ORIGIN_PARAMETER, ORIGIN)
            .with(SEARCH_HOST_PARAMETER, "https://os.example.com")
    }

    fn gateway(
        parameters: RecordingParameters,
        search: FakeSearch,
    ) -> QueryGateway<RecordingParameters, FakeSearch> {
        QueryGateway::new(parameters, search, GatewaySettings::default())
    }

    fn assert_cors(response: &GatewayResponse) {
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some(ORIGIN));
        assert_eq!(response.header("Access-Control-Allow-Methods"), Some("GET,OPTIONS"));
        assert_eq!(response.header("Access-Control-Allow-Headers"), Some("content-type"));
        assert_eq!(response.header("Vary"), Some(VARY));
    }

    #[tokio::test]
    async fn preflight_returns_no_content_with_cors_headers() {
        let gateway = gateway(configured(), FakeSearch::default());
        let mut request = GatewayRequest::preflight();
        request.query = Some("ignored".to_string());

        let response = gateway.handle(&request).await;

        assert_eq!(response.status_code, 204);
        assert_eq!(response.body, "");
        assert_cors(&response);
        assert_eq!(gateway.parameters.lookups(), vec![ALLOWED_ORIGIN_PARAMETER]);
        assert!(gateway.backend.searches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_returns_raw_engine_body() {
        let gateway = gateway(
            configured(),
            FakeSearch {
                response: Some(HITS),
                ..Default::default()
            },
        );

        let response = gateway
            .handle(&GatewayRequest::search("テスト").with_origin("https://other.example.com"))
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, HITS);
        assert_cors(&response);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(
            gateway.parameters.lookups(),
            vec![ALLOWED_ORIGIN_PARAMETER, SEARCH_HOST_PARAMETER]
        );

        let searches = gateway.backend.searches.lock().unwrap().clone();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].0, "https://os.example.com");
        assert_eq!(searches[0].1, build_search_query("テスト", 300));
    }

    #[tokio::test]
    async fn origin_lookup_failure_fails_closed() {
        let gateway = gateway(
            RecordingParameters::default(),
            FakeSearch {
                response: Some(HITS),
                ..Default::default()
            },
        );

        let response = gateway.handle(&GatewayRequest::search("x")).await;

        assert_eq!(response.status_code, 500);
        assert!(response.headers.is_empty());
        assert_ne!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(response.body, CORS_MISCONFIGURED_BODY);
        assert_eq!(gateway.parameters.lookups().len(), 3);
        assert!(gateway.backend.searches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wildcard_or_blank_origin_is_rejected() {
        for value in ["*", "  "] {
            let gateway = gateway(
                RecordingParameters::default().with(ALLOWED_ORIGIN_PARAMETER, value),
                FakeSearch::default(),
            );
            let response = gateway.handle(&GatewayRequest::preflight()).await;
            assert_eq!(response.status_code, 500);
            assert!(response.headers.is_empty());
        }
    }

    #[tokio::test]
    async fn search_failure_is_generic_500_with_cors() {
        let gateway = gateway(configured(), FakeSearch::default());

        let response = gateway.handle(&GatewayRequest::search("pump")).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, INTERNAL_ERROR_BODY);
        assert!(!response.body.contains("503"));
        assert_cors(&response);
    }

    #[tokio::test]
    async fn search_host_lookup_failure_is_generic_500() {
        let gateway = QueryGateway::new(
            RecordingParameters::default().with(ALLOWED_ORIGIN_PARAMETER, ORIGIN),
            FakeSearch {
                response: Some(HITS),
                ..Default::default()
            },
            GatewaySettings {
                retry: RetryPolicy::single_attempt(),
                ..Default::default()
            },
        );

        let response = gateway.handle(&GatewayRequest::search("pump")).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, INTERNAL_ERROR_BODY);
        assert_cors(&response);
    }

    #[tokio::test]
    async fn missing_query_searches_for_empty_string() {
        let gateway = gateway(
            configured(),
            FakeSearch {
                response: Some("{}"),
                ..Default::default()
            },
        );
        let request = GatewayRequest {
            method: "GET".to_string(),
            ..Default::default()
        };

        let response = gateway.handle(&request).await;

        assert_eq!(response.status_code, 200);
        let searches = gateway.backend.searches.lock().unwrap().clone();
        assert_eq!(searches[0].1["query"]["multi_match"]["query"], "");
    }

    #[test]
    fn query_uses_phrase_prefix_over_all_fields() {
        let query = build_search_query("pump", 300);
        assert_eq!(query["size"], 300);
        assert_eq!(query["query"]["multi_match"]["type"], "phrase_prefix");
        assert_eq!(
            query["query"]["multi_match"]["fields"],
            json!(["title", "content", "categoryL", "categoryM", "categoryS"])
        );
    }

    #[test]
    fn proxy_events_are_read_from_either_payload_shape() {
        let rest = GatewayRequest::from_proxy_event(&json!({
            "httpMethod": "GET",
            "headers": {"origin": "https://a.example.com"},
            "queryStringParameters": {"q": "テスト"}
        }));
        assert_eq!(rest, GatewayRequest::search("テスト").with_origin("https://a.example.com"));

        let http = GatewayRequest::from_proxy_event(&json!({
            "headers": {"Origin": "https://b.example.com"},
            "queryStringParameters": null,
            "requestContext": {"http": {"method": "OPTIONS"}}
        }));
        assert!(http.is_preflight());
        assert_eq!(http.origin.as_deref(), Some("https://b.example.com"));
        assert_eq!(http.query, None);
    }

    #[test]
    fn response_serializes_in_proxy_shape() -> Result<(), Box<dyn std::error::Error>> {
        let failed = serde_json::to_value(GatewayResponse::new(500, BTreeMap::new(), "x"))?;
        assert_eq!(
            failed,
            json!({"statusCode": 500, "body": "x", "isBase64Encoded": false})
        );
        Ok(())
    }
}
