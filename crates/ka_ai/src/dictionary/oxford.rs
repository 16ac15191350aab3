use ka_core::error::AppError;
use serde_json::Value;

use super::DictionarySource;
use crate::client::HttpEndpoint;

/// Fixed navigation path to the first short definition in an entries payload.
const DEFINITION_POINTER: &str = "/results/0/lexicalEntries/0/entries/0/senses/0/definitions/0";

/// Oxford Dictionaries `entries` API client (app id + app key headers).
#[derive(Debug, Clone)]
pub struct OxfordDictionary {
    endpoint: HttpEndpoint,
    app_id: String,
    app_key: String,
    language: String,
}

impl OxfordDictionary {
    pub fn new(
        endpoint: HttpEndpoint,
        app_id: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            app_id: app_id.into(),
            app_key: app_key.into(),
            language: "en-gb".to_string(),
        }
    }
}

/// Pull the definition string out of an entries payload; any other shape is "no entry".
pub fn extract_definition(payload: &Value) -> Option<String> {
    payload
        .pointer(DEFINITION_POINTER)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl DictionarySource for OxfordDictionary {
    fn lookup(&self, term: &str) -> Result<Option<String>, AppError> {
        let url = self.endpoint.url(&format!(
            "/entries/{}/{}",
            self.language,
            urlencoding::encode(term)
        ));
        let resp = self
            .endpoint
            .agent()
            .get(&url)
            .query("fields", "definitions")
            .query("strictMatch", "false")
            .set("app_id", &self.app_id)
            .set("app_key", &self.app_key)
            .call();

        match resp {
            Ok(r) => match r.into_json::<Value>() {
                Ok(v) => Ok(extract_definition(&v)),
                Err(e) => {
                    tracing::warn!(term, error = %e, "dictionary payload was not JSON");
                    Ok(None)
                }
            },
            // Throttling and server errors are transient: report them uncached.
            Err(ureq::Error::Status(status, _)) if status == 429 || status >= 500 => {
                Err(AppError::transient(
                    "AI_DICTIONARY_UNAVAILABLE",
                    "Dictionary service is unavailable",
                )
                .with_details(format!("status={status}")))
            }
            Err(ureq::Error::Status(status, _)) => {
                tracing::debug!(term, status, "dictionary returned non-success status");
                Ok(None)
            }
            Err(ureq::Error::Transport(t)) => Err(AppError::transient(
                "AI_DICTIONARY_UNREACHABLE",
                "Failed to reach dictionary service",
            )
            .with_details(t.to_string())),
        }
    }
}
