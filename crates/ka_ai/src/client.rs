use std::time::Duration;

use ka_core::error::AppError;

/// Validated base URL plus a ureq agent carrying the per-call timeout.
///
/// Every oracle (chat, embeddings, dictionary) goes through one of these so that
/// no external call can hang past its configured deadline.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpEndpoint {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = validate_base_url(base_url)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build();
        Ok(Self { base_url, agent })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn agent(&self) -> &ureq::Agent {
        &self.agent
    }
}

fn validate_base_url(raw: &str) -> Result<String, AppError> {
    let base_url = raw.trim().trim_end_matches('/').to_string();
    let invalid = |why: &str| {
        AppError::new("AI_HTTP_ENDPOINT_INVALID", "Endpoint base URL is not valid")
            .with_details(format!("base_url={base_url}; reason={why}"))
    };

    let rest = if let Some(r) = base_url.strip_prefix("https://") {
        r
    } else if let Some(r) = base_url.strip_prefix("http://") {
        r
    } else {
        return Err(invalid("scheme must be http or https"));
    };
    if rest.chars().any(char::is_whitespace) {
        return Err(invalid("whitespace in URL"));
    }

    let authority = rest.split('/').next().unwrap_or("");
    if authority.contains('@') {
        return Err(invalid("credentials must not be embedded in the URL"));
    }
    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        // IPv6 literal: [addr] or [addr]:port
        match bracketed.split_once(']') {
            Some((h, "")) => (h, None),
            Some((h, tail)) => match tail.strip_prefix(':') {
                Some(p) => (h, Some(p)),
                None => return Err(invalid("malformed IPv6 authority")),
            },
            None => return Err(invalid("malformed IPv6 authority")),
        }
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (authority, None),
        }
    };
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    if let Some(p) = port {
        match p.parse::<u16>() {
            Ok(n) if n > 0 => {}
            _ => return Err(invalid("port must be 1-65535")),
        }
    }
    Ok(base_url)
}

/// Map a ureq failure onto the shared error shape. Transport errors (including
/// timeouts), 429 and 5xx are retryable; other statuses are not.
pub(crate) fn map_http_error(code: &str, message: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, _) => AppError::new(code, message)
            .with_details(format!("status={status}"))
            .with_retryable(status == 429 || status >= 500),
        ureq::Error::Transport(t) => AppError::transient(code, message).with_details(t.to_string()),
    }
}
