use std::time::Duration;

use serde_json::Value;
use ureq::{self, Agent};

/// Transport or status failure talking to a remote JSON API.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HttpError(#[from] ureq::Error);

impl HttpError {
    /// HTTP status code, when the server answered with a non-2xx status.
    pub fn status(&self) -> Option<u16> {
        match &self.0 {
            ureq::Error::StatusCode(code) => Some(*code),
            _ => None,
        }
    }
}

fn agent(timeout: Duration) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();

    config.into()
}

/// Send a POST request with a JSON body and decode the JSON response.
///
/// `bearer` is sent as `Authorization: Bearer <token>` when present.
pub fn post_json(
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    timeout: Duration,
) -> Result<Value, HttpError> {
    let mut request = agent(timeout).post(url);
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {token}"));
    }

    let response = request.send_json(body)?.body_mut().read_json::<Value>()?;

    Ok(response)
}
