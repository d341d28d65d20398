//! Locomotion policy RPC surface
//!
//! The control core only needs request/response semantics and a failure flag.
//! Transports implement [`PolicyClient`]; the sequencer owns one as a trait
//! object so tests can substitute scripted doubles.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::types::NUM_JOINTS;

pub const DEFAULT_MODEL_TYPE: &str = "flat_terrain";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub observation: Vec<f64>,
    pub model_type: String,
    pub deterministic: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub action: Vec<f64>,
}

impl PolicyResponse {
    pub fn ok(action: Vec<f64>) -> Self {
        Self {
            success: true,
            error_message: String::new(),
            action,
        }
    }

    /// A response standing in for a call that never produced one
    pub fn failed(error: &PolicyError) -> Self {
        Self {
            success: false,
            error_message: error.to_string(),
            action: Vec::new(),
        }
    }
}

pub trait PolicyClient: Send {
    /// One blocking inference call. Implementations must bound the call
    /// duration themselves; the sequencer additionally discards answers that
    /// arrive after its deadline.
    fn predict(&mut self, request: &PolicyRequest) -> Result<PolicyResponse, PolicyError>;
}

/// In-process policy that always asks for the neutral stance (dry runs)
#[derive(Clone, Debug, Default)]
pub struct HoldStillPolicy;

impl PolicyClient for HoldStillPolicy {
    fn predict(&mut self, _request: &PolicyRequest) -> Result<PolicyResponse, PolicyError> {
        Ok(PolicyResponse::ok(vec![0.0; NUM_JOINTS]))
    }
}

/// JSON-over-HTTP policy client
///
/// POSTs the request to `{endpoint}/predict`. The per-call deadline is the
/// HTTP client timeout; a timeout surfaces as [`PolicyError::DeadlineExceeded`].
pub struct HttpPolicyClient {
    endpoint: String,
    client: reqwest::blocking::Client,
    deadline: Duration,
    connected: bool,
}

impl HttpPolicyClient {
    pub fn new(endpoint: &str, deadline: Duration) -> Result<Self, PolicyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| PolicyError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            deadline,
            connected: false,
        })
    }

    /// Check the server with a one-element observation on the `test` model
    pub fn connect(&mut self) -> Result<(), PolicyError> {
        let handshake = PolicyRequest {
            observation: vec![0.0],
            model_type: "test".to_string(),
            deterministic: true,
        };
        match self.post(&handshake) {
            Ok(_) => {
                self.connected = true;
                log::info!("Connected to policy server at {}", self.endpoint);
                Ok(())
            }
            Err(e) => {
                self.connected = false;
                log::warn!("Failed to connect to policy server {}: {}", self.endpoint, e);
                Err(e)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn post(&self, request: &PolicyRequest) -> Result<PolicyResponse, PolicyError> {
        let url = format!("{}/predict", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PolicyError::Transport(format!("HTTP {} from {}", status, url)));
        }

        response
            .json::<PolicyResponse>()
            .map_err(|e| if e.is_timeout() {
                PolicyError::DeadlineExceeded(self.deadline)
            } else {
                PolicyError::Malformed(e.to_string())
            })
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> PolicyError {
        if e.is_timeout() {
            PolicyError::DeadlineExceeded(self.deadline)
        } else {
            PolicyError::Transport(e.to_string())
        }
    }
}

impl PolicyClient for HttpPolicyClient {
    fn predict(&mut self, request: &PolicyRequest) -> Result<PolicyResponse, PolicyError> {
        if !self.connected {
            return Err(PolicyError::Transport("Not connected to server".to_string()));
        }
        self.post(request)
    }
}
