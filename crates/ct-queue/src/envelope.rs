//! Message envelope.
//!
//! Every task travels as `{"data": <payload>, "parameters": {...}}` encoded
//! as UTF-8 JSON bytes.

use std::fmt;

use ct_models::TaskParameters;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;

/// A task payload together with its parameters. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage<T> {
    pub data: T,
    #[serde(default)]
    pub parameters: TaskParameters,
}

impl<T> JobMessage<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            parameters: TaskParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: TaskParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

impl<T: Serialize> JobMessage<T> {
    pub fn to_bytes(&self) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<T: DeserializeOwned> JobMessage<T> {
    pub fn from_bytes(bytes: &[u8]) -> QueueResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<T: fmt::Debug> fmt::Display for JobMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobMessage(data={:?}; {})", self.data, self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let message = JobMessage::new("video-1".to_string()).with_parameters(TaskParameters::forced());
        let json: serde_json::Value = serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();

        assert_eq!(json["data"], "video-1");
        assert_eq!(json["parameters"]["force"], true);
    }

    #[test]
    fn test_missing_parameters_default() {
        let message: JobMessage<String> = JobMessage::from_bytes(br#"{"data":"v2"}"#).unwrap();
        assert_eq!(message.data, "v2");
        assert!(!message.parameters.force);
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        assert!(JobMessage::<String>::from_bytes(b"not json").is_err());
        assert!(JobMessage::<String>::from_bytes(br#"{"data": 5}"#).is_err());
    }
}
