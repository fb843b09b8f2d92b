//! Block engine JSON-RPC wire types

use serde::{Deserialize, Serialize};

use crate::ports::bundle::BundleState;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    pub fn new(method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// `getBundleStatuses` result
#[derive(Debug, Clone, Deserialize)]
pub struct BundleStatuses {
    #[serde(default)]
    pub value: Vec<Option<BundleStatusEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BundleStatusEntry {
    pub bundle_id: String,
    #[serde(default)]
    pub transactions: Vec<String>,
    pub slot: Option<u64>,
    pub confirmation_status: Option<String>,
    /// `{"Ok": null}` on success, `{"Err": ...}` otherwise
    pub err: Option<serde_json::Value>,
}

impl BundleStatusEntry {
    pub fn failed(&self) -> bool {
        match &self.err {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Object(map)) => !map.contains_key("Ok"),
            Some(_) => true,
        }
    }

    pub fn state(&self) -> BundleState {
        if self.failed() {
            return BundleState::Failed;
        }
        match self.confirmation_status.as_deref() {
            Some("confirmed") | Some("finalized") => BundleState::Landed,
            _ => BundleState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_bundle_request_shape() {
        let request = JsonRpcRequest::new("sendBundle", vec![vec!["tx1".to_string()]]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "sendBundle");
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["params"][0][0], "tx1");
    }

    #[test]
    fn test_status_states() {
        let body = r#"{
            "context": {"slot": 1},
            "value": [
                {"bundle_id": "a", "transactions": ["s1"], "slot": 10,
                 "confirmation_status": "finalized", "err": {"Ok": null}},
                {"bundle_id": "b", "transactions": [], "slot": 11,
                 "confirmation_status": "processed", "err": {"Ok": null}},
                {"bundle_id": "c", "transactions": [], "slot": 12,
                 "confirmation_status": "confirmed", "err": {"Err": "custom"}},
                null
            ]
        }"#;
        let statuses: BundleStatuses = serde_json::from_str(body).unwrap();
        let states: Vec<Option<BundleState>> = statuses
            .value
            .iter()
            .map(|e| e.as_ref().map(BundleStatusEntry::state))
            .collect();
        assert_eq!(
            states,
            vec![
                Some(BundleState::Landed),
                Some(BundleState::Pending),
                Some(BundleState::Failed),
                None
            ]
        );
    }
}
