//! Standard response envelope: `{ "data": ... }` or `{ "error": { code, message, operation, class } }`.

use crate::error::{ErrorBody, OperationError};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum OperationResponse {
    Success { data: Value },
    Failure(ErrorBody),
}

impl OperationResponse {
    pub fn success(data: Value) -> Self {
        OperationResponse::Success { data }
    }

    pub fn from_result(result: Result<Value, OperationError>) -> Self {
        match result {
            Ok(data) => OperationResponse::Success { data },
            Err(e) => OperationResponse::Failure(e.body()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResponse::Success { .. })
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    #[test]
    fn success_wraps_data() {
        let r = OperationResponse::from_result(Ok(json!({ "id": "1" })));
        assert!(r.is_success());
        assert_eq!(r.to_json(), json!({ "data": { "id": "1" } }));
    }

    #[test]
    fn failure_carries_code_operation_and_class() {
        let err = OperationError::new(
            "deleteOnePerson",
            Some("Person"),
            AppError::Permission("Delete on Person requires one of the roles [\"Admin\"]".into()),
        );
        let r = OperationResponse::from_result(Err(err));
        let v = r.to_json();
        assert_eq!(v["error"]["code"], "permission_denied");
        assert_eq!(v["error"]["operation"], "deleteOnePerson");
        assert_eq!(v["error"]["class"], "Person");
        assert!(v.get("data").is_none());
    }
}
