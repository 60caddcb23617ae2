use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{HandlerError, ValidationOutcome};

pub const INPUT_VALIDATION_FAILED: &str = "Input validation failed";
pub const OUTPUT_VALIDATION_FAILED: &str = "Unexpected result from function";
pub const NOT_IMPLEMENTED: &str = "Not implemented";
pub const UNAUTHORIZED: &str = "unauthorized";
pub const UNAUTHENTICATED_MESSAGE: &str = "Only logged in users can do this";
pub const FORBIDDEN_MESSAGE: &str = "You don't have permission to do this";

/// Either a field-keyed validation outcome or a list of structural messages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ErrorDetail {
    Validation(ValidationOutcome),
    Messages(Vec<String>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContractFailure {
    #[serde(rename = "errorType")]
    pub error_type: String,
    pub code: u16,
    pub data: Value,
    pub errors: ErrorDetail,
}

/// Envelope returned by every processed operation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ContractResult {
    Failure(ContractFailure),
    Success { result: Value },
}

impl ContractResult {
    pub fn success(result: Value) -> Self {
        ContractResult::Success { result }
    }

    pub fn input_invalid(input: Value, outcome: ValidationOutcome) -> Self {
        Self::failure(
            INPUT_VALIDATION_FAILED,
            400,
            input,
            ErrorDetail::Validation(outcome),
        )
    }

    pub fn unauthenticated(input: Value) -> Self {
        Self::failure(
            UNAUTHORIZED,
            401,
            input,
            ErrorDetail::Messages(vec![UNAUTHENTICATED_MESSAGE.to_string()]),
        )
    }

    pub fn unauthorized(input: Value) -> Self {
        Self::failure(
            UNAUTHORIZED,
            403,
            input,
            ErrorDetail::Messages(vec![FORBIDDEN_MESSAGE.to_string()]),
        )
    }

    pub fn not_implemented(name: &str) -> Self {
        Self::failure(
            NOT_IMPLEMENTED,
            501,
            Value::String(name.to_string()),
            ErrorDetail::Messages(vec![format!("Handler for {name} was not defined")]),
        )
    }

    pub fn output_invalid(result: Value, outcome: ValidationOutcome) -> Self {
        Self::failure(
            OUTPUT_VALIDATION_FAILED,
            500,
            result,
            ErrorDetail::Validation(outcome),
        )
    }

    /// Render a propagated handler error in the envelope shape, for transports that want a
    /// single response format.
    pub fn from_handler_error(err: &HandlerError, input: Value) -> Self {
        Self::failure(
            err.error_type(),
            err.status_code(),
            input,
            ErrorDetail::Messages(vec![err.to_string()]),
        )
    }

    fn failure(error_type: &str, code: u16, data: Value, errors: ErrorDetail) -> Self {
        ContractResult::Failure(ContractFailure {
            error_type: error_type.to_string(),
            code,
            data,
            errors,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ContractResult::Failure(_))
    }

    /// Status code; successes report 200.
    pub fn code(&self) -> u16 {
        match self {
            ContractResult::Failure(failure) => failure.code,
            ContractResult::Success { .. } => 200,
        }
    }

    pub fn failure_ref(&self) -> Option<&ContractFailure> {
        match self {
            ContractResult::Failure(failure) => Some(failure),
            ContractResult::Success { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<Value, ContractFailure> {
        match self {
            ContractResult::Success { result } => Ok(result),
            ContractResult::Failure(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Conflict;
    use serde_json::json;

    #[test]
    fn not_implemented_envelope_matches_wire_shape() {
        let result = ContractResult::not_implemented("test");
        assert_eq!(result.code(), 501);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "errorType": "Not implemented",
                "code": 501,
                "data": "test",
                "errors": ["Handler for test was not defined"]
            })
        );
    }

    #[test]
    fn success_serializes_as_result_object() {
        let result = ContractResult::success(json!({"b": "foo"}));
        assert!(!result.is_error());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"result": {"b": "foo"}})
        );
    }

    #[test]
    fn envelope_deserializes_back_into_variants() {
        let failure: ContractResult = serde_json::from_value(json!({
            "errorType": "unauthorized",
            "code": 403,
            "data": {"id": "a"},
            "errors": [FORBIDDEN_MESSAGE]
        }))
        .unwrap();
        assert_eq!(failure, ContractResult::unauthorized(json!({"id": "a"})));

        let success: ContractResult = serde_json::from_value(json!({"result": [1, 2]})).unwrap();
        assert_eq!(success.into_result().unwrap(), json!([1, 2]));
    }

    #[test]
    fn handler_errors_render_with_their_status() {
        let err = HandlerError::from(Conflict::DuplicateId {
            collection: "items".into(),
            id: "a".into(),
        });
        let result = ContractResult::from_handler_error(&err, json!({"id": "a"}));
        let failure = result.failure_ref().unwrap();
        assert_eq!(failure.code, 409);
        assert_eq!(failure.error_type, "Conflict");
        assert_eq!(
            failure.errors,
            ErrorDetail::Messages(vec!["record with id a already exists in items".into()])
        );
    }
}
