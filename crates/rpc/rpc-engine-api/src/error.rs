use jsonrpsee_types::error::{ErrorObject, INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};
use opal_engine::EngineError;

/// The Engine API result type.
pub type EngineApiResult<Ok> = Result<Ok, EngineApiError>;

/// Unknown payload error code, as answered to `getPayload`/`getBlobsBundle` calls with an id
/// that has no in-flight build.
pub const UNKNOWN_PAYLOAD_CODE: i32 = -32001;

/// Errors answered on the RPC-error channel of the engine namespace. Chain-semantic rejections
/// never take this path; they come back as a `PayloadStatus` inside a successful response.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// V1 payloads and attributes carry no withdrawals.
    #[error("withdrawals not supported in V1")]
    WithdrawalsNotSupportedInV1,
    /// Withdrawals are required once Shanghai is active at the payload timestamp.
    #[error("no withdrawals post-shanghai")]
    NoWithdrawalsPostShanghai,
    /// Withdrawals must not be present before Shanghai.
    #[error("withdrawals not supported pre-shanghai")]
    HasWithdrawalsPreShanghai,
    /// Only V3 payloads carry the excess data gas accumulator.
    #[error("excessDataGas not supported before V3")]
    ExcessDataGasNotSupported,
    /// V3 payloads must carry the excess data gas accumulator.
    #[error("no excessDataGas post-cancun")]
    NoExcessDataGasPostCancun,
    /// V3 payloads are only acceptable once Cancun is active at the payload timestamp.
    #[error("excessDataGas not supported pre-cancun")]
    HasExcessDataGasPreCancun,
    /// Error from the engine service.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<EngineApiError> for ErrorObject<'static> {
    fn from(error: EngineApiError) -> Self {
        let code = match &error {
            EngineApiError::Engine(EngineError::UnknownPayload) => UNKNOWN_PAYLOAD_CODE,
            EngineApiError::Engine(
                EngineError::InvalidParams(_) | EngineError::ChainUnresolvable(_),
            ) => INVALID_PARAMS_CODE,
            EngineApiError::Engine(_) => INTERNAL_ERROR_CODE,
            // version gating failures are parameter errors
            _ => INVALID_PARAMS_CODE,
        };
        ErrorObject::owned(code, error.to_string(), None::<()>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_interfaces::{ExecutionError, ProviderError};

    fn code_of(error: EngineApiError) -> i32 {
        ErrorObject::from(error).code()
    }

    #[test]
    fn error_codes_match_the_protocol() {
        assert_eq!(code_of(EngineError::UnknownPayload.into()), -32001);
        assert_eq!(code_of(EngineError::InvalidParams("ttd mismatch".into()).into()), -32602);
        assert_eq!(code_of(EngineError::ChainUnresolvable("safe").into()), -32602);
        assert_eq!(code_of(EngineApiError::WithdrawalsNotSupportedInV1), -32602);
        assert_eq!(code_of(EngineError::Provider(ProviderError::NoCanonicalHead).into()), -32603);
        assert_eq!(code_of(EngineError::Internal("boom".into()).into()), -32603);
        assert_eq!(
            code_of(EngineError::Execution(ExecutionError::Internal("boom".into())).into()),
            -32603
        );
    }

    #[test]
    fn unknown_payload_message() {
        let object = ErrorObject::from(EngineApiError::from(EngineError::UnknownPayload));
        assert_eq!(object.message(), "Unknown payload");
    }
}
