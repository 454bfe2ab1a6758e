//! `v1:debug.simulateError`: answers with a caller-chosen protocol failure.

use opencall_core::{Args, FieldResult, FromArgs, IntBounds};
use serde_json::Value;

use crate::service::handler::{HandlerError, HandlerResult};

const DEFAULT_CODE: &str = "SIMULATED_ERROR";
const DEFAULT_MESSAGE: &str = "Simulated error for testing";

/// Anything outside the HTTP status range is a validation failure rather
/// than an unrenderable response.
const STATUS_RANGE: IntBounds = IntBounds::range(100, 599);

#[derive(Debug)]
struct SimulateArgs {
    status: u16,
    code: String,
    message: String,
}

impl FromArgs for SimulateArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        let status = args.required_int("statusCode", STATUS_RANGE)?;
        // Empty strings fall back to the defaults as well.
        let code = args
            .optional_string("code")?
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CODE.to_string());
        let message = args
            .optional_string("message")?
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
        Ok(Self {
            status: u16::try_from(status).unwrap_or(500),
            code,
            message,
        })
    }
}

/// Never succeeds: every valid call becomes [`HandlerError::Operational`].
///
/// # Errors
///
/// Always.
pub fn simulate_error(args: &Args<'_>) -> HandlerResult<Value> {
    let SimulateArgs {
        status,
        code,
        message,
    } = args.decode()?;
    Err(HandlerError::operational(status, code, message))
}
