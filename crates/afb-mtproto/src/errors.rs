use std::time::Duration;

use afb_core::Error;
use grammers_mtsender::InvocationError;

/// The wait a `FLOOD_WAIT_X` (or `FLOOD_PREMIUM_WAIT_X`) RPC error asks for.
///
/// grammers strips the numeric suffix off the error name into `value`. Other
/// 420 errors, and a floodwait without a value, are not retryable waits.
pub fn flood_wait_of(name: &str, value: Option<u32>) -> Option<Duration> {
    if name != "FLOOD_WAIT" && name != "FLOOD_PREMIUM_WAIT" {
        return None;
    }
    value.map(|secs| Duration::from_secs(u64::from(secs)))
}

pub fn map_invocation(e: InvocationError) -> Error {
    if let InvocationError::Rpc(rpc) = &e {
        if let Some(wait) = flood_wait_of(&rpc.name, rpc.value) {
            return Error::RateLimited { wait };
        }
    }
    Error::External(format!("mtproto: {e}"))
}

/// Connect and sign-in wrap the RPC error in their own error types; recover the
/// floodwait from the rendered `rpc error 420: FLOOD_WAIT (value: N)` form.
pub(crate) fn map_authorization(e: impl std::fmt::Display) -> Error {
    let text = e.to_string();
    match flood_wait_in_message(&text) {
        Some(wait) => Error::RateLimited { wait },
        None => Error::External(format!("mtproto authorization: {text}")),
    }
}

fn flood_wait_in_message(text: &str) -> Option<Duration> {
    if !text.contains("FLOOD_WAIT") && !text.contains("FLOOD_PREMIUM_WAIT") {
        return None;
    }
    let rest = text.split("value: ").nth(1)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok().map(Duration::from_secs)
}
