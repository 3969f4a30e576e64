use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::MonoupdateResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The `User-Agent` sent with every outbound request. GitHub rejects requests without one.
pub const USER_AGENT: &str = concat!("monoupdate/", env!("CARGO_PKG_VERSION"));

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds an HTTP client whose every request is bounded by `timeout` and whose transient
/// failures are retried up to `max_retries` times with exponential backoff.
pub fn build_http_client(
    timeout: Duration,
    max_retries: u32,
) -> MonoupdateResult<ClientWithMiddleware> {
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    let client = ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

    Ok(client)
}
