//! Fixed-interval polling with a deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::error::{Error, Result};

/// Interval and deadline for a poll loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Deployment replica changes: every 3s for up to 2 minutes.
pub const DEPLOYMENT_POLL: PollSettings =
    PollSettings::new(Duration::from_secs(3), Duration::from_secs(120));

/// Finalizer removal: every second for up to 30s.
pub const FINALIZER_POLL: PollSettings =
    PollSettings::new(Duration::from_secs(1), Duration::from_secs(30));

/// Call `condition` until it returns `true`.
///
/// The first check runs immediately. Errors from `condition` end the poll.
pub async fn poll_until<F, Fut>(settings: PollSettings, what: &str, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let poll = async {
        loop {
            if condition().await? {
                return Ok(());
            }
            sleep(settings.interval).await;
        }
    };

    match timeout(settings.timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            what: what.to_string(),
            after: settings.timeout,
        }),
    }
}
