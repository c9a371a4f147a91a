//! Constants for the download module (timeouts, retry budgets, headers).

use std::time::Duration;

/// Per-request timeout for document downloads (30 seconds).
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Attempts per interactive download.
pub const INTERACTIVE_MAX_ATTEMPTS: u32 = 3;

/// Delay between interactive download attempts.
pub const INTERACTIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Attempts per key in a batch run.
pub const BATCH_MAX_ATTEMPTS: u32 = 5;

/// Delay between batch attempts.
pub const BATCH_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Browser User-Agent sent with every download; the document portals refuse
/// obvious non-browser clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Suffix of the temporary file a body is streamed into before it is renamed.
pub(crate) const PARTIAL_SUFFIX: &str = "part";
