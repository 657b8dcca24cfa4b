pub mod builders;
pub mod fakes;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tickscript::logging::LOG_ENV_VAR;
use tracing_subscriber::{fmt, EnvFilter};

pub use fakes::{FlakyStore, RecordedCall, RecordingServiceCaller, SlowEvaluator};
pub use tickscript::snapshot::StaticSnapshotProvider;

/// Default bound for a whole test body.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Route tracing to the test writer, once per test binary.
///
/// Output only shows for failing tests (or with `--nocapture`). The filter
/// comes from `TICKSCRIPT_LOG`, same as the binary, and defaults to `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|spec| EnvFilter::try_new(spec).ok())
            .unwrap_or_else(|| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Fail the test if `f` runs past [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(out) => out,
        Err(_) => panic!("test still running after {TEST_TIMEOUT:?}"),
    }
}
