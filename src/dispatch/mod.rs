// src/dispatch/mod.rs

//! Outbound call dispatcher.
//!
//! Runs the calls an evaluation queued against the host, in production
//! order. Each call is isolated: a failure is logged with its id and the
//! batch carries on. Only ever invoked for successful evaluations.

pub mod caller;

use serde::Serialize;
use tracing::{debug, error};

use crate::engine::QueuedCall;

pub use caller::{BoxFuture, JsonLinesServiceCaller, LoggingServiceCaller, ServiceCaller};

/// Per-batch tally; failures never change the execution result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub async fn dispatch_calls(
    caller: &dyn ServiceCaller,
    entity_id: &str,
    calls: Vec<QueuedCall>,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for call in calls {
        let QueuedCall {
            id,
            domain,
            service,
            data,
        } = call;
        match caller.call(&domain, &service, data).await {
            Ok(()) => {
                debug!(entity = %entity_id, call_id = %id, %domain, %service, "service call dispatched");
                report.succeeded += 1;
            }
            Err(err) => {
                error!(
                    entity = %entity_id,
                    call_id = %id,
                    %domain,
                    %service,
                    error = %format!("{err:#}"),
                    "service call failed"
                );
                report.failed += 1;
            }
        }
    }
    report
}
