//! Rule matching and notification dispatch.

mod dispatcher;
mod retry;
mod sink;

pub use dispatcher::{DetectionOutcome, DispatchPolicy, DispatchReport, DispatchStats, Dispatcher};
pub use retry::RetryPolicy;
pub use sink::{
    ChannelSink, JsonLinesSink, LogSink, MultiSink, NotificationEvent, NotificationSink,
    ReportRouter,
};
