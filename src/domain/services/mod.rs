mod dispatch;
mod endpoint_selector;
mod retry;

pub use dispatch::{DispatchOutcome, DispatchReport, EndpointAttempt};
pub use endpoint_selector::{attempt_order, RoundRobinSelector};
pub use retry::RetryBackoff;
