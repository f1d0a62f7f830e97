pub mod link;
pub mod metrics;
pub mod protocol;
pub mod transport;

pub use link::{run_link, LinkConfig, LinkSummary};
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{encode_telemetry, parse_telemetry, TELEMETRY_PREFIX};
pub use transport::{Accepted, LinkError, TcpTransport, Transport};
