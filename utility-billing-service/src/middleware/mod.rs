pub mod metrics;
pub mod principal;

pub use metrics::http_metrics_middleware;
pub use principal::{STAFF_ID_HEADER, STAFF_NAME_HEADER, STAFF_ROLE_HEADER};
