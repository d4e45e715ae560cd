pub mod constants;
pub mod notification;
pub mod state;
pub mod status;

pub use notification::{AlertContext, DeliveryReceipt, SummaryStats};
pub use state::MonitoringState;
pub use status::{AvailabilityStatus, CheckOutcome, CheckRecord};
