pub mod account;
pub mod activity;
pub mod clock;
pub mod context;
pub mod instance;
pub mod logger;
pub mod status;
pub mod sysoplog;

pub use account::{AccountError, UserRecord, UserStore, fast_logon_eligible};
pub use activity::ActivityLog;
pub use clock::{Clock, SystemClock};
pub use context::SessionContext;
pub use instance::{InstanceLocation, InstanceRegistry};
pub use status::{NodeStatus, StatusError, StatusStore};
pub use sysoplog::SysopLog;
