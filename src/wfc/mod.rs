pub mod command;
pub mod dispatcher;
pub mod logon;
pub mod screen;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{SysopHotKey, WfcCommand};
pub use dispatcher::{ConnectionDispatcher, DispatchError, WfcOutcome};
pub use logon::LocalLogon;
pub use screen::WfcScreen;
pub use services::{CalloutMode, Console, Housekeeping, SysopCommands, WfcServices};
pub use state::{DispatcherState, IncomingSignal, WfcState};
