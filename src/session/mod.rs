pub mod console;
pub mod events;
pub mod handoff;
pub mod launcher;
pub mod process;
pub mod sysop;

pub use console::{NullConsole, StdinConsole};
pub use events::ScheduledHousekeeping;
pub use handoff::{CommandHandoff, Handoff, InteractiveSubsystem};
pub use launcher::{LaunchError, SessionLauncher, TransportPlan, create_comm, resolve_transport};
pub use sysop::SysopMenu;
