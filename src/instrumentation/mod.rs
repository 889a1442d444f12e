mod logger;

pub use logger::{SessionLog, SessionLogger, TurnLog};
