//! External command workers for Reclaim.
//!
//! A [`CommandWorker`] runs one configured program per job. The program gets the
//! target in `RECLAIM_TARGET` (and wherever `{target}` appears in its arguments),
//! the attack configuration as JSON in `RECLAIM_ATTACK_CONFIG`, and reports back
//! through JSON lines on stdout (see [`protocol`]).

pub mod command;
pub mod config;
pub mod protocol;

pub use command::{CommandWorker, CommandWorkerFactory};
pub use config::{ATTACK_CONFIG_ENV, CommandConfig, TARGET_ENV, TARGET_PLACEHOLDER};
pub use protocol::{WorkerMessage, parse_line};
