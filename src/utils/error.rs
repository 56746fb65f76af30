//! Setup-time failures. Nothing in here is raised once the tasks are running;
//! runtime overload goes through the watchdog as a warning instead.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("task `{task}` has a zero period")]
    ZeroPeriod { task: &'static str },

    #[error("scheduler started without any periodic task")]
    NoTasks,

    #[error("failed to spawn thread for task `{task}`")]
    Spawn {
        task: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SystemError>;
