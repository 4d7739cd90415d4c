//! Session state and worker commands.
//!
//! - [`SharedState`]: modes, task status and map bindings behind a read-write lock
//! - [`SessionCommand`]: mutations sent to the session worker

pub mod commands;
mod shared;

pub use commands::{
    CommandReceiver, CommandResponse, CommandResult, CommandSender, CommandWithResponse,
    SessionCommand, create_command_channel, send_command, send_command_sync,
};
pub use shared::{
    ControllerLevel, NavMode, SharedState, SharedStateHandle, SlamMode, create_shared_state,
};
