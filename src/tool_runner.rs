//! Type-safe tool execution
//!
//! `run_tool` is the single path from a [`ToolArgs`] value to an executed
//! command. It renders the command, logs it together with the context it
//! runs on, and hands it to the context. Success and failure come back as
//! `CommandOutput` / `CryptError::CommandFailed` unchanged.

use crate::context::{CommandOutput, ExecutionContext};
use crate::error::Result;
use crate::tool_traits::ToolArgs;

/// Execute a tool with type-safe arguments on `context`.
pub fn run_tool<T: ToolArgs>(context: &dyn ExecutionContext, args: &T) -> Result<CommandOutput> {
    let command = args.to_command();
    tracing::debug!(
        context = %context.describe(),
        sudo = command.options.sudo,
        tty = command.options.tty,
        destructive = args.is_destructive(),
        "run_tool: {}",
        command
    );
    context.execute(&command)
}
