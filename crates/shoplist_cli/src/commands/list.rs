//! List command implementation.

use super::{CliResult, ConnectArgs};
use crate::view::{print_json, ListView};
use clap::Subcommand;

/// List operations.
#[derive(Debug, Subcommand)]
pub enum ListCommand {
    /// Create an empty list and print it
    Create {
        /// Display name
        name: String,
    },

    /// Fetch a list and print it
    Get {
        /// List uid
        uid: String,
    },

    /// Delete a list from its shard
    Delete {
        /// List uid
        uid: String,
    },
}

/// Runs the list command.
pub fn run(connect: &ConnectArgs, action: ListCommand) -> CliResult<()> {
    let api = connect.api()?;
    match action {
        ListCommand::Create { name } => {
            let list = api.create_list(&name)?;
            print_json(&ListView::from(&list))?;
        }
        ListCommand::Get { uid } => {
            let list = api.get_list(&uid)?;
            print_json(&ListView::from(&list))?;
        }
        ListCommand::Delete { uid } => {
            api.delete_list(&uid)?;
            println!("Deleted {uid}");
        }
    }
    Ok(())
}
