//! Item command implementation.

use super::{CliResult, ConnectArgs};
use crate::view::{print_json, ListView};
use clap::Subcommand;
use shoplist_client::ItemUpdate;

/// Item operations. Each prints the updated list.
#[derive(Debug, Subcommand)]
pub enum ItemCommand {
    /// Add an item to a list
    Add {
        /// List uid
        list: String,

        /// Item name
        name: String,

        /// How many are wanted
        #[arg(long, default_value_t = 1)]
        desired: i64,

        /// How many are already bought
        #[arg(long, default_value_t = 0)]
        current: i64,
    },

    /// Change an item's name or quantities
    Update {
        /// List uid
        list: String,

        /// Item uid
        item: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New desired quantity
        #[arg(long)]
        desired: Option<i64>,

        /// New bought quantity
        #[arg(long)]
        current: Option<i64>,
    },

    /// Remove an item from a list
    Remove {
        /// List uid
        list: String,

        /// Item uid
        item: String,
    },
}

/// Runs the item command.
pub fn run(connect: &ConnectArgs, action: ItemCommand) -> CliResult<()> {
    let api = connect.api()?;
    let list = match action {
        ItemCommand::Add {
            list,
            name,
            desired,
            current,
        } => api.add_item(&list, &name, desired, current)?,
        ItemCommand::Update {
            list,
            item,
            name,
            desired,
            current,
        } => {
            if name.is_none() && desired.is_none() && current.is_none() {
                return Err("nothing to update: pass --name, --desired or --current".into());
            }
            let mut update = ItemUpdate::new();
            if let Some(name) = name {
                update = update.with_name(name);
            }
            if let Some(desired) = desired {
                update = update.with_desired(desired);
            }
            if let Some(current) = current {
                update = update.with_current(current);
            }
            api.update_item(&list, &item, update)?
        }
        ItemCommand::Remove { list, item } => api.remove_item(&list, &item)?,
    };
    print_json(&ListView::from(&list))
}
