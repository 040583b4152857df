//! JSON rendering of lists.

use serde::Serialize;
use shoplist_model::{ShoppingItem, ShoppingList};

/// A list as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct ListView {
    /// List uid.
    pub uid: String,
    /// Display name.
    pub name: String,
    /// Present items in uid order.
    pub items: Vec<ItemView>,
}

/// An item as printed by the CLI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    /// Item uid.
    pub uid: String,
    /// Display name.
    pub name: String,
    /// How many are wanted.
    pub desired_quantity: i64,
    /// How many are bought.
    pub current_quantity: i64,
}

impl From<&ShoppingItem> for ItemView {
    fn from(item: &ShoppingItem) -> Self {
        Self {
            uid: item.uid().to_string(),
            name: item.name().to_string(),
            desired_quantity: item.desired_quantity(),
            current_quantity: item.current_quantity(),
        }
    }
}

impl From<&ShoppingList> for ListView {
    fn from(list: &ShoppingList) -> Self {
        Self {
            uid: list.uid().to_string(),
            name: list.name().to_string(),
            items: list.items().map(ItemView::from).collect(),
        }
    }
}

/// Pretty-prints `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
