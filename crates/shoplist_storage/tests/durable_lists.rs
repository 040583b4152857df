//! File-backed list store behaviour across reopen.

use shoplist_model::{ShoppingItem, ShoppingList};
use shoplist_storage::{ListStore, StorageError};
use tempfile::tempdir;

#[test]
fn lists_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("node0.log");

    {
        let mut store = ListStore::open(&path).unwrap();
        let mut list = ShoppingList::new("L", "Weekly");
        list.add(ShoppingItem::new("milk", "Milk", "n0", 2, 0))
            .unwrap();
        store.write(&list).unwrap();
        store.write(&ShoppingList::new("M", "Party")).unwrap();
        store.delete("M").unwrap();
    }

    let store = ListStore::open(&path).unwrap();
    assert_eq!(store.list_ids().unwrap(), vec!["L"]);
    let list = store.read("L").unwrap().unwrap();
    assert_eq!(list.name(), "Weekly");
    assert_eq!(list.get_item("milk").unwrap().desired_quantity(), 2);
}

#[test]
fn a_store_cannot_be_opened_twice() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("node0.log");

    let _held = ListStore::open(&path).unwrap();
    assert!(matches!(
        ListStore::open(&path),
        Err(StorageError::Locked { .. })
    ));
}

#[test]
fn many_overwrites_stay_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("node0.log");

    let mut store = ListStore::open(&path).unwrap();
    let mut list = ShoppingList::new("L", "Weekly");
    list.add(ShoppingItem::new("rice", "Rice", "n0", 0, 0))
        .unwrap();
    for n in 1..=200 {
        list.get_item_mut("rice")
            .unwrap()
            .set_desired_quantity("n0", n);
        store.write(&list).unwrap();
    }
    drop(store);

    let store = ListStore::open(&path).unwrap();
    let list = store.read("L").unwrap().unwrap();
    assert_eq!(list.get_item("rice").unwrap().desired_quantity(), 200);
}
