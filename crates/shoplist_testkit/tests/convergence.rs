//! Convergence of shopping lists across replicas.

use proptest::prelude::*;
use shoplist_crdt::Merge;
use shoplist_model::{ShoppingItem, ShoppingList};
use shoplist_protocol::{Message, OpType};
use shoplist_testkit::prelude::*;

fn edited(base: &ShoppingList, origin: &str, ops: &[ListOp]) -> ShoppingList {
    let mut list = base.clone();
    apply_ops(&mut list, origin, ops);
    list
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn merge_order_does_not_matter(
        base_ops in list_op_sequence_strategy(0, 10),
        ops_a in list_op_sequence_strategy(0, 20),
        ops_b in list_op_sequence_strategy(0, 20),
    ) {
        let base = edited(&ShoppingList::new("L", "Weekly"), "replica-0", &base_ops);
        let a = edited(&base, "replica-1", &ops_a);
        let b = edited(&base, "replica-2", &ops_b);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        prop_assert_eq!(list_view(&ab), list_view(&ba));
        prop_assert_eq!(ab.name(), ba.name());
    }

    #[test]
    fn merging_twice_is_merging_once(
        ops_a in list_op_sequence_strategy(0, 20),
        ops_b in list_op_sequence_strategy(0, 20),
    ) {
        let empty = ShoppingList::new("L", "Weekly");
        let mut a = edited(&empty, "replica-1", &ops_a);
        let b = edited(&empty, "replica-2", &ops_b);

        let before_self = list_view(&a);
        let snapshot = a.clone();
        a.merge(&snapshot);
        prop_assert_eq!(list_view(&a), before_self);

        a.merge(&b);
        let once = list_view(&a);
        a.merge(&b);
        prop_assert_eq!(list_view(&a), once);
    }

    #[test]
    fn three_way_merge_is_associative(
        ops_a in list_op_sequence_strategy(0, 15),
        ops_b in list_op_sequence_strategy(0, 15),
        ops_c in list_op_sequence_strategy(0, 15),
    ) {
        let empty = ShoppingList::new("L", "Weekly");
        let a = edited(&empty, "replica-1", &ops_a);
        let b = edited(&empty, "replica-2", &ops_b);
        let c = edited(&empty, "replica-3", &ops_c);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        prop_assert_eq!(list_view(&left), list_view(&right));
    }
}

#[test]
fn concurrent_readd_wins_over_remove() {
    let mut base = ShoppingList::new("L", "Weekly");
    base.add(ShoppingItem::new("milk", "Milk", "replica-0", 1, 0))
        .unwrap();

    let mut a = base.clone();
    assert!(a.remove("milk"));

    let mut b = base.clone();
    assert!(b.remove("milk"));
    b.add(ShoppingItem::new("milk", "Milk", "replica-2", 3, 0))
        .unwrap();

    let mut ab = a.clone();
    ab.merge(&b);
    let mut ba = b.clone();
    ba.merge(&a);

    assert!(ab.contains("milk"));
    assert!(ba.contains("milk"));
    assert_eq!(list_view(&ab), list_view(&ba));
}

#[test]
fn quantities_from_different_origins_add_up() {
    let mut base = ShoppingList::new("L", "Weekly");
    base.add(ShoppingItem::new("eggs", "Eggs", "replica-0", 6, 0))
        .unwrap();

    let mut a = base.clone();
    a.get_item_mut("eggs")
        .unwrap()
        .set_current_quantity("replica-1", 2);
    let mut b = base.clone();
    b.get_item_mut("eggs")
        .unwrap()
        .set_current_quantity("replica-2", 3);

    a.merge(&b);
    assert_eq!(a.get_item("eggs").unwrap().current_quantity(), 5);
    assert_eq!(a.get_item("eggs").unwrap().desired_quantity(), 6);
}

#[test]
fn replicas_converge_after_partition_heals() {
    let mut harness = ReplicaHarness::new(3);
    harness.partition(0, 1);
    harness.partition(0, 2);

    let mut left = ShoppingList::new("L", "Weekly");
    left.add(ShoppingItem::new("milk", "Milk", "c0", 2, 0))
        .unwrap();
    let mut right = ShoppingList::new("L", "Weekly");
    right
        .add(ShoppingItem::new("bread", "Bread", "c1", 1, 0))
        .unwrap();

    assert_eq!(
        harness.client(0, Message::ensure_list("c0", 1, left)).op,
        OpType::ListResponse
    );
    assert_eq!(
        harness.client(1, Message::ensure_list("c1", 1, right)).op,
        OpType::ListResponse
    );
    harness.deliver_all();

    let copies = harness.copies("L");
    assert!(!copies[0].as_ref().unwrap().contains("bread"));
    assert!(copies[2].as_ref().unwrap().contains("bread"));

    harness.heal();
    harness.gossip_round();
    harness.deliver_all();

    let views: Vec<_> = harness
        .copies("L")
        .iter()
        .map(|c| list_view(c.as_ref().unwrap()))
        .collect();
    assert_eq!(views[0].len(), 2);
    assert!(views.iter().all(|v| *v == views[0]));
}

#[test]
fn deleted_list_can_be_resurrected_by_stale_gossip() {
    let mut harness = ReplicaHarness::new(2);
    harness.client(0, Message::ensure_list("c", 1, ShoppingList::new("L", "Weekly")));
    harness.deliver_all();

    harness.partition(0, 1);
    harness.client(0, Message::delete_list("c", 2, "L"));
    harness.deliver_all();
    assert!(harness.copies("L")[0].is_none());

    // Replica 1 never saw the delete and gossips its copy back
    harness.heal();
    harness.gossip_round();
    harness.deliver_all();
    assert!(harness.copies("L")[0].is_some());
}
