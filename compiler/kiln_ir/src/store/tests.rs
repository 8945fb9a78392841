use proptest::prelude::*;

use super::*;

/// Every operand edge has exactly one matching use edge and vice versa.
fn assert_edges_consistent(s: &Store) {
    for (id, data) in s.values.iter() {
        for (index, &operand) in data.operands.iter().enumerate() {
            let target = s.value(operand).unwrap();
            let matching = target
                .uses
                .iter()
                .filter(|u| u.user == id && u.index as usize == index)
                .count();
            assert_eq!(matching, 1, "operand {index} of {id:?} has {matching} use edges");
        }
        for edge in &data.uses {
            let user = s.value(edge.user).unwrap();
            assert_eq!(user.operands[edge.index as usize], id);
        }
    }
}

fn leaf(s: &mut Store) -> ValueId {
    s.alloc_value(TypeTable::I32, "", Payload::Undef, &[])
}

fn user(s: &mut Store, operands: &[ValueId]) -> ValueId {
    s.alloc_value(TypeTable::I32, "", Payload::Undef, operands)
}

// Operand edges

#[test]
fn alloc_records_uses_in_operand_order() {
    let mut s = Store::new();
    let a = leaf(&mut s);
    let b = leaf(&mut s);
    let u = user(&mut s, &[a, b, a]);
    let uses: Vec<(ValueId, u32)> = s.value(a).unwrap().uses.iter().map(|e| (e.user, e.index)).collect();
    assert_eq!(uses, vec![(u, 0), (u, 2)]);
    assert_edges_consistent(&s);
}

#[test]
fn set_operand_moves_one_edge() {
    let mut s = Store::new();
    let a = leaf(&mut s);
    let b = leaf(&mut s);
    let u = user(&mut s, &[a, a]);
    s.set_operand_raw(u, 1, b).unwrap();
    assert_eq!(s.value(a).unwrap().uses.len(), 1);
    assert_eq!(s.value(b).unwrap().uses.len(), 1);
    assert_edges_consistent(&s);
    assert_eq!(
        s.set_operand_raw(u, 5, b),
        Err(Error::IndexOutOfRange { index: 5, len: 2 })
    );
}

#[test]
fn replace_all_uses_rewrites_every_user() {
    let mut s = Store::new();
    let old = leaf(&mut s);
    let new = leaf(&mut s);
    let u1 = user(&mut s, &[old]);
    let u2 = user(&mut s, &[new, old]);
    s.replace_all_uses_raw(old, new).unwrap();
    assert!(s.value(old).unwrap().uses.is_empty());
    assert_eq!(s.value(u1).unwrap().operands.as_slice(), &[new]);
    assert_eq!(s.value(u2).unwrap().operands.as_slice(), &[new, new]);
    assert_eq!(s.value(new).unwrap().uses.len(), 3);
    assert_edges_consistent(&s);
}

#[test]
fn dropping_operands_clears_reverse_edges() {
    let mut s = Store::new();
    let a = leaf(&mut s);
    let u = user(&mut s, &[a, a]);
    s.drop_operands(u).unwrap();
    assert!(s.value(a).unwrap().uses.is_empty());
    s.replace_operands(u, &[a]).unwrap();
    assert_eq!(s.value(a).unwrap().uses.len(), 1);
    assert_edges_consistent(&s);
}

// Constants

#[test]
fn constants_are_interned() {
    let mut s = Store::new();
    let a = s.const_int(TypeTable::I32, 7);
    let b = s.const_int(TypeTable::I32, 7);
    let c = s.const_int(TypeTable::I64, 7);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(s.int_value(a), Some(7));
    let undef = s.undef(TypeTable::I8);
    assert_eq!(s.undef(TypeTable::I8), undef);
    assert!(s.is_undef(undef));
}

#[test]
fn mutated_aggregates_leave_the_intern_table() {
    let mut s = Store::new();
    let one = s.const_int(TypeTable::I32, 1);
    let two = s.const_int(TypeTable::I32, 2);
    let ty = s.types.array(TypeTable::I32, 1).unwrap();
    let array = s.const_aggregate(ty, AggregateKind::Array, &[one]);
    s.set_operand_raw(array, 0, two).unwrap();
    let fresh = s.const_aggregate(ty, AggregateKind::Array, &[one]);
    assert_ne!(array, fresh);
}

// Metadata kinds

#[test]
fn metadata_kinds_are_stable() {
    let mut s = Store::new();
    assert_eq!(s.md_kind_id("dbg"), 0);
    let range = s.md_kind_id("range");
    assert_eq!(s.md_kind_id("range"), range);
    assert_eq!(s.md_kind_name(range), Some("range"));
    assert_eq!(s.md_kind_name(99), None);
}

// Ownership

#[test]
fn transfer_requires_the_current_owner() {
    let mut s = Store::new();
    let id = s.modules.insert(ModuleData {
        name: "m".into(),
        data_layout: String::new(),
        target_triple: String::new(),
        inline_asm: String::new(),
        functions: Vec::new(),
        globals: Vec::new(),
        aliases: Vec::new(),
        owner: Owner::Caller,
    });
    s.transfer_module(id, Owner::Caller, Owner::Engine(1)).unwrap();
    assert_eq!(
        s.transfer_module(id, Owner::Caller, Owner::Engine(2)),
        Err(Error::OwnerMismatch {
            expected: Owner::Caller,
            found: Owner::Engine(1),
        })
    );
}

mod proptest_edges {
    use super::*;

    /// One mutation of the graph, with indices taken modulo the live sets.
    #[derive(Clone, Debug)]
    enum Op {
        Leaf,
        User(Vec<usize>),
        SetOperand(usize, usize, usize),
        ReplaceAll(usize, usize),
        Drop(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Leaf),
            prop::collection::vec(any::<usize>(), 0..4).prop_map(Op::User),
            (any::<usize>(), any::<usize>(), any::<usize>()).prop_map(|(u, i, v)| Op::SetOperand(u, i, v)),
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::ReplaceAll(a, b)),
            any::<usize>().prop_map(Op::Drop),
        ]
    }

    fn pick(values: &[ValueId], i: usize) -> ValueId {
        values[i % values.len()]
    }

    proptest! {
        #[test]
        fn operands_and_uses_stay_dual(ops in prop::collection::vec(op(), 1..40)) {
            let mut s = Store::new();
            let mut values = vec![leaf(&mut s)];
            for op in ops {
                match op {
                    Op::Leaf => values.push(leaf(&mut s)),
                    Op::User(operands) => {
                        let operands: Vec<ValueId> = operands.into_iter().map(|i| pick(&values, i)).collect();
                        values.push(user(&mut s, &operands));
                    }
                    Op::SetOperand(u, i, v) => {
                        let (u, v) = (pick(&values, u), pick(&values, v));
                        let len = s.value(u).unwrap().operands.len();
                        if len > 0 {
                            s.set_operand_raw(u, i % len, v).unwrap();
                        }
                    }
                    Op::ReplaceAll(a, b) => {
                        let (a, b) = (pick(&values, a), pick(&values, b));
                        s.replace_all_uses_raw(a, b).unwrap();
                    }
                    Op::Drop(u) => {
                        let u = pick(&values, u);
                        s.drop_operands(u).unwrap();
                    }
                }
            }
            assert_edges_consistent(&s);
        }
    }
}
