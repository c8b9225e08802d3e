//! Property tests for the universal invariants of the value model.

use koko_eval::{load_program, Environment, Obj, ObjCopy, Object, ObjectKind};
use proptest::prelude::*;

fn eval(source: &str) -> Obj {
    let env = Environment::root();
    load_program(source, &env).expect("program failed")
}

/// Arbitrary scalar and shallowly nested values.
fn value_strategy() -> impl Strategy<Value = Obj> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Object::int),
        any::<bool>().prop_map(Object::bool_val),
        "[a-z]{0,8}".prop_map(|s: String| Object::string(s)),
        (-1.0e9f64..1.0e9).prop_map(Object::float),
        Just(Object::nil()),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Object::array)
    })
}

proptest! {
    #[test]
    fn equality_is_reflexive_and_symmetric(a in value_strategy(), b in value_strategy()) {
        prop_assert!(a.equal(&a));
        prop_assert!(b.equal(&b));
        prop_assert_eq!(a.equal(&b), b.equal(&a));
    }

    #[test]
    fn copy_preserves_content_and_records_origin(v in value_strategy()) {
        let copied = v.copy();
        prop_assert!(copied.equal(&v));
        prop_assert!(copied.deps().contains(&v));
    }

    #[test]
    fn array_length_sidecar_matches_count(elems in prop::collection::vec(any::<i64>(), 0..12)) {
        let arr = Object::array(elems.iter().copied().map(Object::int).collect());
        let data = arr.as_array().unwrap();
        prop_assert_eq!(data.length.as_int(), Some(elems.len() as i64));
    }

    #[test]
    fn concatenation_length_law(
        a in prop::collection::vec(-1000i64..1000, 0..8),
        b in prop::collection::vec(-1000i64..1000, 0..8),
    ) {
        let render = |v: &[i64]| {
            let parts: Vec<String> = v.iter().map(i64::to_string).collect();
            format!("[{}]", parts.join(", "))
        };
        let src = format!("len({} + {})", render(&a), render(&b));
        prop_assert_eq!(eval(&src).as_int(), Some((a.len() + b.len()) as i64));
    }

    #[test]
    fn string_concatenation_length_law(a in "[a-z]{0,10}", b in "[a-z]{0,10}") {
        let src = format!("len(\"{a}\" + \"{b}\")");
        prop_assert_eq!(eval(&src).as_int(), Some((a.len() + b.len()) as i64));
    }

    #[test]
    fn pure_function_is_idempotent_under_cache(n in -1000i64..1000) {
        let src = format!("let f = pfn(a) {{ a * a + a }}; f({n}) == f({n})");
        prop_assert_eq!(eval(&src).inspect(), "true");
    }

    #[test]
    fn zero_multiplication_dependency_minimality(x in 1i64..1000) {
        let src = format!("let f = pfn(a, b) {{ a * b }}; deps(f, 0, {x})");
        let res = eval(&src);
        let ObjectKind::DebugTrace(keys) = &res.kind else {
            panic!("expected debug trace, got {res:?}");
        };
        let expected: std::collections::BTreeSet<String> = ["0".to_string()].into();
        prop_assert_eq!(keys, &expected);
    }
}
