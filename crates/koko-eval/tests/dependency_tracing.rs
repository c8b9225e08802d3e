//! Integration tests for dependency tracing through function calls.
//!
//! The `deps` built-in applies a callable in trace mode and returns the
//! path-key dependency set of the result: `i` names argument `i`,
//! `i|j|k` names a nested element, a trailing `#` names a `length`
//! sidecar.

use koko_eval::{load_program, Environment, Obj, ObjectKind};

fn eval(source: &str) -> Obj {
    let env = Environment::root();
    load_program(source, &env).expect("program failed")
}

#[track_caller]
fn assert_deps(result: &Obj, expected: &[&str]) {
    let ObjectKind::DebugTrace(keys) = &result.kind else {
        panic!("expected a debug trace value, got {:?}", result);
    };
    let mut actual: Vec<&str> = keys.iter().map(String::as_str).collect();
    actual.sort_unstable();
    let mut expected: Vec<&str> = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "dependency sets differ");
}

#[test]
fn tracking_in_basic_function_with_integers() {
    let res = eval("let f = fn(a, b) { b }; deps(f, 1, 2)");
    assert_deps(&res, &["1"]);
}

#[test]
fn tracking_in_basic_function_with_integer_addition() {
    let res = eval("let f = fn(a, b, c) { a + c }; deps(f, 1, 2, 3)");
    assert_deps(&res, &["0", "2"]);
}

#[test]
fn tracking_in_basic_function_with_integer_multiplication() {
    // A zero factor short-circuits the dependency to the zero alone.
    let res = eval("let f = fn(a, b, c) { a * b * c }; deps(f, 1, 2, 0)");
    assert_deps(&res, &["2"]);
}

#[test]
fn zero_multiplication_short_circuit_in_pure_function() {
    let res = eval("let f = pfn(a, b) { a * b }; deps(f, 0, 7)");
    assert_deps(&res, &["0"]);
}

#[test]
fn tracking_in_basic_function_with_conditional() {
    let res = eval("let f = fn(a, b, c) { if (a > 0) { b } else { c } }; deps(f, 1, 2, 0)");
    assert_deps(&res, &["0", "1"]);
    let res = eval("let f = fn(a, b, c) { if (a > 0) { b } else { c } }; deps(f, -1, 2, 0)");
    assert_deps(&res, &["0", "2"]);
}

#[test]
fn tracking_conditional_in_pure_function() {
    let res = eval("let f = pfn(a, b, c) { if (a > 0) { b } else { c } }; deps(f, 1, 2, 0)");
    assert_deps(&res, &["0", "1"]);
    let res = eval("let f = pfn(a, b, c) { if (a > 0) { b } else { c } }; deps(f, -1, 2, 0)");
    assert_deps(&res, &["0", "2"]);
}

#[test]
fn tracking_in_sub_functions() {
    let res = eval("let g = fn(a, b) { b }; let f = fn(a, b, c) { g(c, a) }; deps(f, 1, 2, 3)");
    assert_deps(&res, &["0"]);
}

#[test]
fn tracking_in_basic_function_with_arrays() {
    let res = eval("let f = fn(a) { a[2] + a[3] }; deps(f, [1,2,3,4,5])");
    assert_deps(&res, &["0|2", "0|3"]);
}

#[test]
fn tracking_in_pure_function_with_arrays() {
    let res = eval("let f = pfn(a) { a[2] + a[3] }; deps(f, [1,2,3,4,5])");
    assert_deps(&res, &["0|2", "0|3"]);
}

#[test]
fn tracking_in_function_returning_an_array() {
    let res = eval("let f = fn(a) { [a[0],a[1],a[2],a[3]] }; deps(f, [1,2,3,4,5])");
    assert_deps(&res, &["0|0", "0|1", "0|2", "0|3"]);
}

#[test]
fn tracking_in_sub_functions_with_arrays() {
    let res = eval(
        "let f = fn(a) { [a[0],a[1],a[2],a[3]] }; let g = fn(a) { f(a)[0] + f(a)[2] }; deps(g, [1,2,3,4,5])",
    );
    assert_deps(&res, &["0|0", "0|2"]);
}

#[test]
fn array_concatenation_shifts_offsets() {
    // Index 2 of (b + a) with len(b) = 2 lands in a at position 0; the
    // element depends on a[0] and on len(b), not on b's elements.
    let res = eval("let f = fn(a, b) { (b + a)[2] }; deps(f, [1,2], [3, 4])");
    assert_deps(&res, &["0|0", "1#"]);
    let res = eval("let f = fn(a, b) { (b + a)[1] }; deps(f, [1,2], [3, 4])");
    assert_deps(&res, &["1|1"]);
}

#[test]
fn array_concatenation_shifts_offsets_pure() {
    let res = eval("let f = pfn(a,b) { (b + a)[2] }; deps(f, [1,2], [3,4])");
    assert_deps(&res, &["0|0", "1#"]);
}

#[test]
fn offset_dependencies_in_sub_arrays() {
    let res = eval("let f = fn(a, b) { (a + b)[3][2][1] }; deps(f, [1, 2, 3], [[4, 5, [6, 7]]])");
    assert_deps(&res, &["1|0|2|1", "0#"]);
}

#[test]
fn offset_dependencies_in_sub_arrays_through_functions() {
    let res = eval(
        "let f = fn(x, y, a, b) { a + b };
         let g = fn(a, b) { f(0, 0, a, b)[3][2][1] }
         deps(g, [1, 2, 3], [[4, 5, [6, 7]]])",
    );
    assert_deps(&res, &["1|0|2|1", "0#"]);
}

#[test]
fn string_to_array_conversion() {
    let res = eval("let f = fn(s) { array(s)[2] }; deps(f, \"hello word\")");
    assert_deps(&res, &["0"]);
    let res = eval("let f = fn(s) { len(array(s)) }; deps(f, \"hello word\")");
    assert_deps(&res, &["0"]);
}

#[test]
fn string_to_array_conversion_for_other_types() {
    let res = eval("let f = fn(s) { len(array(s)) }; deps(f, 1)");
    assert_deps(&res, &["0"]);
}

#[test]
fn length_dependency_surfaces_as_length_key() {
    let res = eval("let f = fn(a) { len(a) }; deps(f, [1, 2, 3])");
    assert_deps(&res, &["0#"]);
}

#[test]
fn fibonacci_evaluates() {
    let res = eval(
        "let fib = fn(x){ if (x==1){1} else { if (x==0){1} else { fib(x-1)+fib(x-2)}}}; fib(8)",
    );
    assert_eq!(res.as_int(), Some(34));
}

#[test]
fn pure_function_cache_projects_consumed_paths() {
    // Both calls read only a[0]; the second call hits the cache despite
    // the differing tails, so the cache holds exactly one line.
    let env = Environment::root();
    let res = load_program(
        "let f = pfn(a) { a[0] }; f([1,9,9,9]); f([1,2,2,2])",
        &env,
    )
    .expect("program failed");
    assert_eq!(res.as_int(), Some(1));

    let f = env.borrow().get("f").expect("f is bound");
    let ObjectKind::PureFunction(data) = &f.kind else {
        panic!("expected pure function");
    };
    assert_eq!(data.cache.borrow().len(), 1);
}

#[test]
fn pure_function_cache_misses_on_consumed_path_change() {
    let env = Environment::root();
    load_program("let f = pfn(a) { a[0] }; f([1,9]); f([2,9])", &env).expect("program failed");
    let f = env.borrow().get("f").expect("f is bound");
    let ObjectKind::PureFunction(data) = &f.kind else {
        panic!("expected pure function");
    };
    assert_eq!(data.cache.borrow().len(), 2);
}

#[test]
fn pure_function_calls_are_idempotent() {
    let res = eval(
        "let f = pfn(a, b) { a * b + a }; [f(3, 4), f(3, 4)][0] == [f(3, 4), f(3, 4)][1]",
    );
    assert_eq!(res.inspect(), "true");
}

#[test]
fn pure_fibonacci_reuses_cache() {
    let env = Environment::root();
    let res = load_program(
        "let fib = pfn(x){ if (x==1){1} else { if (x==0){1} else { fib(x-1)+fib(x-2)}}}; fib(15)",
        &env,
    )
    .expect("program failed");
    assert_eq!(res.as_int(), Some(987));

    // Memoization bounds the cache by distinct arguments, not by the
    // exponential call tree.
    let f = env.borrow().get("fib").expect("fib is bound");
    let ObjectKind::PureFunction(data) = &f.kind else {
        panic!("expected pure function");
    };
    assert!(data.cache.borrow().len() <= 16);
}

#[test]
fn concatenation_length_law() {
    let res = eval("len([1, 2] + [3, 4, 5])");
    assert_eq!(res.as_int(), Some(5));
    let res = eval("len(\"ab\" + \"cde\")");
    assert_eq!(res.as_int(), Some(5));
}

#[test]
fn merge_sort_sorts() {
    let program = r#"
    let get_n_elements = fn(arr, offset, number_of_elements) { if (number_of_elements == 0) { [] } else { [arr[offset]] + get_n_elements(arr, offset + 1, number_of_elements - 1) } }

    let car = fn(a) { a[0] }
    let cdr = fn(a) { get_n_elements(a, 1, len(a) - 1) }

    let merge_elements = fn(res_lower, res_upper) {
         if (len(res_lower) == 0) {
            if (len(res_upper) == 0) {
                []
            } else {
                res_upper
            }
         } else {
            if (len(res_upper) == 0) {
                res_lower
            } else {
                if (car(res_upper) < car(res_lower)) {
                    [car(res_upper)] + merge_elements(res_lower, cdr(res_upper))
                } else {
                    [car(res_lower)] + merge_elements(res_upper, cdr(res_lower))
                }
            }
        }
    }

    let merge_sort = fn(arr) { if (len(arr) < 2) { return arr } else { let half = int(len(arr)/2); let res_lower = get_n_elements(arr, 0, half); let res_upper = get_n_elements(arr, half, len(arr) - half); merge_elements(merge_sort(res_lower), merge_sort(res_upper)) } }
    merge_sort([5, -3, 11, 0, 2, 2, -7, 9])
    "#;
    let res = eval(program);
    assert_eq!(res.inspect(), "[-7, -3, 0, 2, 2, 5, 9, 11]");
}

#[test]
fn debug_trace_survives_the_call_boundary() {
    // `deps(...)` is itself a call; the capsule's payload must not be
    // rewritten by the boundary translation.
    let res = eval("let f = fn(a) { a }; let g = fn(h) { deps(f, 7) }; g(0)");
    assert_deps(&res, &["0"]);
}

#[test]
fn graph_export_renders_dot() {
    let res = eval("let a = 1; let b = 2; dep_diagraph(string(a + b))");
    let text = res.inspect();
    assert!(text.starts_with("digraph G {"));
    assert!(text.ends_with('}'));
}
