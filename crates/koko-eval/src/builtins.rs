//! Built-in functions.
//!
//! Each intrinsic receives traceable arguments like any other callable
//! and honors the same dependency contract: its result carries the
//! metadata of exactly the inputs that influenced it, which the call
//! boundary then translates back into caller space.

use crate::eval::{self, EvalError, EvalResult};
use crate::graphviz;
use crate::trace::collect_trace;
use crate::value::{ArrayData, HashData, Obj, ObjCopy, Object};
use rand::Rng;
use std::collections::BTreeSet;
use std::fs;

/// An intrinsic callable.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

pub type BuiltinFn = fn(&[Obj]) -> EvalResult<Obj>;

/// Registry, sorted by name (`builtins()` relies on the order).
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "array", func: builtin_array },
    Builtin { name: "bool", func: builtin_bool },
    Builtin { name: "builtins", func: builtin_builtins },
    Builtin { name: "dep_diagraph", func: builtin_dep_diagraph },
    Builtin { name: "deps", func: builtin_deps },
    Builtin { name: "drop", func: builtin_drop },
    Builtin { name: "first", func: builtin_first },
    Builtin { name: "float", func: builtin_float },
    Builtin { name: "int", func: builtin_int },
    Builtin { name: "keys", func: builtin_keys },
    Builtin { name: "last", func: builtin_last },
    Builtin { name: "len", func: builtin_len },
    Builtin { name: "print", func: builtin_print },
    Builtin { name: "push", func: builtin_push },
    Builtin { name: "rando", func: builtin_rando },
    Builtin { name: "read", func: builtin_read },
    Builtin { name: "rest", func: builtin_rest },
    Builtin { name: "string", func: builtin_string },
    Builtin { name: "take", func: builtin_take },
    Builtin { name: "type", func: builtin_type },
    Builtin { name: "values", func: builtin_values },
];

/// Look up a built-in by name, returning a fresh callable value.
pub fn lookup(name: &str) -> Option<Obj> {
    BUILTINS
        .iter()
        .find(|b| b.name == name)
        .map(Object::builtin)
}

fn expect_arity(args: &[Obj], want: usize) -> EvalResult<()> {
    if args.len() != want {
        return Err(EvalError::Arity {
            got: args.len(),
            want,
        });
    }
    Ok(())
}

fn expect_array<'a>(arg: &'a Obj, who: &str) -> EvalResult<&'a ArrayData> {
    arg.as_array()
        .ok_or_else(|| EvalError::Type(format!("argument to `{who}` must be ARRAY, got {}", arg.type_name())))
}

fn expect_hash<'a>(arg: &'a Obj, who: &str) -> EvalResult<&'a HashData> {
    arg.as_hash()
        .ok_or_else(|| EvalError::Type(format!("argument to `{who}` must be HASH, got {}", arg.type_name())))
}

fn expect_int(arg: &Obj, who: &str) -> EvalResult<i64> {
    arg.as_int()
        .ok_or_else(|| EvalError::Type(format!("argument to `{who}` must be INTEGER, got {}", arg.type_name())))
}

/// Give `res` the metadata of the input it was derived from.
fn derived_from(res: Obj, source: &Obj) -> Obj {
    res.merge_trace(&source.trace_clone());
    res.add_dep(source);
    res
}

fn builtin_len(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    if let Some(data) = args[0].as_array() {
        return Ok(derived_from(
            Object::int(data.elements.len() as i64),
            &data.length,
        ));
    }
    if let Some(data) = args[0].as_hash() {
        return Ok(derived_from(
            Object::int(data.pairs.len() as i64),
            &data.length,
        ));
    }
    if let Some(s) = args[0].as_str() {
        return Ok(derived_from(
            Object::int(s.chars().count() as i64),
            &args[0],
        ));
    }
    Err(EvalError::Type(format!(
        "argument to `len` not supported, got {}",
        args[0].type_name()
    )))
}

fn builtin_type(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    Ok(derived_from(Object::string(args[0].type_name()), &args[0]))
}

fn builtin_string(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    Ok(derived_from(Object::string(args[0].inspect()), &args[0]))
}

fn builtin_bool(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    Ok(derived_from(
        Object::bool_val(args[0].is_truthy()),
        &args[0],
    ))
}

fn builtin_int(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    use crate::value::ObjectKind;
    let res = match &args[0].kind {
        ObjectKind::Int(n) => Object::int(*n),
        ObjectKind::Float(x) => Object::int(*x as i64),
        ObjectKind::Bool(b) => Object::int(i64::from(*b)),
        // Parse failure yields nil, still tied to the input.
        ObjectKind::Str(s) => match s.trim().parse::<i64>() {
            Ok(n) => Object::int(n),
            Err(_) => match s.trim().parse::<f64>() {
                Ok(x) => Object::int(x as i64),
                Err(_) => Object::nil(),
            },
        },
        _ => {
            return Err(EvalError::Type(format!(
                "can't cast {} to an int",
                args[0].type_name()
            )))
        }
    };
    Ok(derived_from(res, &args[0]))
}

fn builtin_float(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    use crate::value::ObjectKind;
    let res = match &args[0].kind {
        ObjectKind::Int(n) => Object::float(*n as f64),
        ObjectKind::Float(x) => Object::float(*x),
        ObjectKind::Bool(b) => Object::float(if *b { 1.0 } else { 0.0 }),
        ObjectKind::Str(s) => match s.trim().parse::<f64>() {
            Ok(x) => Object::float(x),
            Err(_) => Object::nil(),
        },
        _ => {
            return Err(EvalError::Type(format!(
                "can't cast {} to a float",
                args[0].type_name()
            )))
        }
    };
    Ok(derived_from(res, &args[0]))
}

fn builtin_array(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    use crate::value::ObjectKind;
    match &args[0].kind {
        // Identity on arrays.
        ObjectKind::Array(_) => Ok(args[0].clone()),
        // A string explodes into single-character strings; every piece,
        // and the length, comes from the string.
        ObjectKind::Str(s) => {
            let trace = args[0].trace_clone();
            let elements: Vec<Obj> = s
                .chars()
                .map(|c| {
                    let elem = Object::string(c.to_string());
                    elem.merge_trace(&trace);
                    elem.add_dep(&args[0]);
                    elem
                })
                .collect();
            let arr = Object::array(elements);
            if let Some(data) = arr.as_array() {
                data.length.merge_trace(&trace);
                data.length.add_dep(&args[0]);
            }
            Ok(derived_from(arr, &args[0]))
        }
        _ => {
            let arr = Object::array(vec![args[0].copy()]);
            if let Some(data) = arr.as_array() {
                data.length.merge_trace(&args[0].trace_clone());
                data.length.add_dep(&args[0]);
            }
            Ok(derived_from(arr, &args[0]))
        }
    }
}

fn builtin_first(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    let data = expect_array(&args[0], "first")?;
    match data.elements.first() {
        Some(elem) => {
            let res = elem.copy();
            res.merge_trace(&data.offset.trace_clone());
            res.add_dep(&data.offset);
            Ok(res)
        }
        // Emptiness is a fact about the length.
        None => Ok(derived_from(Object::nil(), &data.length)),
    }
}

fn builtin_last(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    let data = expect_array(&args[0], "last")?;
    match data.elements.last() {
        Some(elem) => {
            let res = elem.copy();
            res.merge_trace(&data.offset.trace_clone());
            res.merge_trace(&data.length.trace_clone());
            res.add_dep(&data.offset);
            res.add_dep(&data.length);
            Ok(res)
        }
        None => Ok(derived_from(Object::nil(), &data.length)),
    }
}

fn builtin_rest(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    let data = expect_array(&args[0], "rest")?;
    if data.elements.is_empty() {
        return Ok(derived_from(Object::nil(), &data.length));
    }
    let elements: Vec<Obj> = data.elements[1..].iter().map(ObjCopy::copy).collect();
    let arr = Object::array(elements);
    if let Some(new_data) = arr.as_array() {
        new_data.length.merge_trace(&data.length.trace_clone());
        new_data.length.add_dep(&data.length);
    }
    Ok(derived_from(arr, &args[0]))
}

fn builtin_push(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 2)?;
    let data = expect_array(&args[0], "push")?;
    let mut elements: Vec<Obj> = data.elements.iter().map(ObjCopy::copy).collect();
    elements.push(args[1].clone());
    let arr = Object::array(elements);
    if let Some(new_data) = arr.as_array() {
        new_data.length.merge_trace(&data.length.trace_clone());
        new_data.length.add_dep(&data.length);
    }
    Ok(derived_from(arr, &args[0]))
}

fn builtin_take(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 2)?;
    let data = expect_array(&args[0], "take")?;
    let n = expect_int(&args[1], "take")?;
    if n < 0 || n as usize > data.elements.len() {
        return Err(EvalError::IndexOutOfRange(n));
    }
    let elements: Vec<Obj> = data.elements[..n as usize].iter().map(ObjCopy::copy).collect();
    let arr = Object::array(elements);
    if let Some(new_data) = arr.as_array() {
        new_data.length.merge_trace(&args[1].trace_clone());
        new_data.length.add_dep(&args[1]);
    }
    arr.merge_trace(&args[0].trace_clone());
    arr.add_dep(&args[0]);
    Ok(derived_from(arr, &args[1]))
}

fn builtin_drop(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 2)?;
    let data = expect_array(&args[0], "drop")?;
    let n = expect_int(&args[1], "drop")?;
    if n < 0 || n as usize > data.elements.len() {
        return Err(EvalError::IndexOutOfRange(n));
    }
    let count_trace = args[1].trace_clone();
    // Surviving elements shifted their observable index by the count,
    // mirroring concatenation's rule.
    let elements: Vec<Obj> = data.elements[n as usize..]
        .iter()
        .map(|elem| {
            let copied = elem.copy();
            copied.merge_trace(&count_trace);
            copied.add_dep(&args[1]);
            eval::shift_offset_sidecar(&copied, &count_trace, &args[1]);
            copied
        })
        .collect();
    let arr = Object::array(elements);
    if let Some(new_data) = arr.as_array() {
        new_data.length.merge_trace(&data.length.trace_clone());
        new_data.length.merge_trace(&count_trace);
        new_data.length.add_dep(&data.length);
        new_data.length.add_dep(&args[1]);
    }
    arr.merge_trace(&args[0].trace_clone());
    arr.add_dep(&args[0]);
    Ok(derived_from(arr, &args[1]))
}

fn builtin_keys(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    let data = expect_hash(&args[0], "keys")?;
    let elements: Vec<Obj> = data.pairs.values().map(|pair| pair.key.copy()).collect();
    let arr = Object::array(elements);
    if let Some(new_data) = arr.as_array() {
        new_data.length.merge_trace(&data.length.trace_clone());
        new_data.length.add_dep(&data.length);
    }
    Ok(derived_from(arr, &args[0]))
}

fn builtin_values(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    let data = expect_hash(&args[0], "values")?;
    let elements: Vec<Obj> = data.pairs.values().map(|pair| pair.value.copy()).collect();
    let arr = Object::array(elements);
    if let Some(new_data) = arr.as_array() {
        new_data.length.merge_trace(&data.length.trace_clone());
        new_data.length.add_dep(&data.length);
    }
    Ok(derived_from(arr, &args[0]))
}

fn builtin_read(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    let Some(path) = args[0].as_str() else {
        return Err(EvalError::Type(format!(
            "argument to `read` must be STRING, got {}",
            args[0].type_name()
        )));
    };
    let contents = fs::read_to_string(path).map_err(|e| EvalError::Io {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Ok(derived_from(Object::string(contents), &args[0]))
}

fn builtin_rando(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    let n = expect_int(&args[0], "rando")?;
    if n < 1 {
        return Err(EvalError::Domain(format!(
            "rando requires a bound of at least 1, got {n}"
        )));
    }
    let value = rand::thread_rng().gen_range(0..n);
    Ok(derived_from(Object::int(value), &args[0]))
}

fn builtin_print(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    println!("{}", args[0]);
    Ok(args[0].clone())
}

fn builtin_builtins(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 0)?;
    let names = BUILTINS
        .iter()
        .map(|b| Object::string(b.name))
        .collect();
    Ok(Object::array(names))
}

/// Apply a callable in trace mode and capsule the path-key dependency
/// set of its raw (untranslated) result.
fn builtin_deps(args: &[Obj]) -> EvalResult<Obj> {
    if args.is_empty() {
        return Err(EvalError::Arity { got: 0, want: 1 });
    }
    let result = eval::apply_function(&args[0], &args[1..])?;
    let keys: BTreeSet<String> = collect_trace(&result).into_iter().collect();
    Ok(Object::debug_trace(keys))
}

fn builtin_dep_diagraph(args: &[Obj]) -> EvalResult<Obj> {
    expect_arity(args, 1)?;
    Ok(derived_from(
        Object::string(graphviz::to_dot(&args[0])),
        &args[0],
    ))
}
