//! Tree-walking evaluator for Koko.
//!
//! Implements the language semantics together with dependency
//! propagation: every rule records which values a result was derived
//! from, both as edges between value handles and as path-key traces that
//! flow through function-call boundaries.

use crate::builtins;
use crate::env::{Env, Environment};
use crate::trace::{collect_trace, fingerprint_args, rewrite_args, translate_result};
use crate::value::{Creator, HashPair, Obj, ObjCopy, Object, ObjectKind, TraceSet};
use koko_syntax::{parse, Block, Expr, InfixOp, PrefixOp, Program, Stmt};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, trace};

/// Runtime failure. Propagated with `?` and surfaced as the program's
/// final result; evaluation never panics on user input.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("wrong number of arguments: got {got}, want {want}")]
    Arity { got: usize, want: usize },

    #[error("type mismatch: {0}")]
    Type(String),

    #[error("identifier not found: {0}")]
    NameNotFound(String),

    #[error("index out of range: {0}")]
    IndexOutOfRange(i64),

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("{0}")]
    Domain(String),

    #[error("could not read {path}: {message}")]
    Io { path: String, message: String },

    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },
}

pub type EvalResult<T> = Result<T, EvalError>;

fn type_error(message: impl Into<String>) -> EvalError {
    EvalError::Type(message.into())
}

/// Parse and evaluate a program string in a fresh root environment,
/// returning the rendered inspect form of its result.
pub fn execute_program(source: &str) -> String {
    let env = Environment::root();
    match load_program(source, &env) {
        Ok(obj) => obj.inspect(),
        Err(e) => Object::error(e.to_string()).inspect(),
    }
}

/// Parse and evaluate a program string in the given environment.
pub fn load_program(source: &str, env: &Env) -> EvalResult<Obj> {
    let program = parse(source).map_err(|e| EvalError::Parse {
        path: "<input>".to_string(),
        message: e.to_string(),
    })?;
    eval_program(&program, env)
}

/// Read, parse, and evaluate a program file in the given environment.
pub fn load_program_from_file(path: impl AsRef<Path>, env: &Env) -> EvalResult<Obj> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| EvalError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let program = parse(&source).map_err(|e| EvalError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    eval_program(&program, env)
}

/// Evaluate a program: statements in order, result is the last
/// statement's value. A top-level `return` short-circuits.
pub fn eval_program(program: &Program, env: &Env) -> EvalResult<Obj> {
    let mut result = Object::nil();
    for stmt in &program.statements {
        result = eval_stmt(stmt, env)?;
        if matches!(result.kind, ObjectKind::Return(_)) {
            return Ok(unwrap_return(result));
        }
    }
    Ok(result)
}

fn eval_stmt(stmt: &Stmt, env: &Env) -> EvalResult<Obj> {
    match stmt {
        Stmt::Let { name, value, .. } => {
            let bound = eval_expr(value, env)?;
            Ok(env.borrow_mut().set(name.name.clone(), bound))
        }
        Stmt::Return { value, span } => {
            let inner = eval_expr(value, env)?;
            let wrapper = Object::return_value(inner);
            wrapper.stamp_creator(Creator::new(stmt.to_string(), *span));
            Ok(wrapper)
        }
        Stmt::Expr { expr, .. } => eval_expr(expr, env),
        Stmt::Import { path, .. } => eval_import(path, env),
    }
}

fn eval_import(path: &str, env: &Env) -> EvalResult<Obj> {
    debug!(path, "importing program");
    load_program_from_file(path, env)
}

/// Evaluate statements in order; a `Return` wrapper bubbles out
/// unwrapped so the enclosing call boundary can handle it.
fn eval_block(block: &Block, env: &Env) -> EvalResult<Obj> {
    let mut result = Object::nil();
    for stmt in &block.statements {
        result = eval_stmt(stmt, env)?;
        if matches!(result.kind, ObjectKind::Return(_)) {
            return Ok(result);
        }
    }
    Ok(result)
}

fn eval_expr(expr: &Expr, env: &Env) -> EvalResult<Obj> {
    let result = match expr {
        Expr::Ident(ident) => eval_identifier(&ident.name, env)?,
        Expr::IntLit { value, .. } => Object::int(*value),
        Expr::FloatLit { value, .. } => Object::float(*value),
        Expr::StringLit { value, .. } => Object::string(value.clone()),
        Expr::BoolLit { value, .. } => Object::bool_val(*value),
        Expr::Prefix { op, right, .. } => {
            let right = eval_expr(right, env)?;
            eval_prefix(*op, &right)?
        }
        Expr::Infix {
            op, left, right, ..
        } => {
            let left = eval_expr(left, env)?;
            let right = eval_expr(right, env)?;
            eval_infix(*op, &left, &right)?
        }
        Expr::If {
            cond,
            consequence,
            alternative,
            ..
        } => eval_if(cond, consequence, alternative.as_ref(), env)?,
        Expr::FunctionLit { params, body, .. } => Object::function(
            std::rc::Rc::new(params.clone()),
            std::rc::Rc::new(body.clone()),
            env.clone(),
        ),
        Expr::PureFunctionLit { params, body, .. } => Object::pure_function(
            std::rc::Rc::new(params.clone()),
            std::rc::Rc::new(body.clone()),
            env.clone(),
        ),
        Expr::Call { func, args, .. } => {
            let function = eval_expr(func, env)?;
            let arg_values = eval_expressions(args, env)?;
            let res = apply_function(&function, &arg_values)?;
            translate_result(&res, &arg_values)
        }
        Expr::ArrayLit { elements, .. } => {
            let values = eval_expressions(elements, env)?;
            Object::array(values)
        }
        Expr::Index { left, index, .. } => {
            let left = eval_expr(left, env)?;
            let index = eval_expr(index, env)?;
            eval_index(&left, &index)?
        }
        Expr::HashLit { pairs, .. } => eval_hash_literal(pairs, env)?,
    };
    stamp(&result, expr);
    Ok(result)
}

/// Stamp the producing node onto the result (and its sidecars) unless an
/// earlier rule already annotated it.
fn stamp(obj: &Obj, expr: &Expr) {
    let span = expr.span();
    let text = expr.to_string();
    if let Some(data) = obj.as_array() {
        data.length
            .stamp_creator(Creator::new(format!("len({text})"), span));
        data.offset
            .stamp_creator(Creator::new(format!("offset({text})"), span));
    }
    if let Some(data) = obj.as_hash() {
        data.length
            .stamp_creator(Creator::new(format!("len({text})"), span));
        data.offset
            .stamp_creator(Creator::new(format!("offset({text})"), span));
    }
    obj.stamp_creator(Creator::new(text, span));
}

fn eval_identifier(name: &str, env: &Env) -> EvalResult<Obj> {
    if let Some(value) = env.borrow().get(name) {
        return Ok(value);
    }
    if let Some(builtin) = builtins::lookup(name) {
        return Ok(builtin);
    }
    Err(EvalError::NameNotFound(name.to_string()))
}

fn eval_expressions(exprs: &[Expr], env: &Env) -> EvalResult<Vec<Obj>> {
    exprs.iter().map(|e| eval_expr(e, env)).collect()
}

fn eval_prefix(op: PrefixOp, right: &Obj) -> EvalResult<Obj> {
    match op {
        PrefixOp::Bang => {
            let res = Object::bool_val(!right.is_truthy());
            res.merge_trace(&right.trace_clone());
            res.add_dep(right);
            Ok(res)
        }
        PrefixOp::Minus => {
            let res = match &right.kind {
                ObjectKind::Int(n) => Object::int(n.wrapping_neg()),
                ObjectKind::Float(x) => Object::float(-x),
                _ => return Err(type_error(format!("unknown operator: -{}", right.type_name()))),
            };
            res.merge_trace(&right.trace_clone());
            res.add_dep(right);
            Ok(res)
        }
    }
}

/// Attach both operands' metadata to a freshly built result.
fn with_operands(res: Obj, left: &Obj, right: &Obj) -> Obj {
    res.merge_trace(&left.trace_clone());
    res.merge_trace(&right.trace_clone());
    res.add_dep(left);
    res.add_dep(right);
    res
}

fn eval_infix(op: InfixOp, left: &Obj, right: &Obj) -> EvalResult<Obj> {
    // Equality is defined for every variant pair.
    match op {
        InfixOp::Eq => return Ok(with_operands(Object::bool_val(left.equal(right)), left, right)),
        InfixOp::NotEq => {
            return Ok(with_operands(
                Object::bool_val(!left.equal(right)),
                left,
                right,
            ))
        }
        _ => {}
    }

    match (&left.kind, &right.kind) {
        (ObjectKind::Array(_), ObjectKind::Array(_)) => eval_array_infix(op, left, right),
        (ObjectKind::Hash(_), ObjectKind::Hash(_)) => eval_hash_infix(op, left, right),
        (ObjectKind::Str(_), ObjectKind::Str(_)) => match op {
            InfixOp::Add => Ok(add_strings(left, right)),
            _ => Err(type_error(format!("unsupported operator {op} for strings"))),
        },
        (ObjectKind::Str(_), ObjectKind::Int(_)) if op == InfixOp::Mul => {
            Ok(multiply_string(left, right))
        }
        (ObjectKind::Int(_), ObjectKind::Str(_)) if op == InfixOp::Mul => {
            Ok(multiply_string(right, left))
        }
        (ObjectKind::Str(_), _) | (_, ObjectKind::Str(_)) if op == InfixOp::Add => {
            Ok(add_strings(left, right))
        }
        (ObjectKind::Int(l), ObjectKind::Int(r)) => eval_integer_infix(op, *l, *r, left, right),
        (ObjectKind::Int(l), ObjectKind::Float(r)) => {
            eval_float_infix(op, *l as f64, *r, left, right)
        }
        (ObjectKind::Float(l), ObjectKind::Int(r)) => {
            eval_float_infix(op, *l, *r as f64, left, right)
        }
        (ObjectKind::Float(l), ObjectKind::Float(r)) => eval_float_infix(op, *l, *r, left, right),
        _ => Err(type_error(format!(
            "{} {} {}",
            left.type_name(),
            op,
            right.type_name()
        ))),
    }
}

fn eval_integer_infix(op: InfixOp, l: i64, r: i64, left: &Obj, right: &Obj) -> EvalResult<Obj> {
    let res = match op {
        InfixOp::Add => Object::int(l.wrapping_add(r)),
        InfixOp::Sub => Object::int(l.wrapping_sub(r)),
        InfixOp::Mul => {
            let res = Object::int(l.wrapping_mul(r));
            // If one factor is zero the other never influenced the
            // result; depend on the zero alone.
            if l == 0 {
                res.merge_trace(&left.trace_clone());
                res.add_dep(left);
                return Ok(res);
            } else if r == 0 {
                res.merge_trace(&right.trace_clone());
                res.add_dep(right);
                return Ok(res);
            }
            res
        }
        InfixOp::Div => return eval_float_infix(op, l as f64, r as f64, left, right),
        InfixOp::Mod => {
            if r == 0 {
                return Err(EvalError::Domain("integer modulo by zero".to_string()));
            }
            Object::int(l.wrapping_rem(r))
        }
        InfixOp::Lt => Object::bool_val(l < r),
        InfixOp::Gt => Object::bool_val(l > r),
        InfixOp::Eq | InfixOp::NotEq => unreachable!("equality handled by eval_infix"),
    };
    Ok(with_operands(res, left, right))
}

fn eval_float_infix(op: InfixOp, l: f64, r: f64, left: &Obj, right: &Obj) -> EvalResult<Obj> {
    let res = match op {
        InfixOp::Add => Object::float(l + r),
        InfixOp::Sub => Object::float(l - r),
        InfixOp::Mul => {
            let res = Object::float(l * r);
            if l == 0.0 {
                res.merge_trace(&left.trace_clone());
                res.add_dep(left);
                return Ok(res);
            } else if r == 0.0 {
                res.merge_trace(&right.trace_clone());
                res.add_dep(right);
                return Ok(res);
            }
            res
        }
        InfixOp::Div => Object::float(l / r),
        InfixOp::Mod => Object::float(l % r),
        InfixOp::Lt => Object::bool_val(l < r),
        InfixOp::Gt => Object::bool_val(l > r),
        InfixOp::Eq | InfixOp::NotEq => unreachable!("equality handled by eval_infix"),
    };
    Ok(with_operands(res, left, right))
}

/// Concatenate the rendered forms of both operands.
fn add_strings(left: &Obj, right: &Obj) -> Obj {
    with_operands(
        Object::string(format!("{}{}", left, right)),
        left,
        right,
    )
}

/// Repeat a string. A non-positive count yields the empty string
/// depending on the count alone; an empty string depends on the string
/// alone — the other operand never influenced the result.
fn multiply_string(string: &Obj, count: &Obj) -> Obj {
    let s = string.as_str().unwrap_or_default();
    let n = count.as_int().unwrap_or_default();

    if n <= 0 {
        let res = Object::string("");
        res.merge_trace(&count.trace_clone());
        res.add_dep(count);
        return res;
    }
    if s.is_empty() {
        let res = Object::string("");
        res.merge_trace(&string.trace_clone());
        res.add_dep(string);
        return res;
    }
    with_operands(Object::string(s.repeat(n as usize)), string, count)
}

fn eval_array_infix(op: InfixOp, left: &Obj, right: &Obj) -> EvalResult<Obj> {
    match op {
        InfixOp::Add => Ok(concat_arrays(left, right)),
        _ => Err(type_error(format!("unsupported operator {op} for arrays"))),
    }
}

/// Logical concatenation. Copies drawn from the right operand shifted
/// their observable index by the left length, so they (and their offset
/// sidecars, for container elements) gain the left `length` sidecar's
/// metadata. The result's length depends on both operand lengths.
fn concat_arrays(left: &Obj, right: &Obj) -> Obj {
    let left_data = left.as_array().expect("caller checked array");
    let right_data = right.as_array().expect("caller checked array");
    let left_length_trace = left_data.length.trace_clone();

    let mut elements = Vec::with_capacity(left_data.elements.len() + right_data.elements.len());
    for elem in &left_data.elements {
        elements.push(elem.copy());
    }
    for elem in &right_data.elements {
        let copied = elem.copy();
        copied.merge_trace(&left_length_trace);
        copied.add_dep(&left_data.length);
        shift_offset_sidecar(&copied, &left_length_trace, &left_data.length);
        elements.push(copied);
    }

    let res = Object::array(elements);
    res.merge_trace(&left.trace_clone());
    res.merge_trace(&right.trace_clone());
    res.add_dep(left);
    res.add_dep(right);
    if let Some(data) = res.as_array() {
        data.length.merge_trace(&left_length_trace);
        data.length.merge_trace(&right_data.length.trace_clone());
        data.length.add_dep(&left_data.length);
        data.length.add_dep(&right_data.length);
    }
    res
}

/// Mark a container copy's `offset` sidecar as shifted by `dep`.
pub(crate) fn shift_offset_sidecar(obj: &Obj, trace: &TraceSet, dep: &Obj) {
    let offset = match &obj.kind {
        ObjectKind::Array(data) => &data.offset,
        ObjectKind::Hash(data) => &data.offset,
        _ => return,
    };
    offset.merge_trace(trace);
    offset.add_dep(dep);
}

fn eval_hash_infix(op: InfixOp, left: &Obj, right: &Obj) -> EvalResult<Obj> {
    let left_data = left.as_hash().expect("caller checked hash");
    let right_data = right.as_hash().expect("caller checked hash");

    let pairs = match op {
        // Union; right wins on key conflicts.
        InfixOp::Add => {
            let mut pairs = left_data.pairs.clone();
            for (key, pair) in &right_data.pairs {
                pairs.insert(*key, pair.clone());
            }
            pairs
        }
        // Remove from left any key whose value equals that in right.
        InfixOp::Sub => {
            let mut pairs = left_data.pairs.clone();
            for (key, pair) in &right_data.pairs {
                let matches = pairs
                    .get(key)
                    .is_some_and(|existing| existing.value.equal(&pair.value));
                if matches {
                    pairs.remove(key);
                }
            }
            pairs
        }
        _ => return Err(type_error(format!("unsupported operator {op} for hashes"))),
    };

    let res = Object::hash(pairs);
    res.merge_trace(&left.trace_clone());
    res.merge_trace(&right.trace_clone());
    res.add_dep(left);
    res.add_dep(right);
    if let Some(data) = res.as_hash() {
        data.length.merge_trace(&left_data.length.trace_clone());
        data.length.merge_trace(&right_data.length.trace_clone());
        data.length.add_dep(&left_data.length);
        data.length.add_dep(&right_data.length);
    }
    Ok(res)
}

fn eval_if(
    cond: &Expr,
    consequence: &Block,
    alternative: Option<&Block>,
    env: &Env,
) -> EvalResult<Obj> {
    let cond_value = eval_expr(cond, env)?;
    let cond_trace = cond_value.trace_clone();

    let branch_result = if cond_value.is_truthy() {
        eval_block(consequence, env)?
    } else if let Some(alt) = alternative {
        eval_block(alt, env)?
    } else {
        Object::nil()
    };

    // The chosen branch's value additionally depends on the condition.
    Ok(merge_condition(&branch_result, &cond_trace, &cond_value))
}

/// Deep copy merging the condition's metadata: arrays propagate into
/// elements and the length sidecar, other variants shallowly.
fn merge_condition(obj: &Obj, cond_trace: &TraceSet, cond: &Obj) -> Obj {
    match &obj.kind {
        ObjectKind::Array(data) => {
            let elements = data
                .elements
                .iter()
                .map(|elem| merge_condition(elem, cond_trace, cond))
                .collect();
            let res = Object::array(elements);
            res.merge_trace(&obj.trace_clone());
            res.merge_trace(cond_trace);
            res.add_dep(obj);
            res.add_dep(cond);
            res.set_creator_opt(obj.creator_clone());
            if let Some(new_data) = res.as_array() {
                new_data.length.merge_trace(&data.length.trace_clone());
                new_data.length.merge_trace(cond_trace);
                new_data.length.add_dep(&data.length);
                new_data.length.add_dep(cond);
                new_data.offset.merge_trace(&data.offset.trace_clone());
                new_data.offset.add_dep(&data.offset);
            }
            res
        }
        _ => {
            let res = obj.copy();
            res.merge_trace(cond_trace);
            res.add_dep(cond);
            res
        }
    }
}

fn eval_index(left: &Obj, index: &Obj) -> EvalResult<Obj> {
    match (&left.kind, &index.kind) {
        (ObjectKind::Array(data), ObjectKind::Int(idx)) => {
            let in_range = *idx >= 0 && (*idx as usize) < data.elements.len();
            if !in_range {
                let res = Object::nil();
                attach_positional(&res, index, &data.offset);
                return Ok(res);
            }
            let elem = &data.elements[*idx as usize];
            let res = elem.copy();
            attach_positional(&res, index, &data.offset);
            let offset_trace = data.offset.trace_clone();
            let index_trace = index.trace_clone();
            if let Some(inner) = res.as_array() {
                inner.offset.merge_trace(&offset_trace);
                inner.offset.merge_trace(&index_trace);
                inner.offset.add_dep(&data.offset);
                inner.offset.add_dep(index);
            }
            if let Some(inner) = res.as_hash() {
                inner.offset.merge_trace(&offset_trace);
                inner.offset.merge_trace(&index_trace);
                inner.offset.add_dep(&data.offset);
                inner.offset.add_dep(index);
            }
            Ok(res)
        }
        (ObjectKind::Array(_), _) => Err(type_error(format!(
            "index operator not supported: ARRAY[{}]",
            index.type_name()
        ))),
        (ObjectKind::Hash(data), _) => {
            let Some(key) = index.hash_key() else {
                return Err(EvalError::UnusableHashKey(index.type_name()));
            };
            match data.pairs.get(&key) {
                Some(pair) => {
                    let res = pair.value.copy();
                    attach_positional(&res, index, &data.offset);
                    let offset_trace = data.offset.trace_clone();
                    let index_trace = index.trace_clone();
                    if let Some(inner) = res.as_array() {
                        inner.offset.merge_trace(&offset_trace);
                        inner.offset.merge_trace(&index_trace);
                        inner.offset.add_dep(&data.offset);
                        inner.offset.add_dep(index);
                    }
                    if let Some(inner) = res.as_hash() {
                        inner.offset.merge_trace(&offset_trace);
                        inner.offset.merge_trace(&index_trace);
                        inner.offset.add_dep(&data.offset);
                        inner.offset.add_dep(index);
                    }
                    Ok(res)
                }
                None => {
                    let res = Object::nil();
                    attach_positional(&res, index, &data.offset);
                    Ok(res)
                }
            }
        }
        _ => Err(type_error(format!(
            "index operator not supported: {}",
            left.type_name()
        ))),
    }
}

/// Reading through a container links the result to the index and to the
/// container's positional provenance.
fn attach_positional(res: &Obj, index: &Obj, offset: &Obj) {
    res.merge_trace(&index.trace_clone());
    res.merge_trace(&offset.trace_clone());
    res.add_dep(index);
    res.add_dep(offset);
}

fn eval_hash_literal(pairs: &[(Expr, Expr)], env: &Env) -> EvalResult<Obj> {
    let mut map = BTreeMap::new();
    for (key_expr, value_expr) in pairs {
        let key = eval_expr(key_expr, env)?;
        let Some(hash_key) = key.hash_key() else {
            return Err(EvalError::UnusableHashKey(key.type_name()));
        };
        let value = eval_expr(value_expr, env)?;
        map.insert(hash_key, HashPair { key, value });
    }
    Ok(Object::hash(map))
}

/// Apply a callable to caller-side arguments. Arguments are rewritten
/// into traceable form; the returned value still speaks path keys and is
/// translated back to caller space at the `Call` node.
pub fn apply_function(function: &Obj, args: &[Obj]) -> EvalResult<Obj> {
    let traceable = rewrite_args(args);
    match &function.kind {
        ObjectKind::Function(func) => {
            if func.params.len() != traceable.len() {
                return Err(EvalError::Arity {
                    got: traceable.len(),
                    want: func.params.len(),
                });
            }
            trace!(params = func.params.len(), "applying function");
            let child = Environment::enclosed(&func.env);
            for (param, arg) in func.params.iter().zip(traceable) {
                child.borrow_mut().set(param.name.clone(), arg);
            }
            let evaluated = eval_block(&func.body, &child)?;
            Ok(unwrap_return(evaluated))
        }
        ObjectKind::PureFunction(func) => {
            if func.params.len() != traceable.len() {
                return Err(EvalError::Arity {
                    got: traceable.len(),
                    want: func.params.len(),
                });
            }
            let fingerprint = fingerprint_args(&traceable);
            if let Some(hit) = func.cache.borrow().get(&fingerprint) {
                debug!("pure function cache hit");
                return Ok(hit);
            }
            let child = Environment::enclosed(&func.env);
            for (param, arg) in func.params.iter().zip(traceable) {
                child.borrow_mut().set(param.name.clone(), arg);
            }
            let result = unwrap_return(eval_block(&func.body, &child)?);
            let consumed = collect_trace(&result);
            func.cache
                .borrow_mut()
                .set(&fingerprint, &consumed, result.clone());
            Ok(result)
        }
        ObjectKind::Builtin(builtin) => (builtin.func)(&traceable),
        _ => Err(type_error(format!("not a function: {}", function.type_name()))),
    }
}

/// Unwrap a `Return` marker at a call boundary, transferring the
/// wrapper's provenance onto the returned value.
pub fn unwrap_return(obj: Obj) -> Obj {
    if let ObjectKind::Return(inner) = &obj.kind {
        let result = inner.copy();
        result.merge_trace(&obj.trace_clone());
        result.add_dep(&obj);
        result
    } else {
        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> EvalResult<Obj> {
        let env = Environment::root();
        load_program(source, &env)
    }

    fn run_ok(source: &str) -> Obj {
        run(source).expect("program failed")
    }

    #[test]
    fn test_literals() {
        assert_eq!(run_ok("5").as_int(), Some(5));
        assert_eq!(run_ok("3.5").inspect(), "3.5");
        assert_eq!(run_ok("\"hello\"").inspect(), "hello");
        assert_eq!(run_ok("true").inspect(), "true");
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(run_ok("1 + 2 * 3").as_int(), Some(7));
        assert_eq!(run_ok("10 - 4").as_int(), Some(6));
        assert_eq!(run_ok("7 % 3").as_int(), Some(1));
        assert_eq!(run_ok("-5 + 2").as_int(), Some(-3));
    }

    #[test]
    fn test_division_promotes_to_float() {
        assert_eq!(run_ok("5 / 2").inspect(), "2.5");
        assert_eq!(run_ok("4 / 2").inspect(), "2.0");
    }

    #[test]
    fn test_mixed_numeric_arithmetic() {
        assert_eq!(run_ok("1 + 2.5").inspect(), "3.5");
        assert_eq!(run_ok("2.5 * 2").inspect(), "5.0");
        assert_eq!(run_ok("1 < 1.5").inspect(), "true");
    }

    #[test]
    fn test_modulo_by_zero_is_domain_error() {
        assert!(matches!(run("5 % 0"), Err(EvalError::Domain(_))));
    }

    #[test]
    fn test_comparisons_and_equality() {
        assert_eq!(run_ok("1 < 2").inspect(), "true");
        assert_eq!(run_ok("1 > 2").inspect(), "false");
        assert_eq!(run_ok("1 == 1").inspect(), "true");
        assert_eq!(run_ok("1 != 1").inspect(), "false");
        assert_eq!(run_ok("[1, 2] == [1, 2]").inspect(), "true");
        assert_eq!(run_ok("[1, 2] == [1, 3]").inspect(), "false");
        assert_eq!(run_ok("1 == 1.0").inspect(), "false");
    }

    #[test]
    fn test_bang_operator() {
        assert_eq!(run_ok("!true").inspect(), "false");
        assert_eq!(run_ok("!0").inspect(), "true");
        assert_eq!(run_ok("!!5").inspect(), "true");
        assert_eq!(run_ok("!\"\"").inspect(), "true");
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(run_ok("\"foo\" + \"bar\"").inspect(), "foobar");
        assert_eq!(run_ok("\"ab\" * 3").inspect(), "ababab");
        assert_eq!(run_ok("2 * \"x\"").inspect(), "xx");
        assert_eq!(run_ok("\"ab\" * 0").inspect(), "");
        assert_eq!(run_ok("\"n=\" + 3").inspect(), "n=3");
    }

    #[test]
    fn test_if_expressions() {
        assert_eq!(run_ok("if (true) { 10 }").as_int(), Some(10));
        assert_eq!(run_ok("if (false) { 10 } else { 20 }").as_int(), Some(20));
        assert_eq!(run_ok("if (false) { 10 }").inspect(), "nil");
        assert_eq!(
            run_ok("if (false) { 1 } elsif (true) { 2 } else { 3 }").as_int(),
            Some(2)
        );
    }

    #[test]
    fn test_let_and_identifiers() {
        assert_eq!(run_ok("let a = 5; let b = a + 1; b").as_int(), Some(6));
        assert!(matches!(run("missing"), Err(EvalError::NameNotFound(_))));
    }

    #[test]
    fn test_function_application() {
        assert_eq!(run_ok("let id = fn(x) { x }; id(7)").as_int(), Some(7));
        assert_eq!(
            run_ok("let add = fn(a, b) { a + b }; add(3, 4)").as_int(),
            Some(7)
        );
        assert_eq!(
            run_ok("let f = fn(x) { return x + 1; 99 }; f(1)").as_int(),
            Some(2)
        );
    }

    #[test]
    fn test_arity_mismatch() {
        assert!(matches!(
            run("let f = fn(a, b) { a }; f(1)"),
            Err(EvalError::Arity { got: 1, want: 2 })
        ));
    }

    #[test]
    fn test_closures_capture_environment() {
        assert_eq!(
            run_ok("let make = fn(a) { fn(b) { a + b } }; let add2 = make(2); add2(3)").as_int(),
            Some(5)
        );
    }

    #[test]
    fn test_recursive_fibonacci() {
        let src = "let fib = fn(x){ if (x==1){1} else { if (x==0){1} else { fib(x-1)+fib(x-2)}}}; fib(8)";
        assert_eq!(run_ok(src).as_int(), Some(34));
    }

    #[test]
    fn test_pure_function_results_match_impure() {
        let src = "let fib = pfn(x){ if (x==1){1} else { if (x==0){1} else { fib(x-1)+fib(x-2)}}}; fib(10)";
        assert_eq!(run_ok(src).as_int(), Some(89));
    }

    #[test]
    fn test_array_literals_and_indexing() {
        assert_eq!(run_ok("[1, 2 * 2, 3 + 3]").inspect(), "[1, 4, 6]");
        assert_eq!(run_ok("[1, 2, 3][0]").as_int(), Some(1));
        assert_eq!(run_ok("let a = [1, 2]; a[1]").as_int(), Some(2));
        assert_eq!(run_ok("[1, 2][5]").inspect(), "nil");
        assert_eq!(run_ok("[1, 2][-1]").inspect(), "nil");
    }

    #[test]
    fn test_array_concat() {
        assert_eq!(run_ok("[1, 2] + [3]").inspect(), "[1, 2, 3]");
        let res = run_ok("[1] + [2, 3]");
        assert_eq!(res.as_array().unwrap().length.as_int(), Some(3));
    }

    #[test]
    fn test_array_unsupported_operator() {
        assert!(matches!(run("[1] - [2]"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_hash_literals_and_indexing() {
        assert_eq!(run_ok("{\"a\": 1, \"b\": 2}[\"b\"]").as_int(), Some(2));
        assert_eq!(run_ok("{1: \"one\"}[1]").inspect(), "one");
        assert_eq!(run_ok("{true: 1}[true]").as_int(), Some(1));
        assert_eq!(run_ok("{\"a\": 1}[\"missing\"]").inspect(), "nil");
        // Later pairs overwrite earlier ones.
        assert_eq!(run_ok("{\"a\": 1, \"a\": 2}[\"a\"]").as_int(), Some(2));
    }

    #[test]
    fn test_hash_union_and_difference() {
        assert_eq!(
            run_ok("({\"a\": 1} + {\"a\": 2, \"b\": 3})[\"a\"]").as_int(),
            Some(2)
        );
        assert_eq!(
            run_ok("let h = {\"a\": 1, \"b\": 2} - {\"a\": 1}; h[\"a\"]").inspect(),
            "nil"
        );
        // Subtraction only removes keys whose values match.
        assert_eq!(
            run_ok("let h = {\"a\": 1, \"b\": 2} - {\"a\": 9}; h[\"a\"]").as_int(),
            Some(1)
        );
    }

    #[test]
    fn test_unhashable_key_is_error() {
        assert!(matches!(
            run("{[1]: 1}"),
            Err(EvalError::UnusableHashKey(_))
        ));
        assert!(matches!(
            run("{\"a\": 1}[[1]]"),
            Err(EvalError::UnusableHashKey(_))
        ));
    }

    #[test]
    fn test_type_mismatch_infix() {
        assert!(matches!(run("1 + [2]"), Err(EvalError::Type(_))));
        assert!(matches!(run("true + true"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_error_short_circuits() {
        // The failing sub-expression surfaces; the rest never runs.
        assert!(matches!(run("let x = missing + 1; 99"), Err(EvalError::NameNotFound(_))));
    }

    #[test]
    fn test_execute_program_renders_errors() {
        assert_eq!(execute_program("1 + 2"), "3");
        assert!(execute_program("unknown_name").starts_with("ERROR: "));
    }

    #[test]
    fn test_empty_containers_are_falsy() {
        assert_eq!(run_ok("if ([]) { 1 } else { 2 }").as_int(), Some(2));
        assert_eq!(run_ok("if ({}) { 1 } else { 2 }").as_int(), Some(2));
        assert_eq!(run_ok("if ([0]) { 1 } else { 2 }").as_int(), Some(1));
    }

    #[test]
    fn test_zero_multiply_depends_only_on_zero() {
        let zero = Object::int(0);
        zero.insert_trace_key("left");
        let seven = Object::int(7);
        seven.insert_trace_key("right");

        let res = eval_infix(InfixOp::Mul, &zero, &seven).unwrap();
        assert_eq!(res.as_int(), Some(0));
        assert!(res.trace().contains("left"));
        assert!(!res.trace().contains("right"));
    }

    #[test]
    fn test_concat_marks_right_elements_with_left_length() {
        let left = Object::array(vec![Object::int(1), Object::int(2)]);
        left.as_array().unwrap().length.insert_trace_key("L#");
        let right = Object::array(vec![Object::int(3)]);

        let res = concat_arrays(&left, &right);
        let data = res.as_array().unwrap();
        // Copies drawn from the right operand carry the left length;
        // copies from the left do not.
        assert!(data.elements[2].trace().contains("L#"));
        assert!(!data.elements[0].trace().contains("L#"));
        // The result's length depends on both operand lengths.
        assert!(data.length.trace().contains("L#"));
    }
}
