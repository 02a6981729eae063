//! Host closures called from scripts.

mod common;

use common::{Person, ToyEngine, init_tracing};
use otter_bridge::{
    Arity, BridgeConfig, BridgeError, IntoNative, NativeFunc, NativeGlobals, NativeSlice,
    NativeValue, Shared, eval, to_script,
};

fn run(source: &str, globals: Vec<(&str, NativeValue)>) -> Result<NativeGlobals, BridgeError> {
    init_tracing();
    let engine = ToyEngine::new();
    eval(engine.as_ref(), source, globals, None, &BridgeConfig::default())
}

#[test]
fn test_variadic_function_from_script() {
    let join = NativeFunc::variadic("join", |sep: String, parts: Vec<String>| parts.join(&sep));
    let out = run(
        r#"
s = join("-", "a", "b", "c")
empty = join("-")
"#,
        vec![("join", join.into_native())],
    )
    .unwrap();
    assert_eq!(out["s"].as_str(), Some("a-b-c"));
    assert_eq!(out["empty"].as_str(), Some(""));
}

#[test]
fn test_raw_function_receives_keyword_arguments() {
    let scale = NativeFunc::raw("scale", Arity::Variadic { fixed: 1 }, |args, kwargs| {
        let base = args[0].as_i64().unwrap_or(0);
        let factor = kwargs
            .iter()
            .find(|kw| kw.name == "by")
            .and_then(|kw| kw.value.as_i64())
            .unwrap_or(1);
        base * factor
    });
    let out = run(
        r#"
plain = scale(3)
scaled = scale(3, by=10)
"#,
        vec![("scale", scale.into_native())],
    )
    .unwrap();
    assert_eq!(out["plain"], NativeValue::Int(3));
    assert_eq!(out["scaled"], NativeValue::Int(30));
}

#[test]
fn test_script_list_converts_to_vec_parameter() {
    let total = NativeFunc::new("total", |xs: Vec<i64>| xs.iter().sum::<i64>());
    let out = run(
        r#"
a = total([1, 2, 3])
b = total((4, 5))
"#,
        vec![("total", total.into_native())],
    )
    .unwrap();
    assert_eq!(out["a"], NativeValue::Int(6));
    assert_eq!(out["b"], NativeValue::Int(9));
}

#[test]
fn test_slice_parameter_aliases_the_view() {
    let xs = NativeSlice::new(vec![1i64]);
    let push = NativeFunc::new("push", |target: NativeSlice<i64>, value: i64| {
        target.write().push(value);
    });
    run(
        "push(xs, 2)",
        vec![("xs", xs.clone().into_native()), ("push", push.into_native())],
    )
    .unwrap();
    assert_eq!(xs.snapshot(), vec![1, 2]);
}

#[test]
fn test_returned_record_stays_shared_with_host() {
    let person = Person::new("bob", 40);
    let handle = person.clone();
    let lookup = NativeFunc::new("lookup", move || handle.clone());
    run(
        r#"
p = lookup()
p.Age = 41
"#,
        vec![("lookup", lookup.into_native())],
    )
    .unwrap();
    assert_eq!(person.read().age, 41);
}

#[test]
fn test_record_parameter_receives_the_same_value() {
    let person = Person::new("bob", 40);
    let rename = NativeFunc::new("rename", |p: Shared<Person>, name: String| {
        p.write().name = name;
    });
    run(
        r#"rename(p, "robert")"#,
        vec![
            ("p", person.clone().into_native()),
            ("rename", rename.into_native()),
        ],
    )
    .unwrap();
    assert_eq!(person.read().name, "robert");
}

#[test]
fn test_optional_parameter_accepts_none() {
    let describe = NativeFunc::new("describe", |n: Option<i64>| match n {
        Some(n) => format!("got {n}"),
        None => "nothing".to_string(),
    });
    let out = run(
        r#"
a = describe(None)
b = describe(3)
"#,
        vec![("describe", describe.into_native())],
    )
    .unwrap();
    assert_eq!(out["a"].as_str(), Some("nothing"));
    assert_eq!(out["b"].as_str(), Some("got 3"));
}

#[test]
fn test_functions_pass_through_scripts() {
    let double = NativeFunc::new("double", |n: i64| n * 2);
    let apply = NativeFunc::new("apply", |f: NativeFunc, n: i64| {
        let out = f.invoke(vec![NativeValue::Int(n)], vec![])?;
        out.into_iter()
            .next()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| BridgeError::call("no result"))
    });
    let out = run(
        r#"
x = apply(double, 21)
f = double
"#,
        vec![
            ("double", double.clone().into_native()),
            ("apply", apply.into_native()),
        ],
    )
    .unwrap();
    assert_eq!(out["x"], NativeValue::Int(42));

    let NativeValue::Func(f) = &out["f"] else {
        panic!("expected a function, got {:?}", out["f"]);
    };
    assert!(f.ptr_eq(&double));
    assert_eq!(f.invoke(vec![NativeValue::Int(5)], vec![]).unwrap(), vec![NativeValue::Int(10)]);
}

#[test]
fn test_unit_return_is_none() {
    let noop = NativeFunc::new("noop", || {});
    let out = run("x = noop()", vec![("noop", noop.into_native())]).unwrap();
    assert_eq!(out["x"], NativeValue::Nil);
}

#[test]
fn test_function_repr_and_identity() {
    let double = NativeFunc::new("double", |n: i64| n * 2);
    let a = to_script(double.clone()).unwrap();
    let b = to_script(double).unwrap();
    assert_eq!(a.to_string(), "<built-in function double>");
    assert_eq!(a.type_name(), "builtin_function_or_method");
    assert_eq!(a.hash().unwrap(), b.hash().unwrap());
}

#[test]
fn test_overflowing_argument_is_rejected() {
    let small = NativeFunc::new("small", |n: u8| n);
    let err = run("small(300)", vec![("small", small.clone().into_native())]).unwrap_err();
    assert!(err.to_string().starts_with("small: arg 0: "), "{err}");

    let err = run("small(-1)", vec![("small", small.into_native())]).unwrap_err();
    assert!(matches!(err, BridgeError::Argument { index: 0, .. }), "{err}");
}
