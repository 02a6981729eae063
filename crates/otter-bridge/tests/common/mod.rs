//! Shared fixtures: a tiny line-oriented script engine, an in-memory module
//! source, and host types used across the integration tests.
//!
//! The toy language has one statement per line:
//!
//! ```text
//! # comment
//! load("lib.star")            # merge the module's globals
//! x = 1                       # assignment
//! person.Name = "mary"        # attribute assignment
//! scores["bob"] = 3           # key / index assignment
//! names.append("x")           # expression statement
//! for n in names: out.append(n)
//! ```
//!
//! Expressions: int/float/string literals, `True`/`False`/`None`, names,
//! attribute access, calls with positional and `k=v` arguments, indexing,
//! `[a:b]` slicing, `[...]` lists and `(a, b)` tuples. Builtins: `len`,
//! `print`, `freeze`, `fail`, `sleep` (milliseconds).

#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use otter_bridge::{
    BridgeError, BridgeResult, Dialect, Field, FromNative, Globals, IntoNative, ModuleSource,
    NativeFunc, NativeValue, OpaqueAccess, Program, Record, ScriptEngine, Shared, Thread,
    Underlying, Value,
};
use parking_lot::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ToyEngine {
    compiles: AtomicUsize,
    pub printed: Arc<Mutex<Vec<String>>>,
}

impl ToyEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl ScriptEngine for ToyEngine {
    fn compile(&self, filename: &str, source: &str, _dialect: &Dialect) -> BridgeResult<Arc<dyn Program>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let mut stmts = Vec::new();
        for (lineno, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens = tokenize(line).map_err(|e| syntax(filename, lineno, &e))?;
            let mut parser = Parser { tokens, pos: 0 };
            let stmt = parser.statement().map_err(|e| syntax(filename, lineno, &e))?;
            if parser.pos != parser.tokens.len() {
                return Err(syntax(filename, lineno, "trailing tokens"));
            }
            stmts.push(stmt);
        }
        Ok(Arc::new(ToyProgram {
            stmts,
            printed: Arc::clone(&self.printed),
        }))
    }
}

fn syntax(filename: &str, lineno: usize, msg: &str) -> BridgeError {
    BridgeError::engine(format!("{filename}:{}: syntax error: {msg}", lineno + 1))
}

struct ToyProgram {
    stmts: Vec<Stmt>,
    printed: Arc<Mutex<Vec<String>>>,
}

struct Env<'a> {
    module: Globals,
    predeclared: &'a Globals,
}

impl Env<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.module
            .get(name)
            .or_else(|| self.predeclared.get(name))
            .cloned()
    }
}

impl Program for ToyProgram {
    fn init(&self, thread: &Thread<'_>, predeclared: &Globals) -> BridgeResult<Globals> {
        let mut env = Env {
            module: Globals::new(),
            predeclared,
        };
        for stmt in &self.stmts {
            self.exec(stmt, &mut env, thread)?;
        }
        Ok(env.module)
    }
}

impl ToyProgram {
    fn exec(&self, stmt: &Stmt, env: &mut Env<'_>, thread: &Thread<'_>) -> BridgeResult<()> {
        match stmt {
            Stmt::Load(module) => {
                let globals = thread.load(module)?;
                env.module.extend(globals);
            }
            Stmt::Assign(target, expr) => {
                let value = self.eval(expr, env, thread)?;
                match target {
                    Expr::Name(name) => {
                        env.module.insert(name.clone(), value);
                    }
                    Expr::Attr(obj, attr) => {
                        self.eval(obj, env, thread)?.set_attr(attr, &value)?;
                    }
                    Expr::Index(obj, key) => {
                        let obj = self.eval(obj, env, thread)?;
                        let key = self.eval(key, env, thread)?;
                        let Value::Object(target) = &obj else {
                            return Err(BridgeError::engine(format!(
                                "cannot assign into {}",
                                obj.type_name()
                            )));
                        };
                        match target.set_key(&key, &value) {
                            Err(BridgeError::NotSupported { .. }) => {
                                let index = key.as_i64().ok_or_else(|| {
                                    BridgeError::engine("index must be an int")
                                })?;
                                target.set_index(index, &value)?;
                            }
                            other => other?,
                        }
                    }
                    _ => return Err(BridgeError::engine("invalid assignment target")),
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr, env, thread)?;
            }
            Stmt::For(var, iterable, body) => {
                let iterable = self.eval(iterable, env, thread)?;
                for item in iterable.iterate()? {
                    env.module.insert(var.clone(), item?);
                    self.exec(body, env, thread)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, env: &mut Env<'_>, thread: &Thread<'_>) -> BridgeResult<Value> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Name(name) => env
                .lookup(name)
                .ok_or_else(|| BridgeError::engine(format!("undefined: {name}"))),
            Expr::Attr(obj, attr) => self.eval(obj, env, thread)?.attr(attr),
            Expr::Index(obj, key) => {
                let obj = self.eval(obj, env, thread)?;
                let key = self.eval(key, env, thread)?;
                index(&obj, &key)
            }
            Expr::Slice(obj, start, end) => {
                let obj = self.eval(obj, env, thread)?;
                let start = self.eval_bound(start.as_deref(), env, thread)?;
                let end = self.eval_bound(end.as_deref(), env, thread)?;
                match &obj {
                    Value::Object(o) => o.slice(start, end, None),
                    _ => Err(BridgeError::engine("cannot slice")),
                }
            }
            Expr::List(items) => Ok(Value::list(self.eval_all(items, env, thread)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items, env, thread)?)),
            Expr::Call(callee, args, kwargs) => {
                let args = self.eval_all(args, env, thread)?;
                let kwargs = kwargs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.eval(v, env, thread)?)))
                    .collect::<BridgeResult<Vec<_>>>()?;
                if let Expr::Name(name) = &**callee {
                    if env.lookup(name).is_none() {
                        return self.builtin(name, &args, thread);
                    }
                }
                self.eval(callee, env, thread)?.call(&args, &kwargs)
            }
        }
    }

    fn eval_all(&self, items: &[Expr], env: &mut Env<'_>, thread: &Thread<'_>) -> BridgeResult<Vec<Value>> {
        items.iter().map(|e| self.eval(e, env, thread)).collect()
    }

    fn eval_bound(&self, expr: Option<&Expr>, env: &mut Env<'_>, thread: &Thread<'_>) -> BridgeResult<Option<i64>> {
        match expr {
            None => Ok(None),
            Some(e) => Ok(self.eval(e, env, thread)?.as_i64()),
        }
    }

    fn builtin(&self, name: &str, args: &[Value], thread: &Thread<'_>) -> BridgeResult<Value> {
        match name {
            "len" => {
                let len = args
                    .first()
                    .and_then(Value::len)
                    .ok_or_else(|| BridgeError::engine("len: unsized value"))?;
                Ok(Value::int(len as i64))
            }
            "print" => {
                let line = args
                    .iter()
                    .map(|a| match a {
                        Value::Str(s) => s.to_string(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                self.printed.lock().push(line.clone());
                thread.print(&line);
                Ok(Value::None)
            }
            "freeze" => {
                args.iter().for_each(Value::freeze);
                Ok(Value::None)
            }
            "fail" => Err(BridgeError::engine(match args.first() {
                Some(Value::Str(s)) => s.to_string(),
                Some(other) => other.to_string(),
                None => String::new(),
            })),
            "sleep" => {
                let ms = args.first().and_then(Value::as_i64).unwrap_or(0);
                std::thread::sleep(Duration::from_millis(ms as u64));
                Ok(Value::None)
            }
            "boom" => panic!("engine blew up"),
            _ => Err(BridgeError::engine(format!("undefined: {name}"))),
        }
    }
}

fn index(obj: &Value, key: &Value) -> BridgeResult<Value> {
    match obj {
        Value::List(items) | Value::Tuple(items) => {
            let i = key.as_i64().ok_or_else(|| BridgeError::engine("index must be an int"))?;
            let i = if i < 0 { i + items.len() as i64 } else { i };
            items
                .get(i as usize)
                .cloned()
                .ok_or(BridgeError::IndexOutOfRange { index: i, len: items.len() })
        }
        Value::Dict(_) => obj
            .get(key)?
            .ok_or_else(|| BridgeError::engine(format!("key {key} not in dict"))),
        Value::Object(o) => match o.get(key) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Err(BridgeError::engine(format!("key {key} not in dict"))),
            Err(BridgeError::NotSupported { .. }) => {
                let i = key.as_i64().ok_or_else(|| BridgeError::engine("index must be an int"))?;
                o.index(i)
            }
            Err(e) => Err(e),
        },
        _ => Err(BridgeError::engine(format!("cannot index {}", obj.type_name()))),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(char),
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '#' {
            break;
        } else if c == '"' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != '"' {
                j += 1;
            }
            if j == chars.len() {
                return Err("unterminated string".to_string());
            }
            tokens.push(Token::Str(chars[start..j].iter().collect()));
            i = j + 1;
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.contains('.') {
                tokens.push(Token::Float(text.parse().map_err(|_| format!("bad float {text}"))?));
            } else {
                tokens.push(Token::Int(text.parse().map_err(|_| format!("bad int {text}"))?));
            }
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if "()[],.=:".contains(c) {
            tokens.push(Token::Punct(c));
            i += 1;
        } else {
            return Err(format!("unexpected character {c:?}"));
        }
    }
    Ok(tokens)
}

#[derive(Debug)]
enum Stmt {
    Load(String),
    Assign(Expr, Expr),
    Expr(Expr),
    For(String, Expr, Box<Stmt>),
}

#[derive(Debug)]
enum Expr {
    Lit(Value),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    Call(Box<Expr>, Vec<Expr>, Vec<(String, Expr)>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(format!("expected {c:?}"))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(format!("expected identifier, got {other:?}")),
        }
    }

    fn statement(&mut self) -> Result<Stmt, String> {
        if self.peek() == Some(&Token::Ident("for".to_string())) {
            self.pos += 1;
            let var = self.ident()?;
            if self.ident()? != "in" {
                return Err("expected 'in'".to_string());
            }
            let iterable = self.expr()?;
            self.expect(':')?;
            let body = self.statement()?;
            return Ok(Stmt::For(var, iterable, Box::new(body)));
        }
        if self.peek() == Some(&Token::Ident("load".to_string())) {
            self.pos += 1;
            self.expect('(')?;
            let module = match self.next() {
                Some(Token::Str(s)) => s,
                other => return Err(format!("load: expected string, got {other:?}")),
            };
            self.expect(')')?;
            return Ok(Stmt::Load(module));
        }
        let expr = self.expr()?;
        if self.eat('=') {
            let value = self.expr()?;
            return Ok(Stmt::Assign(expr, value));
        }
        Ok(Stmt::Expr(expr))
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        loop {
            if self.eat('.') {
                expr = Expr::Attr(Box::new(expr), self.ident()?);
            } else if self.eat('(') {
                let (args, kwargs) = self.arguments()?;
                expr = Expr::Call(Box::new(expr), args, kwargs);
            } else if self.eat('[') {
                let start = if self.peek() == Some(&Token::Punct(':')) {
                    None
                } else {
                    Some(Box::new(self.expr()?))
                };
                if self.eat(':') {
                    let end = if self.peek() == Some(&Token::Punct(']')) {
                        None
                    } else {
                        Some(Box::new(self.expr()?))
                    };
                    self.expect(']')?;
                    expr = Expr::Slice(Box::new(expr), start, end);
                } else {
                    self.expect(']')?;
                    let key = start.ok_or("empty index")?;
                    expr = Expr::Index(Box::new(expr), key);
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), String> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat(')') {
            let is_kwarg = matches!(self.peek(), Some(Token::Ident(_)))
                && self.tokens.get(self.pos + 1) == Some(&Token::Punct('='));
            if is_kwarg {
                let name = self.ident()?;
                self.expect('=')?;
                kwargs.push((name, self.expr()?));
            } else {
                args.push(self.expr()?);
            }
            if !self.eat(',') {
                self.expect(')')?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Lit(Value::int(i))),
            Some(Token::Float(f)) => Ok(Expr::Lit(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::str(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "True" => Expr::Lit(Value::Bool(true)),
                "False" => Expr::Lit(Value::Bool(false)),
                "None" => Expr::Lit(Value::None),
                _ => Expr::Name(name),
            }),
            Some(Token::Punct('[')) => {
                let mut items = Vec::new();
                while !self.eat(']') {
                    items.push(self.expr()?);
                    if !self.eat(',') {
                        self.expect(']')?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::Punct('(')) => {
                let mut items = Vec::new();
                while !self.eat(')') {
                    items.push(self.expr()?);
                    if !self.eat(',') {
                        self.expect(')')?;
                        break;
                    }
                }
                Ok(Expr::Tuple(items))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Module sources
// ---------------------------------------------------------------------------

/// Scripts held in memory, counting reads per module
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, String>>,
    reads: Mutex<HashMap<String, usize>>,
}

impl MemorySource {
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Arc<Self> {
        let source = Self::default();
        for (name, body) in files {
            source.set(name, body);
        }
        Arc::new(source)
    }

    pub fn set(&self, name: &str, body: &str) {
        self.files.lock().insert(name.to_string(), body.to_string());
    }

    pub fn reads(&self, name: &str) -> usize {
        self.reads.lock().get(name).copied().unwrap_or(0)
    }
}

impl ModuleSource for MemorySource {
    fn read(&self, module: &str) -> BridgeResult<String> {
        *self.reads.lock().entry(module.to_string()).or_default() += 1;
        self.files
            .lock()
            .get(module)
            .cloned()
            .ok_or_else(|| BridgeError::ModuleNotFound {
                file: module.to_string(),
                dirs: vec!["<memory>".to_string()],
            })
    }
}

// ---------------------------------------------------------------------------
// Host types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i64,
    pub nickname: String,
    pub email: String,
    pub password: String,
}

impl Person {
    pub fn new(name: &str, age: i64) -> Shared<Person> {
        Shared::new(Person {
            name: name.to_string(),
            age,
            nickname: String::new(),
            email: format!("{}@example.com", name.to_lowercase()),
            password: "hunter2".to_string(),
        })
    }
}

impl Record for Person {
    const FIELDS: &'static [Field] = &[
        Field::new("Name"),
        Field::new("Age"),
        Field::tagged("Nickname", &[("star", "nick")]),
        Field::tagged("Email", &[("star", "-")]),
        Field::private("password"),
    ];

    fn field(&self, name: &str) -> Option<NativeValue> {
        match name {
            "Name" => Some(self.name.clone().into_native()),
            "Age" => Some(self.age.into_native()),
            "Nickname" => Some(self.nickname.clone().into_native()),
            "Email" => Some(self.email.clone().into_native()),
            "password" => Some(self.password.clone().into_native()),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: NativeValue) -> BridgeResult<()> {
        match name {
            "Name" => self.name = String::from_native(value)?,
            "Age" => self.age = i64::from_native(value)?,
            "Nickname" => self.nickname = String::from_native(value)?,
            "Email" => self.email = String::from_native(value)?,
            _ => return Err(BridgeError::NotSettable(name.to_string())),
        }
        Ok(())
    }

    fn method_names() -> &'static [&'static str] {
        &["Greet", "Birthday"]
    }

    fn method(this: &Shared<Self>, name: &str) -> Option<NativeFunc> {
        let this = this.clone();
        match name {
            "Greet" => Some(NativeFunc::new("Greet", move |greeting: String| {
                format!("{greeting}, {}", this.read().name)
            })),
            "Birthday" => Some(NativeFunc::new("Birthday", move || {
                let mut person = this.write();
                person.age += 1;
                person.age
            })),
            _ => None,
        }
    }
}

/// Temperature exposed only through methods and accessors
pub struct Celsius(pub f64);

impl OpaqueAccess for Celsius {
    fn type_name(&self) -> String {
        "Celsius".to_string()
    }

    fn underlying(&self) -> Underlying {
        Underlying::Float(self.0)
    }

    fn method(&self, name: &str) -> Option<NativeFunc> {
        let c = self.0;
        match name {
            "Fahrenheit" => Some(NativeFunc::new("Fahrenheit", move || c * 9.0 / 5.0 + 32.0)),
            _ => None,
        }
    }

    fn method_names(&self) -> Vec<String> {
        vec!["Fahrenheit".to_string()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
