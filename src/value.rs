//
// Copyright (C) 2023 SpinorML.
// Copyright (c) 2015-2021 Georg Brandl.
//
// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at

//   http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The reconstructed value universe (spec §3.1) and the sharing wrappers
//! that let memoized aggregates alias stack entries.

use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, ErrorCode};
use crate::registry::Proxy;

/// A handle to a mutable aggregate (`List`, mutable `Dict`/`Set`, and the
/// mutable form of `Bytes`). Cloning a `Shared` clones the handle, not the
/// contents: this is what lets `PUT`/`MEMOIZE` alias a value that a later
/// `APPEND`/`SETITEM`/`BUILD` mutates in place.
#[derive(Debug, Clone)]
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared(Rc::new(RefCell::new(value)))
    }

    pub fn inner(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn inner_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// True if both handles alias the same aggregate, as two memoized
    /// references to a value pushed once would.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl<T> PartialEq for Shared<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0.borrow() == *other.0.borrow()
    }
}

/// A handle to an immutable aggregate (`Tuple`, `FrozenSet`, `Text`, and
/// the immutable form of `Bytes`).
#[derive(Debug, Clone)]
pub struct SharedFrozen<T>(Rc<T>);

impl<T> SharedFrozen<T> {
    pub fn new(value: T) -> Self {
        SharedFrozen(Rc::new(value))
    }

    pub fn inner(&self) -> &T {
        self.0.as_ref()
    }

    /// True if both handles alias the same value, as two memoized
    /// references to a value pushed once would.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl<T> From<T> for SharedFrozen<T> {
    fn from(value: T) -> Self {
        SharedFrozen::new(value)
    }
}

impl<T> From<Shared<T>> for SharedFrozen<T>
where
    T: Clone,
{
    /// Used by `READONLY_BUFFER` to convert a mutable byte buffer to the
    /// immutable form without copying when it is uniquely owned.
    fn from(value: Shared<T>) -> Self {
        if Rc::strong_count(&value.0) == 1 {
            if let Ok(cell) = Rc::try_unwrap(value.0) {
                return SharedFrozen::new(cell.into_inner());
            }
        }
        SharedFrozen::new(value.0.borrow().clone())
    }
}

impl<T> PartialEq for SharedFrozen<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

/// A reference to a host-registered proxy type, as produced by GLOBAL,
/// STACK_GLOBAL, and looked up again by INST/OBJ/NEWOBJ(_EX).
#[derive(Clone)]
pub struct TypeRef {
    pub module: Rc<str>,
    pub name: Rc<str>,
    pub(crate) factory: crate::registry::ProxyFactory,
}

impl TypeRef {
    pub fn construct(&self, args: &[Value]) -> crate::error::Result<Rc<RefCell<dyn Proxy>>> {
        (self.factory)(args)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TypeRef({}.{})", self.module, self.name)
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module && self.name == other.name
    }
}

/// A tagged sum over every value the core can reconstruct from a pickle
/// stream (spec §3.1).
#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(SharedFrozen<String>),
    Bytes(ByteBuf),
    Tuple(SharedFrozen<Vec<Value>>),
    List(Shared<Vec<Value>>),
    Dict(Shared<BTreeMap<HashableValue, Value>>),
    Set(Shared<BTreeSet<HashableValue>>),
    FrozenSet(SharedFrozen<BTreeSet<HashableValue>>),
    /// Internal sentinel pushed by MARK. Never observable in a result
    /// returned to the host.
    Mark,
    TypeRef(TypeRef),
    Object(Rc<RefCell<dyn Proxy>>),
}

/// The two observable forms of `Bytes`: the ordinary immutable buffer, and
/// the mutable form a protocol-5 `BYTEARRAY8`/out-of-band buffer produces.
/// `READONLY_BUFFER` converts the latter into the former.
#[derive(Clone, Debug)]
pub enum ByteBuf {
    Frozen(SharedFrozen<Vec<u8>>),
    Mutable(Shared<Vec<u8>>),
}

impl ByteBuf {
    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            ByteBuf::Frozen(b) => b.inner().clone(),
            ByteBuf::Mutable(b) => b.inner().clone(),
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, ByteBuf::Mutable(_))
    }
}

impl PartialEq for ByteBuf {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ByteBuf::Frozen(a), ByteBuf::Frozen(b)) => a == b,
            _ => *self.to_vec() == *other.to_vec(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::FrozenSet(a), Value::FrozenSet(b)) => a == b,
            (Value::Mark, Value::Mark) => true,
            (Value::TypeRef(a), Value::TypeRef(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn values_to_hashable(values: &[Value]) -> crate::error::Result<Vec<HashableValue>> {
    values.iter().cloned().map(Value::into_hashable).collect()
}

fn hashable_to_values(values: &[HashableValue]) -> Vec<Value> {
    values.iter().cloned().map(HashableValue::into_value).collect()
}

impl Value {
    /// Converts into the hashable subset used as dict keys / set members.
    /// Mirrors real Python: `bytes`/`str`/`tuple`/`frozenset` (of hashable
    /// elements) are hashable; `list`/`dict`/`set`/`bytearray` are not, nor
    /// are proxy-produced types or the internal `Mark` sentinel.
    pub fn into_hashable(self) -> crate::error::Result<HashableValue> {
        match self {
            Value::None => Ok(HashableValue::None),
            Value::Bool(b) => Ok(HashableValue::Bool(b)),
            Value::Int32(i) => Ok(HashableValue::Int32(i)),
            Value::Int64(i) => Ok(HashableValue::Int64(i)),
            Value::Float64(f) => Ok(HashableValue::Float64(f)),
            Value::Text(s) => Ok(HashableValue::Text(s)),
            Value::Bytes(ByteBuf::Frozen(b)) => Ok(HashableValue::Bytes(b)),
            Value::FrozenSet(s) => Ok(HashableValue::FrozenSet(s)),
            Value::Tuple(items) => {
                Ok(HashableValue::Tuple(SharedFrozen::new(values_to_hashable(items.inner())?)))
            }
            _ => Err(Error::Eval(ErrorCode::ValueNotHashable)),
        }
    }
}

/// The hashable subset of `Value`, ordered by a total `Ord` so it can be
/// stored in a `BTreeMap`/`BTreeSet` without a `Hash` implementation.
#[derive(Clone, Debug)]
pub enum HashableValue {
    None,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(SharedFrozen<String>),
    Bytes(SharedFrozen<Vec<u8>>),
    Tuple(SharedFrozen<Vec<HashableValue>>),
    FrozenSet(SharedFrozen<BTreeSet<HashableValue>>),
}

impl HashableValue {
    pub fn into_value(self) -> Value {
        match self {
            HashableValue::None => Value::None,
            HashableValue::Bool(b) => Value::Bool(b),
            HashableValue::Int32(i) => Value::Int32(i),
            HashableValue::Int64(i) => Value::Int64(i),
            HashableValue::Float64(f) => Value::Float64(f),
            HashableValue::Text(s) => Value::Text(s),
            HashableValue::Bytes(b) => Value::Bytes(ByteBuf::Frozen(b)),
            HashableValue::FrozenSet(s) => Value::FrozenSet(s),
            HashableValue::Tuple(items) => {
                Value::Tuple(SharedFrozen::new(hashable_to_values(items.inner())))
            }
        }
    }
}

impl PartialEq for HashableValue {
    fn eq(&self, other: &HashableValue) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HashableValue {}

impl PartialOrd for HashableValue {
    fn partial_cmp(&self, other: &HashableValue) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A total ordering across all hashable variants, numeric types compared
/// by value (`1 == 1.0 == True` as dict keys, as in Python) and other
/// types ordered by a fixed type precedence, Python-2-style.
impl Ord for HashableValue {
    fn cmp(&self, other: &HashableValue) -> Ordering {
        use HashableValue::*;
        match self {
            None => match other {
                None => Ordering::Equal,
                _ => Ordering::Less,
            },
            Bool(b) => match *other {
                None => Ordering::Greater,
                Bool(b2) => b.cmp(&b2),
                Int32(i2) => (*b as i32).cmp(&i2),
                Int64(i2) => (*b as i64).cmp(&i2),
                Float64(f) => float_ord(*b as i64 as f64, f),
                _ => Ordering::Less,
            },
            Int32(i) => match *other {
                None => Ordering::Greater,
                Bool(b) => i.cmp(&(b as i32)),
                Int32(i2) => i.cmp(&i2),
                Int64(i2) => (*i as i64).cmp(&i2),
                Float64(f) => float_ord(*i as f64, f),
                _ => Ordering::Less,
            },
            Int64(i) => match *other {
                None => Ordering::Greater,
                Bool(b) => i.cmp(&(b as i64)),
                Int32(i2) => i.cmp(&(i2 as i64)),
                Int64(i2) => i.cmp(&i2),
                Float64(f) => float_ord(*i as f64, f),
                _ => Ordering::Less,
            },
            Float64(f) => match *other {
                None => Ordering::Greater,
                Bool(b) => float_ord(*f, b as i64 as f64),
                Int32(i) => float_ord(*f, i as f64),
                Int64(i) => float_ord(*f, i as f64),
                Float64(f2) => float_ord(*f, f2),
                _ => Ordering::Less,
            },
            Bytes(b) => match other {
                Text(_) | FrozenSet(_) | Tuple(_) => Ordering::Less,
                Bytes(b2) => b.inner().cmp(b2.inner()),
                _ => Ordering::Greater,
            },
            Text(s) => match other {
                FrozenSet(_) | Tuple(_) => Ordering::Less,
                Text(s2) => s.inner().cmp(s2.inner()),
                _ => Ordering::Greater,
            },
            FrozenSet(s) => match other {
                Tuple(_) => Ordering::Less,
                FrozenSet(s2) => s.inner().cmp(s2.inner()),
                _ => Ordering::Greater,
            },
            Tuple(t) => match other {
                Tuple(t2) => t.inner().cmp(t2.inner()),
                _ => Ordering::Greater,
            },
        }
    }
}

/// A "reasonable" total ordering for floats participating in dict/set key
/// comparisons: NaN sorts as the smallest value rather than panicking.
fn float_ord(f: f64, g: f64) -> Ordering {
    f.partial_cmp(&g).unwrap_or(Ordering::Less)
}

fn write_elements<'a, I, T>(
    f: &mut fmt::Formatter,
    it: I,
    prefix: &'static str,
    suffix: &'static str,
    len: usize,
) -> fmt::Result
where
    I: Iterator<Item = &'a T>,
    T: fmt::Display + 'a,
{
    f.write_str(prefix)?;
    for (i, item) in it.enumerate() {
        if i < len - 1 {
            write!(f, "{item}, ")?;
        } else {
            write!(f, "{item}")?;
        }
    }
    f.write_str(suffix)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{:?}", s.inner()),
            Value::Bytes(b) => write!(f, "b{:?}", b.to_vec()),
            Value::Tuple(v) => {
                let v = v.inner();
                write_elements(f, v.iter(), "(", ")", v.len())
            }
            Value::List(v) => {
                let v = v.inner();
                write_elements(f, v.iter(), "[", "]", v.len())
            }
            Value::FrozenSet(v) => {
                let v = v.inner();
                write_elements(f, v.iter(), "frozenset([", "])", v.len())
            }
            Value::Set(v) => {
                let v = v.inner();
                if v.is_empty() {
                    write!(f, "set()")
                } else {
                    write_elements(f, v.iter(), "{", "}", v.len())
                }
            }
            Value::Dict(v) => {
                write!(f, "{{")?;
                let v = v.inner();
                for (i, (key, value)) in v.iter().enumerate() {
                    if i < v.len() - 1 {
                        write!(f, "{key}: {value}, ")?;
                    } else {
                        write!(f, "{key}: {value}")?;
                    }
                }
                write!(f, "}}")
            }
            Value::Mark => write!(f, "<mark>"),
            Value::TypeRef(t) => write!(f, "{}.{}", t.module, t.name),
            Value::Object(o) => write!(f, "{:?}", o.borrow()),
        }
    }
}

impl fmt::Display for HashableValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.clone().into_value().fmt(f)
    }
}
