//
// Copyright (C) 2023 SpinorML.
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

//! The proxy registry (spec §3.5/§4.4): the only way a foreign type enters
//! the result graph. Unlike CPython's `find_class`, this never imports a
//! module or calls an arbitrary callable — only types the host registered
//! up front can be materialized.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, ErrorCode, Result};
use crate::value::Value;

/// A host-defined instance produced by a registered factory. `BUILD`
/// invokes `set_state` on it with the value popped from the stack.
pub trait Proxy: fmt::Debug {
    fn set_state(&mut self, state: Value) -> Result<()>;
}

pub(crate) type ProxyFactory = Rc<dyn Fn(&[Value]) -> Result<Rc<RefCell<dyn Proxy>>>>;

/// A host-populated `module -> (name -> factory)` table, consulted by
/// GLOBAL, STACK_GLOBAL, INST, OBJ, and NEWOBJ(_EX).
#[derive(Clone, Default)]
pub struct ProxyRegistry {
    modules: HashMap<Rc<str>, HashMap<Rc<str>, ProxyFactory>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self { modules: HashMap::new() }
    }

    /// Registers a factory under `(module, name)`. Registering the same
    /// key twice is an error, matching spec §3.5.
    pub fn register<F>(&mut self, module: &str, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Rc<RefCell<dyn Proxy>>> + 'static,
    {
        let names = self.modules.entry(Rc::from(module)).or_default();
        if names.contains_key(name) {
            return Err(Error::Eval(ErrorCode::ProxyAlreadyRegistered(
                module.to_string(),
                name.to_string(),
            )));
        }
        names.insert(Rc::from(name), Rc::new(factory));
        Ok(())
    }

    pub(crate) fn lookup(&self, module: &str, name: &str) -> Result<crate::value::TypeRef> {
        let factory = self
            .modules
            .get(module)
            .and_then(|names| names.get(name))
            .ok_or_else(|| {
                Error::Eval(ErrorCode::UnregisteredProxy(module.to_string(), name.to_string()))
            })?
            .clone();

        Ok(crate::value::TypeRef { module: Rc::from(module), name: Rc::from(name), factory })
    }
}
