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

//! The memo table (spec §3.3): an integer-indexed table of `Value`s that
//! lets GET/BINGET/LONG_BINGET re-push a value introduced earlier.

use std::collections::HashMap;

use crate::error::{Error, ErrorCode, Result};
use crate::value::Value;

#[derive(Default)]
pub struct Memo {
    table: HashMap<u32, Value>,
}

impl Memo {
    pub fn new() -> Self {
        Self { table: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Assigns `memo[index] = value`, overwriting any prior value. Never
    /// removes entries: the memo only grows across a single deserialize
    /// (spec §3.6).
    pub fn put(&mut self, index: u32, value: Value) {
        self.table.insert(index, value);
    }

    pub fn get(&self, index: u32) -> Result<Value> {
        self.table
            .get(&index)
            .cloned()
            .ok_or_else(|| Error::Eval(ErrorCode::MemoError(format!("missing memo index {index}"))))
    }
}
