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

//! The pickle value stack (spec §3.2) and the MARK discipline (spec §3.4).
//!
//! `Mark` is encoded as an explicit `Value` variant rather than a side
//! channel, per the Design Notes: a single `Vec<Value>` plus `rposition`
//! finds the most recent mark cheaply and keeps push/pop/peek uniform.

use crate::error::{Error, ErrorCode, Result};
use crate::value::Value;

#[derive(Default)]
pub struct Stack {
    items: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.items.pop().ok_or(Error::Eval(ErrorCode::StackUnderflow))
    }

    pub fn peek(&self) -> Result<&Value> {
        self.items.last().ok_or(Error::Eval(ErrorCode::StackUnderflow))
    }

    pub fn peek_mut(&mut self) -> Result<&mut Value> {
        self.items.last_mut().ok_or(Error::Eval(ErrorCode::StackUnderflow))
    }

    pub fn mark(&mut self) {
        self.items.push(Value::Mark);
    }

    /// Pops everything above (and including) the most recent `Mark`,
    /// returning the popped slice in stream order. Errors if no `Mark` is
    /// present (spec §3.4).
    pub fn pop_mark(&mut self) -> Result<Vec<Value>> {
        let mark_index = self
            .items
            .iter()
            .rposition(|v| matches!(v, Value::Mark))
            .ok_or(Error::Eval(ErrorCode::MissingMark))?;

        let popped = self.items.split_off(mark_index + 1);
        self.items.pop(); // discard the Mark itself
        Ok(popped)
    }

    /// Consumes the stack, returning its contents bottom-to-top: the
    /// result of a successful deserialize (spec §3.6).
    pub fn into_values(self) -> Vec<Value> {
        self.items
    }
}
