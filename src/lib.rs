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

//! A deserializer for Python's pickle object-serialization format,
//! protocols 1 through 5.
//!
//! This crate reconstructs a language-neutral tree of [`Value`]s from a
//! byte stream produced by a Python pickler. It implements only the reader
//! direction: the pickle stack VM, its memo table, MARK-delimited
//! aggregates, protocol-4 framing, and protocol-5 out-of-band buffers.
//!
//! Unlike CPython's own `pickle` module, this crate never imports a module
//! or calls an arbitrary callable to satisfy `GLOBAL`/`REDUCE`. Foreign
//! types only enter the result graph through a [`ProxyRegistry`] the host
//! populates ahead of time with [`Unpickler::register_proxy`].
//!
//! ```
//! use pickle_core::Unpickler;
//!
//! // PROTO 2, BININT1 42, STOP
//! let bytes = [0x80, 0x02, b'K', 42, b'.'];
//! let mut unpickler = Unpickler::from_bytes(bytes.to_vec());
//! let stack = unpickler.deserialize().unwrap();
//! assert_eq!(stack.len(), 1);
//! ```

mod error;
mod frame;
mod memo;
mod opcodes;
mod pickle;
mod registry;
mod stack;
mod value;

pub use crate::error::{Error, ErrorCode, Result};
pub use crate::pickle::{StringEncoding, Unpickler};
pub use crate::registry::{Proxy, ProxyRegistry};
pub use crate::value::{ByteBuf, HashableValue, Shared, SharedFrozen, TypeRef, Value};
