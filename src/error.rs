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

use std::fmt;
use std::io;
use std::result;

/// The distinguished error kinds a deserialize can fail with.
///
/// Sub-kinds beyond the ones named below exist for finer-grained context
/// (e.g. which memo index was missing) but every variant here maps to
/// exactly one of the nine kinds a conforming implementation must
/// distinguish.
#[derive(Clone, PartialEq, Debug)]
pub enum ErrorCode {
    /// EOF before STOP, or a read_exact short of the requested length.
    TruncatedInput,
    /// Numeric parse failure, bad STRING quoting, length overflow.
    MalformedOperand(String),
    /// The opcode byte is not a recognized pickle opcode.
    UnknownOpcode(u8),
    /// The opcode is recognized but intentionally not implemented.
    UnsupportedOpcode(&'static str),
    /// The stack is empty where a value was required.
    StackUnderflow,
    /// The stack top (or a popped value) is not of the required variant.
    TypeMismatch(&'static str, &'static str),
    /// A memo index was missing or negative.
    MemoError(String),
    /// A read or seek fell outside the active frame, a frame was entered
    /// while one was already active, or a frame length was out of range.
    FrameViolation(String),
    /// GLOBAL/INST/OBJ/STACK_GLOBAL/NEWOBJ referenced a `(module, name)`
    /// pair the host never registered.
    UnregisteredProxy(String, String),
    /// The host called `register_proxy` twice for the same `(module, name)`.
    ProxyAlreadyRegistered(String, String),
    /// The PROTO version byte exceeds the highest supported protocol.
    ProtocolUnsupported(u8),
    /// A Mark-delimited aggregate had no Mark below it on the stack.
    MissingMark,
    /// A value was used as a dict key or set member but is not hashable.
    ValueNotHashable,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorCode::TruncatedInput => write!(fmt, "truncated input: EOF before STOP"),
            ErrorCode::MalformedOperand(ref msg) => write!(fmt, "malformed operand: {}", msg),
            ErrorCode::UnknownOpcode(b) => write!(fmt, "unknown opcode 0x{:02x}", b),
            ErrorCode::UnsupportedOpcode(name) => {
                write!(fmt, "unsupported opcode {}", name)
            }
            ErrorCode::StackUnderflow => write!(fmt, "pickle stack underflow"),
            ErrorCode::TypeMismatch(expected, found) => {
                write!(fmt, "expected {} on stack, found {}", expected, found)
            }
            ErrorCode::MemoError(ref msg) => write!(fmt, "memo error: {}", msg),
            ErrorCode::FrameViolation(ref msg) => write!(fmt, "frame violation: {}", msg),
            ErrorCode::UnregisteredProxy(ref module, ref name) => {
                write!(fmt, "unregistered proxy type {}.{}", module, name)
            }
            ErrorCode::ProxyAlreadyRegistered(ref module, ref name) => {
                write!(fmt, "proxy type {}.{} is already registered", module, name)
            }
            ErrorCode::ProtocolUnsupported(v) => {
                write!(fmt, "unsupported pickle protocol version {}", v)
            }
            ErrorCode::MissingMark => write!(fmt, "no MARK found on stack"),
            ErrorCode::ValueNotHashable => write!(fmt, "value is not hashable"),
        }
    }
}

/// The error type returned by every fallible operation in this crate.
#[derive(Debug)]
pub enum Error {
    /// An I/O error reading from the underlying byte source.
    Io(io::Error),
    /// A well-formed `ErrorCode` describing why deserialization failed.
    Eval(ErrorCode),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(ref err) => write!(fmt, "{}", err),
            Error::Eval(ref code) => write!(fmt, "{}", code),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(ref err) => Some(err),
            Error::Eval(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Error {
        Error::Eval(code)
    }
}

pub type Result<T> = result::Result<T, Error>;
