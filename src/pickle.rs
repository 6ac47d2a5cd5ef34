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

//! VM State and Opcode Dispatch (spec §4.2/§4.3): the `Unpickler` drives
//! the frame-aware byte source through the stack VM until STOP.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::error::{Error, ErrorCode, Result};
use crate::frame::FrameReader;
use crate::memo::Memo;
use crate::opcodes::Opcode;
use crate::registry::ProxyRegistry;
use crate::stack::Stack;
use crate::value::{ByteBuf, Shared, SharedFrozen, TypeRef, Value};

const HIGHEST_PROTOCOL: u8 = 5;

/// Upper bound for any single length-prefixed allocation (spec §6.3): a
/// 64-bit length operand (`BINUNICODE8`/`BINBYTES8`/`BYTEARRAY8`/`FRAME`)
/// is otherwise attacker-controlled and would force a multi-gigabyte
/// `Vec` allocation before the read even has a chance to fail short.
const MAX_ALLOC_LEN: u64 = i32::MAX as u64;

/// Bounds a length operand to `MAX_ALLOC_LEN` before it is used to size an
/// allocation, failing fast with `MalformedOperand` instead of letting
/// `read_buf` attempt an oversized `vec![0u8; n]`.
fn check_alloc_len(n: u64, opcode: &str) -> Result<usize> {
    if n > MAX_ALLOC_LEN {
        return Err(malformed(format!("{opcode} length {n} exceeds 2^31-1")));
    }
    Ok(n as usize)
}

/// Controls how `STRING`/`BINSTRING`/`SHORT_BINSTRING` decode their byte
/// operand. Only these three legacy protocol-0/1 opcodes consult it; every
/// other string opcode is UTF-8 by wire definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringEncoding {
    /// ISO-8859-1: every byte maps directly to the codepoint of the same
    /// value. The default, matching spec §6.2.
    Latin1,
    Ascii,
    Utf8,
}

impl StringEncoding {
    fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            StringEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::Eval(ErrorCode::MalformedOperand("not valid UTF-8".into()))),
            StringEncoding::Ascii => {
                if !bytes.is_ascii() {
                    return Err(Error::Eval(ErrorCode::MalformedOperand(
                        "not valid ASCII".into(),
                    )));
                }
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
            StringEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Decodes `raw-unicode-escape`: ASCII passes through (including literal
/// `\uXXXX`/`\UXXXXXXXX` escapes, which are unescaped to their code
/// point); bytes `>= 0x80` map directly to the same-valued code point.
fn decode_raw_unicode_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && i + 1 < bytes.len() && matches!(bytes[i + 1], b'u' | b'U') {
            let digits = if bytes[i + 1] == b'U' { 8 } else { 4 };
            let escape = bytes.get(i + 2..i + 2 + digits).and_then(|hex| {
                std::str::from_utf8(hex).ok().and_then(|s| u32::from_str_radix(s, 16).ok())
            });
            if let Some(code) = escape.and_then(char::from_u32) {
                out.push(code);
                i += 2 + digits;
                continue;
            }
        }
        out.push(b as char);
        i += 1;
    }
    out
}

/// The ephemeral per-deserialize VM state plus the frame-aware byte
/// source (spec §4.2).
pub struct Unpickler<R> {
    frame: FrameReader<R>,
    stack: Stack,
    memo: Memo,
    encoding: Option<StringEncoding>,
    buffers: Option<Box<dyn Iterator<Item = Vec<u8>>>>,
    registry: ProxyRegistry,
    proto: u8,
}

impl<R: Read + Seek> Unpickler<R> {
    pub fn new(source: R) -> Self {
        Self {
            frame: FrameReader::new(source),
            stack: Stack::new(),
            memo: Memo::new(),
            encoding: Some(StringEncoding::Latin1),
            buffers: None,
            registry: ProxyRegistry::new(),
            proto: 0,
        }
    }

    /// Affects `STRING`/`BINSTRING`/`SHORT_BINSTRING` only. `None` pushes
    /// the raw bytes instead of decoding them (spec §6.2).
    pub fn set_encoding(&mut self, encoding: Option<StringEncoding>) {
        self.encoding = encoding;
    }

    pub fn set_buffers<I>(&mut self, buffers: I)
    where
        I: Iterator<Item = Vec<u8>> + 'static,
    {
        self.buffers = Some(Box::new(buffers));
    }

    pub fn registry_mut(&mut self) -> &mut ProxyRegistry {
        &mut self.registry
    }

    /// Registers a host factory for `(module, name)` (spec §4.4).
    pub fn register_proxy<F>(&mut self, module: &str, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<std::rc::Rc<std::cell::RefCell<dyn crate::registry::Proxy>>>
            + 'static,
    {
        self.registry.register(module, name, factory)
    }

    /// Reclaims the underlying byte source instead of dropping it.
    pub fn into_inner(self) -> R {
        self.frame.into_inner()
    }

    /// Runs the VM to STOP and returns the stack snapshot, bottom-to-top
    /// (spec §3.6, §4.3).
    pub fn deserialize(&mut self) -> Result<Vec<Value>> {
        let mut is_first = true;
        loop {
            let byte = self.frame.read_byte()?;
            let opcode = Opcode::try_from(byte)?;
            if matches!(opcode, Opcode::Stop) {
                break;
            }
            self.dispatch(opcode, is_first)?;
            is_first = false;
        }
        Ok(std::mem::take(&mut self.stack).into_values())
    }

    fn dispatch(&mut self, op: Opcode, is_first: bool) -> Result<()> {
        use Opcode::*;
        match op {
            Mark => {
                self.stack.mark();
                Ok(())
            }
            Stop => unreachable!("STOP is handled by the caller"),
            Pop => self.stack.pop().map(drop),
            PopMark => self.stack.pop_mark().map(drop),
            Dup => {
                let top = self.stack.peek()?.clone();
                self.stack.push(top);
                Ok(())
            }
            Float => self.op_float(),
            Int => self.op_int(),
            BinInt => self.op_binint(),
            BinInt1 => self.op_binint1(),
            Long => self.op_long(),
            BinInt2 => self.op_binint2(),
            None => {
                self.stack.push(Value::None);
                Ok(())
            }
            PersId => Err(unsupported(PersId)),
            BinPersId => Err(unsupported(BinPersId)),
            Reduce => Err(unsupported(Reduce)),
            String => self.op_string(),
            BinString => self.op_binstring(),
            ShortBinString => self.op_short_binstring(),
            Unicode => self.op_unicode(),
            BinUnicode => self.op_binunicode(),
            Append => self.op_append(),
            Build => self.op_build(),
            Global => self.op_global(),
            Dict => self.op_dict(),
            EmptyDict => {
                self.stack.push(Value::Dict(Shared::new(BTreeMap::new())));
                Ok(())
            }
            Appends => self.op_appends(),
            Get => self.op_get(),
            BinGet => self.op_binget(),
            Inst => self.op_inst(),
            LongBinGet => self.op_long_binget(),
            List => self.op_list(),
            EmptyList => {
                self.stack.push(Value::List(Shared::new(Vec::new())));
                Ok(())
            }
            Obj => self.op_obj(),
            Put => self.op_put(),
            BinPut => self.op_binput(),
            LongBinPut => self.op_long_binput(),
            SetItem => self.op_setitem(),
            Tuple => self.op_tuple(),
            EmptyTuple => {
                self.stack.push(Value::Tuple(SharedFrozen::new(Vec::new())));
                Ok(())
            }
            SetItems => self.op_setitems(),
            BinFloat => self.op_binfloat(),
            Proto => self.op_proto(is_first),
            NewObj => self.op_newobj(),
            Ext1 => Err(unsupported(Ext1)),
            Ext2 => Err(unsupported(Ext2)),
            Ext4 => Err(unsupported(Ext4)),
            Tuple1 => self.op_tuple_n(1),
            Tuple2 => self.op_tuple_n(2),
            Tuple3 => self.op_tuple_n(3),
            NewTrue => {
                self.stack.push(Value::Bool(true));
                Ok(())
            }
            NewFalse => {
                self.stack.push(Value::Bool(false));
                Ok(())
            }
            Long1 => self.op_long1(),
            Long4 => self.op_long4(),
            BinBytes => self.op_binbytes(),
            ShortBinBytes => self.op_short_binbytes(),
            ShortBinUnicode => self.op_short_binunicode(),
            BinUnicode8 => self.op_binunicode8(),
            BinBytes8 => self.op_binbytes8(),
            EmptySet => {
                self.stack.push(Value::Set(Shared::new(BTreeSet::new())));
                Ok(())
            }
            AddItems => self.op_additems(),
            FrozenSet => self.op_frozenset(),
            NewObjEx => self.op_newobj_ex(),
            StackGlobal => self.op_stack_global(),
            Memoize => self.op_memoize(),
            Frame => self.op_frame(),
            ByteArray8 => self.op_bytearray8(),
            NextBuffer => self.op_next_buffer(),
            ReadonlyBuffer => self.op_readonly_buffer(),
        }
    }

    // -- numeric -----------------------------------------------------

    fn op_int(&mut self) -> Result<()> {
        let line = self.frame.read_line()?;
        let text = std::str::from_utf8(&line)
            .map_err(|_| malformed("INT operand is not valid UTF-8"))?;
        let value = match text {
            "01" => Value::Bool(true),
            "00" => Value::Bool(false),
            _ => Value::Int32(
                text.parse::<i32>().map_err(|_| malformed(format!("invalid INT {text:?}")))?,
            ),
        };
        self.stack.push(value);
        Ok(())
    }

    fn op_binint(&mut self) -> Result<()> {
        let v = self.frame.read_i32_le()?;
        self.stack.push(Value::Int32(v));
        Ok(())
    }

    fn op_binint1(&mut self) -> Result<()> {
        let v = self.frame.read_u8()? as i32;
        self.stack.push(Value::Int32(v));
        Ok(())
    }

    fn op_binint2(&mut self) -> Result<()> {
        let v = self.frame.read_u16_le()? as i32;
        self.stack.push(Value::Int32(v));
        Ok(())
    }

    fn op_long(&mut self) -> Result<()> {
        let line = self.frame.read_line()?;
        let mut text = std::str::from_utf8(&line)
            .map_err(|_| malformed("LONG operand is not valid UTF-8"))?;
        if let Some(stripped) = text.strip_suffix(['L', 'l']) {
            text = stripped;
        }
        let value = text.parse::<i64>().map_err(|_| malformed(format!("invalid LONG {text:?}")))?;
        self.stack.push(Value::Int64(value));
        Ok(())
    }

    fn op_long1(&mut self) -> Result<()> {
        let n = self.frame.read_u8()? as usize;
        if n > 8 {
            return Err(malformed(format!("LONG1 length {n} exceeds 8 bytes")));
        }
        let bytes = self.frame.read_buf(n)?;
        // Variable-width two's-complement signed integer (spec §9 open
        // question, resolved in favor of sign extension over CPython's
        // historical zero-extension bug).
        let big = BigInt::from_signed_bytes_le(&bytes);
        let value = big
            .to_i64()
            .ok_or_else(|| malformed(format!("LONG1 value {big} does not fit in 8 bytes")))?;
        self.stack.push(Value::Int64(value));
        Ok(())
    }

    fn op_long4(&mut self) -> Result<()> {
        let n = self.frame.read_i32_le()?;
        if n < 0 {
            return Err(malformed("LONG4 has negative byte count"));
        }
        let bytes = self.frame.read_buf(n as usize)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| malformed("LONG4 operand is not valid ASCII"))?;
        let value = text.parse::<i64>().map_err(|_| malformed(format!("invalid LONG4 {text:?}")))?;
        self.stack.push(Value::Int64(value));
        Ok(())
    }

    fn op_float(&mut self) -> Result<()> {
        let line = self.frame.read_line()?;
        let text = std::str::from_utf8(&line)
            .map_err(|_| malformed("FLOAT operand is not valid UTF-8"))?;
        let value = text.parse::<f64>().map_err(|_| malformed(format!("invalid FLOAT {text:?}")))?;
        self.stack.push(Value::Float64(value));
        Ok(())
    }

    fn op_binfloat(&mut self) -> Result<()> {
        let value = self.frame.read_f64_be()?;
        self.stack.push(Value::Float64(value));
        Ok(())
    }

    // -- strings and bytes --------------------------------------------

    fn op_string(&mut self) -> Result<()> {
        let line = self.frame.read_line()?;
        if line.len() < 2 || line[0] != b'\'' || line[line.len() - 1] != b'\'' {
            return Err(malformed("STRING operand must be single-quoted"));
        }
        let text = String::from_utf8(line[1..line.len() - 1].to_vec())
            .map_err(|_| malformed("STRING operand is not valid UTF-8"))?;
        self.stack.push(Value::Text(SharedFrozen::new(text)));
        Ok(())
    }

    fn push_legacy_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        match self.encoding {
            Some(encoding) => {
                let text = encoding.decode(&bytes)?;
                self.stack.push(Value::Text(SharedFrozen::new(text)));
            }
            None => {
                self.stack.push(Value::Bytes(ByteBuf::Frozen(SharedFrozen::new(bytes))));
            }
        }
        Ok(())
    }

    fn op_binstring(&mut self) -> Result<()> {
        let n = self.frame.read_i32_le()?;
        if n < 0 {
            return Err(malformed("BINSTRING has negative byte count"));
        }
        let bytes = self.frame.read_buf(n as usize)?;
        self.push_legacy_bytes(bytes)
    }

    fn op_short_binstring(&mut self) -> Result<()> {
        let n = self.frame.read_u8()? as usize;
        let bytes = self.frame.read_buf(n)?;
        self.push_legacy_bytes(bytes)
    }

    fn op_unicode(&mut self) -> Result<()> {
        let line = self.frame.read_line()?;
        let text = decode_raw_unicode_escape(&line);
        self.stack.push(Value::Text(SharedFrozen::new(text)));
        Ok(())
    }

    fn op_binunicode(&mut self) -> Result<()> {
        let n = check_alloc_len(self.frame.read_u32_le()? as u64, "BINUNICODE")?;
        let bytes = self.frame.read_buf(n)?;
        let text = String::from_utf8(bytes).map_err(|_| malformed("BINUNICODE is not valid UTF-8"))?;
        self.stack.push(Value::Text(SharedFrozen::new(text)));
        Ok(())
    }

    fn op_short_binunicode(&mut self) -> Result<()> {
        let n = self.frame.read_u8()? as usize;
        let bytes = self.frame.read_buf(n)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| malformed("SHORT_BINUNICODE is not valid UTF-8"))?;
        self.stack.push(Value::Text(SharedFrozen::new(text)));
        Ok(())
    }

    fn op_binunicode8(&mut self) -> Result<()> {
        let n = self.frame.read_i64_le()?;
        if n < 0 {
            return Err(malformed("BINUNICODE8 has negative byte count"));
        }
        let n = check_alloc_len(n as u64, "BINUNICODE8")?;
        let bytes = self.frame.read_buf(n)?;
        let text =
            String::from_utf8(bytes).map_err(|_| malformed("BINUNICODE8 is not valid UTF-8"))?;
        self.stack.push(Value::Text(SharedFrozen::new(text)));
        Ok(())
    }

    fn op_binbytes(&mut self) -> Result<()> {
        let n = check_alloc_len(self.frame.read_u32_le()? as u64, "BINBYTES")?;
        let bytes = self.frame.read_buf(n)?;
        self.stack.push(Value::Bytes(ByteBuf::Frozen(SharedFrozen::new(bytes))));
        Ok(())
    }

    fn op_short_binbytes(&mut self) -> Result<()> {
        let n = self.frame.read_u8()? as usize;
        let bytes = self.frame.read_buf(n)?;
        self.stack.push(Value::Bytes(ByteBuf::Frozen(SharedFrozen::new(bytes))));
        Ok(())
    }

    fn op_binbytes8(&mut self) -> Result<()> {
        let n = self.frame.read_i64_le()?;
        if n < 0 {
            return Err(malformed("BINBYTES8 has negative byte count"));
        }
        let n = check_alloc_len(n as u64, "BINBYTES8")?;
        let bytes = self.frame.read_buf(n)?;
        self.stack.push(Value::Bytes(ByteBuf::Frozen(SharedFrozen::new(bytes))));
        Ok(())
    }

    fn op_bytearray8(&mut self) -> Result<()> {
        let n = self.frame.read_i64_le()?;
        if n < 0 {
            return Err(malformed("BYTEARRAY8 has negative byte count"));
        }
        let n = check_alloc_len(n as u64, "BYTEARRAY8")?;
        let bytes = self.frame.read_buf(n)?;
        self.stack.push(Value::Bytes(ByteBuf::Mutable(Shared::new(bytes))));
        Ok(())
    }

    // -- memo -----------------------------------------------------------

    fn op_get(&mut self) -> Result<()> {
        let line = self.frame.read_line()?;
        let text =
            std::str::from_utf8(&line).map_err(|_| malformed("GET operand is not valid UTF-8"))?;
        let index = text
            .parse::<u32>()
            .map_err(|_| Error::Eval(ErrorCode::MemoError(format!("invalid GET index {text:?}"))))?;
        let value = self.memo.get(index)?;
        self.stack.push(value);
        Ok(())
    }

    fn op_binget(&mut self) -> Result<()> {
        let index = self.frame.read_u8()? as u32;
        let value = self.memo.get(index)?;
        self.stack.push(value);
        Ok(())
    }

    fn op_long_binget(&mut self) -> Result<()> {
        let index = self.frame.read_u32_le()?;
        if index > i32::MAX as u32 {
            return Err(Error::Eval(ErrorCode::MemoError(format!(
                "LONG_BINGET index {index} exceeds i32::MAX"
            ))));
        }
        let value = self.memo.get(index)?;
        self.stack.push(value);
        Ok(())
    }

    fn op_put(&mut self) -> Result<()> {
        let line = self.frame.read_line()?;
        let text =
            std::str::from_utf8(&line).map_err(|_| malformed("PUT operand is not valid UTF-8"))?;
        let index = text
            .parse::<i64>()
            .map_err(|_| Error::Eval(ErrorCode::MemoError(format!("invalid PUT index {text:?}"))))?;
        if index < 0 {
            return Err(Error::Eval(ErrorCode::MemoError("negative PUT index".into())));
        }
        let value = self.stack.peek()?.clone();
        self.memo.put(index as u32, value);
        Ok(())
    }

    fn op_binput(&mut self) -> Result<()> {
        let index = self.frame.read_u8()? as u32;
        let value = self.stack.peek()?.clone();
        self.memo.put(index, value);
        Ok(())
    }

    fn op_long_binput(&mut self) -> Result<()> {
        let index = self.frame.read_u32_le()?;
        let value = self.stack.peek()?.clone();
        self.memo.put(index, value);
        Ok(())
    }

    fn op_memoize(&mut self) -> Result<()> {
        let index = self.memo.len() as u32;
        let value = self.stack.peek()?.clone();
        self.memo.put(index, value);
        Ok(())
    }

    // -- aggregates -------------------------------------------------------

    fn op_append(&mut self) -> Result<()> {
        let value = self.stack.pop()?;
        match self.stack.peek()? {
            Value::List(list) => {
                list.inner_mut().push(value);
                Ok(())
            }
            other => Err(type_mismatch("list", other)),
        }
    }

    fn op_appends(&mut self) -> Result<()> {
        let items = self.stack.pop_mark()?;
        match self.stack.peek()? {
            Value::List(list) => {
                list.inner_mut().extend(items);
                Ok(())
            }
            other => Err(type_mismatch("list", other)),
        }
    }

    fn op_setitem(&mut self) -> Result<()> {
        let value = self.stack.pop()?;
        let key = self.stack.pop()?;
        let key = hashable_key(key)?;
        match self.stack.peek()? {
            Value::Dict(dict) => {
                dict.inner_mut().insert(key, value);
                Ok(())
            }
            other => Err(type_mismatch("dict", other)),
        }
    }

    fn op_setitems(&mut self) -> Result<()> {
        let items = self.stack.pop_mark()?;
        if items.len() % 2 != 0 {
            return Err(malformed("SETITEMS mark slice has an odd number of elements"));
        }
        match self.stack.peek()? {
            Value::Dict(dict) => {
                let mut dict = dict.inner_mut();
                for pair in items.chunks_exact(2) {
                    let key = hashable_key(pair[0].clone())?;
                    dict.insert(key, pair[1].clone());
                }
                Ok(())
            }
            other => Err(type_mismatch("dict", other)),
        }
    }

    fn op_dict(&mut self) -> Result<()> {
        let items = self.stack.pop_mark()?;
        if items.len() % 2 != 0 {
            return Err(malformed("DICT mark slice has an odd number of elements"));
        }
        let mut map = BTreeMap::new();
        for pair in items.chunks_exact(2) {
            let key = hashable_key(pair[0].clone())?;
            map.insert(key, pair[1].clone());
        }
        self.stack.push(Value::Dict(Shared::new(map)));
        Ok(())
    }

    fn op_list(&mut self) -> Result<()> {
        let items = self.stack.pop_mark()?;
        self.stack.push(Value::List(Shared::new(items)));
        Ok(())
    }

    fn op_tuple(&mut self) -> Result<()> {
        let items = self.stack.pop_mark()?;
        self.stack.push(Value::Tuple(SharedFrozen::new(items)));
        Ok(())
    }

    fn op_tuple_n(&mut self, n: usize) -> Result<()> {
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.stack.pop()?);
        }
        items.reverse();
        self.stack.push(Value::Tuple(SharedFrozen::new(items)));
        Ok(())
    }

    fn op_additems(&mut self) -> Result<()> {
        let items = self.stack.pop_mark()?;
        match self.stack.peek()? {
            Value::Set(set) => {
                let mut set = set.inner_mut();
                for item in items {
                    set.insert(hashable_key(item)?);
                }
                Ok(())
            }
            other => Err(type_mismatch("set", other)),
        }
    }

    fn op_frozenset(&mut self) -> Result<()> {
        let items = self.stack.pop_mark()?;
        let mut set = BTreeSet::new();
        for item in items {
            set.insert(hashable_key(item)?);
        }
        self.stack.push(Value::FrozenSet(SharedFrozen::new(set)));
        Ok(())
    }

    // -- object construction ----------------------------------------------

    fn read_line_as_name(&mut self) -> Result<String> {
        let line = self.frame.read_line()?;
        String::from_utf8(line).map_err(|_| malformed("proxy module/name operand is not valid UTF-8"))
    }

    fn op_global(&mut self) -> Result<()> {
        let module = self.read_line_as_name()?;
        let name = self.read_line_as_name()?;
        let type_ref = self.registry.lookup(&module, &name)?;
        self.stack.push(Value::TypeRef(type_ref));
        Ok(())
    }

    fn op_stack_global(&mut self) -> Result<()> {
        let name_value = self.stack.pop()?;
        let name = expect_text(name_value)?;
        let module_value = self.stack.pop()?;
        let module = expect_text(module_value)?;
        let type_ref = self.registry.lookup(&module, &name)?;
        self.stack.push(Value::TypeRef(type_ref));
        Ok(())
    }

    fn op_inst(&mut self) -> Result<()> {
        let module = self.read_line_as_name()?;
        let name = self.read_line_as_name()?;
        let args = self.stack.pop_mark()?;
        let type_ref = self.registry.lookup(&module, &name)?;
        let obj = type_ref.construct(&args)?;
        self.stack.push(Value::Object(obj));
        Ok(())
    }

    fn op_obj(&mut self) -> Result<()> {
        let mut items = self.stack.pop_mark()?;
        if items.is_empty() {
            return Err(Error::Eval(ErrorCode::MissingMark));
        }
        let type_ref = expect_typeref(items.remove(0))?;
        let obj = type_ref.construct(&items)?;
        self.stack.push(Value::Object(obj));
        Ok(())
    }

    fn op_newobj(&mut self) -> Result<()> {
        let args_value = self.stack.pop()?;
        let type_ref_value = self.stack.pop()?;
        let type_ref = expect_typeref(type_ref_value)?;
        let args = match args_value {
            Value::Tuple(items) => items.inner().clone(),
            other => vec![other],
        };
        let obj = type_ref.construct(&args)?;
        self.stack.push(Value::Object(obj));
        Ok(())
    }

    fn op_newobj_ex(&mut self) -> Result<()> {
        let _kwargs = self.stack.pop()?;
        self.op_newobj()
    }

    fn op_build(&mut self) -> Result<()> {
        let state = self.stack.pop()?;
        match self.stack.peek()? {
            Value::Object(obj) => {
                obj.borrow_mut().set_state(state)?;
                Ok(())
            }
            other => Err(type_mismatch("object", other)),
        }
    }

    // -- protocol and framing ----------------------------------------------

    fn op_proto(&mut self, is_first: bool) -> Result<()> {
        if !is_first {
            return Err(malformed("PROTO may only appear as the first opcode"));
        }
        let version = self.frame.read_u8()?;
        if version > HIGHEST_PROTOCOL {
            return Err(Error::Eval(ErrorCode::ProtocolUnsupported(version)));
        }
        self.proto = version;
        Ok(())
    }

    fn op_frame(&mut self) -> Result<()> {
        let len = self.frame.read_i64_le()?;
        if len < 0 {
            return Err(Error::Eval(ErrorCode::FrameViolation("negative frame length".into())));
        }
        self.frame.enter_frame(len as u64)
    }

    // -- out-of-band buffers (protocol 5) -----------------------------------

    fn op_next_buffer(&mut self) -> Result<()> {
        let buf = self
            .buffers
            .as_mut()
            .ok_or_else(|| {
                malformed("pickle stream refers to out-of-band data but no buffers were supplied")
            })?
            .next()
            .ok_or_else(|| malformed("not enough out-of-band buffers"))?;
        self.stack.push(Value::Bytes(ByteBuf::Mutable(Shared::new(buf))));
        Ok(())
    }

    fn op_readonly_buffer(&mut self) -> Result<()> {
        let top = self.stack.peek_mut()?;
        match top {
            Value::Bytes(ByteBuf::Frozen(_)) => Ok(()),
            Value::Bytes(ByteBuf::Mutable(shared)) => {
                let frozen = SharedFrozen::from(shared.clone());
                *top = Value::Bytes(ByteBuf::Frozen(frozen));
                Ok(())
            }
            other => Err(type_mismatch("bytes", &*other)),
        }
    }
}

impl Unpickler<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Unpickler::new(Cursor::new(bytes.into()))
    }
}

impl Unpickler<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Unpickler::new(BufReader::new(file)))
    }
}

/// Dict/set keys reject both `Mark` (stack discipline violation) and
/// `None` (spec §4.3: "null key → fail" for `DICT`/`SETITEM`/`SETITEMS`).
fn hashable_key(key: Value) -> Result<crate::value::HashableValue> {
    match key {
        Value::Mark => Err(Error::Eval(ErrorCode::TypeMismatch("hashable key", "Mark"))),
        Value::None => Err(Error::Eval(ErrorCode::TypeMismatch("non-null key", "None"))),
        other => other.into_hashable(),
    }
}

/// Typed pop helpers for GLOBAL/STACK_GLOBAL/NEWOBJ(_EX)/OBJ. Free functions
/// (not methods) so a call site can pop from `self.stack` and validate the
/// popped value in the same statement without holding a borrow of `self`
/// across the `stack.pop()` argument evaluation.
fn expect_text(value: Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s.inner().clone()),
        other => Err(type_mismatch("text", &other)),
    }
}

fn expect_typeref(value: Value) -> Result<TypeRef> {
    match value {
        Value::TypeRef(t) => Ok(t),
        other => Err(type_mismatch("type reference", &other)),
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::Eval(ErrorCode::MalformedOperand(msg.into()))
}

fn type_mismatch(expected: &'static str, found: &Value) -> Error {
    Error::Eval(ErrorCode::TypeMismatch(expected, value_type_name(found)))
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::None => "None",
        Value::Bool(_) => "bool",
        Value::Int32(_) => "int32",
        Value::Int64(_) => "int64",
        Value::Float64(_) => "float64",
        Value::Text(_) => "text",
        Value::Bytes(_) => "bytes",
        Value::Tuple(_) => "tuple",
        Value::List(_) => "list",
        Value::Dict(_) => "dict",
        Value::Set(_) => "set",
        Value::FrozenSet(_) => "frozenset",
        Value::Mark => "Mark",
        Value::TypeRef(_) => "type reference",
        Value::Object(_) => "object",
    }
}

fn unsupported(op: Opcode) -> Error {
    Error::Eval(ErrorCode::UnsupportedOpcode(op.name()))
}
