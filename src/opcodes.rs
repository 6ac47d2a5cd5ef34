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

//! Opcode constants and the `Opcode` dispatch enum, covering protocols 1-5.
//!
//! Names follow CPython's `pickle.py`.

use std::convert::TryFrom;

use crate::error::ErrorCode;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    Mark = b'(',
    Stop = b'.',
    Pop = b'0',
    PopMark = b'1',
    Dup = b'2',
    Float = b'F',
    Int = b'I',
    BinInt = b'J',
    BinInt1 = b'K',
    Long = b'L',
    BinInt2 = b'M',
    None = b'N',
    PersId = b'P',
    BinPersId = b'Q',
    Reduce = b'R',
    String = b'S',
    BinString = b'T',
    ShortBinString = b'U',
    Unicode = b'V',
    BinUnicode = b'X',
    Append = b'a',
    Build = b'b',
    Global = b'c',
    Dict = b'd',
    EmptyDict = b'}',
    Appends = b'e',
    Get = b'g',
    BinGet = b'h',
    Inst = b'i',
    LongBinGet = b'j',
    List = b'l',
    EmptyList = b']',
    Obj = b'o',
    Put = b'p',
    BinPut = b'q',
    LongBinPut = b'r',
    SetItem = b's',
    Tuple = b't',
    EmptyTuple = b')',
    SetItems = b'u',
    BinFloat = b'G',
    Proto = b'\x80',
    NewObj = b'\x81',
    Ext1 = b'\x82',
    Ext2 = b'\x83',
    Ext4 = b'\x84',
    Tuple1 = b'\x85',
    Tuple2 = b'\x86',
    Tuple3 = b'\x87',
    NewTrue = b'\x88',
    NewFalse = b'\x89',
    Long1 = b'\x8a',
    Long4 = b'\x8b',
    BinBytes = b'B',
    ShortBinBytes = b'C',
    ShortBinUnicode = b'\x8c',
    BinUnicode8 = b'\x8d',
    BinBytes8 = b'\x8e',
    EmptySet = b'\x8f',
    AddItems = b'\x90',
    FrozenSet = b'\x91',
    NewObjEx = b'\x92',
    StackGlobal = b'\x93',
    Memoize = b'\x94',
    Frame = b'\x95',
    ByteArray8 = b'\x96',
    NextBuffer = b'\x97',
    ReadonlyBuffer = b'\x98',
}

impl Opcode {
    /// A human name, used in `UnsupportedOpcode`/`UnknownOpcode` messages.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Mark => "MARK",
            Opcode::Stop => "STOP",
            Opcode::Pop => "POP",
            Opcode::PopMark => "POP_MARK",
            Opcode::Dup => "DUP",
            Opcode::Float => "FLOAT",
            Opcode::Int => "INT",
            Opcode::BinInt => "BININT",
            Opcode::BinInt1 => "BININT1",
            Opcode::Long => "LONG",
            Opcode::BinInt2 => "BININT2",
            Opcode::None => "NONE",
            Opcode::PersId => "PERSID",
            Opcode::BinPersId => "BINPERSID",
            Opcode::Reduce => "REDUCE",
            Opcode::String => "STRING",
            Opcode::BinString => "BINSTRING",
            Opcode::ShortBinString => "SHORT_BINSTRING",
            Opcode::Unicode => "UNICODE",
            Opcode::BinUnicode => "BINUNICODE",
            Opcode::Append => "APPEND",
            Opcode::Build => "BUILD",
            Opcode::Global => "GLOBAL",
            Opcode::Dict => "DICT",
            Opcode::EmptyDict => "EMPTY_DICT",
            Opcode::Appends => "APPENDS",
            Opcode::Get => "GET",
            Opcode::BinGet => "BINGET",
            Opcode::Inst => "INST",
            Opcode::LongBinGet => "LONG_BINGET",
            Opcode::List => "LIST",
            Opcode::EmptyList => "EMPTY_LIST",
            Opcode::Obj => "OBJ",
            Opcode::Put => "PUT",
            Opcode::BinPut => "BINPUT",
            Opcode::LongBinPut => "LONG_BINPUT",
            Opcode::SetItem => "SETITEM",
            Opcode::Tuple => "TUPLE",
            Opcode::EmptyTuple => "EMPTY_TUPLE",
            Opcode::SetItems => "SETITEMS",
            Opcode::BinFloat => "BINFLOAT",
            Opcode::Proto => "PROTO",
            Opcode::NewObj => "NEWOBJ",
            Opcode::Ext1 => "EXT1",
            Opcode::Ext2 => "EXT2",
            Opcode::Ext4 => "EXT4",
            Opcode::Tuple1 => "TUPLE1",
            Opcode::Tuple2 => "TUPLE2",
            Opcode::Tuple3 => "TUPLE3",
            Opcode::NewTrue => "NEWTRUE",
            Opcode::NewFalse => "NEWFALSE",
            Opcode::Long1 => "LONG1",
            Opcode::Long4 => "LONG4",
            Opcode::BinBytes => "BINBYTES",
            Opcode::ShortBinBytes => "SHORT_BINBYTES",
            Opcode::ShortBinUnicode => "SHORT_BINUNICODE",
            Opcode::BinUnicode8 => "BINUNICODE8",
            Opcode::BinBytes8 => "BINBYTES8",
            Opcode::EmptySet => "EMPTY_SET",
            Opcode::AddItems => "ADDITEMS",
            Opcode::FrozenSet => "FROZENSET",
            Opcode::NewObjEx => "NEWOBJ_EX",
            Opcode::StackGlobal => "STACK_GLOBAL",
            Opcode::Memoize => "MEMOIZE",
            Opcode::Frame => "FRAME",
            Opcode::ByteArray8 => "BYTEARRAY8",
            Opcode::NextBuffer => "NEXT_BUFFER",
            Opcode::ReadonlyBuffer => "READONLY_BUFFER",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ErrorCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            b'(' => Mark,
            b'.' => Stop,
            b'0' => Pop,
            b'1' => PopMark,
            b'2' => Dup,
            b'F' => Float,
            b'I' => Int,
            b'J' => BinInt,
            b'K' => BinInt1,
            b'L' => Long,
            b'M' => BinInt2,
            b'N' => None,
            b'P' => PersId,
            b'Q' => BinPersId,
            b'R' => Reduce,
            b'S' => String,
            b'T' => BinString,
            b'U' => ShortBinString,
            b'V' => Unicode,
            b'X' => BinUnicode,
            b'a' => Append,
            b'b' => Build,
            b'c' => Global,
            b'd' => Dict,
            b'}' => EmptyDict,
            b'e' => Appends,
            b'g' => Get,
            b'h' => BinGet,
            b'i' => Inst,
            b'j' => LongBinGet,
            b'l' => List,
            b']' => EmptyList,
            b'o' => Obj,
            b'p' => Put,
            b'q' => BinPut,
            b'r' => LongBinPut,
            b's' => SetItem,
            b't' => Tuple,
            b')' => EmptyTuple,
            b'u' => SetItems,
            b'G' => BinFloat,
            b'\x80' => Proto,
            b'\x81' => NewObj,
            b'\x82' => Ext1,
            b'\x83' => Ext2,
            b'\x84' => Ext4,
            b'\x85' => Tuple1,
            b'\x86' => Tuple2,
            b'\x87' => Tuple3,
            b'\x88' => NewTrue,
            b'\x89' => NewFalse,
            b'\x8a' => Long1,
            b'\x8b' => Long4,
            b'B' => BinBytes,
            b'C' => ShortBinBytes,
            b'\x8c' => ShortBinUnicode,
            b'\x8d' => BinUnicode8,
            b'\x8e' => BinBytes8,
            b'\x8f' => EmptySet,
            b'\x90' => AddItems,
            b'\x91' => FrozenSet,
            b'\x92' => NewObjEx,
            b'\x93' => StackGlobal,
            b'\x94' => Memoize,
            b'\x95' => Frame,
            b'\x96' => ByteArray8,
            b'\x97' => NextBuffer,
            b'\x98' => ReadonlyBuffer,
            _ => return Err(ErrorCode::UnknownOpcode(value)),
        })
    }
}
