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

use std::cell::RefCell;
use std::rc::Rc;

use pickle_core::{ByteBuf, Error, ErrorCode, Proxy, Result, StringEncoding, Unpickler, Value};
use quickcheck::QuickCheck;

fn unpickle(bytes: &[u8]) -> Result<Vec<Value>> {
    Unpickler::from_bytes(bytes.to_vec()).deserialize()
}

fn err_code(bytes: &[u8]) -> ErrorCode {
    match unpickle(bytes) {
        Err(Error::Eval(code)) => code,
        other => panic!("expected an Eval error, got {other:?}"),
    }
}

/// A minimal pickle-opcode assembler, purely for constructing test fixtures.
struct Builder(Vec<u8>);

impl Builder {
    fn new() -> Self {
        Builder(Vec::new())
    }

    fn proto(mut self, version: u8) -> Self {
        self.0.push(0x80);
        self.0.push(version);
        self
    }

    fn mark(mut self) -> Self {
        self.0.push(b'(');
        self
    }

    fn binint1(mut self, v: u8) -> Self {
        self.0.push(b'K');
        self.0.push(v);
        self
    }

    fn empty_list(mut self) -> Self {
        self.0.push(b']');
        self
    }

    fn empty_dict(mut self) -> Self {
        self.0.push(b'}');
        self
    }

    fn empty_tuple(mut self) -> Self {
        self.0.push(b')');
        self
    }

    fn short_binunicode(mut self, s: &str) -> Self {
        self.0.push(0x8c);
        self.0.push(s.len() as u8);
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    fn short_binbytes(mut self, b: &[u8]) -> Self {
        self.0.push(b'C');
        self.0.push(b.len() as u8);
        self.0.extend_from_slice(b);
        self
    }

    fn memoize(mut self) -> Self {
        self.0.push(0x94);
        self
    }

    fn binput(mut self, index: u8) -> Self {
        self.0.push(b'q');
        self.0.push(index);
        self
    }

    fn binget(mut self, index: u8) -> Self {
        self.0.push(b'h');
        self.0.push(index);
        self
    }

    fn append(mut self) -> Self {
        self.0.push(b'a');
        self
    }

    fn appends(mut self) -> Self {
        self.0.push(b'e');
        self
    }

    fn setitem(mut self) -> Self {
        self.0.push(b's');
        self
    }

    fn tuple1(mut self) -> Self {
        self.0.push(0x85);
        self
    }

    fn tuple2(mut self) -> Self {
        self.0.push(0x86);
        self
    }

    fn global(mut self, module: &str, name: &str) -> Self {
        self.0.push(b'c');
        self.0.extend_from_slice(module.as_bytes());
        self.0.push(b'\n');
        self.0.extend_from_slice(name.as_bytes());
        self.0.push(b'\n');
        self
    }

    fn newobj(mut self) -> Self {
        self.0.push(0x81);
        self
    }

    fn newobj_ex(mut self) -> Self {
        self.0.push(0x92);
        self
    }

    fn build(mut self) -> Self {
        self.0.push(b'b');
        self
    }

    fn frame(mut self, len: i64) -> Self {
        self.0.push(0x95);
        self.0.extend_from_slice(&len.to_le_bytes());
        self
    }

    fn stop(mut self) -> Vec<u8> {
        self.0.push(b'.');
        self.0
    }

    fn raw(mut self, bytes: &[u8]) -> Self {
        self.0.extend_from_slice(bytes);
        self
    }
}

// -- §8.3 concrete scenarios ------------------------------------------------

#[test]
fn scenario_single_int() {
    let bytes = [0x80, 0x02, b'K', 42, b'.'];
    let result = unpickle(&bytes).unwrap();
    assert_eq!(result, vec![Value::Int32(42)]);
}

#[test]
fn scenario_tuple_of_three() {
    let bytes = [0x80, 0x02, b'K', 1, b'K', 2, b'K', 3, 0x87, b'.'];
    let result = unpickle(&bytes).unwrap();
    match &result[..] {
        [Value::Tuple(items)] => {
            assert_eq!(
                items.inner().as_slice(),
                &[Value::Int32(1), Value::Int32(2), Value::Int32(3)]
            );
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn scenario_mark_aggregate() {
    let bytes = Builder::new()
        .proto(2)
        .empty_list()
        .binput(0)
        .mark()
        .binint1(10)
        .binint1(20)
        .appends()
        .stop();
    let result = unpickle(&bytes).unwrap();
    match &result[..] {
        [Value::List(list)] => {
            assert_eq!(list.inner().as_slice(), &[Value::Int32(10), Value::Int32(20)]);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn scenario_memo_reuse_aliases_same_value() {
    let bytes = [
        0x80, 0x02, b'U', 5, b'h', b'e', b'l', b'l', b'o', b'q', 0, b'h', 0, 0x86, b'.',
    ];
    let result = unpickle(&bytes).unwrap();
    match &result[..] {
        [Value::Tuple(items)] => {
            let inner = items.inner();
            match (&inner[0], &inner[1]) {
                (Value::Text(a), Value::Text(b)) => {
                    assert_eq!(a.inner().as_str(), "hello");
                    assert!(
                        pickle_core::SharedFrozen::ptr_eq(a, b),
                        "both tuple slots must alias the same memoized value"
                    );
                }
                other => panic!("unexpected tuple contents {other:?}"),
            }
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn scenario_framed_payload_is_equivalent_to_unframed() {
    let inner_ops =
        Builder::new().empty_list().mark().binint1(10).binint1(20).appends().stop();
    // Strip the trailing STOP so we can frame the body, then append our own.
    let mut body = inner_ops;
    body.pop();

    let framed = Builder::new().proto(4).frame(body.len() as i64).raw(&body).stop();
    let unframed = Builder::new().proto(4).raw(&body).stop();

    assert_eq!(unpickle(&framed).unwrap(), unpickle(&unframed).unwrap());
}

#[test]
fn short_binbytes_pushes_raw_bytes_regardless_of_encoding() {
    let bytes = Builder::new().proto(2).short_binbytes(&[1, 2, 3]).stop();
    match &unpickle(&bytes).unwrap()[..] {
        [Value::Bytes(b)] => assert_eq!(b.to_vec(), vec![1, 2, 3]),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn tuple1_wraps_single_value() {
    let bytes = Builder::new().proto(2).binint1(9).tuple1().stop();
    match &unpickle(&bytes).unwrap()[..] {
        [Value::Tuple(items)] => assert_eq!(items.inner().as_slice(), &[Value::Int32(9)]),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn scenario_unsupported_reduce() {
    let bytes = [0x80, 0x02, b'R', b'.'];
    match err_code(&bytes) {
        ErrorCode::UnsupportedOpcode(name) => assert_eq!(name, "REDUCE"),
        other => panic!("expected UnsupportedOpcode(REDUCE), got {other:?}"),
    }
}

#[test]
fn scenario_other_unsupported_opcodes() {
    for (byte, name) in [(b'P', "PERSID"), (b'Q', "BINPERSID"), (0x82, "EXT1"), (0x83, "EXT2"), (0x84, "EXT4")]
    {
        let bytes = [0x80, 0x02, byte, b'.'];
        match err_code(&bytes) {
            ErrorCode::UnsupportedOpcode(n) => assert_eq!(n, name),
            other => panic!("expected UnsupportedOpcode({name}), got {other:?}"),
        }
    }
}

// -- §8.2 boundary behaviors -------------------------------------------------

#[test]
fn empty_input_fails_truncated() {
    assert_eq!(err_code(&[]), ErrorCode::TruncatedInput);
}

#[test]
fn proto_only_pickle_returns_empty() {
    let result = unpickle(&[0x80, 0x02, b'.']).unwrap();
    assert!(result.is_empty());
}

#[test]
fn long1_zero_length_pushes_zero() {
    let bytes = [0x80, 0x02, 0x8a, 0, b'.'];
    assert_eq!(unpickle(&bytes).unwrap(), vec![Value::Int64(0)]);
}

#[test]
fn long1_sign_extends_negative_value() {
    // LONG1, n=1, byte 0xff -> -1.
    let bytes = [0x80, 0x02, 0x8a, 1, 0xff, b'.'];
    assert_eq!(unpickle(&bytes).unwrap(), vec![Value::Int64(-1)]);
}

#[test]
fn binunicode_zero_length_pushes_empty_text() {
    let bytes = [0x80, 0x02, b'X', 0, 0, 0, 0, b'.'];
    match &unpickle(&bytes).unwrap()[..] {
        [Value::Text(s)] => assert_eq!(s.inner().as_str(), ""),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn zero_length_frame_is_a_noop() {
    let bytes = Builder::new().proto(4).frame(0).binint1(7).stop();
    assert_eq!(unpickle(&bytes).unwrap(), vec![Value::Int32(7)]);
}

#[test]
fn negative_length_binstring_fails_malformed() {
    let bytes = [0x80, 0x02, b'T', 0xff, 0xff, 0xff, 0xff, b'.'];
    match err_code(&bytes) {
        ErrorCode::MalformedOperand(_) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

#[test]
fn negative_length_long4_fails_malformed() {
    let bytes = [0x80, 0x02, 0x8b, 0xff, 0xff, 0xff, 0xff, b'.'];
    match err_code(&bytes) {
        ErrorCode::MalformedOperand(_) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

#[test]
fn oversized_binbytes8_length_is_rejected_before_allocating() {
    // BINBYTES8 with a length one past 2^31-1: must fail fast rather than
    // attempt a multi-gigabyte allocation.
    let len = (i32::MAX as i64) + 1;
    let bytes = Builder::new().proto(4).raw(&[0x8e]).raw(&len.to_le_bytes()).stop();
    match err_code(&bytes) {
        ErrorCode::MalformedOperand(_) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

#[test]
fn oversized_bytearray8_length_is_rejected_before_allocating() {
    let len = (i32::MAX as i64) + 1;
    let bytes = Builder::new().proto(5).raw(&[0x96]).raw(&len.to_le_bytes()).stop();
    match err_code(&bytes) {
        ErrorCode::MalformedOperand(_) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

#[test]
fn oversized_binunicode_length_is_rejected_before_allocating() {
    // BINUNICODE's length is a full u32; a value above i32::MAX must be
    // rejected rather than handed to an allocation.
    let len: u32 = i32::MAX as u32 + 1;
    let bytes = Builder::new().proto(2).raw(&[b'X']).raw(&len.to_le_bytes()).stop();
    match err_code(&bytes) {
        ErrorCode::MalformedOperand(_) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

#[test]
fn dict_with_odd_mark_slice_is_malformed() {
    let bytes = Builder::new().proto(2).mark().binint1(1).raw(b"d").stop();
    match err_code(&bytes) {
        ErrorCode::MalformedOperand(_) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

#[test]
fn setitems_with_odd_mark_slice_is_malformed() {
    let bytes = Builder::new()
        .proto(2)
        .empty_dict()
        .mark()
        .binint1(1)
        .raw(b"u") // SETITEMS
        .stop();
    match err_code(&bytes) {
        ErrorCode::MalformedOperand(_) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

// -- stack, memo, and dispatch invariants -----------------------------------

#[test]
fn pop_on_empty_stack_is_stack_underflow() {
    let bytes = [0x80, 0x02, b'0', b'.'];
    assert_eq!(err_code(&bytes), ErrorCode::StackUnderflow);
}

#[test]
fn unknown_opcode_byte_fails() {
    // 0xff is not allocated to any opcode.
    let bytes = [0x80, 0x02, 0xff];
    assert_eq!(err_code(&bytes), ErrorCode::UnknownOpcode(0xff));
}

#[test]
fn eof_without_stop_is_truncated() {
    let bytes = [0x80, 0x02, b'K', 1];
    assert_eq!(err_code(&bytes), ErrorCode::TruncatedInput);
}

#[test]
fn get_of_missing_memo_index_fails() {
    let bytes = [0x80, 0x02, b'h', 0, b'.'];
    match err_code(&bytes) {
        ErrorCode::MemoError(_) => {}
        other => panic!("expected MemoError, got {other:?}"),
    }
}

#[test]
fn append_onto_non_list_is_type_mismatch() {
    let bytes = Builder::new().proto(2).binint1(1).binint1(2).append().stop();
    match err_code(&bytes) {
        ErrorCode::TypeMismatch("list", _) => {}
        other => panic!("expected TypeMismatch(list, _), got {other:?}"),
    }
}

#[test]
fn list_as_dict_key_is_not_hashable() {
    // The key (an empty list) is checked for hashability before the
    // underlying container is even inspected, so a dict need not be on
    // the stack for this to fail.
    let bytes = Builder::new().proto(2).empty_list().binint1(1).setitem().stop();
    assert_eq!(err_code(&bytes), ErrorCode::ValueNotHashable);
}

#[test]
fn none_as_dict_key_is_rejected() {
    // spec §4.3: SETITEM/SETITEMS/DICT reject a null key even though
    // `None` is otherwise a perfectly ordinary, hashable value.
    let bytes =
        Builder::new().proto(2).empty_dict().raw(b"N").binint1(1).setitem().stop();
    match err_code(&bytes) {
        ErrorCode::TypeMismatch("non-null key", "None") => {}
        other => panic!("expected TypeMismatch(non-null key, None), got {other:?}"),
    }
}

#[test]
fn protocol_version_above_five_is_unsupported() {
    let bytes = [0x80, 6, b'.'];
    assert_eq!(err_code(&bytes), ErrorCode::ProtocolUnsupported(6));
}

#[test]
fn frame_violation_on_reentry() {
    // FRAME issued while already inside an active frame.
    let bytes = Builder::new().proto(4).frame(10).frame(1).binint1(1).stop();
    match err_code(&bytes) {
        ErrorCode::FrameViolation(_) => {}
        other => panic!("expected FrameViolation, got {other:?}"),
    }
}

#[test]
fn oversized_frame_length_is_rejected_before_allocating() {
    let bytes = Builder::new().proto(4).frame(i32::MAX as i64 + 1).stop();
    match err_code(&bytes) {
        ErrorCode::FrameViolation(_) => {}
        other => panic!("expected FrameViolation, got {other:?}"),
    }
}

#[test]
fn frame_read_beyond_boundary_fails() {
    // FRAME declares 3 bytes (BININT's opcode plus 2 of its 4 operand
    // bytes); the still-active frame must reject the read that would
    // spill past its boundary rather than falling through to the
    // unframed stream.
    let bytes = Builder::new().proto(4).frame(3).raw(&[b'J', 0, 0]).stop();
    assert!(matches!(err_code(&bytes), ErrorCode::FrameViolation(_)));
}

// -- string encoding ----------------------------------------------------------

#[test]
fn legacy_string_default_encoding_is_latin1() {
    // SHORT_BINSTRING, length 1, byte 0xe9 -> Latin-1 maps directly to U+00E9.
    let bytes = Builder::new().proto(2).raw(&[b'U', 1, 0xe9]).stop();
    match &unpickle(&bytes).unwrap()[..] {
        [Value::Text(s)] => assert_eq!(s.inner().chars().next().unwrap() as u32, 0xe9),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn legacy_string_none_encoding_pushes_raw_bytes() {
    let bytes = Builder::new().proto(2).raw(&[b'U', 2, 0xe9, 0x00]).stop();
    let mut unpickler = Unpickler::from_bytes(bytes);
    unpickler.set_encoding(None);
    match &unpickler.deserialize().unwrap()[..] {
        [Value::Bytes(b)] => assert_eq!(b.to_vec(), vec![0xe9, 0x00]),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn legacy_string_ascii_encoding_rejects_high_bytes() {
    let bytes = Builder::new().proto(2).raw(&[b'U', 1, 0xe9]).stop();
    let mut unpickler = Unpickler::from_bytes(bytes);
    unpickler.set_encoding(Some(StringEncoding::Ascii));
    match unpickler.deserialize() {
        Err(Error::Eval(ErrorCode::MalformedOperand(_))) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

// -- out-of-band buffers (protocol 5) ----------------------------------------

#[test]
fn next_buffer_consumes_supplied_buffers_in_order() {
    let bytes = Builder::new().proto(5).raw(&[0x97]).stop();
    let mut unpickler = Unpickler::from_bytes(bytes);
    unpickler.set_buffers(vec![vec![1, 2, 3]].into_iter());
    match &unpickler.deserialize().unwrap()[..] {
        [Value::Bytes(ByteBuf::Mutable(b))] => assert_eq!(b.inner().as_slice(), &[1, 2, 3]),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn next_buffer_without_supplied_buffers_fails() {
    let bytes = Builder::new().proto(5).raw(&[0x97]).stop();
    match unpickle(&bytes) {
        Err(Error::Eval(ErrorCode::MalformedOperand(_))) => {}
        other => panic!("expected MalformedOperand, got {other:?}"),
    }
}

#[test]
fn readonly_buffer_converts_mutable_bytes_to_frozen() {
    let bytes = Builder::new().proto(5).raw(&[0x97, 0x98]).stop();
    let mut unpickler = Unpickler::from_bytes(bytes);
    unpickler.set_buffers(vec![vec![9, 9]].into_iter());
    match &unpickler.deserialize().unwrap()[..] {
        [Value::Bytes(ByteBuf::Frozen(b))] => assert_eq!(b.inner().as_slice(), &[9, 9]),
        other => panic!("unexpected result {other:?}"),
    }
}

// -- proxy registry / object construction ------------------------------------

#[derive(Debug, Default)]
struct SimpleProxy;

impl Proxy for SimpleProxy {
    fn set_state(&mut self, _state: Value) -> Result<()> {
        Ok(())
    }
}

fn simple_factory(_args: &[Value]) -> Result<Rc<RefCell<dyn Proxy>>> {
    Ok(Rc::new(RefCell::new(SimpleProxy)))
}

#[derive(Debug)]
struct RecordingProxy {
    state_sink: Rc<RefCell<Option<Value>>>,
}

impl Proxy for RecordingProxy {
    fn set_state(&mut self, state: Value) -> Result<()> {
        *self.state_sink.borrow_mut() = Some(state);
        Ok(())
    }
}

fn recording_factory(
    args_log: Rc<RefCell<Vec<Vec<Value>>>>,
    state_sink: Rc<RefCell<Option<Value>>>,
) -> impl Fn(&[Value]) -> Result<Rc<RefCell<dyn Proxy>>> {
    move |args: &[Value]| {
        args_log.borrow_mut().push(args.to_vec());
        Ok(Rc::new(RefCell::new(RecordingProxy { state_sink: state_sink.clone() })))
    }
}

#[test]
fn global_then_newobj_then_build_constructs_and_updates_object() {
    let bytes = Builder::new()
        .proto(2)
        .global("mymodule", "Point")
        .binint1(3)
        .binint1(4)
        .tuple2()
        .newobj()
        .short_binunicode("ready")
        .build()
        .stop();

    let args_log = Rc::new(RefCell::new(Vec::new()));
    let state_sink = Rc::new(RefCell::new(None));
    let mut unpickler = Unpickler::from_bytes(bytes);
    unpickler
        .register_proxy("mymodule", "Point", recording_factory(args_log.clone(), state_sink.clone()))
        .unwrap();
    let result = unpickler.deserialize().unwrap();

    assert!(matches!(result[..], [Value::Object(_)]));
    match &args_log.borrow()[..] {
        [args] => assert_eq!(args, &[Value::Int32(3), Value::Int32(4)]),
        other => panic!("expected one construction call, got {other:?}"),
    }
    match state_sink.borrow().as_ref() {
        Some(Value::Text(s)) => assert_eq!(s.inner().as_str(), "ready"),
        other => panic!("unexpected state {other:?}"),
    }
}

#[test]
fn unregistered_proxy_lookup_fails() {
    let bytes = Builder::new().proto(2).global("nope", "Nothing").stop();
    let unpickler_err = Unpickler::from_bytes(bytes).deserialize();
    match unpickler_err {
        Err(Error::Eval(ErrorCode::UnregisteredProxy(module, name))) => {
            assert_eq!(module, "nope");
            assert_eq!(name, "Nothing");
        }
        other => panic!("expected UnregisteredProxy, got {other:?}"),
    }
}

#[test]
fn duplicate_proxy_registration_fails() {
    let mut unpickler = Unpickler::from_bytes(vec![0x80, 2, b'.']);
    unpickler.register_proxy("m", "T", simple_factory).unwrap();
    match unpickler.register_proxy("m", "T", simple_factory) {
        Err(Error::Eval(ErrorCode::ProxyAlreadyRegistered(_, _))) => {}
        other => panic!("expected ProxyAlreadyRegistered, got {other:?}"),
    }
}

#[test]
fn newobj_ex_discards_kwargs_dict() {
    let bytes = Builder::new()
        .proto(4)
        .global("mymodule", "Point")
        .empty_tuple()
        .empty_dict()
        .newobj_ex()
        .stop();
    let mut unpickler = Unpickler::from_bytes(bytes);
    unpickler.register_proxy("mymodule", "Point", simple_factory).unwrap();
    assert!(unpickler.deserialize().is_ok());
}

// -- property tests -----------------------------------------------------------

#[test]
fn prop_binint_round_trips() {
    fn prop(v: i32) -> bool {
        let mut bytes = vec![0x80, 2, b'J'];
        bytes.extend_from_slice(&v.to_le_bytes());
        bytes.push(b'.');
        unpickle(&bytes).unwrap() == vec![Value::Int32(v)]
    }
    QuickCheck::new().tests(200).quickcheck(prop as fn(i32) -> bool);
}

#[test]
fn prop_terminator_purity_never_leaks_mark() {
    // Any well-formed MARK/APPENDS sequence must never surface `Mark` in
    // the returned stack (spec §8.1 terminator purity).
    fn prop(values: Vec<i32>) -> bool {
        let mut b = Builder::new().proto(2).empty_list().mark();
        for v in &values {
            b.0.push(b'J');
            b.0.extend_from_slice(&v.to_le_bytes());
        }
        let bytes = b.appends().stop();
        match unpickle(&bytes) {
            Ok(result) => !result.iter().any(contains_mark),
            Err(_) => true,
        }
    }

    fn contains_mark(v: &Value) -> bool {
        match v {
            Value::Mark => true,
            Value::List(l) => l.inner().iter().any(contains_mark),
            Value::Tuple(t) => t.inner().iter().any(contains_mark),
            _ => false,
        }
    }

    QuickCheck::new().tests(100).quickcheck(prop as fn(Vec<i32>) -> bool);
}

#[test]
fn prop_memoize_equals_long_binput_at_current_len() {
    // MEMOIZE at index k is equivalent to LONG_BINPUT k where k = |memo|
    // before the op (spec §8.1 memoize equivalence): push v, memoize/put it
    // at index 0, pop the stack copy, then recover it with LONG_BINGET.
    fn prop(v: i32) -> bool {
        let memoized = {
            let mut b = Builder::new().proto(4);
            b.0.push(b'J');
            b.0.extend_from_slice(&v.to_le_bytes());
            b = b.memoize();
            b.0.push(b'0'); // POP
            b.0.push(b'j'); // LONG_BINGET
            b.0.extend_from_slice(&0u32.to_le_bytes());
            unpickle(&b.stop())
        };
        let long_binput = {
            let mut b = Builder::new().proto(4);
            b.0.push(b'J');
            b.0.extend_from_slice(&v.to_le_bytes());
            b.0.push(b'r'); // LONG_BINPUT
            b.0.extend_from_slice(&0u32.to_le_bytes());
            b.0.push(b'0'); // POP
            b.0.push(b'j'); // LONG_BINGET
            b.0.extend_from_slice(&0u32.to_le_bytes());
            unpickle(&b.stop())
        };
        memoized == long_binput
    }
    QuickCheck::new().tests(200).quickcheck(prop as fn(i32) -> bool);
}

// -- fuzz-lite robustness -----------------------------------------------------

#[test]
fn random_bytes_never_panic() {
    use rand::prelude::*;
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xC0FFEE);
    for _ in 0..500 {
        let len = rng.gen_range(0..64);
        let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        // Only the absence of a panic is asserted; Ok/Err are both fine.
        let _ = unpickle(&bytes);
    }
}
