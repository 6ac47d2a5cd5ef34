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

//! The frame stream (spec §4.1): wraps a seekable byte source with an
//! optional single-level bounded "active frame", introduced by protocol 4's
//! FRAME opcode for I/O batching. Opcode handlers call the same primitive
//! readers whether or not a frame is active.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, ErrorCode, Result};

/// The maximum length accepted by `enter_frame`, per spec §6.3.
const MAX_FRAME_LEN: u64 = i32::MAX as u64;

struct ActiveFrame {
    start: u64,
    buf: Vec<u8>,
    cursor: usize,
}

pub struct FrameReader<R> {
    source: R,
    frame: Option<ActiveFrame>,
}

impl<R: Read + Seek> FrameReader<R> {
    pub fn new(source: R) -> Self {
        Self { source, frame: None }
    }

    /// Reclaims the underlying byte source, discarding any active frame
    /// buffer.
    pub fn into_inner(self) -> R {
        self.source
    }

    pub fn position(&mut self) -> Result<u64> {
        if let Some(frame) = &self.frame {
            Ok(frame.start + frame.cursor as u64)
        } else {
            Ok(self.source.stream_position()?)
        }
    }

    pub fn length(&mut self) -> Result<u64> {
        let cur = self.source.stream_position()?;
        let end = self.source.seek(SeekFrom::End(0))?;
        self.source.seek(SeekFrom::Start(cur))?;
        Ok(end)
    }

    /// Records the current position as `frame_start`, reads exactly `len`
    /// bytes into an owned buffer, and redirects reads to it until
    /// exhausted.
    pub fn enter_frame(&mut self, len: u64) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::Eval(ErrorCode::FrameViolation(
                "FRAME issued while a frame is already active".into(),
            )));
        }
        if len > MAX_FRAME_LEN {
            return Err(Error::Eval(ErrorCode::FrameViolation(format!(
                "frame length {len} exceeds 2^31-1"
            ))));
        }
        let start = self.source.stream_position()?;
        let mut buf = vec![0u8; len as usize];
        self.source
            .read_exact(&mut buf)
            .map_err(|_| Error::Eval(ErrorCode::TruncatedInput))?;
        self.frame = Some(ActiveFrame { start, buf, cursor: 0 });
        // A zero-length frame is immediately exhausted: treat it as a
        // no-op rather than leaving a live frame that rejects every read.
        self.clear_if_exhausted();
        Ok(())
    }

    fn clear_if_exhausted(&mut self) {
        if matches!(&self.frame, Some(frame) if frame.cursor >= frame.buf.len()) {
            self.frame = None;
        }
    }

    /// A soft, single-byte read used by `read_line`: falls through to the
    /// underlying source once the frame buffer is exhausted, matching
    /// CPython's `_Unframer`. Returns `Ok(None)` on true stream EOF.
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(frame) = &mut self.frame {
            if frame.cursor < frame.buf.len() {
                let b = frame.buf[frame.cursor];
                frame.cursor += 1;
                self.clear_if_exhausted();
                return Ok(Some(b));
            }
            self.frame = None;
        }
        let mut buf = [0u8; 1];
        match self.source.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// A hard, boundary-checked read: fails rather than spilling past an
    /// active frame.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if let Some(frame) = &mut self.frame {
            let remaining = frame.buf.len() - frame.cursor;
            if buf.len() > remaining {
                return Err(Error::Eval(ErrorCode::FrameViolation(
                    "read extends beyond the active frame".into(),
                )));
            }
            buf.copy_from_slice(&frame.buf[frame.cursor..frame.cursor + buf.len()]);
            frame.cursor += buf.len();
            self.clear_if_exhausted();
            return Ok(());
        }
        self.source.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Eval(ErrorCode::TruncatedInput),
            _ => Error::Io(e),
        })
    }

    pub fn read_buf(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads until LF (exclusive); EOF before LF yields whatever was read.
    pub fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.next_byte()? {
                None => break,
                Some(b'\n') => break,
                Some(b) => out.push(b),
            }
        }
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_byte()
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let buf = self.read_buf(2)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        let buf = self.read_buf(4)?;
        Ok(LittleEndian::read_i32(&buf))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let buf = self.read_buf(4)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        let buf = self.read_buf(8)?;
        Ok(LittleEndian::read_i64(&buf))
    }

    pub fn read_f64_be(&mut self) -> Result<f64> {
        let buf = self.read_buf(8)?;
        Ok(BigEndian::read_f64(&buf))
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if let Some(frame) = &mut self.frame {
            let frame_len = frame.buf.len() as i64;
            let target = match pos {
                SeekFrom::Start(off) => off as i64,
                SeekFrom::Current(off) => frame.cursor as i64 + off,
                SeekFrom::End(off) => frame_len + off,
            };
            if target < 0 || target > frame_len {
                return Err(Error::Eval(ErrorCode::FrameViolation(
                    "seek outside the active frame".into(),
                )));
            }
            frame.cursor = target as usize;
            let new_pos = frame.start + frame.cursor as u64;
            self.clear_if_exhausted();
            return Ok(new_pos);
        }
        Ok(self.source.seek(pos)?)
    }
}
