//! Bounds-checked reader over a command buffer.
//!
//! Every read funnels through [`ByteCursor::take`], so a record can never be
//! parsed past the end of the slice it was handed.

use winnow::binary::{le_u16, le_u32, u8 as any_u8};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use crate::error::DecodeError;

/// Little-endian cursor over an untrusted byte slice.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    input: &'a [u8],
    total: usize,
}

impl<'a> ByteCursor<'a> {
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            total: input.len(),
        }
    }

    /// Bytes consumed so far.
    pub const fn offset(&self) -> usize {
        self.total - self.input.len()
    }

    pub const fn remaining(&self) -> usize {
        self.input.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Fails unless at least `needed` bytes remain.
    pub const fn require(&self, needed: usize) -> Result<(), DecodeError> {
        if self.input.len() < needed {
            Err(DecodeError::Truncated {
                offset: self.offset(),
                needed,
                remaining: self.input.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Fails unless `count` items of `item_len` bytes remain, guarding the multiply.
    pub fn require_items(&self, count: usize, item_len: usize) -> Result<usize, DecodeError> {
        let needed = count.checked_mul(item_len).ok_or(DecodeError::Truncated {
            offset: self.offset(),
            needed: usize::MAX,
            remaining: self.input.len(),
        })?;
        self.require(needed)?;
        Ok(needed)
    }

    /// Consumes exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.require(n)?;
        let truncated = self.truncated(n);
        let parsed: Result<&'a [u8], ContextError> = take(n).parse_next(&mut self.input);
        parsed.map_err(|_| truncated)
    }

    /// Consumes a fixed-size array, e.g. a NUL-padded name.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        self.require(1)?;
        let truncated = self.truncated(1);
        any_u8::<_, ContextError>(&mut self.input).map_err(|_| truncated)
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        self.require(2)?;
        let truncated = self.truncated(2);
        le_u16::<_, ContextError>(&mut self.input).map_err(|_| truncated)
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        self.require(4)?;
        let truncated = self.truncated(4);
        le_u32::<_, ContextError>(&mut self.input).map_err(|_| truncated)
    }

    /// Skips reserved padding.
    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    const fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::Truncated {
            offset: self.offset(),
            needed,
            remaining: self.input.len(),
        }
    }
}
