// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Argument values for planned calls.
//!
//! Every call argument is one of a closed set of variants: an encoded
//! [`Literal`], a [`ReturnValue`] produced by an earlier command, the
//! current-state placeholder, or a nested planner. Consumption sites match
//! exhaustively so a new variant cannot be silently ignored.

use alloc::vec::Vec;

use crate::abi::ParamType;
use crate::call::Command;
use crate::planner::Planner;

/// A compile-time-known argument value, already encoded for its type.
///
/// Literals are deduplicated by their encoded bytes: two literals with the
/// same bytes share one state slot regardless of their declared types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Literal {
    ty: ParamType,
    bytes: Vec<u8>,
}

impl Literal {
    /// Creates a literal from a declared type and its encoded bytes.
    #[must_use]
    pub fn new(ty: impl Into<ParamType>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            ty: ty.into(),
            bytes: bytes.into(),
        }
    }

    /// Returns the declared type descriptor.
    #[must_use]
    #[inline]
    pub fn ty(&self) -> &ParamType {
        &self.ty
    }

    /// Returns the encoded bytes.
    #[must_use]
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A placeholder for the output of an earlier command.
///
/// Handed out by [`Planner::add`]; usable as an argument to later calls while
/// the producing command is in scope.
#[derive(Clone, Debug)]
pub struct ReturnValue {
    ty: ParamType,
    command: Command,
}

impl ReturnValue {
    pub(crate) fn new(ty: ParamType, command: Command) -> Self {
        Self { ty, command }
    }

    /// Returns the declared type descriptor of the produced value.
    #[must_use]
    #[inline]
    pub fn ty(&self) -> &ParamType {
        &self.ty
    }

    #[inline]
    pub(crate) fn command(&self) -> &Command {
        &self.command
    }
}

/// One argument of a planned call.
#[derive(Clone, Debug)]
pub enum Arg {
    /// An encoded literal value.
    Literal(Literal),
    /// The return value of an earlier command.
    Return(ReturnValue),
    /// The planner's entire state array, substituted at runtime.
    State,
    /// A nested planner, serialized as a sub-program. Only valid on subplan
    /// commands.
    Subplan(Planner),
}

impl Arg {
    /// The declared type this argument claims, used for parameter checking.
    ///
    /// Subplan arguments have no declared type here; their shape is validated
    /// by [`Planner::add_subplan`].
    pub(crate) fn declared_type(&self) -> Option<&str> {
        match self {
            Self::Literal(literal) => Some(literal.ty().as_str()),
            Self::Return(ret) => Some(ret.ty().as_str()),
            Self::State => Some("bytes[]"),
            Self::Subplan(_) => None,
        }
    }
}

impl From<Literal> for Arg {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<ReturnValue> for Arg {
    fn from(ret: ReturnValue) -> Self {
        Self::Return(ret)
    }
}

impl From<Planner> for Arg {
    fn from(planner: Planner) -> Self {
        Self::Subplan(planner)
    }
}
