// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Calls, call flags, and planned commands.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::abi::{Address, Callable, ParamType};
use crate::value::{Arg, Literal};

/// Flag bits carried in byte 4 of an encoded command word.
///
/// The low two bits select the call type; the high bits are independent
/// modifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallFlags(u8);

impl core::ops::BitOr for CallFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for CallFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl CallFlags {
    /// Execute with the DELEGATECALL opcode.
    pub const DELEGATECALL: Self = Self(0x00);
    /// Execute with the CALL opcode.
    pub const CALL: Self = Self(0x01);
    /// Execute with the STATICCALL opcode.
    pub const STATICCALL: Self = Self(0x02);
    /// Execute with the CALL opcode, sending the attached value; the value
    /// occupies the first argument slot.
    pub const CALL_WITH_VALUE: Self = Self(0x03);
    /// Mask selecting the call-type bits.
    pub const CALLTYPE_MASK: Self = Self(0x03);
    /// The instruction continues in a second word of argument slots.
    pub const EXTENDED_COMMAND: Self = Self(0x40);
    /// Wrap the raw return data in a `bytes`.
    pub const TUPLE_RETURN: Self = Self(0x80);

    /// Returns the flag byte as encoded in a command word.
    #[must_use]
    #[inline]
    pub const fn byte(self) -> u8 {
        self.0
    }

    /// Reconstructs flags from an encoded command word byte.
    #[must_use]
    #[inline]
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Returns only the call-type bits.
    #[must_use]
    #[inline]
    pub const fn call_type(self) -> Self {
        Self(self.0 & Self::CALLTYPE_MASK.0)
    }

    /// Replaces the call-type bits, keeping the modifiers.
    #[must_use]
    #[inline]
    pub const fn with_call_type(self, call_type: Self) -> Self {
        Self((self.0 & !Self::CALLTYPE_MASK.0) | call_type.call_type().0)
    }

    /// Returns `true` if this set includes all bits in `other`.
    #[must_use]
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// A [`Call`] construction or modifier error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallError {
    /// The callable was invoked with the wrong number of arguments.
    Arity {
        /// Callable name.
        name: Box<str>,
        /// Declared input count.
        expected: usize,
        /// Supplied argument count.
        provided: usize,
    },
    /// An argument's declared type does not match the parameter it is
    /// supplied for.
    TypeMismatch {
        /// Callable name.
        name: Box<str>,
        /// Zero-based argument position.
        index: usize,
        /// The parameter's declared type.
        expected: ParamType,
        /// The argument's declared type.
        provided: ParamType,
    },
    /// Mutually exclusive call modifiers were combined.
    IncompatibleFlags {
        /// Callable name.
        name: Box<str>,
        /// What was rejected.
        detail: &'static str,
    },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arity {
                name,
                expected,
                provided,
            } => write!(
                f,
                "callable '{name}' takes {expected} arguments but {provided} were provided"
            ),
            Self::TypeMismatch {
                name,
                index,
                expected,
                provided,
            } => write!(
                f,
                "argument {index} of '{name}' expects {expected} but was given {provided}"
            ),
            Self::IncompatibleFlags { name, detail } => {
                write!(f, "incompatible call flags for '{name}': {detail}")
            }
        }
    }
}

impl core::error::Error for CallError {}

/// A declared call to an external contract.
///
/// Construction validates arity and declared argument types against the
/// callable; the value-transfer and static modifiers are applied through the
/// consuming builders.
#[derive(Clone, Debug)]
pub struct Call {
    target: Address,
    flags: CallFlags,
    callable: Callable,
    args: Vec<Arg>,
    value: Option<Literal>,
}

impl Call {
    /// Declares a DELEGATECALL to a library designed to run in the VM's own
    /// context.
    pub fn library(
        target: Address,
        callable: Callable,
        args: impl IntoIterator<Item = impl Into<Arg>>,
    ) -> Result<Self, CallError> {
        Self::checked(target, CallFlags::DELEGATECALL, callable, args)
    }

    /// Declares a standard CALL to an external contract.
    pub fn contract(
        target: Address,
        callable: Callable,
        args: impl IntoIterator<Item = impl Into<Arg>>,
    ) -> Result<Self, CallError> {
        Self::checked(target, CallFlags::CALL, callable, args)
    }

    fn checked(
        target: Address,
        flags: CallFlags,
        callable: Callable,
        args: impl IntoIterator<Item = impl Into<Arg>>,
    ) -> Result<Self, CallError> {
        let args: Vec<Arg> = args.into_iter().map(Into::into).collect();
        if args.len() != callable.inputs().len() {
            return Err(CallError::Arity {
                name: callable.name().into(),
                expected: callable.inputs().len(),
                provided: args.len(),
            });
        }
        for (index, (arg, param)) in args.iter().zip(callable.inputs()).enumerate() {
            if let Some(declared) = arg.declared_type()
                && declared != param.as_str()
            {
                return Err(CallError::TypeMismatch {
                    name: callable.name().into(),
                    index,
                    expected: param.clone(),
                    provided: declared.into(),
                });
            }
        }
        Ok(Self {
            target,
            flags,
            callable,
            args,
            value: None,
        })
    }

    /// Returns a call that sends `amount` along with the invocation.
    ///
    /// Only CALL-type invocations can carry value.
    pub fn with_value(self, amount: Literal) -> Result<Self, CallError> {
        let call_type = self.flags.call_type();
        if call_type != CallFlags::CALL && call_type != CallFlags::CALL_WITH_VALUE {
            return Err(CallError::IncompatibleFlags {
                name: self.callable.name().into(),
                detail: "only CALL operations can send value",
            });
        }
        Ok(Self {
            flags: self.flags.with_call_type(CallFlags::CALL_WITH_VALUE),
            value: Some(amount),
            ..self
        })
    }

    /// Returns a call executed with STATICCALL instead of CALL.
    pub fn static_call(self) -> Result<Self, CallError> {
        if self.flags.call_type() != CallFlags::CALL {
            return Err(CallError::IncompatibleFlags {
                name: self.callable.name().into(),
                detail: "only CALL operations can be made static",
            });
        }
        Ok(Self {
            flags: self.flags.with_call_type(CallFlags::STATICCALL),
            ..self
        })
    }

    /// Returns a call whose raw return data is wrapped in a `bytes`.
    ///
    /// This permits capturing the output of callables with multiple return
    /// parameters, which slot-addressed state cannot otherwise represent.
    #[must_use]
    pub fn raw_return(mut self) -> Self {
        self.flags |= CallFlags::TUPLE_RETURN;
        self
    }

    /// Returns the target address.
    #[must_use]
    #[inline]
    pub fn target(&self) -> Address {
        self.target
    }

    /// Returns the call flags.
    #[must_use]
    #[inline]
    pub fn flags(&self) -> CallFlags {
        self.flags
    }

    /// Returns the callable.
    #[must_use]
    #[inline]
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// Returns the ordered arguments.
    #[must_use]
    #[inline]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Returns the attached value-transfer literal, if any.
    #[must_use]
    #[inline]
    pub fn value(&self) -> Option<&Literal> {
        self.value.as_ref()
    }
}

/// How a planned call is interpreted by the VM.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// A plain call; its single output (if consumed) lands in a state slot.
    Call,
    /// A call whose `bytes[]` output replaces the entire state.
    RawCall,
    /// A nested sub-program invocation.
    Subplan,
}

/// Stable command identity.
///
/// Two structurally identical calls added twice are distinct commands with
/// independent lifetimes, so every liveness and slot map keys on this id
/// rather than on command contents.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct CommandId(u64);

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(0);

impl CommandId {
    fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct CommandInner {
    id: CommandId,
    kind: CommandKind,
    call: Call,
}

/// One instruction-producing unit in a plan: a call plus its kind.
///
/// Commands are cheap handles compared by identity, handed out indirectly
/// through [`crate::value::ReturnValue`].
#[derive(Clone)]
pub struct Command {
    inner: Rc<CommandInner>,
}

impl Command {
    pub(crate) fn new(call: Call, kind: CommandKind) -> Self {
        Self {
            inner: Rc::new(CommandInner {
                id: CommandId::next(),
                kind,
                call,
            }),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> CommandId {
        self.inner.id
    }

    /// Returns how the VM interprets this command.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> CommandKind {
        self.inner.kind
    }

    /// Returns the underlying call.
    #[must_use]
    #[inline]
    pub fn call(&self) -> &Call {
        &self.inner.call
    }

    /// Returns the callable's display name, for diagnostics.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        self.inner.call.callable().name()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("name", &self.name())
            .finish()
    }
}
