// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! ABI-introspection surface for `chain_script`.
//!
//! The planner only needs a thin slice of the contract ABI world: a 4-byte
//! function selector, a 20-byte target address, and ordered type-descriptor
//! strings with their dynamic/static classification. Value encoding stays with
//! the embedder; literals enter the planner already encoded.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A 4-byte function selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Selector(pub [u8; 4]);

/// A 20-byte contract address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

/// An ABI type descriptor, e.g. `uint256`, `bytes`, `(uint256,address)[2]`.
///
/// Descriptors are compared verbatim; the only interpretation the planner
/// performs is [`ParamType::is_dynamic`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamType(Box<str>);

impl ParamType {
    /// Wraps a descriptor string.
    #[must_use]
    pub fn new(descriptor: impl Into<Box<str>>) -> Self {
        Self(descriptor.into())
    }

    /// Returns the descriptor string.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if values of this type have a dynamically-sized
    /// encoding.
    ///
    /// This implements the ABI grammar's classification: `bytes`, `string`,
    /// and `T[]` are dynamic; `T[k]` and tuples are dynamic iff a component
    /// is.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        descriptor_is_dynamic(&self.0)
    }
}

impl From<&str> for ParamType {
    fn from(descriptor: &str) -> Self {
        Self::new(descriptor)
    }
}

impl From<String> for ParamType {
    fn from(descriptor: String) -> Self {
        Self::new(descriptor)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn descriptor_is_dynamic(descriptor: &str) -> bool {
    if descriptor == "bytes" || descriptor == "string" {
        return true;
    }
    if descriptor.ends_with("[]") {
        return true;
    }
    if descriptor.ends_with(']')
        && let Some(open) = descriptor.rfind('[')
    {
        return descriptor_is_dynamic(&descriptor[..open]);
    }
    if let Some(inner) = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return any_component_dynamic(inner);
    }
    false
}

/// Splits `inner` at top-level commas and classifies each component.
fn any_component_dynamic(inner: &str) -> bool {
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                if descriptor_is_dynamic(&inner[start..i]) {
                    return true;
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    !inner.is_empty() && descriptor_is_dynamic(&inner[start..])
}

/// A callable resolved from a contract description.
///
/// This is the full input the planner needs per callable: a display name for
/// diagnostics, the unique selector, and the ordered input/output type
/// descriptors. How these are obtained (ABI JSON, signature hashing, code
/// generation) is the embedder's concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callable {
    name: Box<str>,
    selector: Selector,
    inputs: Vec<ParamType>,
    outputs: Vec<ParamType>,
}

impl Callable {
    /// Creates a callable from its resolved parts.
    #[must_use]
    pub fn new(
        name: impl Into<Box<str>>,
        selector: Selector,
        inputs: impl IntoIterator<Item = impl Into<ParamType>>,
        outputs: impl IntoIterator<Item = impl Into<ParamType>>,
    ) -> Self {
        Self {
            name: name.into(),
            selector,
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the callable's display name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the 4-byte selector.
    #[must_use]
    #[inline]
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// Returns the ordered input type descriptors.
    #[must_use]
    #[inline]
    pub fn inputs(&self) -> &[ParamType] {
        &self.inputs
    }

    /// Returns the ordered output type descriptors.
    #[must_use]
    #[inline]
    pub fn outputs(&self) -> &[ParamType] {
        &self.outputs
    }
}
