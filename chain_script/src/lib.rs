// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `chain_script`: a planner/compiler for chained contract-call scripts.
//!
//! Callers declare a sequence of calls whose arguments reference literal
//! values, earlier return values, the current-state placeholder, or nested
//! sub-planners. [`planner::Planner::plan`] performs liveness analysis,
//! state-slot allocation with literal deduplication and slot reuse, and
//! binary encoding, producing the command words and initial state array
//! consumed by a stack-less chained-call VM.
//!
//! ABI concerns stay with the embedder: callables are described by a
//! selector plus type-descriptor strings ([`abi::Callable`]), and literal
//! arguments enter the planner already encoded.
//!
//! ## Example
//!
//! ```
//! extern crate alloc;
//!
//! use chain_script::abi::{Address, Callable, Selector};
//! use chain_script::call::Call;
//! use chain_script::planner::Planner;
//! use chain_script::value::{Arg, Literal};
//!
//! fn uint256(v: u64) -> Literal {
//!     let mut word = [0u8; 32];
//!     word[24..].copy_from_slice(&v.to_be_bytes());
//!     Literal::new("uint256", word.to_vec())
//! }
//!
//! let math = Address([0x11; 20]);
//! let add = Callable::new(
//!     "add",
//!     Selector([0x77, 0x16, 0x02, 0xf7]),
//!     ["uint256", "uint256"],
//!     ["uint256"],
//! );
//!
//! let planner = Planner::new();
//! let sum = planner
//!     .add(Call::library(math, add.clone(), [uint256(1), uint256(2)]).unwrap())
//!     .unwrap()
//!     .expect("add declares one output");
//! planner
//!     .add(Call::library(math, add, [Arg::from(sum), Arg::from(uint256(3))]).unwrap())
//!     .unwrap();
//!
//! let plan = planner.plan().unwrap();
//! assert_eq!(plan.commands.len(), 2);
//! assert_eq!(plan.state.len(), 3);
//! ```

#![no_std]

extern crate alloc;

pub mod abi;
pub mod call;
pub mod plan;
pub mod planner;
pub mod pretty;
pub mod value;
pub(crate) mod visibility;
