// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The call-graph builder and planning entry point.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Ref, RefCell};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::abi::ParamType;
use crate::call::{Call, CallFlags, Command, CommandKind};
use crate::plan::{self, Plan, PlanningCtx};
use crate::value::{Arg, ReturnValue};
use crate::visibility;

/// Stable planner identity, used by the cycle check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PlannerId(u64);

static NEXT_PLANNER_ID: AtomicU64 = AtomicU64::new(0);

impl PlannerId {
    fn next() -> Self {
        Self(NEXT_PLANNER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A shape violation detected while adding a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubplanError {
    /// A planner argument was supplied to a command that is not a subplan.
    UnexpectedPlanner {
        /// Callable name.
        name: Box<str>,
    },
    /// A subplan command without a planner argument.
    MissingPlanner {
        /// Callable name.
        name: Box<str>,
    },
    /// A subplan command without a state argument.
    MissingState {
        /// Callable name.
        name: Box<str>,
    },
    /// A subplan command with more than one planner argument.
    MultiplePlanners {
        /// Callable name.
        name: Box<str>,
    },
    /// A subplan command with more than one state argument.
    MultipleStates {
        /// Callable name.
        name: Box<str>,
    },
    /// A subplan command declaring outputs other than nothing or `bytes[]`.
    BadReturnShape {
        /// Callable name.
        name: Box<str>,
    },
    /// A state-replacing command declaring outputs other than `bytes[]`.
    BadStateReturn {
        /// Callable name.
        name: Box<str>,
    },
}

impl fmt::Display for SubplanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedPlanner { name } => {
                write!(f, "only subplan commands can take a planner argument: '{name}'")
            }
            Self::MissingPlanner { name } => {
                write!(f, "subplan command '{name}' must take a planner argument")
            }
            Self::MissingState { name } => {
                write!(f, "subplan command '{name}' must take a state argument")
            }
            Self::MultiplePlanners { name } => {
                write!(f, "subplan command '{name}' can only take one planner argument")
            }
            Self::MultipleStates { name } => {
                write!(f, "subplan command '{name}' can only take one state argument")
            }
            Self::BadReturnShape { name } => write!(
                f,
                "subplan command '{name}' must return a bytes[] replacement state or nothing"
            ),
            Self::BadStateReturn { name } => {
                write!(f, "state-replacing command '{name}' must return a bytes[]")
            }
        }
    }
}

impl core::error::Error for SubplanError {}

/// A failure of the planning pass itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanError {
    /// A return value was referenced outside the scope that produced it.
    UnboundReturn {
        /// Name of the producing callable.
        producer: Box<str>,
    },
    /// A planner transitively contains itself as a subplan.
    Cycle,
    /// A state-replacing command's return value is also referenced as a
    /// normal data dependency.
    AmbiguousConsumption {
        /// Callable name.
        name: Box<str>,
    },
    /// The state array outgrew the addressable slot range.
    SlotsExhausted,
    /// An extended command cannot address this many argument slots.
    TooManyArguments {
        /// Callable name.
        name: Box<str>,
        /// Resolved argument slot count.
        count: usize,
    },
    /// A command failed subplan shape re-validation during encoding.
    Subplan(SubplanError),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundReturn { producer } => {
                write!(f, "return value from '{producer}' is not visible here")
            }
            Self::Cycle => write!(f, "a planner cannot contain itself"),
            Self::AmbiguousConsumption { name } => write!(
                f,
                "return value of '{name}' cannot both replace state and feed another call"
            ),
            Self::SlotsExhausted => {
                write!(f, "state array exceeds the addressable slot range")
            }
            Self::TooManyArguments { name, count } => write!(
                f,
                "call to '{name}' resolves to {count} argument slots but an extended command holds at most 32"
            ),
            Self::Subplan(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Subplan(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SubplanError> for PlanError {
    fn from(e: SubplanError) -> Self {
        Self::Subplan(e)
    }
}

struct PlannerInner {
    id: PlannerId,
    commands: RefCell<Vec<Command>>,
}

/// Builds an ordered sequence of chained calls and compiles it into a
/// [`Plan`].
///
/// A `Planner` is a cheap handle: cloning shares the same underlying command
/// sequence, and a subplan argument holds such a handle. Planning never
/// mutates the command sequence, so an unmodified planner can be planned
/// repeatedly with identical results.
pub struct Planner {
    inner: Rc<PlannerInner>,
}

impl Clone for Planner {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deliberately shallow: a subplan argument may (invalidly) point back
        // at this planner, and Debug must not recurse through it.
        f.debug_struct("Planner")
            .field("id", &self.inner.id)
            .field("commands", &self.inner.commands.borrow().len())
            .finish()
    }
}

impl Planner {
    /// Creates an empty planner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(PlannerInner {
                id: PlannerId::next(),
                commands: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns the placeholder for this planner's state array, for use as a
    /// subplan-call argument.
    #[must_use]
    pub fn state(&self) -> Arg {
        Arg::State
    }

    /// Returns the number of commands added so far.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.inner.commands.borrow().len()
    }

    /// Returns `true` if no commands have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.command_count() == 0
    }

    #[inline]
    pub(crate) fn id(&self) -> PlannerId {
        self.inner.id
    }

    pub(crate) fn commands(&self) -> Ref<'_, Vec<Command>> {
        self.inner.commands.borrow()
    }

    /// Adds a call to the plan. Calls execute in the order they are added.
    ///
    /// Returns a [`ReturnValue`] usable as an argument to later calls when
    /// the callable declares exactly one output, or a `bytes` handle when the
    /// call wraps its raw return data; `None` otherwise.
    pub fn add(&self, call: Call) -> Result<Option<ReturnValue>, SubplanError> {
        if let Some(err) = reject_planner_args(&call) {
            return Err(err);
        }
        let command = Command::new(call, CommandKind::Call);
        self.inner.commands.borrow_mut().push(command.clone());

        let call = command.call();
        if call.flags().contains(CallFlags::TUPLE_RETURN) {
            let ret = ReturnValue::new(ParamType::from("bytes"), command.clone());
            return Ok(Some(ret));
        }
        match call.callable().outputs() {
            [only] => {
                let ret = ReturnValue::new(only.clone(), command.clone());
                Ok(Some(ret))
            }
            _ => Ok(None),
        }
    }

    /// Adds a call that runs a nested planner inside a callback.
    ///
    /// The call must take exactly one planner argument and exactly one state
    /// placeholder ([`Planner::state`]), and declare either no outputs or a
    /// single `bytes[]` replacement state. Return values produced inside the
    /// subplan stay visible afterwards only in the replacement-state case.
    pub fn add_subplan(&self, call: Call) -> Result<(), SubplanError> {
        let name = call.callable().name();
        let mut planners = 0usize;
        let mut states = 0usize;
        for arg in call.args() {
            match arg {
                Arg::Subplan(_) => planners += 1,
                Arg::State => states += 1,
                _ => {}
            }
        }
        if planners > 1 {
            return Err(SubplanError::MultiplePlanners { name: name.into() });
        }
        if states > 1 {
            return Err(SubplanError::MultipleStates { name: name.into() });
        }
        if planners == 0 {
            return Err(SubplanError::MissingPlanner { name: name.into() });
        }
        if states == 0 {
            return Err(SubplanError::MissingState { name: name.into() });
        }
        match call.callable().outputs() {
            [] => {}
            [only] if only.as_str() == "bytes[]" => {}
            _ => return Err(SubplanError::BadReturnShape { name: name.into() }),
        }
        self.inner
            .commands
            .borrow_mut()
            .push(Command::new(call, CommandKind::Subplan));
        Ok(())
    }

    /// Adds a call whose `bytes[]` return value replaces the planner state.
    ///
    /// The planner is not aware of what the replacement contains; slots
    /// referenced by later commands must still hold what they held before,
    /// or the produced plan is invalid at runtime.
    pub fn replace_state(&self, call: Call) -> Result<(), SubplanError> {
        if let Some(err) = reject_planner_args(&call) {
            return Err(err);
        }
        match call.callable().outputs() {
            [only] if only.as_str() == "bytes[]" => {}
            _ => {
                return Err(SubplanError::BadStateReturn {
                    name: call.callable().name().into(),
                });
            }
        }
        self.inner
            .commands
            .borrow_mut()
            .push(Command::new(call, CommandKind::RawCall));
        Ok(())
    }

    /// Compiles the accumulated call graph into command words and an initial
    /// state array.
    ///
    /// The pass is deterministic: planning an unmodified tree again yields a
    /// byte-identical [`Plan`]. Analysis state never persists between calls.
    pub fn plan(&self) -> Result<Plan, PlanError> {
        let visibility = visibility::analyze(self)?;
        let mut ctx = PlanningCtx::new(visibility)?;
        let commands = plan::build_commands(self, &mut ctx)?;
        Ok(Plan {
            commands,
            state: ctx.into_state(),
        })
    }
}

fn reject_planner_args(call: &Call) -> Option<SubplanError> {
    if call
        .args()
        .iter()
        .any(|arg| matches!(arg, Arg::Subplan(_)))
    {
        return Some(SubplanError::UnexpectedPlanner {
            name: call.callable().name().into(),
        });
    }
    None
}
