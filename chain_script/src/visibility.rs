// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visibility and liveness analysis over a planner tree.
//!
//! One depth-first walk computes, for every literal and every
//! return-producing command, the last command that consumes it, and validates
//! that every referenced return value was produced by a command visible in
//! the current or an enclosing scope.

use alloc::vec::Vec;

use hashbrown::{DefaultHashBuilder, HashMap, HashSet};
use indexmap::IndexMap;

use crate::call::CommandId;
use crate::planner::{PlanError, Planner, PlannerId};
use crate::value::Arg;

/// Literal last-use map, keyed by encoded bytes in first-appearance order.
///
/// Insertion order doubles as state-slot assignment order, so it must be
/// preserved across last-use updates.
pub(crate) type LiteralUseMap = IndexMap<Vec<u8>, CommandId, DefaultHashBuilder>;

/// Last-use maps produced by [`analyze`].
#[derive(Debug)]
pub(crate) struct Visibility {
    /// Producing command -> last command consuming its return value.
    pub(crate) command_use: HashMap<CommandId, CommandId>,
    /// Literal bytes -> last command consuming that literal.
    pub(crate) literal_use: LiteralUseMap,
}

/// The `seen` set threaded through nested scopes.
///
/// A subplan whose enclosing call declares a `bytes[]` output replaces the
/// parent state, so commands produced inside stay visible afterwards and the
/// set is shared. A subplan with no declared output is read-only: it analyzes
/// against an isolated copy, and nothing it produces leaks back out.
enum SeenScope<'a> {
    Shared(&'a mut HashSet<CommandId>),
    Isolated(HashSet<CommandId>),
}

impl SeenScope<'_> {
    fn visible(&mut self) -> &mut HashSet<CommandId> {
        match self {
            Self::Shared(seen) => seen,
            Self::Isolated(seen) => seen,
        }
    }
}

/// Analyzes the whole planner tree rooted at `root`.
///
/// All bookkeeping is constructed fresh per call; nothing persists between
/// planning passes.
pub(crate) fn analyze(root: &Planner) -> Result<Visibility, PlanError> {
    let mut visibility = Visibility {
        command_use: HashMap::new(),
        literal_use: IndexMap::with_hasher(DefaultHashBuilder::default()),
    };
    let mut seen: HashSet<CommandId> = HashSet::new();
    let mut visiting: HashSet<PlannerId> = HashSet::new();
    walk(
        root,
        &mut visibility,
        SeenScope::Shared(&mut seen),
        &mut visiting,
    )?;
    Ok(visibility)
}

fn walk(
    planner: &Planner,
    visibility: &mut Visibility,
    mut scope: SeenScope<'_>,
    visiting: &mut HashSet<PlannerId>,
) -> Result<(), PlanError> {
    if !visiting.insert(planner.id()) {
        return Err(PlanError::Cycle);
    }
    let commands = planner.commands();
    for command in commands.iter() {
        let call = command.call();
        // The attached value literal conceptually occupies argument slot 0.
        if let Some(value) = call.value() {
            visibility
                .literal_use
                .insert(value.bytes().to_vec(), command.id());
        }
        for arg in call.args() {
            match arg {
                Arg::Return(ret) => {
                    if !scope.visible().contains(&ret.command().id()) {
                        return Err(PlanError::UnboundReturn {
                            producer: ret.command().name().into(),
                        });
                    }
                    visibility
                        .command_use
                        .insert(ret.command().id(), command.id());
                }
                Arg::Literal(literal) => {
                    visibility
                        .literal_use
                        .insert(literal.bytes().to_vec(), command.id());
                }
                Arg::Subplan(subplanner) => {
                    if call.callable().outputs().is_empty() {
                        let isolated = scope.visible().clone();
                        walk(subplanner, visibility, SeenScope::Isolated(isolated), visiting)?;
                    } else {
                        walk(
                            subplanner,
                            visibility,
                            SeenScope::Shared(scope.visible()),
                            visiting,
                        )?;
                    }
                }
                Arg::State => {}
            }
        }
        scope.visible().insert(command.id());
    }
    Ok(())
}
