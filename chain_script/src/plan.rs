// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot allocation and binary command encoding.
//!
//! The encoder drives the slot allocator as it linearizes commands: literals
//! are pre-populated in first-appearance order, return values get a slot only
//! if something later consumes them, and slots whose last consumer has
//! executed return to a LIFO free list for reuse.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::abi::{Address, ParamType, Selector};
use crate::call::{Call, CallFlags, Command, CommandId, CommandKind};
use crate::planner::{PlanError, Planner, SubplanError};
use crate::value::Arg;
use crate::visibility::Visibility;

/// Bit marking an argument or return slot as dynamically sized.
pub const SLOT_DYNAMIC: u8 = 0x80;
/// Slot byte meaning "substitute the entire current state".
pub const SLOT_STATE: u8 = 0xFE;
/// Slot byte meaning "no value".
pub const SLOT_NONE: u8 = 0xFF;
/// Highest addressable state slot.
const SLOT_MAX: u8 = 0xFD;

/// Length of one encoded command word.
pub const WORD_LEN: usize = 32;

/// Argument slots carried in a standard (single-word) command.
const STANDARD_ARG_COUNT: usize = 6;
/// Argument slots carried in an extended command's continuation word.
const EXTENDED_ARG_COUNT: usize = 32;

/// One 32-byte word of the encoded command stream.
///
/// Layout: `selector(4) | flags(1) | args(6) | ret(1) | target(20)`. An
/// extended command's continuation word is instead 32 raw argument slots.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandWord([u8; WORD_LEN]);

impl CommandWord {
    pub(crate) fn pack(
        selector: Selector,
        flags: CallFlags,
        args: &[u8; STANDARD_ARG_COUNT],
        ret: u8,
        target: Address,
    ) -> Self {
        let mut word = [0u8; WORD_LEN];
        word[..4].copy_from_slice(&selector.0);
        word[4] = flags.byte();
        word[5..11].copy_from_slice(args);
        word[11] = ret;
        word[12..].copy_from_slice(&target.0);
        Self(word)
    }

    /// Continuation word: argument slots padded with [`SLOT_NONE`].
    pub(crate) fn extension(args: &[u8]) -> Self {
        let mut word = [SLOT_NONE; WORD_LEN];
        word[..args.len()].copy_from_slice(args);
        Self(word)
    }

    /// Returns the raw word bytes.
    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; WORD_LEN] {
        &self.0
    }

    /// Consumes the word into its raw bytes.
    #[must_use]
    #[inline]
    pub const fn into_array(self) -> [u8; WORD_LEN] {
        self.0
    }
}

impl AsRef<[u8]> for CommandWord {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CommandWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandWord({self})")
    }
}

/// The artifact produced by [`Planner::plan`], consumed by the execution VM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    /// Encoded command words in execution order; an extended command
    /// contributes two consecutive words.
    pub commands: Vec<CommandWord>,
    /// The initial state array, index-addressable by the slot bytes embedded
    /// in `commands`.
    pub state: Vec<Vec<u8>>,
}

/// Working state of one planning pass.
///
/// Owned exclusively by a single [`Planner::plan`] invocation; subplans are
/// encoded against the same context so the whole tree shares one slot space.
pub(crate) struct PlanningCtx {
    visibility: Visibility,
    return_slot: HashMap<CommandId, u8>,
    literal_slot: HashMap<Vec<u8>, u8>,
    free_slots: Vec<u8>,
    expirations: HashMap<CommandId, Vec<u8>>,
    state: Vec<Vec<u8>>,
}

impl PlanningCtx {
    /// Builds the context, pre-populating the state array with every literal
    /// in first-appearance order and seeding their expirations.
    pub(crate) fn new(visibility: Visibility) -> Result<Self, PlanError> {
        let literal_count = visibility.literal_use.len();
        let mut state: Vec<Vec<u8>> = Vec::with_capacity(literal_count);
        let mut literal_slot: HashMap<Vec<u8>, u8> = HashMap::with_capacity(literal_count);
        let mut expirations: HashMap<CommandId, Vec<u8>> = HashMap::new();
        for (bytes, last_use) in &visibility.literal_use {
            let slot = state_slot(state.len())?;
            state.push(bytes.clone());
            literal_slot.insert(bytes.clone(), slot);
            expirations.entry(*last_use).or_default().push(slot);
        }
        Ok(Self {
            visibility,
            return_slot: HashMap::new(),
            literal_slot,
            free_slots: Vec::new(),
            expirations,
            state,
        })
    }

    pub(crate) fn into_state(self) -> Vec<Vec<u8>> {
        self.state
    }

    fn push_state(&mut self, entry: Vec<u8>) -> Result<u8, PlanError> {
        let slot = state_slot(self.state.len())?;
        self.state.push(entry);
        Ok(slot)
    }
}

fn state_slot(index: usize) -> Result<u8, PlanError> {
    u8::try_from(index)
        .ok()
        .filter(|slot| *slot <= SLOT_MAX)
        .ok_or(PlanError::SlotsExhausted)
}

/// Encodes `planner`'s commands against `ctx`, recursing into subplans.
pub(crate) fn build_commands(
    planner: &Planner,
    ctx: &mut PlanningCtx,
) -> Result<Vec<CommandWord>, PlanError> {
    let commands = planner.commands();
    let mut words = Vec::with_capacity(commands.len());
    for command in commands.iter() {
        let call = command.call();

        // A subplan is encoded first so its serialized form occupies the
        // newest state slot by the time arguments resolve. The slot is
        // consumed by the interpreter during this command and freed at once.
        let mut subplan_slot = None;
        if command.kind() == CommandKind::Subplan {
            let subplanner = call
                .args()
                .iter()
                .find_map(|arg| match arg {
                    Arg::Subplan(subplanner) => Some(subplanner),
                    _ => None,
                })
                .ok_or_else(|| {
                    PlanError::Subplan(SubplanError::MissingPlanner {
                        name: call.callable().name().into(),
                    })
                })?;
            let nested = build_commands(subplanner, ctx)?;
            let slot = ctx.push_state(serialize_subplan(&nested))?;
            ctx.free_slots.push(slot);
            subplan_slot = Some(slot);
        }

        let mut flags = call.flags();
        let args = resolve_args(call, ctx, subplan_slot);
        if args.len() > STANDARD_ARG_COUNT {
            flags |= CallFlags::EXTENDED_COMMAND;
        }

        // Slots whose last use is this command become reusable now, including
        // for this command's own return value.
        if let Some(expired) = ctx.expirations.remove(&command.id()) {
            ctx.free_slots.extend(expired);
        }

        let ret = return_slot_byte(command, ctx)?;
        let selector = call.callable().selector();
        let target = call.target();

        if flags.contains(CallFlags::EXTENDED_COMMAND) {
            if args.len() > EXTENDED_ARG_COUNT {
                return Err(PlanError::TooManyArguments {
                    name: call.callable().name().into(),
                    count: args.len(),
                });
            }
            words.push(CommandWord::pack(
                selector,
                flags,
                &[SLOT_NONE; STANDARD_ARG_COUNT],
                ret,
                target,
            ));
            words.push(CommandWord::extension(&args));
        } else {
            let mut packed = [SLOT_NONE; STANDARD_ARG_COUNT];
            packed[..args.len()].copy_from_slice(&args);
            words.push(CommandWord::pack(selector, flags, &packed, ret, target));
        }
    }
    Ok(words)
}

/// Resolves each argument (value-transfer literal first) to a slot byte.
fn resolve_args(call: &Call, ctx: &PlanningCtx, subplan_slot: Option<u8>) -> Vec<u8> {
    // The visibility pass interned every literal and the emission order
    // assigned every consumed return a slot before its consumers, so the map
    // lookups below cannot miss.
    let mut slots = Vec::with_capacity(call.args().len() + 1);
    if let Some(value) = call.value() {
        slots.push(arg_slot(ctx.literal_slot[value.bytes()], value.ty()));
    }
    for arg in call.args() {
        let slot = match arg {
            Arg::Literal(literal) => arg_slot(ctx.literal_slot[literal.bytes()], literal.ty()),
            Arg::Return(ret) => arg_slot(ctx.return_slot[&ret.command().id()], ret.ty()),
            Arg::State => SLOT_STATE,
            Arg::Subplan(_) => subplan_slot.unwrap_or(SLOT_NONE) | SLOT_DYNAMIC,
        };
        slots.push(slot);
    }
    slots
}

fn arg_slot(slot: u8, ty: &ParamType) -> u8 {
    if ty.is_dynamic() {
        slot | SLOT_DYNAMIC
    } else {
        slot
    }
}

/// Determines the header return byte, allocating a slot when the command's
/// output is consumed later.
fn return_slot_byte(command: &Command, ctx: &mut PlanningCtx) -> Result<u8, PlanError> {
    let call = command.call();
    let outputs = call.callable().outputs();
    if let Some(&last_use) = ctx.visibility.command_use.get(&command.id()) {
        if matches!(command.kind(), CommandKind::RawCall | CommandKind::Subplan) {
            return Err(PlanError::AmbiguousConsumption {
                name: call.callable().name().into(),
            });
        }
        let slot = match ctx.free_slots.pop() {
            Some(slot) => slot,
            None => ctx.push_state(Vec::new())?,
        };
        ctx.return_slot.insert(command.id(), slot);
        ctx.expirations.entry(last_use).or_default().push(slot);
        let dynamic = outputs.first().is_some_and(|ty| ty.is_dynamic())
            || call.flags().contains(CallFlags::TUPLE_RETURN);
        return Ok(if dynamic { slot | SLOT_DYNAMIC } else { slot });
    }
    if matches!(command.kind(), CommandKind::RawCall | CommandKind::Subplan) && outputs.len() == 1 {
        // Output shape was validated at add time to be exactly `bytes[]`.
        return Ok(SLOT_STATE);
    }
    Ok(SLOT_NONE)
}

/// Serializes a nested command list as one state entry: a 32-byte big-endian
/// count word followed by the command words.
fn serialize_subplan(words: &[CommandWord]) -> Vec<u8> {
    let mut out = Vec::with_capacity((words.len() + 1) * WORD_LEN);
    let mut count = [0u8; WORD_LEN];
    let len = u64::try_from(words.len()).unwrap_or(u64::MAX);
    count[WORD_LEN - 8..].copy_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&count);
    for word in words {
        out.extend_from_slice(word.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::{SLOT_DYNAMIC, SLOT_NONE, SLOT_STATE};
    use crate::abi::{Address, Callable, ParamType, Selector};
    use crate::call::{Call, CallFlags, CommandKind};
    use crate::planner::{PlanError, Planner};
    use crate::value::{Arg, Literal, ReturnValue};

    fn uint256(v: u64) -> Literal {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&v.to_be_bytes());
        Literal::new("uint256", word.to_vec())
    }

    fn target() -> Address {
        Address([0xAA; 20])
    }

    fn math_add() -> Callable {
        Callable::new(
            "add",
            Selector([0x77, 0x16, 0x02, 0xf7]),
            ["uint256", "uint256"],
            ["uint256"],
        )
    }

    #[test]
    fn standard_word_layout() {
        let planner = Planner::new();
        planner
            .add(Call::library(target(), math_add(), [uint256(1), uint256(2)]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();

        assert_eq!(plan.commands.len(), 1);
        let word = plan.commands[0].as_bytes();
        assert_eq!(&word[..4], &[0x77, 0x16, 0x02, 0xf7]);
        assert_eq!(word[4], CallFlags::DELEGATECALL.byte());
        assert_eq!(&word[5..11], &[0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(word[11], SLOT_NONE);
        assert_eq!(&word[12..], &[0xAA; 20]);

        assert_eq!(
            plan.state,
            vec![uint256(1).bytes().to_vec(), uint256(2).bytes().to_vec()]
        );
    }

    #[test]
    fn literals_deduplicate_by_bytes() {
        let planner = Planner::new();
        planner
            .add(Call::library(target(), math_add(), [uint256(1), uint256(1)]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();

        assert_eq!(plan.state.len(), 1);
        let word = plan.commands[0].as_bytes();
        assert_eq!(&word[5..11], &[0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn dedup_ignores_the_declared_type() {
        // Same bytes under two different descriptors share one slot.
        let as_bytes32 = Literal::new("bytes32", uint256(1).bytes().to_vec());
        let callable = Callable::new(
            "mixed",
            Selector([0x01, 0x02, 0x03, 0x04]),
            ["uint256", "bytes32"],
            Vec::<&str>::new(),
        );
        let planner = Planner::new();
        planner
            .add(Call::library(target(), callable, [Arg::from(uint256(1)), Arg::from(as_bytes32)]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();
        assert_eq!(plan.state.len(), 1);
    }

    #[test]
    fn consumed_return_reuses_an_expired_slot() {
        let planner = Planner::new();
        let sum = planner
            .add(Call::library(target(), math_add(), [uint256(1), uint256(2)]).unwrap())
            .unwrap()
            .unwrap();
        planner
            .add(Call::library(target(), math_add(), [Arg::from(sum), Arg::from(uint256(3))]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();

        assert_eq!(plan.commands.len(), 2);
        // Two literals for the first call plus the literal 3.
        assert_eq!(plan.state.len(), 3);
        // Literal slots 0 and 1 expire at the first command; the return value
        // takes the most recently freed one.
        let first = plan.commands[0].as_bytes();
        assert_eq!(first[11], 0x01);
        let second = plan.commands[1].as_bytes();
        assert_eq!(&second[5..11], &[0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(second[11], SLOT_NONE);
    }

    #[test]
    fn unconsumed_return_gets_no_slot() {
        let planner = Planner::new();
        planner
            .add(Call::library(target(), math_add(), [uint256(1), uint256(2)]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();
        assert_eq!(plan.state.len(), 2);
        assert_eq!(plan.commands[0].as_bytes()[11], SLOT_NONE);
    }

    #[test]
    fn dynamic_types_set_the_high_bit() {
        let strlen = Callable::new(
            "strlen",
            Selector([0x36, 0x7b, 0xbd, 0x78]),
            ["string"],
            ["uint256"],
        );
        let concat = Callable::new(
            "strcat",
            Selector([0xd8, 0x24, 0xcc, 0xf3]),
            ["string", "string"],
            ["string"],
        );
        let hello = Literal::new("string", b"hello".to_vec());
        let world = Literal::new("string", b"world".to_vec());

        let planner = Planner::new();
        let joined = planner
            .add(Call::library(target(), concat, [hello, world]).unwrap())
            .unwrap()
            .unwrap();
        planner
            .add(Call::library(target(), strlen, [joined]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();

        let first = plan.commands[0].as_bytes();
        assert_eq!(&first[5..11], &[0x80, 0x81, 0xFF, 0xFF, 0xFF, 0xFF]);
        // Return slot reuses freed slot 1 and is marked dynamic.
        assert_eq!(first[11], 0x01 | SLOT_DYNAMIC);
        let second = plan.commands[1].as_bytes();
        assert_eq!(&second[5..11], &[0x81, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn six_args_stay_standard_seven_go_extended() {
        let six = Callable::new(
            "six",
            Selector([0x00, 0x00, 0x00, 0x06]),
            ["uint256"; 6],
            Vec::<&str>::new(),
        );
        let seven = Callable::new(
            "seven",
            Selector([0x00, 0x00, 0x00, 0x07]),
            ["uint256"; 7],
            Vec::<&str>::new(),
        );

        let planner = Planner::new();
        let args: Vec<Literal> = (1..=6).map(uint256).collect();
        planner
            .add(Call::library(target(), six, args).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();
        assert_eq!(plan.commands.len(), 1);
        assert!(!CallFlags::from_byte(plan.commands[0].as_bytes()[4]).contains(CallFlags::EXTENDED_COMMAND));

        let planner = Planner::new();
        let args: Vec<Literal> = (1..=7).map(uint256).collect();
        planner
            .add(Call::library(target(), seven, args).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();
        assert_eq!(plan.commands.len(), 2);

        let header = plan.commands[0].as_bytes();
        assert!(CallFlags::from_byte(header[4]).contains(CallFlags::EXTENDED_COMMAND));
        assert_eq!(&header[5..11], &[0xFF; 6]);
        let extension = plan.commands[1].as_bytes();
        assert_eq!(&extension[..7], &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&extension[7..], &[0xFF; 25]);
    }

    #[test]
    fn replace_state_encodes_the_state_sentinel() {
        let use_state = Callable::new(
            "useState",
            Selector([0x08, 0xf3, 0x89, 0xc8]),
            ["bytes[]"],
            ["bytes[]"],
        );
        let planner = Planner::new();
        planner
            .replace_state(Call::library(target(), use_state, [Arg::State]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();

        assert_eq!(plan.commands.len(), 1);
        assert!(plan.state.is_empty());
        let word = plan.commands[0].as_bytes();
        assert_eq!(&word[5..11], &[SLOT_STATE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(word[11], SLOT_STATE);
    }

    #[test]
    fn subplan_serializes_into_the_last_state_slot() {
        let subplanner = Planner::new();
        planner_add_pair(&subplanner);

        let execute = Callable::new(
            "execute",
            Selector([0xde, 0x79, 0x2d, 0x5f]),
            ["bytes32[]", "bytes[]"],
            ["bytes[]"],
        );
        let planner = Planner::new();
        planner
            .add_subplan(
                Call::library(
                    target(),
                    execute,
                    [Arg::Subplan(subplanner.clone()), Arg::State],
                )
                .unwrap(),
            )
            .unwrap();
        let plan = planner.plan().unwrap();

        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.state.len(), 3);

        let word = plan.commands[0].as_bytes();
        // Subplan slot 2, dynamic; then the state placeholder.
        assert_eq!(&word[5..11], &[0x02 | SLOT_DYNAMIC, SLOT_STATE, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(word[11], SLOT_STATE);

        // Serialized form: count word followed by the nested command word.
        let serialized = &plan.state[2];
        assert_eq!(serialized.len(), 64);
        let mut count = [0u8; 32];
        count[31] = 1;
        assert_eq!(&serialized[..32], &count);
        assert_eq!(&serialized[32..36], &[0x77, 0x16, 0x02, 0xf7]);
    }

    #[test]
    fn state_replacing_output_cannot_also_be_consumed() {
        let use_state = Callable::new(
            "useState",
            Selector([0x08, 0xf3, 0x89, 0xc8]),
            ["bytes[]"],
            ["bytes[]"],
        );
        let log = Callable::new(
            "logBytes",
            Selector([0x0b, 0xe7, 0x7f, 0x56]),
            ["bytes[]"],
            Vec::<&str>::new(),
        );

        let planner = Planner::new();
        planner
            .replace_state(Call::library(target(), use_state, [Arg::State]).unwrap())
            .unwrap();
        // Forge a direct reference to the state-replacing command's output.
        let raw = {
            let commands = planner.commands();
            ReturnValue::new(ParamType::from("bytes[]"), commands[0].clone())
        };
        planner
            .add(Call::library(target(), log, [raw]).unwrap())
            .unwrap();

        assert_eq!(
            planner.plan().unwrap_err(),
            PlanError::AmbiguousConsumption {
                name: "useState".into()
            }
        );
    }

    #[test]
    fn slot_space_is_bounded() {
        let sink = Callable::new(
            "sink",
            Selector([0x00, 0x00, 0x00, 0x01]),
            ["uint256"],
            Vec::<&str>::new(),
        );
        let planner = Planner::new();
        for v in 0..300u64 {
            planner
                .add(Call::library(target(), sink.clone(), [uint256(v)]).unwrap())
                .unwrap();
        }
        assert_eq!(planner.plan().unwrap_err(), PlanError::SlotsExhausted);
    }

    fn planner_add_pair(planner: &Planner) {
        planner
            .add(Call::library(target(), math_add(), [uint256(1), uint256(2)]).unwrap())
            .unwrap();
    }

    #[test]
    fn tuple_return_marks_the_slot_dynamic() {
        let log = Callable::new(
            "logBytes",
            Selector([0x0b, 0xe7, 0x7f, 0x56]),
            ["bytes"],
            Vec::<&str>::new(),
        );
        let planner = Planner::new();
        let raw = planner
            .add(
                Call::library(target(), math_add(), [uint256(1), uint256(2)])
                    .unwrap()
                    .raw_return(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(raw.ty().as_str(), "bytes");
        planner
            .add(Call::library(target(), log, [raw]).unwrap())
            .unwrap();
        let plan = planner.plan().unwrap();

        let first = plan.commands[0].as_bytes();
        assert!(CallFlags::from_byte(first[4]).contains(CallFlags::TUPLE_RETURN));
        // Reuses freed slot 1, marked dynamic because of the bytes wrapping.
        assert_eq!(first[11], 0x01 | SLOT_DYNAMIC);
    }

    #[test]
    fn rawcall_command_kind_is_recorded() {
        let use_state = Callable::new(
            "useState",
            Selector([0x08, 0xf3, 0x89, 0xc8]),
            ["bytes[]"],
            ["bytes[]"],
        );
        let planner = Planner::new();
        planner
            .replace_state(Call::library(target(), use_state, [Arg::State]).unwrap())
            .unwrap();
        let commands = planner.commands();
        assert_eq!(commands[0].kind(), CommandKind::RawCall);
    }
}
