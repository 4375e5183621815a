// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable rendering of a produced [`Plan`].
//!
//! Decodes command words back into call type, argument slots, return slot,
//! and target, and summarizes the state array. Intended for debugging and
//! test output; the rendering is stable but not a parsing format.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::call::CallFlags;
use crate::plan::{Plan, SLOT_DYNAMIC, SLOT_NONE, SLOT_STATE};

/// Renders `plan` as an indented listing of commands and state entries.
#[must_use]
pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "commands ({}):", plan.commands.len());
    let mut extension_pending = false;
    for (index, word) in plan.commands.iter().enumerate() {
        let bytes = word.as_bytes();
        if extension_pending {
            extension_pending = false;
            let _ = writeln!(out, "  [{index}] ext      args=[{}]", render_slots(bytes));
            continue;
        }
        let flags = CallFlags::from_byte(bytes[4]);
        let _ = writeln!(
            out,
            "  [{index}] {:<8} sel=0x{} args=[{}] ret={} target=0x{}",
            call_type_name(flags),
            hex(&bytes[..4]),
            render_slots(&bytes[5..11]),
            render_slot(bytes[11]),
            hex(&bytes[12..]),
        );
        if flags.contains(CallFlags::EXTENDED_COMMAND) {
            extension_pending = true;
        }
    }
    let _ = writeln!(out, "state ({}):", plan.state.len());
    for (slot, entry) in plan.state.iter().enumerate() {
        let preview_len = entry.len().min(32);
        let ellipsis = if entry.len() > preview_len { ".." } else { "" };
        let _ = writeln!(
            out,
            "  [0x{slot:02x}] {} bytes 0x{}{ellipsis}",
            entry.len(),
            hex(&entry[..preview_len]),
        );
    }
    out
}

fn call_type_name(flags: CallFlags) -> &'static str {
    match flags.call_type().byte() {
        0x01 => "call",
        0x02 => "static",
        0x03 => "callval",
        _ => "delegate",
    }
}

fn render_slots(slots: &[u8]) -> String {
    let rendered: Vec<String> = slots
        .iter()
        .copied()
        .filter(|slot| *slot != SLOT_NONE)
        .map(render_slot)
        .collect();
    rendered.join(",")
}

fn render_slot(slot: u8) -> String {
    let mut out = String::new();
    match slot {
        SLOT_STATE => out.push_str("state"),
        SLOT_NONE => out.push_str("none"),
        _ => {
            let _ = write!(out, "0x{:02x}", slot & !SLOT_DYNAMIC);
            if slot & SLOT_DYNAMIC != 0 {
                out.push_str("(dyn)");
            }
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
