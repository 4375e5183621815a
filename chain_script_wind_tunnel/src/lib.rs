// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmark crate for `chain_script`; see `benches/plan.rs`.
