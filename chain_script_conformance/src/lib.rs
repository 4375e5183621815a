// Copyright 2026 the Chain Script Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance test suite for `chain_script`; see `tests/conformance.rs`.
