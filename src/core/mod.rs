// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! CPU-facing core: normalizer, macro expander, encoder, resolver, and the
//! reference interpreter.

pub mod encoder;
pub mod error;
pub mod expander;
pub mod machine;
pub mod normalize;
pub mod resolver;
