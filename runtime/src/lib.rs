// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

//! P2P sampler runtime: source clients, browser renderer, and the run pipeline.
//!
//! This library crate exposes the modules for integration testing.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod renderer;
