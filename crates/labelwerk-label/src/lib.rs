// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labelwerk Label: pure text operations on ZPL content: splitting a file into
// label units, stripping markup the renderer does not support, reading output
// name directives, and resolving the physical size of a label.

pub mod dimensions;
pub mod segment;

pub use dimensions::DimensionResolver;
pub use segment::{
    extract_forced_named_output, extract_named_output, preprocess, resolve_output_name, split,
};
