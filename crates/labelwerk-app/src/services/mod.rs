// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer for the daemon: where state lives on disk and how the
// pipeline configuration is found.

pub mod config_source;
pub mod data_dir;
