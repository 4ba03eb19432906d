// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// labelwerk-render: the concrete conversion backend.  Label units are
// rendered to PNG by a Labelary-compatible HTTP service and the images are
// assembled into a PDF with one page per label.

pub mod backend;
pub mod labelary;
pub mod pdf;

pub use backend::LabelaryPdfBackend;
pub use labelary::LabelaryRenderer;
pub use pdf::PdfAssembler;
