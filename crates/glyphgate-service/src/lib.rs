// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// glyphgate-service — the facade an embedding application talks to.
//
// Wires the stores and the authentication subsystems together behind one
// cheaply-cloneable handle, and owns the caretaker-facing management
// operations (PIN reset, face toggle, activation) with their audit entries.

pub mod services;
pub mod telemetry;

pub use services::AuthServices;
pub use telemetry::init_tracing;
