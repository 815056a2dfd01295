// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules. Each function takes `&Database` and runs on the single
//! tokio-rusqlite writer thread.

pub mod statistics;
pub mod users;
