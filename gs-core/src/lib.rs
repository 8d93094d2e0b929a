// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use error::GsError;
pub use model::*;
