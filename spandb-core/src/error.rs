// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for SpanDB
//!
//! Build errors abort construction and leave no partial index. Query-time
//! parameter errors fail the whole batch before dispatch. An out-of-range
//! filter interval is NOT an error: it produces an empty, sentinel-padded
//! result row and a warning log.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpanDBError {
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter: {0}")]
    Parameter(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SpanDBError>;
