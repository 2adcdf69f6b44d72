// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Discovery of the per-device counters published in a stats filesystem.
//!
//! [`StatsfsRegistry::scan`] walks the filesystem, reads the `.schema` files
//! that describe each subsystem's metrics and builds an immutable registry.
//! [`collector::register_all`] then hands one [`MetricCallback`] per metric to
//! a backend implementing [`Meter`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod collector;
pub mod errors;
pub mod metric;
pub mod path;
pub mod reader;
pub mod registry;
pub mod schema;

pub use collector::{callbacks, register_all, Meter, MetricCallback, Observation};
pub use errors::{Error, SchemaSyntaxError, ValueError};
pub use metric::{Accumulation, LabelSet, MetricDeclaration, Value, ValueType};
pub use registry::{MetricBinding, Scan, StatsfsRegistry, SubsystemFailure, SubsystemRegistry};
