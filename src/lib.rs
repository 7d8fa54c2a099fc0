// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Tiered service launcher for Vermilion
//!
//! Connects to the supervisor runtime and asks it to start each service in the catalog,
//! one tier at a time.

pub mod broker;
pub mod catalog;
pub mod client;
mod error;
pub mod launcher;
pub mod msg;
pub mod supervisor;

pub use broker::{ConnectionBroker, Dial, RetryPolicy};
pub use catalog::{ServiceCatalog, ServiceDescriptor, Tier, TierKind};
pub use client::{AckPolicy, StartService, SupervisorClient, TcpDialer};
pub use error::{Error, ErrorKind};
pub use launcher::{LaunchConfig, LaunchState, Launcher};
pub use supervisor::SupervisorHost;
