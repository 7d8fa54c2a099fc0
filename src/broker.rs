// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::time::delay_for;

use crate::error::ErrorKind;
use crate::Error;

/// Bounded, fixed interval retry for dialing the supervisor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

    pub fn new(max_attempts: u32, backoff: Duration) -> Result<Self, Error> {
        if max_attempts == 0 {
            return Err(ErrorKind::InvalidConfig("max attempts must be greater than zero").into());
        }

        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff: Self::DEFAULT_BACKOFF,
        }
    }
}

/// Something that can open a connection to the supervisor
#[async_trait]
pub trait Dial: Send {
    type Connection: Send;

    async fn dial(&mut self, address: &str) -> Result<Self::Connection, Error>;
}

/// Hands out the connection to the supervisor once it is reachable.
///
/// The attempt counter lives for the life of the broker, a second `acquire` only gets whatever attempts remain.
pub struct ConnectionBroker<D: Dial> {
    dialer: D,
    policy: RetryPolicy,
    attempts: u32,
}

impl<D: Dial> ConnectionBroker<D> {
    pub fn new(dialer: D, policy: RetryPolicy) -> Self {
        Self {
            dialer,
            policy,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Failed dials so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Dial `address` until it succeeds or the policy is used up.
    ///
    /// Sleeps `backoff` between failed attempts, but not after the last one.
    pub async fn acquire(&mut self, address: &str) -> Result<D::Connection, Error> {
        while self.attempts < self.policy.max_attempts {
            match self.dialer.dial(address).await {
                Ok(connection) => {
                    debug!("connected to supervisor on {}", address);
                    return Ok(connection);
                }
                Err(err) => {
                    self.attempts += 1;
                    warn!(
                        "runtime not available on {} ({}), attempt {}/{}",
                        address, err, self.attempts, self.policy.max_attempts
                    );

                    if self.attempts < self.policy.max_attempts {
                        debug!("retrying in {:?}", self.policy.backoff);
                        delay_for(self.policy.backoff).await;
                    }
                }
            }
        }

        Err(ErrorKind::Exhausted {
            address: address.to_string(),
            attempts: self.attempts,
        }
        .into())
    }
}
