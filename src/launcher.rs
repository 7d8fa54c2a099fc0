// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::delay_for;

use crate::broker::{ConnectionBroker, Dial, RetryPolicy};
use crate::catalog::{ServiceCatalog, ServiceDescriptor, Tier, TierKind};
use crate::client::{AckPolicy, StartService};
use crate::Error;

pub const DEFAULT_ADDRESS: &str = "localhost:10666";

/// Pause before the dependents tier.
///
/// A guess, not a guarantee: the earlier tiers give no readiness signal, see cs3org/reva#795.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct LaunchConfig {
    pub address: String,
    pub retry: RetryPolicy,
    pub settle_delay: Duration,
    pub ack: AckPolicy,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            retry: RetryPolicy::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            ack: AckPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    Connecting,
    StartingTier(TierKind),
    Delaying,
    Done,
    Fatal,
}

/// Start every service in the catalog, tier by tier
///
/// Rules:
/// - one start command in flight at a time, in catalog order
/// - a tier only begins once the previous tier is fully started
/// - dependents wait an additional settle delay
/// - the first failure ends the run, nothing already started is stopped
#[derive(Debug)]
pub struct Launcher {
    catalog: ServiceCatalog,
    config: LaunchConfig,
    state: LaunchState,
}

impl Launcher {
    pub fn new(catalog: ServiceCatalog, config: LaunchConfig) -> Self {
        if config.settle_delay <= config.retry.backoff() {
            warn!(
                "settle delay {:?} is not longer than the retry backoff {:?}",
                config.settle_delay,
                config.retry.backoff()
            );
        }

        Self {
            catalog,
            config,
            state: LaunchState::Idle,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Connect through a fresh broker and start all tiers
    pub async fn run<D>(&mut self, dialer: D) -> Result<(), Error>
    where
        D: Dial,
        D::Connection: StartService,
    {
        let mut broker = ConnectionBroker::new(dialer, self.config.retry);
        self.run_with(&mut broker).await
    }

    pub async fn run_with<D>(&mut self, broker: &mut ConnectionBroker<D>) -> Result<(), Error>
    where
        D: Dial,
        D::Connection: StartService,
    {
        if self.state != LaunchState::Idle {
            return Err(format!("launcher already ran, state is {:?}", self.state).into());
        }

        let result = self.launch(broker).await;
        self.state = match result {
            Ok(()) => LaunchState::Done,
            Err(_) => LaunchState::Fatal,
        };

        result
    }

    async fn launch<D>(&mut self, broker: &mut ConnectionBroker<D>) -> Result<(), Error>
    where
        D: Dial,
        D::Connection: StartService,
    {
        self.state = LaunchState::Connecting;
        let mut client = broker.acquire(&self.config.address).await?;
        info!("connected to supervisor on {}", self.config.address);

        let catalog = self.catalog.clone();
        self.start_tier(&mut client, catalog.platform()).await?;
        self.start_tier(&mut client, catalog.extensions()).await?;

        let dependents = catalog.dependents();
        if !dependents.is_empty() {
            self.state = LaunchState::Delaying;
            info!(
                "waiting {:?} before starting {} dependent services",
                self.config.settle_delay,
                dependents.len()
            );
            delay_for(self.config.settle_delay).await;

            self.start_tier(&mut client, dependents).await?;
        }

        info!("launched {} services", catalog.len());
        Ok(())
    }

    async fn start_tier<C: StartService>(&mut self, client: &mut C, tier: &Tier) -> Result<(), Error> {
        self.state = LaunchState::StartingTier(tier.kind());
        info!("starting {} tier ({} services)", tier.kind(), tier.len());

        for name in tier.services() {
            let descriptor = ServiceDescriptor::new(name.as_str());
            let code = client.start(&descriptor).await?;
            debug!("started {} ({})", name, code);
        }

        Ok(())
    }
}
