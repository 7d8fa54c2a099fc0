// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::broker::Dial;
use crate::catalog::ServiceDescriptor;
use crate::error::ErrorKind;
use crate::msg::{self, Request, Response, StartRequest};
use crate::Error;

/// How the acknowledgement code from the supervisor is judged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckPolicy {
    /// Any reply counts as started
    Accept,
    /// Only `0` counts as started, anything else is a rejection
    RequireZero,
}

impl Default for AckPolicy {
    fn default() -> Self {
        AckPolicy::Accept
    }
}

/// Issue a start command for a single service
#[async_trait]
pub trait StartService: Send {
    /// Blocks until the supervisor acknowledges, returning its code
    async fn start(&mut self, descriptor: &ServiceDescriptor) -> Result<i32, Error>;
}

/// `Service.Start` calls over a connection to the supervisor.
///
/// There is no retry here, the first failure is returned to the caller.
pub struct SupervisorClient<S> {
    stream: S,
    ack: AckPolicy,
    seq: u64,
}

impl<S> SupervisorClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, ack: AckPolicy) -> Self {
        Self { stream, ack, seq: 0 }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> StartService for SupervisorClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn start(&mut self, descriptor: &ServiceDescriptor) -> Result<i32, Error> {
        self.seq += 1;
        let request = Request::start(self.seq, StartRequest::from(descriptor));

        msg::send_msg(&mut self.stream, &request).await?;
        let response: Response = msg::recv_msg(&mut self.stream).await?;

        if response.seq != request.seq {
            return Err(ErrorKind::Protocol(format!(
                "expected reply {} but got {}",
                request.seq, response.seq
            ))
            .into());
        }

        let code = response.result.map_err(|message| ErrorKind::Remote {
            service: descriptor.name().to_string(),
            message,
        })?;
        debug!("supervisor acknowledged {} with {}", descriptor.name(), code);

        match self.ack {
            AckPolicy::RequireZero if code != 0 => Err(ErrorKind::Rejected {
                service: descriptor.name().to_string(),
                code,
            }
            .into()),
            _ => Ok(code),
        }
    }
}

/// Dials the supervisor over TCP
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer {
    ack: AckPolicy,
}

impl TcpDialer {
    pub fn new(ack: AckPolicy) -> Self {
        Self { ack }
    }
}

#[async_trait]
impl Dial for TcpDialer {
    type Connection = SupervisorClient<TcpStream>;

    async fn dial(&mut self, address: &str) -> Result<Self::Connection, Error> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;

        Ok(SupervisorClient::new(stream, self.ack))
    }
}
