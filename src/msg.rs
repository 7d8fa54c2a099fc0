// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Messages exchanged with the supervisor runtime.
//!
//! Every message is a single frame: a big-endian `u32` length followed by the bincode encoded body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::catalog::ServiceDescriptor;
use crate::error::ErrorKind;
use crate::Error;

pub const START_METHOD: &str = "Service.Start";

/// Upper bound on a single frame, anything larger is treated as a corrupt stream
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub service_name: String,
    /// `KEY=VALUE` entries
    pub environment: Vec<String>,
    pub args: Vec<String>,
}

impl From<&ServiceDescriptor> for StartRequest {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        Self {
            service_name: descriptor.name().to_string(),
            environment: descriptor.env_pairs(),
            args: descriptor.args().to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub seq: u64,
    pub method: String,
    pub body: StartRequest,
}

impl Request {
    pub fn start(seq: u64, body: StartRequest) -> Self {
        Self {
            seq,
            method: START_METHOD.to_string(),
            body,
        }
    }
}

/// The supervisor's answer, either the acknowledgement code or its error message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub seq: u64,
    pub result: Result<i32, String>,
}

pub async fn send_msg<W, T>(target: &mut W, msg: &T) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(msg)?;
    if body.len() > MAX_FRAME_LEN as usize {
        return Err(ErrorKind::Protocol(format!("frame of {} bytes is too large", body.len())).into());
    }

    target.write_all(&(body.len() as u32).to_be_bytes()).await?;
    target.write_all(&body).await?;
    target.flush().await?;

    Ok(())
}

pub async fn recv_msg<R, T>(from: &mut R) -> Result<T, Error>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len = [0u8; 4];
    from.read_exact(&mut len).await?;

    let len = u32::from_be_bytes(len);
    if len > MAX_FRAME_LEN {
        return Err(ErrorKind::Protocol(format!("frame of {} bytes is too large", len)).into());
    }

    let mut body = vec![0u8; len as usize];
    from.read_exact(&mut body).await?;

    Ok(bincode::deserialize(&body)?)
}
