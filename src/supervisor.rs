// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};

use log::info;
use tokio::process::{Child, Command};

use crate::Error;

/// The supervisor runtime, running as a child of this process
///
/// Rules:
///   - accepts `Service.Start` on the launcher's address
///   - forks and monitors the started services (not our concern)
///   - killed when this handle is dropped
#[derive(Debug)]
pub struct SupervisorHost {
    child: Child,
}

impl SupervisorHost {
    pub fn spawn<P, I, A>(program: P, args: I) -> Result<Self, Error>
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        // FIXME: clear env? set working directory? uid/gid?
        let child = Command::new(program.as_ref())
            .args(args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        info!(
            "started supervisor {} (pid {})",
            program.as_ref().to_string_lossy(),
            child.id()
        );

        Ok(Self { child })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Resolves once the supervisor exits
    pub async fn wait(self) -> Result<ExitStatus, Error> {
        Ok(self.child.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_reports_exit_status() {
        let host = SupervisorHost::spawn("sh", &["-c", "exit 3"]).expect("failed to spawn sh");
        assert!(host.id() > 0);

        let status = host.wait().await.expect("wait failed");
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let result = SupervisorHost::spawn("/nonexistent/vermilion-supervisor", Vec::<String>::new());
        assert!(result.is_err());
    }
}
