use std::time::Duration;

use tracing::debug;

use crate::connection::{ConnectionManager, RemoteConnection};
use crate::wire::{Arg, ReplyCursor};
use crate::{Cancellation, ClientConfig, ResultCode, VfsError, VfsResult};

/// Which reply deadline a call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTimeout {
    Default,
    /// Open and Close, which may wait on slow media.
    Long,
}

/// A reply whose leading result code has been read but not yet judged.
#[derive(Debug)]
pub struct Reply {
    result: ResultCode,
    fields: ReplyCursor,
    generation: u64,
}

impl Reply {
    pub fn parse(fields: Vec<Arg>) -> VfsResult<Self> {
        let mut fields = ReplyCursor::new(fields);
        let result = ResultCode(fields.next_i32()?);
        Ok(Self { result, fields, generation: 0 })
    }

    pub fn result_code(&self) -> ResultCode {
        self.result
    }

    /// Generation of the private connection that answered; 0 for replies
    /// from the shared connection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The payload if the daemon reported success, its code otherwise.
    pub fn check(self) -> VfsResult<ReplyCursor> {
        if self.result.is_ok() {
            Ok(self.fields)
        } else {
            Err(VfsError::remote(self.result))
        }
    }

    pub fn split(self) -> (ResultCode, ReplyCursor) {
        (self.result, self.fields)
    }
}

pub struct Executor {
    connections: ConnectionManager,
    default_timeout: Duration,
    long_timeout: Duration,
}

impl Executor {
    pub fn new(connections: ConnectionManager, config: &ClientConfig) -> Self {
        Self {
            connections,
            default_timeout: config.default_timeout,
            long_timeout: config.long_timeout,
        }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Runs one call on the calling thread's private connection.
    ///
    /// With `cancel`, a fresh token is bound to it for exactly this call and
    /// sent as the trailing argument.
    pub fn execute(
        &self,
        method: &str,
        args: Vec<Arg>,
        cancel: Option<&Cancellation>,
        timeout: CallTimeout,
    ) -> VfsResult<Reply> {
        self.connections
            .with_connection(|conn| self.send(conn, method, args, cancel, timeout))
    }

    /// Like [`execute`](Self::execute), but only on the connection of the
    /// given generation; used for calls naming a handle id.
    pub fn execute_on(
        &self,
        generation: u64,
        method: &str,
        args: Vec<Arg>,
        cancel: Option<&Cancellation>,
        timeout: CallTimeout,
    ) -> VfsResult<Reply> {
        self.connections
            .with_generation(generation, |conn| self.send(conn, method, args, cancel, timeout))
    }

    /// [`execute`](Self::execute) followed by [`Reply::check`].
    pub fn call(
        &self,
        method: &str,
        args: Vec<Arg>,
        cancel: Option<&Cancellation>,
        timeout: CallTimeout,
    ) -> VfsResult<ReplyCursor> {
        self.execute(method, args, cancel, timeout)?.check()
    }

    /// [`execute_on`](Self::execute_on) followed by [`Reply::check`].
    pub fn call_on(
        &self,
        generation: u64,
        method: &str,
        args: Vec<Arg>,
        cancel: Option<&Cancellation>,
        timeout: CallTimeout,
    ) -> VfsResult<ReplyCursor> {
        self.execute_on(generation, method, args, cancel, timeout)?.check()
    }

    fn send(
        &self,
        conn: &mut RemoteConnection,
        method: &str,
        mut args: Vec<Arg>,
        cancel: Option<&Cancellation>,
        timeout: CallTimeout,
    ) -> VfsResult<Reply> {
        let timeout = match timeout {
            CallTimeout::Default => self.default_timeout,
            CallTimeout::Long => self.long_timeout,
        };

        let armed = match cancel {
            Some(c) => Some(c.arm(conn.mint_token(), conn.conn_id(), conn.sink())?),
            None => None,
        };
        if let Some(armed) = &armed {
            args.push(Arg::Int32(armed.token()));
        }
        debug!(method, conn = conn.conn_id(), token = armed.as_ref().map(|a| a.token()), "executing");

        let fields = conn.call(method, args, timeout);
        drop(armed);
        let mut reply = Reply::parse(fields?)?;
        reply.generation = conn.generation();
        Ok(reply)
    }
}
