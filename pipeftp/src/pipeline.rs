//! # Pipeline
//!
//! The command pipeline correlates the responses framed from the control channel with the
//! commands which have been issued, oldest first.
//!
//! [`Pipeline`] is a pure state machine: it never touches a socket. It tells its owner which
//! action text must be written, and hands back the commands it finalizes. The owner is the
//! [`driver`], a task which owns the control connection.

pub(crate) mod driver;

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::command::Command;
use crate::status::{Status, TRANSFER_MARKS};
use crate::types::{FtpError, FtpResult, Response};

/// The intermediate replies a command may receive before its final status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedMarks {
    /// Reply codes accepted as transfer-start acknowledgments
    pub marks: Vec<u32>,
    /// Reply code which, once a mark has been accepted, closes the command instead of being delivered
    pub ignore_code: Option<u32>,
}

impl ExpectedMarks {
    /// The marks of a command which transfers bytes on a data connection: `125` or `150`, then `226`
    pub fn transfer() -> Self {
        Self {
            marks: TRANSFER_MARKS.to_vec(),
            ignore_code: Some(226),
        }
    }

    fn expects(&self, code: u32) -> bool {
        self.marks.contains(&code)
    }
}

/// What to do once a command has been finalized
#[derive(Debug)]
pub(crate) enum Completion {
    /// Issued by a caller who is awaiting the result
    Caller {
        done: oneshot::Sender<FtpResult<Response>>,
        on_mark: Option<oneshot::Sender<Response>>,
    },
    /// Issued by the session itself while logging in
    Login,
}

/// A command waiting for its final response
#[derive(Debug)]
pub(crate) struct QueuedCommand {
    command: Command,
    completion: Completion,
    expected_marks: Option<ExpectedMarks>,
    accepted_mark: Option<Response>,
    /// whether a login sequence has already been spliced in front of this command
    login_attempted: bool,
    /// sent right after a `331` to this `USER`, on behalf of the same caller
    password: Option<String>,
}

impl QueuedCommand {
    /// A command whose result is delivered to the caller through `done`
    pub fn caller(command: Command, done: oneshot::Sender<FtpResult<Response>>) -> Self {
        Self {
            command,
            completion: Completion::Caller {
                done,
                on_mark: None,
            },
            expected_marks: None,
            accepted_mark: None,
            login_attempted: false,
            password: None,
        }
    }

    /// A command issued by the session to log in
    pub fn login(command: Command) -> Self {
        Self {
            command,
            completion: Completion::Login,
            expected_marks: None,
            accepted_mark: None,
            login_attempted: false,
            password: None,
        }
    }

    /// Attach the password of an explicit login to its `USER`
    pub fn with_password(mut self, password: String) -> Self {
        self.password = Some(password);
        self
    }

    /// Set the marks the command may receive; `on_mark` is told when one is accepted
    pub fn with_marks(
        mut self,
        marks: ExpectedMarks,
        on_mark: Option<oneshot::Sender<Response>>,
    ) -> Self {
        self.expected_marks = Some(marks);
        if let Completion::Caller { on_mark: slot, .. } = &mut self.completion {
            *slot = on_mark;
        }
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The text written on the control channel for this command
    pub fn action(&self) -> String {
        self.command.to_string()
    }

    pub fn is_login(&self) -> bool {
        matches!(self.completion, Completion::Login)
    }

    pub fn login_attempted(&self) -> bool {
        self.login_attempted
    }

    pub fn set_login_attempted(&mut self, attempted: bool) {
        self.login_attempted = attempted;
    }

    /// Turn a `USER` answered with `331` into the `PASS` of its password, keeping the completion,
    /// so that nothing else is sent between the two. Any other command is handed back.
    pub fn password_step(mut self, response: &Response) -> Result<Self, Self> {
        if matches!(self.command, Command::User(_)) && response.status() == Status::NeedPassword {
            if let Some(password) = self.password.take() {
                return Ok(Self {
                    command: Command::Pass(password),
                    completion: self.completion,
                    expected_marks: None,
                    accepted_mark: None,
                    login_attempted: false,
                    password: None,
                });
            }
        }
        Err(self)
    }

    /// Complete the command with its final response.
    /// Negative replies are delivered as [`FtpError::ProtocolError`].
    pub fn complete(self, response: Response) {
        let result = match response.is_error() {
            true => Err(FtpError::ProtocolError(response)),
            false => Ok(response),
        };
        self.resolve(result);
    }

    /// Complete the command with an error
    pub fn fail(self, err: FtpError) {
        self.resolve(Err(err));
    }

    fn resolve(self, result: FtpResult<Response>) {
        if let Completion::Caller { done, .. } = self.completion {
            if done.send(result).is_err() {
                trace!("result of {} dropped: nobody is waiting", self.command.redacted());
            }
        }
    }

    fn accept_mark(&mut self, response: &Response) {
        if let Completion::Caller { on_mark, .. } = &mut self.completion {
            if let Some(on_mark) = on_mark.take() {
                let _ = on_mark.send(response.clone());
            }
        }
        self.accepted_mark = Some(response.clone());
    }
}

/// What the pipeline did with a response
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The response was not for anybody
    Dropped,
    /// The response was an expected mark; the head is still in flight
    MarkAccepted,
    /// The head has been dequeued; it must be completed with the response
    Finalized(QueuedCommand, Response),
}

/// FIFO of the outstanding commands.
///
/// At most one command is in flight (written and awaiting its final response): it is always
/// the head of the queue.
#[derive(Debug, Default)]
pub(crate) struct Pipeline {
    queue: VecDeque<QueuedCommand>,
    in_flight: bool,
    ignore_code: Option<u32>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn head(&self) -> Option<&QueuedCommand> {
        self.queue.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut QueuedCommand> {
        self.queue.front_mut()
    }

    /// Append a command. Returns the action to write if the pipeline was idle.
    pub fn enqueue(&mut self, command: QueuedCommand) -> Option<String> {
        self.push(command);
        self.advance()
    }

    /// Append a command without sending it
    pub fn push(&mut self, command: QueuedCommand) {
        trace!("enqueued {}", command.command.redacted());
        self.queue.push_back(command);
    }

    /// Put a command in front of the queue. The pipeline must be idle.
    pub fn enqueue_front(&mut self, command: QueuedCommand) {
        debug_assert!(!self.in_flight, "cannot splice in front of a command in flight");
        trace!("spliced {} in front of the queue", command.command.redacted());
        self.queue.push_front(command);
    }

    /// If idle and a command is queued, put the head in flight and return its action
    pub fn advance(&mut self) -> Option<String> {
        if self.in_flight {
            return None;
        }
        let action = self.queue.front()?.action();
        self.in_flight = true;
        Some(action)
    }

    /// Take the head out of flight, as if it had never been written
    pub fn rewind(&mut self) {
        self.in_flight = false;
        self.ignore_code = None;
        if let Some(head) = self.queue.front_mut() {
            head.accepted_mark = None;
        }
    }

    /// Dequeue the commands which were spliced in front of the head to log in.
    /// The pipeline must be idle.
    pub fn drop_login_head(&mut self) {
        while self.queue.front().map(|c| c.is_login()).unwrap_or(false) {
            if let Some(command) = self.queue.pop_front() {
                trace!("dropped {}", command.command.redacted());
            }
        }
    }

    /// Dequeue the head, in flight or not, without a response
    pub fn take_head(&mut self) -> Option<QueuedCommand> {
        self.in_flight = false;
        self.ignore_code = None;
        self.queue.pop_front()
    }

    /// Dequeue the command in flight, if any, without a response
    pub fn take_in_flight(&mut self) -> Option<QueuedCommand> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        self.ignore_code = None;
        self.queue.pop_front()
    }

    /// Correlate a framed response with the command in flight
    pub fn on_response(&mut self, response: Response) -> Outcome {
        if !self.in_flight || response.code == 220 {
            debug!("dropping unsolicited response {response}");
            return Outcome::Dropped;
        }
        let Some(head) = self.queue.front_mut() else {
            debug!("dropping unsolicited response {response}");
            return Outcome::Dropped;
        };

        if self.ignore_code == Some(response.code) {
            self.ignore_code = None;
            trace!("swallowed {} after transfer mark", response.code);
            return match head.accepted_mark.take() {
                Some(mark) => self.finalize(mark),
                None => Outcome::Dropped,
            };
        }

        if response.is_mark() {
            let marks = match head.expected_marks.as_ref() {
                Some(marks) if marks.expects(response.code) => marks.clone(),
                _ => {
                    debug!(
                        "dropping unexpected mark {} for {}",
                        response.code,
                        head.command.redacted()
                    );
                    return Outcome::Dropped;
                }
            };
            trace!("{} accepted mark {}", head.command.redacted(), response.code);
            head.accept_mark(&response);
            self.ignore_code = marks.ignore_code;
            return Outcome::MarkAccepted;
        }

        self.ignore_code = None;
        self.finalize(response)
    }

    /// Fail every queued command
    pub fn fail_all<F>(&mut self, err: F)
    where
        F: Fn() -> FtpError,
    {
        self.in_flight = false;
        self.ignore_code = None;
        for command in self.queue.drain(..) {
            command.fail(err());
        }
    }

    fn finalize(&mut self, response: Response) -> Outcome {
        self.in_flight = false;
        match self.queue.pop_front() {
            Some(head) => Outcome::Finalized(head, response),
            None => Outcome::Dropped,
        }
    }
}
