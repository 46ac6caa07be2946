//! # Driver
//!
//! The task which owns the control connection of a session.
//!
//! It feeds the lines read from the connection to the [`ResponseFramer`] and the framed responses
//! to the [`Pipeline`], writes the commands the pipeline puts in flight, logs in on demand and
//! reconnects when the connection is lost.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};

use super::{Outcome, Pipeline, QueuedCommand};
use crate::command::feat::parse_features;
use crate::command::Command;
use crate::framer::ResponseFramer;
use crate::transport::{ControlConnector, ControlStream};
use crate::types::{Features, FileType, FtpError, FtpResult, Response};
use crate::{FtpConfig, Status};

/// Requests sent by the session handles to the driver
#[derive(Debug)]
pub(crate) enum Request {
    Command(QueuedCommand),
    Destroy,
}

/// State of a session, for the lifetime of one control connection
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub authenticated: bool,
    pub features: Option<Features>,
    pub system: Option<String>,
    pub current_type: Option<FileType>,
    pub welcome: Option<String>,
    pub peer_addr: Option<SocketAddr>,
}

struct Connection {
    reader: BufReader<ReadHalf<Box<dyn ControlStream>>>,
    writer: WriteHalf<Box<dyn ControlStream>>,
}

pub(crate) struct Driver {
    connector: Arc<dyn ControlConnector>,
    user: String,
    password: String,
    requests: mpsc::UnboundedReceiver<Request>,
    state: watch::Sender<SessionState>,
    pipeline: Pipeline,
    framer: ResponseFramer,
    conn: Option<Connection>,
    /// bytes of the line being read
    line: Vec<u8>,
    logging_in: bool,
}

impl Driver {
    /// Open the control connection and start the driver task
    pub async fn spawn(
        config: &FtpConfig,
    ) -> FtpResult<(
        mpsc::UnboundedSender<Request>,
        watch::Receiver<SessionState>,
    )> {
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SessionState::default());
        let mut driver = Self {
            connector: config.control_connector(),
            user: config.user.clone(),
            password: config.password.clone(),
            requests,
            state,
            pipeline: Pipeline::new(),
            framer: ResponseFramer::new(),
            conn: None,
            line: Vec::new(),
            logging_in: false,
        };
        driver.connect().await?;
        tokio::spawn(driver.run());
        Ok((requests_tx, state_rx))
    }

    async fn run(mut self) {
        debug!("session driver started");
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Command(command)) => {
                        self.pipeline.push(command);
                        self.send_next().await;
                    }
                    Some(Request::Destroy) | None => break,
                },
                read = read_line(self.conn.as_mut(), &mut self.line) => {
                    self.on_read(read).await;
                }
            }
        }
        self.destroy().await;
        debug!("session driver stopped");
    }

    async fn on_read(&mut self, read: io::Result<usize>) {
        match read {
            Ok(0) => self.on_disconnect(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )),
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.line).to_string();
                self.line.clear();
                if let Some(response) = self.framer.feed_line(&line) {
                    self.on_response(response);
                }
            }
            Err(err) => self.on_disconnect(err),
        }
        self.send_next().await;
    }

    fn on_response(&mut self, response: Response) {
        if response.status() == Status::Ready {
            self.state
                .send_modify(|state| state.welcome = Some(response.text.clone()));
        }
        if let Outcome::Finalized(command, response) = self.pipeline.on_response(response) {
            self.observe(&command, &response);
            match command.password_step(&response) {
                Ok(pass) => self.pipeline.enqueue_front(pass),
                Err(command) => command.complete(response),
            }
        }
    }

    /// Update the session state with the final response of a command
    fn observe(&mut self, command: &QueuedCommand, response: &Response) {
        let login = command.is_login();
        match command.command() {
            Command::Feat => {
                let features = parse_features(response).unwrap_or_default();
                self.state
                    .send_modify(|state| state.features = Some(features));
            }
            Command::Syst if !response.is_error() => {
                let system = response.text.get(4..).unwrap_or_default().trim().to_string();
                debug!("Remote system is {system}");
                self.state.send_modify(|state| state.system = Some(system));
            }
            Command::Type(file_type) if !response.is_error() => {
                let file_type = *file_type;
                self.state
                    .send_modify(|state| state.current_type = Some(file_type));
            }
            Command::User(_) => match response.status() {
                status if status.is_logged_in() => self.logged_in(),
                Status::NeedPassword if login => {
                    debug!("Password is required");
                    self.pipeline
                        .enqueue_front(QueuedCommand::login(Command::Pass(self.password.clone())));
                }
                Status::NeedPassword => {}
                _ if login => {
                    warn!("login as {} refused: {response}", self.user);
                    self.logging_in = false;
                }
                _ => {}
            },
            Command::Pass(_) => {
                if response.status().is_logged_in() {
                    self.logged_in();
                } else if login {
                    warn!("login as {} refused: {response}", self.user);
                }
                self.logging_in = false;
            }
            _ => {}
        }
    }

    fn logged_in(&mut self) {
        debug!("Login OK");
        self.logging_in = false;
        self.state.send_modify(|state| state.authenticated = true);
    }

    /// Put the next command in flight, if the pipeline is idle
    async fn send_next(&mut self) {
        while !self.pipeline.in_flight() && !self.pipeline.is_empty() {
            if let Err(err) = self.send_head().await {
                error!("failed to send command: {err}");
                self.pipeline.rewind();
                self.pipeline.drop_login_head();
                if let Some(head) = self.pipeline.take_head() {
                    head.fail(err);
                }
            }
        }
    }

    async fn send_head(&mut self) -> FtpResult<()> {
        let fresh = self.conn.is_none();
        if fresh {
            self.connect().await?;
        }
        self.splice_login();
        let Some(action) = self.pipeline.advance() else {
            return Ok(());
        };
        let err = match self.write(&action).await {
            Ok(()) => return Ok(()),
            Err(err) if fresh => return Err(FtpError::ConnectionError(err)),
            Err(err) => err,
        };
        // the connection is gone: reconnect once and replay the head
        warn!("failed to write on control connection: {err}; reconnecting");
        self.teardown();
        self.pipeline.rewind();
        self.pipeline.drop_login_head();
        if let Some(head) = self.pipeline.head_mut() {
            head.set_login_attempted(false);
        }
        self.connect().await?;
        self.splice_login();
        match self.pipeline.advance() {
            Some(action) => self.write(&action).await.map_err(FtpError::ConnectionError),
            None => Ok(()),
        }
    }

    /// Splice feature discovery and login in front of the head, if it needs an authenticated session
    fn splice_login(&mut self) {
        if self.logging_in || self.state.borrow().authenticated {
            return;
        }
        let Some(head) = self.pipeline.head_mut() else {
            return;
        };
        if !requires_login(head.command()) || head.login_attempted() {
            return;
        }
        head.set_login_attempted(true);
        debug!("Signin in with user '{}'", self.user);
        self.pipeline
            .enqueue_front(QueuedCommand::login(Command::User(self.user.clone())));
        self.pipeline.enqueue_front(QueuedCommand::login(Command::Feat));
        self.logging_in = true;
    }

    async fn write(&mut self, action: &str) -> io::Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        match action.get(..5) {
            Some(verb) if verb.eq_ignore_ascii_case("PASS ") => trace!("CC OUT: PASS ******"),
            _ => trace!("CC OUT: {action}"),
        }
        conn.writer
            .write_all(format!("{action}\r\n").as_bytes())
            .await?;
        conn.writer.flush().await
    }

    async fn connect(&mut self) -> FtpResult<()> {
        let stream = self.connector.connect().await?;
        let peer_addr = stream.peer_addr();
        let (reader, writer) = tokio::io::split(stream);
        self.conn = Some(Connection {
            reader: BufReader::new(reader),
            writer,
        });
        self.framer = ResponseFramer::new();
        self.line.clear();
        self.logging_in = false;
        self.state.send_replace(SessionState {
            peer_addr,
            ..Default::default()
        });
        Ok(())
    }

    /// Drop the connection and forget the session state
    fn teardown(&mut self) {
        self.conn = None;
        self.logging_in = false;
        self.state.send_replace(SessionState::default());
    }

    fn on_disconnect(&mut self, err: io::Error) {
        let Some(head) = self.pipeline.take_in_flight() else {
            debug!("control connection closed: {err}");
            self.pipeline.drop_login_head();
            self.teardown();
            return;
        };
        error!(
            "control connection lost while waiting for {}: {err}",
            head.command().redacted()
        );
        let was_login = head.is_login();
        head.fail(FtpError::ConnectionError(err));
        // spliced login commands belong to the connection
        self.pipeline.drop_login_head();
        if was_login {
            // the command which required the login
            if let Some(command) = self.pipeline.take_head() {
                command.fail(FtpError::ConnectionError(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "connection lost while logging in",
                )));
            }
        }
        self.teardown();
    }

    async fn destroy(&mut self) {
        debug!("destroying session");
        self.pipeline.fail_all(|| FtpError::SessionClosed);
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            if let Request::Command(command) = request {
                command.fail(FtpError::SessionClosed);
            }
        }
        if let Some(mut conn) = self.conn.take() {
            if let Err(err) = conn.writer.shutdown().await {
                debug!("failed to shutdown control connection: {err}");
            }
        }
    }
}

/// Whether `command` can only be sent on an authenticated session.
/// QUIT is sent as-is, logged in or not.
fn requires_login(command: &Command) -> bool {
    !command.is_auth() && !matches!(command, Command::Quit)
}

/// Read a line from the connection; pending forever when disconnected
async fn read_line(conn: Option<&mut Connection>, line: &mut Vec<u8>) -> io::Result<usize> {
    match conn {
        Some(conn) => conn.reader.read_until(b'\n', line).await,
        None => std::future::pending().await,
    }
}
