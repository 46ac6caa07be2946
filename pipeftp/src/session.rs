//! # Session
//!
//! The public API of the engine: [`FtpSession`] issues commands through the pipeline of its
//! control connection and opens the data connections of the transfers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};

use crate::command::feat::parse_features;
use crate::command::Command;
use crate::list::{parse_listing, File};
use crate::passive::open_data_channel;
use crate::pipeline::driver::{Driver, Request, SessionState};
use crate::pipeline::{ExpectedMarks, QueuedCommand};
use crate::regex::SIZE_RE;
use crate::types::{Features, FileType};
use crate::{FtpConfig, FtpError, FtpResult, Response, Status, Transfer};

/// Handle of an FTP session.
///
/// Handles are cheap to clone and share the same control connection. Commands issued through
/// any of them are written one at a time and complete in the order they have been issued.
/// The session logs in by itself before the first command which requires it.
///
/// Only one data connection at a time is supported: transfers must be serialized, finishing a
/// [`Transfer`] before starting the next one.
#[derive(Debug, Clone)]
pub struct FtpSession {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<SessionState>,
    pub(crate) config: Arc<FtpConfig>,
    use_list: Arc<AtomicBool>,
    pub(crate) data_channel_open: Arc<AtomicBool>,
}

impl FtpSession {
    /// Open the control connection described by `config`
    pub async fn connect(config: FtpConfig) -> FtpResult<Self> {
        debug!("Connecting to {}:{}", config.host, config.port);
        let (requests, state) = Driver::spawn(&config).await?;
        Ok(Self {
            requests,
            state,
            use_list: Arc::new(AtomicBool::new(config.use_list)),
            config: Arc::new(config),
            data_channel_open: Arc::new(AtomicBool::new(false)),
        })
    }

    // -- state

    /// The welcome message sent by the server, once received
    pub fn welcome(&self) -> Option<String> {
        self.state.borrow().welcome.clone()
    }

    /// Whether the session is logged in
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated
    }

    /// The features announced by the server, once FEAT has been answered
    pub fn features(&self) -> Option<Features> {
        self.state.borrow().features.clone()
    }

    /// The system type of the server, once SYST has been answered
    pub fn system(&self) -> Option<String> {
        self.state.borrow().system.clone()
    }

    /// The transfer type currently set on the server
    pub fn current_type(&self) -> Option<FileType> {
        self.state.borrow().current_type
    }

    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.state.borrow().peer_addr
    }

    // -- commands

    /// Send a raw command; the final reply is returned whatever its code
    pub async fn raw(&self, command: impl ToString) -> FtpResult<Response> {
        let command = command.to_string();
        debug!("Sending custom command {}", command.split_whitespace().next().unwrap_or_default());
        match self.execute(Command::Custom(command)).await {
            Err(FtpError::ProtocolError(response)) => Ok(response),
            result => result,
        }
    }

    /// Log in with `user` and `password`, instead of the credentials of the configuration
    pub async fn login(&self, user: impl ToString, password: impl ToString) -> FtpResult<()> {
        let user = user.to_string();
        debug!("logging in as {user}");
        // the driver answers a 331 with PASS itself, before any other queued command
        let (done, result) = oneshot::channel();
        self.send(
            QueuedCommand::caller(Command::User(user.clone()), done)
                .with_password(password.to_string()),
        )?;
        result.await.map_err(|_| FtpError::SessionClosed)??;
        debug!("logged in as {user}");
        Ok(())
    }

    /// Ask the server for its extensions (FEAT); the result is also kept in the session state
    pub async fn feat(&self) -> FtpResult<Features> {
        debug!("requesting server features");
        let response = self.execute(Command::Feat).await?;
        parse_features(&response)
    }

    /// Get the system type of the server
    pub async fn syst(&self) -> FtpResult<String> {
        debug!("Getting system type");
        let response = self.execute(Command::Syst).await?;
        Ok(response.text.get(4..).unwrap_or_default().trim().to_string())
    }

    /// Sets the type of file to be transferred. Nothing is sent if the type is already set.
    pub async fn transfer_type(&self, file_type: FileType) -> FtpResult<()> {
        if self.current_type() == Some(file_type) {
            trace!("transfer type is already {file_type}");
            return Ok(());
        }
        debug!("Setting transfer type {file_type}");
        self.execute(Command::Type(file_type)).await.map(|_| ())
    }

    /// Working directory, as quoted in the 257 reply
    pub async fn pwd(&self) -> FtpResult<String> {
        debug!("requesting working directory");
        let response = self.execute(Command::Pwd).await?;
        let body = response.text.as_str();
        match (body.find('"'), body.rfind('"')) {
            (Some(begin), Some(end)) if begin < end => Ok(body[begin + 1..end].to_string()),
            _ => Err(FtpError::BadResponse),
        }
    }

    /// Change the working directory
    pub async fn cwd(&self, path: impl AsRef<str>) -> FtpResult<()> {
        debug!("CWD {}", path.as_ref());
        self.execute(Command::Cwd(path.as_ref().to_string()))
            .await
            .map(|_| ())
    }

    /// Change the working directory to its parent
    pub async fn cdup(&self) -> FtpResult<()> {
        debug!("CDUP");
        self.execute(Command::Cdup).await.map(|_| ())
    }

    /// Create a directory
    pub async fn mkdir(&self, pathname: impl AsRef<str>) -> FtpResult<()> {
        debug!("MKD {}", pathname.as_ref());
        self.execute(Command::Mkd(pathname.as_ref().to_string()))
            .await
            .map(|_| ())
    }

    /// Remove a directory; servers usually refuse it when not empty
    pub async fn rmdir(&self, pathname: impl AsRef<str>) -> FtpResult<()> {
        debug!("RMD {}", pathname.as_ref());
        self.execute(Command::Rmd(pathname.as_ref().to_string()))
            .await
            .map(|_| ())
    }

    /// Delete a file
    pub async fn rm(&self, filename: impl AsRef<str>) -> FtpResult<()> {
        debug!("DELE {}", filename.as_ref());
        self.execute(Command::Dele(filename.as_ref().to_string()))
            .await
            .map(|_| ())
    }

    /// Rename with RNFR + RNTO. The two commands are queued back to back, but another handle
    /// may still issue a command in between
    pub async fn rename(&self, from_name: impl AsRef<str>, to_name: impl AsRef<str>) -> FtpResult<()> {
        debug!("RNFR {} RNTO {}", from_name.as_ref(), to_name.as_ref());
        self.execute(Command::RenameFrom(from_name.as_ref().to_string()))
            .await?;
        self.execute(Command::RenameTo(to_name.as_ref().to_string()))
            .await
            .map(|_| ())
    }

    /// Size in bytes reported by SIZE
    pub async fn size(&self, pathname: impl AsRef<str>) -> FtpResult<u64> {
        debug!("SIZE {}", pathname.as_ref());
        let response = self
            .execute(Command::Size(pathname.as_ref().to_string()))
            .await?;
        SIZE_RE
            .captures(&response.text)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or(FtpError::BadResponse)
    }

    /// Keepalive
    pub async fn noop(&self) -> FtpResult<()> {
        debug!("NOOP");
        self.execute(Command::Noop).await.map(|_| ())
    }

    // -- listing

    /// Get the detailed listing of `pathname` (the working directory if omitted), one raw line per entry.
    ///
    /// The listing is asked with `STAT` on the control connection. If the server doesn't
    /// implement it, the session switches to `LIST` over a data connection for good.
    pub async fn list(&self, pathname: Option<&str>) -> FtpResult<Vec<String>> {
        debug!("listing {}", pathname.unwrap_or("working directory"));
        if !self.use_list.load(Ordering::Acquire) {
            let path = pathname.unwrap_or(".").to_string();
            match self.execute(Command::Stat(Some(path))).await {
                Ok(response) => return Ok(stat_body(&response)),
                Err(FtpError::ProtocolError(response))
                    if matches!(
                        response.status(),
                        Status::BadCommand | Status::NotImplemented
                    ) =>
                {
                    warn!("STAT is not supported ({response}); listing with LIST");
                    self.use_list.store(true, Ordering::Release);
                }
                Err(err) => return Err(err),
            }
        }
        self.stream_lines(Command::List(pathname.map(|x| x.to_string())))
            .await
    }

    /// Get the parsed listing of `pathname` (the working directory if omitted)
    pub async fn ls(&self, pathname: Option<&str>) -> FtpResult<Vec<File>> {
        let lines = self.list(pathname).await?;
        Ok(parse_listing(&lines.join("\n")))
    }

    /// Names only, via NLST over a data connection
    pub async fn nlst(&self, pathname: Option<&str>) -> FtpResult<Vec<String>> {
        debug!("NLST {}", pathname.unwrap_or("working directory"));
        self.stream_lines(Command::Nlst(pathname.map(|x| x.to_string())))
            .await
    }

    // -- transfers

    /// Start downloading `file_name`; read the content from the returned transfer.
    /// Once the file has been read, call [`Transfer::finish`] (or `finalize_retr_stream()`)
    pub async fn retr_as_stream(&self, file_name: impl AsRef<str>) -> FtpResult<Transfer> {
        debug!("RETR {}", file_name.as_ref());
        self.data_command(Command::Retr(file_name.as_ref().to_string()))
            .await
    }

    /// Close a download started with [`FtpSession::retr_as_stream`] and wait for its outcome
    pub async fn finalize_retr_stream(&self, transfer: Transfer) -> FtpResult<()> {
        debug!("closing download");
        transfer.finish().await.map(|_| ())
    }

    /// Start storing `filename` on the server; the content is written to the returned transfer.
    /// Once written, call [`Transfer::finish`] (or `finalize_put_stream()`)
    pub async fn put_with_stream(&self, filename: impl AsRef<str>) -> FtpResult<Transfer> {
        debug!("STOR {}", filename.as_ref());
        self.data_command(Command::Store(filename.as_ref().to_string()))
            .await
    }

    /// Start appending to `filename` on the server
    pub async fn append_with_stream(&self, filename: impl AsRef<str>) -> FtpResult<Transfer> {
        debug!("APPE {}", filename.as_ref());
        self.data_command(Command::Appe(filename.as_ref().to_string()))
            .await
    }

    /// Close an upload and wait for the server to confirm it
    pub async fn finalize_put_stream(&self, transfer: Transfer) -> FtpResult<()> {
        debug!("closing upload");
        transfer.finish().await.map(|_| ())
    }

    /// Download `file_name` into `writer`. Returns the amount of bytes written
    pub async fn retr<W>(&self, file_name: impl AsRef<str>, writer: &mut W) -> FtpResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut transfer = self.retr_as_stream(file_name).await?;
        let copied = tokio::io::copy(&mut transfer, writer).await;
        transfer.finish().await?;
        let copied = copied.map_err(FtpError::ConnectionError)?;
        trace!("retrieved {copied} bytes");
        Ok(copied)
    }

    /// Upload the content of `reader` as `filename`. Returns the amount of bytes written
    pub async fn put_file<R>(&self, filename: impl AsRef<str>, reader: &mut R) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut transfer = self.put_with_stream(filename).await?;
        let copied = tokio::io::copy(reader, &mut transfer).await;
        transfer.finish().await?;
        let copied = copied.map_err(FtpError::ConnectionError)?;
        trace!("stored {copied} bytes");
        Ok(copied)
    }

    // -- teardown

    /// Say goodbye with QUIT, then destroy the session
    pub async fn quit(&self) -> FtpResult<()> {
        debug!("QUIT");
        let result = self.execute(Command::Quit).await.map(|_| ());
        self.destroy();
        result
    }

    /// Close the control connection. Commands still queued fail with [`FtpError::SessionClosed`].
    pub fn destroy(&self) {
        if self.requests.send(Request::Destroy).is_err() {
            trace!("session already closed");
        }
    }

    // -- private

    /// Issue `command` and wait for its final reply
    pub(crate) async fn execute(&self, command: Command) -> FtpResult<Response> {
        let (done, result) = oneshot::channel();
        self.send(QueuedCommand::caller(command, done))?;
        result.await.map_err(|_| FtpError::SessionClosed)?
    }

    fn send(&self, command: QueuedCommand) -> FtpResult<()> {
        self.requests
            .send(Request::Command(command))
            .map_err(|_| FtpError::SessionClosed)
    }

    /// Open a data connection, then issue `command` and wait for the transfer to start
    async fn data_command(&self, command: Command) -> FtpResult<Transfer> {
        let channel = open_data_channel(self).await?;
        let (done, mut result) = oneshot::channel();
        let (on_mark, mark) = oneshot::channel();
        self.send(
            QueuedCommand::caller(command, done).with_marks(ExpectedMarks::transfer(), Some(on_mark)),
        )?;
        match tokio::time::timeout(self.config.data_timeout, mark).await {
            Ok(Ok(mark)) => {
                trace!("transfer started: {mark}");
                Ok(Transfer::started(channel, result))
            }
            // completed without a mark
            Ok(Err(_)) => match (&mut result).await {
                Ok(Ok(response)) => Ok(Transfer::completed(channel, response)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(FtpError::SessionClosed),
            },
            Err(_) => {
                error!("transfer didn't start within {:?}", self.config.data_timeout);
                Err(FtpError::Timeout)
            }
        }
    }

    /// Run a transfer command and read the data connection line by line
    async fn stream_lines(&self, command: Command) -> FtpResult<Vec<String>> {
        let mut transfer = self.data_command(command).await?;
        let mut body = Vec::new();
        let read = transfer.read_to_end(&mut body).await;
        transfer.finish().await?;
        read.map_err(FtpError::ConnectionError)?;
        let lines: Vec<String> = String::from_utf8_lossy(&body)
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect();
        trace!("Lines from stream {lines:?}");
        Ok(lines)
    }
}

/// The lines of a `STAT` reply, without the opening and closing reply lines
fn stat_body(response: &Response) -> Vec<String> {
    let lines: Vec<&str> = response.lines().collect();
    match lines.len() {
        0..=2 => Vec::new(),
        n => lines[1..n - 1]
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.strip_prefix(' ').unwrap_or(*line).to_string())
            .collect(),
    }
}

#[cfg(test)]
mod test {

    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::test_server::TestServer;

    async fn connect(server: &TestServer) -> (FtpSession, crate::test_server::ScriptedPeer<tokio::net::TcpStream>) {
        let session = FtpSession::connect(server.config()).await.unwrap();
        let mut peer = server.accept().await;
        peer.reply("220 Service ready").await;
        (session, peer)
    }

    #[tokio::test]
    async fn should_connect_and_login_on_demand() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (pwd, _) = tokio::join!(session.pwd(), async {
            peer.login().await;
            peer.expect("PWD").await;
            peer.reply("257 \"/pub\" is current directory").await;
        });
        assert_eq!(pwd.unwrap().as_str(), "/pub");
        assert!(session.is_authenticated());
        assert_eq!(session.welcome().as_deref(), Some("220 Service ready"));
        assert_eq!(session.features(), Some(Features::new()));
    }

    #[tokio::test]
    async fn should_login_explicitly() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (login, _) = tokio::join!(session.login("deploy", "s3cr3t"), async {
            peer.expect("USER deploy").await;
            peer.reply("331 Password required").await;
            peer.expect("PASS s3cr3t").await;
            peer.reply("230 Logged in").await;
        });
        assert!(login.is_ok());
        assert!(session.is_authenticated());
        // no login is spliced anymore
        let (noop, _) = tokio::join!(session.noop(), async {
            peer.expect("NOOP").await;
            peer.reply("200 NOOP ok").await;
        });
        assert!(noop.is_ok());
    }

    #[tokio::test]
    async fn should_send_password_before_commands_of_other_handles() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let other = session.clone();
        let (login, pwd, _) = tokio::join!(session.login("deploy", "s3cr3t"), other.pwd(), async {
            peer.expect("USER deploy").await;
            peer.reply("331 Password required").await;
            peer.expect("PASS s3cr3t").await;
            peer.reply("230 Logged in").await;
            // already authenticated: no login spliced in front of PWD
            peer.expect("PWD").await;
            peer.reply("257 \"/home/deploy\" is current directory").await;
        });
        assert!(login.is_ok());
        assert_eq!(pwd.unwrap().as_str(), "/home/deploy");
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn should_fail_login_with_bad_credentials() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (login, _) = tokio::join!(session.login("deploy", "wrong"), async {
            peer.expect("USER deploy").await;
            peer.reply("331 Password required").await;
            peer.expect("PASS wrong").await;
            peer.reply("530 Login incorrect").await;
        });
        assert!(matches!(
            login,
            Err(FtpError::ProtocolError(Response { code: 530, .. }))
        ));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn should_run_simple_commands() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let client = async {
            session.cwd("/pub").await.unwrap();
            session.cdup().await.unwrap();
            session.mkdir("docs").await.unwrap();
            session.rmdir("docs").await.unwrap();
            session.rm("a.txt").await.unwrap();
            session.rename("b.txt", "c.txt").await.unwrap();
            assert_eq!(session.size("c.txt").await.unwrap(), 1024);
            session.noop().await.unwrap();
        };
        let server = async {
            peer.login().await;
            peer.expect("CWD /pub").await;
            peer.reply("250 OK").await;
            peer.expect("CDUP").await;
            peer.reply("200 OK").await;
            peer.expect("MKD docs").await;
            peer.reply("257 \"docs\" created").await;
            peer.expect("RMD docs").await;
            peer.reply("250 Removed").await;
            peer.expect("DELE a.txt").await;
            peer.reply("250 Deleted").await;
            peer.expect("RNFR b.txt").await;
            peer.reply("350 Ready for destination name").await;
            peer.expect("RNTO c.txt").await;
            peer.reply("250 Renamed").await;
            peer.expect("SIZE c.txt").await;
            peer.reply("213 1024").await;
            peer.expect("NOOP").await;
            peer.reply("200 NOOP ok").await;
        };
        tokio::join!(client, server);
    }

    #[tokio::test]
    async fn should_complete_pipelined_commands_in_order() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let other = session.clone();
        let (first, second, _) = tokio::join!(session.mkdir("a"), other.mkdir("b"), async {
            peer.login().await;
            peer.expect("MKD a").await;
            peer.reply("550 Can't create directory: File exists").await;
            peer.expect("MKD b").await;
            peer.reply("257 \"b\" created").await;
        });
        assert!(matches!(
            first,
            Err(FtpError::ProtocolError(Response { code: 550, .. }))
        ));
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn should_get_system_and_features() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (syst, feat, _) = tokio::join!(session.syst(), session.feat(), async {
            peer.expect("SYST").await;
            peer.reply("215 UNIX Type: L8").await;
            peer.expect("FEAT").await;
            peer.reply("211-Features:\r\n MDTM\r\n REST STREAM\r\n211 End").await;
        });
        assert_eq!(syst.unwrap().as_str(), "UNIX Type: L8");
        assert_eq!(session.system().as_deref(), Some("UNIX Type: L8"));
        let feat = feat.unwrap();
        assert_eq!(feat.get("MDTM"), Some(&None));
        assert_eq!(feat.get("REST"), Some(&Some("STREAM".to_string())));
    }

    #[tokio::test]
    async fn should_skip_transfer_type_when_already_set() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (ty, _) = tokio::join!(session.transfer_type(FileType::Binary), async {
            peer.login().await;
            peer.expect("TYPE I").await;
            peer.reply("200 Type set to I").await;
        });
        ty.unwrap();
        assert_eq!(session.current_type(), Some(FileType::Binary));
        // nothing is sent
        session.transfer_type(FileType::Binary).await.unwrap();
        let (noop, _) = tokio::join!(session.noop(), async {
            peer.expect("NOOP").await;
            peer.reply("200 NOOP ok").await;
        });
        noop.unwrap();
    }

    #[tokio::test]
    async fn should_return_raw_replies() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (response, _) = tokio::join!(session.raw("SITE CHMOD 755 a.sh"), async {
            peer.login().await;
            peer.expect("SITE CHMOD 755 a.sh").await;
            peer.reply("550 Permission denied").await;
        });
        assert_eq!(response.unwrap().code, 550);
    }

    #[tokio::test]
    async fn should_reject_malformed_pwd() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (pwd, _) = tokio::join!(session.pwd(), async {
            peer.login().await;
            peer.expect("PWD").await;
            peer.reply("257 /pub").await;
        });
        assert!(matches!(pwd, Err(FtpError::BadResponse)));
    }

    #[tokio::test]
    async fn should_list_with_stat() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (files, _) = tokio::join!(session.ls(Some("/pub")), async {
            peer.login().await;
            peer.expect("STAT /pub").await;
            peer.reply(
                "213-Status of /pub:\r\n\
                 -rw-r--r-- 1 ftp ftp 1024 Nov 5 2018 readme.txt\r\n\
                 drwxr-xr-x 2 ftp ftp 4096 Nov 5 2018 docs\r\n\
                 213 End of status",
            )
            .await;
        });
        let files = files.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name(), "readme.txt");
        assert_eq!(files[0].size(), 1024);
        assert!(files[1].is_directory());
    }

    #[tokio::test]
    async fn should_fall_back_to_list() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (data_listener, pasv) = TestServer::passive().await;
        let (lines, _) = tokio::join!(session.list(None), async {
            peer.login().await;
            peer.expect("STAT .").await;
            peer.reply("502 Command not implemented").await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (mut data, _) = data_listener.accept().await.unwrap();
            peer.expect("LIST").await;
            peer.reply("150 Here comes the directory listing").await;
            data.write_all(b"-rw-r--r-- 1 ftp ftp 1024 Nov 5 2018 readme.txt\r\n")
                .await
                .unwrap();
            drop(data);
            peer.reply("226 Directory send OK").await;
        });
        assert_eq!(
            lines.unwrap(),
            vec!["-rw-r--r-- 1 ftp ftp 1024 Nov 5 2018 readme.txt".to_string()]
        );
        assert!(session.use_list.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn should_get_names_with_nlst() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (data_listener, pasv) = TestServer::passive().await;
        let (names, _) = tokio::join!(session.nlst(Some("/pub")), async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (mut data, _) = data_listener.accept().await.unwrap();
            peer.expect("NLST /pub").await;
            peer.reply("125 Data connection already open").await;
            data.write_all(b"a.txt\r\nb.txt\r\n").await.unwrap();
            drop(data);
            peer.reply("226 Transfer complete").await;
        });
        assert_eq!(
            names.unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn should_retrieve_file() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (data_listener, pasv) = TestServer::passive().await;
        let mut content = Vec::new();
        let (copied, _) = tokio::join!(session.retr("a.txt", &mut content), async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (mut data, _) = data_listener.accept().await.unwrap();
            peer.expect("RETR a.txt").await;
            peer.reply("150 Opening BINARY mode data connection").await;
            data.write_all(b"hello world").await.unwrap();
            drop(data);
            peer.reply("226 Transfer complete").await;
        });
        assert_eq!(copied.unwrap(), 11);
        assert_eq!(content.as_slice(), b"hello world");
        // the data channel is free again
        assert!(!session.data_channel_open.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn should_store_file() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (data_listener, pasv) = TestServer::passive().await;
        let mut reader: &[u8] = b"hello world";
        let (copied, received) = tokio::join!(session.put_file("a.txt", &mut reader), async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (mut data, _) = data_listener.accept().await.unwrap();
            peer.expect("STOR a.txt").await;
            peer.reply("150 Ok to send data").await;
            let mut received = Vec::new();
            data.read_to_end(&mut received).await.unwrap();
            peer.reply("226 Transfer complete").await;
            received
        });
        assert_eq!(copied.unwrap(), 11);
        assert_eq!(received.as_slice(), b"hello world");
    }

    #[tokio::test]
    async fn should_finish_transfer_with_the_mark() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (data_listener, pasv) = TestServer::passive().await;
        let client = async {
            let mut transfer = session.append_with_stream("log.txt").await.unwrap();
            transfer.write_all(b"line\n").await.unwrap();
            let response = transfer.finish().await.unwrap();
            assert_eq!(response.code, 150);
            // the 226 has been swallowed: the next command gets its own reply
            session.noop().await.unwrap();
        };
        let server = async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (mut data, _) = data_listener.accept().await.unwrap();
            peer.expect("APPE log.txt").await;
            peer.reply("150 Ok to send data").await;
            let mut received = Vec::new();
            data.read_to_end(&mut received).await.unwrap();
            peer.reply("226 Transfer complete").await;
            peer.expect("NOOP").await;
            peer.reply("200 NOOP ok").await;
        };
        tokio::join!(client, server);
    }

    #[tokio::test]
    async fn should_fail_refused_transfer() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (data_listener, pasv) = TestServer::passive().await;
        let (transfer, _data) = tokio::join!(session.retr_as_stream("missing.txt"), async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (data, _) = data_listener.accept().await.unwrap();
            peer.expect("RETR missing.txt").await;
            peer.reply("550 No such file").await;
            data
        });
        assert!(matches!(
            transfer,
            Err(FtpError::ProtocolError(Response { code: 550, .. }))
        ));
        assert!(!session.data_channel_open.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn should_time_out_idle_transfer() {
        crate::log_init();
        let server = TestServer::bind().await;
        let session = FtpSession::connect(server.config().data_timeout(Duration::from_millis(200)))
            .await
            .unwrap();
        let mut peer = server.accept().await;
        let (data_listener, pasv) = TestServer::passive().await;
        let client = async {
            let mut transfer = session.retr_as_stream("a.txt").await.unwrap();
            let mut buf = Vec::new();
            let err = transfer.read_to_end(&mut buf).await.unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
            assert!(matches!(transfer.finish().await, Err(FtpError::Timeout)));
        };
        let server = async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (data, _) = data_listener.accept().await.unwrap();
            peer.expect("RETR a.txt").await;
            peer.reply("150 Opening BINARY mode data connection").await;
            data
        };
        let (_, _data) = tokio::join!(client, server);
    }

    #[tokio::test]
    async fn should_reject_second_data_channel() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (data_listener, pasv) = TestServer::passive().await;
        let (transfer, _data) = tokio::join!(session.retr_as_stream("a.txt"), async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (data, _) = data_listener.accept().await.unwrap();
            peer.expect("RETR a.txt").await;
            peer.reply("150 Opening BINARY mode data connection").await;
            data
        });
        let transfer = transfer.unwrap();
        assert!(matches!(
            session.retr_as_stream("b.txt").await,
            Err(FtpError::DataConnectionAlreadyOpen)
        ));
        drop(transfer);
        assert!(!session.data_channel_open.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn should_reject_unexpected_pasv_reply() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (transfer, _) = tokio::join!(session.retr_as_stream("a.txt"), async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply("200 Whatever").await;
        });
        assert!(matches!(
            transfer,
            Err(FtpError::ProtocolError(Response { code: 200, .. }))
        ));
        let (transfer, _) = tokio::join!(session.retr_as_stream("a.txt"), async {
            peer.expect("PASV").await;
            peer.reply("227 Entering Passive Mode").await;
        });
        assert!(matches!(transfer, Err(FtpError::BadResponse)));
    }

    #[tokio::test]
    async fn should_use_control_address_with_nat_workaround() {
        crate::log_init();
        let server = TestServer::bind().await;
        let session = FtpSession::connect(server.config().passive_nat_workaround(true))
            .await
            .unwrap();
        let mut peer = server.accept().await;
        let (data_listener, _) = TestServer::passive().await;
        let port = data_listener.local_addr().unwrap().port();
        let pasv = format!(
            "227 Entering Passive Mode (10,0,0,1,{},{})",
            port >> 8,
            port & 255
        );
        let mut content = Vec::new();
        let (copied, _) = tokio::join!(session.retr("a.txt", &mut content), async {
            peer.login().await;
            peer.expect("PASV").await;
            peer.reply(&pasv).await;
            let (mut data, _) = data_listener.accept().await.unwrap();
            peer.expect("RETR a.txt").await;
            peer.reply("150 Opening BINARY mode data connection").await;
            data.write_all(b"nat").await.unwrap();
            drop(data);
            peer.reply("226 Transfer complete").await;
        });
        assert_eq!(copied.unwrap(), 3);
    }

    #[tokio::test]
    async fn should_quit() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let (quit, _) = tokio::join!(session.quit(), async {
            peer.expect("QUIT").await;
            peer.reply("221 Goodbye").await;
        });
        assert!(quit.is_ok());
        assert!(matches!(session.noop().await, Err(FtpError::SessionClosed)));
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn should_fail_pending_commands_on_destroy() {
        crate::log_init();
        let server = TestServer::bind().await;
        let (session, mut peer) = connect(&server).await;
        let other = session.clone();
        let (pwd, _) = tokio::join!(session.pwd(), async {
            peer.login().await;
            peer.expect("PWD").await;
            other.destroy();
        });
        assert!(matches!(pwd, Err(FtpError::SessionClosed)));
    }

    #[test]
    fn should_strip_stat_reply_lines() {
        let response = Response::multiline(
            213,
            &[
                "213-Status of /:".to_string(),
                " -rw-r--r-- 1 ftp ftp 0 Nov 5 2018 a".to_string(),
                "213 End".to_string(),
            ],
        );
        assert_eq!(
            stat_body(&response),
            vec!["-rw-r--r-- 1 ftp ftp 0 Nov 5 2018 a".to_string()]
        );
        assert!(stat_body(&Response::new(213, "213 No such file")).is_empty());
    }

    #[test]
    fn should_keep_stat_continuation_spacing() {
        let response = Response::multiline(
            213,
            &[
                "213-Status of /:".to_string(),
                " -rw-r--r-- 1 ftp ftp 0 Nov 5 2018 quarterly".to_string(),
                "  report.txt".to_string(),
                "213 End".to_string(),
            ],
        );
        let body = stat_body(&response);
        assert_eq!(body[1].as_str(), " report.txt");
        let files = parse_listing(&body.join("\n"));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "quarterly report.txt");
    }
}
