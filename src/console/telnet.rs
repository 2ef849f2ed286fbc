//! Line-oriented console session over raw TCP.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use super::{ConsoleConfigurator, ConsoleEndpoint, ConsoleSettings, InterfaceAddress};
use crate::{Error, Result};

/// An open console connection.
#[derive(Debug)]
pub struct TelnetSession {
    stream: TcpStream,
    endpoint: ConsoleEndpoint,
    settings: ConsoleSettings,
}

impl TelnetSession {
    /// Open a TCP connection to the console.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the connect exceeds `settings.io_timeout`,
    /// [`Error::Io`] if it is refused.
    pub async fn connect(endpoint: &ConsoleEndpoint, settings: ConsoleSettings) -> Result<Self> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        let stream = timeout(settings.io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(format!("connect to console {endpoint}")))??;
        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
            settings,
        })
    }

    /// Wake the console and log in.
    ///
    /// Each step waits for the guest to print something (a prompt) before
    /// sending the next line.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the guest stays silent, [`Error::Io`] if the
    /// connection drops.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.send_line("").await?;
        sleep(self.settings.wake_delay).await;
        self.expect_output("login prompt").await?;

        let username = self.settings.username.clone();
        self.send_line(&username).await?;
        sleep(self.settings.login_step_delay).await;
        self.expect_output("password prompt").await?;

        let password = self.settings.password.clone();
        self.send_line(&password).await?;
        sleep(self.settings.login_step_delay).await;
        self.expect_output("shell prompt").await?;
        Ok(())
    }

    /// Bring the interface up, assign the address, enable remote access.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the connection drops mid-sequence.
    pub async fn configure(&mut self, address: &InterfaceAddress) -> Result<()> {
        let commands = [
            format!("ip link set {} up", address.interface),
            format!("ip addr add {} dev {}", address.cidr(), address.interface),
            format!("systemctl enable --now {}", self.settings.remote_access_service),
        ];
        for command in &commands {
            self.send_command(command).await?;
        }
        Ok(())
    }

    /// Log out and close the connection.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the logout line cannot be written.
    pub async fn close(mut self) -> Result<()> {
        self.send_command("exit").await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    async fn send_command(&mut self, command: &str) -> Result<()> {
        tracing::trace!(console = %self.endpoint, command, "console command");
        self.send_line(command).await?;
        sleep(self.settings.command_delay).await;
        Ok(())
    }

    async fn expect_output(&mut self, what: &str) -> Result<()> {
        let mut buf = [0u8; 1024];
        let n = timeout(self.settings.io_timeout, self.stream.read(&mut buf))
            .await
            .map_err(|_| Error::Timeout(format!("{what} on console {}", self.endpoint)))??;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("console {} closed while waiting for {what}", self.endpoint),
            )));
        }
        Ok(())
    }
}

/// [`ConsoleConfigurator`] that drives a [`TelnetSession`] per call.
#[derive(Debug, Clone, Default)]
pub struct TelnetConsole {
    settings: ConsoleSettings,
}

impl TelnetConsole {
    /// Configurator using the given login and pacing.
    #[must_use]
    pub const fn new(settings: ConsoleSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ConsoleConfigurator for TelnetConsole {
    async fn configure(&self, endpoint: &ConsoleEndpoint, address: &InterfaceAddress) -> Result<()> {
        let mut session = TelnetSession::connect(endpoint, self.settings.clone()).await?;
        session.authenticate().await?;
        session.configure(address).await?;
        session.close().await
    }
}
