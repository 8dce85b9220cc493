use crate::browser::SocksProxy;
use crate::config::ProxyConfig;
use crate::proxy::{find_free_port, CircuitRotator, ProxyError, ProxyResult};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;

const READY_MARKER: &str = "Bootstrapped 100%";
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// A running Tor process with a SOCKS port and an authenticated control port
pub struct TorCircuit {
    child: Mutex<Option<Child>>,
    scratch: std::sync::Mutex<Option<TempDir>>,
    listen_address: String,
    socks_port: u16,
    control_port: u16,
    password: String,
}

impl TorCircuit {
    /// Starts Tor and waits until it reports a complete bootstrap
    ///
    /// On timeout or early exit the process is killed and its scratch
    /// directory removed before the error is returned.
    ///
    /// # Arguments
    ///
    /// * `config` - Executable, listen address, port range and bootstrap timeout
    ///
    /// # Returns
    ///
    /// * `Ok(TorCircuit)` - A bootstrapped process ready for SOCKS traffic
    /// * `Err(ProxyError)` - No free port, spawn failure, early exit or bootstrap timeout
    pub async fn start(config: &ProxyConfig) -> ProxyResult<Self> {
        let address = config.listen_address.as_str();
        let mut taken = HashSet::new();
        let socks_port =
            find_free_port(address, config.port_range_start, config.port_range_end, &taken)
                .await?;
        taken.insert(socks_port);
        let control_port =
            find_free_port(address, config.port_range_start, config.port_range_end, &taken)
                .await?;

        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let hashed = hash_password(&config.tor_command, &password).await?;

        let scratch = tempfile::Builder::new().prefix("tidemark-tor").tempdir()?;
        let torrc = scratch.path().join("torrc");
        let torrc_content = render_torrc(
            address,
            socks_port,
            control_port,
            &hashed,
            &scratch.path().join("data").display().to_string(),
        );
        tokio::fs::write(&torrc, torrc_content).await?;

        tracing::info!(
            "Starting {} (socks {}:{}, control {})",
            config.tor_command,
            address,
            socks_port,
            control_port
        );

        let mut child = Command::new(&config.tor_command)
            .arg("-f")
            .arg(&torrc)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProxyError::Spawn {
                command: config.tor_command.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProxyError::Exited("stdout was not captured".to_string()))?;

        let timeout = config.bootstrap_timeout();
        let ready = tokio::time::timeout(timeout, wait_for_bootstrap(stdout)).await;

        let stdout = match ready {
            Ok(Ok(stdout)) => stdout,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(ProxyError::BootstrapTimeout(timeout.as_secs()));
            }
        };

        // Keep draining stdout so the process never blocks on a full pipe.
        tokio::spawn(async move {
            let mut lines = stdout.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(target: "tor", "{}", line);
            }
        });

        tracing::info!("Tor circuit ready");

        Ok(Self {
            child: Mutex::new(Some(child)),
            scratch: std::sync::Mutex::new(Some(scratch)),
            listen_address: address.to_string(),
            socks_port,
            control_port,
            password,
        })
    }

    /// SOCKS endpoint for the browser
    pub fn socks_proxy(&self) -> SocksProxy {
        SocksProxy {
            host: self.listen_address.clone(),
            port: self.socks_port,
        }
    }

    /// Kills the process and removes its scratch directory
    ///
    /// Safe to call more than once; a process that is already gone is not
    /// an error.
    pub async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            match child.kill().await {
                Ok(()) => tracing::info!("Tor process stopped"),
                Err(e) => tracing::debug!("Tor process already gone: {}", e),
            }
        }

        let scratch = match self.scratch.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(dir) = scratch {
            if let Err(e) = dir.close() {
                tracing::debug!("Failed to remove Tor scratch directory: {}", e);
            }
        }
    }

    /// Sends the renewal commands and hands back the open connection
    async fn send_newnym(&self) -> std::io::Result<TcpStream> {
        let mut stream = TcpStream::connect((self.listen_address.as_str(), self.control_port)).await?;
        let command = format!(
            "AUTHENTICATE \"{}\"\r\nSIGNAL NEWNYM\r\nQUIT\r\n",
            self.password
        );
        stream.write_all(command.as_bytes()).await?;
        Ok(stream)
    }
}

#[async_trait]
impl CircuitRotator for TorCircuit {
    /// Asks Tor for a new circuit without waiting for its answer
    ///
    /// The control reply is read and logged by a background task.
    async fn renew(&self) {
        if self.child.lock().await.is_none() {
            tracing::warn!("Cannot renew circuit: Tor is not running");
            return;
        }

        match tokio::time::timeout(CONTROL_TIMEOUT, self.send_newnym()).await {
            Ok(Ok(stream)) => {
                tracing::info!("Requested a new Tor circuit");
                tokio::spawn(log_control_reply(stream));
            }
            Ok(Err(e)) => tracing::warn!("Failed to renew Tor circuit: {}", e),
            Err(_) => tracing::warn!("Timed out reaching the Tor control port"),
        }
    }
}

/// Reads the control port's answer to a renewal and logs it
async fn log_control_reply(mut stream: TcpStream) {
    let mut reply = String::new();
    let read = tokio::time::timeout(CONTROL_TIMEOUT, stream.read_to_string(&mut reply)).await;

    match read {
        Ok(Ok(_)) if renewal_accepted(&reply) => tracing::debug!("Tor accepted circuit renewal"),
        Ok(Ok(_)) => tracing::warn!("Tor refused circuit renewal: {}", reply.trim()),
        Ok(Err(e)) => tracing::warn!("Failed to read Tor control reply: {}", e),
        Err(_) => tracing::debug!("No reply from the Tor control port within {:?}", CONTROL_TIMEOUT),
    }
}

/// True when both the authentication and the signal were acknowledged
fn renewal_accepted(reply: &str) -> bool {
    reply.lines().filter(|l| l.starts_with("250")).count() >= 2
}

/// Reads process output until the bootstrap marker shows up
async fn wait_for_bootstrap(stdout: ChildStdout) -> ProxyResult<BufReader<ChildStdout>> {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ProxyError::Exited(
                "output closed before bootstrap completed".to_string(),
            ));
        }
        tracing::debug!(target: "tor", "{}", line.trim_end());
        if line.contains(READY_MARKER) {
            return Ok(reader);
        }
    }
}

/// Asks tor itself to hash the control password
async fn hash_password(tor_command: &str, password: &str) -> ProxyResult<String> {
    let output = Command::new(tor_command)
        .arg("--hash-password")
        .arg(password)
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|source| ProxyError::Spawn {
            command: tor_command.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_hashed_password(&stdout).ok_or_else(|| {
        ProxyError::Exited(format!(
            "'{} --hash-password' printed no hash (status {})",
            tor_command, output.status
        ))
    })
}

fn parse_hashed_password(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("16:"))
        .last()
        .map(str::to_string)
}

fn render_torrc(
    address: &str,
    socks_port: u16,
    control_port: u16,
    hashed_password: &str,
    data_dir: &str,
) -> String {
    format!(
        "SocksPort {address}:{socks_port}\n\
         ControlPort {address}:{control_port}\n\
         HashedControlPassword {hashed_password}\n\
         DataDirectory {data_dir}\n\
         Log notice stdout\n"
    )
}
