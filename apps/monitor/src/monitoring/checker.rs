use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tokio::time::timeout;

use crate::config::{MonitorTarget, SshParams, TargetKind};
use crate::monitoring::types::CheckResult;

/// Executes a single health check against one target. Purely functional
/// given its inputs; all failures come back as data (`down` results), never
/// as errors.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &MonitorTarget, timeout: Duration) -> CheckResult;
}

/// Production prober: HTTP GET for `http` targets, an SSH session with a
/// trivial remote command for `ssh` targets.
pub struct NetProber {
    client: reqwest::Client,
}

impl NetProber {
    pub fn new() -> Result<Self> {
        // Home-lab services commonly sit behind self-signed certificates, so
        // certificate validation is deliberately relaxed.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }

    async fn probe_http(&self, url: &str, timeout: Duration) -> CheckResult {
        let start = Instant::now();

        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let elapsed = start.elapsed().as_millis() as u64;
                let code = response.status().as_u16();
                // 2xx and 3xx count as up; redirects were already followed.
                if response.status().is_success() || response.status().is_redirection() {
                    CheckResult::up(elapsed, code)
                } else {
                    CheckResult::down(elapsed, code, format!("HTTP status {code}"))
                }
            }
            Err(e) => {
                let elapsed = start.elapsed().as_millis() as u64;
                if e.is_timeout() {
                    CheckResult::down(elapsed, 0, "Timeout")
                } else {
                    CheckResult::down(elapsed, 0, format!("HTTP request failed: {e}"))
                }
            }
        }
    }

    async fn probe_ssh(&self, ssh: &SshParams, limit: Duration) -> CheckResult {
        let start = Instant::now();

        match timeout(limit, run_ssh_check(ssh)).await {
            Ok(Ok(())) => CheckResult::up(start.elapsed().as_millis() as u64, 0),
            Ok(Err(e)) => {
                CheckResult::down(start.elapsed().as_millis() as u64, 0, format!("SSH check failed: {e:#}"))
            }
            Err(_) => CheckResult::down(start.elapsed().as_millis() as u64, 0, "Timeout"),
        }
    }
}

#[async_trait::async_trait]
impl Prober for NetProber {
    async fn probe(&self, target: &MonitorTarget, timeout: Duration) -> CheckResult {
        match target.kind {
            TargetKind::Http => match target.url.as_deref().filter(|u| !u.is_empty()) {
                Some(url) => self.probe_http(url, timeout).await,
                None => CheckResult::config_error("no URL configured for HTTP monitoring"),
            },
            TargetKind::Ssh => match target.ssh.as_ref().filter(|s| !s.host.is_empty()) {
                Some(ssh) => self.probe_ssh(ssh, timeout).await,
                None => CheckResult::config_error("no SSH host configured"),
            },
        }
    }
}

struct AcceptAnyHostKey;

#[async_trait::async_trait]
impl russh::client::Handler for AcceptAnyHostKey {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not pinned; reachability is what is being measured.
        Ok(true)
    }
}

/// Opens an SSH session, authenticates with the configured credential and
/// runs a trivial remote command. Up iff the command exits 0.
async fn run_ssh_check(ssh: &SshParams) -> Result<()> {
    let config = Arc::new(russh::client::Config::default());
    let mut session =
        russh::client::connect(config, (ssh.host.as_str(), ssh.port), AcceptAnyHostKey).await?;

    let authenticated = if let Some(key_file) = &ssh.key_file {
        let key = russh_keys::load_secret_key(key_file, None)?;
        session.authenticate_publickey(ssh.username.as_str(), Arc::new(key)).await?
    } else if let Some(password) = &ssh.password {
        session.authenticate_password(ssh.username.as_str(), password.as_str()).await?
    } else {
        bail!("no SSH credential configured");
    };
    if !authenticated {
        bail!("authentication rejected for user {}", ssh.username);
    }

    let mut channel = session.channel_open_session().await?;
    channel.exec(true, "echo ok").await?;

    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        if let russh::ChannelMsg::ExitStatus { exit_status: status } = msg {
            exit_status = Some(status);
        }
    }

    let _ = session.disconnect(russh::Disconnect::ByApplication, "", "en").await;

    match exit_status {
        Some(0) => Ok(()),
        Some(code) => bail!("remote command exited with status {code}"),
        None => bail!("remote command returned no exit status"),
    }
}
