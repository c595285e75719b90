//! Worker processes: one OS process per enabled client.
//!
//! The orchestrator only sees the [`Spawner`] and [`WorkerProcess`]
//! traits; [`ProcessSpawner`] re-executes this binary in worker mode:
//!
//! ```text
//! apifleet worker [--log-file app.log] -- <name> <client-json> <auth-json>
//! ```

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::config::{AuthConfig, ClientConfig};

/// Environment variable carrying the fleet run id into each worker.
pub const RUN_ID_ENV: &str = "APIFLEET_RUN_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Exited(i32),
}

/// A started worker. Exit codes for signal deaths are reported as
/// `128 + signal`.
#[async_trait]
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<i32>>;

    /// Ask the worker to stop after its current tick.
    fn request_stop(&mut self) -> io::Result<()>;

    /// Terminate immediately.
    fn kill(&mut self) -> io::Result<()>;

    async fn wait(&mut self) -> io::Result<i32>;
}

pub trait Spawner: Send + Sync {
    fn spawn(
        &self,
        name: &str,
        config: &ClientConfig,
        auth: Option<&AuthConfig>,
    ) -> io::Result<Box<dyn WorkerProcess>>;
}

pub struct WorkerHandle {
    pub name: String,
    pub pid: Option<u32>,
    pub config: ClientConfig,
    pub state: WorkerState,
    pub process: Box<dyn WorkerProcess>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }
}

// ── OS Processes ────────────────────────────────────────────────────

pub struct ProcessSpawner {
    program: PathBuf,
    log_file: Option<PathBuf>,
    run_id: String,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>, log_file: Option<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            log_file,
            run_id: run_id.into(),
        }
    }

    fn command(&self, name: &str, config: &ClientConfig, auth: Option<&AuthConfig>) -> io::Result<Command> {
        let client_json = serde_json::to_string(config).map_err(io::Error::other)?;
        let auth_json = match auth {
            Some(auth) => serde_json::to_string(auth).map_err(io::Error::other)?,
            None => "{}".to_string(),
        };

        let mut cmd = Command::new(&self.program);
        cmd.arg("worker");
        if let Some(path) = &self.log_file {
            cmd.arg("--log-file").arg(path);
        }
        cmd.arg("--")
            .arg(name)
            .arg(client_json)
            .arg(auth_json)
            .env(RUN_ID_ENV, &self.run_id)
            .stdin(Stdio::null());
        Ok(cmd)
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(
        &self,
        name: &str,
        config: &ClientConfig,
        auth: Option<&AuthConfig>,
    ) -> io::Result<Box<dyn WorkerProcess>> {
        let child = self.command(name, config, auth)?.spawn()?;
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    #[cfg(unix)]
    fn request_stop(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // Already reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<i32> {
        Ok(exit_code(self.child.wait().await?))
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpMethod;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn client() -> ClientConfig {
        ClientConfig {
            url: "http://api.local/items".into(),
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            payload: Some(json!({"a": 1})),
            interval: 5,
            use_token_manager: false,
            disabled: false,
            max_runtime: Some(30),
            disable_on_connect_failure: false,
            retry_jitter_ms: Some(250),
        }
    }

    #[test]
    fn test_worker_command_line() {
        let spawner = ProcessSpawner::new("/usr/bin/apifleet", Some("app.log".into()), "run-1");
        let cmd = spawner.command("orders", &client(), None).unwrap();
        let std_cmd = cmd.as_std();

        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[..5], ["worker", "--log-file", "app.log", "--", "orders"]);
        assert_eq!(args[6], "{}");

        let sent: ClientConfig = serde_json::from_str(&args[5]).unwrap();
        assert_eq!(sent, client());

        let run_id = std_cmd
            .get_envs()
            .find(|(k, _)| *k == RUN_ID_ENV)
            .and_then(|(_, v)| v)
            .map(|v| v.to_string_lossy().into_owned());
        assert_eq!(run_id.as_deref(), Some("run-1"));
    }

    #[test]
    fn test_auth_is_forwarded() {
        let spawner = ProcessSpawner::new("apifleet", None, "run-1");
        let auth = AuthConfig {
            url: "http://auth.local/token".into(),
            credentials: json!({"user": "svc"}),
        };
        let cmd = spawner.command("orders", &client(), Some(&auth)).unwrap();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "worker");
        assert_eq!(args[1], "--");
        let sent: AuthConfig = serde_json::from_str(&args[4]).unwrap();
        assert_eq!(sent, auth);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_request_terminates_child() {
        let mut child = ChildProcess {
            child: Command::new("sleep").arg("30").spawn().unwrap(),
        };
        assert!(child.pid().is_some());
        assert_eq!(child.try_wait().unwrap(), None);

        child.request_stop().unwrap();
        assert_eq!(child.wait().await.unwrap(), 128 + 15);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_natural_exit_code() {
        let mut child = ChildProcess {
            child: Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap(),
        };
        assert_eq!(child.wait().await.unwrap(), 3);
    }
}
