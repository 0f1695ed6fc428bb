//! Host keep-alive: a heartbeat thread plus a child-process suspend inhibitor.

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use slot_pool::lifecycle::{BackgroundContext, KeepAliveContext, KeepAliveProvider, WakeGuard};

/// Time an inhibitor gets to fail before it counts as held.
const INHIBIT_SETTLE: Duration = Duration::from_millis(25);

pub struct SystemKeepAlive {
    heartbeat: Duration,
    inhibit_command: Vec<String>,
}

impl SystemKeepAlive {
    pub fn new(heartbeat: Duration, inhibit_command: Vec<String>) -> Self {
        Self {
            heartbeat,
            inhibit_command,
        }
    }
}

impl KeepAliveProvider for SystemKeepAlive {
    fn start_context(&self) -> Result<Box<dyn KeepAliveContext>> {
        let context = BackgroundContext::spawn("slot-keep-alive", self.heartbeat)
            .context("spawn keep-alive thread")?;
        Ok(Box::new(context))
    }

    fn acquire_wake(&self) -> Result<Box<dyn WakeGuard>> {
        let Some((program, args)) = self.inhibit_command.split_first() else {
            return Ok(Box::new(NoInhibitor));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {program}"))?;

        std::thread::sleep(INHIBIT_SETTLE);
        if let Some(status) = child.try_wait().with_context(|| format!("poll {program}"))? {
            return Err(anyhow!("{program} exited immediately ({status})"));
        }

        tracing::debug!(program = %program, pid = child.id(), "suspend inhibitor held");
        Ok(Box::new(InhibitGuard {
            program: program.clone(),
            child,
        }))
    }
}

/// Wake guard for hosts configured without an inhibitor.
struct NoInhibitor;

impl WakeGuard for NoInhibitor {
    fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct InhibitGuard {
    program: String,
    child: Child,
}

impl WakeGuard for InhibitGuard {
    fn release(self: Box<Self>) -> Result<()> {
        let Self { program, mut child } = *self;
        if let Some(status) = child.try_wait().with_context(|| format!("poll {program}"))? {
            return Err(anyhow!("{program} had already exited ({status})"));
        }
        child.kill().with_context(|| format!("kill {program}"))?;
        child.wait().with_context(|| format!("reap {program}"))?;
        tracing::debug!(program = %program, "suspend inhibitor released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(cmd: &[&str]) -> SystemKeepAlive {
        SystemKeepAlive::new(
            Duration::from_secs(60),
            cmd.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn empty_command_always_succeeds() {
        let guard = provider(&[]).acquire_wake().unwrap();
        guard.release().unwrap();
    }

    #[test]
    fn missing_program_fails_to_acquire() {
        let err = provider(&["/definitely/not/an/inhibitor"])
            .acquire_wake()
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("spawn"));
    }

    #[cfg(unix)]
    #[test]
    fn immediately_exiting_inhibitor_fails() {
        let err = provider(&["sh", "-c", "exit 3"]).acquire_wake().err().unwrap();
        assert!(format!("{err:#}").contains("exited immediately"));
    }

    #[cfg(unix)]
    #[test]
    fn long_running_inhibitor_is_killed_on_release() {
        let guard = provider(&["sleep", "30"]).acquire_wake().unwrap();
        guard.release().unwrap();
    }

    #[test]
    fn context_starts_and_stops() {
        let context = provider(&[]).start_context().unwrap();
        context.shutdown();
    }
}
