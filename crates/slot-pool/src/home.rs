//! Home execution contexts for thread-affine resources.
//!
//! Some engines may only be built and torn down on the thread that owns their
//! native handles. Such an engine exposes a [`HomeContext`]; anything that has to
//! run "at home" is posted to it as a task instead of being executed inline on
//! the caller's thread.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

/// Whether a home loop keeps running after a task completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeControl {
    Continue,
    Shutdown,
}

/// Unit of work executed on a home context.
pub type HomeTask = Box<dyn FnOnce() -> HomeControl + Send + 'static>;

/// The home context's thread has exited and can no longer accept work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("home context '{name}' is no longer running")]
pub struct HomeClosed {
    pub name: String,
}

/// Cloneable handle used to post work onto a home thread.
#[derive(Clone)]
pub struct HomeContext {
    name: Arc<str>,
    tx: Sender<HomeTask>,
}

impl HomeContext {
    /// Name of the backing thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `task` on the home thread and return without waiting for it.
    ///
    /// Tasks run in the order they were posted.
    pub fn post<F>(&self, task: F) -> Result<(), HomeClosed>
    where
        F: FnOnce() -> HomeControl + Send + 'static,
    {
        self.tx.send(Box::new(task)).map_err(|_| HomeClosed {
            name: self.name.to_string(),
        })
    }
}

impl fmt::Debug for HomeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeContext")
            .field("name", &self.name)
            .field("queued", &self.tx.len())
            .finish()
    }
}

/// A named thread that executes tasks posted through its [`HomeContext`].
///
/// The thread exits when a task returns [`HomeControl::Shutdown`] or when every
/// context handle has been dropped. Dropping a `HomeThread` detaches it.
pub struct HomeThread {
    context: HomeContext,
    join: JoinHandle<()>,
}

impl HomeThread {
    /// Start a home thread named `name`.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name: String = name.into();
        let (tx, rx) = crossbeam_channel::unbounded::<HomeTask>();
        let thread_name = name.clone();
        let join = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_home_loop(&thread_name, rx))?;
        Ok(Self {
            context: HomeContext {
                name: Arc::from(name),
                tx,
            },
            join,
        })
    }

    /// Handle for posting work to this thread.
    pub fn context(&self) -> HomeContext {
        self.context.clone()
    }

    /// Wait for the thread to exit.
    ///
    /// Only returns once a shutdown task ran or every other context handle is gone.
    pub fn join(self) {
        let Self { context, join } = self;
        drop(context);
        let _ = join.join();
    }
}

fn run_home_loop(name: &str, rx: Receiver<HomeTask>) {
    tracing::debug!(home = %name, "home context started");
    while let Ok(task) = rx.recv() {
        if task() == HomeControl::Shutdown {
            tracing::debug!(home = %name, pending = rx.len(), "home context shutdown requested");
            break;
        }
    }
    tracing::debug!(home = %name, "home context exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn tasks_run_on_the_home_thread_in_order() {
        let home = HomeThread::spawn("home-order").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            home.context()
                .post(move || {
                    let thread = std::thread::current().name().map(str::to_string);
                    seen.lock().unwrap().push((i, thread));
                    HomeControl::Continue
                })
                .unwrap();
        }
        home.context().post(|| HomeControl::Shutdown).unwrap();
        home.join();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        for (expected, (i, thread)) in seen.iter().enumerate() {
            assert_eq!(*i, expected);
            assert_eq!(thread.as_deref(), Some("home-order"));
        }
    }

    #[test]
    fn post_after_shutdown_reports_closed() {
        let home = HomeThread::spawn("home-closed").unwrap();
        let ctx = home.context();
        ctx.post(|| HomeControl::Shutdown).unwrap();
        home.join();

        let err = ctx.post(|| HomeControl::Continue).unwrap_err();
        assert_eq!(err.name, "home-closed");
    }

    #[test]
    fn thread_exits_when_all_handles_drop() {
        let home = HomeThread::spawn("home-drop").unwrap();
        // join() drops the last handle; the loop must observe the disconnect.
        home.join();
    }
}
