use parking_lot::Mutex;
use std::{future::Future, mem, sync::Arc};
use tokio::{sync::watch, task::JoinSet};
use tracing::{debug, error, info, info_span, Instrument as _};

use crate::{container::Container, errors::Error};

/// Application callbacks. Beans exporting `dyn AppEvent` are notified on start in registration order
/// and on stop in reverse order.
pub trait AppEvent: Send + Sync {
    /// # Errors
    /// An error aborts the start and shuts the application down.
    fn on_app_start(&self, ctx: &AppContext) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn on_app_stop(&self, ctx: &AppContext) {
        let _ = ctx;
    }
}

/// Code run once after every start callback. Beans exporting `dyn AppRunner` are run in registration order.
pub trait AppRunner: Send + Sync {
    /// # Errors
    /// An error aborts the start and shuts the application down.
    fn run(&self, ctx: &AppContext) -> anyhow::Result<()>;
}

/// Signal observed by background tasks, set once shutdown begins.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until shutdown begins.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct AppInner {
    container: Container,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<JoinSet<anyhow::Result<()>>>,
    started: Mutex<Vec<(String, Arc<dyn AppEvent>)>>,
}

/// Handle given to application callbacks: the container plus background task management.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppInner>,
}

impl AppContext {
    #[inline]
    #[must_use]
    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// Spawns a background task. It gets a [`Shutdown`] signal and must return once it's set.
    /// An error returned by the task is logged on shutdown.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let fut = task(self.shutdown_signal());
        self.inner.tasks.lock().spawn(fut);
        debug!("Background task spawned");
    }

    #[inline]
    #[must_use]
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown {
            rx: self.inner.shutdown.subscribe(),
        }
    }

    /// Requests shutdown. [`Application::run`] then stops the application.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.send_replace(true) {
            info!("Shutdown requested");
        }
    }
}

/// Drives a [`Container`] through start, run and shutdown.
///
/// ```ignore
/// let container = Container::new();
/// container.load(BootConfig::new().args(std::env::args().skip(1)))?;
/// container.register(Bean::object(Server).export::<dyn AppRunner>(|bean| bean))?;
///
/// Application::new(container).run().await?;
/// ```
pub struct Application {
    ctx: AppContext,
}

impl Application {
    #[must_use]
    pub fn new(container: Container) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx: AppContext {
                inner: Arc::new(AppInner {
                    container,
                    shutdown,
                    tasks: Mutex::new(JoinSet::new()),
                    started: Mutex::new(Vec::new()),
                }),
            },
        }
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Refreshes the container, then calls start callbacks and runners.
    ///
    /// # Errors
    /// - Returns the refresh error, the container is already stopped then
    /// - Returns [`Error::Callback`] if a callback or runner fails, after shutting down
    pub async fn start(&self) -> Result<(), Error> {
        let result = self.start_beans().instrument(info_span!("start")).await;
        if result.is_err() {
            self.shutdown().await;
        }
        result
    }

    async fn start_beans(&self) -> Result<(), Error> {
        let container = self.ctx.container();
        container.refresh()?;

        for (bean, event) in container.collect_named::<dyn AppEvent>() {
            event.on_app_start(&self.ctx).map_err(|source| callback_error(&bean, source))?;
            debug!(%bean, "Start callback called");
            self.ctx.inner.started.lock().push((bean, event));
        }
        for (bean, runner) in container.collect_named::<dyn AppRunner>() {
            runner.run(&self.ctx).map_err(|source| callback_error(&bean, source))?;
            debug!(%bean, "Runner finished");
        }
        info!("Application started");
        Ok(())
    }

    /// Starts the application and waits for SIGINT, SIGTERM or [`AppContext::shutdown`], then shuts down.
    ///
    /// # Errors
    /// See [`Self::start`].
    pub async fn run(&self) -> Result<(), Error> {
        self.start().await?;

        let mut shutdown = self.ctx.shutdown_signal();
        tokio::select! {
            () = wait_for_signal() => info!("Signal received"),
            () = shutdown.wait() => {}
        }
        self.shutdown().await;
        Ok(())
    }

    /// Stops the application: sets the shutdown signal, calls stop callbacks in reverse order,
    /// runs destroyers and waits for background tasks. A second call is a no-op.
    pub async fn shutdown(&self) {
        let container = self.ctx.container();
        if !container.begin_stop() {
            return;
        }
        async {
            self.ctx.inner.shutdown.send_replace(true);

            let started = mem::take(&mut *self.ctx.inner.started.lock());
            for (bean, event) in started.iter().rev() {
                event.on_app_stop(&self.ctx);
                debug!(%bean, "Stop callback called");
            }

            container.run_destroyers();

            let mut tasks = mem::take(&mut *self.ctx.inner.tasks.lock());
            while let Some(result) = tasks.join_next().await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!("Background task failed: {:#}", err),
                    Err(err) => error!("Background task aborted: {}", err),
                }
            }
            container.mark_stopped();
        }
        .instrument(info_span!("shutdown"))
        .await;
    }
}

fn callback_error(bean: &str, source: anyhow::Error) -> Error {
    let err = Error::Callback {
        bean: bean.to_owned(),
        source,
    };
    error!("{}", err);
    err
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                () = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            error!("Failed to listen for SIGTERM: {}", err);
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for SIGINT: {}", err);
        std::future::pending::<()>().await;
    }
}
