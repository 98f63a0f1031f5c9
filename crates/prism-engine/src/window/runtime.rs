use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx};
use crate::device::{Gpu, GpuInit};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "prism".to_string(),
            initial_size: LogicalSize::new(800.0, 600.0),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window and drives `app` until it exits or the window closes.
    pub fn run<A>(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.fatal.map_or(Ok(()), Err)
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    config: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    entry: Option<(WindowId, WindowEntry)>,
    exit_requested: bool,
    fatal: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            config,
            gpu_init,
            app,
            entry: None,
            exit_requested: false,
            fatal: None,
        }
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let id = window.id();
        let gpu_init = self.gpu_init.clone();

        let entry = WindowEntryTryBuilder {
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()
        .context("GPU initialization failed for window")?;

        log::info!("window `{}` opened", self.config.title);
        self.entry = Some((id, entry));
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.release();
        event_loop.exit();
    }

    /// Lets the app release its GPU resources, then drops the window and device.
    ///
    /// An error reported by the app becomes the result of `Runtime::run`,
    /// unless the runtime already failed on its own.
    fn release(&mut self) {
        if self.exit_requested {
            return;
        }
        self.exit_requested = true;

        self.app.on_exit();
        if let Some(err) = self.app.take_error() {
            log::error!("application failed: {err:#}");
            if self.fatal.is_none() {
                self.fatal = Some(err);
            }
        }

        if self.entry.take().is_some() {
            log::info!("window closed");
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() || self.exit_requested {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop) {
            log::error!("failed to create window: {e:#}");
            self.fatal = Some(e);
            self.shutdown(event_loop);
            return;
        }

        if let Some((_, entry)) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; the scene is static but the host owns the cadence.
        if let Some((_, entry)) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        match &self.entry {
            Some((id, _)) if *id == window_id => {}
            _ => return,
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            self.shutdown(event_loop);
            return;
        }

        match &event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),

            WindowEvent::Resized(new_size) => {
                if let Some((_, entry)) = self.entry.as_mut() {
                    entry.with_gpu_mut(|gpu| gpu.resize(*new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some((_, entry)) = self.entry.as_mut() {
                    let new_size = entry.with_window(|w| w.inner_size());
                    entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::RedrawRequested => {
                let mut app_control = AppControl::Continue;

                // Split borrows to avoid `self` capture inside `ouroboros` closures.
                let (app, entry) = (&mut self.app, &mut self.entry);
                if let Some((_, entry)) = entry.as_mut() {
                    entry.with_mut(|fields| {
                        let mut ctx = FrameCtx {
                            window: fields.window,
                            gpu: fields.gpu,
                        };
                        app_control = app.on_frame(&mut ctx);
                    });
                }

                if app_control == AppControl::Exit {
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingApp {
        exited: bool,
        error: Option<anyhow::Error>,
    }

    impl CoreApp for FailingApp {
        fn on_frame(&mut self, _ctx: &mut FrameCtx<'_, '_>) -> AppControl {
            AppControl::Exit
        }

        fn on_exit(&mut self) {
            self.exited = true;
        }

        fn take_error(&mut self) -> Option<anyhow::Error> {
            self.error.take()
        }
    }

    fn state(error: Option<anyhow::Error>) -> AppState<FailingApp> {
        let app = FailingApp { exited: false, error };
        AppState::new(RuntimeConfig::default(), GpuInit::default(), app)
    }

    #[test]
    fn app_error_becomes_run_result() {
        let mut s = state(Some(anyhow::anyhow!("link failed")));
        s.release();

        assert!(s.app.exited);
        assert!(s.exit_requested);
        let err = s.fatal.expect("app error should be kept");
        assert_eq!(err.to_string(), "link failed");
    }

    #[test]
    fn clean_exit_leaves_no_error() {
        let mut s = state(None);
        s.release();
        assert!(s.app.exited);
        assert!(s.fatal.is_none());
    }

    #[test]
    fn runtime_error_is_not_replaced() {
        let mut s = state(Some(anyhow::anyhow!("link failed")));
        s.fatal = Some(anyhow::anyhow!("no adapter"));
        s.release();
        assert_eq!(s.fatal.unwrap().to_string(), "no adapter");
    }

    #[test]
    fn release_runs_once() {
        let mut s = state(None);
        s.release();
        s.app.exited = false;
        s.release();
        assert!(!s.app.exited);
    }
}
