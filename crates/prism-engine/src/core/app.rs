use winit::event::WindowEvent;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
pub trait App {
    /// Called for window events, before the runtime handles them.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called once per rendered frame.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;

    /// Called once before the window and its GPU context are torn down.
    ///
    /// GPU resources owned by the app should be released here.
    fn on_exit(&mut self) {}

    /// Error that made the app return `AppControl::Exit`, if any.
    ///
    /// Collected once at shutdown; `Runtime::run` returns it.
    fn take_error(&mut self) -> Option<anyhow::Error> {
        None
    }
}
