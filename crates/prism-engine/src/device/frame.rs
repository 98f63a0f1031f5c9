/// Represents a single acquired frame.
///
/// This object is short-lived and must be finalized promptly. Holding the surface
/// texture prevents acquisition of subsequent frames.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}

impl GpuFrame {
    /// Submits the recorded commands, then presents the surface texture.
    pub(crate) fn finish(self, queue: &wgpu::Queue) {
        let GpuFrame {
            surface_texture,
            view,
            encoder,
        } = self;
        drop(view);
        let submit = || {
            queue.submit(std::iter::once(encoder.finish()));
        };
        submit_then_present(submit, surface_texture);
    }
}

/// Anything that can be shown on screen once its work is submitted.
///
/// Dropping a `wgpu::SurfaceTexture` without presenting discards the frame.
pub(crate) trait Present {
    fn present(self);
}

impl Present for wgpu::SurfaceTexture {
    fn present(self) {
        wgpu::SurfaceTexture::present(self);
    }
}

pub(crate) fn submit_then_present<P: Present>(submit: impl FnOnce(), texture: P) {
    submit();
    texture.present();
}
