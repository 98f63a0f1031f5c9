/// GPU buffer that is destroyed as soon as its owner is dropped.
///
/// wgpu would free the allocation eventually anyway; `destroy` makes the release
/// happen at teardown instead of whenever the last internal reference goes.
pub(crate) struct GpuBuffer {
    buffer: wgpu::Buffer,
}

impl GpuBuffer {
    pub(crate) fn new(buffer: wgpu::Buffer) -> Self {
        Self { buffer }
    }

    #[inline]
    pub(crate) fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}
