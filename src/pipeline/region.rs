//! Executing a resolved chain over one window.

use super::progress::Progress;
use super::step::Step;
use crate::error::ProcessError;
use crate::source::{Interleave, RasterSource, ReadRequest};
use crate::types::{convert_buffer, copy_words, DataType, GeoTransform, Window};

/// The two scratch buffers a chain ping-pongs between.
///
/// After [`process_region`] succeeds, [`WorkBuffers::current`] holds the
/// final output, pixel-interleaved by band.
#[derive(Debug, Default)]
pub struct WorkBuffers {
    current: Vec<u8>,
    next: Vec<u8>,
}

impl WorkBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &[u8] {
        &self.current
    }

    /// Bytes currently reserved by both buffers.
    pub fn capacity(&self) -> usize {
        self.current.capacity() + self.next.capacity()
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }
}

/// Resize `buffer` to `len` bytes, reporting allocation failure instead of
/// aborting.
pub(crate) fn ensure_len(buffer: &mut Vec<u8>, len: usize) -> Result<(), ProcessError> {
    if len > buffer.len() {
        buffer
            .try_reserve(len - buffer.len())
            .map_err(|_| ProcessError::OutOfMemory { bytes: len })?;
    }
    buffer.resize(len, 0);
    Ok(())
}

/// Run `steps` over `window` of `source`.
///
/// Acquisition reports the first half of `progress`, the steps share the
/// second half. Returns the data type of the samples left in
/// `buffers.current`.
pub fn process_region(
    source: &dyn RasterSource,
    steps: &mut [Step],
    geo_transform: Option<&GeoTransform>,
    buffers: &mut WorkBuffers,
    window: Window,
    progress: &mut Progress<'_>,
) -> Result<DataType, ProcessError> {
    let first = steps
        .first()
        .ok_or_else(|| ProcessError::InvalidRequest("empty pipeline".to_string()))?;
    let band_count = first.input_band_count;
    let in_type = first.input_type;
    let pixels = window.pixel_count();

    ensure_len(&mut buffers.current, pixels * band_count * in_type.size())?;
    let bands: Vec<usize> = (0..band_count).collect();

    if band_count > 1 && source.interleave() == Interleave::Band {
        // Read planes at native type, then interleave while converting
        let native = source
            .band_info(0)
            .map(|info| info.data_type)
            .unwrap_or(in_type);
        let request = ReadRequest::band_sequential(window, native, bands);
        let mut planes = Vec::new();
        ensure_len(&mut planes, request.required_len())?;
        source.read(&request, &mut planes)?;

        let plane_len = pixels * native.size();
        for band in 0..band_count {
            copy_words(
                &planes[band * plane_len..],
                native,
                native.size(),
                &mut buffers.current[band * in_type.size()..],
                in_type,
                band_count * in_type.size(),
                pixels,
            );
        }
    } else {
        let request = ReadRequest::pixel_interleaved(window, in_type, bands);
        source.read(&request, &mut buffers.current)?;
    }
    progress.report(0.5)?;

    let mut current_type = in_type;
    let mut current_bands = band_count;
    let step_count = steps.len();
    for (i, step) in steps.iter_mut().enumerate() {
        if current_type != step.input_type {
            let len = pixels * current_bands * step.input_type.size();
            ensure_len(&mut buffers.next, len)?;
            let src_len = pixels * current_bands * current_type.size();
            convert_buffer(
                &buffers.current[..src_len],
                current_type,
                &mut buffers.next,
                step.input_type,
            );
            buffers.swap();
            current_type = step.input_type;
        }

        let in_len = pixels * step.input_pixel_size();
        let out_len = pixels * step.output_pixel_size();
        ensure_len(&mut buffers.next, out_len)?;
        step.run(
            &buffers.current[..in_len],
            &mut buffers.next[..out_len],
            window,
            geo_transform,
        )?;
        buffers.swap();
        current_type = step.output_type;
        current_bands = step.output_band_count;

        progress.report(0.5 + 0.5 * (i + 1) as f64 / step_count as f64)?;
    }

    Ok(current_type)
}
