//! Read dispatch under the RAM budget.

use std::ops::Range;

use bytes::Bytes;
use tracing::debug;

use super::sizing::{fits_budget, SplitAxis};
use super::ProcessedDataset;
use crate::error::{ProcessError, RasterError};
use crate::pipeline::{ensure_len, process_region, Progress};
use crate::source::ReadRequest;
use crate::types::{copy_words, DataType, Window};

/// Physical layout of a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLayout {
    /// All bands of a pixel are adjacent
    PixelInterleaved,
    /// One full plane per band
    BandSequential,
    /// Anything else: band subsets, reordering, resampling or odd strides
    Other,
}

impl BufferLayout {
    /// Classify `request` against a dataset of `band_count` bands.
    ///
    /// Only identity band maps covering every band at native resolution with
    /// tightly packed strides are recognised.
    pub fn classify(request: &ReadRequest, band_count: usize) -> BufferLayout {
        let identity = request.bands.len() == band_count
            && request.bands.iter().enumerate().all(|(i, &b)| i == b);
        if !identity || !request.is_native_resolution() {
            return BufferLayout::Other;
        }

        let size = request.data_type.size();
        let spacing = request.spacing;
        let width = request.buffer_width;
        let height = request.buffer_height;

        if spacing.pixel == size * band_count
            && spacing.band == size
            && spacing.line == spacing.pixel * width
        {
            BufferLayout::PixelInterleaved
        } else if spacing.pixel == size
            && spacing.line == size * width
            && spacing.band == spacing.line * height
        {
            BufferLayout::BandSequential
        } else {
            BufferLayout::Other
        }
    }
}

impl ProcessedDataset {
    /// Read a window of the processed raster into `buffer`.
    ///
    /// `progress` receives the completion fraction and may return `false` to
    /// abort the read with [`ProcessError::Interrupted`]. A failed read
    /// leaves the dataset usable.
    pub fn read(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [u8],
        progress: Option<&mut dyn FnMut(f64) -> bool>,
    ) -> Result<(), ProcessError> {
        let mut noop = |_: f64| true;
        let sink: &mut dyn FnMut(f64) -> bool = match progress {
            Some(sink) => sink,
            None => &mut noop,
        };
        self.read_with_progress(request, buffer, &mut Progress::new(sink))
    }

    pub(super) fn read_with_progress(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [u8],
        progress: &mut Progress<'_>,
    ) -> Result<(), ProcessError> {
        request.validate(self.width(), self.height(), self.band_count(), buffer.len())?;
        if request.buffer_width == 0 || request.buffer_height == 0 || request.bands.is_empty() {
            return Ok(());
        }
        if request.window.is_empty() {
            return Err(ProcessError::InvalidRequest(
                "empty window for a non-empty buffer".to_string(),
            ));
        }

        let decimated = request.buffer_width < request.window.width
            && request.buffer_height < request.window.height;
        if decimated {
            if let Some(index) = self.select_overview(request) {
                let child_request = self.overview_request(index, request);
                debug!(
                    overview = index,
                    window = ?child_request.window,
                    "Routing decimated read to overview"
                );
                return self.overviews[index].read_with_progress(&child_request, buffer, progress);
            }
        }

        match BufferLayout::classify(request, self.band_count()) {
            BufferLayout::Other => {
                debug!(window = ?request.window, "Reading through block cache");
                self.read_blocks(request, buffer, progress)
            }
            layout => {
                debug!(window = ?request.window, ?layout, "Reading region");
                self.read_region(request, request.window, buffer, progress)
            }
        }
    }

    /// Split `window` until it fits the budget, then compute and scatter
    /// each piece in order.
    fn read_region(
        &mut self,
        request: &ReadRequest,
        window: Window,
        buffer: &mut [u8],
        progress: &mut Progress<'_>,
    ) -> Result<(), ProcessError> {
        let splittable = window.width > 1 || window.height > 1;
        if splittable
            && !fits_budget(
                window.width,
                window.height,
                self.bytes_per_pixel,
                self.ram_budget,
            )
        {
            let (first, second) = match SplitAxis::choose(window.width, window.height, self.width())
            {
                SplitAxis::Rows => window.split_rows(),
                SplitAxis::Columns => window.split_columns(),
            };
            let share = first.pixel_count() as f64 / window.pixel_count() as f64;
            debug!(?window, ?first, ?second, "Splitting request to fit RAM budget");

            self.read_region(request, first, buffer, &mut progress.scoped(0.0, share))?;
            progress.report(share)?;
            self.read_region(request, second, buffer, &mut progress.scoped(share, 1.0))?;
            return Ok(());
        }

        let out_type = process_region(
            self.source.as_ref(),
            &mut self.steps,
            self.geo_transform.as_ref(),
            &mut self.buffers,
            window,
            progress,
        )?;
        scatter(
            self.buffers.current(),
            out_type,
            self.bands.len(),
            window,
            request,
            buffer,
        );
        Ok(())
    }

    /// Nearest-neighbour sampling from cached or freshly computed blocks.
    ///
    /// Walks the request block by block so each block is fetched once and
    /// fills every buffer pixel sampling from it, whatever the cache size.
    fn read_blocks(
        &mut self,
        request: &ReadRequest,
        buffer: &mut [u8],
        progress: &mut Progress<'_>,
    ) -> Result<(), ProcessError> {
        let (block_width, block_height) = self.block_size();
        let spacing = request.spacing;
        let dst_size = request.data_type.size();

        let row_spans = block_spans(request.buffer_height, block_height, |by| {
            request.source_row(by)
        });
        let col_spans = block_spans(request.buffer_width, block_width, |bx| {
            request.source_column(bx)
        });
        let cells = (row_spans.len() * col_spans.len()) as f64;
        let mut done = 0usize;

        for (block_y, rows) in &row_spans {
            for (block_x, cols) in &col_spans {
                let from = done as f64 / cells;
                let to = (done + 1) as f64 / cells;
                let mut cell_progress = progress.scoped(from, to);

                for (i, &band) in request.bands.iter().enumerate() {
                    let band_type = self.bands[band].data_type;
                    let size = band_type.size();
                    let data = self.fetch_block(band, *block_x, *block_y, &mut cell_progress)?;

                    for by in rows.clone() {
                        let iy = request.source_row(by) % block_height;
                        for bx in cols.clone() {
                            let ix = request.source_column(bx) % block_width;
                            let s = (iy * block_width + ix) * size;
                            let d = by * spacing.line + bx * spacing.pixel + i * spacing.band;
                            copy_words(
                                &data[s..],
                                band_type,
                                size,
                                &mut buffer[d..],
                                request.data_type,
                                dst_size,
                                1,
                            );
                        }
                    }
                }

                done += 1;
                progress.report(to)?;
            }
        }
        Ok(())
    }

    /// Read one full working block of `band` into `out`.
    ///
    /// A cache miss runs the pipeline once for the block and caches every
    /// output band, so reading the other bands of the same block afterwards
    /// costs no further computation. Edge blocks fill the top-left corner of
    /// `out`.
    pub fn read_block(
        &mut self,
        band: usize,
        block_x: usize,
        block_y: usize,
        out: &mut [u8],
    ) -> Result<(), ProcessError> {
        let band_count = self.band_count();
        if band >= band_count {
            return Err(RasterError::InvalidBand { band, band_count }.into());
        }
        let (blocks_x, blocks_y) = self.block_counts();
        if block_x >= blocks_x || block_y >= blocks_y {
            return Err(ProcessError::InvalidRequest(format!(
                "block ({}, {}) outside {}x{} blocks",
                block_x, block_y, blocks_x, blocks_y
            )));
        }
        let len = self.block_width * self.block_height * self.bands[band].data_type.size();
        if out.len() < len {
            return Err(RasterError::BufferTooSmall {
                required: len,
                actual: out.len(),
            }
            .into());
        }

        let mut noop = |_: f64| true;
        let data = self.fetch_block(band, block_x, block_y, &mut Progress::new(&mut noop))?;
        out[..len].copy_from_slice(&data);
        Ok(())
    }

    fn fetch_block(
        &mut self,
        band: usize,
        block_x: usize,
        block_y: usize,
        progress: &mut Progress<'_>,
    ) -> Result<Bytes, ProcessError> {
        if let Some(data) = self.cache.get(band, block_x, block_y) {
            return Ok(data);
        }
        self.compute_block(band, block_x, block_y, progress)
    }

    /// Run the pipeline over one block and cache all its output bands.
    fn compute_block(
        &mut self,
        band: usize,
        block_x: usize,
        block_y: usize,
        progress: &mut Progress<'_>,
    ) -> Result<Bytes, ProcessError> {
        let window = self.block_window(block_x, block_y);
        debug!(block_x, block_y, ?window, "Computing block");

        let out_type = process_region(
            self.source.as_ref(),
            &mut self.steps,
            self.geo_transform.as_ref(),
            &mut self.buffers,
            window,
            progress,
        )?;

        let src = self.buffers.current();
        let band_count = self.bands.len();
        let src_pixel = out_type.size() * band_count;
        let mut requested = Bytes::new();

        for b in 0..band_count {
            let dt = self.bands[b].data_type;
            let mut block = Vec::new();
            ensure_len(&mut block, self.block_width * self.block_height * dt.size())?;
            for row in 0..window.height {
                copy_words(
                    &src[row * window.width * src_pixel + b * out_type.size()..],
                    out_type,
                    src_pixel,
                    &mut block[row * self.block_width * dt.size()..],
                    dt,
                    dt.size(),
                    window.width,
                );
            }
            let data = Bytes::from(block);
            if b == band {
                requested = data.clone();
            }
            self.cache.put(b, block_x, block_y, data);
        }

        Ok(requested)
    }
}

/// Group consecutive buffer positions by the block their source sample
/// falls in. Source positions never decrease along the buffer.
fn block_spans(
    len: usize,
    block: usize,
    source: impl Fn(usize) -> usize,
) -> Vec<(usize, Range<usize>)> {
    let mut spans: Vec<(usize, Range<usize>)> = Vec::new();
    for pos in 0..len {
        let index = source(pos) / block;
        match spans.last_mut() {
            Some((last, range)) if *last == index => range.end = pos + 1,
            _ => spans.push((index, pos..pos + 1)),
        }
    }
    spans
}

/// Copy a pixel-interleaved region result into the caller's buffer.
fn scatter(
    src: &[u8],
    src_type: DataType,
    band_count: usize,
    window: Window,
    request: &ReadRequest,
    buffer: &mut [u8],
) {
    let size = src_type.size();
    let src_pixel = size * band_count;
    let spacing = request.spacing;
    let col = window.x_off - request.window.x_off;
    let row0 = window.y_off - request.window.y_off;

    for row in 0..window.height {
        for (i, &band) in request.bands.iter().enumerate() {
            let s = row * window.width * src_pixel + band * size;
            let d = (row0 + row) * spacing.line + col * spacing.pixel + i * spacing.band;
            copy_words(
                &src[s..],
                src_type,
                src_pixel,
                &mut buffer[d..],
                request.data_type,
                spacing.pixel,
                window.width,
            );
        }
    }
}
