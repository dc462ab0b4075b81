use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{capture::TransformSettings, config::AnalyserSettings, MonitorError, Result};

const BLACKMAN_ALPHA: f32 = 0.16;

/// Software spectrum analyser producing smoothed byte magnitudes.
///
/// Keeps the most recent `fft_size` samples in a ring. Each read after new
/// samples arrived runs a Blackman-windowed real FFT, blends the normalised
/// magnitudes into the running average with the smoothing constant, then maps
/// the result from decibels onto `0..=255`.
pub struct SpectrumAnalyser {
    settings: TransformSettings,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    filled: usize,
    pending: bool,
    smoothed: Vec<f32>,
    fft: FftResources,
}

impl SpectrumAnalyser {
    pub fn new(settings: TransformSettings) -> Result<Self> {
        AnalyserSettings {
            fft_size: settings.fft_size,
            smoothing: settings.smoothing,
            min_decibels: settings.min_decibels,
            max_decibels: settings.max_decibels,
        }
        .validate()?;

        let size = settings.fft_size;
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Ok(Self {
            settings,
            window: (0..size).map(|index| blackman_value(index, size)).collect(),
            history: vec![0.0; size],
            write_pos: 0,
            filled: 0,
            pending: false,
            smoothed: vec![0.0; size / 2],
            fft,
        })
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    pub fn bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// True once a full window of samples has been seen.
    pub fn is_warm(&self) -> bool {
        self.filled >= self.settings.fft_size
    }

    /// Appends time-domain samples, keeping only the latest window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let size = self.history.len();
        let tail = if samples.len() > size {
            &samples[samples.len() - size..]
        } else {
            samples
        };

        for &sample in tail {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % size;
        }

        self.filled = (self.filled + samples.len()).min(size);
        self.pending = true;
    }

    /// Writes the current byte spectrum into `out`.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        if out.len() != self.bin_count() {
            return Err(MonitorError::InvalidInput(
                "output buffer must hold exactly one value per bin",
            ));
        }

        if !self.is_warm() {
            out.fill(0);
            return Ok(());
        }

        if self.pending {
            self.update_smoothed()?;
            self.pending = false;
        }

        let range = self.settings.max_decibels - self.settings.min_decibels;
        for (slot, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            *slot = quantise(magnitude, self.settings.min_decibels, range);
        }

        Ok(())
    }

    /// Drops all history and smoothing state.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.pending = false;
    }

    fn update_smoothed(&mut self) -> Result<()> {
        let size = self.history.len();
        let fft = &mut self.fft;

        // Oldest sample sits at the write cursor once the ring is full.
        for (offset, slot) in fft.input.iter_mut().enumerate() {
            let sample = self.history[(self.write_pos + offset) % size];
            *slot = sample * self.window[offset];
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let tau = self.settings.smoothing;
        let scale = 1.0 / size as f32;
        for (previous, bin) in self.smoothed.iter_mut().zip(&fft.spectrum) {
            let magnitude = bin.norm() * scale;
            let blended = tau * *previous + (1.0 - tau) * magnitude;
            *previous = if blended.is_finite() { blended } else { 0.0 };
        }

        Ok(())
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("settings", &self.settings)
            .field("filled", &self.filled)
            .field("pending", &self.pending)
            .finish()
    }
}

fn quantise(magnitude: f32, min_decibels: f32, range: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let decibels = 20.0 * magnitude.log10();
    let scaled = 255.0 / range * (decibels - min_decibels);
    scaled.floor().clamp(0.0, 255.0) as u8
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    let a0 = 0.5 * (1.0 - BLACKMAN_ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * BLACKMAN_ALPHA;
    let phase = 2.0 * PI * index as f32 / len as f32;
    a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
}
