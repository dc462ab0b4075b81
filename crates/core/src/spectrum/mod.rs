use std::{fmt, ops::Deref};

use serde::{Deserialize, Serialize};

use crate::{capture::TransformNode, Result};

/// Byte magnitudes of one spectrum capture, ordered from 0 Hz up to Nyquist.
///
/// Each tick allocates a fresh snapshot; the buffer is never shared with the
/// transform node or with an earlier tick.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpectrumSnapshot {
    bins: Box<[u8]>,
}

impl SpectrumSnapshot {
    pub fn new(bins: Vec<u8>) -> Self {
        Self {
            bins: bins.into_boxed_slice(),
        }
    }

    pub fn zeroed(bin_count: usize) -> Self {
        Self::new(vec![0; bin_count])
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bins
    }

    pub fn is_silent(&self) -> bool {
        self.bins.iter().all(|&value| value == 0)
    }
}

impl Deref for SpectrumSnapshot {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bins
    }
}

impl From<Vec<u8>> for SpectrumSnapshot {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SpectrumSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peak = self.bins.iter().copied().max().unwrap_or(0);
        f.debug_struct("SpectrumSnapshot")
            .field("bins", &self.bins.len())
            .field("max", &peak)
            .finish()
    }
}

/// Pull-based view over the session's transform node.
pub struct SpectralTransform {
    node: Box<dyn TransformNode>,
    bin_count: usize,
}

impl SpectralTransform {
    pub fn new(node: Box<dyn TransformNode>) -> Self {
        let bin_count = node.bin_count();
        Self { node, bin_count }
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Reads the current smoothed magnitudes into a new snapshot.
    ///
    /// A node that is not warmed up yet reports zeros. An error means the
    /// read itself failed and the caller should skip this tick.
    pub fn capture(&mut self) -> Result<SpectrumSnapshot> {
        let mut bins = vec![0; self.bin_count];
        self.node.read_magnitudes(&mut bins)?;
        Ok(SpectrumSnapshot::new(bins))
    }

    pub(crate) fn node_mut(&mut self) -> &mut dyn TransformNode {
        self.node.as_mut()
    }

    pub(crate) fn disconnect(&mut self) {
        self.node.disconnect();
    }
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("bin_count", &self.bin_count)
            .finish()
    }
}
