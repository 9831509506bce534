//! Freed Bytes Histogram Module
//!
//! Sliding-window record of how many bytes the collector has freed. Time is
//! split into `nb_bins` bins of `bin_width_secs` each; bin 0 is the current
//! one and bins age towards the back as the clock advances.

use crate::clock::Clock;
use crate::{Result, TapeGcError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper limit on the number of bins
pub const MAX_NB_BINS: usize = 10_000;

/// Upper limit on the width of a bin
pub const MAX_BIN_WIDTH_SECS: u32 = 3600;

fn check_bin_width(bin_width_secs: u32) -> Result<()> {
    if bin_width_secs == 0 || bin_width_secs > MAX_BIN_WIDTH_SECS {
        return Err(TapeGcError::InvalidBinWidth {
            max: MAX_BIN_WIDTH_SECS,
        });
    }
    Ok(())
}

pub struct FreedBytesHistogram {
    bins: VecDeque<u64>,
    bin_width_secs: u32,
    start_of_current_bin: Instant,
    clock: Arc<dyn Clock>,
}

impl FreedBytesHistogram {
    pub fn new(nb_bins: usize, bin_width_secs: u32, clock: Arc<dyn Clock>) -> Result<Self> {
        if nb_bins == 0 || nb_bins > MAX_NB_BINS {
            return Err(TapeGcError::InvalidNbBins { max: MAX_NB_BINS });
        }
        check_bin_width(bin_width_secs)?;

        Ok(Self {
            bins: VecDeque::from(vec![0; nb_bins]),
            bin_width_secs,
            start_of_current_bin: clock.now(),
            clock,
        })
    }

    pub fn nb_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bin_width_secs(&self) -> u32 {
        self.bin_width_secs
    }

    /// Change the bin width, redistributing what has already been recorded.
    ///
    /// Bytes in an old bin are spread evenly over its seconds, any remainder
    /// going to its most recent seconds, and then summed into the new bins.
    /// Bytes older than the new window are dropped.
    pub fn set_bin_width_secs(&mut self, new_bin_width_secs: u32) -> Result<()> {
        check_bin_width(new_bin_width_secs)?;
        self.age_bins();
        if new_bin_width_secs == self.bin_width_secs {
            return Ok(());
        }

        let old_width = u64::from(self.bin_width_secs);
        let new_width = u64::from(new_bin_width_secs);
        let old_history = self.bins.len() as u64 * old_width;

        let rebinned: VecDeque<u64> = (0..self.bins.len() as u64)
            .map(|new_bin| {
                let from = new_bin * new_width;
                let to = ((new_bin + 1) * new_width).min(old_history);
                let mut sum = 0u64;
                let mut second = from;
                while second < to {
                    let old_bin = second / old_width;
                    let bin_start = old_bin * old_width;
                    let upto = to.min(bin_start + old_width);
                    sum += Self::spread(
                        self.bins[old_bin as usize],
                        old_width,
                        second - bin_start,
                        upto - bin_start,
                    );
                    second = upto;
                }
                sum
            })
            .collect();

        self.bins = rebinned;
        self.bin_width_secs = new_bin_width_secs;
        Ok(())
    }

    /// Share of `bytes` that falls on seconds `lo..hi` of a bin `width` wide
    fn spread(bytes: u64, width: u64, lo: u64, hi: u64) -> u64 {
        let per_second = bytes / width;
        let remainder = bytes % width;
        per_second * (hi - lo) + hi.min(remainder).saturating_sub(lo)
    }

    /// Record `nb_bytes` freed now
    pub fn bytes_freed(&mut self, nb_bytes: u64) {
        self.age_bins();
        if let Some(current) = self.bins.front_mut() {
            *current = current.saturating_add(nb_bytes);
        }
    }

    /// Bytes freed across the whole window
    pub fn total_bytes_freed(&mut self) -> u64 {
        self.age_bins();
        self.bins.iter().sum()
    }

    /// Bytes freed in the last `nb_secs` seconds, rounded up to whole bins
    pub fn nb_bytes_freed_in_last_nb_secs(&mut self, nb_secs: u64) -> Result<u64> {
        let width = u64::from(self.bin_width_secs);
        let history_secs = self.bins.len() as u64 * width;
        if nb_secs > history_secs {
            return Err(TapeGcError::TooFarBackInTime(format!(
                "requested {}s but the histogram only covers {}s",
                nb_secs, history_secs
            )));
        }

        self.age_bins();
        let nb_bins_to_sum = nb_secs.div_ceil(width) as usize;
        Ok(self.bins.iter().take(nb_bins_to_sum).sum())
    }

    pub fn freed_bytes_in_bin(&mut self, bin_index: usize) -> Result<u64> {
        if bin_index >= self.bins.len() {
            return Err(TapeGcError::InvalidBinIndex(format!(
                "bin {} is out of range, there are {} bins",
                bin_index,
                self.bins.len()
            )));
        }
        self.age_bins();
        Ok(self.bins[bin_index])
    }

    fn age_bins(&mut self) {
        let width = u64::from(self.bin_width_secs);
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(self.start_of_current_bin);
        let nb_shifts = elapsed.as_secs() / width;
        if nb_shifts == 0 {
            return;
        }

        let nb_bins = self.bins.len();
        for _ in 0..(nb_shifts as usize).min(nb_bins) {
            self.bins.pop_back();
            self.bins.push_front(0);
        }
        self.start_of_current_bin += Duration::from_secs(width * nb_shifts);
    }
}
