//! Frame-skip decimation.
//!
//! Every captured frame bumps the counter; only frames whose 1-based counter
//! is a multiple of the skip interval reach the cascade.

use anyhow::{anyhow, Result};

#[derive(Clone, Debug)]
pub struct SamplingController {
    skip_interval: u64,
    frames_seen: u64,
    frames_processed: u64,
}

impl SamplingController {
    pub fn new(skip_interval: u64) -> Result<Self> {
        if skip_interval == 0 {
            return Err(anyhow!("frame skip interval must be at least 1"));
        }
        Ok(Self {
            skip_interval,
            frames_seen: 0,
            frames_processed: 0,
        })
    }

    /// Count one captured frame; `true` when it should be processed.
    pub fn admit(&mut self) -> bool {
        self.frames_seen += 1;
        let process = self.frames_seen % self.skip_interval == 0;
        if process {
            self.frames_processed += 1;
        }
        process
    }

    pub fn skip_interval(&self) -> u64 {
        self.skip_interval
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(k: u64, captured: u64) -> Vec<u64> {
        let mut sampler = SamplingController::new(k).expect("valid interval");
        (1..=captured).filter(|_| sampler.admit()).collect()
    }

    #[test]
    fn every_kth_frame_is_processed() {
        assert_eq!(processed(25, 80), vec![25, 50, 75]);
        assert_eq!(processed(3, 10), vec![3, 6, 9]);
    }

    #[test]
    fn interval_of_one_processes_everything() {
        assert_eq!(processed(1, 5), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(SamplingController::new(0).is_err());
    }

    #[test]
    fn counters_track_seen_and_processed() {
        let mut sampler = SamplingController::new(4).expect("valid interval");
        for _ in 0..9 {
            sampler.admit();
        }
        assert_eq!(sampler.frames_seen(), 9);
        assert_eq!(sampler.frames_processed(), 2);
        assert_eq!(sampler.skip_interval(), 4);
    }
}
