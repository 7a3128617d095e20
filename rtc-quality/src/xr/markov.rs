//! Four-state Markov model of RFC 3611 section 4.7.2.
//!
//! State 1 is a received packet within a gap, state 2 a received packet
//! within a burst, state 3 a lost or discarded packet within a burst and
//! state 4 an isolated lost or discarded packet within a gap.

use log::trace;
use rtcp::extended_report::voip_metrics::DEFAULT_GMIN;

/// Transition counters `Cxy` (from state x to state y).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TransitionCounters {
    pub c11: u32,
    pub c13: u32,
    pub c14: u32,
    pub c22: u32,
    pub c23: u32,
    pub c33: u32,
}

impl TransitionCounters {
    pub fn c31(&self) -> u32 {
        self.c13
    }

    pub fn c32(&self) -> u32 {
        self.c23
    }

    pub fn total(&self) -> u32 {
        self.c11 + self.c14 + self.c13 + self.c22 + self.c23 + self.c31() + self.c32() + self.c33
    }

    /// Probability of moving from burst loss back to burst reception.
    pub fn p32(&self) -> f64 {
        let denom = self.c31() + self.c32() + self.c33;
        if self.c32() == 0 || denom == 0 {
            0.0
        } else {
            self.c32() as f64 / denom as f64
        }
    }

    /// Probability of moving from burst reception to burst loss.
    pub fn p23(&self) -> f64 {
        let denom = self.c22 + self.c23;
        if denom == 0 {
            0.0
        } else {
            1.0 - self.c22 as f64 / denom as f64
        }
    }
}

/// Classifies the packet stream into gaps and bursts, counting transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BurstGapModel {
    gmin: u32,
    counters: TransitionCounters,
    good_run: u32,
    lost_in_burst: u32,
}

impl Default for BurstGapModel {
    fn default() -> Self {
        Self {
            gmin: DEFAULT_GMIN as u32,
            counters: TransitionCounters::default(),
            good_run: 0,
            lost_in_burst: 0,
        }
    }
}

impl BurstGapModel {
    pub(crate) fn gmin(&self) -> u32 {
        self.gmin
    }

    pub(crate) fn counters(&self) -> TransitionCounters {
        self.counters
    }

    pub(crate) fn on_received(&mut self) {
        self.good_run += 1;
    }

    pub(crate) fn on_lost(&mut self) {
        let c = &mut self.counters;
        if self.good_run >= self.gmin {
            if self.lost_in_burst == 1 {
                c.c14 += 1;
            } else {
                c.c13 += 1;
            }
            self.lost_in_burst = 1;
            c.c11 += self.good_run;
        } else {
            self.lost_in_burst += 1;
            if self.good_run == 0 {
                c.c33 += 1;
            } else {
                c.c23 += 1;
                c.c22 += self.good_run - 1;
            }
        }
        self.good_run = 0;

        trace!(
            "C11[{}] C13[{}] C14[{}] C22[{}] C23[{}] C33[{}]",
            c.c11, c.c13, c.c14, c.c22, c.c23, c.c33
        );
    }

    /// Ends the current gap at report time so that trailing received packets
    /// are counted.
    pub(crate) fn close_gap(&mut self) {
        if self.good_run != 0 {
            self.counters.c11 += self.good_run;
            self.good_run = 0;
        }
    }
}
