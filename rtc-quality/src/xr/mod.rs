pub(crate) mod encoder;
pub(crate) mod markov;

use shared::util::{is_newer_seq, seq_in_window};

/// Inclusive range of sequence numbers covered by one extended report.
///
/// After a report the window is empty, starting just past the reported end,
/// until a newer packet is classified. Emptiness is tracked on its own so a
/// window spanning any distance around the ring stays valid.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReportWindow {
    pub begin: u16,
    pub end: u16,
    empty: bool,
}

impl ReportWindow {
    pub fn new(begin: u16, end: u16) -> Self {
        Self {
            begin,
            end,
            empty: false,
        }
    }

    /// Empty window whose next packet will be `begin`.
    pub const fn empty_from(begin: u16) -> Self {
        Self {
            begin,
            end: begin.wrapping_sub(1),
            empty: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn contains(&self, seq: u16) -> bool {
        !self.empty && seq_in_window(seq, self.begin, self.end)
    }

    /// Moves the end forward to `seq` when it follows the current end.
    pub(crate) fn extend(&mut self, seq: u16) {
        if self.empty {
            if seq != self.end && is_newer_seq(seq, self.end) {
                self.end = seq;
                self.empty = false;
            }
        } else if is_newer_seq(seq, self.end) {
            self.end = seq;
        }
    }

    /// Empties the window, starting it again after the current end.
    pub(crate) fn advance(&mut self) {
        *self = Self::empty_from(self.end.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_contains() {
        let window = ReportWindow::new(10, 20);
        assert!(window.contains(10));
        assert!(window.contains(20));
        assert!(!window.contains(9));
        assert!(!window.contains(21));
    }

    #[test]
    fn test_window_across_wraparound() {
        let window = ReportWindow::new(65530, 5);
        assert!(window.contains(65535));
        assert!(window.contains(0));
        assert!(window.contains(5));
        assert!(!window.contains(6));
        assert!(!window.contains(65529));
    }

    #[test]
    fn test_long_window_across_wraparound() {
        let window = ReportWindow::new(64000, 100);
        assert!(!window.is_empty());
        assert!(window.contains(64000));
        assert!(window.contains(64500));
        assert!(window.contains(65535));
        assert!(window.contains(50));
        assert!(window.contains(100));
        assert!(!window.contains(101));
        assert!(!window.contains(63999));

        let window = ReportWindow::new(5, 65000);
        assert!(!window.is_empty());
        assert!(window.contains(5));
        assert!(window.contains(40000));
        assert!(window.contains(65000));
        assert!(!window.contains(65001));
        assert!(!window.contains(4));
    }

    #[test]
    fn test_advanced_window_is_empty() {
        let mut window = ReportWindow::new(10, 20);
        window.advance();
        assert_eq!(window, ReportWindow::empty_from(21));
        assert!(window.is_empty());
        assert!(!window.contains(20));
        assert!(!window.contains(21));

        let window = ReportWindow::empty_from(0);
        assert_eq!(window.end, u16::MAX);
        assert!(window.is_empty());
        assert!(!window.contains(0));
    }

    #[test]
    fn test_extend_after_advance() {
        let mut window = ReportWindow::new(0, 20);
        window.advance();

        // the reported end and older packets leave it empty
        window.extend(20);
        window.extend(15);
        assert!(window.is_empty());

        window.extend(22);
        assert_eq!(window, ReportWindow::new(21, 22));
        window.extend(21);
        assert_eq!(window, ReportWindow::new(21, 22));
        window.extend(30);
        assert_eq!(window, ReportWindow::new(21, 30));
    }

    #[test]
    fn test_extend_grows_past_wraparound() {
        let mut window = ReportWindow::new(64000, 64000);
        for seq in (64000u32..65536 + 100).step_by(50) {
            window.extend(seq as u16);
        }
        assert_eq!(window, ReportWindow::new(64000, 64));
        assert!(window.contains(65000));
    }

    #[test]
    fn test_single_sequence_window() {
        let window = ReportWindow::new(7, 7);
        assert!(!window.is_empty());
        assert!(window.contains(7));
    }
}
