//! Unit test modules.

mod gap_test;
mod rolling_window_test;
mod wbal_test;
mod zones_test;
