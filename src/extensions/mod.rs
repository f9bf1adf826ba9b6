//! Optional extensions to the base AR manipulator.

#[cfg(feature = "extension_target_indicator")]
pub mod target_indicator;
