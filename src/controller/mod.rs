//! The AR object controller: gesture recognition, transform control, billboarding, and the scale
//! & visibility policy.

pub mod billboard;
pub mod component;
pub mod gesture;
pub mod scale;
