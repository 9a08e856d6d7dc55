//! Mock collaborators, declarative device layouts and fixtures for
//! exercising the installer storage model without real hardware.

pub mod errors;
pub mod fixtures;
pub mod layout;
pub mod mock;
