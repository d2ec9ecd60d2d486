//! # Vehicle Speed Detection Library
//!
//! This library provides the core types shared by the vehicle speed detection
//! pipeline. There are frame sources, motion blobs, calibration and
//! configuration primitives available.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use vsd::prelude::v1::*;
//! ```
//!
//! You may need [`nalgebra`](https://crates.io/crates/nalgebra) to make use of the functionality.

pub mod calibration;
pub mod config;
pub mod detection;
pub mod source;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            calibration::Calibration,
            config::{DetectorConfig, SpeedUnit},
            detection::MotionBlob,
            source::{Frame, FrameSource, RGBA},
        };
        pub use anyhow::{anyhow, ensure, Context, Error, Result};
    }
}
